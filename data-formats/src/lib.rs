mod errors;
pub use errors::{Error, Result};

pub mod constants;

pub mod connection_string;
pub use connection_string::Credentials;

pub mod sas;
pub use sas::{SasToken, TokenSigner};

pub mod device;
pub use device::Device;
