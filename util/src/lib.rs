pub mod settings;
pub use settings::{client_for, settings_for, ClientSettings};
