use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Cryptographic error stack: {0}")]
    CryptoStack(#[from] openssl::error::ErrorStack),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Malformed connection string: {0}")]
    MalformedConnectionString(String),
    #[error("Connection string is missing required field '{0}'")]
    MissingField(&'static str),
    #[error("Shared access key is not valid base64")]
    InvalidKey,
    #[error("Token validity of {0} seconds is out of range")]
    InvalidValidity(u64),
    #[error("Invalid shared access signature: {0}")]
    InvalidToken(&'static str),
}
