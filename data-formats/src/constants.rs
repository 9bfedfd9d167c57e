//! Protocol constants and client defaults

/// REST API version sent as `api-version` on every request.
pub const DEFAULT_API_VERSION: &str = "2016-11-14";

/// Token lifetime for short-lived, per-request tokens.
pub const DEFAULT_TOKEN_VALIDITY_SECS: u64 = 3600;
/// Token lifetime used by long-lived deployment profiles (one year).
pub const LONG_LIVED_TOKEN_VALIDITY_SECS: u64 = 365 * 24 * 3600;
/// Longest token lifetime a signer accepts.
pub const MAX_TOKEN_VALIDITY_SECS: u64 = 100 * LONG_LIVED_TOKEN_VALIDITY_SECS;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_IDLE_CONNECTIONS: usize = 100;

/// Environment variable consulted when no connection string is configured.
pub const CONNECTION_STRING_ENV: &str = "CONNECTION_STRING";

pub const SAS_TOKEN_SCHEME: &str = "SharedAccessSignature";

// Connection string keys
pub const HOST_NAME: &str = "HostName";
pub const SHARED_ACCESS_KEY_NAME: &str = "SharedAccessKeyName";
pub const SHARED_ACCESS_KEY: &str = "SharedAccessKey";
pub const SHARED_ACCESS_KEY_VALUE: &str = "SharedAccessKeyValue";
pub const DEVICE_ID: &str = "DeviceId";

pub fn default_user_agent() -> String {
    format!("rust-iothub-client/{}", env!("CARGO_PKG_VERSION"))
}
