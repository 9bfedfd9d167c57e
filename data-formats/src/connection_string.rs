//! Parsing of hub connection strings into [`Credentials`].
//!
//! A connection string is a list of `Key=Value` pairs separated by `;`
//! (or `&`, when handed over in query-string form), e.g.
//!
//! ```text
//! HostName=myhub.azure-devices.net;SharedAccessKeyName=iothubowner;SharedAccessKey=<base64>
//! ```
//!
//! Values are percent-decoded. Literal spaces in decoded values are turned
//! back into `+`, because the shared access key is base64 and a query-style
//! decoder would otherwise have corrupted every `+` in it.

use std::fmt;
use std::str::FromStr;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::constants::{
    DEVICE_ID, HOST_NAME, SHARED_ACCESS_KEY, SHARED_ACCESS_KEY_NAME, SHARED_ACCESS_KEY_VALUE,
};
use crate::{Error, Result};

// Characters that would change how a serialized value splits on re-parse
const VALUE_ESCAPE: &AsciiSet = &CONTROLS.add(b'%').add(b';').add(b'&');

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    HostName,
    SharedAccessKeyName,
    SharedAccessKey,
    DeviceId,
}

const FIELDS: &[(&str, Field)] = &[
    (HOST_NAME, Field::HostName),
    (SHARED_ACCESS_KEY_NAME, Field::SharedAccessKeyName),
    (SHARED_ACCESS_KEY, Field::SharedAccessKey),
    (SHARED_ACCESS_KEY_VALUE, Field::SharedAccessKey),
    (DEVICE_ID, Field::DeviceId),
];

fn lookup_field(key: &str) -> Option<Field> {
    FIELDS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, field)| *field)
}

/// Credentials for talking to a hub, as found in a connection string.
///
/// `host_name` and `shared_access_key` may be empty after parsing; they are
/// checked when a signer or client gets built from the credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    host_name: String,
    shared_access_key_name: Option<String>,
    shared_access_key: String,
    device_id: Option<String>,
}

impl Credentials {
    /// Values are taken as they are. They must not contain spaces: the
    /// parser reads a space back as `+`, so such credentials do not survive
    /// a trip through [`Display`](fmt::Display) and [`FromStr`].
    pub fn new(
        host_name: &str,
        shared_access_key_name: Option<&str>,
        shared_access_key: &str,
        device_id: Option<&str>,
    ) -> Self {
        Credentials {
            host_name: host_name.to_string(),
            shared_access_key_name: non_empty(shared_access_key_name),
            shared_access_key: shared_access_key.to_string(),
            device_id: non_empty(device_id),
        }
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn shared_access_key_name(&self) -> Option<&str> {
        self.shared_access_key_name.as_deref()
    }

    pub fn shared_access_key(&self) -> &str {
        &self.shared_access_key
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Whether these credentials identify a single device rather than a
    /// service-wide access policy.
    pub fn is_device(&self) -> bool {
        self.device_id.is_some()
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(String::from)
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host_name", &self.host_name)
            .field("shared_access_key_name", &self.shared_access_key_name)
            .field("shared_access_key", &"<redacted>")
            .field("device_id", &self.device_id)
            .finish()
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", HOST_NAME, escape_value(&self.host_name))?;
        if let Some(key_name) = &self.shared_access_key_name {
            write!(f, ";{}={}", SHARED_ACCESS_KEY_NAME, escape_value(key_name))?;
        }
        write!(
            f,
            ";{}={}",
            SHARED_ACCESS_KEY,
            escape_value(&self.shared_access_key)
        )?;
        if let Some(device_id) = &self.device_id {
            write!(f, ";{}={}", DEVICE_ID, escape_value(device_id))?;
        }
        Ok(())
    }
}

fn escape_value(value: &str) -> impl fmt::Display + '_ {
    utf8_percent_encode(value, VALUE_ESCAPE)
}

impl FromStr for Credentials {
    type Err = Error;

    fn from_str(connection_string: &str) -> Result<Self> {
        let mut host_name = None;
        let mut key_name = None;
        let mut key = None;
        let mut device_id = None;

        let segments = connection_string
            .trim()
            .split(|c: char| c == ';' || c == '&')
            .enumerate()
            .filter(|(_, segment)| !segment.is_empty());

        for (pos, segment) in segments {
            let (raw_key, raw_value) = segment.split_once('=').ok_or_else(|| {
                Error::MalformedConnectionString(format!(
                    "segment {} is not a key=value pair",
                    pos
                ))
            })?;
            let name = decode_component(raw_key)?;
            if name.is_empty() {
                return Err(Error::MalformedConnectionString(format!(
                    "segment {} has an empty key",
                    pos
                )));
            }

            let slot = match lookup_field(&name) {
                Some(Field::HostName) => &mut host_name,
                Some(Field::SharedAccessKeyName) => &mut key_name,
                Some(Field::SharedAccessKey) => &mut key,
                Some(Field::DeviceId) => &mut device_id,
                None => {
                    log::debug!("Ignoring unknown connection string key '{}'", name);
                    continue;
                }
            };
            if slot.is_none() {
                *slot = Some(decode_component(raw_value)?);
            }
        }

        Ok(Credentials::new(
            host_name.as_deref().unwrap_or_default(),
            key_name.as_deref(),
            key.as_deref().unwrap_or_default(),
            device_id.as_deref(),
        ))
    }
}

fn decode_component(raw: &str) -> Result<String> {
    let bytes = raw.as_bytes();
    for (pos, _) in raw.match_indices('%') {
        let valid = bytes
            .get(pos + 1..pos + 3)
            .map(|hex| hex.iter().all(u8::is_ascii_hexdigit))
            .unwrap_or(false);
        if !valid {
            return Err(Error::MalformedConnectionString(format!(
                "invalid escape sequence at offset {}",
                pos
            )));
        }
    }

    let decoded = percent_decode_str(raw).decode_utf8().map_err(|_| {
        Error::MalformedConnectionString("escaped value is not valid UTF-8".to_string())
    })?;

    Ok(decoded.replace(' ', "+"))
}
