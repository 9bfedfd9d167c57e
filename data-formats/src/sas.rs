//! Shared access signature tokens.
//!
//! A token authorizes requests against one resource until its expiry:
//!
//! ```text
//! SharedAccessSignature sr=<resource>&sig=<signature>&se=<expiry>[&skn=<key name>]
//! ```
//!
//! The signature is the base64 HMAC-SHA256, keyed with the decoded shared
//! access key, of `<resource> "\n" <expiry>`, where `<resource>` is the
//! lower-cased, URL-escaped resource identifier.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use openssl::{
    base64,
    hash::MessageDigest,
    memcmp,
    pkey::{PKey, Private},
    sign::Signer,
};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::constants::{MAX_TOKEN_VALIDITY_SECS, SAS_TOKEN_SCHEME, SHARED_ACCESS_KEY};
use crate::{Credentials, Error, Result};

// Everything but the unreserved characters gets escaped
const QUERY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub fn query_escape(value: &str) -> String {
    utf8_percent_encode(value, QUERY_ESCAPE).to_string()
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasToken {
    resource_uri: String,
    signature: String,
    expiry: u64,
    key_name: Option<String>,
}

impl SasToken {
    /// The escaped resource identifier this token was signed for.
    pub fn resource_uri(&self) -> &str {
        &self.resource_uri
    }

    /// The escaped base64 signature.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn expiry(&self) -> u64 {
        self.expiry
    }

    pub fn key_name(&self) -> Option<&str> {
        self.key_name.as_deref()
    }
}

impl fmt::Display for SasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sr={}&sig={}&se={}",
            SAS_TOKEN_SCHEME, self.resource_uri, self.signature, self.expiry
        )?;
        if let Some(key_name) = &self.key_name {
            write!(f, "&skn={}", key_name)?;
        }
        Ok(())
    }
}

impl FromStr for SasToken {
    type Err = Error;

    fn from_str(token: &str) -> Result<Self> {
        let params = token
            .strip_prefix(SAS_TOKEN_SCHEME)
            .and_then(|rest| rest.strip_prefix(' '))
            .ok_or(Error::InvalidToken("missing SharedAccessSignature scheme"))?;

        let mut resource_uri = None;
        let mut signature = None;
        let mut expiry = None;
        let mut key_name = None;

        for param in params.split('&') {
            let (name, value) = param
                .split_once('=')
                .ok_or(Error::InvalidToken("parameter is not a key=value pair"))?;
            match name {
                "sr" => resource_uri = Some(value.to_string()),
                "sig" => signature = Some(value.to_string()),
                "se" => {
                    expiry = Some(
                        value
                            .parse::<u64>()
                            .map_err(|_| Error::InvalidToken("expiry is not a number"))?,
                    )
                }
                "skn" => key_name = Some(value.to_string()),
                _ => return Err(Error::InvalidToken("unknown parameter")),
            }
        }

        Ok(SasToken {
            resource_uri: resource_uri.ok_or(Error::InvalidToken("missing sr"))?,
            signature: signature.ok_or(Error::InvalidToken("missing sig"))?,
            expiry: expiry.ok_or(Error::InvalidToken("missing se"))?,
            key_name,
        })
    }
}

/// Produces tokens from a decoded shared access key.
///
/// The key is decoded once, when the signer is built; a key that is not
/// valid base64 means no token could ever be valid, so it fails here rather
/// than on the first request.
pub struct TokenSigner {
    key: PKey<Private>,
    key_name: Option<String>,
    validity: Duration,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("key_name", &self.key_name)
            .field("validity", &self.validity)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(credentials: &Credentials, validity: Duration) -> Result<Self> {
        let encoded_key = credentials.shared_access_key();
        if encoded_key.is_empty() {
            return Err(Error::MissingField(SHARED_ACCESS_KEY));
        }
        let raw_key = base64::decode_block(encoded_key).map_err(|_| Error::InvalidKey)?;
        if validity.as_secs() > MAX_TOKEN_VALIDITY_SECS {
            return Err(Error::InvalidValidity(validity.as_secs()));
        }

        Ok(TokenSigner {
            key: PKey::hmac(&raw_key)?,
            key_name: credentials.shared_access_key_name().map(String::from),
            validity,
        })
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Signs `resource` with an expiry of `now + validity`.
    pub fn sign(&self, resource: &str, now: u64) -> Result<SasToken> {
        let expiry = now
            .checked_add(self.validity.as_secs())
            .ok_or(Error::InvalidValidity(self.validity.as_secs()))?;
        let resource_uri = query_escape(&resource.to_lowercase());
        let signature = query_escape(&self.compute_signature(&resource_uri, expiry)?);

        Ok(SasToken {
            resource_uri,
            signature,
            expiry,
            key_name: self.key_name.clone(),
        })
    }

    pub fn sign_now(&self, resource: &str) -> Result<SasToken> {
        self.sign(resource, unix_now())
    }

    /// Checks that `token` was signed with this signer's key and has not
    /// expired at `now`.
    pub fn verify(&self, token: &SasToken, now: u64) -> Result<()> {
        if token.expiry <= now {
            return Err(Error::InvalidToken("token has expired"));
        }
        if token.key_name != self.key_name {
            return Err(Error::InvalidToken("key name mismatch"));
        }

        let expected = self.compute_signature(&token.resource_uri, token.expiry)?;
        let received = percent_decode_str(&token.signature).collect::<Vec<u8>>();
        if received.len() != expected.len() || !memcmp::eq(expected.as_bytes(), &received) {
            return Err(Error::InvalidToken("signature mismatch"));
        }
        Ok(())
    }

    fn compute_signature(&self, encoded_resource: &str, expiry: u64) -> Result<String> {
        let mut signer = Signer::new(MessageDigest::sha256(), &self.key)?;
        signer.update(encoded_resource.as_bytes())?;
        signer.update(b"\n")?;
        signer.update(expiry.to_string().as_bytes())?;
        let digest = signer.sign_to_vec()?;

        Ok(base64::encode_block(&digest))
    }
}
