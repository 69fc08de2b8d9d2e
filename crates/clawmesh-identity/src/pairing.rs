//! `clawmesh-pair://` URIs — an out-of-band bootstrapping convenience for
//! adding a peer to the trust store, mirrored from the teacher's
//! `sven-pair://` scheme. This is sugar around [`crate::TrustStore::add`];
//! it establishes no trust by itself.

use std::fmt;

/// A parsed `clawmesh-pair://` URI: `clawmesh-pair://<deviceId>[/<host:port>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingUri {
    pub device_id: String,
    pub addr: Option<String>,
}

const SCHEME: &str = "clawmesh-pair://";

impl PairingUri {
    pub fn parse(uri: &str) -> Result<Self, PairingUriError> {
        let rest = uri
            .strip_prefix(SCHEME)
            .ok_or_else(|| PairingUriError::WrongScheme(uri.to_string()))?;

        let (device_id, addr) = match rest.find('/') {
            Some(pos) => (&rest[..pos], Some(rest[pos + 1..].to_string())),
            None => (rest, None),
        };

        if device_id.is_empty() || !device_id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PairingUriError::InvalidDeviceId(device_id.to_string()));
        }

        Ok(PairingUri {
            device_id: device_id.to_string(),
            addr: addr.filter(|s| !s.is_empty()),
        })
    }

    pub fn to_uri(&self) -> String {
        match &self.addr {
            Some(addr) => format!("{SCHEME}{}/{addr}", self.device_id),
            None => format!("{SCHEME}{}", self.device_id),
        }
    }

    /// A short, colon-separated hex fingerprint of the `deviceId` for human
    /// visual confirmation during pairing (the SSH-host-key-fingerprint
    /// equivalent).
    pub fn short_fingerprint(&self) -> String {
        self.device_id
            .as_bytes()
            .chunks(2)
            .take(4)
            .map(|pair| String::from_utf8_lossy(pair).to_uppercase())
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl fmt::Display for PairingUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PairingUriError {
    #[error("URI must start with {SCHEME}: {0}")]
    WrongScheme(String),
    #[error("invalid device id in pairing URI: {0:?}")]
    InvalidDeviceId(String),
}
