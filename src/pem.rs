//!
//! PEM serialization of the selected certificate and private key
//!
use std::fmt;

use pem_rfc7468::LineEnding;

use crate::{Result, cert::Certificate, key::PrivateKey};

pub(crate) const CERTIFICATE_LABEL: &str = "CERTIFICATE";
pub(crate) const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";

/// PEM-encoded result of a conversion
#[derive(Clone, PartialEq, Eq)]
pub struct PemPair {
    /// Unencrypted PKCS#8 `PRIVATE KEY` block, if the archive carried a key
    pub key: Option<String>,
    /// `CERTIFICATE` block of the leaf certificate
    pub cert: String,
}

impl PemPair {
    /// Get certificate PEM
    pub fn cert(&self) -> &str {
        &self.cert
    }

    /// Get private key PEM
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

impl fmt::Debug for PemPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PemPair")
            .field("key", &self.key.as_ref().map(|_| "<PRIVATE KEY>"))
            .field("cert", &self.cert)
            .finish()
    }
}

/// Base64 body wrapped at 64 columns, LF line endings
pub(crate) fn encode_block(label: &str, der: &[u8]) -> Result<String> {
    Ok(pem_rfc7468::encode_string(label, LineEnding::LF, der)?)
}

/// Serializes a certificate and an optional key. The key is always written unencrypted.
pub fn encode(cert: &Certificate, key: Option<&PrivateKey>) -> Result<PemPair> {
    Ok(PemPair {
        key: key.map(PrivateKey::to_pem).transpose()?,
        cert: cert.to_pem()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEAF_DER: &[u8] = include_bytes!("../tests/assets/leaf.der");
    const LEAF_PEM: &str = include_str!("../tests/assets/leaf.pem");
    const LEAF_KEY: &[u8] = include_bytes!("../tests/assets/leaf.pk8");
    const LEAF_KEY_PEM: &str = include_str!("../tests/assets/leaf.key");

    #[test]
    fn test_encode_pair() {
        let cert = Certificate::from_der(LEAF_DER).unwrap();
        let key = PrivateKey::from_der(LEAF_KEY).unwrap();

        let pair = encode(&cert, Some(&key)).unwrap();
        assert_eq!(pair.cert().trim_end(), LEAF_PEM.trim_end());
        assert_eq!(pair.key().unwrap().trim_end(), LEAF_KEY_PEM.trim_end());
    }

    #[test]
    fn test_encode_without_key() {
        let cert = Certificate::from_der(LEAF_DER).unwrap();
        let pair = encode(&cert, None).unwrap();
        assert!(pair.key.is_none());
        assert!(pair.cert.starts_with("-----BEGIN CERTIFICATE-----\n"));
    }

    #[test]
    fn test_line_width() {
        let pem = encode_block(CERTIFICATE_LABEL, LEAF_DER).unwrap();
        assert!(pem.lines().all(|line| line.len() <= 64));
        assert!(pem.trim_end().ends_with("-----END CERTIFICATE-----"));
    }

    #[test]
    fn test_debug_hides_key() {
        let pair = PemPair {
            key: Some(LEAF_KEY_PEM.to_owned()),
            cert: String::new(),
        };
        assert!(!format!("{pair:?}").contains("MIGHAgEA"));
    }
}
