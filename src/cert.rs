use std::fmt;

use crate::{Result, error::Error, pem};

/// X.509 certificate wrapper
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    pub(crate) data: Vec<u8>,
    pub(crate) subject: String,
    pub(crate) issuer: String,
}

impl Certificate {
    /// Create certificate from DER encoding. Trailing bytes after the certificate are rejected.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (rest, cert) =
            x509_parser::parse_x509_certificate(der).map_err(|e| Error::MalformedCertificate(e.to_string()))?;
        if !rest.is_empty() {
            return Err(Error::MalformedCertificate(format!(
                "{} trailing bytes after certificate",
                rest.len()
            )));
        }
        Ok(Self {
            data: der.to_vec(),
            subject: cert.subject.to_string(),
            issuer: cert.issuer.to_string(),
        })
    }

    /// Get certificate subject
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Get certificate issuer
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Get certificate data in DER encoding
    pub fn as_der(&self) -> &[u8] {
        &self.data
    }

    /// Encode certificate as a `CERTIFICATE` PEM block
    pub fn to_pem(&self) -> Result<String> {
        pem::encode_block(pem::CERTIFICATE_LABEL, &self.data)
    }

    pub(crate) fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("data", &"<X.509>")
            .field("subject", &self.subject)
            .field("issuer", &self.issuer)
            .finish()
    }
}
