use std::fmt;

use log::{debug, warn};

use crate::{
    Result,
    cert::Certificate,
    navigator, pem,
    pem::PemPair,
    select,
    source::{ContainerFormat, RawContainer},
};

/// Passphrase used when the caller does not supply one.
///
/// Kept for compatibility with existing callers. It is a weak secret and should be overridden.
pub const DEFAULT_PASSPHRASE: &str = "root";

/// Conversion settings for PKCS#12 and DER inputs.
///
/// Stateless between calls: the same converter can be shared across threads.
#[derive(Clone, PartialEq, Eq)]
pub struct Converter {
    passphrase: String,
    verify_mac: bool,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter {
    /// Create converter with [DEFAULT_PASSPHRASE] and MAC verification disabled
    pub fn new() -> Self {
        Self {
            passphrase: DEFAULT_PASSPHRASE.to_owned(),
            verify_mac: false,
        }
    }

    /// Set passphrase used to decrypt the archive
    pub fn passphrase<S: Into<String>>(mut self, passphrase: S) -> Self {
        self.passphrase = passphrase.into();
        self
    }

    /// Verify the archive MAC before reading its contents. Default is false
    pub fn verify_mac(mut self, verify: bool) -> Self {
        self.verify_mac = verify;
        self
    }

    /// Convert a raw container according to its format tag
    pub fn convert(&self, container: &RawContainer) -> Result<PemPair> {
        match container.format() {
            ContainerFormat::Pkcs12 => self.convert_pkcs12(container.as_bytes()),
            ContainerFormat::Certificate => Ok(PemPair {
                key: None,
                cert: decode_certificate(container.as_bytes())?,
            }),
        }
    }

    /// Convert DER-encoded PKCS#12 data into a PEM key/certificate pair
    pub fn convert_pkcs12(&self, data: &[u8]) -> Result<PemPair> {
        if self.passphrase == DEFAULT_PASSPHRASE {
            warn!("Using the built-in default passphrase");
        }

        let bags = navigator::navigate(data, &self.passphrase, self.verify_mac)?;
        let selection = select::select(bags, &self.passphrase)?;

        debug!(
            "Encoding certificate {} with{} private key",
            selection.certificate.subject(),
            if selection.private_key.is_some() { "" } else { "out" }
        );

        pem::encode(&selection.certificate, selection.private_key.as_ref())
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("passphrase", &"<redacted>")
            .field("verify_mac", &self.verify_mac)
            .finish()
    }
}

/// Convert a bare DER certificate into a `CERTIFICATE` PEM block
pub fn decode_certificate(der: &[u8]) -> Result<String> {
    Certificate::from_der(der)?.to_pem()
}
