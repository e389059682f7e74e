//!
//! [Error] enum definition
//!
use std::{io, path::PathBuf};

use der::asn1::ObjectIdentifier;
use hmac::digest::MacError;

/// Possible errors for conversion and keystore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed PKCS#12 container: {0}")]
    MalformedContainer(String),

    #[error("Malformed X.509 certificate: {0}")]
    MalformedCertificate(String),

    #[error("No certificate found in PKCS#12 container")]
    NoCertificateFound,

    #[error("Key decryption failed: {0}")]
    KeyDecryptionFailed(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Cannot read {}: {source}", path.display())]
    FileReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unsupported encryption scheme: {0}")]
    UnsupportedEncryptionScheme(ObjectIdentifier),

    #[error("MAC verification failed")]
    MacVerificationFailed(#[from] MacError),

    #[error("Unsupported MAC algorithm: {0}")]
    UnsupportedMacAlgorithm(ObjectIdentifier),

    #[error(transparent)]
    PemError(#[from] pem_rfc7468::Error),

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Label not found: {0}")]
    LabelNotFound(String),

    #[error("Keystore error: {0}")]
    KeystoreError(String),
}

impl From<der::Error> for Error {
    fn from(value: der::Error) -> Self {
        Error::MalformedContainer(value.to_string())
    }
}

impl Error {
    /// Maps an I/O error on `path` into [Error::FileNotFound] or [Error::FileReadError].
    pub(crate) fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            Error::FileNotFound(path)
        } else {
            Error::FileReadError { path, source }
        }
    }
}
