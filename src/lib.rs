//!
//! Convert PKCS#12/PFX archives and DER certificates into PEM, written in pure Rust.
//!
//! The crate takes key material in whatever container it arrived in and produces a
//! [PemPair]: an unencrypted PKCS#8 `PRIVATE KEY` block (when the archive carries a key)
//! and the `CERTIFICATE` block of the leaf certificate.
//!
//! Conversion runs in four stages:
//!
//! * [navigator::navigate] decodes the PFX and classifies its safe bags into [Bag]s, in archive order
//! * [select::select] takes the first certificate bag and the first key candidate
//!   (shrouded keys first, then plain keys)
//! * [pem::encode] writes the selection as PEM
//! * [Converter] ties the stages together and holds the passphrase and MAC settings
//!
//! Inputs come from caller-supplied bytes, files, or a [KeyDatabase] via [RawContainer].
//!
//! Supported encryption schemes:
//!
//! * PBES2 (PBKDF2 + AES-CBC)
//! * `pbeWithSHAAnd3-KeyTripleDES-CBC` - legacy, `pbes1` feature
//! * `pbeWithSHAAnd40BitRC2-CBC` and `pbeWithSHAAnd128BitRC2-CBC` - legacy, `pbes1` feature
//!
//! The default passphrase [DEFAULT_PASSPHRASE] (`"root"`) exists for compatibility with existing
//! callers only. It is a weak secret: pass an explicit passphrase whenever possible.
//!
//! Certificate chains, expiry and signatures are not validated.
//!

mod cert;
mod codec;
pub mod converter;
pub mod error;
mod key;
pub mod keystore;
pub mod navigator;
mod oid;
#[cfg(feature = "pbes1")]
mod pbes1;
pub mod pem;
pub mod select;
pub mod source;
mod writer;

use std::path::Path;

/// Result type for conversion operations
pub type Result<T> = std::result::Result<T, error::Error>;

pub use cert::Certificate;
pub use converter::{Converter, DEFAULT_PASSPHRASE};
pub use key::{LocalKeyId, PrivateKey};
pub use keystore::{KeyDatabase, KeyEntry, Pkcs12KeyDatabase};
pub use navigator::{Bag, BagAttributes};
pub use pem::PemPair;
pub use source::{ContainerFormat, RawContainer};
pub use writer::{EncryptionAlgorithm, MacAlgorithm, Pkcs12Writer, Protection};

fn converter(passphrase: Option<&str>) -> Converter {
    match passphrase {
        Some(passphrase) => Converter::new().passphrase(passphrase),
        None => Converter::new(),
    }
}

/// Convert DER-encoded PKCS#12 data into PEM. `None` selects [DEFAULT_PASSPHRASE].
pub fn pkcs12_to_pem(data: &[u8], passphrase: Option<&str>) -> Result<PemPair> {
    converter(passphrase).convert_pkcs12(data)
}

/// Convert a bare DER-encoded X.509 certificate into a `CERTIFICATE` PEM block
pub fn certificate_to_pem(der: &[u8]) -> Result<String> {
    converter::decode_certificate(der)
}

/// Read a PKCS#12 file and convert it into PEM. `None` selects [DEFAULT_PASSPHRASE].
pub fn pkcs12_file_to_pem<P: AsRef<Path>>(path: P, passphrase: Option<&str>) -> Result<PemPair> {
    converter(passphrase).convert(&RawContainer::from_file(path, ContainerFormat::Pkcs12)?)
}

/// Export the archive stored under `label` and convert it into PEM.
///
/// The same passphrase protects the exported archive and decrypts it. `None` selects [DEFAULT_PASSPHRASE].
pub fn export_label_to_pem<D>(db: &D, label: &str, passphrase: Option<&str>) -> Result<PemPair>
where
    D: KeyDatabase + ?Sized,
{
    let passphrase = passphrase.unwrap_or(DEFAULT_PASSPHRASE);
    converter(Some(passphrase)).convert(&RawContainer::from_keystore(db, label, passphrase)?)
}

/// Export the certificate stored under `label` as a `CERTIFICATE` PEM block
pub fn export_certificate_to_pem<D>(db: &D, label: &str) -> Result<String>
where
    D: KeyDatabase + ?Sized,
{
    certificate_to_pem(RawContainer::certificate_from_keystore(db, label)?.as_bytes())
}
