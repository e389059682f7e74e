//!
//! Byte sources feeding the converter
//!
use std::{fmt, fs, path::Path};

use log::debug;

use crate::{Result, error::Error, keystore::KeyDatabase};

/// Format of the bytes held by a [RawContainer]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    /// DER-encoded PKCS#12 (PFX) archive
    Pkcs12,
    /// DER-encoded X.509 certificate without PKCS#12 wrapping
    Certificate,
}

/// Raw bytes tagged with their format
#[derive(Clone, PartialEq, Eq)]
pub struct RawContainer {
    data: Vec<u8>,
    format: ContainerFormat,
}

impl RawContainer {
    /// Wrap caller-supplied bytes
    pub fn from_bytes<B: Into<Vec<u8>>>(data: B, format: ContainerFormat) -> Self {
        Self {
            data: data.into(),
            format,
        }
    }

    /// Read the whole file as raw binary
    pub fn from_file<P: AsRef<Path>>(path: P, format: ContainerFormat) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| Error::from_io(path, e))?;
        debug!("Read {} bytes from {}", data.len(), path.display());
        Ok(Self::from_bytes(data, format))
    }

    /// Export the PKCS#12 archive stored under `label`, protected by `passphrase`
    pub fn from_keystore<D>(db: &D, label: &str, passphrase: &str) -> Result<Self>
    where
        D: KeyDatabase + ?Sized,
    {
        Ok(Self::from_bytes(
            db.export_archive(label, passphrase)?,
            ContainerFormat::Pkcs12,
        ))
    }

    /// Export the bare certificate stored under `label`
    pub fn certificate_from_keystore<D>(db: &D, label: &str) -> Result<Self>
    where
        D: KeyDatabase + ?Sized,
    {
        Ok(Self::from_bytes(
            db.export_certificate(label)?,
            ContainerFormat::Certificate,
        ))
    }

    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl fmt::Debug for RawContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawContainer")
            .field("data", &format_args!("<{} bytes>", self.data.len()))
            .field("format", &self.format)
            .finish()
    }
}
