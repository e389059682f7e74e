//!
//! Key database collaborator: the narrow interface the converter needs, plus a
//! password-protected implementation persisted as a single PKCS#12 file
//!
use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
};

use log::{debug, warn};

use crate::{
    Result,
    cert::Certificate,
    error::Error,
    key::{LocalKeyId, PrivateKey},
    navigator::{self, Bag},
    select,
    writer::Pkcs12Writer,
};

/// Label-addressed store of certificates and private keys.
///
/// The converter only consumes the byte buffers produced by the export operations and has no
/// knowledge of the backend format.
pub trait KeyDatabase {
    /// Import the contents of a PKCS#12 archive under `label`, replacing any existing entry
    fn import_archive(&mut self, label: &str, pkcs12: &[u8], passphrase: &str) -> Result<()>;

    /// Export the entry under `label` as a PKCS#12 archive protected by `passphrase`
    fn export_archive(&self, label: &str, passphrase: &str) -> Result<Vec<u8>>;

    /// Export the leaf certificate of the entry under `label` in DER encoding
    fn export_certificate(&self, label: &str) -> Result<Vec<u8>>;

    /// Get all labels in the database
    fn labels(&self) -> Vec<String>;
}

/// KeyEntry holds an optional private key and a certificate chain, leaf first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    key: Option<PrivateKey>,
    local_key_id: Option<LocalKeyId>,
    certs: Vec<Certificate>,
}

impl KeyEntry {
    /// Get a private key
    pub fn key(&self) -> Option<&PrivateKey> {
        self.key.as_ref()
    }

    /// Get certificates
    pub fn certs(&self) -> &[Certificate] {
        &self.certs
    }

    /// Get local key id
    pub fn local_key_id(&self) -> Option<&LocalKeyId> {
        self.local_key_id.as_ref()
    }

    fn leaf(&self) -> Result<&Certificate> {
        self.certs.first().ok_or(Error::NoCertificateFound)
    }

    /// Only the leaf certificate carries the local key id
    fn add_to_writer(&self, mut writer: Pkcs12Writer, label: &str) -> Pkcs12Writer {
        for (i, cert) in self.certs.iter().enumerate() {
            let local_key_id = if i == 0 { self.local_key_id.clone() } else { None };
            writer = writer.add_certificate(cert.clone(), Some(label), local_key_id);
        }
        if let Some(key) = &self.key {
            writer = writer.add_private_key(key.clone(), Some(label), self.local_key_id.clone());
        }
        writer
    }

    fn from_bags(bags: Vec<Bag>, passphrase: &str) -> Result<Self> {
        let mut certs = Vec::new();
        let mut shrouded = Vec::new();
        let mut plain = Vec::new();

        for bag in bags {
            match bag {
                Bag::Certificate { der, attributes } => certs.push((Certificate::from_der(&der)?, attributes)),
                Bag::ShroudedKey {
                    algorithm,
                    encrypted,
                    attributes,
                } => shrouded.push((select::decrypt_key(&algorithm, &encrypted, passphrase)?, attributes)),
                Bag::PlainKey { der, attributes } => plain.push((PrivateKey::from_der(&der)?, attributes)),
            }
        }

        let key = shrouded.into_iter().chain(plain).next();
        let local_key_id = key.as_ref().and_then(|(_, a)| a.local_key_id.clone());

        let find_cert_by_key = |id: &LocalKeyId| {
            certs
                .iter()
                .find(|(_, a)| a.local_key_id.as_ref() == Some(id))
                .map(|(c, _)| c)
        };

        let leaf = local_key_id
            .as_ref()
            .and_then(find_cert_by_key)
            .or_else(|| certs.first().map(|(c, _)| c))
            .ok_or(Error::NoCertificateFound)?;

        let chain = build_chain(leaf, certs.iter().map(|(c, _)| c));

        Ok(Self {
            key: key.map(|(k, _)| k),
            local_key_id,
            certs: chain,
        })
    }
}

fn build_chain<'a, I>(leaf: &Certificate, certs: I) -> Vec<Certificate>
where
    I: Iterator<Item = &'a Certificate> + Clone,
{
    let find_issuer = |issuer: &str| certs.clone().find(|c| c.subject == issuer);

    let mut chain = vec![leaf.clone()];
    let mut entry = leaf;

    while !entry.is_self_signed() {
        match find_issuer(&entry.issuer) {
            // Avoid cycles and duplicates.
            Some(issuer) if !chain.contains(issuer) => {
                chain.push(issuer.clone());
                entry = issuer;
            }
            _ => break,
        }
    }
    chain
}

/// Key database stored as a password-protected PKCS#12 file.
/// Entries are keyed by label, written as the friendly name of their bags.
pub struct Pkcs12KeyDatabase {
    path: PathBuf,
    password: String,
    entries: BTreeMap<String, KeyEntry>,
}

impl Pkcs12KeyDatabase {
    /// Create a new empty database at `path`, overwriting any existing file
    pub fn create<P: AsRef<Path>>(path: P, password: &str) -> Result<Self> {
        let db = Self {
            path: path.as_ref().to_owned(),
            password: password.to_owned(),
            entries: BTreeMap::new(),
        };
        db.save()?;
        Ok(db)
    }

    /// Open an existing database, verifying its MAC with `password`
    pub fn open<P: AsRef<Path>>(path: P, password: &str) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| Error::from_io(path, e))?;

        let bags = navigator::navigate(&data, password, true)?;

        let mut groups: BTreeMap<String, Vec<Bag>> = BTreeMap::new();
        for bag in bags {
            match bag.attributes().friendly_name.clone() {
                Some(label) => groups.entry(label).or_default().push(bag),
                None => warn!("Skipping unlabeled bag in {}", path.display()),
            }
        }

        let mut entries = BTreeMap::new();
        for (label, bags) in groups {
            entries.insert(label, KeyEntry::from_bags(bags, password)?);
        }

        debug!("Opened {} with {} entries", path.display(), entries.len());

        Ok(Self {
            path: path.to_owned(),
            password: password.to_owned(),
            entries,
        })
    }

    /// Open the database at `path` if it exists, create it otherwise
    pub fn create_or_open<P: AsRef<Path>>(path: P, password: &str) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path, password)
        } else {
            Self::create(path, password)
        }
    }

    /// Persist all entries to the database file
    pub fn save(&self) -> Result<()> {
        self.write_entries(&self.entries)
    }

    fn write_entries(&self, entries: &BTreeMap<String, KeyEntry>) -> Result<()> {
        let mut writer = Pkcs12Writer::new();

        for (label, entry) in entries {
            writer = entry.add_to_writer(writer, label);
        }

        let data = writer.write(&self.password)?;
        fs::write(&self.path, data).map_err(|e| Error::KeystoreError(format!("{}: {e}", self.path.display())))?;
        Ok(())
    }

    /// Get an entry for a given label
    pub fn entry(&self, label: &str) -> Option<&KeyEntry> {
        self.entries.get(label)
    }

    /// Delete entry from the database
    pub fn delete_entry(&mut self, label: &str) -> Option<KeyEntry> {
        self.entries.remove(label)
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn get(&self, label: &str) -> Result<&KeyEntry> {
        self.entries
            .get(label)
            .ok_or_else(|| Error::LabelNotFound(label.to_owned()))
    }
}

impl KeyDatabase for Pkcs12KeyDatabase {
    fn import_archive(&mut self, label: &str, pkcs12: &[u8], passphrase: &str) -> Result<()> {
        let bags = navigator::navigate(pkcs12, passphrase, true)?;
        let mut entry = KeyEntry::from_bags(bags, passphrase)?;

        if entry.key.is_some() && entry.local_key_id.is_none() {
            entry.local_key_id = Some(LocalKeyId::from(label));
        }

        debug!(
            "Importing {} certificates under {label}, private key: {}",
            entry.certs.len(),
            entry.key.is_some()
        );

        // the in-memory entries change only once the file is written
        let mut entries = self.entries.clone();
        entries.insert(label.to_owned(), entry);
        self.write_entries(&entries)?;
        self.entries = entries;
        Ok(())
    }

    fn export_archive(&self, label: &str, passphrase: &str) -> Result<Vec<u8>> {
        self.get(label)?
            .add_to_writer(Pkcs12Writer::new(), label)
            .write(passphrase)
    }

    fn export_certificate(&self, label: &str) -> Result<Vec<u8>> {
        Ok(self.get(label)?.leaf()?.as_der().to_vec())
    }

    fn labels(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

impl fmt::Debug for Pkcs12KeyDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pkcs12KeyDatabase")
            .field("path", &self.path)
            .field("entries", &self.entries)
            .finish()
    }
}
