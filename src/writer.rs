use cms::content_info::ContentInfo;
use der::{Any, Decode, Encode, asn1::OctetString, oid::ObjectIdentifier};
use pkcs12::pfx::{Pfx, Version};

use crate::{
    Result,
    cert::Certificate,
    codec,
    key::{LocalKeyId, PrivateKey},
    oid,
};

/// Encryption algorithm to use when creating the PKCS#12 file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum EncryptionAlgorithm {
    PbeWithHmacSha256AndAes256,
    PbeWithShaAnd40BitRc2Cbc,
    PbeWithShaAnd3KeyTripleDesCbc,
}

impl EncryptionAlgorithm {
    pub(crate) fn as_oid(&self) -> ObjectIdentifier {
        match self {
            EncryptionAlgorithm::PbeWithHmacSha256AndAes256 => oid::PBES2_OID,
            EncryptionAlgorithm::PbeWithShaAnd40BitRc2Cbc => oid::PBE_WITH_SHA_AND_40BIT_RC2_CBC_OID,
            EncryptionAlgorithm::PbeWithShaAnd3KeyTripleDesCbc => oid::PBE_WITH_SHA_AND3_KEY_TRIPLE_DES_CBC_OID,
        }
    }
}

/// MAC algorithm to use when creating the PKCS#12 file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum MacAlgorithm {
    HmacSha1,
    HmacSha256,
}

/// Whether bags are written password-protected or in the clear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protection {
    /// Certificates go to an encrypted safe, keys become shrouded key bags
    #[default]
    Encrypted,
    /// Certificates and plain key bags are stored unencrypted
    Plain,
}

#[derive(Debug, Clone)]
enum Entry {
    Certificate {
        cert: Certificate,
        friendly_name: Option<String>,
        local_key_id: Option<LocalKeyId>,
    },
    PrivateKey {
        key: PrivateKey,
        friendly_name: Option<String>,
        local_key_id: Option<LocalKeyId>,
    },
}

/// PKCS#12 writer. Certificates and keys are written in the order they were added.
#[derive(Debug, Clone)]
pub struct Pkcs12Writer {
    entries: Vec<Entry>,
    encryption_algorithm: EncryptionAlgorithm,
    encryption_iterations: u64,
    mac_algorithm: MacAlgorithm,
    mac_iterations: u64,
    protection: Protection,
}

impl Default for Pkcs12Writer {
    fn default() -> Self {
        Self::new()
    }
}

impl Pkcs12Writer {
    pub fn new() -> Self {
        // default values are taken from JVM java.security config file
        Self {
            entries: Vec::new(),
            encryption_algorithm: EncryptionAlgorithm::PbeWithHmacSha256AndAes256,
            encryption_iterations: 10000,
            mac_algorithm: MacAlgorithm::HmacSha256,
            mac_iterations: 10000,
            protection: Protection::Encrypted,
        }
    }

    /// Set encryption algorithm. Default is [EncryptionAlgorithm::PbeWithHmacSha256AndAes256]
    pub fn encryption_algorithm(mut self, algorithm: EncryptionAlgorithm) -> Self {
        self.encryption_algorithm = algorithm;
        self
    }

    /// Set encryption iterations. Default is 10000
    pub fn encryption_iterations(mut self, iterations: u64) -> Self {
        self.encryption_iterations = iterations;
        self
    }

    /// Set MAC algorithm. Default is [MacAlgorithm::HmacSha256]
    pub fn mac_algorithm(mut self, algorithm: MacAlgorithm) -> Self {
        self.mac_algorithm = algorithm;
        self
    }

    /// Set MAC iterations. Default is 10000
    pub fn mac_iterations(mut self, iterations: u64) -> Self {
        self.mac_iterations = iterations;
        self
    }

    /// Set bag protection. Default is [Protection::Encrypted]
    pub fn protection(mut self, protection: Protection) -> Self {
        self.protection = protection;
        self
    }

    /// Append a certificate bag
    pub fn add_certificate(
        mut self,
        cert: Certificate,
        friendly_name: Option<&str>,
        local_key_id: Option<LocalKeyId>,
    ) -> Self {
        self.entries.push(Entry::Certificate {
            cert,
            friendly_name: friendly_name.map(ToOwned::to_owned),
            local_key_id,
        });
        self
    }

    /// Append a private key bag
    pub fn add_private_key(
        mut self,
        key: PrivateKey,
        friendly_name: Option<&str>,
        local_key_id: Option<LocalKeyId>,
    ) -> Self {
        self.entries.push(Entry::PrivateKey {
            key,
            friendly_name: friendly_name.map(ToOwned::to_owned),
            local_key_id,
        });
        self
    }

    /// Write entries into PKCS#12 format, protected by `password`
    pub fn write(&self, password: &str) -> Result<Vec<u8>> {
        let mut cert_bags = Vec::new();
        let mut key_bags = Vec::new();

        for entry in &self.entries {
            match entry {
                Entry::Certificate {
                    cert,
                    friendly_name,
                    local_key_id,
                } => cert_bags.push(codec::certificate_to_safe_bag(
                    cert,
                    friendly_name.as_deref(),
                    local_key_id.as_ref(),
                )?),
                Entry::PrivateKey {
                    key,
                    friendly_name,
                    local_key_id,
                } => key_bags.push(match self.protection {
                    Protection::Encrypted => codec::shrouded_key_to_safe_bag(
                        key,
                        friendly_name.as_deref(),
                        local_key_id.as_ref(),
                        self.encryption_algorithm,
                        self.encryption_iterations,
                        password,
                    )?,
                    Protection::Plain => {
                        codec::plain_key_to_safe_bag(key, friendly_name.as_deref(), local_key_id.as_ref())?
                    }
                }),
            }
        }

        let mut safes = Vec::new();

        if !cert_bags.is_empty() {
            safes.push(match self.protection {
                Protection::Encrypted => codec::bags_to_encrypted_safe(
                    cert_bags,
                    self.encryption_algorithm,
                    self.encryption_iterations,
                    password,
                )?,
                Protection::Plain => codec::bags_to_data_safe(cert_bags)?,
            });
        }

        if !key_bags.is_empty() {
            safes.push(codec::bags_to_data_safe(key_bags)?);
        }

        let safe_bags = OctetString::new(safes.to_der()?)?;
        let auth_safe = ContentInfo {
            content_type: oid::CONTENT_TYPE_DATA_OID,
            content: Any::from_der(&safe_bags.to_der()?)?,
        };

        let mac_data = codec::compute_mac(
            auth_safe.content.value(),
            self.mac_algorithm,
            self.mac_iterations,
            password,
        )?;

        let pfx = Pfx {
            version: Version::V3,
            auth_safe,
            mac_data: Some(mac_data),
        };

        Ok(pfx.to_der()?)
    }
}
