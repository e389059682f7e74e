//!
//! Walks a PKCS#12 archive and classifies its safe bags
//!
use std::fmt;

use cms::{
    cert::x509::spki::AlgorithmIdentifierOwned,
    content_info::{CmsVersion, ContentInfo},
    encrypted_data::EncryptedData,
};
use der::{
    Any, Decode, Encode,
    asn1::{ContextSpecific, OctetString},
};
use log::{debug, warn};
use pkcs12::{
    authenticated_safe::AuthenticatedSafe,
    cert_type::CertBag,
    pbe_params::EncryptedPrivateKeyInfo,
    pfx::{Pfx, Version},
    safe_bag::SafeContents,
};

use crate::{Result, codec, error::Error, key::LocalKeyId, oid};

/// Attributes attached to a safe bag. Carried along but not used for selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BagAttributes {
    pub friendly_name: Option<String>,
    pub local_key_id: Option<LocalKeyId>,
}

/// One classified entry of a PKCS#12 archive
#[derive(Clone, PartialEq, Eq)]
pub enum Bag {
    /// X.509 certificate in DER encoding
    Certificate { der: Vec<u8>, attributes: BagAttributes },
    /// PKCS#8 private key encrypted with a password-based scheme
    ShroudedKey {
        algorithm: AlgorithmIdentifierOwned,
        encrypted: Vec<u8>,
        attributes: BagAttributes,
    },
    /// Unencrypted PKCS#8 private key in DER encoding
    PlainKey { der: Vec<u8>, attributes: BagAttributes },
}

impl Bag {
    pub fn attributes(&self) -> &BagAttributes {
        match self {
            Bag::Certificate { attributes, .. }
            | Bag::ShroudedKey { attributes, .. }
            | Bag::PlainKey { attributes, .. } => attributes,
        }
    }
}

impl fmt::Debug for Bag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bag::Certificate { attributes, .. } => f
                .debug_struct("Certificate")
                .field("der", &"<X.509>")
                .field("attributes", attributes)
                .finish(),
            Bag::ShroudedKey {
                algorithm, attributes, ..
            } => f
                .debug_struct("ShroudedKey")
                .field("algorithm", &algorithm.oid)
                .field("encrypted", &"<encrypted PKCS#8>")
                .field("attributes", attributes)
                .finish(),
            Bag::PlainKey { attributes, .. } => f
                .debug_struct("PlainKey")
                .field("der", &"<PKCS#8>")
                .field("attributes", attributes)
                .finish(),
        }
    }
}

/// Decodes a DER-encoded PFX and returns its bags in archive order.
///
/// Encrypted safe contents are decrypted with `password`. The archive MAC is checked only
/// when `verify_mac` is set and the archive carries one.
///
/// Bags of other kinds (CRL, secret, nested safe contents) and certificate bags whose type is
/// not X.509 are skipped with a warning instead of failing the archive.
pub fn navigate(data: &[u8], password: &str, verify_mac: bool) -> Result<Vec<Bag>> {
    let pfx = Pfx::from_der(data)?;

    if pfx.version != Version::V3 {
        return Err(Error::MalformedContainer("invalid PFX version".into()));
    }

    if pfx.auth_safe.content_type != oid::CONTENT_TYPE_DATA_OID {
        return Err(Error::MalformedContainer(format!(
            "unsupported authSafe content type {}",
            pfx.auth_safe.content_type
        )));
    }

    let auth_safe_data = OctetString::from_der(&pfx.auth_safe.content.to_der()?)?.into_bytes();

    match (verify_mac, &pfx.mac_data) {
        (true, Some(mac_data)) => {
            codec::verify_mac(mac_data, password, &auth_safe_data)?;
            debug!("PFX MAC verified");
        }
        (true, None) => debug!("PFX carries no MAC, skipping verification"),
        (false, _) => {}
    }

    let safes: AuthenticatedSafe = AuthenticatedSafe::from_der(&auth_safe_data)?;

    let mut bags = Vec::new();
    for safe in safes.iter() {
        bags.extend(parse_safe(safe, password)?);
    }

    debug!("Found {} bags in {} safe contents", bags.len(), safes.len());

    Ok(bags)
}

fn parse_safe(safe: &ContentInfo, password: &str) -> Result<Vec<Bag>> {
    match safe.content_type {
        oid::CONTENT_TYPE_DATA_OID => {
            let data = OctetString::from_der(&safe.content.to_der()?)?.into_bytes();
            parse_bags(SafeContents::from_der(&data)?)
        }
        oid::CONTENT_TYPE_ENCRYPTED_DATA_OID => {
            let enc_data = EncryptedData::from_der(&safe.content.to_der()?)?;
            if enc_data.version != CmsVersion::V0 {
                return Err(Error::MalformedContainer("invalid EncryptedData version".into()));
            }

            let Some(encrypted) = enc_data.enc_content_info.encrypted_content.as_ref() else {
                return Ok(Vec::new());
            };

            debug!(
                "Decrypting safe contents with {}",
                enc_data.enc_content_info.content_enc_alg.oid
            );

            let data = codec::decrypt(&enc_data.enc_content_info.content_enc_alg, encrypted.as_bytes(), password)?;

            // garbage that happens to unpad cleanly still means the password was wrong
            let contents = SafeContents::from_der(&data)
                .map_err(|e| Error::KeyDecryptionFailed(format!("decrypted safe contents are invalid: {e}")))?;

            parse_bags(contents)
        }
        other => Err(Error::MalformedContainer(format!("unsupported content type {other}"))),
    }
}

fn parse_bags(contents: SafeContents) -> Result<Vec<Bag>> {
    let mut bags = Vec::with_capacity(contents.len());

    for bag in contents {
        let attributes = BagAttributes {
            friendly_name: codec::bag_friendly_name(&bag),
            local_key_id: codec::bag_local_key_id(&bag),
        };

        match bag.bag_id {
            oid::PKCS_12_CERT_BAG_OID => {
                let cs: ContextSpecific<CertBag> = ContextSpecific::from_der(&bag.bag_value)?;
                if cs.value.cert_id != oid::CERT_TYPE_X509_CERTIFICATE_OID {
                    warn!("Skipping certificate bag of type {}", cs.value.cert_id);
                    continue;
                }
                bags.push(Bag::Certificate {
                    der: cs.value.cert_value.into_bytes(),
                    attributes,
                });
            }
            oid::PKCS_12_PKCS8_KEY_BAG_OID => {
                let cs: ContextSpecific<EncryptedPrivateKeyInfo> = ContextSpecific::from_der(&bag.bag_value)?;
                bags.push(Bag::ShroudedKey {
                    algorithm: cs.value.encryption_algorithm,
                    encrypted: cs.value.encrypted_data.into_bytes(),
                    attributes,
                });
            }
            oid::PKCS_12_KEY_BAG_OID => {
                let cs: ContextSpecific<Any> = ContextSpecific::from_der(&bag.bag_value)?;
                bags.push(Bag::PlainKey {
                    der: cs.value.to_der()?,
                    attributes,
                });
            }
            other => warn!("Skipping unsupported bag type {other}"),
        }
    }

    Ok(bags)
}
