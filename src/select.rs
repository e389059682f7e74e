//!
//! Picks the certificate and private key returned from an archive
//!
use cms::cert::x509::spki::AlgorithmIdentifierOwned;
use log::debug;

use crate::{Result, cert::Certificate, codec, error::Error, key::PrivateKey, navigator::Bag};

/// Certificate and optional private key chosen from an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub certificate: Certificate,
    pub private_key: Option<PrivateKey>,
}

/// Selects the first certificate bag and the first key candidate.
///
/// Key candidates are all shrouded keys (decrypted with `password`) followed by all plain keys,
/// each group in archive order. Every shrouded key must decrypt, otherwise the whole selection
/// fails with [Error::KeyDecryptionFailed].
pub fn select(bags: Vec<Bag>, password: &str) -> Result<Selection> {
    let mut certificate = None;
    let mut shrouded = Vec::new();
    let mut plain = Vec::new();

    for bag in bags {
        match bag {
            Bag::Certificate { der, .. } => {
                if certificate.is_none() {
                    certificate = Some(der);
                }
            }
            Bag::ShroudedKey {
                algorithm, encrypted, ..
            } => shrouded.push((algorithm, encrypted)),
            Bag::PlainKey { der, .. } => plain.push(der),
        }
    }

    let certificate = Certificate::from_der(&certificate.ok_or(Error::NoCertificateFound)?)?;

    let mut candidates = Vec::with_capacity(shrouded.len() + plain.len());
    for (algorithm, encrypted) in &shrouded {
        candidates.push(decrypt_key(algorithm, encrypted, password)?);
    }
    for der in &plain {
        candidates.push(PrivateKey::from_der(der)?);
    }

    debug!(
        "Selected certificate {}, {} shrouded and {} plain key candidates",
        certificate.subject(),
        shrouded.len(),
        plain.len()
    );

    Ok(Selection {
        certificate,
        private_key: candidates.into_iter().next(),
    })
}

/// Decrypts a PKCS#8-shrouded key bag payload
pub(crate) fn decrypt_key(algorithm: &AlgorithmIdentifierOwned, encrypted: &[u8], password: &str) -> Result<PrivateKey> {
    let decrypted = codec::decrypt(algorithm, encrypted, password)?;
    PrivateKey::from_der(&decrypted)
        .map_err(|_| Error::KeyDecryptionFailed("decrypted data is not a PKCS#8 private key".into()))
}

#[cfg(test)]
mod tests {
    use der::Decode;
    use pkcs12::pbe_params::EncryptedPrivateKeyInfo;

    use super::*;
    use crate::{navigator::BagAttributes, writer::EncryptionAlgorithm};

    const LEAF_DER: &[u8] = include_bytes!("../tests/assets/leaf.der");
    const OTHER_PEM: &str = include_str!("../tests/assets/other.pem");
    const LEAF_KEY: &[u8] = include_bytes!("../tests/assets/leaf.pk8");
    const OTHER_KEY: &[u8] = include_bytes!("../tests/assets/other.pk8");
    const PASSWORD: &str = "pw";

    fn other_der() -> Vec<u8> {
        pem_rfc7468::decode_vec(OTHER_PEM.as_bytes()).unwrap().1
    }

    fn cert_bag(der: &[u8]) -> Bag {
        Bag::Certificate {
            der: der.to_vec(),
            attributes: BagAttributes::default(),
        }
    }

    fn plain_bag(der: &[u8]) -> Bag {
        Bag::PlainKey {
            der: der.to_vec(),
            attributes: BagAttributes::default(),
        }
    }

    fn shrouded_bag(der: &[u8]) -> Bag {
        let key = PrivateKey::from_der(der).unwrap();
        let bag = codec::shrouded_key_to_safe_bag(
            &key,
            None,
            None,
            EncryptionAlgorithm::PbeWithHmacSha256AndAes256,
            100,
            PASSWORD,
        )
        .unwrap();
        let info = EncryptedPrivateKeyInfo::from_der(&bag.bag_value).unwrap();

        Bag::ShroudedKey {
            algorithm: info.encryption_algorithm,
            encrypted: info.encrypted_data.into_bytes(),
            attributes: BagAttributes::default(),
        }
    }

    #[test]
    fn test_first_certificate_wins() {
        let other = other_der();

        let selection = select(vec![cert_bag(LEAF_DER), cert_bag(&other)], "").unwrap();
        assert_eq!(selection.certificate.subject(), "CN=leaf.test");
        assert!(selection.private_key.is_none());

        let selection = select(vec![cert_bag(&other), cert_bag(LEAF_DER)], "").unwrap();
        assert_eq!(selection.certificate.subject(), "CN=other.test");
    }

    #[test]
    fn test_no_certificate() {
        assert!(matches!(select(vec![], ""), Err(Error::NoCertificateFound)));
        assert!(matches!(
            select(vec![plain_bag(LEAF_KEY)], ""),
            Err(Error::NoCertificateFound)
        ));
    }

    #[test]
    fn test_plain_key_selected() {
        let selection = select(vec![plain_bag(LEAF_KEY), cert_bag(LEAF_DER)], "").unwrap();
        assert_eq!(selection.private_key.unwrap().as_der(), LEAF_KEY);
    }

    #[test]
    fn test_shrouded_key_before_plain() {
        let bags = vec![plain_bag(OTHER_KEY), cert_bag(LEAF_DER), shrouded_bag(LEAF_KEY)];
        let selection = select(bags, PASSWORD).unwrap();
        assert_eq!(selection.private_key.unwrap().as_der(), LEAF_KEY);
    }

    #[test]
    fn test_first_shrouded_key_wins() {
        let bags = vec![cert_bag(LEAF_DER), shrouded_bag(OTHER_KEY), shrouded_bag(LEAF_KEY)];
        let selection = select(bags, PASSWORD).unwrap();
        assert_eq!(selection.private_key.unwrap().as_der(), OTHER_KEY);
    }

    #[test]
    fn test_wrong_password() {
        let bags = vec![cert_bag(LEAF_DER), shrouded_bag(LEAF_KEY), plain_bag(OTHER_KEY)];
        assert!(matches!(select(bags, "wrong"), Err(Error::KeyDecryptionFailed(_))));
    }

    #[cfg(feature = "pbes1")]
    #[test]
    fn test_missing_pbe_parameters() {
        let bag = Bag::ShroudedKey {
            algorithm: AlgorithmIdentifierOwned {
                oid: crate::oid::PBE_WITH_SHA_AND3_KEY_TRIPLE_DES_CBC_OID,
                parameters: None,
            },
            encrypted: vec![0; 16],
            attributes: BagAttributes::default(),
        };
        assert!(matches!(
            select(vec![cert_bag(LEAF_DER), bag], PASSWORD),
            Err(Error::MalformedContainer(_))
        ));
    }
}
