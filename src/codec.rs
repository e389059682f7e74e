use cms::{
    cert::x509::{
        attr::{Attribute, AttributeValue, Attributes},
        spki::AlgorithmIdentifierOwned,
    },
    content_info::{CmsVersion, ContentInfo},
    encrypted_data::EncryptedData,
    enveloped_data::EncryptedContentInfo,
};
#[cfg(feature = "pbes1")]
use der::Sequence;
use der::{
    Any, Decode, Encode,
    asn1::{BmpString, ObjectIdentifier, OctetString, OctetStringRef, SetOfVec},
};
use hmac::{Mac, digest::Digest};
use pkcs5::pbes2;
use pkcs12::{
    cert_type::CertBag, digest_info::DigestInfo, kdf, mac_data::MacData, pbe_params::EncryptedPrivateKeyInfo,
    safe_bag::SafeBag,
};
use rand::random;
use sha1::Sha1;
use sha2::Sha256;

#[cfg(feature = "pbes1")]
use crate::pbes1::{PbeMode, Pbes1};
use crate::{
    Result,
    cert::Certificate,
    error::Error,
    key::{LocalKeyId, PrivateKey},
    oid,
    writer::{EncryptionAlgorithm, MacAlgorithm},
};

/// Parameters of the PKCS#12 PBE schemes (RFC 7292, appendix C)
#[cfg(feature = "pbes1")]
#[derive(Debug, Clone, PartialEq, Eq, Sequence)]
struct Pkcs12PbeParams {
    salt: OctetString,
    iterations: u64,
}

pub fn verify_mac(mac_data: &MacData, password: &str, data: &[u8]) -> Result<()> {
    match mac_data.mac.algorithm.oid {
        oid::SHA1_OID => {
            let key = kdf::derive_key_utf8::<Sha1>(
                password,
                mac_data.mac_salt.as_bytes(),
                kdf::Pkcs12KeyType::Mac,
                mac_data.iterations as _,
                Sha1::output_size(),
            )?;
            let mut hmac = hmac::Hmac::<Sha1>::new_from_slice(&key)
                .map_err(|_| Error::MalformedContainer("invalid MAC key length".into()))?;
            hmac.update(data);
            hmac.verify_slice(mac_data.mac.digest.as_bytes())?;
            Ok(())
        }
        oid::SHA256_OID => {
            let key = kdf::derive_key_utf8::<Sha256>(
                password,
                mac_data.mac_salt.as_bytes(),
                kdf::Pkcs12KeyType::Mac,
                mac_data.iterations as _,
                Sha256::output_size(),
            )?;
            let mut hmac = hmac::Hmac::<Sha256>::new_from_slice(&key)
                .map_err(|_| Error::MalformedContainer("invalid MAC key length".into()))?;
            hmac.update(data);
            hmac.verify_slice(mac_data.mac.digest.as_bytes())?;
            Ok(())
        }
        other => Err(Error::UnsupportedMacAlgorithm(other)),
    }
}

/// Decrypts a password-protected blob. Wrong passwords surface as [Error::KeyDecryptionFailed].
pub fn decrypt(alg: &AlgorithmIdentifierOwned, data: &[u8], password: &str) -> Result<Vec<u8>> {
    match alg.oid {
        oid::PBES2_OID => {
            let params = alg
                .parameters
                .as_ref()
                .ok_or_else(|| Error::MalformedContainer("missing PBES2 parameters".into()))?
                .to_der()?;

            let params = pbes2::Parameters::from_der(&params)?;

            params.decrypt(password.as_bytes(), data).map_err(|e| match e {
                pkcs5::Error::UnsupportedAlgorithm { oid } => Error::UnsupportedEncryptionScheme(oid),
                pkcs5::Error::AlgorithmParametersInvalid { oid } => {
                    Error::MalformedContainer(format!("invalid parameters for {oid}"))
                }
                other => Error::KeyDecryptionFailed(other.to_string()),
            })
        }
        #[cfg(feature = "pbes1")]
        oid::PBE_WITH_SHA_AND_40BIT_RC2_CBC_OID
        | oid::PBE_WITH_SHA_AND_128BIT_RC2_CBC_OID
        | oid::PBE_WITH_SHA_AND3_KEY_TRIPLE_DES_CBC_OID => {
            let params = alg
                .parameters
                .as_ref()
                .ok_or_else(|| Error::MalformedContainer("missing PBE parameters".into()))?
                .to_der()?;

            let params = Pkcs12PbeParams::from_der(&params)?;

            Pbes1::new(alg.oid, params.salt.as_bytes(), params.iterations, PbeMode::Decrypt)
                .encrypt_decrypt(data, password)
        }
        other => Err(Error::UnsupportedEncryptionScheme(other)),
    }
}

fn encrypt(
    alg: EncryptionAlgorithm,
    iterations: u64,
    data: &[u8],
    password: &str,
) -> Result<(AlgorithmIdentifierOwned, Vec<u8>)> {
    match alg {
        EncryptionAlgorithm::PbeWithHmacSha256AndAes256 => {
            let salt: [u8; 32] = random();
            let iv: [u8; 16] = random();
            let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(iterations as _, &salt, &iv)
                .map_err(|e| Error::KeystoreError(e.to_string()))?;

            let encrypted = params
                .encrypt(password.as_bytes(), data)
                .map_err(|e| Error::KeystoreError(format!("{e}")))?;

            let alg_id = AlgorithmIdentifierOwned {
                oid: alg.as_oid(),
                parameters: Some(Any::from_der(&params.to_der()?)?),
            };

            Ok((alg_id, encrypted))
        }
        #[cfg(feature = "pbes1")]
        EncryptionAlgorithm::PbeWithShaAnd40BitRc2Cbc | EncryptionAlgorithm::PbeWithShaAnd3KeyTripleDesCbc => {
            let salt: [u8; 20] = random();
            let encrypted =
                Pbes1::new(alg.as_oid(), &salt, iterations, PbeMode::Encrypt).encrypt_decrypt(data, password)?;

            let params = Pkcs12PbeParams {
                salt: OctetString::new(salt.to_vec())?,
                iterations,
            };

            let alg_id = AlgorithmIdentifierOwned {
                oid: alg.as_oid(),
                parameters: Some(Any::from_der(&params.to_der()?)?),
            };
            Ok((alg_id, encrypted))
        }
        #[cfg(not(feature = "pbes1"))]
        other => Err(Error::UnsupportedEncryptionScheme(other.as_oid())),
    }
}

fn get_bag_attribute(oid: &ObjectIdentifier, bag: &SafeBag) -> Option<Vec<u8>> {
    if let Some(ref attrs) = bag.bag_attributes {
        attrs.iter().find_map(|a| {
            if a.oid == *oid {
                a.values.iter().next().and_then(|a| a.to_der().ok())
            } else {
                None
            }
        })
    } else {
        None
    }
}

pub fn bag_friendly_name(bag: &SafeBag) -> Option<String> {
    get_bag_attribute(&oid::FRIENDLY_NAME_OID, bag).and_then(|n| BmpString::from_der(&n).ok().map(|a| a.to_string()))
}

pub fn bag_local_key_id(bag: &SafeBag) -> Option<LocalKeyId> {
    get_bag_attribute(&oid::LOCAL_KEY_ID_OID, bag)
        .and_then(|a| OctetString::from_der(&a).ok().map(|a| a.into_bytes().into()))
}

fn bag_attributes(friendly_name: Option<&str>, local_key_id: Option<&LocalKeyId>) -> Result<Option<Attributes>> {
    let mut bag_attributes = Attributes::new();

    if let Some(friendly_name) = friendly_name {
        let friendly_name = SetOfVec::<AttributeValue>::from_iter([Any::from_der(
            &BmpString::from_utf8(friendly_name)?.to_der()?,
        )?])?;

        bag_attributes.insert(Attribute {
            oid: oid::FRIENDLY_NAME_OID,
            values: friendly_name,
        })?;
    }

    if let Some(local_key_id) = local_key_id {
        let local_key_id = SetOfVec::<AttributeValue>::from_iter([Any::from_der(
            &OctetStringRef::new(local_key_id.as_ref())?.to_der()?,
        )?])?;

        bag_attributes.insert(Attribute {
            oid: oid::LOCAL_KEY_ID_OID,
            values: local_key_id,
        })?;
    }

    Ok(if bag_attributes.is_empty() {
        None
    } else {
        Some(bag_attributes)
    })
}

pub fn certificate_to_safe_bag(
    certificate: &Certificate,
    friendly_name: Option<&str>,
    local_key_id: Option<&LocalKeyId>,
) -> Result<SafeBag> {
    let cert_bag = CertBag {
        cert_id: oid::CERT_TYPE_X509_CERTIFICATE_OID,
        cert_value: OctetString::new(certificate.data.clone())?,
    };
    Ok(SafeBag {
        bag_id: oid::PKCS_12_CERT_BAG_OID,
        bag_value: cert_bag.to_der()?,
        bag_attributes: bag_attributes(friendly_name, local_key_id)?,
    })
}

pub fn shrouded_key_to_safe_bag(
    key: &PrivateKey,
    friendly_name: Option<&str>,
    local_key_id: Option<&LocalKeyId>,
    algorithm: EncryptionAlgorithm,
    iterations: u64,
    password: &str,
) -> Result<SafeBag> {
    let (alg_id, encrypted) = encrypt(algorithm, iterations, key.as_der(), password)?;

    let pk_info = EncryptedPrivateKeyInfo {
        encryption_algorithm: alg_id,
        encrypted_data: OctetString::new(encrypted)?,
    }
    .to_der()?;

    Ok(SafeBag {
        bag_id: oid::PKCS_12_PKCS8_KEY_BAG_OID,
        bag_value: pk_info,
        bag_attributes: bag_attributes(friendly_name, local_key_id)?,
    })
}

pub fn plain_key_to_safe_bag(
    key: &PrivateKey,
    friendly_name: Option<&str>,
    local_key_id: Option<&LocalKeyId>,
) -> Result<SafeBag> {
    Ok(SafeBag {
        bag_id: oid::PKCS_12_KEY_BAG_OID,
        bag_value: key.as_der().to_vec(),
        bag_attributes: bag_attributes(friendly_name, local_key_id)?,
    })
}

pub fn bags_to_encrypted_safe(
    bags: Vec<SafeBag>,
    algorithm: EncryptionAlgorithm,
    iterations: u64,
    password: &str,
) -> Result<ContentInfo> {
    let data = bags.to_der()?;
    let (alg_id, encrypted) = encrypt(algorithm, iterations, &data, password)?;

    let encrypted_data = EncryptedData {
        version: CmsVersion::V0,
        enc_content_info: EncryptedContentInfo {
            content_type: oid::CONTENT_TYPE_DATA_OID,
            content_enc_alg: alg_id,
            encrypted_content: Some(OctetString::new(encrypted)?),
        },
        unprotected_attrs: None,
    };

    Ok(ContentInfo {
        content_type: oid::CONTENT_TYPE_ENCRYPTED_DATA_OID,
        content: Any::from_der(&encrypted_data.to_der()?)?,
    })
}

pub fn bags_to_data_safe(bags: Vec<SafeBag>) -> Result<ContentInfo> {
    Ok(ContentInfo {
        content_type: oid::CONTENT_TYPE_DATA_OID,
        content: Any::from_der(&OctetString::new(bags.to_der()?)?.to_der()?)?,
    })
}

pub fn compute_mac(data: &[u8], algorithm: MacAlgorithm, iterations: u64, password: &str) -> Result<MacData> {
    let (oid, salt, digest) = match algorithm {
        MacAlgorithm::HmacSha1 => {
            let salt: [u8; 20] = random();
            let key = kdf::derive_key_utf8::<Sha1>(
                password,
                &salt,
                kdf::Pkcs12KeyType::Mac,
                iterations as _,
                Sha1::output_size(),
            )?;
            let mut hmac = hmac::Hmac::<Sha1>::new_from_slice(&key)
                .map_err(|_| Error::KeystoreError("invalid MAC key length".into()))?;
            hmac.update(data);
            (oid::SHA1_OID, salt.to_vec(), hmac.finalize().into_bytes().to_vec())
        }
        MacAlgorithm::HmacSha256 => {
            let salt: [u8; 32] = random();
            let key = kdf::derive_key_utf8::<Sha256>(
                password,
                &salt,
                kdf::Pkcs12KeyType::Mac,
                iterations as _,
                Sha256::output_size(),
            )?;
            let mut hmac = hmac::Hmac::<Sha256>::new_from_slice(&key)
                .map_err(|_| Error::KeystoreError("invalid MAC key length".into()))?;
            hmac.update(data);
            (oid::SHA256_OID, salt.to_vec(), hmac.finalize().into_bytes().to_vec())
        }
    };

    Ok(MacData {
        mac: DigestInfo {
            algorithm: AlgorithmIdentifierOwned { oid, parameters: None },
            digest: OctetString::new(digest)?,
        },
        mac_salt: OctetString::new(salt)?,
        iterations: iterations as _,
    })
}

#[cfg(test)]
mod tests {
    use der::{Decode, Encode, asn1::ContextSpecific};
    use pkcs12::safe_bag::SafeBag;

    use super::*;

    const LEAF_DER: &[u8] = include_bytes!("../tests/assets/leaf.der");
    const LEAF_KEY: &[u8] = include_bytes!("../tests/assets/leaf.pk8");
    const LEAF_DES_CBC: &[u8] = include_bytes!("../tests/assets/leaf-des-cbc.p8");
    const PASSWORD: &str = "changeit";

    #[test]
    fn test_bag_attributes_roundtrip() {
        let cert = Certificate::from_der(LEAF_DER).unwrap();
        let id = LocalKeyId::from("id-1");
        let bag = certificate_to_safe_bag(&cert, Some("my-label"), Some(&id)).unwrap();

        let parsed = SafeBag::from_der(&bag.to_der().unwrap()).unwrap();
        assert_eq!(bag_friendly_name(&parsed).as_deref(), Some("my-label"));
        assert_eq!(bag_local_key_id(&parsed), Some(id));
    }

    #[test]
    fn test_no_bag_attributes() {
        let cert = Certificate::from_der(LEAF_DER).unwrap();
        let bag = certificate_to_safe_bag(&cert, None, None).unwrap();
        assert!(bag.bag_attributes.is_none());
    }

    #[test]
    fn test_shrouded_key_decrypts() {
        let key = PrivateKey::from_der(LEAF_KEY).unwrap();
        let bag = shrouded_key_to_safe_bag(
            &key,
            None,
            None,
            EncryptionAlgorithm::PbeWithHmacSha256AndAes256,
            1000,
            PASSWORD,
        )
        .unwrap();

        let parsed = SafeBag::from_der(&bag.to_der().unwrap()).unwrap();
        let cs: ContextSpecific<EncryptedPrivateKeyInfo> = ContextSpecific::from_der(&parsed.bag_value).unwrap();

        let plain = decrypt(&cs.value.encryption_algorithm, cs.value.encrypted_data.as_bytes(), PASSWORD).unwrap();
        assert_eq!(plain, LEAF_KEY);

        let wrong = decrypt(&cs.value.encryption_algorithm, cs.value.encrypted_data.as_bytes(), "wrong");
        assert!(matches!(wrong, Err(Error::KeyDecryptionFailed(_))));
    }

    #[test]
    fn test_unsupported_pbes2_cipher() {
        let info = EncryptedPrivateKeyInfo::from_der(LEAF_DES_CBC).unwrap();

        for password in ["testpass", "wrong"] {
            match decrypt(&info.encryption_algorithm, info.encrypted_data.as_bytes(), password) {
                Err(Error::UnsupportedEncryptionScheme(oid)) => assert_eq!(oid.to_string(), "1.3.14.3.2.7"),
                other => panic!("unexpected result: {other:?}"),
            }
        }
    }

    #[test]
    fn test_mac_roundtrip() {
        let mac = compute_mac(b"payload", MacAlgorithm::HmacSha1, 100, PASSWORD).unwrap();
        verify_mac(&mac, PASSWORD, b"payload").unwrap();
        assert!(matches!(
            verify_mac(&mac, "other", b"payload"),
            Err(Error::MacVerificationFailed(_))
        ));

        let mac = compute_mac(b"payload", MacAlgorithm::HmacSha256, 100, PASSWORD).unwrap();
        assert!(verify_mac(&mac, PASSWORD, b"tampered").is_err());
    }
}
