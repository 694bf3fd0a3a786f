//! Shared fixtures for the ceremony tests - dynamically generated keys,
//! attestation certificates and authenticator data assemblies.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use openssl::asn1;
use openssl::bn;
use openssl::ec;
use openssl::hash;
use openssl::nid;
use openssl::pkey;
use openssl::rsa;
use openssl::sign;
use openssl::x509::extension::{BasicConstraints, ExtendedKeyUsage, KeyUsage};
use openssl::x509::{X509, X509NameBuilder};

use crate::core::{TpmDeviceProperty, TpmDevicePropertyDecoder};
use crate::crypto::compute_sha256;
use crate::error::WebauthnResult;
use crate::proto::*;
use crate::tpm::testbuild;

/// A dynamically generated ES256 credential key pair.
pub(crate) struct TestCredential {
    key: pkey::PKey<pkey::Private>,
    cose: COSEKey,
    cred_id: Vec<u8>,
}

impl TestCredential {
    pub(crate) fn new_es256() -> Self {
        let group = ec::EcGroup::from_curve_name(nid::Nid::X9_62_PRIME256V1).unwrap();
        let eckey = ec::EcKey::generate(&group).unwrap();

        let mut ctx = bn::BigNumContext::new().unwrap();
        let mut xbn = bn::BigNum::new().unwrap();
        let mut ybn = bn::BigNum::new().unwrap();
        eckey
            .public_key()
            .affine_coordinates_gfp(&group, &mut xbn, &mut ybn, &mut ctx)
            .unwrap();

        let cose = COSEKey {
            type_: COSEAlgorithm::ES256,
            key: COSEKeyType::EC_EC2(COSEEC2Key {
                curve: ECDSACurve::SECP256R1,
                x: xbn.to_vec_padded(32).unwrap().into(),
                y: ybn.to_vec_padded(32).unwrap().into(),
            }),
        };

        let key = pkey::PKey::from_ec_key(eckey).unwrap();

        TestCredential {
            key,
            cose,
            cred_id: vec![0x42; 64],
        }
    }

    pub(crate) fn cose_key(&self) -> &COSEKey {
        &self.cose
    }

    pub(crate) fn credential_id(&self) -> &[u8] {
        &self.cred_id
    }

    pub(crate) fn acd(&self) -> AttestedCredentialData {
        AttestedCredentialData {
            aaguid: [0u8; 16],
            credential_id: self.cred_id.clone().into(),
            credential_pk: self.cose.clone(),
        }
    }

    pub(crate) fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut signer = sign::Signer::new(hash::MessageDigest::sha256(), &self.key).unwrap();
        signer.update(data).unwrap();
        signer.sign_to_vec().unwrap()
    }

    /// Minimal authenticator data bytes for attestation level tests -
    /// rpIdHash, UP|UV|AT flags, zero counter.
    pub(crate) fn auth_data_bytes(&self, rp_id: &str) -> Vec<u8> {
        let mut out = compute_sha256(rp_id.as_bytes()).to_vec();
        out.push(0x45);
        out.extend_from_slice(&0u32.to_be_bytes());
        out
    }

    pub(crate) fn stored_credential(&self, counter: u32) -> Credential {
        Credential {
            cred_id: self.cred_id.clone(),
            cred: self.cose.clone(),
            counter,
            transports: None,
        }
    }
}

fn flags_byte(user_present: bool, user_verified: bool, attested: bool) -> u8 {
    let mut flags = 0u8;
    if user_present {
        flags |= 0x01;
    }
    if user_verified {
        flags |= 0x04;
    }
    if attested {
        flags |= 0x40;
    }
    flags
}

/// Assemble registration authenticator data and a consistent byte encoding.
pub(crate) fn registration_auth_data(
    acd: AttestedCredentialData,
    rp_id: &str,
    user_present: bool,
    user_verified: bool,
) -> (AuthenticatorData<Registration>, Vec<u8>) {
    let rp_id_hash = compute_sha256(rp_id.as_bytes());

    let mut bytes = rp_id_hash.to_vec();
    bytes.push(flags_byte(user_present, user_verified, true));
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(&acd.aaguid);
    bytes.extend_from_slice(&(acd.credential_id.0.len() as u16).to_be_bytes());
    bytes.extend_from_slice(&acd.credential_id.0);

    let auth_data = AuthenticatorData {
        rp_id_hash,
        user_present,
        user_verified,
        backup_eligible: false,
        backup_state: false,
        sign_count: 0,
        acd: Some(acd),
        extensions: None,
        marker: std::marker::PhantomData,
    };

    (auth_data, bytes)
}

/// Assemble assertion authenticator data and a consistent byte encoding.
pub(crate) fn assertion_auth_data(
    rp_id: &str,
    user_present: bool,
    user_verified: bool,
    sign_count: u32,
) -> (AuthenticatorData<Authentication>, Vec<u8>) {
    let rp_id_hash = compute_sha256(rp_id.as_bytes());

    let mut bytes = rp_id_hash.to_vec();
    bytes.push(flags_byte(user_present, user_verified, false));
    bytes.extend_from_slice(&sign_count.to_be_bytes());

    let auth_data = AuthenticatorData {
        rp_id_hash,
        user_present,
        user_verified,
        backup_eligible: false,
        backup_state: false,
        sign_count,
        acd: None,
        extensions: None,
        marker: std::marker::PhantomData,
    };

    (auth_data, bytes)
}

/// Build collected client data and the exact bytes it decodes from.
pub(crate) fn client_data(
    type_: &str,
    challenge: &[u8],
    origin: &str,
    cross_origin: Option<bool>,
    token_binding: Option<TokenBinding>,
) -> (CollectedClientData, Vec<u8>) {
    let client_data = CollectedClientData {
        type_: type_.to_string(),
        challenge: challenge.to_vec().into(),
        origin: origin.to_string(),
        cross_origin,
        token_binding,
    };
    let bytes = serde_json::to_vec(&client_data).unwrap();
    (client_data, bytes)
}

/// A self signed EC P-256 attestation certificate in the style of a U2F
/// vendor batch certificate. Acts as its own trust anchor.
pub(crate) struct TestAttestationCa {
    key: pkey::PKey<pkey::Private>,
    cert: X509,
}

impl TestAttestationCa {
    pub(crate) fn new_u2f_style() -> Self {
        let group = ec::EcGroup::from_curve_name(nid::Nid::X9_62_PRIME256V1).unwrap();
        let eckey = ec::EcKey::generate(&group).unwrap();
        let key = pkey::PKey::from_ec_key(eckey).unwrap();

        let mut x509_name = X509NameBuilder::new().unwrap();
        x509_name.append_entry_by_text("C", "AU").unwrap();
        x509_name
            .append_entry_by_text("O", "Webauthn Ceremony Test")
            .unwrap();
        x509_name
            .append_entry_by_text("OU", "Authenticator Attestation")
            .unwrap();
        x509_name
            .append_entry_by_text("CN", "Dynamic Batch Certificate")
            .unwrap();
        let x509_name = x509_name.build();

        let mut cert_builder = X509::builder().unwrap();
        // Yes, 2 actually means 3 here ...
        cert_builder.set_version(2).unwrap();

        let serial_number = bn::BigNum::from_u32(1)
            .and_then(|serial| serial.to_asn1_integer())
            .unwrap();
        cert_builder.set_serial_number(&serial_number).unwrap();
        cert_builder.set_subject_name(&x509_name).unwrap();
        cert_builder.set_issuer_name(&x509_name).unwrap();

        let not_before = asn1::Asn1Time::days_from_now(0).unwrap();
        cert_builder.set_not_before(&not_before).unwrap();
        let not_after = asn1::Asn1Time::days_from_now(1).unwrap();
        cert_builder.set_not_after(&not_after).unwrap();

        cert_builder.set_pubkey(&key).unwrap();
        cert_builder
            .sign(&key, hash::MessageDigest::sha256())
            .unwrap();
        let cert = cert_builder.build();

        TestAttestationCa { key, cert }
    }

    pub(crate) fn cert(&self) -> X509 {
        self.cert.clone()
    }

    pub(crate) fn cert_der(&self) -> Vec<u8> {
        self.cert.to_der().unwrap()
    }

    pub(crate) fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut signer = sign::Signer::new(hash::MessageDigest::sha256(), &self.key).unwrap();
        signer.update(data).unwrap();
        signer.sign_to_vec().unwrap()
    }
}

/// A TPM attestation fixture - a CA, an AIK certificate meeting the §8.3.1
/// requirements, and an RSA credential key.
pub(crate) struct TestTpmAttestation {
    pub acd: AttestedCredentialData,
    pub att_stmt: TpmAttestationStatement,
    pub ca_cert: X509,
}

/// Build a complete tpm attestation over the supplied authenticator data
/// bytes and client data hash.
pub(crate) fn build_tpm_rsa_attestation_over(
    auth_data_bytes: &[u8],
    client_data_hash: &[u8; 32],
) -> TestTpmAttestation {
    // The CA that issues the AIK certificate.
    let ca_group = ec::EcGroup::from_curve_name(nid::Nid::X9_62_PRIME256V1).unwrap();
    let ca_eckey = ec::EcKey::generate(&ca_group).unwrap();
    let ca_key = pkey::PKey::from_ec_key(ca_eckey).unwrap();

    let mut ca_name = X509NameBuilder::new().unwrap();
    ca_name.append_entry_by_text("C", "AU").unwrap();
    ca_name
        .append_entry_by_text("O", "Webauthn Ceremony Test")
        .unwrap();
    ca_name.append_entry_by_text("CN", "TPM Test Root").unwrap();
    let ca_name = ca_name.build();

    let mut ca_builder = X509::builder().unwrap();
    ca_builder.set_version(2).unwrap();
    let serial = bn::BigNum::from_u32(1)
        .and_then(|s| s.to_asn1_integer())
        .unwrap();
    ca_builder.set_serial_number(&serial).unwrap();
    ca_builder.set_subject_name(&ca_name).unwrap();
    ca_builder.set_issuer_name(&ca_name).unwrap();
    ca_builder
        .set_not_before(&asn1::Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    ca_builder
        .set_not_after(&asn1::Asn1Time::days_from_now(1).unwrap())
        .unwrap();
    ca_builder
        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();
    ca_builder
        .append_extension(
            KeyUsage::new()
                .critical()
                .key_cert_sign()
                .crl_sign()
                .build()
                .unwrap(),
        )
        .unwrap();
    ca_builder.set_pubkey(&ca_key).unwrap();
    ca_builder.sign(&ca_key, hash::MessageDigest::sha256()).unwrap();
    let ca_cert = ca_builder.build();

    // The AIK - an RSA key whose certificate has an empty subject, the AIK
    // EKU, and CA false.
    let aik_rsa = rsa::Rsa::generate(2048).unwrap();
    let aik_key = pkey::PKey::from_rsa(aik_rsa).unwrap();

    let empty_name = X509NameBuilder::new().unwrap().build();

    let mut aik_builder = X509::builder().unwrap();
    aik_builder.set_version(2).unwrap();
    let serial = bn::BigNum::from_u32(2)
        .and_then(|s| s.to_asn1_integer())
        .unwrap();
    aik_builder.set_serial_number(&serial).unwrap();
    aik_builder.set_subject_name(&empty_name).unwrap();
    aik_builder.set_issuer_name(ca_cert.subject_name()).unwrap();
    aik_builder
        .set_not_before(&asn1::Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    aik_builder
        .set_not_after(&asn1::Asn1Time::days_from_now(1).unwrap())
        .unwrap();
    aik_builder
        .append_extension(BasicConstraints::new().build().unwrap())
        .unwrap();
    aik_builder
        .append_extension(ExtendedKeyUsage::new().other("2.23.133.8.3").build().unwrap())
        .unwrap();
    aik_builder.set_pubkey(&aik_key).unwrap();
    aik_builder.sign(&ca_key, hash::MessageDigest::sha256()).unwrap();
    let aik_cert = aik_builder.build();

    // The credential key the TPM attests - pubArea encodes it.
    let cred_rsa = rsa::Rsa::generate(2048).unwrap();
    let modulus = cred_rsa.n().to_vec();

    let cose = COSEKey {
        type_: COSEAlgorithm::RS256,
        key: COSEKeyType::RSA(COSERSAKey {
            n: modulus.clone().into(),
            e: [0x01, 0x00, 0x01],
        }),
    };

    let pub_area = testbuild::rsa_pub_area(&modulus, 0);

    // name = nameAlg prefix || H_nameAlg(pubArea)
    let mut name = vec![0x00, 0x0b];
    name.extend_from_slice(&compute_sha256(&pub_area));

    // extraData = H_alg(authData || clientDataHash), alg RS256 -> SHA-256
    let att_to_be_signed: Vec<u8> = auth_data_bytes
        .iter()
        .chain(client_data_hash.iter())
        .copied()
        .collect();
    let extra_data = compute_sha256(&att_to_be_signed);

    let cert_info = testbuild::attest_certify(0xff54_4347, 0x8017, &extra_data, &name);

    let mut signer = sign::Signer::new(hash::MessageDigest::sha256(), &aik_key).unwrap();
    signer.update(&cert_info).unwrap();
    let sig = signer.sign_to_vec().unwrap();

    let att_stmt = TpmAttestationStatement {
        ver: "2.0".to_string(),
        alg: COSEAlgorithm::RS256,
        x5c: Some(vec![aik_cert.to_der().unwrap()]),
        sig,
        cert_info,
        pub_area,
    };

    let acd = AttestedCredentialData {
        aaguid: [0u8; 16],
        credential_id: vec![0x55; 32].into(),
        credential_pk: cose,
    };

    TestTpmAttestation {
        acd,
        att_stmt,
        ca_cert,
    }
}

/// The attestation level convenience form - fixture over synthetic
/// authenticator data.
pub(crate) fn build_tpm_rsa_attestation() -> (
    AttestedCredentialData,
    TpmAttestationStatement,
    Vec<u8>,
    [u8; 32],
) {
    let mut auth_data_bytes = compute_sha256(b"example.com").to_vec();
    auth_data_bytes.push(0x45);
    auth_data_bytes.extend_from_slice(&0u32.to_be_bytes());
    let client_data_hash = [1u8; 32];

    let fixture = build_tpm_rsa_attestation_over(&auth_data_bytes, &client_data_hash);
    (
        fixture.acd,
        fixture.att_stmt,
        auth_data_bytes,
        client_data_hash,
    )
}

/// A [`TpmDevicePropertyDecoder`] that does not require a SAN on the AIK
/// certificate - tests inject it to exercise the decoder hook.
pub(crate) struct PermissiveTpmDecoder;

impl TpmDevicePropertyDecoder for PermissiveTpmDecoder {
    fn decode(&self, _aik_cert_der: &[u8]) -> WebauthnResult<TpmDeviceProperty> {
        Ok(TpmDeviceProperty {
            manufacturer: "id:FFFFF1D0".to_string(),
            model: "NPCT6xx".to_string(),
            version: "1.3".to_string(),
        })
    }
}
