//! Attestation statement verification procedures. Each supported format has
//! a verification function that checks the statement against the signed
//! authenticator data and client data hash, and yields the
//! [`AttestationType`] the statement conveys together with its trust path.

use openssl::x509;
use x509_parser::oid_registry::Oid;

use crate::constants::*;
use crate::crypto::{
    assert_packed_attest_req, assert_tpm_attest_req, compute_sha256, only_hash_from_type,
    verify_signature,
};
use crate::error::{WebauthnError, WebauthnResult};
use crate::proto::*;
use crate::tpm::{
    name_alg_prefix, Tpm2bName, TpmAlgId, TpmEccCurve, TpmSt, TpmsAttest, TpmtPublic,
    TpmtSignature, TpmuAttest, TpmuPublicId, TpmuPublicParms,
};

/// If cert contains an extension with OID 1.3.6.1.4.1.45724.1.1.4
/// (id-fido-gen-ce-aaguid), its value must match the aaguid in the
/// authenticator data.
pub(crate) const FIDO_GEN_CE_AAGUID_OID: Oid<'static> =
    der_parser::oid!(1.3.6 .1 .4 .1 .45724 .1 .1 .4);

/// The wire identifiers of the attestation statement formats, as registered
/// with IANA. Dispatch inside this crate is over the decoded
/// [`AttestationStatement`] variants; this enum names them for policy and
/// logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AttestationFormat {
    /// The packed attestation format.
    Packed,
    /// The tpm attestation format.
    Tpm,
    /// The android-key attestation format.
    AndroidKey,
    /// The android-safetynet attestation format.
    AndroidSafetyNet,
    /// The fido-u2f attestation format.
    FIDOU2F,
    /// The apple anonymous attestation format.
    AppleAnonymous,
    /// No attestation.
    None,
}

impl TryFrom<&str> for AttestationFormat {
    type Error = WebauthnError;

    fn try_from(a: &str) -> Result<AttestationFormat, Self::Error> {
        match a {
            "packed" => Ok(AttestationFormat::Packed),
            "tpm" => Ok(AttestationFormat::Tpm),
            "android-key" => Ok(AttestationFormat::AndroidKey),
            "android-safetynet" => Ok(AttestationFormat::AndroidSafetyNet),
            "fido-u2f" => Ok(AttestationFormat::FIDOU2F),
            "apple" => Ok(AttestationFormat::AppleAnonymous),
            "none" => Ok(AttestationFormat::None),
            _ => Err(WebauthnError::BadAttestationStatement(
                "attestation format is not registered",
            )),
        }
    }
}

impl AttestationStatement {
    /// The IANA registered format identifier of this statement.
    pub fn format(&self) -> AttestationFormat {
        match self {
            AttestationStatement::Packed(_) => AttestationFormat::Packed,
            AttestationStatement::Tpm(_) => AttestationFormat::Tpm,
            AttestationStatement::AndroidKey(_) => AttestationFormat::AndroidKey,
            AttestationStatement::AndroidSafetyNet(_) => AttestationFormat::AndroidSafetyNet,
            AttestationStatement::Apple(_) => AttestationFormat::AppleAnonymous,
            AttestationStatement::FidoU2F(_) => AttestationFormat::FIDOU2F,
            AttestationStatement::None => AttestationFormat::None,
        }
    }
}

// Three attestation formats pin a value inside a certificate extension:
// packed and tpm pin the aaguid, apple pins a liveness nonce, android-key
// carries a whole KeyDescription. The shapes share nothing beyond living in
// a certificate, so each gets a narrow function over a common value lookup.

/// The apple anonymous attestation nonce.
const APPLE_ANONYMOUS_NONCE_OID: Oid<'static> = der_parser::oid!(1.2.840 .113635 .100 .8 .2);

/// The android key attestation KeyDescription.
const ANDROID_KEY_DESCRIPTION_OID: Oid<'static> =
    der_parser::oid!(1.3.6 .1 .4 .1 .11129 .2 .1 .17);

/// The raw DER value of the extension `oid`, if the certificate carries it.
fn extension_value(cert: &x509::X509, oid: &Oid<'static>) -> WebauthnResult<Option<Vec<u8>>> {
    let der_bytes = cert
        .to_der()
        .map_err(|_| WebauthnError::BadAttestationStatement("certificate unencodable"))?;
    let parsed = x509_parser::parse_x509_certificate(&der_bytes)
        .map_err(|_| WebauthnError::BadAttestationStatement("certificate der invalid"))?
        .1;

    Ok(parsed
        .extensions()
        .iter()
        .find(|extension| &extension.oid == oid)
        .map(|extension| extension.value.to_vec()))
}

/// If the certificate carries id-fido-gen-ce-aaguid, the OCTET STRING it
/// wraps must equal the aaguid in the authenticator data byte for byte. The
/// extension itself is optional.
pub(crate) fn assert_aaguid_extension(cert: &x509::X509, aaguid: &Aaguid) -> WebauthnResult<()> {
    let value = match extension_value(cert, &FIDO_GEN_CE_AAGUID_OID)? {
        Some(value) => value,
        None => return Ok(()),
    };

    let (_, octets) = der_parser::der::parse_der_octetstring(&value).map_err(|_| {
        WebauthnError::BadAttestationStatement("aaguid extension undecodable")
    })?;
    let cert_aaguid = octets.as_slice().map_err(|_| {
        WebauthnError::BadAttestationStatement("aaguid extension undecodable")
    })?;

    if cert_aaguid == aaguid.as_slice() {
        Ok(())
    } else {
        Err(WebauthnError::BadAttestationStatement(
            "attestation certificate aaguid mismatch",
        ))
    }
}

// The nonce is wrapped as SEQUENCE { [1] EXPLICIT OCTET STRING }.
fn parse_apple_nonce(value: &[u8]) -> WebauthnResult<[u8; 32]> {
    use der_parser::der::{
        parse_der_octetstring, parse_der_sequence_defined_g, parse_der_tagged_explicit, Class,
    };

    let undecodable =
        || WebauthnError::BadAttestationStatement("apple nonce extension undecodable");

    let (_, tagged) = parse_der_sequence_defined_g(|content: &[u8], _| {
        parse_der_tagged_explicit(1, parse_der_octetstring)(content)
    })(value)
    .map_err(|_| undecodable())?;

    let (class, _tag, nonce) = tagged.as_tagged().map_err(|_| undecodable())?;
    if class != Class::ContextSpecific {
        return Err(undecodable());
    }

    nonce
        .as_slice()
        .ok()
        .and_then(|s| s.try_into().ok())
        .ok_or(WebauthnError::BadAttestationStatement(
            "apple nonce must be 32 bytes",
        ))
}

/// The nonce an apple anonymous attestation certificate pins. Required -
/// its absence fails the attestation.
fn apple_nonce_extension(cert: &x509::X509) -> WebauthnResult<[u8; 32]> {
    let value = extension_value(cert, &APPLE_ANONYMOUS_NONCE_OID)?.ok_or(
        WebauthnError::BadAttestationStatement(
            "apple attestation certificate lacks its nonce extension",
        ),
    )?;
    parse_apple_nonce(&value)
}

pub(crate) mod android_key {
    //! The android key attestation KeyDescription (§8.4), reduced to the
    //! fields webauthn verification consumes.

    use der_parser::ber::BerObjectContent;
    use der_parser::der::{
        parse_der, parse_der_enum, parse_der_integer, parse_der_octetstring,
        parse_der_sequence_defined_g,
    };
    use der_parser::error::{BerError, BerResult};

    // Keymaster tag numbers of the authorization list entries verification
    // reads. Everything else in a list is skipped.
    const TAG_PURPOSE: u32 = 1;
    const TAG_ALL_APPLICATIONS: u32 = 600;
    const TAG_ORIGIN: u32 = 702;

    /// KM_ORIGIN_GENERATED - the key pair was generated on device.
    pub const KM_ORIGIN_GENERATED: u32 = 0;
    /// KM_PURPOSE_SIGN
    pub const KM_PURPOSE_SIGN: u32 = 2;

    /// The SecurityLevel of a keymaster record.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum SecurityLevel {
        /// Enforced by the android keystore software.
        Software,
        /// Enforced by a trusted execution environment.
        TrustedEnvironment,
        /// Enforced by a dedicated secure element.
        StrongBox,
    }

    impl TryFrom<u32> for SecurityLevel {
        type Error = ();

        fn try_from(v: u32) -> Result<Self, Self::Error> {
            match v {
                0 => Ok(SecurityLevel::Software),
                1 => Ok(SecurityLevel::TrustedEnvironment),
                2 => Ok(SecurityLevel::StrongBox),
                _ => Err(()),
            }
        }
    }

    /// One authorization list, reduced to the entries verification reads.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct AuthorizationList {
        /// The key purposes, when stated. Only the first member of the
        /// purpose set is retained.
        pub purpose: Option<u32>,
        /// How the key material came to exist, when stated.
        pub origin: Option<u32>,
        /// Whether the allApplications entry appeared. It must not.
        pub all_applications: bool,
    }

    fn parse_security_level(i: &[u8]) -> BerResult<'_, SecurityLevel> {
        let (rem, level) = parse_der_enum(i)?;
        let level = SecurityLevel::try_from(level.as_u32()?)
            .map_err(|_| nom::Err::Error(BerError::InvalidTag))?;
        Ok((rem, level))
    }

    fn parse_authorization_list(i: &[u8]) -> BerResult<'_, AuthorizationList> {
        parse_der_sequence_defined_g(|content: &[u8], _| {
            let mut list = AuthorizationList::default();

            let mut rem = content;
            while !rem.is_empty() {
                let (next, entry) = parse_der(rem)?;
                rem = next;

                // Entries are context tagged; the universal parser leaves
                // their payload as unknown content for us to decode.
                match (entry.tag().0, &entry.content) {
                    (TAG_ALL_APPLICATIONS, _) => list.all_applications = true,
                    (TAG_ORIGIN, BerObjectContent::Unknown(any)) => {
                        let (_, origin) = parse_der(&any.data)?;
                        list.origin = Some(origin.as_u32()?);
                    }
                    (TAG_PURPOSE, BerObjectContent::Unknown(any)) => {
                        // purpose is a SET OF INTEGER; credential keys carry
                        // a single purpose.
                        let (_, purposes) = parse_der(&any.data)?;
                        let entries = match &purposes.content {
                            BerObjectContent::Set(entries) => entries,
                            _ => return Err(nom::Err::Error(BerError::BerTypeError)),
                        };
                        if let Some(first) = entries.first() {
                            list.purpose = Some(first.as_u32()?);
                        }
                    }
                    _ => {}
                }
            }

            Ok((rem, list))
        })(i)
    }

    /// The decoded KeyDescription extension content.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct KeyDescription {
        /// The challenge supplied at key generation time - for webauthn,
        /// the client data hash.
        pub attestation_challenge: Vec<u8>,
        /// Where the attestation statement itself was produced.
        pub attestation_security_level: SecurityLevel,
        /// Where the key material is enforced.
        pub keymaster_security_level: SecurityLevel,
        /// The software enforced authorization list.
        pub software_enforced: AuthorizationList,
        /// The hardware enforced authorization list.
        pub tee_enforced: AuthorizationList,
    }

    impl KeyDescription {
        /// Decode a KeyDescription from the extension value DER.
        pub fn parse(i: &[u8]) -> BerResult<'_, Self> {
            parse_der_sequence_defined_g(|content: &[u8], _| {
                let (content, _attestation_version) = parse_der_integer(content)?;
                let (content, attestation_security_level) = parse_security_level(content)?;
                let (content, _keymaster_version) = parse_der_integer(content)?;
                let (content, keymaster_security_level) = parse_security_level(content)?;

                let (content, challenge) = parse_der_octetstring(content)?;
                let attestation_challenge = challenge.as_slice()?.to_vec();

                let (content, _unique_id) = parse_der_octetstring(content)?;

                let (content, software_enforced) = parse_authorization_list(content)?;
                let (content, tee_enforced) = parse_authorization_list(content)?;

                Ok((
                    content,
                    KeyDescription {
                        attestation_challenge,
                        attestation_security_level,
                        keymaster_security_level,
                        software_enforced,
                        tee_enforced,
                    },
                ))
            })(i)
        }
    }
}

fn materialise_x5c(x5c: &[Vec<u8>]) -> WebauthnResult<Vec<x509::X509>> {
    x5c.iter()
        .map(|der| {
            x509::X509::from_der(der).map_err(|_| {
                WebauthnError::BadAttestationStatement("attestation certificate der invalid")
            })
        })
        .collect()
}

// Perform the Verification procedure for 8.2. Packed Attestation Statement Format
// https://w3c.github.io/webauthn/#sctn-packed-attestation
pub(crate) fn verify_packed_attestation(
    acd: &AttestedCredentialData,
    att_stmt: &PackedAttestationStatement,
    auth_data_bytes: &[u8],
    client_data_hash: &[u8],
) -> WebauthnResult<AttestationType> {
    let verification_data: Vec<u8> = auth_data_bytes
        .iter()
        .chain(client_data_hash.iter())
        .copied()
        .collect();

    match (&att_stmt.x5c, &att_stmt.ecdaa_key_id) {
        (Some(x5c), _) => {
            // 2. If x5c is present, this indicates that the attestation type
            // is not ECDAA.
            //
            // The elements of this array contain attestnCert and its
            // certificate chain, each encoded in X.509 format. The
            // attestation certificate attestnCert MUST be the first element
            // in the array.
            let arr_x509 = materialise_x5c(x5c)?;

            let attestn_cert = arr_x509
                .first()
                .ok_or(WebauthnError::BadAttestationStatement("x5c is empty"))?;

            // Verify that sig is a valid signature over the concatenation of
            // authenticatorData and clientDataHash using the attestation
            // public key in attestnCert with the algorithm specified in alg.
            let is_valid_signature =
                verify_signature(att_stmt.alg, attestn_cert, &att_stmt.sig, &verification_data)?;
            if !is_valid_signature {
                return Err(WebauthnError::BadAttestationStatement(
                    "packed attestation signature invalid",
                ));
            }

            // Verify that attestnCert meets the requirements in § 8.2.1
            // Packed Attestation Statement Certificate Requirements.
            assert_packed_attest_req(attestn_cert)?;

            // If attestnCert contains an extension with OID
            // 1.3.6.1.4.1.45724.1.1.4 (id-fido-gen-ce-aaguid) verify that the
            // value of this extension matches the aaguid in authenticatorData.
            assert_aaguid_extension(attestn_cert, &acd.aaguid)?;

            // If successful, return implementation-specific values
            // representing attestation type Basic, AttCA or uncertainty, and
            // attestation trust path x5c.
            Ok(AttestationType::Basic(arr_x509))
        }
        (None, Some(_ecdaa_key_id)) => {
            // 3. If ecdaaKeyId is present, then the attestation type is
            // ECDAA. ECDAA was deprecated in webauthn level 2.
            debug!("ecdaa attestation presented");
            Err(WebauthnError::BadAttestationStatement(
                "ecdaa attestation is not supported",
            ))
        }
        (None, None) => {
            // 4. If neither x5c nor ecdaaKeyId is present, self attestation
            // is in use.
            let credential_public_key = &acd.credential_pk;

            // 4.a. Validate that alg matches the algorithm of the
            // credentialPublicKey in authenticatorData.
            if att_stmt.alg != credential_public_key.type_ {
                return Err(WebauthnError::BadAttestationStatement(
                    "self attestation algorithm disagrees with the credential key",
                ));
            }

            // 4.b. Verify that sig is a valid signature over the
            // concatenation of authenticatorData and clientDataHash using the
            // credential public key with alg.
            let is_valid_signature =
                credential_public_key.verify_signature(&att_stmt.sig, &verification_data)?;
            if !is_valid_signature {
                return Err(WebauthnError::BadAttestationStatement(
                    "self attestation signature invalid",
                ));
            }

            // 4.c. If successful, return implementation-specific values
            // representing attestation type Self and an empty attestation
            // trust path.
            Ok(AttestationType::Self_)
        }
    }
}

// https://w3c.github.io/webauthn/#fido-u2f-attestation
pub(crate) fn verify_fidou2f_attestation(
    acd: &AttestedCredentialData,
    att_stmt: &FidoU2FAttestationStatement,
    rp_id_hash: &[u8],
    client_data_hash: &[u8],
) -> WebauthnResult<AttestationType> {
    // Check that x5c has exactly one element and let att_cert be that element.
    if att_stmt.x5c.len() != 1 {
        return Err(WebauthnError::BadAttestationStatement(
            "fido-u2f requires exactly one certificate",
        ));
    }

    let arr_x509 = materialise_x5c(&att_stmt.x5c)?;

    // Let certificate public key be the public key conveyed by att_cert. If
    // certificate public key is not an Elliptic Curve (EC) public key over
    // the P-256 curve, terminate this algorithm and return an appropriate
    // error.
    let certificate_public_key = arr_x509
        .first()
        .ok_or(WebauthnError::BadAttestationStatement("x5c is empty"))?;

    let cert_is_p256 = certificate_public_key
        .public_key()
        .and_then(|pk| pk.ec_key())
        .ok()
        .and_then(|ec| ec.group().curve_name())
        .map(|nid| nid == openssl::nid::Nid::X9_62_PRIME256V1)
        .unwrap_or(false);
    if !cert_is_p256 {
        return Err(WebauthnError::BadAttestationStatement(
            "fido-u2f certificate key must be ec p-256",
        ));
    }

    // The credential key itself must be P-256 before the signed data is
    // assembled, as the point layout below assumes 32 byte coordinates.
    match &acd.credential_pk.key {
        COSEKeyType::EC_EC2(ec2k) if ec2k.curve == ECDSACurve::SECP256R1 => {}
        _ => {
            return Err(WebauthnError::BadAttestationStatement(
                "fido-u2f credential key must be ec p-256",
            ))
        }
    }

    // Convert the COSE_KEY formatted credentialPublicKey to Raw ANSI X9.62
    // public key format.
    let public_key_u2f = acd.credential_pk.get_alg_key_ecc_x962_raw()?;

    // Let verificationData be the concatenation of
    // (0x00 || rpIdHash || clientDataHash || credentialId || publicKeyU2F)
    let r: [u8; 1] = [0x00];
    let verification_data: Vec<u8> = r
        .iter()
        .chain(rp_id_hash.iter())
        .chain(client_data_hash.iter())
        .chain(acd.credential_id.0.iter())
        .chain(public_key_u2f.iter())
        .copied()
        .collect();

    // Verify the sig using verificationData and certificate public key per
    // SEC1. U2F signatures are always ECDSA over SHA-256.
    let verified = verify_signature(
        COSEAlgorithm::ES256,
        certificate_public_key,
        &att_stmt.sig,
        &verification_data,
    )?;

    if !verified {
        error!("fido-u2f attestation signature verification failed");
        return Err(WebauthnError::BadAttestationStatement(
            "fido-u2f attestation signature invalid",
        ));
    }

    // The wire format cannot distinguish Basic from AttCA here; consumers
    // driving risk decisions from the attestation type should treat u2f as
    // basic-or-better.
    Ok(AttestationType::Basic(arr_x509))
}

// https://w3c.github.io/webauthn/#sctn-tpm-attestation
pub(crate) fn verify_tpm_attestation(
    acd: &AttestedCredentialData,
    att_stmt: &TpmAttestationStatement,
    auth_data_bytes: &[u8],
    client_data_hash: &[u8],
    device_property_decoder: &dyn crate::core::TpmDevicePropertyDecoder,
    device_property_validator: &dyn crate::core::TpmDevicePropertyValidator,
) -> WebauthnResult<AttestationType> {
    debug!("begin verify_tpm_attest");

    // The version of the TPM specification to which the signature conforms.
    if att_stmt.ver != "2.0" {
        return Err(WebauthnError::BadAttestationStatement(
            "tpm version must be 2.0",
        ));
    }

    // The TPMS_ATTEST structure over which the signature was computed.
    let certinfo = TpmsAttest::try_from(att_stmt.cert_info.as_slice())?;

    // The TPMT_PUBLIC structure used by the TPM to represent the credential
    // public key.
    let pubarea = TpmtPublic::try_from(att_stmt.pub_area.as_slice())?;

    let sig = TpmtSignature::try_from(att_stmt.sig.as_slice())?;

    // x5c - aik_cert followed by its certificate chain, in X.509 encoding.
    // Absence would imply ECDAA, which is deprecated.
    let x5c = att_stmt
        .x5c
        .as_ref()
        .ok_or(WebauthnError::BadAttestationStatement(
            "tpm attestation requires x5c - ecdaa is not supported",
        ))?;

    let arr_x509 = materialise_x5c(x5c)?;

    let aik_cert = arr_x509
        .first()
        .ok_or(WebauthnError::BadAttestationStatement("x5c is empty"))?;

    // Verify that the public key specified by the parameters and unique
    // fields of pubArea is identical to the credentialPublicKey in the
    // attestedCredentialData in authenticatorData.
    match (
        &acd.credential_pk.key,
        &pubarea.parameters,
        &pubarea.unique,
    ) {
        (
            COSEKeyType::RSA(cose_rsa),
            TpmuPublicParms::Rsa(tpm_parms),
            TpmuPublicId::Rsa(tpm_modulus),
        ) => {
            if cose_rsa.n.as_ref() != tpm_modulus.as_slice() {
                return Err(WebauthnError::BadAttestationStatement(
                    "tpm pubArea modulus disagrees with the credential key",
                ));
            }

            // An exponent of zero means the TPM default of 2^16 + 1.
            let tpm_exponent = if tpm_parms.exponent == 0 {
                65537
            } else {
                tpm_parms.exponent
            };
            let cose_exponent = u32::from_be_bytes([
                0,
                cose_rsa.e[0],
                cose_rsa.e[1],
                cose_rsa.e[2],
            ]);
            if tpm_exponent != cose_exponent {
                return Err(WebauthnError::BadAttestationStatement(
                    "tpm pubArea exponent disagrees with the credential key",
                ));
            }
        }
        (
            COSEKeyType::EC_EC2(cose_ec),
            TpmuPublicParms::Ecc(tpm_parms),
            TpmuPublicId::Ecc { x, y },
        ) => {
            let tpm_curve = match tpm_parms.curve_id {
                TpmEccCurve::NistP256 => ECDSACurve::SECP256R1,
                TpmEccCurve::NistP384 => ECDSACurve::SECP384R1,
                TpmEccCurve::NistP521 => ECDSACurve::SECP521R1,
            };
            if tpm_curve != cose_ec.curve
                || cose_ec.x.as_ref() != x.as_slice()
                || cose_ec.y.as_ref() != y.as_slice()
            {
                return Err(WebauthnError::BadAttestationStatement(
                    "tpm pubArea point disagrees with the credential key",
                ));
            }
        }
        _ => {
            return Err(WebauthnError::BadAttestationStatement(
                "tpm pubArea key type disagrees with the credential key",
            ))
        }
    }

    // Concatenate authenticatorData and clientDataHash to form attToBeSigned.
    let verification_data: Vec<u8> = auth_data_bytes
        .iter()
        .chain(client_data_hash.iter())
        .copied()
        .collect();

    // Validate that certInfo is valid:
    // Verify that magic is set to TPM_GENERATED_VALUE.
    if certinfo.magic != TPM_GENERATED_VALUE {
        return Err(WebauthnError::BadAttestationStatement(
            "tpm certInfo magic invalid",
        ));
    }

    // Verify that type is set to TPM_ST_ATTEST_CERTIFY.
    if certinfo.type_ != TpmSt::AttestCertify {
        return Err(WebauthnError::BadAttestationStatement(
            "tpm certInfo type is not attest certify",
        ));
    }

    let extra_data_hash = match certinfo.extra_data {
        Some(h) => h,
        None => {
            return Err(WebauthnError::BadAttestationStatement(
                "tpm certInfo extraData missing",
            ))
        }
    };

    // Verify that extraData is set to the hash of attToBeSigned using the
    // hash algorithm employed in "alg".
    let hash_verification_data = only_hash_from_type(att_stmt.alg, verification_data.as_slice())?;

    if hash_verification_data != extra_data_hash {
        return Err(WebauthnError::BadAttestationStatement(
            "tpm certInfo extraData mismatch",
        ));
    }

    // Verify that attested contains a TPMS_CERTIFY_INFO structure, whose name
    // field contains a valid Name for pubArea, as computed using the
    // algorithm in the nameAlg field of pubArea.
    match certinfo.typeattested {
        TpmuAttest::AttestCertify(name, _qname) => {
            let name = match name {
                Tpm2bName::Digest(name) => name,
                _ => {
                    return Err(WebauthnError::BadAttestationStatement(
                        "tpm attested name is not a digest",
                    ))
                }
            };
            // Name carries two leading bytes naming the digest algorithm.
            // The TPM spec says nothing about validating them, so they are
            // folded into the comparison to enforce them anyway.
            let prefix = name_alg_prefix(pubarea.name_alg).ok_or(
                WebauthnError::BadAttestationStatement("tpm nameAlg unsupported for names"),
            )?;
            let digest = match pubarea.name_alg {
                TpmAlgId::Sha1 => crate::crypto::compute_sha1(&att_stmt.pub_area).to_vec(),
                TpmAlgId::Sha256 => compute_sha256(&att_stmt.pub_area).to_vec(),
                TpmAlgId::Sha384 => openssl::hash::hash(
                    openssl::hash::MessageDigest::sha384(),
                    &att_stmt.pub_area,
                )
                .map_err(|_| WebauthnError::BadSignature)?
                .to_vec(),
                TpmAlgId::Sha512 => openssl::hash::hash(
                    openssl::hash::MessageDigest::sha512(),
                    &att_stmt.pub_area,
                )
                .map_err(|_| WebauthnError::BadSignature)?
                .to_vec(),
                _ => {
                    return Err(WebauthnError::BadAttestationStatement(
                        "tpm nameAlg unsupported for names",
                    ))
                }
            };
            let mut hname = prefix.to_vec();
            hname.extend_from_slice(&digest);
            if hname != name {
                return Err(WebauthnError::BadAttestationStatement(
                    "tpm attested name mismatch",
                ));
            }
        }
        _ => {
            return Err(WebauthnError::BadAttestationStatement(
                "tpm attested structure is not certify info",
            ))
        }
    }

    // Note that qualifiedSigner, clockInfo and firmwareVersion are ignored.
    // These fields MAY be used as an input to risk engines.

    // Verify the sig is a valid signature over certInfo using the
    // attestation public key in aik_cert with the algorithm specified in alg.
    let sig_valid = match sig {
        TpmtSignature::RawSignature(dsig) => {
            verify_signature(att_stmt.alg, aik_cert, &dsig, &att_stmt.cert_info)?
        }
    };

    if !sig_valid {
        return Err(WebauthnError::BadAttestationStatement(
            "tpm attestation signature invalid",
        ));
    }

    // Verify that aik_cert meets the requirements in § 8.3.1 TPM Attestation
    // Statement Certificate Requirements.
    assert_tpm_attest_req(aik_cert)?;

    // The Subject Alternative Name MUST carry a decodable TPM device
    // property, evaluated through the injected hooks.
    let aik_der = aik_cert
        .to_der()
        .map_err(|_| WebauthnError::BadAttestationStatement("certificate unencodable"))?;
    let device_property = device_property_decoder.decode(&aik_der)?;
    device_property_validator.validate(&device_property)?;

    // If aik_cert contains an extension with OID 1.3.6.1.4.1.45724.1.1.4
    // (id-fido-gen-ce-aaguid) verify that the value of this extension matches
    // the aaguid in authenticatorData.
    assert_aaguid_extension(aik_cert, &acd.aaguid)?;

    // If successful, return implementation-specific values representing
    // attestation type AttCA and attestation trust path x5c.
    Ok(AttestationType::AttCa(arr_x509))
}

pub(crate) fn verify_apple_anonymous_attestation(
    acd: &AttestedCredentialData,
    att_stmt: &AppleAnonymousAttestationStatement,
    auth_data_bytes: &[u8],
    client_data_hash: &[u8],
) -> WebauthnResult<AttestationType> {
    let arr_x509 = materialise_x5c(&att_stmt.x5c)?;

    let attestn_cert = arr_x509
        .first()
        .ok_or(WebauthnError::BadAttestationStatement("x5c is empty"))?;

    // 2. Concatenate authenticatorData and clientDataHash to form
    // nonceToHash.
    let nonce_to_hash: Vec<u8> = auth_data_bytes
        .iter()
        .chain(client_data_hash.iter())
        .copied()
        .collect();

    // 3. Perform SHA-256 hash of nonceToHash to produce nonce.
    let nonce = compute_sha256(&nonce_to_hash);

    // 4. Verify that nonce equals the value of the extension with
    // OID 1.2.840.113635.100.8.2 in credCert.
    let cert_nonce = apple_nonce_extension(attestn_cert)?;
    if cert_nonce != nonce {
        return Err(WebauthnError::BadAttestationStatement(
            "attestation certificate nonce mismatch",
        ));
    }

    // 5. Verify credential public key matches the Subject Public Key of
    // credCert.
    let credential_public_key = &acd.credential_pk;
    let subject_public_key = COSEKey::try_from((credential_public_key.type_, attestn_cert))?;

    if credential_public_key != &subject_public_key {
        return Err(WebauthnError::BadAttestationStatement(
            "apple credential key disagrees with the certificate subject key",
        ));
    }

    // 6. If successful, return implementation-specific values representing
    // attestation type Anonymous CA and attestation trust path x5c.
    Ok(AttestationType::AnonCa(arr_x509))
}

/// <https://www.w3.org/TR/webauthn-3/#sctn-android-key-attestation>
pub(crate) fn verify_android_key_attestation(
    acd: &AttestedCredentialData,
    att_stmt: &AndroidKeyAttestationStatement,
    auth_data_bytes: &[u8],
    client_data_hash: &[u8],
    tee_enforced_only: bool,
) -> WebauthnResult<AttestationType> {
    use android_key::{KeyDescription, SecurityLevel, KM_ORIGIN_GENERATED, KM_PURPOSE_SIGN};

    let arr_x509 = materialise_x5c(&att_stmt.x5c)?;

    let attestn_cert = arr_x509
        .first()
        .ok_or(WebauthnError::BadAttestationStatement("x5c is empty"))?;

    // Concatenate authenticatorData and clientDataHash to form the data to
    // verify.
    let data_to_verify: Vec<u8> = auth_data_bytes
        .iter()
        .chain(client_data_hash.iter())
        .copied()
        .collect();

    // 2. Verify that sig is a valid signature over the concatenation of
    // authenticatorData and clientDataHash using the public key in the first
    // certificate in x5c with the algorithm specified in alg.
    let verified = verify_signature(att_stmt.alg, attestn_cert, &att_stmt.sig, &data_to_verify)?;

    if !verified {
        error!("android-key attestation signature verification failed");
        return Err(WebauthnError::BadAttestationStatement(
            "android-key attestation signature invalid",
        ));
    }

    // 3. Verify that the public key in the first certificate in x5c matches
    // the credentialPublicKey in the attestedCredentialData.
    let credential_public_key = &acd.credential_pk;
    let subject_public_key = COSEKey::try_from((credential_public_key.type_, attestn_cert))?;

    if credential_public_key != &subject_public_key {
        return Err(WebauthnError::BadAttestationStatement(
            "android-key credential key disagrees with the certificate subject key",
        ));
    }

    // 4. Verify the attestation certificate extension data.
    let ext_value = extension_value(attestn_cert, &ANDROID_KEY_DESCRIPTION_OID)?.ok_or(
        WebauthnError::BadAttestationStatement("android-key attestation extension missing"),
    )?;
    let (_, ext) = KeyDescription::parse(&ext_value).map_err(|_| {
        WebauthnError::BadAttestationStatement("android-key attestation extension undecodable")
    })?;

    // The attestationChallenge field is identical to clientDataHash.
    if ext.attestation_challenge != client_data_hash {
        return Err(WebauthnError::BadAttestationStatement(
            "android-key attestation challenge mismatch",
        ));
    }

    // The AuthorizationList.allApplications field is not present on either
    // authorization list, since PublicKeyCredential MUST be scoped to the
    // RP ID.
    if ext.software_enforced.all_applications || ext.tee_enforced.all_applications {
        return Err(WebauthnError::BadAttestationStatement(
            "android-key allApplications must be absent",
        ));
    }

    // Use only the teeEnforced authorization list if the RP wants to accept
    // only keys from a trusted execution environment, otherwise use the
    // union of teeEnforced and softwareEnforced. StrongBox exceeds the
    // tee requirement.
    let (origin, purpose) = if tee_enforced_only {
        if ext.attestation_security_level == SecurityLevel::Software
            || ext.keymaster_security_level == SecurityLevel::Software
            || ext.software_enforced.origin.is_some()
            || ext.software_enforced.purpose.is_some()
        {
            return Err(WebauthnError::BadAttestationStatement(
                "android-key attestation is not hardware enforced",
            ));
        }
        (ext.tee_enforced.origin, ext.tee_enforced.purpose)
    } else {
        (
            ext.tee_enforced.origin.or(ext.software_enforced.origin),
            ext.tee_enforced.purpose.or(ext.software_enforced.purpose),
        )
    };

    // The value in the AuthorizationList.origin field is equal to
    // KM_ORIGIN_GENERATED, and purpose is equal to KM_PURPOSE_SIGN.
    if origin != Some(KM_ORIGIN_GENERATED) || purpose != Some(KM_PURPOSE_SIGN) {
        return Err(WebauthnError::BadAttestationStatement(
            "android-key origin or purpose invalid",
        ));
    }

    Ok(AttestationType::Basic(arr_x509))
}

/// <https://www.w3.org/TR/webauthn/#sctn-android-safetynet-attestation>
pub(crate) fn verify_android_safetynet_attestation(
    att_stmt: &AndroidSafetyNetAttestationStatement,
    auth_data_bytes: &[u8],
    client_data_hash: &[u8],
    forward_skew_ms: u64,
    max_age_ms: u64,
) -> WebauthnResult<AttestationType> {
    // Concatenate authenticatorData and clientDataHash, and hash to form the
    // expected nonce content.
    let data_to_verify: Vec<u8> = auth_data_bytes
        .iter()
        .chain(client_data_hash.iter())
        .copied()
        .collect();
    let data_to_verify = compute_sha256(&data_to_verify);

    // 2. Verify that response is a valid SafetyNet response of version ver.
    // As of this writing, there is only one format of the SafetyNet response
    // and ver is reserved for future use.
    #[derive(Debug, serde::Deserialize, serde::Serialize)]
    #[serde(rename_all = "camelCase")]
    struct SafetyNetAttestResponse {
        timestamp_ms: u64,
        apk_package_name: String,
        apk_certificate_digest_sha256: Vec<String>,
        cts_profile_match: bool,
        basic_integrity: bool,
        evaluation_type: Option<String>,
    }

    let response_str = std::str::from_utf8(&att_stmt.response).map_err(|_| {
        WebauthnError::BadAttestationStatement("safetynet response is not utf-8")
    })?;

    #[derive(Debug, thiserror::Error)]
    enum SafetyNetError {
        #[error("JWT error: {0}")]
        Jwt(#[from] jwt_simple::Error),

        #[error("No cert in chain")]
        MissingCertChain,

        #[error("Invalid Cert")]
        BadCert,

        #[error("Base64 error: {0}")]
        Base64(#[from] base64::DecodeError),

        #[error("openssl")]
        OpenSSL(#[from] openssl::error::ErrorStack),

        #[error("unsupported jwt alg")]
        BadAlg,

        #[error("missing nonce")]
        MissingNonce,

        #[error("nonce invalid")]
        BadNonce,

        #[error("nonce mismatch")]
        NonceMismatch,

        #[error("hostname invalid")]
        InvalidHostname,

        #[error("False CTS Profile Match")]
        CtsProfileMatchFailed,

        #[error("Timestamp out of window")]
        Timestamp,

        #[error("Time error: {0}")]
        Time(#[from] std::time::SystemTimeError),
    }

    use jwt_simple::prelude::*;

    let (x5c, _response) = |token: &str| -> Result<
        (Vec<x509::X509>, SafetyNetAttestResponse),
        SafetyNetError,
    > {
        let meta = jwt_simple::token::Token::decode_metadata(token)?;

        let certs = meta
            .certificate_chain()
            .ok_or(SafetyNetError::MissingCertChain)?
            .iter()
            .map(|cert| {
                let cert = base64::decode(cert)?;
                x509::X509::from_der(&cert).map_err(|_| SafetyNetError::BadCert)
            })
            .collect::<Result<Vec<x509::X509>, SafetyNetError>>()?;

        let cert = certs.first().ok_or(SafetyNetError::BadCert)?;
        let public_key = cert.public_key()?;

        let opts = Some(VerificationOptions::default());

        let verified_claims: JWTClaims<SafetyNetAttestResponse> = match public_key.id() {
            openssl::pkey::Id::RSA => {
                let der = public_key.public_key_to_der()?;
                use openssl::nid::Nid;

                match (cert.signature_algorithm().object().nid(), meta.algorithm()) {
                    (Nid::SHA256WITHRSAENCRYPTION, "RS256") => {
                        RS256PublicKey::from_der(&der)?.verify_token(token, opts)?
                    }
                    (Nid::SHA384WITHRSAENCRYPTION, "RS384") => {
                        RS384PublicKey::from_der(&der)?.verify_token(token, opts)?
                    }
                    (Nid::SHA512WITHRSAENCRYPTION, "RS512") => {
                        RS512PublicKey::from_der(&der)?.verify_token(token, opts)?
                    }
                    _ => return Err(SafetyNetError::BadAlg),
                }
            }
            openssl::pkey::Id::EC => {
                let ec_key = public_key.ec_key()?;
                let mut ctxt = openssl::bn::BigNumContext::new()?;
                let raw = ec_key.public_key().to_bytes(
                    ec_key.group(),
                    openssl::ec::PointConversionForm::UNCOMPRESSED,
                    &mut ctxt,
                )?;

                match meta.algorithm() {
                    "ES256" => ES256PublicKey::from_bytes(&raw)?.verify_token(token, opts)?,
                    _ => return Err(SafetyNetError::BadAlg),
                }
            }
            _ => return Err(SafetyNetError::BadAlg),
        };

        // 3. Verify that the nonce attribute in the payload of response is
        // identical to the Base64 encoding of the SHA-256 hash of the
        // concatenation of authenticatorData and clientDataHash.
        let nonce = verified_claims.nonce.ok_or(SafetyNetError::MissingNonce)?;
        let nonce = base64::decode(&nonce).map_err(|_| SafetyNetError::BadNonce)?;
        if nonce != data_to_verify.to_vec() {
            return Err(SafetyNetError::NonceMismatch);
        }

        // 4. Verify that the SafetyNet response actually came from the
        // SafetyNet service - attestationCert is issued to the hostname
        // "attest.android.com".
        let common_name = {
            let name = cert
                .subject_name()
                .entries_by_nid(openssl::nid::Nid::COMMONNAME)
                .next()
                .ok_or(SafetyNetError::InvalidHostname)?;
            name.data()
                .to_string()
                .map_err(|_| SafetyNetError::InvalidHostname)?
        };

        if common_name.as_str() != SAFETYNET_ATTEST_HOSTNAME {
            return Err(SafetyNetError::InvalidHostname);
        }

        // §8.5.6 Verify that the ctsProfileMatch attribute in the payload of
        // response is true.
        if !verified_claims.custom.cts_profile_match {
            return Err(SafetyNetError::CtsProfileMatchFailed);
        }

        // Verify sanity of the timestamp in the payload. The response must
        // not be from the future beyond the permitted clock skew, nor older
        // than the configured age.
        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)?
            .as_millis() as u64;
        let forward = forward_skew_ms.min(SAFETYNET_MAX_FORWARD_SKEW_MS);
        let ts = verified_claims.custom.timestamp_ms;
        if ts > now_ms.saturating_add(forward) || ts < now_ms.saturating_sub(max_age_ms) {
            return Err(SafetyNetError::Timestamp);
        }

        Ok((certs, verified_claims.custom))
    }(response_str)
    .map_err(|e| {
        error!("safetynet jws error: {:?}", e);
        WebauthnError::BadAttestationStatement("safetynet response invalid")
    })?;

    Ok(AttestationType::Basic(x5c))
}

pub(crate) fn verify_none_attestation() -> WebauthnResult<AttestationType> {
    // The none statement is structurally empty; there is nothing to verify
    // and no trust path to convey.
    Ok(AttestationType::None)
}

/// Verify a chain of certificates (leaf first) terminates at one of the
/// supplied trust anchors, performing full PKIX path validation through the
/// OpenSSL store.
pub(crate) fn verify_attestation_chain(
    fullchain: &[x509::X509],
    anchors: &[x509::X509],
    enable_revocation_check: bool,
    danger_disable_certificate_time_checks: bool,
) -> WebauthnResult<()> {
    use openssl::stack;
    use openssl::x509::{store, verify};

    let (leaf, chain) = fullchain
        .split_first()
        .ok_or(WebauthnError::BadAttestationStatement("x5c is empty"))?;

    // Convert the chain to a stackref so that openssl can use it.
    let mut chain_stack = stack::Stack::new()
        .map_err(|e| WebauthnError::CertificateError(e.to_string()))?;

    for crt in chain.iter() {
        chain_stack
            .push(crt.clone())
            .map_err(|e| WebauthnError::CertificateError(e.to_string()))?;
    }

    // Create the x509 store that we will validate against.
    let mut ca_store = store::X509StoreBuilder::new()
        .map_err(|e| WebauthnError::CertificateError(e.to_string()))?;

    let mut flags = verify::X509VerifyFlags::empty();
    if enable_revocation_check {
        flags |= verify::X509VerifyFlags::CRL_CHECK | verify::X509VerifyFlags::CRL_CHECK_ALL;
    }
    // In tests we may need to allow disabling time window validity.
    if danger_disable_certificate_time_checks {
        flags |= verify::X509VerifyFlags::NO_CHECK_TIME;
    }
    if !flags.is_empty() {
        ca_store
            .set_flags(flags)
            .map_err(|e| WebauthnError::CertificateError(e.to_string()))?;
    }

    for ca_crt in anchors.iter() {
        ca_store
            .add_cert(ca_crt.clone())
            .map_err(|e| WebauthnError::CertificateError(e.to_string()))?;
    }

    let ca_store = ca_store.build();

    let mut ca_ctx = x509::X509StoreContext::new()
        .map_err(|e| WebauthnError::CertificateError(e.to_string()))?;

    // Providing the cert and chain, validate we have a ref to our store.
    let res = ca_ctx
        .init(&ca_store, leaf, &chain_stack, |ca_ctx_ref| {
            ca_ctx_ref.verify_cert().map(|_| {
                debug!(
                    "ca_ctx_ref verify cert - error depth={}, sn={:?}",
                    ca_ctx_ref.error_depth(),
                    ca_ctx_ref.current_cert().map(|crt| crt.subject_name())
                );
                ca_ctx_ref.error()
            })
        })
        .map_err(|e| {
            error!(?e, "certificate path validation");
            WebauthnError::CertificateError(e.to_string())
        })?;

    if res != x509::X509VerifyResult::OK {
        return Err(WebauthnError::CertificateError(res.to_string()));
    }

    debug!("attestation chain trusted");

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use super::*;
    use crate::test_support::*;

    #[test]
    fn attestation_format_identifiers() {
        assert_eq!(
            AttestationFormat::try_from("fido-u2f").unwrap(),
            AttestationFormat::FIDOU2F
        );
        assert_eq!(
            AttestationFormat::try_from("apple").unwrap(),
            AttestationFormat::AppleAnonymous
        );
        assert!(AttestationFormat::try_from("android-sftynet").is_err());
    }

    #[test]
    fn none_statement_yields_none() {
        assert!(matches!(
            verify_none_attestation().unwrap(),
            AttestationType::None
        ));
    }

    #[test]
    fn android_key_description_parses() {
        use android_key::{KeyDescription, SecurityLevel};

        // A hand assembled KeyDescription:
        // SEQUENCE {
        //   attestationVersion INTEGER 3
        //   attestationSecurityLevel ENUMERATED 1 (TEE)
        //   keymasterVersion INTEGER 4
        //   keymasterSecurityLevel ENUMERATED 1 (TEE)
        //   attestationChallenge OCTET STRING (4 bytes)
        //   uniqueId OCTET STRING (0 bytes)
        //   softwareEnforced SEQUENCE {}
        //   teeEnforced SEQUENCE { [1] { SET { INTEGER 2 } }, [702] { INTEGER 0 } }
        // }
        let der = [
            0x30, 0x26, // SEQUENCE, 38 bytes
            0x02, 0x01, 0x03, // INTEGER 3
            0x0a, 0x01, 0x01, // ENUMERATED 1
            0x02, 0x01, 0x04, // INTEGER 4
            0x0a, 0x01, 0x01, // ENUMERATED 1
            0x04, 0x04, 0xde, 0xad, 0xbe, 0xef, // OCTET STRING
            0x04, 0x00, // OCTET STRING, empty
            0x30, 0x00, // softwareEnforced
            0x30, 0x0e, // teeEnforced, 14 bytes
            0xa1, 0x05, 0x31, 0x03, 0x02, 0x01, 0x02, // [1] purpose SET { 2 }
            0xbf, 0x85, 0x3e, 0x03, 0x02, 0x01, 0x00, // [702] origin 0
        ];

        let (_, desc) = KeyDescription::parse(&der).unwrap();
        assert_eq!(desc.attestation_challenge, vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(
            desc.attestation_security_level,
            SecurityLevel::TrustedEnvironment
        );
        assert_eq!(
            desc.keymaster_security_level,
            SecurityLevel::TrustedEnvironment
        );
        assert!(!desc.software_enforced.all_applications);
        assert!(desc.software_enforced.origin.is_none());
        assert_eq!(desc.tee_enforced.purpose, Some(2));
        assert_eq!(desc.tee_enforced.origin, Some(0));
    }

    #[test]
    fn apple_nonce_shell_parses() {
        let nonce = [0x5au8; 32];
        let mut der = vec![
            0x30, 0x24, // SEQUENCE, 36 bytes
            0xa1, 0x22, // [1] EXPLICIT, 34 bytes
            0x04, 0x20, // OCTET STRING, 32 bytes
        ];
        der.extend_from_slice(&nonce);

        assert_eq!(parse_apple_nonce(&der).unwrap(), nonce);

        // A truncated nonce is rejected.
        let mut short = vec![0x30, 0x13, 0xa1, 0x11, 0x04, 0x0f];
        short.extend_from_slice(&[0x5au8; 15]);
        assert!(parse_apple_nonce(&short).is_err());
    }

    #[test]
    fn packed_self_attestation_verifies() {
        let cred = TestCredential::new_es256();
        let auth_data_bytes = cred.auth_data_bytes("example.com");
        let client_data_hash = [7u8; 32];

        let verification_data: Vec<u8> = auth_data_bytes
            .iter()
            .chain(client_data_hash.iter())
            .copied()
            .collect();
        let sig = cred.sign(&verification_data);

        let att_stmt = PackedAttestationStatement {
            alg: COSEAlgorithm::ES256,
            sig,
            x5c: None,
            ecdaa_key_id: None,
        };

        let result =
            verify_packed_attestation(&cred.acd(), &att_stmt, &auth_data_bytes, &client_data_hash)
                .unwrap();
        assert!(matches!(result, AttestationType::Self_));
    }

    #[test]
    fn packed_self_attestation_alg_mismatch_rejected() {
        let cred = TestCredential::new_es256();
        let auth_data_bytes = cred.auth_data_bytes("example.com");
        let client_data_hash = [7u8; 32];

        let verification_data: Vec<u8> = auth_data_bytes
            .iter()
            .chain(client_data_hash.iter())
            .copied()
            .collect();
        let sig = cred.sign(&verification_data);

        let att_stmt = PackedAttestationStatement {
            // Disagrees with the ES256 credential key.
            alg: COSEAlgorithm::ES384,
            sig,
            x5c: None,
            ecdaa_key_id: None,
        };

        let err =
            verify_packed_attestation(&cred.acd(), &att_stmt, &auth_data_bytes, &client_data_hash)
                .unwrap_err();
        assert!(matches!(err, WebauthnError::BadAttestationStatement(_)));
    }

    #[test]
    fn packed_ecdaa_rejected() {
        let cred = TestCredential::new_es256();
        let att_stmt = PackedAttestationStatement {
            alg: COSEAlgorithm::ES256,
            sig: vec![0u8; 70],
            x5c: None,
            ecdaa_key_id: Some(vec![1, 2, 3]),
        };
        let err = verify_packed_attestation(&cred.acd(), &att_stmt, &[0u8; 37], &[7u8; 32])
            .unwrap_err();
        assert!(matches!(err, WebauthnError::BadAttestationStatement(_)));
    }

    #[test]
    fn fidou2f_happy_path() {
        let cred = TestCredential::new_es256();
        let attestation = TestAttestationCa::new_u2f_style();
        let rp_id_hash = crate::crypto::compute_sha256(b"example.com");
        let client_data_hash = [9u8; 32];

        let public_key_u2f = cred.cose_key().get_alg_key_ecc_x962_raw().unwrap();
        let verification_data: Vec<u8> = std::iter::once(0x00u8)
            .chain(rp_id_hash.iter().copied())
            .chain(client_data_hash.iter().copied())
            .chain(cred.credential_id().iter().copied())
            .chain(public_key_u2f.iter().copied())
            .collect();
        let sig = attestation.sign(&verification_data);

        let att_stmt = FidoU2FAttestationStatement {
            sig,
            x5c: vec![attestation.cert_der()],
        };

        let result =
            verify_fidou2f_attestation(&cred.acd(), &att_stmt, &rp_id_hash, &client_data_hash)
                .unwrap();
        match result {
            AttestationType::Basic(chain) => assert_eq!(chain.len(), 1),
            other => panic!("expected basic attestation, got {:?}", other),
        }
    }

    #[test]
    fn fidou2f_requires_single_certificate() {
        let cred = TestCredential::new_es256();
        let attestation = TestAttestationCa::new_u2f_style();
        let att_stmt = FidoU2FAttestationStatement {
            sig: vec![0u8; 70],
            x5c: vec![attestation.cert_der(), attestation.cert_der()],
        };
        let err = verify_fidou2f_attestation(&cred.acd(), &att_stmt, &[0u8; 32], &[9u8; 32])
            .unwrap_err();
        assert!(matches!(err, WebauthnError::BadAttestationStatement(_)));
    }

    #[test]
    fn fidou2f_corrupted_signature_rejected() {
        let cred = TestCredential::new_es256();
        let attestation = TestAttestationCa::new_u2f_style();
        let rp_id_hash = crate::crypto::compute_sha256(b"example.com");
        let client_data_hash = [9u8; 32];

        let public_key_u2f = cred.cose_key().get_alg_key_ecc_x962_raw().unwrap();
        let verification_data: Vec<u8> = std::iter::once(0x00u8)
            .chain(rp_id_hash.iter().copied())
            .chain(client_data_hash.iter().copied())
            .chain(cred.credential_id().iter().copied())
            .chain(public_key_u2f.iter().copied())
            .collect();
        let mut sig = attestation.sign(&verification_data);
        let last = sig.len() - 1;
        sig[last] ^= 0x01;

        let att_stmt = FidoU2FAttestationStatement {
            sig,
            x5c: vec![attestation.cert_der()],
        };

        assert!(
            verify_fidou2f_attestation(&cred.acd(), &att_stmt, &rp_id_hash, &client_data_hash)
                .is_err()
        );
    }

    #[test]
    fn tpm_rsa_attestation_happy_path() {
        let (acd, att_stmt, auth_data_bytes, client_data_hash) = build_tpm_rsa_attestation();

        let decoder = PermissiveTpmDecoder;
        let validator = crate::core::DefaultTpmDevicePropertyValidator;

        let result = verify_tpm_attestation(
            &acd,
            &att_stmt,
            &auth_data_bytes,
            &client_data_hash,
            &decoder,
            &validator,
        )
        .unwrap();
        match result {
            AttestationType::AttCa(chain) => assert_eq!(chain.len(), 1),
            other => panic!("expected attca attestation, got {:?}", other),
        }
    }

    #[test]
    fn tpm_attestation_bad_magic_rejected() {
        let (acd, mut att_stmt, auth_data_bytes, client_data_hash) = build_tpm_rsa_attestation();
        // Corrupt the magic in certInfo. The signature check would also fail,
        // but the magic check aborts first.
        att_stmt.cert_info[0] = 0x00;

        let decoder = PermissiveTpmDecoder;
        let validator = crate::core::DefaultTpmDevicePropertyValidator;
        let err = verify_tpm_attestation(
            &acd,
            &att_stmt,
            &auth_data_bytes,
            &client_data_hash,
            &decoder,
            &validator,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            WebauthnError::BadAttestationStatement("tpm certInfo magic invalid")
        ));
    }

    #[test]
    fn tpm_attestation_wrong_version_rejected() {
        let (acd, mut att_stmt, auth_data_bytes, client_data_hash) = build_tpm_rsa_attestation();
        att_stmt.ver = "1.2".to_string();

        let decoder = PermissiveTpmDecoder;
        let validator = crate::core::DefaultTpmDevicePropertyValidator;
        assert!(verify_tpm_attestation(
            &acd,
            &att_stmt,
            &auth_data_bytes,
            &client_data_hash,
            &decoder,
            &validator,
        )
        .is_err());
    }

    #[test]
    fn safetynet_garbage_response_rejected() {
        let att_stmt = AndroidSafetyNetAttestationStatement {
            ver: "14799021".to_string(),
            response: b"not-a-jws".to_vec(),
        };
        let err = verify_android_safetynet_attestation(&att_stmt, &[0u8; 37], &[1u8; 32], 60_000, 60_000)
            .unwrap_err();
        assert!(matches!(err, WebauthnError::BadAttestationStatement(_)));
    }
}
