//! Cryptographic operation wrapper for Webauthn. This module exists to
//! allow ease of auditing, safe operation wrappers for the webauthn library,
//! and cryptographic provider abstraction. This module currently uses OpenSSL
//! as the cryptographic primitive provider.

#![allow(non_camel_case_types)]

use openssl::{bn, ec, hash, nid, pkey, rsa, sha, sign, x509};
use x509_parser::prelude::{GeneralName, ParsedExtension, X509Error, X509Name, X509Version};

use crate::error::*;
use crate::proto::*;

// Why OpenSSL over another rust crate?
// - The openssl crate allows us to reconstruct a public key from the
//   x/y group coords, where most others want a pkcs formatted structure. As
//   a result, it's easiest to use openssl as it gives us exactly what we need
//   for these operations, and despite it's many challenges as a library, it
//   has resources and investment into it's maintenance, so we can a least
//   assert a higher level of confidence in it that <backyard crypto here>.

/// Compute the sha256 of a slice of data.
pub(crate) fn compute_sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = sha::Sha256::new();
    hasher.update(data);
    hasher.finish()
}

/// Compute the sha1 of a slice of data. Only used for RFC 5280 key
/// identifiers and TPM name digests, never for signatures.
pub(crate) fn compute_sha1(data: &[u8]) -> [u8; 20] {
    let mut hasher = sha::Sha1::new();
    hasher.update(data);
    hasher.finish()
}

fn digest_for_algorithm(alg: COSEAlgorithm) -> WebauthnResult<hash::MessageDigest> {
    match alg {
        COSEAlgorithm::ES256 | COSEAlgorithm::RS256 | COSEAlgorithm::PS256 => {
            Ok(hash::MessageDigest::sha256())
        }
        COSEAlgorithm::ES384 | COSEAlgorithm::RS384 | COSEAlgorithm::PS384 => {
            Ok(hash::MessageDigest::sha384())
        }
        COSEAlgorithm::ES512 | COSEAlgorithm::RS512 | COSEAlgorithm::PS512 => {
            Ok(hash::MessageDigest::sha512())
        }
        COSEAlgorithm::EDDSA => Err(WebauthnError::ConstraintViolation(
            "eddsa does not define a prehash digest",
        )),
        COSEAlgorithm::INSECURE_RS1 => {
            warn!("INSECURE SHA1 USAGE DETECTED");
            Err(WebauthnError::ConstraintViolation(
                "insecure sha1 algorithms are not verified",
            ))
        }
    }
}

/// Hash `input` with the digest implied by the signature algorithm `alg`.
/// The TPM extraData check is defined in these terms.
pub(crate) fn only_hash_from_type(alg: COSEAlgorithm, input: &[u8]) -> WebauthnResult<Vec<u8>> {
    let md = digest_for_algorithm(alg)?;
    hash::hash(md, input)
        .map(|d| d.to_vec())
        .map_err(|_| WebauthnError::BadSignature)
}

fn pkey_verify_signature(
    alg: COSEAlgorithm,
    pkey: &pkey::PKeyRef<pkey::Public>,
    signature: &[u8],
    verification_data: &[u8],
) -> WebauthnResult<bool> {
    match alg {
        COSEAlgorithm::ES256
        | COSEAlgorithm::ES384
        | COSEAlgorithm::ES512
        | COSEAlgorithm::RS256
        | COSEAlgorithm::RS384
        | COSEAlgorithm::RS512 => {
            let md = digest_for_algorithm(alg)?;
            let mut verifier =
                sign::Verifier::new(md, pkey).map_err(|_| WebauthnError::BadSignature)?;
            verifier
                .update(verification_data)
                .map_err(|_| WebauthnError::BadSignature)?;
            // A malformed signature encoding is just an invalid signature.
            Ok(verifier.verify(signature).unwrap_or(false))
        }
        COSEAlgorithm::PS256 | COSEAlgorithm::PS384 | COSEAlgorithm::PS512 => {
            let md = digest_for_algorithm(alg)?;
            let mut verifier =
                sign::Verifier::new(md, pkey).map_err(|_| WebauthnError::BadSignature)?;
            verifier
                .set_rsa_padding(rsa::Padding::PKCS1_PSS)
                .map_err(|_| WebauthnError::BadSignature)?;
            verifier
                .update(verification_data)
                .map_err(|_| WebauthnError::BadSignature)?;
            Ok(verifier.verify(signature).unwrap_or(false))
        }
        COSEAlgorithm::EDDSA => {
            let mut verifier = sign::Verifier::new_without_digest(pkey)
                .map_err(|_| WebauthnError::BadSignature)?;
            Ok(verifier
                .verify_oneshot(signature, verification_data)
                .unwrap_or(false))
        }
        COSEAlgorithm::INSECURE_RS1 => {
            warn!("INSECURE SHA1 USAGE DETECTED");
            Err(WebauthnError::ConstraintViolation(
                "insecure sha1 algorithms are not verified",
            ))
        }
    }
}

/// Verify a signature over `verification_data` with the public key of an
/// x509 certificate, using the signature algorithm identified by `alg`.
pub(crate) fn verify_signature(
    alg: COSEAlgorithm,
    cert: &x509::X509,
    signature: &[u8],
    verification_data: &[u8],
) -> WebauthnResult<bool> {
    let pkey = cert
        .public_key()
        .map_err(|_| WebauthnError::BadSignature)?;
    pkey_verify_signature(alg, &pkey, signature, verification_data)
}

impl ECDSACurve {
    fn to_openssl_nid(self) -> nid::Nid {
        match self {
            ECDSACurve::SECP256R1 => nid::Nid::X9_62_PRIME256V1,
            ECDSACurve::SECP384R1 => nid::Nid::SECP384R1,
            ECDSACurve::SECP521R1 => nid::Nid::SECP521R1,
        }
    }

    fn from_openssl_nid(value: nid::Nid) -> WebauthnResult<Self> {
        match value {
            nid::Nid::X9_62_PRIME256V1 => Ok(ECDSACurve::SECP256R1),
            nid::Nid::SECP384R1 => Ok(ECDSACurve::SECP384R1),
            nid::Nid::SECP521R1 => Ok(ECDSACurve::SECP521R1),
            _ => Err(WebauthnError::ConstraintViolation(
                "certificate key is on an unsupported ec curve",
            )),
        }
    }
}

impl TryFrom<&serde_cbor::Value> for COSEKey {
    type Error = WebauthnError;
    fn try_from(d: &serde_cbor::Value) -> Result<COSEKey, Self::Error> {
        let m = cbor_try_map!(d)?;

        // See also https://tools.ietf.org/html/rfc8152#section-3.1
        // These values look like:
        // Object({
        //     // negative (-) values are per-algo specific
        //     Integer(-3): Bytes([48, 185, ...]),
        //     Integer(-2): Bytes([158, 212, ...]),
        //     Integer(-1): U64(1),
        //     Integer(1): U64(2), // key type identifier
        //     Integer(3): I64(-7) // algorithm, see https://tools.ietf.org/html/rfc8152#section-8.1
        // })
        // Now each of these integers has a specific meaning, and you need to parse them in order.
        // First, value 1 for the key type.

        let key_type_value = m
            .get(&serde_cbor::Value::Integer(1))
            .ok_or(WebauthnError::ConstraintViolation("cose key lacks kty"))?;
        let key_type = cbor_try_i128!(key_type_value)?;

        let content_type_value = m
            .get(&serde_cbor::Value::Integer(3))
            .ok_or(WebauthnError::ConstraintViolation("cose key lacks alg"))?;
        let content_type = cbor_try_i128!(content_type_value)?;

        let type_ = COSEAlgorithm::try_from(content_type)?;

        if key_type == (COSEKeyTypeId::EC_EC2 as i128)
            && (type_ == COSEAlgorithm::ES256
                || type_ == COSEAlgorithm::ES384
                || type_ == COSEAlgorithm::ES512)
        {
            // This indicates this is an EC2 key consisting of crv, x, y, which are stored in
            // crv (-1), x (-2) and y (-3)
            let curve_type_value = m
                .get(&serde_cbor::Value::Integer(-1))
                .ok_or(WebauthnError::ConstraintViolation("ec2 key lacks crv"))?;
            let curve_type = cbor_try_i128!(curve_type_value)?;

            let curve = ECDSACurve::try_from(curve_type)?;

            let x_value = m
                .get(&serde_cbor::Value::Integer(-2))
                .ok_or(WebauthnError::ConstraintViolation("ec2 key lacks x"))?;
            let x = cbor_try_bytes!(x_value)?;

            let y_value = m
                .get(&serde_cbor::Value::Integer(-3))
                .ok_or(WebauthnError::ConstraintViolation("ec2 key lacks y"))?;
            let y = cbor_try_bytes!(y_value)?;

            let coord_len = curve.coordinate_size();
            if x.len() != coord_len || y.len() != coord_len {
                return Err(WebauthnError::ConstraintViolation(
                    "ec2 key coordinate size does not match the curve",
                ));
            }

            let cose_key = COSEKey {
                type_,
                key: COSEKeyType::EC_EC2(COSEEC2Key {
                    curve,
                    x: x.to_vec().into(),
                    y: y.to_vec().into(),
                }),
            };

            // The rfc additionally states:
            //   "   Applications MUST check that the curve and the key type are
            //     consistent and reject a key if they are not."
            // this means feeding the values to openssl to validate them for us!
            cose_key.validate()?;
            Ok(cose_key)
        } else if key_type == (COSEKeyTypeId::EC_RSA as i128)
            && (type_ == COSEAlgorithm::RS256
                || type_ == COSEAlgorithm::RS384
                || type_ == COSEAlgorithm::RS512
                || type_ == COSEAlgorithm::PS256
                || type_ == COSEAlgorithm::PS384
                || type_ == COSEAlgorithm::PS512)
        {
            // RSAKey
            // -1 -> n modulus
            // -2 -> e exponent, 3 bytes
            let n_value = m
                .get(&serde_cbor::Value::Integer(-1))
                .ok_or(WebauthnError::ConstraintViolation("rsa key lacks n"))?;
            let n = cbor_try_bytes!(n_value)?;

            let e_value = m
                .get(&serde_cbor::Value::Integer(-2))
                .ok_or(WebauthnError::ConstraintViolation("rsa key lacks e"))?;
            let e = cbor_try_bytes!(e_value)?;

            if !matches!(n.len(), 256 | 384 | 512) || e.len() != 3 {
                return Err(WebauthnError::ConstraintViolation(
                    "rsa key modulus or exponent size invalid",
                ));
            }

            let mut e_temp = [0; 3];
            e_temp.copy_from_slice(e.as_slice());

            let cose_key = COSEKey {
                type_,
                key: COSEKeyType::RSA(COSERSAKey {
                    n: n.to_vec().into(),
                    e: e_temp,
                }),
            };

            cose_key.validate()?;
            Ok(cose_key)
        } else if key_type == (COSEKeyTypeId::EC_OKP as i128) && (type_ == COSEAlgorithm::EDDSA) {
            // https://datatracker.ietf.org/doc/html/rfc8152#section-13.2
            let curve_type_value = m
                .get(&serde_cbor::Value::Integer(-1))
                .ok_or(WebauthnError::ConstraintViolation("okp key lacks crv"))?;
            let curve = cbor_try_i128!(curve_type_value).and_then(EDDSACurve::try_from)?;

            let x_value = m
                .get(&serde_cbor::Value::Integer(-2))
                .ok_or(WebauthnError::ConstraintViolation("okp key lacks x"))?;
            let x = cbor_try_bytes!(x_value)?;

            if x.len() != curve.coordinate_size() {
                return Err(WebauthnError::ConstraintViolation(
                    "okp key coordinate size does not match the curve",
                ));
            }

            let cose_key = COSEKey {
                type_,
                key: COSEKeyType::EC_OKP(COSEOKPKey {
                    curve,
                    x: x.to_vec().into(),
                }),
            };

            cose_key.validate()?;
            Ok(cose_key)
        } else {
            debug!(?key_type, ?type_, "invalid cose key type");
            Err(WebauthnError::ConstraintViolation(
                "cose key type and algorithm are inconsistent",
            ))
        }
    }
}

impl TryFrom<(COSEAlgorithm, &x509::X509)> for COSEKey {
    type Error = WebauthnError;

    /// Extract the subject public key of a certificate as a COSE key, so it
    /// can be compared to a credential public key for equality.
    fn try_from((alg, cert): (COSEAlgorithm, &x509::X509)) -> Result<COSEKey, Self::Error> {
        let pkey = cert.public_key().map_err(|_| {
            WebauthnError::ConstraintViolation("certificate public key unreadable")
        })?;

        let key = match alg {
            COSEAlgorithm::ES256 | COSEAlgorithm::ES384 | COSEAlgorithm::ES512 => {
                let ec_key = pkey.ec_key().map_err(|_| {
                    WebauthnError::ConstraintViolation("certificate key is not an ec key")
                })?;
                let curve_nid = ec_key.group().curve_name().ok_or(
                    WebauthnError::ConstraintViolation("certificate ec key has no named curve"),
                )?;
                let curve = ECDSACurve::from_openssl_nid(curve_nid)?;

                let mut ctx = bn::BigNumContext::new()
                    .map_err(|_| WebauthnError::BadSignature)?;
                let mut xbn = bn::BigNum::new().map_err(|_| WebauthnError::BadSignature)?;
                let mut ybn = bn::BigNum::new().map_err(|_| WebauthnError::BadSignature)?;
                ec_key
                    .public_key()
                    .affine_coordinates_gfp(ec_key.group(), &mut xbn, &mut ybn, &mut ctx)
                    .map_err(|_| WebauthnError::BadSignature)?;

                let coord_len = curve.coordinate_size() as i32;
                let x = xbn
                    .to_vec_padded(coord_len)
                    .map_err(|_| WebauthnError::BadSignature)?;
                let y = ybn
                    .to_vec_padded(coord_len)
                    .map_err(|_| WebauthnError::BadSignature)?;

                Ok(COSEKeyType::EC_EC2(COSEEC2Key {
                    curve,
                    x: x.into(),
                    y: y.into(),
                }))
            }
            COSEAlgorithm::RS256
            | COSEAlgorithm::RS384
            | COSEAlgorithm::RS512
            | COSEAlgorithm::PS256
            | COSEAlgorithm::PS384
            | COSEAlgorithm::PS512 => {
                let rsa_key = pkey.rsa().map_err(|_| {
                    WebauthnError::ConstraintViolation("certificate key is not an rsa key")
                })?;
                let n = rsa_key.n().to_vec();
                let e = rsa_key
                    .e()
                    .to_vec_padded(3)
                    .map_err(|_| WebauthnError::BadSignature)?;
                let mut e_temp = [0; 3];
                e_temp.copy_from_slice(&e);

                Ok(COSEKeyType::RSA(COSERSAKey {
                    n: n.into(),
                    e: e_temp,
                }))
            }
            COSEAlgorithm::EDDSA | COSEAlgorithm::INSECURE_RS1 => {
                error!(
                    "unsupported X509 to COSE conversion for COSE algorithm type {:?}",
                    alg
                );
                Err(WebauthnError::ConstraintViolation(
                    "certificate key type unsupported for comparison",
                ))
            }
        }?;

        Ok(COSEKey { type_: alg, key })
    }
}

impl COSEKey {
    /// Export this key as the raw ANSI X9.62 uncompressed point
    /// `0x04 || x || y`. Only defined for EC2 keys; fido-u2f requires P-256,
    /// which the caller asserts via the curve.
    pub(crate) fn get_alg_key_ecc_x962_raw(&self) -> WebauthnResult<Vec<u8>> {
        match &self.key {
            COSEKeyType::EC_EC2(ecpk) => {
                let r: [u8; 1] = [0x04];
                Ok(r.iter()
                    .chain(ecpk.x.0.iter())
                    .chain(ecpk.y.0.iter())
                    .copied()
                    .collect())
            }
            _ => {
                debug!("get_alg_key_ecc_x962_raw");
                Err(WebauthnError::ConstraintViolation(
                    "only ec2 keys have an x962 representation",
                ))
            }
        }
    }

    /// Assert that this key is structurally sound by realising it as an
    /// OpenSSL public key.
    pub(crate) fn validate(&self) -> WebauthnResult<()> {
        self.get_openssl_pkey().map(|_| ())
    }

    /// Retrieve the public key of this COSEKey as an OpenSSL structure.
    pub(crate) fn get_openssl_pkey(&self) -> WebauthnResult<pkey::PKey<pkey::Public>> {
        match &self.key {
            COSEKeyType::EC_EC2(ec2k) => {
                let curve = ec2k.curve.to_openssl_nid();
                let ec_group = ec::EcGroup::from_curve_name(curve)
                    .map_err(|_| WebauthnError::ConstraintViolation("ec group unavailable"))?;

                let xbn = bn::BigNum::from_slice(ec2k.x.as_ref())
                    .map_err(|_| WebauthnError::ConstraintViolation("ec x coordinate invalid"))?;
                let ybn = bn::BigNum::from_slice(ec2k.y.as_ref())
                    .map_err(|_| WebauthnError::ConstraintViolation("ec y coordinate invalid"))?;

                let ec_key = ec::EcKey::from_public_key_affine_coordinates(&ec_group, &xbn, &ybn)
                    .map_err(|_| {
                    WebauthnError::ConstraintViolation("ec point is not on the curve")
                })?;

                // Validate the key is sound. IIRC this actually checks the values
                // are correctly on the curve as specified
                ec_key.check_key().map_err(|_| {
                    WebauthnError::ConstraintViolation("ec public key failed validation")
                })?;

                pkey::PKey::from_ec_key(ec_key)
                    .map_err(|_| WebauthnError::ConstraintViolation("ec public key invalid"))
            }
            COSEKeyType::RSA(rsak) => {
                let nbn = bn::BigNum::from_slice(rsak.n.as_ref())
                    .map_err(|_| WebauthnError::ConstraintViolation("rsa modulus invalid"))?;
                let ebn = bn::BigNum::from_slice(&rsak.e)
                    .map_err(|_| WebauthnError::ConstraintViolation("rsa exponent invalid"))?;

                let rsa_key = rsa::Rsa::from_public_components(nbn, ebn)
                    .map_err(|_| WebauthnError::ConstraintViolation("rsa public key invalid"))?;

                pkey::PKey::from_rsa(rsa_key)
                    .map_err(|_| WebauthnError::ConstraintViolation("rsa public key invalid"))
            }
            COSEKeyType::EC_OKP(edk) => {
                let id = match edk.curve {
                    EDDSACurve::ED25519 => pkey::Id::ED25519,
                    EDDSACurve::ED448 => pkey::Id::ED448,
                };
                pkey::PKey::public_key_from_raw_bytes(edk.x.as_ref(), id)
                    .map_err(|_| WebauthnError::ConstraintViolation("okp public key invalid"))
            }
        }
    }

    /// Verifies data was signed with this [COSEKey].
    pub(crate) fn verify_signature(
        &self,
        signature: &[u8],
        verification_data: &[u8],
    ) -> WebauthnResult<bool> {
        let pkey = self.get_openssl_pkey()?;
        pkey_verify_signature(self.type_, &pkey, signature, verification_data)
    }
}

fn check_extension<T, F>(
    extension: &Result<Option<T>, X509Error>,
    must_be_present: bool,
    f: F,
) -> WebauthnResult<()>
where
    F: Fn(&T) -> bool,
{
    match extension {
        Ok(Some(extension)) => {
            if f(extension) {
                Ok(())
            } else {
                trace!("extension check failed");
                Err(WebauthnError::BadAttestationStatement(
                    "attestation certificate requirements not met",
                ))
            }
        }
        Ok(None) => {
            if must_be_present {
                trace!("required extension not present");
                Err(WebauthnError::BadAttestationStatement(
                    "attestation certificate requirements not met",
                ))
            } else {
                Ok(())
            }
        }
        Err(_) => {
            debug!("extension present multiple times or invalid");
            Err(WebauthnError::BadAttestationStatement(
                "attestation certificate requirements not met",
            ))
        }
    }
}

/// Verify that attestnCert meets the requirements in § 8.2.1 Packed
/// Attestation Statement Certificate Requirements.
/// <https://w3c.github.io/webauthn/#sctn-packed-attestation-cert-requirements>
pub(crate) fn assert_packed_attest_req(pubk: &x509::X509) -> WebauthnResult<()> {
    let der_bytes = pubk
        .to_der()
        .map_err(|_| WebauthnError::BadAttestationStatement("certificate unencodable"))?;
    let x509_cert = x509_parser::parse_x509_certificate(&der_bytes)
        .map_err(|_| WebauthnError::BadAttestationStatement("certificate der invalid"))?
        .1;

    // The attestation certificate MUST have the following fields/extensions:
    // Version MUST be set to 3 (which is indicated by an ASN.1 INTEGER with value 2).
    if x509_cert.version != X509Version::V3 {
        trace!("X509 Version != v3");
        return Err(WebauthnError::BadAttestationStatement(
            "attestation certificate requirements not met",
        ));
    }

    // Subject field MUST be set to:
    //
    // Subject-C
    //  ISO 3166 code specifying the country where the Authenticator vendor is incorporated (PrintableString)
    // Subject-O
    //  Legal name of the Authenticator vendor (UTF8String)
    // Subject-OU
    //  Literal string "Authenticator Attestation" (UTF8String)
    // Subject-CN
    //  A UTF8String of the vendor's choosing
    let subject = &x509_cert.subject;

    let subject_c = subject.iter_country().take(1).next();
    let subject_o = subject.iter_organization().take(1).next();
    let subject_ou = subject.iter_organizational_unit().take(1).next();
    let subject_cn = subject.iter_common_name().take(1).next();

    if subject_c.is_none() || subject_o.is_none() || subject_cn.is_none() {
        trace!("invalid subject details");
        return Err(WebauthnError::BadAttestationStatement(
            "attestation certificate requirements not met",
        ));
    }

    match subject_ou {
        Some(ou) => match ou.as_str() {
            Ok(ou_d) => {
                if ou_d != "Authenticator Attestation" {
                    trace!("ou != Authenticator Attestation");
                    return Err(WebauthnError::BadAttestationStatement(
                        "attestation certificate requirements not met",
                    ));
                }
            }
            Err(_) => {
                trace!("ou invalid");
                return Err(WebauthnError::BadAttestationStatement(
                    "attestation certificate requirements not met",
                ));
            }
        },
        None => {
            trace!("ou not found");
            return Err(WebauthnError::BadAttestationStatement(
                "attestation certificate requirements not met",
            ));
        }
    }

    // If the related attestation root certificate is used for multiple authenticator models,
    // the Extension OID 1.3.6.1.4.1.45724.1.1.4 (id-fido-gen-ce-aaguid) MUST be present,
    // containing the AAGUID as a 16-byte OCTET STRING. The extension MUST NOT be marked as critical.
    //
    // The value match against the AAGUID is checked in attestation
    // verification, so only the critical requirement is asserted here.
    check_extension(
        &x509_cert.get_extension_unique(&crate::attestation::FIDO_GEN_CE_AAGUID_OID),
        false,
        |fido_gen_ce_aaguid| !fido_gen_ce_aaguid.critical,
    )?;

    // The Basic Constraints extension MUST have the CA component set to false.
    check_extension(&x509_cert.basic_constraints(), true, |basic_constraints| {
        !basic_constraints.value.ca
    })?;

    // An Authority Information Access (AIA) extension with entry id-ad-ocsp and a CRL
    // Distribution Point extension [RFC5280] are both OPTIONAL as the status of many
    // attestation certificates is available through authenticator metadata services.

    Ok(())
}

/// The TPM device properties an AIK certificate carries in its Subject
/// Alternative Name, per [TPMv2-EK-Profile] section 3.2.9.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmDeviceProperty {
    /// The TPM manufacturer, in `id:HHHHHHHH` vendor id form.
    pub manufacturer: String,
    /// The TPM part number.
    pub model: String,
    /// The TPM firmware version.
    pub version: String,
}

#[derive(Default)]
struct TpmSanDataBuilder<'a> {
    manufacturer: Option<&'a str>,
    model: Option<&'a str>,
    version: Option<&'a str>,
}

impl<'a> TpmSanDataBuilder<'a> {
    fn new() -> Self {
        Default::default()
    }

    fn manufacturer(mut self, value: &'a str) -> Self {
        self.manufacturer = Some(value);
        self
    }

    fn model(mut self, value: &'a str) -> Self {
        self.model = Some(value);
        self
    }

    fn version(mut self, value: &'a str) -> Self {
        self.version = Some(value);
        self
    }

    fn build(self) -> WebauthnResult<TpmDeviceProperty> {
        self.manufacturer
            .zip(self.model)
            .zip(self.version)
            .map(|((manufacturer, model), version)| TpmDeviceProperty {
                manufacturer: manufacturer.to_string(),
                model: model.to_string(),
                version: version.to_string(),
            })
            .ok_or(WebauthnError::BadAttestationStatement(
                "tpm san lacks a required device attribute",
            ))
    }
}

pub(crate) const TCG_AT_TPM_MANUFACTURER_RAW: &[u8] = &der_parser::oid!(raw 2.23.133 .2 .1);
pub(crate) const TCG_AT_TPM_MODEL_RAW: &[u8] = &der_parser::oid!(raw 2.23.133 .2 .2);
pub(crate) const TCG_AT_TPM_VERSION_RAW: &[u8] = &der_parser::oid!(raw 2.23.133 .2 .3);

impl<'a> TryFrom<&'a X509Name<'a>> for TpmDeviceProperty {
    type Error = WebauthnError;

    fn try_from(x509_name: &'a X509Name<'a>) -> Result<Self, Self::Error> {
        x509_name
            .iter_attributes()
            .try_fold(TpmSanDataBuilder::new(), |builder, attribute| {
                Ok(match attribute.attr_type().as_bytes() {
                    TCG_AT_TPM_MANUFACTURER_RAW => builder.manufacturer(attribute.as_str()?),
                    TCG_AT_TPM_MODEL_RAW => builder.model(attribute.as_str()?),
                    TCG_AT_TPM_VERSION_RAW => builder.version(attribute.as_str()?),
                    _ => builder,
                })
            })
            .map_err(|_: X509Error| {
                WebauthnError::BadAttestationStatement("tpm san attributes undecodable")
            })
            .and_then(TpmSanDataBuilder::build)
    }
}

/// Decode the TPM device property from an AIK certificate's Subject
/// Alternative Name. The issuer MUST include TPM manufacturer, part number
/// and firmware version using the directoryName form within the GeneralName
/// structure.
pub(crate) fn tpm_device_property_from_cert(
    aik_cert_der: &[u8],
) -> WebauthnResult<TpmDeviceProperty> {
    let x509_cert = x509_parser::parse_x509_certificate(aik_cert_der)
        .map_err(|_| WebauthnError::BadAttestationStatement("certificate der invalid"))?
        .1;

    let san = match x509_cert.subject_alternative_name() {
        Ok(Some(san)) => san,
        _ => {
            return Err(WebauthnError::BadAttestationStatement(
                "tpm attestation certificate requires a subject alternative name",
            ))
        }
    };

    // From [TPMv2-EK-Profile]: in accordance with RFC 5280, this extension
    // MUST be critical if subject is empty.
    if !san.critical {
        return Err(WebauthnError::BadAttestationStatement(
            "tpm san must be critical",
        ));
    }

    san.value
        .general_names
        .iter()
        .find_map(|general_name| {
            if let GeneralName::DirectoryName(x509_name) = general_name {
                TpmDeviceProperty::try_from(x509_name).ok()
            } else {
                None
            }
        })
        .ok_or(WebauthnError::BadAttestationStatement(
            "tpm san carries no directoryName device property",
        ))
}

/// Verify that an AIK certificate meets the requirements in § 8.3.1 TPM
/// Attestation Statement Certificate Requirements, excluding the Subject
/// Alternative Name decode which flows through the injected device property
/// hooks.
pub(crate) fn assert_tpm_attest_req(x509: &x509::X509) -> WebauthnResult<()> {
    let der_bytes = x509
        .to_der()
        .map_err(|_| WebauthnError::BadAttestationStatement("certificate unencodable"))?;
    let x509_cert = x509_parser::parse_x509_certificate(&der_bytes)
        .map_err(|_| WebauthnError::BadAttestationStatement("certificate der invalid"))?
        .1;

    // Version MUST be set to 3.
    if x509_cert.version != X509Version::V3 {
        return Err(WebauthnError::BadAttestationStatement(
            "tpm attestation certificate must be v3",
        ));
    }

    // Subject field MUST be set to empty.
    if x509_cert.subject.iter_attributes().next().is_some() {
        return Err(WebauthnError::BadAttestationStatement(
            "tpm attestation certificate subject must be empty",
        ));
    }

    // The Extended Key Usage extension MUST contain the
    // "joint-iso-itu-t(2) internationalorganizations(23) 133 tcg-kp(8)
    // tcg-kp-AIKCertificate(3)" OID.
    check_extension(&x509_cert.extended_key_usage(), true, |extended_key_usage| {
        extended_key_usage
            .value
            .other
            .contains(&der_parser::oid!(2.23.133 .8 .3))
    })?;

    // The Basic Constraints extension MUST have the CA component set to false.
    check_extension(&x509_cert.basic_constraints(), true, |basic_constraints| {
        !basic_constraints.value.ca
    })?;

    Ok(())
}

/// The Authority Key Identifier of a certificate, if it carries one.
pub(crate) fn authority_key_identifier(cert: &x509::X509) -> WebauthnResult<Option<Vec<u8>>> {
    let der_bytes = cert
        .to_der()
        .map_err(|_| WebauthnError::CertificateError("certificate unencodable".to_string()))?;
    let x509_cert = x509_parser::parse_x509_certificate(&der_bytes)
        .map_err(|_| WebauthnError::CertificateError("certificate der invalid".to_string()))?
        .1;

    for ext in x509_cert.extensions() {
        if let ParsedExtension::AuthorityKeyIdentifier(aki) = ext.parsed_extension() {
            return Ok(aki.key_identifier.as_ref().map(|kid| kid.0.to_vec()));
        }
    }
    Ok(None)
}

/// The Subject Key Identifier of a certificate. When the extension is
/// absent, falls back to the RFC 5280 method 1 identifier - the SHA-1 of
/// the subjectPublicKey bit string.
pub(crate) fn subject_key_identifier(cert: &x509::X509) -> WebauthnResult<Vec<u8>> {
    let der_bytes = cert
        .to_der()
        .map_err(|_| WebauthnError::CertificateError("certificate unencodable".to_string()))?;
    let x509_cert = x509_parser::parse_x509_certificate(&der_bytes)
        .map_err(|_| WebauthnError::CertificateError("certificate der invalid".to_string()))?
        .1;

    for ext in x509_cert.extensions() {
        if let ParsedExtension::SubjectKeyIdentifier(ski) = ext.parsed_extension() {
            return Ok(ski.0.to_vec());
        }
    }

    let spk = &x509_cert
        .tbs_certificate
        .subject_pki
        .subject_public_key
        .data;
    Ok(compute_sha1(spk).to_vec())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;
    use hex_literal::hex;
    use serde_cbor::Value;

    #[test]
    fn cbor_es256() {
        let hex_data = hex!(
                "A5"         // Map - 5 elements
                "01 02"      //   1:   2,  ; kty: EC2 key type
                "03 26"      //   3:  -7,  ; alg: ES256 signature algorithm
                "20 01"      //  -1:   1,  ; crv: P-256 curve
                "21 58 20   65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d" // -2: x ; x-coordinate
                "22 58 20   1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c" // -3: y ; y-coordinate
        );

        let val: Value = serde_cbor::from_slice(&hex_data).unwrap();
        let key = COSEKey::try_from(&val).unwrap();

        assert_eq!(key.type_, COSEAlgorithm::ES256);
        match key.key {
            COSEKeyType::EC_EC2(pkey) => {
                assert_eq!(
                    pkey.x.as_ref(),
                    hex!("65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d")
                );
                assert_eq!(
                    pkey.y.as_ref(),
                    hex!("1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c")
                );
                assert_eq!(pkey.curve, ECDSACurve::SECP256R1);
            }
            _ => panic!("Key should be parsed EC2 key"),
        }
    }

    #[test]
    fn cbor_es384() {
        let hex_data = hex!(
                "A5"         // Map - 5 elements
                "01 02"      //   1:   2,  ; kty: EC2 key type
                "03 38 22"   //   3:  -35, ; alg: ES384 signature algorithm
                "20 02"      //  -1:   2,  ; crv: P-384 curve
                "21 58 30   ceeaf818731db7af2d02e029854823d71bdbf65fb0c6ff69" // -2: x ; x-coordinate
                           "42c9cf891efe18ea81430517d777f5c43550da801be5bf2f"
                "22 58 30   dda1d0ead72e042efb7c36a38cc021abb2ca1a2e38159edd" // -3: y ; y-coordinate
                           "a8c25f391e9a38d79dd56b9427d1c7c70cfa778ab849b087"
        );

        let val: Value = serde_cbor::from_slice(&hex_data).unwrap();
        let key = COSEKey::try_from(&val).unwrap();

        assert_eq!(key.type_, COSEAlgorithm::ES384);
        match key.key {
            COSEKeyType::EC_EC2(pkey) => {
                assert_eq!(pkey.curve, ECDSACurve::SECP384R1);
            }
            _ => panic!("Key should be parsed EC2 key"),
        }
    }

    #[test]
    fn cbor_es256_invalid_coordinates_rejected() {
        // x truncated to 31 bytes.
        let hex_data = hex!(
                "A5"
                "01 02"
                "03 26"
                "20 01"
                "21 58 1f   eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d"
                "22 58 20   1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c"
        );

        let val: Value = serde_cbor::from_slice(&hex_data).unwrap();
        assert!(COSEKey::try_from(&val).is_err());
    }

    #[test]
    fn verify_signature_es256_roundtrip() {
        let group = ec::EcGroup::from_curve_name(nid::Nid::X9_62_PRIME256V1).unwrap();
        let eckey = ec::EcKey::generate(&group).unwrap();
        let pkey = pkey::PKey::from_ec_key(eckey.clone()).unwrap();

        let data = b"the quick brown fox jumps over the lazy dog";
        let mut signer = sign::Signer::new(hash::MessageDigest::sha256(), &pkey).unwrap();
        signer.update(data).unwrap();
        let sig = signer.sign_to_vec().unwrap();

        // Round trip through the COSE representation.
        let mut ctx = bn::BigNumContext::new().unwrap();
        let mut xbn = bn::BigNum::new().unwrap();
        let mut ybn = bn::BigNum::new().unwrap();
        eckey
            .public_key()
            .affine_coordinates_gfp(&group, &mut xbn, &mut ybn, &mut ctx)
            .unwrap();

        let cose_key = COSEKey {
            type_: COSEAlgorithm::ES256,
            key: COSEKeyType::EC_EC2(COSEEC2Key {
                curve: ECDSACurve::SECP256R1,
                x: xbn.to_vec_padded(32).unwrap().into(),
                y: ybn.to_vec_padded(32).unwrap().into(),
            }),
        };

        assert!(cose_key.verify_signature(&sig, data).unwrap());

        // A single corrupted byte in the signed data must fail.
        let mut bad_data = data.to_vec();
        bad_data[0] ^= 0x01;
        assert!(!cose_key.verify_signature(&sig, &bad_data).unwrap());

        // As must a corrupted signature.
        let mut bad_sig = sig.clone();
        let last = bad_sig.len() - 1;
        bad_sig[last] ^= 0x01;
        assert!(!cose_key.verify_signature(&bad_sig, data).unwrap_or(false));
    }

    #[test]
    fn verify_signature_rs256_roundtrip() {
        let rsa_key = rsa::Rsa::generate(2048).unwrap();
        let pkey = pkey::PKey::from_rsa(rsa_key.clone()).unwrap();

        let data = b"registration ceremony data";
        let mut signer = sign::Signer::new(hash::MessageDigest::sha256(), &pkey).unwrap();
        signer.update(data).unwrap();
        let sig = signer.sign_to_vec().unwrap();

        let cose_key = COSEKey {
            type_: COSEAlgorithm::RS256,
            key: COSEKeyType::RSA(COSERSAKey {
                n: rsa_key.n().to_vec().into(),
                e: [0x01, 0x00, 0x01],
            }),
        };

        assert!(cose_key.verify_signature(&sig, data).unwrap());
        assert!(!cose_key.verify_signature(&sig, b"tampered").unwrap());
    }

    #[test]
    fn x962_raw_point_export() {
        let cose_key = COSEKey {
            type_: COSEAlgorithm::ES256,
            key: COSEKeyType::EC_EC2(COSEEC2Key {
                curve: ECDSACurve::SECP256R1,
                x: vec![0xaa; 32].into(),
                y: vec![0xbb; 32].into(),
            }),
        };
        let raw = cose_key.get_alg_key_ecc_x962_raw().unwrap();
        assert_eq!(raw.len(), 65);
        assert_eq!(raw[0], 0x04);
        assert_eq!(&raw[1..33], &[0xaa; 32]);
        assert_eq!(&raw[33..65], &[0xbb; 32]);
    }

    #[test]
    fn insecure_sha1_never_verifies() {
        let rsa_key = rsa::Rsa::generate(2048).unwrap();
        let cose_key = COSEKey {
            type_: COSEAlgorithm::INSECURE_RS1,
            key: COSEKeyType::RSA(COSERSAKey {
                n: rsa_key.n().to_vec().into(),
                e: [0x01, 0x00, 0x01],
            }),
        };
        assert!(cose_key.verify_signature(&[0u8; 256], b"data").is_err());
    }
}
