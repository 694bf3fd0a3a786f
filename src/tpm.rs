//! TPM 2.0 binary structures needed to verify tpm format attestation
//! statements - TPMS_ATTEST (certInfo) and TPMT_PUBLIC (pubArea), as
//! defined in [TPMv2-Part2] sections 10.12.8 and 12.2.4. All integers are
//! big endian on the wire.

use nom::bytes::complete::take;
use nom::combinator::all_consuming;
use nom::multi::length_data;
use nom::number::complete::{be_u16, be_u32, be_u64, u8 as be_u8};

use crate::error::WebauthnError;

/// A TPM_ALG_ID value. Only the algorithms that appear in attestation
/// structures are represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TpmAlgId {
    /// TPM_ALG_RSA
    Rsa,
    /// TPM_ALG_SHA1
    Sha1,
    /// TPM_ALG_SHA256
    Sha256,
    /// TPM_ALG_SHA384
    Sha384,
    /// TPM_ALG_SHA512
    Sha512,
    /// TPM_ALG_NULL
    Null,
    /// TPM_ALG_ECC
    Ecc,
}

impl TryFrom<u16> for TpmAlgId {
    type Error = WebauthnError;

    fn try_from(v: u16) -> Result<Self, Self::Error> {
        match v {
            0x0001 => Ok(TpmAlgId::Rsa),
            0x0004 => Ok(TpmAlgId::Sha1),
            0x000b => Ok(TpmAlgId::Sha256),
            0x000c => Ok(TpmAlgId::Sha384),
            0x000d => Ok(TpmAlgId::Sha512),
            0x0010 => Ok(TpmAlgId::Null),
            0x0023 => Ok(TpmAlgId::Ecc),
            _ => Err(WebauthnError::BadAttestationStatement(
                "tpm algorithm unsupported",
            )),
        }
    }
}

/// A TPM_ST structure tag. Only the attestation tags are represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TpmSt {
    AttestNv,
    AttestCommandAudit,
    AttestSessionAudit,
    AttestCertify,
    AttestQuote,
    AttestTime,
    AttestCreation,
}

impl TryFrom<u16> for TpmSt {
    type Error = WebauthnError;

    fn try_from(v: u16) -> Result<Self, Self::Error> {
        match v {
            0x8014 => Ok(TpmSt::AttestNv),
            0x8015 => Ok(TpmSt::AttestCommandAudit),
            0x8016 => Ok(TpmSt::AttestSessionAudit),
            0x8017 => Ok(TpmSt::AttestCertify),
            0x8018 => Ok(TpmSt::AttestQuote),
            0x8019 => Ok(TpmSt::AttestTime),
            0x801a => Ok(TpmSt::AttestCreation),
            _ => Err(WebauthnError::BadAttestationStatement(
                "tpm structure tag is not an attestation tag",
            )),
        }
    }
}

/// TPMS_CLOCK_INFO - clock state at attestation time. Retained so callers
/// can feed it to risk engines; never validated.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub(crate) struct TpmsClockInfo {
    pub clock: u64,
    pub reset_count: u32,
    pub restart_count: u32,
    pub safe: bool,
}

/// TPM2B_NAME. The content is either empty, a raw handle, or a nameAlg
/// prefixed digest. The digest form retains the two prefix bytes so that
/// name comparison also pins the algorithm identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Tpm2bName {
    None,
    Handle(u32),
    Digest(Vec<u8>),
}

/// TPMU_ATTEST - the attested union. Only certify carries data this
/// library consumes.
#[derive(Debug, Clone)]
pub(crate) enum TpmuAttest {
    /// TPMS_CERTIFY_INFO - name and qualifiedName of the certified object.
    AttestCertify(Tpm2bName, Tpm2bName),
    /// Another attestation type, unsupported for webauthn.
    Unsupported,
}

/// TPMS_ATTEST as decoded from the attStmt certInfo field.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub(crate) struct TpmsAttest {
    /// The magic value. Must be TPM_GENERATED_VALUE, checked by the verifier.
    pub magic: u32,
    /// The structure tag.
    pub type_: TpmSt,
    /// The name of the signing key.
    pub qualified_signer: Tpm2bName,
    /// External data supplied to the certify operation - for webauthn, the
    /// hash of attToBeSigned.
    pub extra_data: Option<Vec<u8>>,
    /// Clock state.
    pub clock_info: TpmsClockInfo,
    /// TPM firmware version.
    pub firmware_version: u64,
    /// The attested structure.
    pub typeattested: TpmuAttest,
}

fn parse_tpm2b<'a>(input: &'a [u8]) -> nom::IResult<&'a [u8], &'a [u8]> {
    length_data(be_u16)(input)
}

fn parse_tpm2b_name(input: &[u8]) -> nom::IResult<&[u8], Tpm2bName> {
    let (rem, content) = parse_tpm2b(input)?;
    let name = match content.len() {
        0 => Tpm2bName::None,
        4 => {
            let (_, handle) = be_u32(content)?;
            Tpm2bName::Handle(handle)
        }
        _ => Tpm2bName::Digest(content.to_vec()),
    };
    Ok((rem, name))
}

fn parse_tpms_clock_info(input: &[u8]) -> nom::IResult<&[u8], TpmsClockInfo> {
    let (input, clock) = be_u64(input)?;
    let (input, reset_count) = be_u32(input)?;
    let (input, restart_count) = be_u32(input)?;
    let (input, safe) = be_u8(input)?;
    Ok((
        input,
        TpmsClockInfo {
            clock,
            reset_count,
            restart_count,
            safe: safe != 0,
        },
    ))
}

fn parse_tpms_attest(input: &[u8]) -> nom::IResult<&[u8], TpmsAttest> {
    let (input, magic) = be_u32(input)?;
    let (input, type_raw) = be_u16(input)?;
    let (input, qualified_signer) = parse_tpm2b_name(input)?;
    let (input, extra_data) = parse_tpm2b(input)?;
    let (input, clock_info) = parse_tpms_clock_info(input)?;
    let (input, firmware_version) = be_u64(input)?;

    let type_ = TpmSt::try_from(type_raw)
        .map_err(|_| nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Tag)))?;

    let (input, typeattested) = match type_ {
        TpmSt::AttestCertify => {
            let (input, name) = parse_tpm2b_name(input)?;
            let (input, qualified_name) = parse_tpm2b_name(input)?;
            (input, TpmuAttest::AttestCertify(name, qualified_name))
        }
        _ => {
            let (input, _) = take(input.len())(input)?;
            (input, TpmuAttest::Unsupported)
        }
    };

    let extra_data = if extra_data.is_empty() {
        None
    } else {
        Some(extra_data.to_vec())
    };

    Ok((
        input,
        TpmsAttest {
            magic,
            type_,
            qualified_signer,
            extra_data,
            clock_info,
            firmware_version,
            typeattested,
        },
    ))
}

impl TryFrom<&[u8]> for TpmsAttest {
    type Error = WebauthnError;

    fn try_from(data: &[u8]) -> Result<TpmsAttest, Self::Error> {
        all_consuming(parse_tpms_attest)(data)
            .map(|(_, attest)| attest)
            .map_err(|e| {
                debug!(?e, "tpms attest parse failure");
                WebauthnError::BadAttestationStatement("tpm certInfo undecodable")
            })
    }
}

/// TPM_ECC_CURVE identifiers for the NIST prime curves webauthn uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TpmEccCurve {
    NistP256,
    NistP384,
    NistP521,
}

impl TryFrom<u16> for TpmEccCurve {
    type Error = WebauthnError;

    fn try_from(v: u16) -> Result<Self, Self::Error> {
        match v {
            0x0003 => Ok(TpmEccCurve::NistP256),
            0x0004 => Ok(TpmEccCurve::NistP384),
            0x0005 => Ok(TpmEccCurve::NistP521),
            _ => Err(WebauthnError::BadAttestationStatement(
                "tpm ecc curve unsupported",
            )),
        }
    }
}

/// TPMS_RSA_PARMS with the symmetric and scheme fields already consumed.
/// An exponent of zero means the TPM default of 2^16 + 1.
#[derive(Debug, Clone)]
pub(crate) struct TpmsRsaParms {
    #[allow(dead_code)]
    pub key_bits: u16,
    pub exponent: u32,
}

/// TPMS_ECC_PARMS with the symmetric, scheme and kdf fields already
/// consumed.
#[derive(Debug, Clone)]
pub(crate) struct TpmsEccParms {
    pub curve_id: TpmEccCurve,
}

/// TPMU_PUBLIC_PARMS
#[derive(Debug, Clone)]
pub(crate) enum TpmuPublicParms {
    Rsa(TpmsRsaParms),
    Ecc(TpmsEccParms),
}

/// TPMU_PUBLIC_ID
#[derive(Debug, Clone)]
pub(crate) enum TpmuPublicId {
    /// The RSA modulus.
    Rsa(Vec<u8>),
    /// The ECC point coordinates.
    Ecc { x: Vec<u8>, y: Vec<u8> },
}

/// TPMT_PUBLIC as decoded from the attStmt pubArea field.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub(crate) struct TpmtPublic {
    pub type_: TpmAlgId,
    /// The algorithm the object's name digest is computed with.
    pub name_alg: TpmAlgId,
    pub object_attributes: u32,
    pub auth_policy: Vec<u8>,
    pub parameters: TpmuPublicParms,
    pub unique: TpmuPublicId,
}

// TPMT_SYM_DEF_OBJECT - attestation keys are not symmetric, so only
// TPM_ALG_NULL is accepted here.
fn parse_tpmt_sym_def_object(input: &[u8]) -> nom::IResult<&[u8], ()> {
    let (input, algorithm) = be_u16(input)?;
    if algorithm == 0x0010 {
        Ok((input, ()))
    } else {
        Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        )))
    }
}

// TPMT_RSA_SCHEME / TPMT_ECC_SCHEME / TPMT_KDF_SCHEME - either TPM_ALG_NULL
// or a signing scheme carrying its hash algorithm.
fn parse_tpmt_scheme(input: &[u8]) -> nom::IResult<&[u8], Option<u16>> {
    let (input, algorithm) = be_u16(input)?;
    match algorithm {
        0x0010 => Ok((input, None)),
        // RSASSA, RSAPSS, ECDSA
        0x0014 | 0x0016 | 0x0018 => {
            let (input, hash_alg) = be_u16(input)?;
            Ok((input, Some(hash_alg)))
        }
        _ => Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        ))),
    }
}

fn parse_tpmt_public(input: &[u8]) -> nom::IResult<&[u8], TpmtPublic> {
    let (input, type_raw) = be_u16(input)?;
    let (input, name_alg_raw) = be_u16(input)?;
    let (input, object_attributes) = be_u32(input)?;
    let (input, auth_policy) = parse_tpm2b(input)?;

    let fail =
        |i| nom::Err::Failure(nom::error::Error::new(i, nom::error::ErrorKind::Tag));

    let type_ = TpmAlgId::try_from(type_raw).map_err(|_| fail(input))?;
    let name_alg = TpmAlgId::try_from(name_alg_raw).map_err(|_| fail(input))?;

    let (input, parameters, unique) = match type_ {
        TpmAlgId::Rsa => {
            let (input, _symmetric) = parse_tpmt_sym_def_object(input)?;
            let (input, _scheme) = parse_tpmt_scheme(input)?;
            let (input, key_bits) = be_u16(input)?;
            let (input, exponent) = be_u32(input)?;
            let (input, modulus) = parse_tpm2b(input)?;
            (
                input,
                TpmuPublicParms::Rsa(TpmsRsaParms { key_bits, exponent }),
                TpmuPublicId::Rsa(modulus.to_vec()),
            )
        }
        TpmAlgId::Ecc => {
            let (input, _symmetric) = parse_tpmt_sym_def_object(input)?;
            let (input, _scheme) = parse_tpmt_scheme(input)?;
            let (input, curve_raw) = be_u16(input)?;
            let (input, _kdf) = parse_tpmt_scheme(input)?;
            let curve_id = TpmEccCurve::try_from(curve_raw).map_err(|_| fail(input))?;
            let (input, x) = parse_tpm2b(input)?;
            let (input, y) = parse_tpm2b(input)?;
            (
                input,
                TpmuPublicParms::Ecc(TpmsEccParms { curve_id }),
                TpmuPublicId::Ecc {
                    x: x.to_vec(),
                    y: y.to_vec(),
                },
            )
        }
        _ => return Err(fail(input)),
    };

    Ok((
        input,
        TpmtPublic {
            type_,
            name_alg,
            object_attributes,
            auth_policy: auth_policy.to_vec(),
            parameters,
            unique,
        },
    ))
}

impl TryFrom<&[u8]> for TpmtPublic {
    type Error = WebauthnError;

    fn try_from(data: &[u8]) -> Result<TpmtPublic, Self::Error> {
        all_consuming(parse_tpmt_public)(data)
            .map(|(_, public)| public)
            .map_err(|e| {
                debug!(?e, "tpmt public parse failure");
                WebauthnError::BadAttestationStatement("tpm pubArea undecodable")
            })
    }
}

/// A TPMT_SIGNATURE. Webauthn carries the signature raw - DER for ECDSA,
/// PKCS#1 for RSA - rather than TPM framed, so the single variant is the
/// raw form.
#[derive(Debug, Clone)]
pub(crate) enum TpmtSignature {
    RawSignature(Vec<u8>),
}

impl TryFrom<&[u8]> for TpmtSignature {
    type Error = WebauthnError;

    fn try_from(data: &[u8]) -> Result<TpmtSignature, Self::Error> {
        if data.is_empty() {
            return Err(WebauthnError::BadAttestationStatement(
                "tpm signature empty",
            ));
        }
        Ok(TpmtSignature::RawSignature(data.to_vec()))
    }
}

/// The two byte algorithm prefix a TPM name digest carries, per
/// [TPMv2-Part1] section 16.
pub(crate) fn name_alg_prefix(alg: TpmAlgId) -> Option<[u8; 2]> {
    match alg {
        TpmAlgId::Sha1 => Some([0x00, 0x04]),
        TpmAlgId::Sha256 => Some([0x00, 0x0b]),
        TpmAlgId::Sha384 => Some([0x00, 0x0c]),
        TpmAlgId::Sha512 => Some([0x00, 0x0d]),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod testbuild {
    //! Byte level builders for the TPM structures, used to assemble
    //! attestation fixtures in tests.

    fn tpm2b(content: &[u8]) -> Vec<u8> {
        let mut out = (content.len() as u16).to_be_bytes().to_vec();
        out.extend_from_slice(content);
        out
    }

    /// Assemble a TPMT_PUBLIC for an RSA 2048 key with nameAlg SHA-256 and
    /// a null scheme.
    pub(crate) fn rsa_pub_area(modulus: &[u8], exponent: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0x0001u16.to_be_bytes()); // TPM_ALG_RSA
        out.extend_from_slice(&0x000bu16.to_be_bytes()); // nameAlg SHA256
        out.extend_from_slice(&0x0004_0072u32.to_be_bytes()); // objectAttributes
        out.extend_from_slice(&tpm2b(&[])); // authPolicy
        out.extend_from_slice(&0x0010u16.to_be_bytes()); // symmetric NULL
        out.extend_from_slice(&0x0010u16.to_be_bytes()); // scheme NULL
        out.extend_from_slice(&2048u16.to_be_bytes()); // keyBits
        out.extend_from_slice(&exponent.to_be_bytes());
        out.extend_from_slice(&tpm2b(modulus));
        out
    }

    /// Assemble a TPMT_PUBLIC for a P-256 ECC key with nameAlg SHA-256.
    pub(crate) fn ecc_pub_area(x: &[u8], y: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0x0023u16.to_be_bytes()); // TPM_ALG_ECC
        out.extend_from_slice(&0x000bu16.to_be_bytes()); // nameAlg SHA256
        out.extend_from_slice(&0x0004_0072u32.to_be_bytes());
        out.extend_from_slice(&tpm2b(&[]));
        out.extend_from_slice(&0x0010u16.to_be_bytes()); // symmetric NULL
        out.extend_from_slice(&0x0010u16.to_be_bytes()); // scheme NULL
        out.extend_from_slice(&0x0003u16.to_be_bytes()); // TPM_ECC_NIST_P256
        out.extend_from_slice(&0x0010u16.to_be_bytes()); // kdf NULL
        out.extend_from_slice(&tpm2b(x));
        out.extend_from_slice(&tpm2b(y));
        out
    }

    /// Assemble a TPMS_ATTEST certify structure over the supplied name and
    /// external data.
    pub(crate) fn attest_certify(magic: u32, st: u16, extra_data: &[u8], name: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&magic.to_be_bytes());
        out.extend_from_slice(&st.to_be_bytes());
        out.extend_from_slice(&tpm2b(b"\x00\x0b\x01\x02\x03\x04\x05\x06\x07\x08\x09\x0a\x0b\x0c\x0d\x0e\x0f\x10\x11\x12\x13\x14\x15\x16\x17\x18\x19\x1a\x1b\x1c\x1d\x1e")); // qualifiedSigner
        out.extend_from_slice(&tpm2b(extra_data));
        out.extend_from_slice(&100u64.to_be_bytes()); // clock
        out.extend_from_slice(&5u32.to_be_bytes()); // resetCount
        out.extend_from_slice(&2u32.to_be_bytes()); // restartCount
        out.push(1); // safe
        out.extend_from_slice(&0x0001_0002u64.to_be_bytes()); // firmwareVersion
        out.extend_from_slice(&tpm2b(name));
        out.extend_from_slice(&tpm2b(&[])); // qualifiedName
        out
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use super::testbuild::*;
    use super::*;

    #[test]
    fn parse_rsa_pub_area() {
        let modulus = vec![0xab; 256];
        let bytes = rsa_pub_area(&modulus, 0);
        let public = TpmtPublic::try_from(bytes.as_slice()).unwrap();

        assert_eq!(public.type_, TpmAlgId::Rsa);
        assert_eq!(public.name_alg, TpmAlgId::Sha256);
        match (&public.parameters, &public.unique) {
            (TpmuPublicParms::Rsa(parms), TpmuPublicId::Rsa(m)) => {
                assert_eq!(parms.key_bits, 2048);
                assert_eq!(parms.exponent, 0);
                assert_eq!(m, &modulus);
            }
            _ => panic!("expected rsa parameters"),
        }
    }

    #[test]
    fn parse_ecc_pub_area() {
        let x = vec![0x11; 32];
        let y = vec![0x22; 32];
        let bytes = ecc_pub_area(&x, &y);
        let public = TpmtPublic::try_from(bytes.as_slice()).unwrap();

        assert_eq!(public.type_, TpmAlgId::Ecc);
        match (&public.parameters, &public.unique) {
            (TpmuPublicParms::Ecc(parms), TpmuPublicId::Ecc { x: px, y: py }) => {
                assert_eq!(parms.curve_id, TpmEccCurve::NistP256);
                assert_eq!(px, &x);
                assert_eq!(py, &y);
            }
            _ => panic!("expected ecc parameters"),
        }
    }

    #[test]
    fn parse_attest_certify() {
        let extra = vec![0x5a; 32];
        let name = {
            let mut n = vec![0x00, 0x0b];
            n.extend_from_slice(&[0x77; 32]);
            n
        };
        let bytes = attest_certify(0xff54_4347, 0x8017, &extra, &name);
        let attest = TpmsAttest::try_from(bytes.as_slice()).unwrap();

        assert_eq!(attest.magic, 0xff54_4347);
        assert_eq!(attest.type_, TpmSt::AttestCertify);
        assert_eq!(attest.extra_data.as_deref(), Some(extra.as_slice()));
        match &attest.typeattested {
            TpmuAttest::AttestCertify(Tpm2bName::Digest(d), Tpm2bName::None) => {
                assert_eq!(d, &name);
            }
            other => panic!("expected certify name digest, got {:?}", other),
        }
    }

    #[test]
    fn trailing_bytes_rejected() {
        let modulus = vec![0xab; 256];
        let mut bytes = rsa_pub_area(&modulus, 0);
        bytes.push(0x00);
        assert!(TpmtPublic::try_from(bytes.as_slice()).is_err());
    }

    #[test]
    fn non_attest_tag_rejected() {
        let bytes = attest_certify(0xff54_4347, 0x1234, &[0x5a; 32], &[0x00; 34]);
        assert!(TpmsAttest::try_from(bytes.as_slice()).is_err());
    }
}
