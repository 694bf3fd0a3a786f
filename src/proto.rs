//! The ceremony data model. These structures are the decoded inputs that a
//! relying party hands to the validators, and the records it persists between
//! ceremonies. Wire decoding (JSON/CBOR byte parsing) is the caller's
//! concern - by the time data reaches this crate it is already structured.

use base64urlsafedata::Base64UrlSafeData;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::marker::PhantomData;

use crate::error::WebauthnError;

/// Representation of an AAGUID - the 16 byte authenticator model identifier.
/// <https://www.w3.org/TR/webauthn/#aaguid>
pub type Aaguid = [u8; 16];

/// A credential ID as issued by an authenticator.
pub type CredentialID = Vec<u8>;

/// A challenge issued by the relying party for a single ceremony.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge(pub Vec<u8>);

impl Challenge {
    /// Creates a new Challenge from a vector of bytes.
    pub fn new(challenge: Vec<u8>) -> Self {
        Challenge(challenge)
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", base64::encode_config(&self.0, base64::URL_SAFE_NO_PAD))
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", base64::encode_config(&self.0, base64::URL_SAFE_NO_PAD))
    }
}

impl AsRef<[u8]> for Challenge {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// The relying party's view of a single ceremony: which origins are
/// acceptable, the effective rp id, the challenge that was issued, and the
/// token binding id of the connection if one is in use.
#[derive(Debug, Clone)]
pub struct ServerProperty {
    /// The set of origins that assertions may legitimately come from. The
    /// default origin validator requires exact membership.
    pub origins: BTreeSet<String>,
    /// The effective domain of the relying party.
    pub rp_id: String,
    /// The challenge issued for this ceremony.
    pub challenge: Challenge,
    /// The token binding id of the TLS connection, if the front end
    /// established one.
    pub token_binding_id: Option<Vec<u8>>,
}

impl ServerProperty {
    /// Construct a server property for a single-origin relying party.
    pub fn new(origin: &str, rp_id: &str, challenge: Challenge) -> Self {
        let mut origins = BTreeSet::new();
        origins.insert(origin.to_string());
        ServerProperty {
            origins,
            rp_id: rp_id.to_string(),
            challenge,
            token_binding_id: None,
        }
    }
}

/// The status of token binding on the connection the client data was
/// collected over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenBindingStatus {
    /// Token binding was used, and the id is present.
    #[serde(rename = "present")]
    Present,
    /// The client supports token binding but it was not negotiated.
    #[serde(rename = "supported")]
    Supported,
}

/// The token binding member of the collected client data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBinding {
    /// The status of token binding for the connection.
    pub status: TokenBindingStatus,
    /// The token binding id, required when status is `present`.
    pub id: Option<Base64UrlSafeData>,
}

/// The client data collected and signed over during the ceremony.
/// <https://www.w3.org/TR/webauthn/#dictionary-client-data>
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedClientData {
    /// The ceremony that was performed - "webauthn.create" or "webauthn.get".
    #[serde(rename = "type")]
    pub type_: String,
    /// The challenge the client believes it responded to.
    pub challenge: Base64UrlSafeData,
    /// The origin the client operated from.
    pub origin: String,
    /// Set when the request was performed in a cross-origin iframe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cross_origin: Option<bool>,
    /// The token binding state the client observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_binding: Option<TokenBinding>,
}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Registration {}
    impl Sealed for super::Authentication {}
}

/// Trait for ceremony marker structs.
pub trait Ceremony: private::Sealed + fmt::Debug {
    /// The client data type string this ceremony requires.
    const CLIENT_DATA_TYPE: &'static str;
}

/// Marker type parameter for data related to the registration ceremony.
#[derive(Debug, Clone, Copy)]
pub struct Registration;

/// Marker type parameter for data related to the authentication ceremony.
#[derive(Debug, Clone, Copy)]
pub struct Authentication;

impl Ceremony for Registration {
    const CLIENT_DATA_TYPE: &'static str = "webauthn.create";
}

impl Ceremony for Authentication {
    const CLIENT_DATA_TYPE: &'static str = "webauthn.get";
}

/// An ECDSACurve identifier. You probably will never need to alter
/// or use this value, as it is set inside the Credential for you.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ECDSACurve {
    // +---------+-------+----------+------------------------------------+
    // | Name    | Value | Key Type | Description                        |
    // +---------+-------+----------+------------------------------------+
    // | P-256   | 1     | EC2      | NIST P-256 also known as secp256r1 |
    // | P-384   | 2     | EC2      | NIST P-384 also known as secp384r1 |
    // | P-521   | 3     | EC2      | NIST P-521 also known as secp521r1 |
    // +---------+-------+----------+------------------------------------+
    /// Identifies this curve as SECP256R1 (X9_62_PRIME256V1 in OpenSSL)
    SECP256R1 = 1,
    /// Identifies this curve as SECP384R1
    SECP384R1 = 2,
    /// Identifies this curve as SECP521R1
    SECP521R1 = 3,
}

impl TryFrom<i128> for ECDSACurve {
    type Error = WebauthnError;
    fn try_from(u: i128) -> Result<Self, Self::Error> {
        match u {
            1 => Ok(ECDSACurve::SECP256R1),
            2 => Ok(ECDSACurve::SECP384R1),
            3 => Ok(ECDSACurve::SECP521R1),
            _ => Err(WebauthnError::ConstraintViolation(
                "cose key references an unknown ec curve",
            )),
        }
    }
}

impl ECDSACurve {
    /// The size in bytes of an affine coordinate on this curve.
    pub fn coordinate_size(&self) -> usize {
        match self {
            ECDSACurve::SECP256R1 => 32,
            ECDSACurve::SECP384R1 => 48,
            ECDSACurve::SECP521R1 => 66,
        }
    }
}

/// An EDDSACurve identifier. You probably will never need to alter
/// or use this value, as it is set inside the Credential for you.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EDDSACurve {
    /// Identifies this OKP as ED25519
    ED25519 = 6,
    /// Identifies this OKP as ED448
    ED448 = 7,
}

impl TryFrom<i128> for EDDSACurve {
    type Error = WebauthnError;
    fn try_from(u: i128) -> Result<Self, Self::Error> {
        match u {
            6 => Ok(EDDSACurve::ED25519),
            7 => Ok(EDDSACurve::ED448),
            _ => Err(WebauthnError::ConstraintViolation(
                "cose key references an unknown okp curve",
            )),
        }
    }
}

impl EDDSACurve {
    /// The size in bytes of a public key on this curve.
    pub fn coordinate_size(&self) -> usize {
        match self {
            EDDSACurve::ED25519 => 32,
            EDDSACurve::ED448 => 57,
        }
    }
}

/// A COSE signature algorithm identifier.
/// <https://www.iana.org/assignments/cose/cose.xhtml#algorithms>
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum COSEAlgorithm {
    /// Identifies this key as ES256 - ECDSA with SHA256 over P-256
    ES256 = -7,
    /// Identifies this key as ES384 - ECDSA with SHA384 over P-384
    ES384 = -35,
    /// Identifies this key as ES512 - ECDSA with SHA512 over P-521
    ES512 = -36,
    /// Identifies this key as RS256 - RSASSA-PKCS1-v1_5 with SHA256
    RS256 = -257,
    /// Identifies this key as RS384 - RSASSA-PKCS1-v1_5 with SHA384
    RS384 = -258,
    /// Identifies this key as RS512 - RSASSA-PKCS1-v1_5 with SHA512
    RS512 = -259,
    /// Identifies this key as PS256 - RSASSA-PSS with SHA256
    PS256 = -37,
    /// Identifies this key as PS384 - RSASSA-PSS with SHA384
    PS384 = -38,
    /// Identifies this key as PS512 - RSASSA-PSS with SHA512
    PS512 = -39,
    /// Identifies this key as EdDSA (likely curve ed25519)
    EDDSA = -8,
    /// Legacy RSASSA-PKCS1-v1_5 with SHA1. Recognised so that it can be
    /// explicitly rejected, never verified.
    INSECURE_RS1 = -65535,
}

impl TryFrom<i128> for COSEAlgorithm {
    type Error = WebauthnError;
    fn try_from(i: i128) -> Result<Self, Self::Error> {
        match i {
            -7 => Ok(COSEAlgorithm::ES256),
            -35 => Ok(COSEAlgorithm::ES384),
            -36 => Ok(COSEAlgorithm::ES512),
            -257 => Ok(COSEAlgorithm::RS256),
            -258 => Ok(COSEAlgorithm::RS384),
            -259 => Ok(COSEAlgorithm::RS512),
            -37 => Ok(COSEAlgorithm::PS256),
            -38 => Ok(COSEAlgorithm::PS384),
            -39 => Ok(COSEAlgorithm::PS512),
            -8 => Ok(COSEAlgorithm::EDDSA),
            -65535 => Ok(COSEAlgorithm::INSECURE_RS1),
            i => Err(WebauthnError::NotAllowedAlgorithm(i as i64)),
        }
    }
}

impl From<COSEAlgorithm> for i64 {
    fn from(c: COSEAlgorithm) -> Self {
        c as i64
    }
}

/// The numeric id of the COSE key type as used in the CBOR fields.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i64)]
pub enum COSEKeyTypeId {
    /// Reserved
    EC_Reserved = 0,
    /// Octet Key Pair
    EC_OKP = 1,
    /// Elliptic Curve Keys w/ x- and y-coordinate
    EC_EC2 = 2,
    /// RSA
    EC_RSA = 3,
    /// Symmetric
    EC_Symmetric = 4,
}

/// A COSE Elliptic Curve Public Key. This is generally the provided
/// credential that an authenticator registers, and is used to authenticate
/// the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEEC2Key {
    /// The curve that this key references.
    pub curve: ECDSACurve,
    /// The key's public X coordinate.
    pub x: Base64UrlSafeData,
    /// The key's public Y coordinate.
    pub y: Base64UrlSafeData,
}

/// A COSE Octet Key Pair Public Key, used with EdDSA.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEOKPKey {
    /// The curve that this key references.
    pub curve: EDDSACurve,
    /// The key's public X coordinate.
    pub x: Base64UrlSafeData,
}

/// A COSE RSA Public Key. This is a provided credential from a registered
/// authenticator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSERSAKey {
    /// An RSA modulus
    pub n: Base64UrlSafeData,
    /// An RSA exponent
    pub e: [u8; 3],
}

/// The type of key contained within a COSE value.
#[allow(non_camel_case_types)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum COSEKeyType {
    //    +-----------+-------+-----------------------------------------------+
    //    | Name      | Value | Description                                   |
    //    +-----------+-------+-----------------------------------------------+
    //    | OKP       | 1     | Octet Key Pair                                |
    //    | EC2       | 2     | Elliptic Curve Keys w/ x- and y-coordinate    |
    //    |           |       | pair                                          |
    //    | Symmetric | 4     | Symmetric Keys                                |
    //    | Reserved  | 0     | This value is reserved                        |
    //    +-----------+-------+-----------------------------------------------+
    /// Identifies this as an Elliptic Curve octet key pair
    EC_OKP(COSEOKPKey),
    /// Identifies this as an Elliptic Curve EC2 key
    EC_EC2(COSEEC2Key),
    /// Identifies this as an RSA key
    RSA(COSERSAKey),
}

/// A COSE Key as provided by the Authenticator. You should never need
/// to alter or change these values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEKey {
    /// The signature algorithm this key is used with.
    pub type_: COSEAlgorithm,
    /// The public key.
    pub key: COSEKeyType,
}

/// Attested credential data - present in the authenticator data during a
/// registration ceremony.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestedCredentialData {
    /// The guid of the authenticator model. May indicate manufacturer.
    pub aaguid: Aaguid,
    /// The credential ID.
    pub credential_id: Base64UrlSafeData,
    /// The credential's public key.
    pub credential_pk: COSEKey,
}

/// Authenticator extension outputs, keyed by extension identifier. Values
/// remain CBOR until they are checked against the registered extension set
/// during ceremony verification - unknown identifiers fail the ceremony.
pub type AuthenticatorExtensionOutputs = BTreeMap<String, serde_cbor::Value>;

/// The closed set of authenticator extension outputs this crate recognises.
/// Every output identifier presented by an authenticator must decode into
/// one of these; anything else fails the ceremony rather than being
/// silently ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticatorExtension {
    /// The credProtect policy the authenticator applied to the credential.
    CredProtect(u8),
    /// Whether the authenticator stored the requested credBlob.
    CredBlobSet(bool),
    /// The stored credBlob returned during an assertion.
    CredBlobGet(Vec<u8>),
    /// Whether hmac-secret was enabled at registration.
    HmacSecretSet(bool),
    /// The encrypted hmac-secret outputs returned during an assertion.
    HmacSecretGet(Vec<u8>),
    /// The minimum PIN length the authenticator enforces.
    MinPinLength(u32),
    /// The user verification methods used.
    Uvm(Vec<serde_cbor::Value>),
}

/// Data signed over by the authenticator during a ceremony.
#[derive(Clone, Debug)]
pub struct AuthenticatorData<T: Ceremony> {
    /// SHA-256 hash of the relying party id the credential is scoped to.
    pub rp_id_hash: [u8; 32],
    /// Flag if the user was present.
    pub user_present: bool,
    /// Flag if the user was verified to the device. Implies presence.
    pub user_verified: bool,
    /// Flag if this credential is eligible for backup.
    pub backup_eligible: bool,
    /// Flag if this credential is currently backed up.
    pub backup_state: bool,
    /// The signature counter of this credential.
    pub sign_count: u32,
    /// The attested credential data. Present during registration, absent
    /// during authentication.
    pub acd: Option<AttestedCredentialData>,
    /// Extension outputs supplied by the authenticator.
    pub extensions: Option<AuthenticatorExtensionOutputs>,
    /// Ceremony marker.
    pub marker: PhantomData<T>,
}

/// The format specific attestation statement, already CBOR decoded by the
/// caller into its typed form. Dispatch during registration verification is
/// over this enum rather than the wire `fmt` string.
#[derive(Clone, Debug)]
pub enum AttestationStatement {
    /// An 8.2. packed attestation statement.
    Packed(PackedAttestationStatement),
    /// An 8.3. tpm attestation statement.
    Tpm(TpmAttestationStatement),
    /// An 8.4. android-key attestation statement.
    AndroidKey(AndroidKeyAttestationStatement),
    /// An 8.5. android-safetynet attestation statement.
    AndroidSafetyNet(AndroidSafetyNetAttestationStatement),
    /// An 8.8. apple anonymous attestation statement.
    Apple(AppleAnonymousAttestationStatement),
    /// An 8.6. fido-u2f attestation statement.
    FidoU2F(FidoU2FAttestationStatement),
    /// An 8.7. none attestation statement. Structurally empty.
    None,
}

/// An 8.2. packed attestation statement.
#[derive(Clone, Debug)]
pub struct PackedAttestationStatement {
    /// The algorithm the attestation signature was produced with.
    pub alg: COSEAlgorithm,
    /// The attestation signature.
    pub sig: Vec<u8>,
    /// The attestation certificate chain, leaf first, DER encoded. Absent
    /// for self attestation.
    pub x5c: Option<Vec<Vec<u8>>>,
    /// ECDAA key id. ECDAA is deprecated and always rejected.
    pub ecdaa_key_id: Option<Vec<u8>>,
}

/// An 8.3. tpm attestation statement. The TPM structures are kept as raw
/// bytes since the signature and name digests are computed over the exact
/// encodings.
#[derive(Clone, Debug)]
pub struct TpmAttestationStatement {
    /// The TPM specification version. Must be "2.0".
    pub ver: String,
    /// The algorithm the attestation signature was produced with.
    pub alg: COSEAlgorithm,
    /// The AIK certificate chain, leaf first, DER encoded. Absence implies
    /// ECDAA, which is deprecated and rejected.
    pub x5c: Option<Vec<Vec<u8>>>,
    /// The attestation signature over the certInfo bytes.
    pub sig: Vec<u8>,
    /// The TPMS_ATTEST structure, as signed.
    pub cert_info: Vec<u8>,
    /// The TPMT_PUBLIC structure describing the credential key.
    pub pub_area: Vec<u8>,
}

/// An 8.4. android-key attestation statement.
#[derive(Clone, Debug)]
pub struct AndroidKeyAttestationStatement {
    /// The algorithm the attestation signature was produced with.
    pub alg: COSEAlgorithm,
    /// The attestation signature.
    pub sig: Vec<u8>,
    /// The attestation certificate chain, leaf first, DER encoded.
    pub x5c: Vec<Vec<u8>>,
}

/// An 8.5. android-safetynet attestation statement.
#[derive(Clone, Debug)]
pub struct AndroidSafetyNetAttestationStatement {
    /// The SafetyNet API version.
    pub ver: String,
    /// The UTF-8 encoded JWS returned by the SafetyNet API.
    pub response: Vec<u8>,
}

/// An 8.8. apple anonymous attestation statement.
#[derive(Clone, Debug)]
pub struct AppleAnonymousAttestationStatement {
    /// The attestation certificate chain, leaf first, DER encoded.
    pub x5c: Vec<Vec<u8>>,
}

/// An 8.6. fido-u2f attestation statement.
#[derive(Clone, Debug)]
pub struct FidoU2FAttestationStatement {
    /// The attestation signature.
    pub sig: Vec<u8>,
    /// The attestation certificate chain. Must contain exactly one DER
    /// encoded certificate.
    pub x5c: Vec<Vec<u8>>,
}

/// The attestation object supplied during registration - the authenticator
/// data (with its exact byte encoding, which attestation signatures cover)
/// and the format specific attestation statement.
#[derive(Clone, Debug)]
pub struct AttestationObject {
    /// The authenticator data.
    pub auth_data: AuthenticatorData<Registration>,
    /// The exact bytes the authenticator data was decoded from.
    pub auth_data_bytes: Vec<u8>,
    /// The attestation statement.
    pub att_stmt: AttestationStatement,
}

/// The decoded input bundle for a registration ceremony.
#[derive(Clone, Debug)]
pub struct RegistrationData {
    /// The attestation object.
    pub attestation_object: AttestationObject,
    /// The collected client data.
    pub client_data: CollectedClientData,
    /// The exact bytes the client data was decoded from. The client data
    /// hash signed by the authenticator is the SHA-256 of these bytes.
    pub client_data_bytes: Vec<u8>,
    /// The transports the client reports the authenticator supports.
    pub transports: Option<Vec<String>>,
}

/// The decoded input bundle for an authentication ceremony.
#[derive(Clone, Debug)]
pub struct AuthenticationData {
    /// The credential id the client asserted with.
    pub credential_id: CredentialID,
    /// The user handle supplied by the client, if any.
    pub user_handle: Option<Vec<u8>>,
    /// The authenticator data.
    pub authenticator_data: AuthenticatorData<Authentication>,
    /// The exact bytes the authenticator data was decoded from.
    pub authenticator_data_bytes: Vec<u8>,
    /// The collected client data.
    pub client_data: CollectedClientData,
    /// The exact bytes the client data was decoded from.
    pub client_data_bytes: Vec<u8>,
    /// The assertion signature.
    pub signature: Vec<u8>,
}

/// The relying party's requirements for a registration ceremony.
#[derive(Clone, Debug)]
pub struct RegistrationParameters {
    /// The server's view of this ceremony.
    pub server_property: ServerProperty,
    /// The credential algorithms offered in the creation options. An empty
    /// list accepts any algorithm this crate can verify.
    pub pub_key_cred_params: Vec<COSEAlgorithm>,
    /// Whether the user verified bit must be asserted.
    pub user_verification_required: bool,
    /// Whether the user present bit must be asserted. On in almost every
    /// deployment; conditional mediation is the exception.
    pub user_presence_required: bool,
}

/// The relying party's requirements for an authentication ceremony.
#[derive(Clone, Debug)]
pub struct AuthenticationParameters {
    /// The server's view of this ceremony.
    pub server_property: ServerProperty,
    /// The credential ids offered in allowCredentials. An empty list means
    /// the allow list was not supplied (discoverable credential flow).
    pub allow_credentials: Vec<CredentialID>,
    /// Whether the user verified bit must be asserted.
    pub user_verification_required: bool,
    /// Whether the user present bit must be asserted.
    pub user_presence_required: bool,
}

/// A user's registered credential. It contains an id, the public key
/// and a counter of how many times the authenticator has been used.
///
/// The caller owns this record. A successful authentication updates
/// `counter` in place; the caller is responsible for persisting the update.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credential {
    /// The ID of this credential.
    pub cred_id: CredentialID,
    /// The public key of this credential.
    pub cred: COSEKey,
    /// The signature counter for this credential.
    pub counter: u32,
    /// The transports this credential was registered over, if known.
    pub transports: Option<Vec<String>>,
}

impl Credential {
    /// Build the stored credential record from validated registration data.
    pub fn new(acd: &AttestedCredentialData, sign_count: u32, transports: Option<Vec<String>>) -> Self {
        Credential {
            cred_id: acd.credential_id.0.clone(),
            cred: acd.credential_pk.clone(),
            counter: sign_count,
            transports,
        }
    }
}

impl PartialEq<Credential> for Credential {
    fn eq(&self, c: &Credential) -> bool {
        self.cred_id == c.cred_id
    }
}

/// The verified attestation that the authenticator provided during
/// registration, with the trust path it conveyed.
///
/// Which variant is returned is decided by the attestation statement's
/// verification procedure, and determines which trustworthiness policy is
/// applied afterwards.
#[derive(Debug, Clone)]
pub enum AttestationType {
    /// The credential is attested by a batch certificate from the
    /// authenticator vendor.
    Basic(Vec<openssl::x509::X509>),
    /// Surrogate basic attestation - the credential private key itself
    /// produced the attestation signature. Conveys no trust path.
    Self_,
    /// The credential is attested through an attestation CA (the TPM
    /// model), and provides a chain to validate to its root.
    AttCa(Vec<openssl::x509::X509>),
    /// The credential is attested through an anonymization CA.
    AnonCa(Vec<openssl::x509::X509>),
    /// No attestation was provided.
    None,
}

impl AttestationType {
    /// The trust path conveyed with this attestation, if there is one.
    pub fn trust_path(&self) -> Option<&[openssl::x509::X509]> {
        match self {
            AttestationType::Basic(chain)
            | AttestationType::AttCa(chain)
            | AttestationType::AnonCa(chain) => Some(chain.as_slice()),
            AttestationType::Self_ | AttestationType::None => None,
        }
    }
}
