//! Possible errors that may occur during Webauthn ceremony verification.
//!
//! Every check in the registration and authentication pipelines maps to
//! exactly one variant here. The first failing check determines the error
//! the caller observes, and no partial ceremony effects are visible after a
//! failure. Variants carry the offending datum where it is safe to log -
//! challenges and other secrets are never embedded in errors.

use thiserror::Error;

/// A `Result` alias for ceremony verification.
pub type WebauthnResult<T> = Result<T, WebauthnError>;

/// Possible errors that may occur during Webauthn ceremony verification.
#[derive(Debug, Error)]
pub enum WebauthnError {
    /// The challenge in the collected client data did not match the
    /// challenge issued for this ceremony.
    #[error("the client data challenge does not match the ceremony challenge")]
    BadChallenge,

    /// The origin the client reported is not an origin this relying party
    /// accepts.
    #[error("origin is not allowed for this relying party: {0}")]
    BadOrigin(String),

    /// The rpIdHash in the authenticator data is not the SHA-256 of the
    /// relying party id configured for this ceremony.
    #[error("authenticator data rpIdHash does not match the relying party id")]
    BadRpId,

    /// A signature failed to verify, or could not be verified because the
    /// underlying cryptographic operation was rejected.
    #[error("signature verification failed")]
    BadSignature,

    /// An authenticator model matched in metadata carries a status report
    /// that forbids trusting it.
    #[error("authenticator metadata reports an untrustworthy status: {0}")]
    BadStatus(String),

    /// The collected client data type did not match the ceremony being
    /// performed.
    #[error("client data type is inconsistent with the ceremony: {0}")]
    InconsistentClientDataType(String),

    /// The client signalled a cross-origin request, and this relying party
    /// does not permit them.
    #[error("cross origin operations are not permitted")]
    CrossOrigin,

    /// The token binding presented by the client does not match the token
    /// binding state of the connection.
    #[error("token binding verification failed")]
    TokenBindingError,

    /// The user presence bit was not asserted by the authenticator.
    #[error("the user present bit is not set")]
    UserNotPresent,

    /// User verification was required for this ceremony but the user
    /// verified bit was not asserted.
    #[error("the user verified bit is not set")]
    UserNotVerified,

    /// The presented credential id is not a member of the allowed
    /// credential list for this ceremony.
    #[error("credential id is not in the allowed credential list")]
    NotAllowedCredentialId,

    /// The credential public key algorithm is not one the relying party
    /// requested.
    #[error("credential algorithm is not allowed: {0}")]
    NotAllowedAlgorithm(i64),

    /// The attestation statement failed its format-specific verification
    /// procedure.
    #[error("attestation statement invalid: {0}")]
    BadAttestationStatement(&'static str),

    /// Certificate path validation against the resolved trust anchors
    /// failed.
    #[error("certificate path validation failed: {0}")]
    CertificateError(String),

    /// No trust anchor could be resolved for the attestation trust path.
    #[error("no trust anchor found for this attestation")]
    TrustAnchorNotFound,

    /// The presented signature counter regressed, indicating the
    /// authenticator may have been cloned.
    #[error("signature counter regressed, presented {presented} stored {stored} - authenticator may be cloned")]
    MaliciousCounterValue {
        /// The counter value presented in the assertion.
        presented: u32,
        /// The counter value stored against the credential.
        stored: u32,
    },

    /// A structural invariant of the ceremony input was violated.
    #[error("ceremony input constraint violated: {0}")]
    ConstraintViolation(&'static str),
}
