//! The ceremony validators and their configuration. A relying party builds
//! an immutable [`ValidatorConfig`] once, publishes it to its request
//! handlers, and runs every registration through
//! [`RegistrationValidator::validate`] and every assertion through
//! [`AuthenticationValidator::validate`]. Checks execute in the order the
//! Webauthn specification mandates; the first failing check determines the
//! error, and no partial effects remain after a failure.

use std::collections::BTreeMap;
use std::sync::Arc;

use openssl::x509;

use crate::attestation::{
    verify_android_key_attestation, verify_android_safetynet_attestation,
    verify_apple_anonymous_attestation, verify_attestation_chain, verify_fidou2f_attestation,
    verify_none_attestation, verify_packed_attestation, verify_tpm_attestation,
};
use crate::constants::{SAFETYNET_DEFAULT_MAX_AGE_MS, SAFETYNET_MAX_FORWARD_SKEW_MS};
use crate::crypto::{
    authority_key_identifier, compute_sha256, subject_key_identifier,
    tpm_device_property_from_cert,
};
pub use crate::crypto::TpmDeviceProperty;
use crate::error::{WebauthnError, WebauthnResult};
use crate::metadata::MetadataEntry;
use crate::proto::*;

/// Validates the origin reported in the collected client data against the
/// relying party's expectations. The default implementation requires exact
/// membership in [`ServerProperty::origins`]; an injected implementation
/// may relax this, for example to accept android `apk-key-hash` origins.
pub trait OriginValidator: Send + Sync {
    /// Check the client supplied origin. Failures must map to
    /// [`WebauthnError::BadOrigin`].
    fn validate(&self, client_origin: &str, server_property: &ServerProperty)
        -> WebauthnResult<()>;
}

/// The default [`OriginValidator`] - exact string membership.
#[derive(Debug, Clone, Default)]
pub struct ExactMatchOriginValidator;

impl OriginValidator for ExactMatchOriginValidator {
    fn validate(
        &self,
        client_origin: &str,
        server_property: &ServerProperty,
    ) -> WebauthnResult<()> {
        if server_property.origins.contains(client_origin) {
            Ok(())
        } else {
            debug!(%client_origin, "origin rejected");
            Err(WebauthnError::BadOrigin(client_origin.to_string()))
        }
    }
}

/// Invoked when an assertion presents a signature counter that did not
/// advance past the stored value - the signal that an authenticator may
/// have been cloned.
pub trait MaliciousCounterValueHandler: Send + Sync {
    /// Decide the fate of the ceremony. Returning `Ok(())` continues it.
    fn handle(&self, credential_id: &[u8], presented: u32, stored: u32) -> WebauthnResult<()>;
}

/// The default [`MaliciousCounterValueHandler`] - fail the ceremony.
#[derive(Debug, Clone, Default)]
pub struct RejectOnMaliciousCounter;

impl MaliciousCounterValueHandler for RejectOnMaliciousCounter {
    fn handle(&self, _credential_id: &[u8], presented: u32, stored: u32) -> WebauthnResult<()> {
        Err(WebauthnError::MaliciousCounterValue { presented, stored })
    }
}

/// A [`MaliciousCounterValueHandler`] that records the signal but lets the
/// ceremony continue. The stored counter is left untouched.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMaliciousCounter;

impl MaliciousCounterValueHandler for IgnoreMaliciousCounter {
    fn handle(&self, credential_id: &[u8], presented: u32, stored: u32) -> WebauthnResult<()> {
        warn!(
            ?credential_id,
            presented, stored, "signature counter regressed - authenticator may be cloned"
        );
        Ok(())
    }
}

/// A relying party specific check run at the end of a registration
/// ceremony, after every specification mandated check has passed.
pub trait CustomRegistrationValidator: Send + Sync {
    /// Perform the check.
    fn validate(
        &self,
        data: &RegistrationData,
        params: &RegistrationParameters,
    ) -> WebauthnResult<()>;
}

/// A relying party specific check run at the end of an authentication
/// ceremony, after every specification mandated check has passed.
pub trait CustomAuthenticationValidator: Send + Sync {
    /// Perform the check.
    fn validate(
        &self,
        data: &AuthenticationData,
        params: &AuthenticationParameters,
    ) -> WebauthnResult<()>;
}

/// Decodes the TPM device property from an AIK certificate (DER). The
/// default implementation reads the TCG attributes from the certificate's
/// Subject Alternative Name.
pub trait TpmDevicePropertyDecoder: Send + Sync {
    /// Decode the device property, or fail the attestation.
    fn decode(&self, aik_cert_der: &[u8]) -> WebauthnResult<TpmDeviceProperty>;
}

/// The default [`TpmDevicePropertyDecoder`].
#[derive(Debug, Clone, Default)]
pub struct DefaultTpmDevicePropertyDecoder;

impl TpmDevicePropertyDecoder for DefaultTpmDevicePropertyDecoder {
    fn decode(&self, aik_cert_der: &[u8]) -> WebauthnResult<TpmDeviceProperty> {
        tpm_device_property_from_cert(aik_cert_der)
    }
}

/// Validates a decoded TPM device property. The default implementation
/// requires the manufacturer to be a well formed TCG vendor id.
pub trait TpmDevicePropertyValidator: Send + Sync {
    /// Accept or reject the device property.
    fn validate(&self, property: &TpmDeviceProperty) -> WebauthnResult<()>;
}

/// The default [`TpmDevicePropertyValidator`].
#[derive(Debug, Clone, Default)]
pub struct DefaultTpmDevicePropertyValidator;

impl TpmDevicePropertyValidator for DefaultTpmDevicePropertyValidator {
    fn validate(&self, property: &TpmDeviceProperty) -> WebauthnResult<()> {
        // Vendor ids are "id:" followed by eight hex digits, e.g. the
        // four ascii bytes of the vendor string.
        let well_formed = property
            .manufacturer
            .strip_prefix("id:")
            .map(|id| id.len() == 8 && id.bytes().all(|b| b.is_ascii_hexdigit()))
            .unwrap_or(false);
        if well_formed {
            Ok(())
        } else {
            Err(WebauthnError::BadAttestationStatement(
                "tpm manufacturer is not a tcg vendor id",
            ))
        }
    }
}

/// Resolves the trust anchors an attestation certificate chain must
/// terminate at. Lookup is first by the authenticator model's AAGUID, then
/// by certificate key identifiers.
pub trait TrustAnchorRepository: Send + Sync {
    /// Anchors trusted for the given authenticator model.
    fn find_by_aaguid(&self, aaguid: &Aaguid) -> WebauthnResult<Vec<x509::X509>>;
    /// Anchors trusted for the given certificate key identifier.
    fn find_by_key_identifier(&self, key_identifier: &[u8]) -> WebauthnResult<Vec<x509::X509>>;
}

/// A [`TrustAnchorRepository`] over a fixed set of certificates, trusted for
/// every authenticator model. Suitable when the relying party pins the CAs
/// of the authenticator fleet it issues.
#[derive(Debug, Clone, Default)]
pub struct StaticTrustAnchorRepository {
    anchors: Vec<x509::X509>,
}

impl StaticTrustAnchorRepository {
    /// Trust the supplied certificates for all models.
    pub fn new(anchors: Vec<x509::X509>) -> Self {
        StaticTrustAnchorRepository { anchors }
    }
}

impl TrustAnchorRepository for StaticTrustAnchorRepository {
    fn find_by_aaguid(&self, _aaguid: &Aaguid) -> WebauthnResult<Vec<x509::X509>> {
        Ok(self.anchors.clone())
    }

    fn find_by_key_identifier(&self, _key_identifier: &[u8]) -> WebauthnResult<Vec<x509::X509>> {
        Ok(self.anchors.clone())
    }
}

/// Supplies verified fido metadata entries. Implementations own transport
/// and BLOB signature verification; see
/// [`crate::metadata::StaticMetadataProvider`] for the in memory form.
pub trait MetadataProvider: Send + Sync {
    /// The current set of metadata entries.
    fn provide(&self) -> WebauthnResult<Vec<MetadataEntry>>;
}

/// Immutable ceremony policy. Build one with [`ValidatorConfigBuilder`],
/// then share it across request handlers - there are deliberately no
/// setters, so a published configuration can never change under a running
/// ceremony.
pub struct ValidatorConfig {
    pub(crate) cross_origin_allowed: bool,
    pub(crate) self_attestation_allowed: bool,
    pub(crate) android_key_tee_enforced_only: bool,
    pub(crate) safetynet_forward_skew_ms: u64,
    pub(crate) safetynet_max_age_ms: u64,
    pub(crate) enable_revocation_check: bool,
    pub(crate) danger_disable_certificate_time_checks: bool,
    pub(crate) origin_validator: Box<dyn OriginValidator>,
    pub(crate) counter_handler: Box<dyn MaliciousCounterValueHandler>,
    pub(crate) custom_registration_validators: Vec<Box<dyn CustomRegistrationValidator>>,
    pub(crate) custom_authentication_validators: Vec<Box<dyn CustomAuthenticationValidator>>,
    pub(crate) tpm_device_property_decoder: Box<dyn TpmDevicePropertyDecoder>,
    pub(crate) tpm_device_property_validator: Box<dyn TpmDevicePropertyValidator>,
    pub(crate) trust_anchors: Option<Box<dyn TrustAnchorRepository>>,
}

impl ValidatorConfig {
    /// Start building a configuration with the default policy.
    pub fn builder() -> ValidatorConfigBuilder {
        ValidatorConfigBuilder::new()
    }
}

/// Builder for [`ValidatorConfig`]. Defaults: cross origin prohibited, self
/// attestation refused, android-key accepts the union of software and tee
/// enforced lists, safetynet timestamps within one minute either way,
/// revocation checking off, exact origin matching, counter regressions
/// rejected, no trust anchors.
pub struct ValidatorConfigBuilder {
    config: ValidatorConfig,
}

impl Default for ValidatorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidatorConfigBuilder {
    /// A builder holding the default policy.
    pub fn new() -> Self {
        ValidatorConfigBuilder {
            config: ValidatorConfig {
                cross_origin_allowed: false,
                self_attestation_allowed: false,
                android_key_tee_enforced_only: false,
                safetynet_forward_skew_ms: SAFETYNET_MAX_FORWARD_SKEW_MS,
                safetynet_max_age_ms: SAFETYNET_DEFAULT_MAX_AGE_MS,
                enable_revocation_check: false,
                danger_disable_certificate_time_checks: false,
                origin_validator: Box::new(ExactMatchOriginValidator),
                counter_handler: Box::new(RejectOnMaliciousCounter),
                custom_registration_validators: Vec::new(),
                custom_authentication_validators: Vec::new(),
                tpm_device_property_decoder: Box::new(DefaultTpmDevicePropertyDecoder),
                tpm_device_property_validator: Box::new(DefaultTpmDevicePropertyValidator),
                trust_anchors: None,
            },
        }
    }

    /// Permit assertions collected in cross origin iframes.
    pub fn allow_cross_origin(mut self) -> Self {
        self.config.cross_origin_allowed = true;
        self
    }

    /// Permit surrogate (self) attestation during registration.
    pub fn allow_self_attestation(mut self) -> Self {
        self.config.self_attestation_allowed = true;
        self
    }

    /// Require android-key attestations to be enforced by a trusted
    /// execution environment.
    pub fn android_key_tee_enforced_only(mut self) -> Self {
        self.config.android_key_tee_enforced_only = true;
        self
    }

    /// The permitted forward clock skew for safetynet response timestamps,
    /// in milliseconds. Clamped to one minute.
    pub fn safetynet_forward_skew_ms(mut self, skew: u64) -> Self {
        self.config.safetynet_forward_skew_ms = skew.min(SAFETYNET_MAX_FORWARD_SKEW_MS);
        self
    }

    /// The permitted age of a safetynet response timestamp, in milliseconds.
    pub fn safetynet_max_age_ms(mut self, age: u64) -> Self {
        self.config.safetynet_max_age_ms = age;
        self
    }

    /// Enable CRL based revocation checking during certificate path
    /// validation. Off by default - most attestation CAs publish status
    /// through metadata rather than CRLs.
    pub fn enable_revocation_check(mut self) -> Self {
        self.config.enable_revocation_check = true;
        self
    }

    /// Disable certificate validity window checks. For tests only.
    pub fn danger_disable_certificate_time_checks(mut self) -> Self {
        self.config.danger_disable_certificate_time_checks = true;
        self
    }

    /// Replace the origin validator.
    pub fn origin_validator(mut self, validator: Box<dyn OriginValidator>) -> Self {
        self.config.origin_validator = validator;
        self
    }

    /// Replace the malicious counter handler.
    pub fn malicious_counter_value_handler(
        mut self,
        handler: Box<dyn MaliciousCounterValueHandler>,
    ) -> Self {
        self.config.counter_handler = handler;
        self
    }

    /// Append a custom registration validator. Custom validators run last,
    /// in insertion order.
    pub fn add_registration_validator(
        mut self,
        validator: Box<dyn CustomRegistrationValidator>,
    ) -> Self {
        self.config.custom_registration_validators.push(validator);
        self
    }

    /// Append a custom authentication validator. Custom validators run
    /// last, in insertion order.
    pub fn add_authentication_validator(
        mut self,
        validator: Box<dyn CustomAuthenticationValidator>,
    ) -> Self {
        self.config.custom_authentication_validators.push(validator);
        self
    }

    /// Replace the TPM device property decoder.
    pub fn tpm_device_property_decoder(
        mut self,
        decoder: Box<dyn TpmDevicePropertyDecoder>,
    ) -> Self {
        self.config.tpm_device_property_decoder = decoder;
        self
    }

    /// Replace the TPM device property validator.
    pub fn tpm_device_property_validator(
        mut self,
        validator: Box<dyn TpmDevicePropertyValidator>,
    ) -> Self {
        self.config.tpm_device_property_validator = validator;
        self
    }

    /// Provide the trust anchor repository used to assess attestation
    /// trust paths. Without one, any attestation conveying a trust path is
    /// rejected with [`WebauthnError::TrustAnchorNotFound`].
    pub fn trust_anchor_repository(mut self, repository: Box<dyn TrustAnchorRepository>) -> Self {
        self.config.trust_anchors = Some(repository);
        self
    }

    /// Finish building.
    pub fn build(self) -> ValidatorConfig {
        self.config
    }
}

fn validate_challenge(client_challenge: &[u8], expected: &Challenge) -> WebauthnResult<()> {
    // Constant time - the challenge is the anti replay secret of the
    // ceremony.
    if client_challenge.len() == expected.0.len()
        && openssl::memcmp::eq(client_challenge, &expected.0)
    {
        Ok(())
    } else {
        Err(WebauthnError::BadChallenge)
    }
}

fn validate_token_binding(
    client: &Option<TokenBinding>,
    server_token_binding_id: &Option<Vec<u8>>,
) -> WebauthnResult<()> {
    if let Some(tb) = client {
        match tb.status {
            TokenBindingStatus::Present => {
                let id = tb.id.as_ref().ok_or(WebauthnError::TokenBindingError)?;
                let server_id = server_token_binding_id
                    .as_ref()
                    .ok_or(WebauthnError::TokenBindingError)?;
                if &id.0 != server_id {
                    return Err(WebauthnError::TokenBindingError);
                }
            }
            // The client supports token binding but it was not negotiated
            // on this connection - nothing further to check.
            TokenBindingStatus::Supported => {}
        }
    }
    Ok(())
}

fn validate_client_data<T: Ceremony>(
    client_data: &CollectedClientData,
    params_server_property: &ServerProperty,
    cross_origin_allowed: bool,
    origin_validator: &dyn OriginValidator,
) -> WebauthnResult<()> {
    // Verify that the value of C.type matches the ceremony being performed.
    if client_data.type_ != T::CLIENT_DATA_TYPE {
        return Err(WebauthnError::InconsistentClientDataType(
            client_data.type_.clone(),
        ));
    }

    // Verify that the value of C.challenge equals the challenge issued for
    // this ceremony.
    validate_challenge(&client_data.challenge.0, &params_server_property.challenge)?;

    // Verify that the value of C.origin is an origin this relying party
    // expects.
    origin_validator.validate(&client_data.origin, params_server_property)?;

    // A cross origin request is only acceptable when the relying party has
    // opted in.
    if client_data.cross_origin == Some(true) && !cross_origin_allowed {
        return Err(WebauthnError::CrossOrigin);
    }

    // Verify that the value of C.tokenBinding matches the token binding
    // state of the connection the data was collected over.
    validate_token_binding(
        &client_data.token_binding,
        &params_server_property.token_binding_id,
    )?;

    Ok(())
}

fn validate_rp_id_hash(rp_id_hash: &[u8; 32], rp_id: &str) -> WebauthnResult<()> {
    if rp_id_hash != &compute_sha256(rp_id.as_bytes()) {
        return Err(WebauthnError::BadRpId);
    }
    Ok(())
}

fn validate_user_flags(
    user_present: bool,
    user_verified: bool,
    user_verification_required: bool,
    user_presence_required: bool,
) -> WebauthnResult<()> {
    if user_verification_required && !user_verified {
        return Err(WebauthnError::UserNotVerified);
    }
    if user_presence_required && !user_present {
        return Err(WebauthnError::UserNotPresent);
    }
    Ok(())
}

fn decode_extension(
    ident: &str,
    value: &serde_cbor::Value,
    registration: bool,
) -> WebauthnResult<AuthenticatorExtension> {
    match ident {
        "credProtect" if registration => {
            let policy = cbor_try_i128!(value)?;
            if (1..=3).contains(&policy) {
                Ok(AuthenticatorExtension::CredProtect(policy as u8))
            } else {
                Err(WebauthnError::ConstraintViolation(
                    "credProtect policy out of range",
                ))
            }
        }
        "credBlob" if registration => cbor_try_bool!(value).map(AuthenticatorExtension::CredBlobSet),
        "credBlob" => cbor_try_bytes!(value)
            .map(|b| AuthenticatorExtension::CredBlobGet(b.clone())),
        "hmac-secret" if registration => {
            cbor_try_bool!(value).map(AuthenticatorExtension::HmacSecretSet)
        }
        "hmac-secret" => cbor_try_bytes!(value)
            .map(|b| AuthenticatorExtension::HmacSecretGet(b.clone())),
        "minPinLength" if registration => {
            let len = cbor_try_i128!(value)?;
            u32::try_from(len)
                .map(AuthenticatorExtension::MinPinLength)
                .map_err(|_| {
                    WebauthnError::ConstraintViolation("minPinLength out of range")
                })
        }
        "uvm" => cbor_try_array!(value).map(|entries| AuthenticatorExtension::Uvm(entries.clone())),
        _ => {
            debug!(%ident, "unregistered authenticator extension output");
            Err(WebauthnError::ConstraintViolation(
                "unregistered authenticator extension output",
            ))
        }
    }
}

/// Every extension output identifier must have a registered decoder;
/// unknown identifiers abort the ceremony.
fn validate_authenticator_extensions(
    outputs: &AuthenticatorExtensionOutputs,
    registration: bool,
) -> WebauthnResult<BTreeMap<String, AuthenticatorExtension>> {
    outputs
        .iter()
        .map(|(ident, value)| {
            decode_extension(ident, value, registration).map(|ext| (ident.clone(), ext))
        })
        .collect()
}

/// Verifies webauthn registration ceremonies - the server side of
/// `navigator.credentials.create()`.
pub struct RegistrationValidator {
    config: Arc<ValidatorConfig>,
}

impl RegistrationValidator {
    /// Build a validator over the supplied policy. Accepts an owned config
    /// or an `Arc` shared with an [`AuthenticationValidator`].
    pub fn new(config: impl Into<Arc<ValidatorConfig>>) -> Self {
        RegistrationValidator {
            config: config.into(),
        }
    }

    /// Validate a decoded registration ceremony per Webauthn §7.1. On
    /// success, returns the verified [`AttestationType`] with its trust
    /// path; the caller then persists a [`Credential`] built from the
    /// attested credential data.
    pub fn validate(
        &self,
        data: &RegistrationData,
        params: &RegistrationParameters,
    ) -> WebauthnResult<AttestationType> {
        let auth_data = &data.attestation_object.auth_data;

        // Attested credential data must be present on registration, and the
        // credential public key it carries must be realisable.
        let acd = auth_data
            .acd
            .as_ref()
            .ok_or(WebauthnError::ConstraintViolation(
                "registration requires attested credential data",
            ))?;
        acd.credential_pk.validate()?;

        // Client data checks - type, challenge, origin, cross origin
        // policy, token binding.
        validate_client_data::<Registration>(
            &data.client_data,
            &params.server_property,
            self.config.cross_origin_allowed,
            self.config.origin_validator.as_ref(),
        )?;

        // Verify that the rpIdHash in authData is the SHA-256 hash of the
        // RP ID expected by the Relying Party.
        validate_rp_id_hash(&auth_data.rp_id_hash, &params.server_property.rp_id)?;

        // Verify the user present / user verified bits against policy.
        validate_user_flags(
            auth_data.user_present,
            auth_data.user_verified,
            params.user_verification_required,
            params.user_presence_required,
        )?;

        // Verify that the "alg" parameter in the credential public key
        // matches one of the items in options.pubKeyCredParams. An empty
        // list accepts any algorithm.
        if !params.pub_key_cred_params.is_empty()
            && !params
                .pub_key_cred_params
                .contains(&acd.credential_pk.type_)
        {
            return Err(WebauthnError::NotAllowedAlgorithm(
                acd.credential_pk.type_ as i64,
            ));
        }

        // Every authenticator extension output must decode through the
        // registered extension set.
        if let Some(extensions) = &auth_data.extensions {
            validate_authenticator_extensions(extensions, true)?;
        }

        // 14. Verify that attStmt is a correct attestation statement,
        // conveying a valid attestation signature, using the statement
        // format's verification procedure.
        let client_data_hash = compute_sha256(&data.client_data_bytes);
        let auth_data_bytes = &data.attestation_object.auth_data_bytes;

        debug!(format = ?data.attestation_object.att_stmt.format(), "verifying attestation");

        let attestation_type = match &data.attestation_object.att_stmt {
            AttestationStatement::Packed(stmt) => {
                verify_packed_attestation(acd, stmt, auth_data_bytes, &client_data_hash)
            }
            AttestationStatement::Tpm(stmt) => verify_tpm_attestation(
                acd,
                stmt,
                auth_data_bytes,
                &client_data_hash,
                self.config.tpm_device_property_decoder.as_ref(),
                self.config.tpm_device_property_validator.as_ref(),
            ),
            AttestationStatement::AndroidKey(stmt) => verify_android_key_attestation(
                acd,
                stmt,
                auth_data_bytes,
                &client_data_hash,
                self.config.android_key_tee_enforced_only,
            ),
            AttestationStatement::AndroidSafetyNet(stmt) => verify_android_safetynet_attestation(
                stmt,
                auth_data_bytes,
                &client_data_hash,
                self.config.safetynet_forward_skew_ms,
                self.config.safetynet_max_age_ms,
            ),
            AttestationStatement::Apple(stmt) => {
                verify_apple_anonymous_attestation(acd, stmt, auth_data_bytes, &client_data_hash)
            }
            AttestationStatement::FidoU2F(stmt) => verify_fidou2f_attestation(
                acd,
                stmt,
                &auth_data.rp_id_hash,
                &client_data_hash,
            ),
            AttestationStatement::None => verify_none_attestation(),
        }?;

        // 15./16. Assess the trustworthiness of the verified attestation.
        match &attestation_type {
            AttestationType::Basic(chain)
            | AttestationType::AttCa(chain)
            | AttestationType::AnonCa(chain) => {
                self.verify_trust_path(chain, acd)?;
            }
            AttestationType::Self_ => {
                if !self.config.self_attestation_allowed {
                    return Err(WebauthnError::BadAttestationStatement(
                        "self attestation is not acceptable by policy",
                    ));
                }
            }
            AttestationType::None => {
                // Nothing verifiable was conveyed. Relying parties that
                // require attestation reject this through a custom
                // validator.
            }
        }

        // Finally, the relying party's own checks.
        for validator in &self.config.custom_registration_validators {
            validator.validate(data, params)?;
        }

        Ok(attestation_type)
    }

    fn verify_trust_path(
        &self,
        chain: &[x509::X509],
        acd: &AttestedCredentialData,
    ) -> WebauthnResult<()> {
        let repository = self
            .config
            .trust_anchors
            .as_ref()
            .ok_or(WebauthnError::TrustAnchorNotFound)?;

        // Obtain the acceptable trust anchors - by AAGUID first, then by
        // the certificate key identifiers for U2F era devices.
        let mut anchors = repository.find_by_aaguid(&acd.aaguid)?;

        if anchors.is_empty() {
            let leaf = chain
                .first()
                .ok_or(WebauthnError::BadAttestationStatement("x5c is empty"))?;
            if let Some(aki) = authority_key_identifier(leaf)? {
                anchors = repository.find_by_key_identifier(&aki)?;
            }
            if anchors.is_empty() {
                let ski = subject_key_identifier(leaf)?;
                anchors = repository.find_by_key_identifier(&ski)?;
            }
        }

        if anchors.is_empty() {
            return Err(WebauthnError::TrustAnchorNotFound);
        }

        verify_attestation_chain(
            chain,
            &anchors,
            self.config.enable_revocation_check,
            self.config.danger_disable_certificate_time_checks,
        )
    }
}

/// Verifies webauthn authentication ceremonies - the server side of
/// `navigator.credentials.get()`.
pub struct AuthenticationValidator {
    config: Arc<ValidatorConfig>,
}

impl AuthenticationValidator {
    /// Build a validator over the supplied policy. Accepts an owned config
    /// or an `Arc` shared with a [`RegistrationValidator`].
    pub fn new(config: impl Into<Arc<ValidatorConfig>>) -> Self {
        AuthenticationValidator {
            config: config.into(),
        }
    }

    /// Validate a decoded assertion per Webauthn §7.2. `credential` is the
    /// caller's stored record for the presented credential id; on success
    /// its `counter` has been advanced in place and the caller must persist
    /// it.
    pub fn validate(
        &self,
        data: &AuthenticationData,
        params: &AuthenticationParameters,
        credential: &mut Credential,
    ) -> WebauthnResult<()> {
        // 1. If allowCredentials was supplied, the presented credential id
        // must be a member. The allow list is public knowledge, so a timing
        // safe comparison is not required here.
        if !params.allow_credentials.is_empty()
            && !params
                .allow_credentials
                .iter()
                .any(|cred_id| cred_id == &data.credential_id)
        {
            return Err(WebauthnError::NotAllowedCredentialId);
        }

        // The caller resolved `credential` from its store; it must be the
        // record for the presented id.
        if credential.cred_id != data.credential_id {
            return Err(WebauthnError::NotAllowedCredentialId);
        }

        // 2.-6. Client data checks.
        validate_client_data::<Authentication>(
            &data.client_data,
            &params.server_property,
            self.config.cross_origin_allowed,
            self.config.origin_validator.as_ref(),
        )?;

        // 7. rpIdHash.
        validate_rp_id_hash(
            &data.authenticator_data.rp_id_hash,
            &params.server_property.rp_id,
        )?;

        // 8. User present / verified policy.
        validate_user_flags(
            data.authenticator_data.user_present,
            data.authenticator_data.user_verified,
            params.user_verification_required,
            params.user_presence_required,
        )?;

        // 9. Attested credential data must not appear in an assertion, and
        // extension outputs must decode through the registered set.
        if data.authenticator_data.acd.is_some() {
            return Err(WebauthnError::ConstraintViolation(
                "assertions must not carry attested credential data",
            ));
        }
        if let Some(extensions) = &data.authenticator_data.extensions {
            validate_authenticator_extensions(extensions, false)?;
        }

        // 10. Using the credential public key, verify that sig is a valid
        // signature over the binary concatenation of authData and the hash
        // of the client data.
        let client_data_hash = compute_sha256(&data.client_data_bytes);
        let verification_data: Vec<u8> = data
            .authenticator_data_bytes
            .iter()
            .chain(client_data_hash.iter())
            .copied()
            .collect();

        let verified = credential
            .cred
            .verify_signature(&data.signature, &verification_data)?;

        if !verified {
            return Err(WebauthnError::BadSignature);
        }

        // 11. Signature counter - the anti clone signal. A presented and
        // stored counter of zero means the authenticator does not maintain
        // one.
        let presented = data.authenticator_data.sign_count;
        let stored = credential.counter;
        if presented != 0 || stored != 0 {
            if presented > stored {
                credential.counter = presented;
            } else {
                self.config
                    .counter_handler
                    .handle(&credential.cred_id, presented, stored)?;
            }
        }

        // 12. The relying party's own checks.
        for validator in &self.config.custom_authentication_validators {
            validator.validate(data, params)?;
        }

        Ok(())
    }
}
