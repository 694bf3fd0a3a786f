//! Types for the fido metadata service as defined by
//! <https://fidoalliance.org/specs/mds/fido-metadata-service-v3.0-ps-20210518.html>,
//! reduced to the subset a relying party consumes when resolving attestation
//! trust anchors, and the metadata backed [`TrustAnchorRepository`]
//! implementation.
//!
//! Fetching and signature verification of the metadata BLOB is the
//! collaborator's concern - a [`MetadataProvider`] hands this crate already
//! verified statements.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use openssl::x509;

use crate::core::{MetadataProvider, TrustAnchorRepository};
use crate::crypto::subject_key_identifier;
use crate::error::{WebauthnError, WebauthnResult};
use crate::proto::Aaguid;

/// The fido certification status of the device associated to this aaguid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthenticatorStatus {
    /// The device is NOT fido certified
    #[serde(rename = "NOT_FIDO_CERTIFIED")]
    NotFidoCertified,
    /// The device is fido certified.
    #[serde(rename = "FIDO_CERTIFIED")]
    FidoCertified,
    /// Indicates that malware is able to bypass the user verification. This
    /// means that the authenticator could be used without the user's consent
    /// and potentially even without the user's knowledge.
    #[serde(rename = "USER_VERIFICATION_BYPASS")]
    UserVerificationBypass,
    /// Indicates that an attestation key for this authenticator is known to
    /// be compromised. Relying parties should reject registrations of the
    /// compromised authenticator batch.
    #[serde(rename = "ATTESTATION_KEY_COMPROMISE")]
    AttestationKeyCompromise,
    /// This authenticator has identified weaknesses that allow registered
    /// keys to be compromised and should not be trusted.
    #[serde(rename = "USER_KEY_REMOTE_COMPROMISE")]
    UserKeyRemoteCompromise,
    /// This authenticator has known weaknesses in its key protection
    /// mechanism(s) that allow user keys to be extracted by an adversary in
    /// physical possession of the device.
    #[serde(rename = "USER_KEY_PHYSICAL_COMPROMISE")]
    UserKeyPhysicalCompromise,
    /// A software or firmware update is available for the device.
    #[serde(rename = "UPDATE_AVAILABLE")]
    UpdateAvailable,
    /// The FIDO Alliance has determined that this authenticator should not
    /// be trusted for any reason.
    #[serde(rename = "REVOKED")]
    Revoked,
    /// The authenticator vendor has completed and submitted the
    /// self-certification checklist to the FIDO Alliance.
    #[serde(rename = "SELF_ASSERTION_SUBMITTED")]
    SelfAssertionSubmitted,
    /// This device is certified at level 1
    #[serde(rename = "FIDO_CERTIFIED_L1")]
    FidoCertifiedL1,
    /// This device is certified at level 1 plus
    #[serde(rename = "FIDO_CERTIFIED_L1plus")]
    FidoCertifiedL1Plus,
    /// This device is certified at level 2
    #[serde(rename = "FIDO_CERTIFIED_L2")]
    FidoCertifiedL2,
    /// This device is certified at level 2 plus
    #[serde(rename = "FIDO_CERTIFIED_L2plus")]
    FidoCertifiedL2Plus,
    /// This device is certified at level 3
    #[serde(rename = "FIDO_CERTIFIED_L3")]
    FidoCertifiedL3,
    /// This device is certified at level 3 plus
    #[serde(rename = "FIDO_CERTIFIED_L3plus")]
    FidoCertifiedL3Plus,
}

impl AuthenticatorStatus {
    /// Whether this status forbids trusting attestations from the device.
    pub fn is_compromised(&self) -> bool {
        matches!(
            self,
            AuthenticatorStatus::UserVerificationBypass
                | AuthenticatorStatus::AttestationKeyCompromise
                | AuthenticatorStatus::UserKeyRemoteCompromise
                | AuthenticatorStatus::UserKeyPhysicalCompromise
                | AuthenticatorStatus::Revoked
        )
    }
}

impl fmt::Display for AuthenticatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Contains an AuthenticatorStatus and additional data associated with it,
/// if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// The status of the authenticator.
    pub status: AuthenticatorStatus,
    /// ISO-8601 formatted date since when the status code was set, if
    /// applicable. If no date is given, the status is assumed to be
    /// effective while present.
    #[serde(default)]
    pub effective_date: Option<String>,
    /// The authenticatorVersion that this status report relates to.
    #[serde(default)]
    pub authenticator_version: Option<u32>,
    /// HTTPS URL where additional information may be found related to the
    /// current status, if applicable.
    #[serde(default)]
    pub url: Option<String>,
}

/// The subset of a FIDOMetadataStatement that attestation trust resolution
/// consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataStatement {
    /// The AAGUID of the authenticator model, for FIDO2 devices.
    #[serde(default)]
    pub aaguid: Option<Uuid>,
    /// A human readable description of the authenticator.
    #[serde(default)]
    pub description: Option<String>,
    /// A list of the attestation certificate public key identifiers encoded
    /// as hex strings, calculated according to method 1 of RFC 5280
    /// section 4.2.1.2.
    #[serde(default)]
    pub attestation_certificate_key_identifiers: Option<Vec<String>>,
    /// The attestation types the authenticator supports, e.g. "basic_full".
    #[serde(default)]
    pub attestation_types: Vec<String>,
    /// The attestation root certificates, base64 (standard alphabet) DER.
    pub attestation_root_certificates: Vec<String>,
}

impl MetadataStatement {
    /// Decode the attestation root certificates of this statement.
    pub fn root_certificates(&self) -> WebauthnResult<Vec<x509::X509>> {
        self.attestation_root_certificates
            .iter()
            .map(|b64| {
                base64::decode(b64)
                    .map_err(|_| {
                        WebauthnError::CertificateError(
                            "metadata root certificate base64 invalid".to_string(),
                        )
                    })
                    .and_then(|der| {
                        x509::X509::from_der(&der).map_err(|_| {
                            WebauthnError::CertificateError(
                                "metadata root certificate der invalid".to_string(),
                            )
                        })
                    })
            })
            .collect()
    }
}

/// One device entry of the metadata BLOB - a statement plus the status
/// reports that apply to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEntry {
    /// The FIDOMetadataStatement pertaining to this device.
    pub metadata_statement: MetadataStatement,
    /// An array of status reports applicable to this authenticator.
    #[serde(default)]
    pub status_reports: Vec<StatusReport>,
    /// ISO-8601 formatted date since when the status report array was set to
    /// the current value.
    #[serde(default)]
    pub time_of_last_status_change: Option<String>,
}

impl MetadataEntry {
    fn assert_trustworthy(&self) -> WebauthnResult<()> {
        for report in &self.status_reports {
            if report.status.is_compromised() {
                warn!(status = %report.status, "authenticator model carries a forbidding status");
                return Err(WebauthnError::BadStatus(report.status.to_string()));
            }
        }
        Ok(())
    }
}

/// A [`MetadataProvider`] over a fixed, already verified set of entries.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadataProvider {
    entries: Vec<MetadataEntry>,
}

impl StaticMetadataProvider {
    /// Wrap a set of metadata entries.
    pub fn new(entries: Vec<MetadataEntry>) -> Self {
        StaticMetadataProvider { entries }
    }
}

impl FromStr for StaticMetadataProvider {
    type Err = WebauthnError;

    /// Parse the `entries` array of an already verified metadata BLOB
    /// payload.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
            .map(StaticMetadataProvider::new)
            .map_err(|err| {
                error!(?err, "unable to parse metadata entries");
                WebauthnError::ConstraintViolation("metadata entries undecodable")
            })
    }
}

impl MetadataProvider for StaticMetadataProvider {
    fn provide(&self) -> WebauthnResult<Vec<MetadataEntry>> {
        Ok(self.entries.clone())
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Resolves attestation trust anchors from fido metadata. Lookup is by
/// AAGUID for FIDO2 devices, or by attestation certificate key identifier
/// for U2F era devices. A device whose status reports mark it compromised
/// resolves to an error rather than to anchors.
pub struct MetadataTrustAnchorResolver<P>
where
    P: MetadataProvider,
{
    provider: P,
}

impl<P> MetadataTrustAnchorResolver<P>
where
    P: MetadataProvider,
{
    /// Build a resolver over the supplied provider.
    pub fn new(provider: P) -> Self {
        MetadataTrustAnchorResolver { provider }
    }

    fn collect_anchors(&self, entries: &[&MetadataEntry]) -> WebauthnResult<Vec<x509::X509>> {
        let mut anchors = Vec::new();
        for entry in entries {
            entry.assert_trustworthy()?;
            anchors.extend(entry.metadata_statement.root_certificates()?);
        }
        Ok(anchors)
    }
}

impl<P> TrustAnchorRepository for MetadataTrustAnchorResolver<P>
where
    P: MetadataProvider,
{
    fn find_by_aaguid(&self, aaguid: &Aaguid) -> WebauthnResult<Vec<x509::X509>> {
        let entries = self.provider.provide()?;
        let wanted = Uuid::from_bytes(*aaguid);

        let matched: Vec<&MetadataEntry> = entries
            .iter()
            .filter(|entry| entry.metadata_statement.aaguid == Some(wanted))
            .collect();

        self.collect_anchors(&matched)
    }

    fn find_by_key_identifier(&self, key_identifier: &[u8]) -> WebauthnResult<Vec<x509::X509>> {
        let entries = self.provider.provide()?;
        let wanted = hex_lower(key_identifier);

        let mut matched: Vec<&MetadataEntry> = Vec::new();
        for entry in &entries {
            let by_listed_identifier = entry
                .metadata_statement
                .attestation_certificate_key_identifiers
                .as_ref()
                .map(|ids| ids.iter().any(|id| id.eq_ignore_ascii_case(&wanted)))
                .unwrap_or(false);

            let by_root_ski = if by_listed_identifier {
                false
            } else {
                entry
                    .metadata_statement
                    .root_certificates()?
                    .iter()
                    .any(|cert| {
                        subject_key_identifier(cert)
                            .map(|ski| ski == key_identifier)
                            .unwrap_or(false)
                    })
            };

            if by_listed_identifier || by_root_ski {
                matched.push(entry);
            }
        }

        self.collect_anchors(&matched)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::test_support::TestAttestationCa;

    fn entry_for(
        aaguid: Option<Uuid>,
        ca: &TestAttestationCa,
        statuses: Vec<AuthenticatorStatus>,
    ) -> MetadataEntry {
        MetadataEntry {
            metadata_statement: MetadataStatement {
                aaguid,
                description: Some("Example Authenticator".to_string()),
                attestation_certificate_key_identifiers: None,
                attestation_types: vec!["basic_full".to_string()],
                attestation_root_certificates: vec![base64::encode(ca.cert_der())],
            },
            status_reports: statuses
                .into_iter()
                .map(|status| StatusReport {
                    status,
                    effective_date: None,
                    authenticator_version: None,
                    url: None,
                })
                .collect(),
            time_of_last_status_change: Some("2022-01-12".to_string()),
        }
    }

    #[test]
    fn resolve_by_aaguid() {
        let ca = TestAttestationCa::new_u2f_style();
        let aaguid = Uuid::from_bytes([3u8; 16]);
        let provider = StaticMetadataProvider::new(vec![entry_for(
            Some(aaguid),
            &ca,
            vec![AuthenticatorStatus::FidoCertifiedL1],
        )]);
        let resolver = MetadataTrustAnchorResolver::new(provider);

        let anchors = resolver.find_by_aaguid(&[3u8; 16]).unwrap();
        assert_eq!(anchors.len(), 1);

        let missing = resolver.find_by_aaguid(&[4u8; 16]).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn compromised_status_is_rejected() {
        let ca = TestAttestationCa::new_u2f_style();
        let aaguid = Uuid::from_bytes([3u8; 16]);
        let provider = StaticMetadataProvider::new(vec![entry_for(
            Some(aaguid),
            &ca,
            vec![
                AuthenticatorStatus::FidoCertifiedL1,
                AuthenticatorStatus::AttestationKeyCompromise,
            ],
        )]);
        let resolver = MetadataTrustAnchorResolver::new(provider);

        let err = resolver.find_by_aaguid(&[3u8; 16]).unwrap_err();
        assert!(matches!(err, WebauthnError::BadStatus(_)));
    }

    #[test]
    fn resolve_by_root_certificate_key_identifier() {
        let ca = TestAttestationCa::new_u2f_style();
        let ki = crate::crypto::subject_key_identifier(&ca.cert()).unwrap();

        let provider = StaticMetadataProvider::new(vec![entry_for(
            None,
            &ca,
            vec![AuthenticatorStatus::FidoCertified],
        )]);
        let resolver = MetadataTrustAnchorResolver::new(provider);

        let anchors = resolver.find_by_key_identifier(&ki).unwrap();
        assert_eq!(anchors.len(), 1);
    }

    #[test]
    fn resolve_by_listed_key_identifier() {
        let ca = TestAttestationCa::new_u2f_style();
        let ki = vec![0xde, 0xad, 0xbe, 0xef];

        let mut entry = entry_for(None, &ca, vec![AuthenticatorStatus::FidoCertified]);
        entry
            .metadata_statement
            .attestation_certificate_key_identifiers = Some(vec!["DEADBEEF".to_string()]);

        let provider = StaticMetadataProvider::new(vec![entry]);
        let resolver = MetadataTrustAnchorResolver::new(provider);

        let anchors = resolver.find_by_key_identifier(&ki).unwrap();
        assert_eq!(anchors.len(), 1);
    }
}
