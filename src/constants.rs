//! Constants used by the ceremony verifiers.

/// TPM_GENERATED_VALUE - all valid TPMS_ATTEST structures open with this magic.
pub(crate) const TPM_GENERATED_VALUE: u32 = 0xff54_4347;

/// The hostname the SafetyNet attestation response must be issued to.
pub(crate) const SAFETYNET_ATTEST_HOSTNAME: &str = "attest.android.com";

/// Default and maximum permitted forward clock skew for SafetyNet
/// response timestamps, in milliseconds.
pub(crate) const SAFETYNET_MAX_FORWARD_SKEW_MS: u64 = 60_000;

/// Default permitted age of a SafetyNet response timestamp, in milliseconds.
pub(crate) const SAFETYNET_DEFAULT_MAX_AGE_MS: u64 = 60_000;
