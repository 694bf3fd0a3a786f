//! Webauthn-ceremony - Webauthn Ceremony Verification for Rust Server Applications
//!
//! Webauthn is a standard allowing communication between servers, browsers and
//! authenticators to allow strong, passwordless, cryptographic authentication to
//! be performed. This library implements the server side *verification* of the
//! two Webauthn ceremonies - registration (enrolment of a new authenticator)
//! and authentication (verification of an assertion) - as defined by the
//! W3C Webauthn Level 2 specification.
//!
//! This crate deliberately does not speak HTTP, does not decode wire formats,
//! and does not persist anything. The caller decodes the client's response
//! into the structures of [`proto`], supplies the expected [`proto::ServerProperty`]
//! for the ceremony, and invokes [`RegistrationValidator`] or
//! [`AuthenticationValidator`]. Any deviation from the specification aborts
//! the ceremony with a typed [`error::WebauthnError`].

#![deny(warnings)]
#![warn(unused_extern_crates)]
#![warn(missing_docs)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

#[macro_use]
extern crate tracing;

#[macro_use]
mod macros;

mod constants;

mod attestation;
mod crypto;
mod tpm;

pub mod core;
pub mod error;
pub mod metadata;
pub mod proto;

#[cfg(test)]
pub(crate) mod test_support;

pub use crate::attestation::AttestationFormat;
pub use crate::core::*;
