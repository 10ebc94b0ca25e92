//! # Test Utilities for the Wallet Ecosystem
//!
//! Provider trait implementations standing in for the identity provider,
//! wallet provider and PID issuer keys, plus a wallet that drives the flows.
//!
//! This crate provides common utilities for the workspace's tests and is not
//! intended to be used directly.

pub mod issuer;
pub mod verifier;
pub mod wallet;

use std::sync::Once;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// The test user.
pub const NORMAL_USER: &str = "tneal";

/// PID credential configuration offered by the issuer.
pub const PID_CONFIGURATION_ID: &str = "eu.europa.ec.eudi.pid_vc_sd_jwt";

/// PID credential type.
pub const PID_VCT: &str = "urn:eudi:pid:1";

// initialise tracing once for all tests
static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// # Panics
///
/// Panics if the tracing subscriber cannot be set.
pub fn init_tracer() {
    INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::ERROR).finish();
        tracing::subscriber::set_global_default(subscriber).expect("subscriber set");
    });
}
