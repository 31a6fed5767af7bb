//! Unified testing utilities
//!
//! Scriptable SDK doubles and pre-built fixtures for exercising flows and the
//! coordinator without a browser or network. Gated behind the `testing`
//! feature so nothing here ships in a normal build.
//!
//! - [`fixtures`] - Pre-built test data (settings, profiles, widget payloads)
//! - [`mock`] - Scriptable implementations of the SDK and API traits

pub mod fixtures;
pub mod mock;
