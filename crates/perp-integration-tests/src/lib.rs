//! Integration test crate for the perpetual price oracle.
//!
//! This crate has no library code. It only contains tests that drive the
//! store end to end across `perp-math`, `perp-types` and `perp-oracle`.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p perp-integration-tests
//! ```
