//! # StrayWatch Test Suite
//!
//! Cross-component flows through [`sw_01_billing::BillingService`] with the
//! in-memory ports.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # Registry and purchase-path benchmarks
//! └── src/integration/  # End-to-end purchase flows
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p sw-tests
//! cargo bench -p sw-tests
//! ```

pub mod integration;
