//! Shared test utilities for wildprompt integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated test execution with a temp wildcard directory
//! - Builders for contexts and deterministic choosers

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
