//! Testing utilities for copyflow.
//!
//! This module provides:
//! - A scripted text-generation service that records every request

mod mocks;

pub use mocks::MockTextService;
