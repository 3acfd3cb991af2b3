//! Status machine
//!
//! Condition bookkeeping, phase/state derivation and reconcile reporting.

pub mod conditions;
pub mod reporting;

pub use conditions::*;
pub use reporting::*;
