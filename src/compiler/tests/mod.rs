//! Compiler tests
//!
//! - Ordering and grouping of compiled rules
//! - Timing table validation
//! - Property tests for the subset ordering invariant

#[cfg(test)]
mod compiler_tests;
#[cfg(test)]
mod policy_tests;
