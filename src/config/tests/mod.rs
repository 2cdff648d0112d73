//! Config module tests
//!
//! - ConfigManager backup listing and pruning
//! - Atomic transactions and backups
//! - Settings defaults and TOML round trips
//! - Library document load/save

#[cfg(test)]
mod library_tests;
#[cfg(test)]
mod transaction_tests;
