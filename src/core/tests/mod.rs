//! Core module tests
//!
//! Contains test suites for core functionality:
//! - Type tests (KeySet, OutputSpec, Chord)
//! - Key vocabulary and output validation tests
//! - Parser tests (key specs, sequences, batch files, event lines)
//! - Overlap and conflict detection tests
//! - Chord store tests, including property tests
//! - Search ranking tests

#[cfg(test)]
mod parser_tests;
#[cfg(test)]
mod search_tests;
#[cfg(test)]
mod store_tests;
