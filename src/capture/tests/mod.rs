//! Capture session tests
//!
//! - Two-phase start and its failure paths
//! - Candidate freezing on silence
//! - Conflict, overlap and output prompts
//! - Rollback and exactly-once resume
