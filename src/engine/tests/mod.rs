//! Engine module tests
//!
//! - karabiner.json editing preserves foreign content
//! - Manipulator rendering
//! - Live and DryRun engine behaviour
