//! Shared test utilities for darkcat integration tests.
//!
//! This module provides:
//! - `ArchiveFixture` for an isolated archive root, output directory and catalog
//! - Notifier doubles for driving the archive job processor

pub mod harness;
pub mod notifiers;

pub use harness::ArchiveFixture;
pub use notifiers::{FailingNotifier, RecordingNotifier};
