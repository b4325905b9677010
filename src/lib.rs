//! Volume Watcher - detect hardware volume-button presses without changing
//! the volume the user has set
//!
//! This library exports the watcher and its platform adapters for hosts and tests.

/// Configuration management
pub mod config;
/// Platform capabilities (observation, hidden control, audio session)
pub mod platform;
/// Logging setup
pub mod telemetry;
/// Volume-button detection state machine
pub mod watcher;

pub use platform::{FakePlatform, SystemPlatform, VolumeEvent, VolumePlatform};
pub use watcher::{Direction, Press, VolumeWatcher, WatcherSettings};
