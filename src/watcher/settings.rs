use std::time::Duration;
use thiserror::Error;

/// Highest volume the watcher lets the output rest at
pub const DEFAULT_MAX_VOLUME: f32 = 0.99999;
/// Lowest volume the watcher lets the output rest at
pub const DEFAULT_MIN_VOLUME: f32 = 0.00001;
/// Delay before a corrective write is applied
pub const DEFAULT_WRITE_DELAY: Duration = Duration::from_millis(10);

/// Invalid interior bounds
#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    /// Bound not strictly inside (0, 1)
    #[error("{name} must be strictly between 0 and 1, got {value}")]
    OutOfRange {
        /// Offending setting
        name: &'static str,
        /// Offending value
        value: f32,
    },

    /// Lower bound not below upper bound
    #[error("min_volume ({min}) must be below max_volume ({max})")]
    Inverted {
        /// Configured lower bound
        min: f32,
        /// Configured upper bound
        max: f32,
    },
}

/// Interior bounds and write timing for [`crate::watcher::VolumeWatcher`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatcherSettings {
    max_volume: f32,
    min_volume: f32,
    write_delay: Duration,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            max_volume: DEFAULT_MAX_VOLUME,
            min_volume: DEFAULT_MIN_VOLUME,
            write_delay: DEFAULT_WRITE_DELAY,
        }
    }
}

impl WatcherSettings {
    /// Validated settings
    ///
    /// # Errors
    /// Returns error if either bound is outside (0, 1) or `min_volume >= max_volume`
    pub fn new(
        max_volume: f32,
        min_volume: f32,
        write_delay: Duration,
    ) -> Result<Self, SettingsError> {
        for (name, value) in [("max_volume", max_volume), ("min_volume", min_volume)] {
            if !(value > 0.0 && value < 1.0) {
                return Err(SettingsError::OutOfRange { name, value });
            }
        }
        if min_volume >= max_volume {
            return Err(SettingsError::Inverted {
                min: min_volume,
                max: max_volume,
            });
        }
        Ok(Self {
            max_volume,
            min_volume,
            write_delay,
        })
    }

    /// Upper interior bound
    #[must_use]
    pub const fn max_volume(&self) -> f32 {
        self.max_volume
    }

    /// Lower interior bound
    #[must_use]
    pub const fn min_volume(&self) -> f32 {
        self.min_volume
    }

    /// Delay applied to every volume write
    #[must_use]
    pub const fn write_delay(&self) -> Duration {
        self.write_delay
    }

    /// Volume to park at, given the live `volume`
    ///
    /// Values at or beyond a bound move onto it; interior values are kept.
    #[must_use]
    pub fn park(&self, volume: f32) -> f32 {
        if volume >= self.max_volume {
            self.max_volume
        } else if volume <= self.min_volume {
            self.min_volume
        } else {
            volume
        }
    }
}
