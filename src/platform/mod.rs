//! Platform capabilities consumed by the volume watcher.
//!
//! The watcher never talks to audio APIs directly. Everything it needs from the
//! host (observation, the hidden volume control, the audio session and deferred
//! writes) goes through [`VolumePlatform`].

/// In-memory platform double
pub mod fake;
/// Desktop adapter backed by `osascript` / `wpctl`
pub mod system;

use std::time::Duration;
use thiserror::Error;

pub use fake::FakePlatform;
pub use system::{Backend, SystemPlatform};

/// Events delivered by the platform to the watcher
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VolumeEvent {
    /// Output volume observed to change from `old` to `new`
    VolumeChanged {
        /// Value before the change
        old: f32,
        /// Value after the change
        new: f32,
    },
    /// Host application moved to the foreground
    EnteredForeground,
    /// Host application moved to the background
    EnteredBackground,
    /// Audio session interruption started
    InterruptionBegan,
    /// Audio session interruption ended
    InterruptionEnded,
}

/// How the audio session is configured on activation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCategory {
    /// Playback category, mixing with other audio sources
    PlaybackMixWithOthers,
}

/// Live observation subscription (volume, lifecycle and interruption)
///
/// Returned by [`VolumePlatform::subscribe`] and handed back to
/// [`VolumePlatform::unsubscribe`]. Deliberately not `Clone`.
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    id: u64,
}

impl Subscription {
    /// Wrap a platform-assigned identifier
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self { id }
    }

    /// Platform-assigned identifier
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }
}

/// Hidden volume-control surface attached to the host
///
/// `target` is the underlying control the surface writes through. A surface
/// that is attached but not yet bound (`target == None`) silently skips writes.
#[derive(Debug, PartialEq, Eq)]
pub struct ControlHandle {
    id: u64,
    target: Option<String>,
}

impl ControlHandle {
    /// Attached surface bound to an underlying control
    #[must_use]
    pub const fn bound(id: u64, target: String) -> Self {
        Self {
            id,
            target: Some(target),
        }
    }

    /// Attached surface with no underlying control yet
    #[must_use]
    pub const fn unbound(id: u64) -> Self {
        Self { id, target: None }
    }

    /// Platform-assigned identifier
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Name of the underlying control, if any
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Whether writes through this surface reach a control
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.target.is_some()
    }
}

/// Platform failures surfaced to the watcher
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Audio session could not be activated
    #[error("failed to activate audio session: {reason}")]
    SessionActivation {
        /// Backend-specific reason
        reason: String,
    },

    /// Backend command could not be run or exited unsuccessfully
    #[error("{command} failed: {reason}")]
    Command {
        /// Program that was invoked
        command: &'static str,
        /// What went wrong
        reason: String,
    },

    /// Backend output could not be parsed as a volume
    #[error("unrecognized volume output: {output:?}")]
    Parse {
        /// Raw output
        output: String,
    },
}

/// Capabilities the watcher needs from the host platform
///
/// Use `MockVolumePlatform` (via `mockall`) for call-expectation tests and
/// [`FakePlatform`] for behavioral tests.
#[cfg_attr(test, mockall::automock)]
pub trait VolumePlatform {
    /// Start observing output volume, lifecycle and interruption notifications
    fn subscribe(&mut self) -> Subscription;

    /// Stop delivering the notifications of `subscription`
    fn unsubscribe(&mut self, subscription: Subscription);

    /// Attach the hidden volume control to the active window
    fn attach_control(&mut self) -> ControlHandle;

    /// Detach a previously attached control
    fn detach_control(&mut self, control: ControlHandle);

    /// Configure and activate the audio-routing session
    ///
    /// # Errors
    /// Returns error if the session cannot be activated
    fn activate_session(&mut self, category: SessionCategory) -> Result<(), PlatformError>;

    /// Current output volume in `[0.0, 1.0]`
    ///
    /// # Errors
    /// Returns error if the volume cannot be read
    fn current_volume(&self) -> Result<f32, PlatformError>;

    /// Write `volume` through `control` after `delay`
    fn schedule_volume_write(&mut self, control: &ControlHandle, volume: f32, delay: Duration);

    /// Closest value the output can actually store, rounded towards 0.5
    ///
    /// A parked value must survive the write unchanged, otherwise the
    /// corrective write produces no notification.
    fn quantize(&self, volume: f32) -> f32;
}

impl<P: VolumePlatform + ?Sized> VolumePlatform for &mut P {
    fn subscribe(&mut self) -> Subscription {
        (**self).subscribe()
    }

    fn unsubscribe(&mut self, subscription: Subscription) {
        (**self).unsubscribe(subscription);
    }

    fn attach_control(&mut self) -> ControlHandle {
        (**self).attach_control()
    }

    fn detach_control(&mut self, control: ControlHandle) {
        (**self).detach_control(control);
    }

    fn activate_session(&mut self, category: SessionCategory) -> Result<(), PlatformError> {
        (**self).activate_session(category)
    }

    fn current_volume(&self) -> Result<f32, PlatformError> {
        (**self).current_volume()
    }

    fn schedule_volume_write(&mut self, control: &ControlHandle, volume: f32, delay: Duration) {
        (**self).schedule_volume_write(control, volume, delay);
    }

    fn quantize(&self, volume: f32) -> f32 {
        (**self).quantize(volume)
    }
}

/// Round `volume` onto a grid of `steps` levels, away from the hard extremes
///
/// Values already on the grid (within float noise) are kept; others round
/// down in the upper half and up in the lower half, so a bound like 0.99999
/// lands on 0.99 rather than 1.0.
#[must_use]
pub fn quantize_inward(volume: f32, steps: u16) -> f32 {
    let steps = f32::from(steps.max(1));
    let scaled = volume.clamp(0.0, 1.0) * steps;
    let nearest = scaled.round();
    let noise = nearest.max(1.0) * f32::EPSILON * 8.0;
    let level = if (scaled - nearest).abs() <= noise {
        nearest
    } else if volume >= 0.5 {
        scaled.floor()
    } else {
        scaled.ceil()
    };
    level / steps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_handle_bound() {
        let control = ControlHandle::bound(3, "default".to_owned());
        assert!(control.is_bound());
        assert_eq!(control.target(), Some("default"));
        assert_eq!(control.id(), 3);
    }

    #[test]
    fn test_control_handle_unbound() {
        let control = ControlHandle::unbound(1);
        assert!(!control.is_bound());
        assert_eq!(control.target(), None);
    }

    #[test]
    fn test_platform_error_messages() {
        let err = PlatformError::SessionActivation {
            reason: "busy".to_owned(),
        };
        assert_eq!(err.to_string(), "failed to activate audio session: busy");

        let err = PlatformError::Parse {
            output: "nope".to_owned(),
        };
        assert_eq!(err.to_string(), "unrecognized volume output: \"nope\"");
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_quantize_inward_percent() {
        assert_eq!(quantize_inward(0.99999, 100), 0.99);
        assert_eq!(quantize_inward(0.00001, 100), 0.01);
        assert_eq!(quantize_inward(0.57, 100), 0.57);
        assert_eq!(quantize_inward(0.29, 100), 0.29);
        assert_eq!(quantize_inward(1.0, 100), 1.0);
        assert_eq!(quantize_inward(0.0, 100), 0.0);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_quantize_inward_keeps_bounds_off_extremes() {
        for steps in [10, 100, 1000] {
            let max = quantize_inward(0.99999, steps);
            let min = quantize_inward(0.00001, steps);
            assert!(max < 1.0 && max > 0.5, "max {max} at {steps} steps");
            assert!(min > 0.0 && min < 0.5, "min {min} at {steps} steps");
        }
    }
}
