//! Volume-button detection without changing the audible volume.
//!
//! The platform only reports a volume change when the value actually moves, so
//! a press at 0.0 or 1.0 would go unnoticed. The watcher keeps the output
//! parked inside `[min_volume, max_volume]` and writes the parked value back
//! after every press, ignoring the notification its own write produces.

mod settings;
mod state;

pub use settings::{
    SettingsError, WatcherSettings, DEFAULT_MAX_VOLUME, DEFAULT_MIN_VOLUME, DEFAULT_WRITE_DELAY,
};

use tracing::{debug, error, info, warn};

use crate::platform::{SessionCategory, VolumeEvent, VolumePlatform};
use state::{Adjustment, Phase, Running};

/// Which button was pressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Volume up
    Up,
    /// Volume down
    Down,
    /// No delta away from an extreme; the button cannot be told apart
    Unknown,
}

/// A detected volume-button press
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Press {
    /// Which button
    pub direction: Direction,
    /// Volume before the press
    pub old: f32,
    /// Volume after the press
    pub new: f32,
}

impl Press {
    /// Classify an observed change
    ///
    /// A change pinned at an extreme (no numeric delta) counts as a press
    /// towards that extreme. An unchanged interior value is [`Direction::Unknown`].
    #[must_use]
    pub fn from_change(old: f32, new: f32) -> Self {
        let direction = if new > old || (new >= old && new >= 1.0) {
            Direction::Up
        } else if new < old || new <= 0.0 {
            Direction::Down
        } else {
            Direction::Unknown
        };
        Self {
            direction,
            old,
            new,
        }
    }
}

/// Platform reported no change because the value is stuck at a hard extreme
#[allow(clippy::float_cmp)]
fn is_pinned(old: f32, new: f32) -> bool {
    old == new && (new == 1.0 || new == 0.0)
}

/// Detects hardware volume-button presses and keeps the volume parked
pub struct VolumeWatcher<P: VolumePlatform> {
    platform: P,
    settings: WatcherSettings,
    phase: Phase,
    foreground: bool,
    initial_volume: Option<f32>,
    presses: u64,
    on_action: Option<Box<dyn FnMut()>>,
    on_press: Option<Box<dyn FnMut(Press)>>,
}

impl<P: VolumePlatform> VolumeWatcher<P> {
    /// Create the watcher and start it
    pub fn new(platform: P, settings: WatcherSettings) -> Self {
        let mut watcher = Self {
            platform,
            settings,
            phase: Phase::Stopped,
            foreground: true,
            initial_volume: None,
            presses: 0,
            on_action: None,
            on_press: None,
        };
        watcher.start();
        watcher
    }

    /// Invoke `callback` once per detected press
    pub fn set_on_action(&mut self, callback: impl FnMut() + 'static) {
        self.on_action = Some(Box::new(callback));
    }

    /// Invoke `callback` with the direction and volumes of each press
    pub fn set_on_press(&mut self, callback: impl FnMut(Press) + 'static) {
        self.on_press = Some(Box::new(callback));
    }

    /// Engage observation; no-op if already engaged
    pub fn start(&mut self) {
        if self.phase.is_started() {
            debug!("volume watcher already started");
            return;
        }

        self.release();

        let subscription = self.platform.subscribe();
        let control = self.platform.attach_control();
        debug!(
            subscription = subscription.id(),
            control = control.id(),
            bound = control.is_bound(),
            "observation engaged"
        );
        self.phase = Phase::Started(Running {
            subscription,
            control,
            adjustment: Adjustment::Idle,
        });

        self.activate_session();
        self.snap_to_interior();
        info!("volume watcher started");
    }

    /// Disengage observation and release the control; no-op if already stopped
    ///
    /// The audio session is left as it is.
    pub fn stop(&mut self) {
        if !self.phase.is_started() {
            debug!("volume watcher already stopped");
            return;
        }
        self.release();
        info!("volume watcher stopped");
    }

    /// Feed one platform notification to the watcher
    pub fn handle_event(&mut self, event: VolumeEvent) {
        if !self.phase.is_started() {
            debug!(?event, "event while stopped (ignored)");
            return;
        }

        match event {
            VolumeEvent::VolumeChanged { old, new } => self.on_volume_changed(old, new),
            VolumeEvent::EnteredForeground => {
                info!("entered foreground, re-arming");
                self.foreground = true;
                self.activate_session();
                self.snap_to_interior();
            }
            VolumeEvent::EnteredBackground => {
                info!("entered background, pausing");
                self.foreground = false;
            }
            VolumeEvent::InterruptionBegan => info!("audio session interrupted"),
            VolumeEvent::InterruptionEnded => {
                info!("audio session interruption ended");
                self.activate_session();
            }
        }
    }

    /// Whether observation is engaged
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.phase.is_started()
    }

    /// Whether the host is in the foreground
    #[must_use]
    pub const fn is_foreground(&self) -> bool {
        self.foreground
    }

    /// Whether the next observation will be treated as self-inflicted
    #[must_use]
    pub const fn is_adjusting(&self) -> bool {
        self.phase.is_adjusting()
    }

    /// Parked volume, once one has been read
    #[must_use]
    pub const fn initial_volume(&self) -> Option<f32> {
        self.initial_volume
    }

    /// Presses detected since creation
    #[must_use]
    pub const fn press_count(&self) -> u64 {
        self.presses
    }

    /// Active settings
    #[must_use]
    pub const fn settings(&self) -> &WatcherSettings {
        &self.settings
    }

    /// Underlying platform
    #[must_use]
    pub const fn platform(&self) -> &P {
        &self.platform
    }

    /// Underlying platform, mutably
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    fn on_volume_changed(&mut self, old: f32, new: f32) {
        let Phase::Started(running) = &mut self.phase else {
            return;
        };

        if !self.foreground {
            debug!(old, new, "volume changed in background (ignored)");
            return;
        }

        if running.adjustment == Adjustment::Pending {
            running.adjustment = Adjustment::Idle;
            debug!(old, new, "self-inflicted volume change (ignored)");
            return;
        }

        if is_pinned(old, new) {
            info!(volume = new, "press at pinned extreme");
            self.fire(Press::from_change(old, new));
            self.snap_to_interior();
        } else {
            info!(old, new, "volume button pressed");
            self.fire(Press::from_change(old, new));
            match self.initial_volume {
                Some(initial) => self.write_volume(initial),
                None => warn!("no parked volume yet, leaving volume as is"),
            }
        }
    }

    fn fire(&mut self, press: Press) {
        self.presses += 1;
        if let Some(on_action) = self.on_action.as_mut() {
            on_action();
        }
        if let Some(on_press) = self.on_press.as_mut() {
            on_press(press);
        }
    }

    /// Park the live volume inside the interior bounds
    ///
    /// The parked value is one the platform can store, so the corrective write
    /// is always observed and clears the adjustment.
    #[allow(clippy::float_cmp)]
    fn snap_to_interior(&mut self) {
        let current = match self.platform.current_volume() {
            Ok(volume) => volume,
            Err(e) => {
                warn!(error = %e, "failed to read current volume, keeping parked value");
                return;
            }
        };

        let parked = self.platform.quantize(self.settings.park(current));
        self.initial_volume = Some(parked);
        if parked != current {
            debug!(current, parked, "snapping volume to interior");
            self.write_volume(parked);
        } else {
            debug!(volume = current, "volume already inside bounds");
        }
    }

    /// Schedule a write through the hidden control, flagging it self-inflicted
    fn write_volume(&mut self, volume: f32) {
        let Phase::Started(running) = &mut self.phase else {
            return;
        };
        if !running.control.is_bound() {
            debug!(volume, "hidden control not bound, skipping write");
            return;
        }
        running.adjustment = Adjustment::Pending;
        self.platform
            .schedule_volume_write(&running.control, volume, self.settings.write_delay());
    }

    fn activate_session(&mut self) {
        match self
            .platform
            .activate_session(SessionCategory::PlaybackMixWithOthers)
        {
            Ok(()) => debug!("audio session active"),
            Err(e) => error!(error = %e, "audio session activation failed, continuing"),
        }
    }

    fn release(&mut self) {
        if let Some(running) = self.phase.take() {
            self.platform.unsubscribe(running.subscription);
            self.platform.detach_control(running.control);
            debug!("observation released");
        }
    }
}

impl<P: VolumePlatform> Drop for VolumeWatcher<P> {
    fn drop(&mut self) {
        self.stop();
    }
}
