use std::time::Duration;

use super::{
    quantize_inward, ControlHandle, PlatformError, SessionCategory, Subscription, VolumeEvent,
    VolumePlatform,
};

/// Write scheduled through [`VolumePlatform::schedule_volume_write`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingWrite {
    /// Control the write goes through
    pub control: u64,
    /// Target volume
    pub volume: f32,
    /// Requested delay
    pub delay: Duration,
}

/// In-memory platform that records every call the watcher makes
///
/// Writes are queued until [`FakePlatform::flush_writes`], which applies them
/// and reports the notifications a real platform would deliver. Like the real
/// thing, a write that leaves the value unchanged produces no notification.
/// With [`FakePlatform::with_resolution`] it also stores only grid values, the
/// way `osascript` (percent) and `wpctl` (two decimals) do.
#[derive(Debug)]
pub struct FakePlatform {
    volume: f32,
    next_id: u64,
    live_subscriptions: Vec<u64>,
    attached_controls: Vec<u64>,
    subscribe_calls: usize,
    attach_calls: usize,
    activations: Vec<SessionCategory>,
    fail_activation: bool,
    bind_controls: bool,
    pending: Vec<PendingWrite>,
    applied: Vec<f32>,
    resolution: Option<u16>,
}

impl FakePlatform {
    /// Platform whose output volume starts at `volume`
    #[must_use]
    pub const fn new(volume: f32) -> Self {
        Self {
            volume,
            next_id: 1,
            live_subscriptions: Vec::new(),
            attached_controls: Vec::new(),
            subscribe_calls: 0,
            attach_calls: 0,
            activations: Vec::new(),
            fail_activation: false,
            bind_controls: true,
            pending: Vec::new(),
            applied: Vec::new(),
            resolution: None,
        }
    }

    /// Attach controls that are not bound to an underlying control
    #[must_use]
    pub fn with_unbound_controls(mut self) -> Self {
        self.bind_controls = false;
        self
    }

    /// Store volumes on a grid of `steps` levels, rounding writes to nearest
    #[must_use]
    pub fn with_resolution(mut self, steps: u16) -> Self {
        self.resolution = Some(steps.max(1));
        self
    }

    /// Make subsequent session activations fail
    pub fn set_fail_activation(&mut self, fail: bool) {
        self.fail_activation = fail;
    }

    /// Change the output volume as a hardware press would
    ///
    /// Returns the notification, or `None` when the value did not change.
    #[allow(clippy::float_cmp)] // Platform only notifies on an exact delta
    pub fn set_volume(&mut self, volume: f32) -> Option<VolumeEvent> {
        let old = self.volume;
        self.volume = volume;
        (old != volume).then_some(VolumeEvent::VolumeChanged { old, new: volume })
    }

    /// Apply queued writes in order, returning the resulting notifications
    pub fn flush_writes(&mut self) -> Vec<VolumeEvent> {
        let pending = std::mem::take(&mut self.pending);
        let mut events = Vec::new();
        for write in pending {
            if !self.attached_controls.contains(&write.control) {
                continue;
            }
            self.applied.push(write.volume);
            let stored = self.resolution.map_or(write.volume, |steps| {
                let steps = f32::from(steps);
                (write.volume * steps).round() / steps
            });
            events.extend(self.set_volume(stored));
        }
        events
    }

    /// Current output volume
    #[must_use]
    pub const fn volume(&self) -> f32 {
        self.volume
    }

    /// Number of subscriptions currently live
    #[must_use]
    pub fn live_subscriptions(&self) -> usize {
        self.live_subscriptions.len()
    }

    /// Number of controls currently attached
    #[must_use]
    pub fn attached_controls(&self) -> usize {
        self.attached_controls.len()
    }

    /// Total `subscribe` calls
    #[must_use]
    pub const fn subscribe_calls(&self) -> usize {
        self.subscribe_calls
    }

    /// Total `attach_control` calls
    #[must_use]
    pub const fn attach_calls(&self) -> usize {
        self.attach_calls
    }

    /// Every activation attempt, successful or not
    #[must_use]
    pub fn activations(&self) -> &[SessionCategory] {
        &self.activations
    }

    /// Writes waiting for [`FakePlatform::flush_writes`]
    #[must_use]
    pub fn pending_writes(&self) -> &[PendingWrite] {
        &self.pending
    }

    /// Every write applied so far
    #[must_use]
    pub fn applied_writes(&self) -> &[f32] {
        &self.applied
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl VolumePlatform for FakePlatform {
    fn subscribe(&mut self) -> Subscription {
        self.subscribe_calls += 1;
        let id = self.next_id();
        self.live_subscriptions.push(id);
        Subscription::new(id)
    }

    fn unsubscribe(&mut self, subscription: Subscription) {
        self.live_subscriptions.retain(|id| *id != subscription.id());
    }

    fn attach_control(&mut self) -> ControlHandle {
        self.attach_calls += 1;
        let id = self.next_id();
        self.attached_controls.push(id);
        if self.bind_controls {
            ControlHandle::bound(id, format!("fake-slider-{id}"))
        } else {
            ControlHandle::unbound(id)
        }
    }

    fn detach_control(&mut self, control: ControlHandle) {
        self.attached_controls.retain(|id| *id != control.id());
    }

    fn activate_session(&mut self, category: SessionCategory) -> Result<(), PlatformError> {
        self.activations.push(category);
        if self.fail_activation {
            return Err(PlatformError::SessionActivation {
                reason: "injected failure".to_owned(),
            });
        }
        Ok(())
    }

    fn current_volume(&self) -> Result<f32, PlatformError> {
        Ok(self.volume)
    }

    fn schedule_volume_write(&mut self, control: &ControlHandle, volume: f32, delay: Duration) {
        if !control.is_bound() {
            return;
        }
        self.pending.push(PendingWrite {
            control: control.id(),
            volume,
            delay,
        });
    }

    fn quantize(&self, volume: f32) -> f32 {
        self.resolution
            .map_or(volume, |steps| quantize_inward(volume, steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_volume_notifies_only_on_delta() {
        let mut platform = FakePlatform::new(0.5);
        assert_eq!(
            platform.set_volume(0.6),
            Some(VolumeEvent::VolumeChanged { old: 0.5, new: 0.6 })
        );
        assert_eq!(platform.set_volume(0.6), None);
    }

    #[test]
    fn test_flush_applies_writes_in_order() {
        let mut platform = FakePlatform::new(0.5);
        let control = platform.attach_control();
        platform.schedule_volume_write(&control, 0.7, Duration::from_millis(10));
        platform.schedule_volume_write(&control, 0.7, Duration::from_millis(10));

        let events = platform.flush_writes();
        assert_eq!(events, vec![VolumeEvent::VolumeChanged { old: 0.5, new: 0.7 }]);
        assert_eq!(platform.applied_writes(), &[0.7, 0.7]);
        assert!(platform.pending_writes().is_empty());
    }

    #[test]
    fn test_unbound_control_skips_writes() {
        let mut platform = FakePlatform::new(0.5).with_unbound_controls();
        let control = platform.attach_control();
        platform.schedule_volume_write(&control, 0.7, Duration::ZERO);
        assert!(platform.pending_writes().is_empty());
    }

    #[test]
    fn test_detached_control_drops_pending_writes() {
        let mut platform = FakePlatform::new(0.5);
        let control = platform.attach_control();
        platform.schedule_volume_write(&control, 0.7, Duration::ZERO);
        platform.detach_control(control);

        assert!(platform.flush_writes().is_empty());
        assert!((platform.volume() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_resolution_rounds_stored_volume() {
        let mut platform = FakePlatform::new(1.0).with_resolution(100);
        let control = platform.attach_control();
        platform.schedule_volume_write(&control, 0.99999, Duration::ZERO);

        // Off-grid write rounds back onto the extreme, so nothing is reported
        assert!(platform.flush_writes().is_empty());
        assert_eq!(platform.volume(), 1.0);
        assert_eq!(platform.quantize(0.99999), 0.99);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_quantize_is_identity_without_resolution() {
        let platform = FakePlatform::new(0.5);
        assert_eq!(platform.quantize(0.99999), 0.99999);
    }

    #[test]
    fn test_activation_failure_injection() {
        let mut platform = FakePlatform::new(0.5);
        platform.set_fail_activation(true);
        let result = platform.activate_session(SessionCategory::PlaybackMixWithOthers);
        assert!(matches!(
            result,
            Err(PlatformError::SessionActivation { .. })
        ));
        assert_eq!(platform.activations().len(), 1);
    }

    #[test]
    fn test_subscriptions_tracked() {
        let mut platform = FakePlatform::new(0.5);
        let first = platform.subscribe();
        let second = platform.subscribe();
        assert_ne!(first.id(), second.id());
        assert_eq!(platform.live_subscriptions(), 2);

        platform.unsubscribe(first);
        assert_eq!(platform.live_subscriptions(), 1);
        assert_eq!(platform.subscribe_calls(), 2);
    }
}
