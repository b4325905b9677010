use serde::Deserialize;
use std::collections::HashMap;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use super::{
    quantize_inward, ControlHandle, PlatformError, SessionCategory, Subscription, VolumeEvent,
    VolumePlatform,
};

/// Command-line tool used to read and write the system output volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// macOS `osascript` (integer percent)
    Osascript,
    /// `PipeWire` `wpctl` (two decimals)
    Wpctl,
}

impl Backend {
    const fn program(self) -> &'static str {
        match self {
            Self::Osascript => "osascript",
            Self::Wpctl => "wpctl",
        }
    }

    /// Number of volume levels the backend stores
    ///
    /// `osascript` takes whole percent, `wpctl` reports two decimals.
    #[must_use]
    pub const fn resolution(self) -> u16 {
        match self {
            Self::Osascript | Self::Wpctl => 100,
        }
    }

    /// Name of the output the backend writes through
    #[must_use]
    pub const fn target(self) -> &'static str {
        match self {
            Self::Osascript => "default output device",
            Self::Wpctl => "@DEFAULT_AUDIO_SINK@",
        }
    }

    fn read_args(self) -> Vec<String> {
        match self {
            Self::Osascript => vec![
                "-e".to_owned(),
                "output volume of (get volume settings)".to_owned(),
            ],
            Self::Wpctl => vec!["get-volume".to_owned(), self.target().to_owned()],
        }
    }

    /// Arguments that set the output volume to `volume` (`0.0..=1.0`)
    #[must_use]
    pub fn write_args(self, volume: f32) -> Vec<String> {
        let volume = volume.clamp(0.0, 1.0);
        match self {
            Self::Osascript => vec![
                "-e".to_owned(),
                format!("set volume output volume {:.3}", volume * 100.0),
            ],
            Self::Wpctl => vec![
                "set-volume".to_owned(),
                self.target().to_owned(),
                format!("{volume:.5}"),
            ],
        }
    }

    fn run(self, args: &[String]) -> Result<String, PlatformError> {
        let output = Command::new(self.program())
            .args(args)
            .output()
            .map_err(|e| PlatformError::Command {
                command: self.program(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(PlatformError::Command {
                command: self.program(),
                reason: format!(
                    "{} ({})",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Read the current output volume
    ///
    /// # Errors
    /// Returns error if the backend command fails or prints something unexpected
    pub fn read_volume(self) -> Result<f32, PlatformError> {
        let stdout = self.run(&self.read_args())?;
        match self {
            Self::Osascript => parse_osascript_volume(&stdout),
            Self::Wpctl => parse_wpctl_volume(&stdout),
        }
    }

    /// Set the output volume
    ///
    /// # Errors
    /// Returns error if the backend command fails
    pub fn write_volume(self, volume: f32) -> Result<(), PlatformError> {
        self.run(&self.write_args(volume)).map(|_| ())
    }
}

/// Parse `osascript` output such as `"42\n"` into `0.42`
///
/// # Errors
/// Returns error for anything but an integer percent (e.g. `missing value`)
pub fn parse_osascript_volume(output: &str) -> Result<f32, PlatformError> {
    let trimmed = output.trim();
    let percent: u8 = trimmed.parse().map_err(|_| PlatformError::Parse {
        output: trimmed.to_owned(),
    })?;
    Ok(f32::from(percent.min(100)) / 100.0)
}

/// Parse `wpctl get-volume` output such as `"Volume: 0.45 [MUTED]"`
///
/// Values above 1.0 (software boost) are clamped.
///
/// # Errors
/// Returns error if the output has no `Volume:` field
pub fn parse_wpctl_volume(output: &str) -> Result<f32, PlatformError> {
    let mut parts = output.split_whitespace();
    let volume = match (parts.next(), parts.next()) {
        (Some("Volume:"), Some(value)) => value.parse::<f32>().ok(),
        _ => None,
    };
    volume
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
        .ok_or_else(|| PlatformError::Parse {
            output: output.trim().to_owned(),
        })
}

/// Write waiting on the writer thread
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuedWrite {
    /// Target volume
    pub volume: f32,
    /// Delay before applying
    pub delay: Duration,
}

/// Start the thread that applies writes one at a time, in the order queued
///
/// The thread exits once every sender is dropped.
///
/// # Errors
/// Returns error if the thread cannot be spawned
pub fn spawn_writer<F>(
    mut apply: F,
) -> std::io::Result<(UnboundedSender<QueuedWrite>, JoinHandle<()>)>
where
    F: FnMut(f32) + Send + 'static,
{
    let (sender, mut receiver) = mpsc::unbounded_channel::<QueuedWrite>();
    let handle = thread::Builder::new()
        .name("volume-writer".to_owned())
        .spawn(move || {
            while let Some(write) = receiver.blocking_recv() {
                thread::sleep(write.delay);
                apply(write.volume);
            }
            debug!("volume writer stopped");
        })?;
    Ok((sender, handle))
}

/// Desktop platform: the default output device stands in for the hidden
/// volume control
///
/// Observation polls the backend and reports only numeric deltas, over the
/// channel returned by [`SystemPlatform::new`]. Desktop hosts have no
/// foreground or interruption notifications, so only
/// [`VolumeEvent::VolumeChanged`] is ever sent.
pub struct SystemPlatform {
    backend: Backend,
    poll_interval: Duration,
    events: UnboundedSender<VolumeEvent>,
    writes: Option<UnboundedSender<QueuedWrite>>,
    next_id: u64,
    observers: HashMap<u64, Arc<AtomicBool>>,
}

impl SystemPlatform {
    /// Create the platform and the receiving end of its event channel
    #[must_use]
    pub fn new(backend: Backend, poll_interval: Duration) -> (Self, UnboundedReceiver<VolumeEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let writes = match spawn_writer(move |volume| {
            if let Err(e) = backend.write_volume(volume) {
                warn!(error = %e, volume, "volume write failed");
            }
        }) {
            Ok((sender, _handle)) => Some(sender),
            Err(e) => {
                warn!(error = %e, "failed to spawn volume writer, writes disabled");
                None
            }
        };
        let platform = Self {
            backend,
            poll_interval,
            events,
            writes,
            next_id: 1,
            observers: HashMap::new(),
        };
        (platform, receiver)
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    #[allow(clippy::float_cmp)] // Notify on any exact delta, like the OS does
    fn poll(
        backend: Backend,
        interval: Duration,
        running: &AtomicBool,
        events: &UnboundedSender<VolumeEvent>,
    ) {
        let mut last = backend.read_volume().ok();
        while running.load(Ordering::Relaxed) {
            thread::sleep(interval);
            match backend.read_volume() {
                Ok(new) => {
                    if let Some(old) = last {
                        if old != new
                            && events.send(VolumeEvent::VolumeChanged { old, new }).is_err()
                        {
                            debug!("event receiver dropped, observer exiting");
                            return;
                        }
                    }
                    last = Some(new);
                }
                Err(e) => debug!(error = %e, "volume poll failed"),
            }
        }
        debug!("volume observer stopped");
    }
}

impl VolumePlatform for SystemPlatform {
    fn subscribe(&mut self) -> Subscription {
        let id = self.next_id();
        let running = Arc::new(AtomicBool::new(true));
        let backend = self.backend;
        let interval = self.poll_interval;
        let events = self.events.clone();
        let flag = Arc::clone(&running);

        let spawned = thread::Builder::new()
            .name(format!("volume-observer-{id}"))
            .spawn(move || Self::poll(backend, interval, &flag, &events));
        match spawned {
            Ok(_) => {
                info!(backend = ?backend, interval_ms = interval.as_millis(), "volume observer started");
                self.observers.insert(id, running);
            }
            Err(e) => warn!(error = %e, "failed to spawn volume observer"),
        }

        Subscription::new(id)
    }

    fn unsubscribe(&mut self, subscription: Subscription) {
        if let Some(running) = self.observers.remove(&subscription.id()) {
            running.store(false, Ordering::Relaxed);
        }
    }

    fn attach_control(&mut self) -> ControlHandle {
        let id = self.next_id();
        match self.backend.read_volume() {
            Ok(_) => ControlHandle::bound(id, self.backend.target().to_owned()),
            Err(e) => {
                warn!(error = %e, "output device not reachable, volume writes disabled");
                ControlHandle::unbound(id)
            }
        }
    }

    fn detach_control(&mut self, control: ControlHandle) {
        debug!(control = control.id(), "control detached");
    }

    fn activate_session(&mut self, category: SessionCategory) -> Result<(), PlatformError> {
        debug!(?category, backend = ?self.backend, "activating audio session");
        self.backend
            .read_volume()
            .map(|_| ())
            .map_err(|e| PlatformError::SessionActivation {
                reason: e.to_string(),
            })
    }

    fn current_volume(&self) -> Result<f32, PlatformError> {
        self.backend.read_volume()
    }

    fn schedule_volume_write(&mut self, control: &ControlHandle, volume: f32, delay: Duration) {
        if !control.is_bound() {
            return;
        }
        let Some(writes) = &self.writes else {
            debug!(volume, "no volume writer, skipping write");
            return;
        };
        if writes.send(QueuedWrite { volume, delay }).is_err() {
            warn!(volume, "volume writer exited, skipping write");
        }
    }

    fn quantize(&self, volume: f32) -> f32 {
        quantize_inward(volume, self.backend.resolution())
    }
}

impl Drop for SystemPlatform {
    fn drop(&mut self) {
        for running in self.observers.values() {
            running.store(false, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_osascript_volume() {
        assert!((parse_osascript_volume("42\n").unwrap() - 0.42).abs() < f32::EPSILON);
        assert!((parse_osascript_volume("100").unwrap() - 1.0).abs() < f32::EPSILON);
        assert!(parse_osascript_volume("0").unwrap().abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_osascript_missing_value() {
        let result = parse_osascript_volume("missing value\n");
        assert!(matches!(result, Err(PlatformError::Parse { output }) if output == "missing value"));
    }

    #[test]
    fn test_parse_wpctl_volume() {
        assert!((parse_wpctl_volume("Volume: 0.45\n").unwrap() - 0.45).abs() < f32::EPSILON);
        assert!((parse_wpctl_volume("Volume: 0.30 [MUTED]").unwrap() - 0.30).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_wpctl_volume_clamps_boost() {
        assert!((parse_wpctl_volume("Volume: 1.50").unwrap() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_wpctl_volume_garbage() {
        assert!(parse_wpctl_volume("").is_err());
        assert!(parse_wpctl_volume("Volume:").is_err());
        assert!(parse_wpctl_volume("Mute: yes").is_err());
        assert!(parse_wpctl_volume("Volume: NaN").is_err());
    }

    #[test]
    fn test_write_args() {
        assert_eq!(
            Backend::Wpctl.write_args(0.99999),
            vec!["set-volume", "@DEFAULT_AUDIO_SINK@", "0.99999"]
        );
        assert_eq!(
            Backend::Osascript.write_args(0.5),
            vec!["-e", "set volume output volume 50.000"]
        );
    }

    #[test]
    fn test_write_args_clamped() {
        assert_eq!(
            Backend::Wpctl.write_args(1.7),
            vec!["set-volume", "@DEFAULT_AUDIO_SINK@", "1.00000"]
        );
    }

    #[test]
    fn test_backend_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            backend: Backend,
        }
        let parsed: Wrapper = toml::from_str("backend = \"wpctl\"").unwrap();
        assert_eq!(parsed.backend, Backend::Wpctl);
        assert!(toml::from_str::<Wrapper>("backend = \"alsa\"").is_err());
    }

    #[test]
    fn test_unbound_control_skips_write() {
        let (mut platform, _rx) = SystemPlatform::new(Backend::Wpctl, Duration::from_millis(50));
        // Never spawns a writer, so no command runs
        platform.schedule_volume_write(&ControlHandle::unbound(1), 0.5, Duration::ZERO);
    }

    #[test]
    fn test_writer_keeps_queue_order() {
        let applied = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&applied);
        let (sender, handle) = spawn_writer(move |volume| sink.lock().unwrap().push(volume)).unwrap();

        // Longer delay first: a thread per write would apply 0.2 before 0.1
        sender
            .send(QueuedWrite {
                volume: 0.1,
                delay: Duration::from_millis(30),
            })
            .unwrap();
        sender
            .send(QueuedWrite {
                volume: 0.2,
                delay: Duration::ZERO,
            })
            .unwrap();
        drop(sender);
        handle.join().unwrap();

        assert_eq!(*applied.lock().unwrap(), vec![0.1, 0.2]);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_quantize_uses_backend_resolution() {
        let (platform, _rx) = SystemPlatform::new(Backend::Wpctl, Duration::from_millis(50));
        assert_eq!(platform.quantize(0.99999), 0.99);
        assert_eq!(platform.quantize(0.00001), 0.01);
        assert_eq!(platform.quantize(0.42), 0.42);
    }

    #[test]
    #[ignore = "requires wpctl and a running PipeWire session"]
    fn test_wpctl_read_volume() {
        let volume = Backend::Wpctl.read_volume().unwrap();
        assert!((0.0..=1.0).contains(&volume));
    }

    #[test]
    #[ignore = "requires macOS"]
    fn test_osascript_read_volume() {
        let volume = Backend::Osascript.read_volume().unwrap();
        assert!((0.0..=1.0).contains(&volume));
    }
}
