use anyhow::Result;
use volume_watcher::config::Config;
use volume_watcher::{telemetry, SystemPlatform, VolumeWatcher};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    println!("✓ Config loaded from ~/.volume-watcher.toml");

    telemetry::init(config.telemetry.enabled, &config.telemetry.log_path)?;
    tracing::info!("volume-watcher starting");

    let settings = config.watcher_settings()?;
    let (platform, mut events) =
        SystemPlatform::new(config.platform.backend, config.poll_interval());

    let mut watcher = VolumeWatcher::new(platform, settings);
    watcher.set_on_press(|press| {
        tracing::info!(
            direction = ?press.direction,
            old = press.old,
            new = press.new,
            "press detected"
        );
    });
    println!(
        "✓ Watching {:?} output volume (parked between {} and {})",
        config.platform.backend,
        settings.min_volume(),
        settings.max_volume()
    );
    println!("Press Ctrl+C to exit.\n");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => watcher.handle_event(event),
                None => {
                    tracing::warn!("platform event channel closed");
                    break;
                }
            },
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received");
                println!("\nShutting down...");
                break;
            }
        }
    }

    tracing::info!(presses = watcher.press_count(), "volume-watcher exiting");
    watcher.stop();
    Ok(())
}
