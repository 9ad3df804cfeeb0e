//! Keychord daemon entry point.
//!
//! Wires the pieces together: settings, config resolution, the dual capture
//! pair with its health monitor, the activation hotkey, the stdin command
//! listener, and the config directory watcher. All inputs are funneled into
//! one event loop; the capture callback only forwards and never blocks.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use keychord::cache::TreeCacheConfig;
use keychord::capture::{create_dual_capture, CaptureMonitor};
use keychord::commands::{self, ExternalCommand};
use keychord::config::{self, Settings};
use keychord::dispatcher::KeyDispatcher;
use keychord::event::RawKeyEvent;
use keychord::executor::SystemExecutor;
use keychord::hotkey;
use keychord::logging;
use keychord::presentation::{LoggingPresentation, Presentation};
use keychord::resolver::{ConfigResolver, ContextId};
use keychord::watcher::{ConfigReloadEvent, ConfigWatcher};

enum AppEvent {
    HotkeyPressed,
    Key(RawKeyEvent),
    Command(ExternalCommand),
    ConfigChanged,
}

fn main() {
    let _logging_guard = logging::init();

    let settings = config::load_settings();
    let config_dir = settings.config_dir();
    info!(
        config_dir = %config_dir.display(),
        hotkey = %settings.hotkey.display(),
        "Starting keychord"
    );

    let presentation: Arc<dyn Presentation> = Arc::new(LoggingPresentation);
    let resolver = Arc::new(ConfigResolver::new(
        config_dir.clone(),
        tree_cache_config(&settings),
        Arc::clone(&presentation),
    ));
    let dispatcher = KeyDispatcher::new(
        &settings,
        Arc::clone(&resolver),
        presentation,
        Arc::new(SystemExecutor),
        Box::new(|| ContextId::Global),
    );

    let (events_tx, events_rx) = async_channel::bounded::<AppEvent>(256);

    // Capture callback path: forward and return. A full queue drops the
    // event rather than blocking inside the tap.
    let key_tx = events_tx.clone();
    let capture = match create_dual_capture(
        Arc::new(move |raw: RawKeyEvent| {
            if key_tx.try_send(AppEvent::Key(raw)).is_err() {
                warn!("Event queue full, key dropped");
            }
        }),
        config::DEFAULT_RECOVERY_MAX_ATTEMPTS,
        Duration::from_millis(config::DEFAULT_RECOVERY_BASE_DELAY_MS),
    ) {
        Ok(capture) => {
            dispatcher.attach_capture(Arc::clone(&capture));
            Some(capture)
        }
        Err(e) => {
            warn!(error = %e, "Keyboard capture unavailable, running with hotkey and stdin only");
            None
        }
    };
    let _monitor = capture.as_ref().map(|c| {
        CaptureMonitor::spawn(
            Arc::clone(c),
            Duration::from_millis(settings.health_check_interval_ms),
        )
    });

    let hotkey_rx = hotkey::start_hotkey_listener(settings.hotkey.clone());
    let hotkey_tx = events_tx.clone();
    std::thread::spawn(move || {
        while hotkey_rx.recv_blocking().is_ok() {
            if hotkey_tx.send_blocking(AppEvent::HotkeyPressed).is_err() {
                break;
            }
        }
    });

    let command_rx = commands::start_stdin_listener();
    let command_tx = events_tx.clone();
    std::thread::spawn(move || {
        while let Ok(cmd) = command_rx.recv_blocking() {
            if command_tx.send_blocking(AppEvent::Command(cmd)).is_err() {
                break;
            }
        }
    });

    let (mut config_watcher, reload_rx) = ConfigWatcher::new(config_dir);
    if let Err(e) = config_watcher.start() {
        warn!(error = %e, "Config watcher unavailable, live reload disabled");
    }
    let reload_tx = events_tx;
    std::thread::spawn(move || {
        while let Ok(ConfigReloadEvent::Reload) = reload_rx.recv() {
            if reload_tx.send_blocking(AppEvent::ConfigChanged).is_err() {
                break;
            }
        }
    });

    while let Ok(event) = events_rx.recv_blocking() {
        match event {
            AppEvent::HotkeyPressed => dispatcher.toggle(),
            AppEvent::Key(raw) => {
                dispatcher.handle_key_event(&raw);
            }
            AppEvent::Command(cmd) => dispatcher.handle_command(cmd),
            AppEvent::ConfigChanged => {
                info!("Config changed on disk, reloading");
                dispatcher.reload();
            }
        }
    }
}

fn tree_cache_config(settings: &Settings) -> TreeCacheConfig {
    TreeCacheConfig {
        ttl: Duration::from_secs(settings.tree_cache_ttl_secs),
        max_entries: settings.tree_cache_max_entries,
        max_cost: settings.tree_cache_max_cost,
    }
}
