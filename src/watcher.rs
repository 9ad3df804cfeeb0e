//! Config directory watching for live reload.
//!
//! Watches the keychord config directory and emits a debounced reload event
//! when any config or settings file changes. Edits usually arrive in bursts
//! (editor save, atomic rename), so changes within the debounce window are
//! collapsed into one event.

use notify::{recommended_watcher, RecursiveMode, Result as NotifyResult, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const DEBOUNCE: Duration = Duration::from_millis(500);
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub enum ConfigReloadEvent {
    Reload,
}

/// Is this a file the resolver or settings loader reads?
fn is_watched_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name == "settings.json" {
        return true;
    }
    // Tree documents plus the display-name side files next to them.
    name.starts_with("config") && (name.ends_with(".json") || name.ends_with(".name"))
}

fn is_relevant(event: &notify::Event) -> bool {
    let kind_matters = matches!(
        event.kind,
        notify::EventKind::Create(_) | notify::EventKind::Modify(_) | notify::EventKind::Remove(_)
    );
    kind_matters && event.paths.iter().any(|p| is_watched_file(p))
}

/// Watches the config directory and emits reload events
pub struct ConfigWatcher {
    dir: PathBuf,
    tx: Option<Sender<ConfigReloadEvent>>,
    shutdown: Arc<AtomicBool>,
    watcher_thread: Option<thread::JoinHandle<()>>,
}

impl ConfigWatcher {
    /// Returns the watcher plus the receiver that will carry reload events.
    pub fn new(dir: PathBuf) -> (Self, Receiver<ConfigReloadEvent>) {
        let (tx, rx) = channel();
        let watcher = ConfigWatcher {
            dir,
            tx: Some(tx),
            shutdown: Arc::new(AtomicBool::new(false)),
            watcher_thread: None,
        };
        (watcher, rx)
    }

    /// Spawn the background watch thread. Can only be started once.
    pub fn start(&mut self) -> NotifyResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| std::io::Error::other("watcher already started"))?;
        let dir = self.dir.clone();
        let shutdown = Arc::clone(&self.shutdown);

        let thread_handle = thread::spawn(move || {
            if let Err(e) = Self::watch_loop(dir, tx, shutdown) {
                warn!(error = %e, watcher = "config", "Config watcher error");
            }
        });

        self.watcher_thread = Some(thread_handle);
        Ok(())
    }

    fn watch_loop(
        dir: PathBuf,
        tx: Sender<ConfigReloadEvent>,
        shutdown: Arc<AtomicBool>,
    ) -> NotifyResult<()> {
        let debounce_active = Arc::new(Mutex::new(false));

        let (watch_tx, watch_rx) = channel();
        let mut watcher: Box<dyn Watcher> = Box::new(recommended_watcher(
            move |res: notify::Result<notify::Event>| {
                let _ = watch_tx.send(res);
            },
        )?);
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        info!(path = %dir.display(), "Config watcher started");

        // recv_timeout so the loop notices the shutdown flag; the notify
        // watcher holds watch_tx, so a plain recv() would block forever.
        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!(watcher = "config", "Config watcher shutting down");
                break;
            }
            match watch_rx.recv_timeout(SHUTDOWN_POLL) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(Ok(event)) => {
                    if !is_relevant(&event) {
                        continue;
                    }

                    let mut debounce = debounce_active.lock().unwrap();
                    if *debounce {
                        continue;
                    }
                    *debounce = true;
                    drop(debounce);

                    let tx_clone = tx.clone();
                    let debounce_flag = Arc::clone(&debounce_active);
                    thread::spawn(move || {
                        thread::sleep(DEBOUNCE);
                        let _ = tx_clone.send(ConfigReloadEvent::Reload);
                        *debounce_flag.lock().unwrap() = false;
                        info!("Config files changed, emitting reload event");
                    });
                }
                Ok(Err(e)) => {
                    warn!(error = %e, watcher = "config", "File watcher error");
                }
                Err(RecvTimeoutError::Disconnected) => {
                    info!(watcher = "config", "Config watcher shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.watcher_thread.take() {
            let _ = handle.join();
        }
    }
}
