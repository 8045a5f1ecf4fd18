//! Mock directory watcher.
//!
//! Watches the mock directory with notify and reloads the registry after a
//! quiet period, so an editor save burst produces a single reload.

use std::pin::Pin;
use std::sync::Arc;

use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Duration, Sleep};
use tracing::{debug, info, warn};

use super::registry::{is_mock_file, MockRegistry};
use super::server::Shutdown;

pub fn start_mock_watcher(
    registry: Arc<MockRegistry>,
    debounce_window: Duration,
    mut shutdown_rx: broadcast::Receiver<Shutdown>,
) -> Result<(), String> {
    let root = registry.root().to_path_buf();
    debug!(dir = %root.display(), "Starting mock watcher.");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |result| {
        let _ = tx.send(result);
    })
    .map_err(|err| format!("Failed to create file watcher: {err}"))?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|err| format!("Failed to watch {}: {err}", root.display()))?;

    tokio::spawn(async move {
        // Keep the watcher alive for the lifetime of the task.
        let _watcher = watcher;
        let mut pending = false;
        let mut debounce: Option<Pin<Box<Sleep>>> = None;

        loop {
            tokio::select! {
                biased;

                result = shutdown_rx.recv() => {
                    match result {
                        Ok(Shutdown::Stop) | Err(_) => {
                            debug!("Mock watcher stopping.");
                            break;
                        }
                    }
                }

                maybe = rx.recv() => {
                    let Some(result) = maybe else {
                        debug!("Mock watcher channel closed.");
                        break;
                    };
                    match result {
                        Ok(event) => {
                            if !is_reload_event(&event) {
                                continue;
                            }
                            if !pending {
                                debug!("Mock change detected.");
                            }
                            pending = true;
                            debounce = Some(Box::pin(tokio::time::sleep(debounce_window)));
                        }
                        Err(err) => {
                            warn!("Mock watcher error: {err}");
                        }
                    }
                }

                _ = async {
                    if let Some(timer) = debounce.as_mut() {
                        timer.await;
                    }
                }, if debounce.is_some() => {
                    debounce = None;
                    if pending {
                        pending = false;
                        let summary = registry.reload().await;
                        info!(
                            files = summary.files,
                            entries = summary.entries,
                            failed = summary.failed,
                            "Mocks reloaded."
                        );
                    }
                }
            }
        }
    });

    Ok(())
}

/// Only creations, modifications and removals of `*.mock.json` files
/// warrant a reload.
fn is_reload_event(event: &notify::Event) -> bool {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return false;
    }
    event.paths.iter().any(|path| is_mock_file(path))
}
