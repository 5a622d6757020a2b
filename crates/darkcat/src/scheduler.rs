//! Periodic task scheduler.
//!
//! Drives the indexer and the archive worker on fixed intervals from a
//! background thread, with manual trigger via broadcast channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

/// Runs a task immediately and then once per interval until stopped.
pub struct Scheduler {
    name: String,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    trigger_tx: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        let (trigger_tx, _) = broadcast::channel(16);
        Self {
            name: name.into(),
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            trigger_tx,
        }
    }

    /// Start the loop in a background thread.
    pub fn start<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Fn() + Send + 'static,
    {
        let name = self.name.clone();
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.interval;
        let mut trigger_rx = self.trigger_tx.subscribe();

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Scheduler '{}' could not start its runtime: {}", name, e);
                    return;
                }
            };

            rt.block_on(async {
                let mut interval_timer = tokio::time::interval(interval);
                // A slow run must not be followed by a burst of catch-up runs
                interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    tokio::select! {
                        _ = interval_timer.tick() => {},
                        Ok(()) = trigger_rx.recv() => {
                            log::info!("Manual run of '{}' triggered", name);
                        },
                    }

                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    log::debug!("Scheduler '{}' running task", name);
                    task();
                }

                log::info!("Scheduler '{}' stopped", name);
            });
        })
    }

    /// Requests an immediate run. Returns false if the loop is not running.
    pub fn trigger(&self) -> bool {
        self.trigger_tx.send(()).is_ok()
    }

    /// Signals the scheduler to stop and wakes it up. A task already running
    /// is allowed to finish.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.trigger_tx.send(());
    }
}
