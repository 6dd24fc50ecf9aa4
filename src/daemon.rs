//! Auto-sync daemon - runs `sync` on a fixed interval
//!
//! Each tick re-reads the configuration file, so enabling or disabling
//! auto-sync or changing settings takes effect without a restart. A tick that
//! finds the engine busy is skipped, never queued.

use crate::config::Config;
use crate::history::SyncHistory;
use crate::result::{SyncOperation, SyncResult};
use crate::sync::SyncEngine;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Daemon statistics and status
#[derive(Debug, Clone, Default)]
pub struct DaemonStatus {
    pub is_running: bool,
    pub uptime: Duration,
    pub last_sync: Option<Instant>,
    pub total_syncs: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub skipped_ticks: u64,
}

#[derive(Debug, Default)]
struct Stats {
    last_sync: Option<Instant>,
    total_syncs: u64,
    successful_syncs: u64,
    failed_syncs: u64,
    skipped_ticks: u64,
}

/// Periodic sync driver around a shared engine
pub struct AutoSync {
    engine: Arc<SyncEngine>,
    config_path: Option<PathBuf>,
    history: Option<Mutex<SyncHistory>>,
    shutdown_sender: broadcast::Sender<()>,
    is_running: Arc<AtomicBool>,
    stats: Mutex<Stats>,
    started_at: Instant,
}

impl AutoSync {
    /// Create a daemon. With a config path, the file is reloaded on every tick.
    pub fn new(engine: Arc<SyncEngine>, config_path: Option<PathBuf>) -> Self {
        let (shutdown_sender, _) = broadcast::channel(1);
        Self {
            engine,
            config_path,
            history: None,
            shutdown_sender,
            is_running: Arc::new(AtomicBool::new(false)),
            stats: Mutex::new(Stats::default()),
            started_at: Instant::now(),
        }
    }

    /// Record every tick's result in the given history database
    pub fn with_history(mut self, history: SyncHistory) -> Self {
        self.history = Some(Mutex::new(history));
        self
    }

    /// Sender that stops the loop when a message is sent
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_sender.clone()
    }

    /// Run in the foreground until Ctrl+C or a shutdown message
    pub async fn run(&self) -> Result<()> {
        info!("Starting auto-sync");
        self.is_running.store(true, Ordering::SeqCst);

        let shutdown_receiver = self.shutdown_sender.subscribe();
        let shutdown_sender = self.shutdown_sender.clone();
        let signal_task = tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            info!("Shutdown signal received, stopping auto-sync...");
            let _ = shutdown_sender.send(());
        });

        self.daemon_loop(shutdown_receiver).await;

        signal_task.abort();
        self.is_running.store(false, Ordering::SeqCst);
        info!("Auto-sync stopped");
        Ok(())
    }

    async fn daemon_loop(&self, mut shutdown_receiver: broadcast::Receiver<()>) {
        let mut period = sync_period(&self.engine.config());
        let mut timer = interval_at(tokio::time::Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Auto-sync loop started with interval: {:?}", period);

        loop {
            tokio::select! {
                _ = shutdown_receiver.recv() => {
                    info!("Shutdown signal received in auto-sync loop");
                    break;
                }

                _ = timer.tick() => {
                    if let Some(result) = self.tick().await {
                        if result.success {
                            info!("Scheduled sync: {}", result);
                        } else {
                            error!("Scheduled sync failed: {}", result.message);
                        }
                    }

                    let next = sync_period(&self.engine.config());
                    if next != period {
                        info!("Auto-sync interval changed to {:?}", next);
                        period = next;
                        timer = interval_at(tokio::time::Instant::now() + period, period);
                        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    }
                }
            }
        }
    }

    /// One scheduled invocation.
    ///
    /// Returns `None` when the tick was skipped: auto-sync disabled or an
    /// operation already in flight.
    pub async fn tick(&self) -> Option<SyncResult> {
        self.reload_config();

        if !self.engine.config().sync.auto_sync {
            debug!("Auto-sync disabled, skipping tick");
            self.note_skip();
            return None;
        }

        if self.engine.is_syncing() {
            debug!("Sync already in progress, skipping tick");
            self.note_skip();
            return None;
        }

        let result = self.engine.sync().await;
        if result.is_busy() {
            self.note_skip();
            return None;
        }

        self.note_result(&result);
        Some(result)
    }

    /// Current daemon status
    pub fn status(&self) -> DaemonStatus {
        let is_running = self.is_running.load(Ordering::SeqCst);
        let stats = match self.stats.lock() {
            Ok(stats) => stats,
            Err(poisoned) => poisoned.into_inner(),
        };

        DaemonStatus {
            is_running,
            uptime: self.started_at.elapsed(),
            last_sync: stats.last_sync,
            total_syncs: stats.total_syncs,
            successful_syncs: stats.successful_syncs,
            failed_syncs: stats.failed_syncs,
            skipped_ticks: stats.skipped_ticks,
        }
    }

    fn reload_config(&self) {
        let Some(path) = &self.config_path else {
            return;
        };

        match Config::load(path) {
            Ok(config) => {
                if *self.engine.config() != config {
                    info!("Configuration changed, applying before next sync");
                    self.engine.update_config(config);
                }
            }
            Err(e) => warn!("Keeping previous configuration: {:#}", e),
        }
    }

    fn note_skip(&self) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.skipped_ticks += 1;
        }
    }

    fn note_result(&self, result: &SyncResult) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.last_sync = Some(Instant::now());
            stats.total_syncs += 1;
            if result.success {
                stats.successful_syncs += 1;
            } else {
                stats.failed_syncs += 1;
            }
        }

        if let Some(history) = &self.history {
            match history.lock() {
                Ok(history) => {
                    if let Err(e) = history.record(SyncOperation::Sync, result) {
                        warn!("Failed to record sync history: {:#}", e);
                    }
                }
                Err(_) => warn!("History database unavailable"),
            }
        }
    }
}

fn sync_period(config: &Config) -> Duration {
    Duration::from_secs(config.sync.interval_minutes.max(1) * 60)
}

/// Wait for Ctrl+C
async fn wait_for_shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    debug!("Ctrl+C received");
}
