//! Cooperative abort of in-flight fetches.
//!
//! Each fetch attempt registers its owner's cancellation token together with
//! a connection token that the fetch itself waits on. A single background
//! task, started on first use, scans the table at a fixed interval and
//! cancels the connection of every entry whose owner has been cancelled.
//! Dropping the attempt's [`WatchGuard`] removes its entry.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Default scan interval of the watcher task.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_millis(100);

struct WatchEntry {
    owner: CancellationToken,
    connection: CancellationToken,
}

type WatchTable = DashMap<u64, WatchEntry>;

/// Shared table of in-flight fetches plus its lazily started scanner.
pub struct FetchWatcher {
    table: Arc<WatchTable>,
    next_id: AtomicU64,
    started: AtomicBool,
    interval: Duration,
    shutdown: CancellationToken,
}

impl FetchWatcher {
    pub fn new(interval: Duration) -> Self {
        Self {
            table: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            started: AtomicBool::new(false),
            interval,
            shutdown: CancellationToken::new(),
        }
    }

    /// Registers a fetch owned by `owner`.
    ///
    /// Must be called from within a Tokio runtime: the first call spawns the
    /// scanner task.
    pub fn watch(&self, owner: CancellationToken) -> WatchGuard {
        self.ensure_started();

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let connection = CancellationToken::new();
        self.table.insert(
            id,
            WatchEntry {
                owner,
                connection: connection.clone(),
            },
        );
        trace!(id, "Fetch registered with watcher");

        WatchGuard {
            id,
            table: Arc::clone(&self.table),
            connection,
        }
    }

    /// Number of fetches currently registered.
    pub fn in_flight(&self) -> usize {
        self.table.len()
    }

    fn ensure_started(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(interval_ms = self.interval.as_millis() as u64, "Starting fetch watcher");
        tokio::spawn(run_scanner(
            Arc::clone(&self.table),
            self.interval,
            self.shutdown.clone(),
        ));
    }
}

impl Default for FetchWatcher {
    fn default() -> Self {
        Self::new(DEFAULT_WATCH_INTERVAL)
    }
}

impl Drop for FetchWatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_scanner(table: Arc<WatchTable>, period: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        for entry in table.iter() {
            if entry.owner.is_cancelled() && !entry.connection.is_cancelled() {
                debug!(id = *entry.key(), "Aborting fetch of cancelled owner");
                entry.connection.cancel();
            }
        }
    }
    debug!("Fetch watcher stopped");
}

/// Registration of one in-flight fetch; removes itself on drop.
pub struct WatchGuard {
    id: u64,
    table: Arc<WatchTable>,
    connection: CancellationToken,
}

impl WatchGuard {
    /// Token cancelled by the watcher once the owner is cancelled.
    pub fn connection(&self) -> &CancellationToken {
        &self.connection
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_owner_aborts_connection() {
        let watcher = FetchWatcher::new(Duration::from_millis(100));
        let owner = CancellationToken::new();
        let guard = watcher.watch(owner.clone());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!guard.connection().is_cancelled());

        owner.cancel();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(guard.connection().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_entries_untouched() {
        let watcher = FetchWatcher::default();
        let cancelled = CancellationToken::new();
        let live = CancellationToken::new();
        let a = watcher.watch(cancelled.clone());
        let b = watcher.watch(live);

        cancelled.cancel();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(a.connection().is_cancelled());
        assert!(!b.connection().is_cancelled());
    }

    #[tokio::test]
    async fn test_guard_drop_removes_entry() {
        let watcher = FetchWatcher::default();
        let guard = watcher.watch(CancellationToken::new());
        assert_eq!(watcher.in_flight(), 1);
        drop(guard);
        assert_eq!(watcher.in_flight(), 0);
    }
}
