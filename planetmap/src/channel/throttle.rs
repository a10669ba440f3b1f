//! Coalescing of rapid view changes.
//!
//! Panning and zooming produce bursts of requests. [`ThrottledChannel`]
//! latches the newest parameters and hands them to a [`Coalescer`], which
//! applies at most a leading and a trailing run per window on its own task.
//!
//! ```text
//! set_view ─┐
//! set_view ─┼─► latch ─► Coalescer ──(window)──► RequestSink::apply
//! set_view ─┘                          one task
//! ```

use super::tiled::TiledChannel;
use crate::config::ThrottleConfig;
use crate::geo::{Projection, Rect};
use crate::pipeline::Pipeline;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

// =============================================================================
// Coalescer
// =============================================================================

/// How a submission is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Run at the end of the current window, superseding any pending value.
    Deferred,
    /// Run now and open a new window, unless a run already happened within
    /// the current window; then run when it closes.
    Immediate,
}

enum Command<T> {
    Submit(T, RunMode),
    Clear,
}

/// Time-windowed coalescing executor.
///
/// Values submitted within one window collapse to the newest, applied when
/// the window closes. An `Immediate` submission runs at once only if nothing
/// ran during the last window; after any run a new window opens. A burst of
/// submissions shorter than the window therefore yields at most two runs: a
/// leading immediate one and the trailing one. The newest value is never
/// dropped.
pub struct Coalescer<T> {
    commands: mpsc::UnboundedSender<Command<T>>,
    pending: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl<T: Send + 'static> Coalescer<T> {
    /// Starts the coalescer task. Must be called within a Tokio runtime.
    pub fn new<F>(window: Duration, apply: F) -> Self
    where
        F: Fn(T) + Send + 'static,
    {
        let (commands, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();
        tokio::spawn(run_coalescer(
            rx,
            window,
            apply,
            Arc::clone(&pending),
            shutdown.clone(),
        ));
        Self {
            commands,
            pending,
            shutdown,
        }
    }

    pub fn submit(&self, value: T, mode: RunMode) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.commands.send(Command::Submit(value, mode)).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Whether submitted values are still waiting to be applied.
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) > 0
    }

    /// Discards any value waiting for the window to close.
    pub fn clear(&self) {
        let _ = self.commands.send(Command::Clear);
    }
}

impl<T> Drop for Coalescer<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Applies `value`, settling the submissions merged into it.
fn run<T>(apply: &impl Fn(T), value: T, merged: &mut usize, pending: &AtomicUsize) {
    apply(value);
    pending.fetch_sub(std::mem::take(merged), Ordering::AcqRel);
}

async fn run_coalescer<T, F>(
    mut commands: mpsc::UnboundedReceiver<Command<T>>,
    window: Duration,
    apply: F,
    pending: Arc<AtomicUsize>,
    shutdown: CancellationToken,
) where
    F: Fn(T),
{
    let mut latest: Option<T> = None;
    let mut merged = 0usize;
    let mut window_end: Option<Instant> = None;
    // End of the window opened by the last run.
    let mut hold_until: Option<Instant> = None;

    loop {
        let command = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => Some(command),
                None => break,
            },
            _ = sleep_until(window_end) => None,
        };

        match command {
            None => {
                window_end = None;
                if let Some(value) = latest.take() {
                    trace!(merged, "Coalescer window closed, running");
                    run(&apply, value, &mut merged, &pending);
                    let end = Instant::now() + window;
                    hold_until = Some(end);
                    window_end = Some(end);
                }
            }
            Some(Command::Submit(value, mode)) => {
                merged += 1;
                match mode {
                    RunMode::Immediate => match hold_until.filter(|end| Instant::now() < *end) {
                        Some(end) => {
                            trace!("Immediate run held until window closes");
                            latest = Some(value);
                            window_end = Some(end);
                        }
                        None => {
                            latest = None;
                            run(&apply, value, &mut merged, &pending);
                            let end = Instant::now() + window;
                            hold_until = Some(end);
                            window_end = Some(end);
                        }
                    },
                    RunMode::Deferred => {
                        latest = Some(value);
                        window_end.get_or_insert_with(|| Instant::now() + window);
                    }
                }
            }
            Some(Command::Clear) => {
                if latest.take().is_some() {
                    pending.fetch_sub(std::mem::take(&mut merged), Ordering::AcqRel);
                }
            }
        }
    }
    debug!("Coalescer stopped");
}

// =============================================================================
// Throttled channel
// =============================================================================

/// View parameters applied together.
#[derive(Debug, Clone)]
pub struct ViewParams {
    pub projection: Projection,
    pub extent: Rect,
    pub ppd: f64,
    pub pipelines: Vec<Pipeline>,
}

/// Receiver of coalesced view parameters.
pub trait RequestSink: Send + Sync + 'static {
    fn apply(&self, params: &ViewParams);

    fn is_finished(&self) -> bool;

    fn cancel(&self);
}

impl RequestSink for TiledChannel {
    fn apply(&self, params: &ViewParams) {
        if let Err(e) = self.set_request(params.projection, params.extent, params.ppd, &params.pipelines) {
            warn!(error = %e, "View request rejected");
        }
    }

    fn is_finished(&self) -> bool {
        TiledChannel::is_finished(self)
    }

    fn cancel(&self) {
        TiledChannel::cancel(self)
    }
}

#[derive(Default)]
struct Latched {
    view: Option<(Projection, Rect, f64)>,
    pipelines: Vec<Pipeline>,
}

impl Latched {
    fn params(&self) -> Option<ViewParams> {
        let (projection, extent, ppd) = self.view?;
        Some(ViewParams {
            projection,
            extent,
            ppd,
            pipelines: self.pipelines.clone(),
        })
    }
}

/// Debounces view changes in front of a [`RequestSink`].
///
/// Setters latch their parameters and schedule a run; nothing is submitted
/// until a view has been set.
pub struct ThrottledChannel<S: RequestSink = TiledChannel> {
    sink: Arc<S>,
    latched: Mutex<Latched>,
    coalescer: Coalescer<ViewParams>,
}

impl<S: RequestSink> ThrottledChannel<S> {
    /// Must be called within a Tokio runtime.
    pub fn new(sink: Arc<S>, config: &ThrottleConfig) -> Self {
        let target = Arc::clone(&sink);
        let coalescer = Coalescer::new(config.window(), move |params: ViewParams| {
            debug!(extent = %params.extent, ppd = params.ppd, "Applying view");
            target.apply(&params);
        });
        Self {
            sink,
            latched: Mutex::new(Latched::default()),
            coalescer,
        }
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    pub fn set_request(
        &self,
        projection: Projection,
        extent: Rect,
        ppd: f64,
        pipelines: Vec<Pipeline>,
        mode: RunMode,
    ) {
        let mut latched = self.latched.lock();
        latched.view = Some((projection, extent, ppd));
        latched.pipelines = pipelines;
        self.schedule(&latched, mode);
    }

    /// Changes the view, keeping the pipelines.
    pub fn set_view(&self, projection: Projection, extent: Rect, ppd: f64, mode: RunMode) {
        let mut latched = self.latched.lock();
        latched.view = Some((projection, extent, ppd));
        self.schedule(&latched, mode);
    }

    /// Changes the pipelines, keeping the view.
    pub fn set_pipelines(&self, pipelines: Vec<Pipeline>, mode: RunMode) {
        let mut latched = self.latched.lock();
        latched.pipelines = pipelines;
        self.schedule(&latched, mode);
    }

    /// Applies the latched parameters now.
    pub fn flush(&self) {
        let latched = self.latched.lock();
        self.schedule(&latched, RunMode::Immediate);
    }

    /// Drops any deferred run and cancels the sink's work.
    pub fn cancel(&self) {
        self.coalescer.clear();
        self.sink.cancel();
    }

    /// Whether the sink is finished and no deferred run is pending.
    pub fn is_finished(&self) -> bool {
        !self.coalescer.has_pending() && self.sink.is_finished()
    }

    fn schedule(&self, latched: &Latched, mode: RunMode) {
        if let Some(params) = latched.params() {
            self.coalescer.submit(params, mode);
        }
    }
}
