//! Core functionality for actual scanning behaviour.
//!
//! [`Scanner`] owns one scan invocation end to end: it validates the target
//! and the port set, dispatches one connect probe per port with a hard cap on
//! the number in flight, folds every outcome into a shared [`ScanState`] and
//! returns the open ports in ascending order.
use crate::address::ScanTarget;
use crate::error::ScanError;
use crate::input::ScanOrder;
use crate::port_strategy::{PortSet, PortStrategy};
use log::{debug, error};

mod probe;
mod state;

pub use probe::{CloseReason, ProbeOutcome, ScannerConnector};
pub use state::{Progress, ScanState, StateSnapshot};

use futures::{future, stream, StreamExt};
use hickory_resolver::TokioAsyncResolver;
use std::{
    collections::HashSet,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Default number of probes in flight.
pub const DEFAULT_CONCURRENCY: usize = 100;

/// Default per-probe timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Default number of completions between progress reports.
pub const DEFAULT_PROGRESS_EVERY: u64 = 100;

/// Distinct probe error reasons kept for the debug log.
const MAX_ERROR_SAMPLES: usize = 100;

/// Callback that receives progress snapshots while a scan runs.
pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// Shared flag used to interrupt a running scan.
///
/// Cancelling stops the submission of new probes; probes already in flight
/// finish or time out on their own.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Immutable summary of a completed scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub target: ScanTarget,
    /// Human-readable port set, e.g. `1-1000`.
    pub ports: String,
    /// Open ports in ascending order.
    pub open: Vec<u16>,
    pub elapsed: Duration,
    /// Number of probes run.
    pub total: u64,
    /// Probes that failed for local reasons rather than a network answer.
    pub errors: u64,
    /// Highest number of probes that were in flight together.
    pub peak_in_flight: u64,
}

/// The coordinator for one or more sequential scans.
///
/// `concurrency` is the maximum number of connect attempts in flight and
/// `timeout` bounds each attempt individually. Each call to
/// [`scan`](Self::scan) starts from a fresh [`ScanState`].
pub struct Scanner {
    concurrency: usize,
    order: ScanOrder,
    progress_every: u64,
    connector: Arc<ScannerConnector>,
    resolver: TokioAsyncResolver,
    cancel: CancelToken,
    on_progress: Option<ProgressFn>,
}

impl fmt::Debug for Scanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scanner")
            .field("concurrency", &self.concurrency)
            .field("order", &self.order)
            .field("progress_every", &self.progress_every)
            .field("connector", &self.connector)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl Scanner {
    /// A zero `concurrency` is corrected to one.
    pub fn new(
        resolver: TokioAsyncResolver,
        concurrency: usize,
        timeout: Duration,
        order: ScanOrder,
    ) -> Self {
        Self {
            concurrency: concurrency.max(1),
            order,
            progress_every: DEFAULT_PROGRESS_EVERY,
            connector: Arc::new(ScannerConnector::new(timeout)),
            resolver,
            cancel: CancelToken::new(),
            on_progress: None,
        }
    }

    #[must_use]
    pub fn with_progress_every(mut self, every: u64) -> Self {
        self.progress_every = every.max(1);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: ProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that interrupts scans run by this scanner.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Checks that `target` is an IP literal or a resolvable name.
    pub async fn validate_target(&self, target: &str) -> Result<ScanTarget, ScanError> {
        ScanTarget::resolve(target, &self.resolver).await
    }

    /// Validates `target`, then scans `ports`.
    pub async fn scan(&self, target: &str, ports: &PortSet) -> Result<ScanRecord, ScanError> {
        let target = self.validate_target(target).await?;
        self.run(&target, ports).await
    }

    /// Validates `target`, then the bounds `start..=end`, then scans.
    pub async fn scan_range(
        &self,
        target: &str,
        start: u32,
        end: u32,
    ) -> Result<ScanRecord, ScanError> {
        let target = self.validate_target(target).await?;
        let ports = PortSet::range(start, end)?;
        self.run(&target, &ports).await
    }

    /// Scans an already validated target.
    ///
    /// Probes are spawned lazily from a buffered stream, so no more than
    /// `concurrency` of them exist at any time regardless of the set size.
    pub async fn run(&self, target: &ScanTarget, ports: &PortSet) -> Result<ScanRecord, ScanError> {
        if ports.is_empty() {
            return Err(ScanError::EmptyPortList);
        }

        let order = PortStrategy::pick(ports, self.order).order();
        let total = u64::try_from(order.len()).unwrap_or(u64::MAX);
        let state = Arc::new(ScanState::new(total, self.progress_every));

        debug!(
            "Start scanning {}.\nConcurrency {}\nTimeout {:?}\nNumber of ports {}",
            target,
            self.concurrency,
            self.connector.timeout(),
            total
        );

        let started = Instant::now();
        let cancel = self.cancel.clone();
        let mut probes = stream::iter(order)
            .take_while(move |_| future::ready(!cancel.is_cancelled()))
            .map(|port| {
                let socket = target.socket(port);
                let connector = Arc::clone(&self.connector);
                let state = Arc::clone(&state);
                let on_progress = self.on_progress.clone();
                state.begin();
                let handle = tokio::spawn(async move {
                    let outcome = connector.probe(socket).await;
                    let progress = state.record(port, &outcome);
                    if let (Some(progress), Some(report)) = (progress, on_progress) {
                        report(progress);
                    }
                    outcome
                });
                async move { (port, handle.await) }
            })
            .buffer_unordered(self.concurrency);

        let mut errors: HashSet<String> = HashSet::new();
        while let Some((port, joined)) = probes.next().await {
            match joined {
                Ok(ProbeOutcome::Error(reason)) => {
                    if errors.len() < MAX_ERROR_SAMPLES {
                        errors.insert(reason);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    // The task died before it could record itself.
                    error!("Probe task for port {port} failed: {e}");
                    let outcome = ProbeOutcome::Error(e.to_string());
                    if let (Some(progress), Some(report)) =
                        (state.record(port, &outcome), &self.on_progress)
                    {
                        report(progress);
                    }
                }
            }
        }
        drop(probes);

        let elapsed = started.elapsed();
        let progress = state.progress();
        let snapshot = state.snapshot();

        debug!("Typical probe errors {errors:?}");
        debug!(
            "{} open, {} closed, {} errors, at most {} probes in flight",
            snapshot.open.len(),
            snapshot.closed,
            snapshot.errors,
            snapshot.peak_in_flight
        );
        debug!("Open ports found: {:?}", &snapshot.open);

        if self.cancel.is_cancelled() && !progress.is_finished() {
            return Err(ScanError::Cancelled {
                completed: snapshot.completed,
                total: snapshot.total,
                open: snapshot.open,
            });
        }

        Ok(ScanRecord {
            target: target.clone(),
            ports: ports.descriptor(),
            open: snapshot.open,
            elapsed,
            total: snapshot.total,
            errors: snapshot.errors,
            peak_in_flight: snapshot.peak_in_flight,
        })
    }
}
