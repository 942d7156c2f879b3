//! Shared aggregate of one scan invocation.
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::probe::ProbeOutcome;

/// How far a scan has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: u64,
    pub total: u64,
}

impl Progress {
    /// Completion in percent. An empty scan counts as finished.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed as f64 / self.total as f64 * 100.0
    }

    pub const fn is_finished(&self) -> bool {
        self.completed >= self.total
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}% ({}/{})",
            self.percent(),
            self.completed,
            self.total
        )
    }
}

#[derive(Debug, Default)]
struct Tally {
    open: Vec<u16>,
    completed: u64,
    closed: u64,
    errors: u64,
    in_flight: u64,
    peak_in_flight: u64,
}

/// Final counts taken from a [`ScanState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    /// Open ports, ascending.
    pub open: Vec<u16>,
    pub completed: u64,
    pub closed: u64,
    pub errors: u64,
    pub total: u64,
    /// Highest number of probes that were running at the same time.
    pub peak_in_flight: u64,
}

/// Open ports and counters shared by every probe of one scan.
///
/// One lock covers the open list and all counters, so a progress snapshot
/// can never disagree with the open list it was taken alongside.
#[derive(Debug)]
pub struct ScanState {
    total: u64,
    cadence: u64,
    tally: Mutex<Tally>,
}

impl ScanState {
    /// A fresh state for `total` probes, reporting progress every
    /// `cadence` completions. A cadence of zero is treated as one.
    pub fn new(total: u64, cadence: u64) -> Self {
        Self {
            total,
            cadence: cadence.max(1),
            tally: Mutex::new(Tally::default()),
        }
    }

    pub const fn total(&self) -> u64 {
        self.total
    }

    fn lock(&self) -> MutexGuard<'_, Tally> {
        self.tally.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks a probe as started. Every call is balanced by [`record`](Self::record).
    pub fn begin(&self) {
        let mut tally = self.lock();
        tally.in_flight += 1;
        tally.peak_in_flight = tally.peak_in_flight.max(tally.in_flight);
    }

    /// Applies one probe outcome for `port`.
    ///
    /// Returns a progress snapshot when this completion lands on the cadence
    /// or finishes the scan. The lock is released before the caller sees it.
    pub fn record(&self, port: u16, outcome: &ProbeOutcome) -> Option<Progress> {
        let mut tally = self.lock();
        match outcome {
            ProbeOutcome::Open => tally.open.push(port),
            ProbeOutcome::Closed(_) => tally.closed += 1,
            ProbeOutcome::Error(_) => tally.errors += 1,
        }
        if tally.completed < self.total {
            tally.completed += 1;
        }
        tally.in_flight = tally.in_flight.saturating_sub(1);

        let completed = tally.completed;
        drop(tally);

        (completed % self.cadence == 0 || completed == self.total).then_some(Progress {
            completed,
            total: self.total,
        })
    }

    pub fn progress(&self) -> Progress {
        Progress {
            completed: self.lock().completed,
            total: self.total,
        }
    }

    /// Copies the current contents with the open list sorted ascending.
    pub fn snapshot(&self) -> StateSnapshot {
        let tally = self.lock();
        let mut open = tally.open.clone();
        let (completed, closed, errors) = (tally.completed, tally.closed, tally.errors);
        let peak_in_flight = tally.peak_in_flight;
        drop(tally);

        open.sort_unstable();
        StateSnapshot {
            open,
            completed,
            closed,
            errors,
            total: self.total,
            peak_in_flight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Progress, ScanState};
    use crate::scanner::probe::{CloseReason, ProbeOutcome};

    #[test]
    fn progress_formats_one_decimal() {
        let progress = Progress {
            completed: 100,
            total: 300,
        };
        assert_eq!(progress.to_string(), "33.3% (100/300)");
        assert!(!progress.is_finished());

        let empty = Progress {
            completed: 0,
            total: 0,
        };
        assert!((empty.percent() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn records_open_and_counts_everything() {
        let state = ScanState::new(4, 100);
        state.record(443, &ProbeOutcome::Open);
        state.record(81, &ProbeOutcome::Closed(CloseReason::Refused));
        state.record(22, &ProbeOutcome::Open);
        state.record(9, &ProbeOutcome::Error("address not available".to_owned()));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.open, vec![22, 443]);
        assert_eq!(snapshot.completed, 4);
        assert_eq!(snapshot.closed, 1);
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.total, 4);
    }

    #[test]
    fn progress_is_reported_on_cadence_and_at_the_end() {
        let state = ScanState::new(250, 100);
        let reported: Vec<u64> = (1..=250u16)
            .filter_map(|port| state.record(port, &ProbeOutcome::Closed(CloseReason::TimedOut)))
            .map(|progress| progress.completed)
            .collect();

        assert_eq!(reported, vec![100, 200, 250]);
        assert!(state.progress().is_finished());
    }

    #[test]
    fn peak_in_flight_tracks_overlap() {
        let state = ScanState::new(3, 100);
        state.begin();
        state.begin();
        state.record(1, &ProbeOutcome::Open);
        state.begin();
        state.record(2, &ProbeOutcome::Closed(CloseReason::Refused));
        state.record(3, &ProbeOutcome::Closed(CloseReason::Refused));

        assert_eq!(state.snapshot().peak_in_flight, 2);
    }

    #[test]
    fn completed_never_exceeds_total() {
        let state = ScanState::new(1, 0);
        assert!(state.record(1, &ProbeOutcome::Open).is_some());
        state.record(2, &ProbeOutcome::Closed(CloseReason::Refused));
        assert_eq!(state.progress().completed, 1);
    }

    #[test]
    fn concurrent_records_are_all_counted() {
        let state = std::sync::Arc::new(ScanState::new(8_000, 100));
        let handles: Vec<_> = (0..8u16)
            .map(|worker| {
                let state = std::sync::Arc::clone(&state);
                std::thread::spawn(move || {
                    for i in 0..1_000u16 {
                        let port = worker * 1_000 + i + 1;
                        let outcome = if port % 10 == 0 {
                            ProbeOutcome::Open
                        } else {
                            ProbeOutcome::Closed(CloseReason::Refused)
                        };
                        state.record(port, &outcome);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = state.snapshot();
        assert_eq!(snapshot.completed, 8_000);
        assert_eq!(snapshot.open.len(), 800);
        assert!(snapshot.open.windows(2).all(|w| w[0] < w[1]));
    }
}
