//! Console output and the append-only scan log.
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use log::debug;

use crate::scanner::{Progress, ProgressFn, ScanRecord};
use crate::services;
use crate::{detail, output, warning};

/// Default location of the scan log, relative to the working directory.
pub const DEFAULT_LOG_FILE: &str = "scan_log.txt";

const RECORD_DELIMITER_WIDTH: usize = 50;

/// `  <port> (<label>)` lines for every open port.
fn port_lines(open: &[u16]) -> String {
    open.iter()
        .map(|&port| format!("  {port} ({})", services::lookup(port)))
        .join("\n")
}

/// The final result block printed after a scan.
pub fn render_summary(record: &ScanRecord) -> String {
    let mut out = format!("Results for {}:\n", record.target);
    if record.open.is_empty() {
        out.push_str("No open ports found");
    } else {
        let _ = writeln!(out, "Open ports found ({}):", record.open.len());
        out.push_str(&port_lines(&record.open));
    }
    out
}

/// Single-line output for greppable mode: `target -> [p1,p2]`.
pub fn greppable_line(record: &ScanRecord) -> String {
    format!("{} -> [{}]", record.target.addr(), record.open.iter().join(","))
}

/// Writes progress and results to the terminal.
///
/// Greppable mode prints nothing but the final line; accessible mode drops
/// colours and the spinner.
#[derive(Debug)]
pub struct ConsoleReporter {
    greppable: bool,
    accessible: bool,
    bar: ProgressBar,
}

impl ConsoleReporter {
    pub fn new(greppable: bool, accessible: bool) -> Self {
        let bar = if greppable {
            ProgressBar::hidden()
        } else {
            let template = if accessible {
                "Progress: {msg}"
            } else {
                "{spinner:.green} Progress: {msg}"
            };
            let style = ProgressStyle::with_template(template)
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            let bar = ProgressBar::new(0);
            bar.set_style(style);
            bar
        };

        Self {
            greppable,
            accessible,
            bar,
        }
    }

    /// Callback to hand to the scanner. Progress reports can arrive out of
    /// order from different workers; only forward movement is drawn.
    pub fn progress_fn(&self) -> ProgressFn {
        let bar = self.bar.clone();
        let high_water = Arc::new(AtomicU64::new(0));
        Arc::new(move |progress: Progress| {
            let previous = high_water.fetch_max(progress.completed, Ordering::Relaxed);
            if progress.completed > previous {
                bar.set_length(progress.total);
                bar.set_position(progress.completed);
                bar.set_message(progress.to_string());
            }
        })
    }

    pub fn start(&self, target: &str, descriptor: &str) {
        detail!(
            format!("Scanning {target} (ports {descriptor})..."),
            self.greppable,
            self.accessible
        );
    }

    pub fn finish(&self, record: &ScanRecord) {
        self.bar.finish_and_clear();

        if self.greppable {
            println!("{}", greppable_line(record));
            return;
        }

        detail!(
            format!("Scan finished in {:.2} seconds", record.elapsed.as_secs_f64()),
            self.greppable,
            self.accessible
        );
        output!(render_summary(record), self.greppable, self.accessible);

        if record.errors > 0 {
            warning!(
                format!(
                    "{} of {} probes failed with local errors; their ports were counted as closed. Consider lowering --threads.",
                    record.errors, record.total
                ),
                self.greppable,
                self.accessible
            );
        }
    }

    pub fn logged(&self, path: &Path) {
        detail!(
            format!("Result saved to {}", path.display()),
            self.greppable,
            self.accessible
        );
    }

    pub fn cancelled(&self, completed: u64, total: u64) {
        self.bar.abandon();
        warning!(format!(
            "Scan interrupted by user after {completed}/{total} probes"
        ));
    }
}

/// Append-only text log of completed scans.
#[derive(Debug, Clone)]
pub struct LogStore {
    path: PathBuf,
}

impl LogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record stamped with the current local time.
    pub fn append(&self, record: &ScanRecord) -> io::Result<()> {
        let entry = render_log_entry(record, &Local::now());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(entry.as_bytes())?;
        debug!("Appended scan record to {}", self.path.display());
        Ok(())
    }
}

/// Formats a log record. Each record ends with a delimiter line and a blank
/// line.
pub fn render_log_entry(record: &ScanRecord, timestamp: &DateTime<Local>) -> String {
    let mut entry = String::new();
    let _ = writeln!(entry, "[{}] Scan completed", timestamp.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(entry, "Target: {}", record.target);
    let _ = writeln!(entry, "Port range: {}", record.ports);
    let _ = writeln!(entry, "Duration: {:.2} seconds", record.elapsed.as_secs_f64());

    if record.open.is_empty() {
        entry.push_str("No open ports found\n");
    } else {
        let _ = writeln!(entry, "Open ports ({}):", record.open.len());
        let _ = writeln!(entry, "{}", port_lines(&record.open));
    }

    let _ = writeln!(entry, "{}\n", "-".repeat(RECORD_DELIMITER_WIDTH));
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::ScanTarget;
    use chrono::TimeZone;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    fn record(open: Vec<u16>) -> ScanRecord {
        ScanRecord {
            target: ScanTarget::from(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))),
            ports: "1-1000".to_owned(),
            open,
            elapsed: Duration::from_millis(1_234),
            total: 1_000,
            errors: 0,
            peak_in_flight: 1,
        }
    }

    fn timestamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap()
    }

    fn temp_log(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "tcpsweep-{name}-{}-{}.txt",
            std::process::id(),
            rand::random::<u32>()
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn log_entry_lists_open_ports_with_labels() {
        let entry = render_log_entry(&record(vec![22, 80, 31337]), &timestamp());
        let expected = "[2024-03-09 14:05:00] Scan completed\n\
                        Target: 10.0.0.7\n\
                        Port range: 1-1000\n\
                        Duration: 1.23 seconds\n\
                        Open ports (3):\n  \
                        22 (SSH)\n  \
                        80 (HTTP)\n  \
                        31337 (Unknown)\n\
                        --------------------------------------------------\n\n";
        assert_eq!(entry, expected);
    }

    #[test]
    fn log_entry_states_no_open_ports() {
        let entry = render_log_entry(&record(vec![]), &timestamp());
        assert!(entry.contains("No open ports found\n"));
        assert!(!entry.contains("Open ports ("));
        assert!(entry.ends_with(&format!("{}\n\n", "-".repeat(50))));
    }

    #[test]
    fn summary_labels_http() {
        let summary = render_summary(&record(vec![80]));
        assert_eq!(
            summary,
            "Results for 10.0.0.7:\nOpen ports found (1):\n  80 (HTTP)"
        );
        assert_eq!(
            render_summary(&record(vec![])),
            "Results for 10.0.0.7:\nNo open ports found"
        );
    }

    #[test]
    fn greppable_line_lists_ports() {
        assert_eq!(greppable_line(&record(vec![22, 443])), "10.0.0.7 -> [22,443]");
        assert_eq!(greppable_line(&record(vec![])), "10.0.0.7 -> []");
    }

    #[test]
    fn log_store_appends_records() {
        let path = temp_log("append");
        let store = LogStore::new(&path);

        store.append(&record(vec![])).unwrap();
        store.append(&record(vec![6379])).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("Scan completed").count(), 2);
        assert_eq!(content.matches(&"-".repeat(50)).count(), 2);
        assert!(content.contains("No open ports found"));
        assert!(content.contains("  6379 (Redis)"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn progress_callback_only_moves_forward() {
        let reporter = ConsoleReporter::new(true, true);
        let report = reporter.progress_fn();
        report(Progress {
            completed: 200,
            total: 300,
        });
        report(Progress {
            completed: 100,
            total: 300,
        });
        assert_eq!(reporter.bar.position(), 200);
    }
}
