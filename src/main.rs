#![allow(clippy::doc_markdown)]
use std::io;

use anyhow::Context;
use log::{debug, info};
use tcpsweep::address::get_resolver;
use tcpsweep::error::ScanError;
use tcpsweep::input::{Config, Opts};
use tcpsweep::report::{ConsoleReporter, LogStore};
use tcpsweep::scanner::{CancelToken, Scanner};
use tcpsweep::{detail, warning};
use tokio::signal;

/// File descriptors kept free for stdio, the resolver and the log file.
#[cfg(unix)]
const RESERVED_FILE_DESCRIPTORS: u64 = 64;

/// Exit status after a second interrupt, as for a shell killed by SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() {
    env_logger::init();

    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            report_failure(&e);
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> anyhow::Result<()> {
    // With no arguments at all we ask for the essentials instead.
    let mut opts = if std::env::args_os().len() <= 1 {
        let stdin = io::stdin();
        Opts::prompt(&mut stdin.lock(), &mut io::stdout())?
    } else {
        Opts::read()
    };

    if !opts.no_config {
        let config = Config::read(opts.config_path.clone())?;
        opts.merge(&config);
    }
    debug!("Main() `opts` arguments are {opts:?}");

    let timeout = opts.probe_timeout()?;

    #[cfg(unix)]
    let concurrency = infer_concurrency(&opts, adjust_ulimit_size(&opts));
    #[cfg(not(unix))]
    let concurrency = opts.threads;

    let reporter = ConsoleReporter::new(opts.greppable, opts.accessible);
    let resolver = get_resolver(&opts.resolver).await;
    let scanner = Scanner::new(resolver, concurrency, timeout, opts.scan_order)
        .with_progress_every(opts.progress_every)
        .with_progress(reporter.progress_fn());

    // Both checks happen before any probe is sent: target first, then ports.
    let target = scanner.validate_target(&opts.target).await?;
    let ports = opts.port_set()?;

    let cancel = scanner.cancel_token();
    let (greppable, accessible) = (opts.greppable, opts.accessible);
    tokio::spawn(async move {
        while signal::ctrl_c().await.is_ok() {
            if on_interrupt(&cancel) == Interrupt::Exit {
                warning!(
                    "Interrupted again, exiting without waiting for probes",
                    greppable,
                    accessible
                );
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
            info!("Interrupt received, draining in-flight probes");
        }
    });

    reporter.start(&target.to_string(), &ports.descriptor());
    let record = match scanner.run(&target, &ports).await {
        Ok(record) => record,
        Err(e) => {
            if let ScanError::Cancelled {
                completed, total, ..
            } = &e
            {
                reporter.cancelled(*completed, *total);
            }
            return Err(e.into());
        }
    };
    reporter.finish(&record);

    if !opts.no_log {
        let store = LogStore::new(&opts.log_file);
        store
            .append(&record)
            .with_context(|| format!("Could not write scan log {}", store.path().display()))?;
        reporter.logged(store.path());
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    Drain,
    Exit,
}

/// The first interrupt cancels the scan and lets in-flight probes drain;
/// any later one exits at once.
fn on_interrupt(cancel: &CancelToken) -> Interrupt {
    if cancel.is_cancelled() {
        return Interrupt::Exit;
    }
    cancel.cancel();
    Interrupt::Drain
}

/// Prints the reason the process is about to exit non-zero.
fn report_failure(e: &anyhow::Error) {
    match e.downcast_ref::<ScanError>() {
        // The reporter already printed the cancellation notice.
        Some(err) if !err.is_validation() => {}
        Some(err) => {
            warning!(format!("Error: {err}"));
        }
        None => {
            warning!(format!("Unexpected error: {e:#}"));
        }
    }
}

#[cfg(unix)]
fn adjust_ulimit_size(opts: &Opts) -> u64 {
    use rlimit::Resource;

    if let Some(limit) = opts.ulimit {
        if Resource::NOFILE.set(limit, limit).is_ok() {
            detail!(
                format!("Automatically increasing ulimit value to {limit}."),
                opts.greppable,
                opts.accessible
            );
        } else {
            warning!(
                "ERROR. Failed to set ulimit value.",
                opts.greppable,
                opts.accessible
            );
        }
    }

    match Resource::NOFILE.get() {
        Ok((soft, _)) => soft,
        Err(e) => {
            debug!("Could not read the file descriptor limit: {e}");
            u64::MAX
        }
    }
}

/// Lowers the requested concurrency when it would not fit into the open
/// file limit.
#[cfg(unix)]
fn infer_concurrency(opts: &Opts, ulimit: u64) -> usize {
    let requested = u64::try_from(opts.threads).unwrap_or(u64::MAX);
    let available = ulimit.saturating_sub(RESERVED_FILE_DESCRIPTORS);

    if requested <= available {
        return opts.threads;
    }

    let lowered = available.max(ulimit / 2).clamp(1, requested);
    warning!(
        format!(
            "File limit {ulimit} is too low for {requested} concurrent probes, using {lowered}. Consider upping it with --ulimit."
        ),
        opts.greppable,
        opts.accessible
    );
    info!("Concurrency lowered from {requested} to {lowered} because of the file limit");
    usize::try_from(lowered).unwrap_or(1)
}
