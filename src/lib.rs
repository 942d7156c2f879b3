//! This crate exposes the internal functionality of the tcpsweep TCP
//! connect scanner.
//!
//! A scan takes one target and a set of ports, attempts a full TCP handshake
//! with every port under a bounded number of simultaneous attempts, and
//! reports the ports that accepted a connection within the timeout.
//!
//! ## Architecture Overview
//!
//! The core scanning behaviour is managed by
//! [`Scanner`](crate::scanner::Scanner), which takes a
//! [`PortSet`](crate::port_strategy::PortSet) and a target string:
//!
//! 1. **Target validation**: [`address`] accepts IP literals and resolvable names
//! 2. **Port validation**: [`port_strategy`] rejects anything outside `1..=65535`
//! 3. **Probing**: one connect attempt per port, at most `concurrency` in flight
//! 4. **Aggregation**: outcomes are folded into a shared, lock-protected state
//! 5. **Reporting**: [`report`] prints the result and appends it to a text log,
//!    labelling ports through [`services`]
//!
//! ## Basic Usage Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use tcpsweep::address::get_resolver;
//! use tcpsweep::input::ScanOrder;
//! use tcpsweep::port_strategy::PortSet;
//! use tcpsweep::scanner::Scanner;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let resolver = get_resolver(&None).await;
//! let scanner = Scanner::new(
//!     resolver,
//!     100,                        // probes in flight
//!     Duration::from_millis(200), // per-probe timeout
//!     ScanOrder::Serial,
//! );
//!
//! let ports = PortSet::range(1, 1_000).unwrap();
//! let record = scanner.scan("127.0.0.1", &ports).await.unwrap();
//!
//! for port in &record.open {
//!     println!("{port} ({})", tcpsweep::services::lookup(*port));
//! }
//! # });
//! ```
#![allow(clippy::needless_doctest_main)]

pub mod tui;

pub mod error;

pub mod input;

pub mod scanner;

pub mod port_strategy;

pub mod address;

pub mod services;

pub mod report;
