//! Provides a means to read, parse and hold configuration options for scans.
use anyhow::{bail, Context};
use clap::parser::ValueSource;
use clap::{CommandFactory, FromArgMatches, Parser, ValueEnum};
use serde_derive::Deserialize;
use std::ffi::OsString;
use std::fs;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use crate::port_strategy::PortSet;
use crate::report::DEFAULT_LOG_FILE;

const DEFAULT_START_PORT: u32 = 1;
const DEFAULT_END_PORT: u32 = 1000;
const DEFAULT_THREADS: usize = 100;
const DEFAULT_TIMEOUT_SECS: f64 = 1.0;
const DEFAULT_PROGRESS_EVERY: u64 = 100;

/// Options that can also be set in the configuration file.
const CONFIGURABLE: [&str; 9] = [
    "threads",
    "timeout",
    "scan_order",
    "progress_every",
    "greppable",
    "accessible",
    "log_file",
    "resolver",
    "ulimit",
];

/// Represents the strategy in which the port scanning will run.
///   - Serial will run from start to end, for example 1 to 1_000.
///   - Random will randomize the order in which ports will be scanned.
#[derive(Deserialize, Debug, ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    Serial,
    Random,
}

/// Parses `80,443,1000-1010` into an explicit port list.
#[cfg(not(tarpaulin_include))]
pub fn parse_ports_and_ranges(input: &str) -> Result<PortSet, String> {
    let mut ports: Vec<u32> = Vec::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            let start = parse_port_number(start, part)?;
            let end = parse_port_number(end, part)?;
            let range = PortSet::range(start, end).map_err(|e| e.to_string())?;
            if let PortSet::Range(range) = range {
                ports.extend(u32::from(range.start())..=u32::from(range.end()));
            }
        } else {
            ports.push(parse_port_number(part, part)?);
        }
    }

    PortSet::list(ports).map_err(|e| e.to_string())
}

fn parse_port_number(value: &str, context: &str) -> Result<u32, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("Invalid port number '{}' in '{context}'", value.trim()))
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tcpsweep",
    version = env!("CARGO_PKG_VERSION"),
    max_term_width = 120,
    help_template = "{bin} {version}\n{about}\n\nUSAGE:\n    {usage}\n\nOPTIONS:\n{options}",
)]
#[allow(clippy::struct_excessive_bools)]
/// Concurrent TCP connect scanner.
/// Run without arguments to be prompted for a target and a port range.
/// WARNING Only scan hosts you are allowed to scan.
pub struct Opts {
    /// IP address or host name to scan.
    pub target: String,

    /// First port of the range to scan.
    #[arg(short, long, default_value_t = DEFAULT_START_PORT)]
    pub start: u32,

    /// Last port of the range to scan.
    #[arg(short, long, default_value_t = DEFAULT_END_PORT)]
    pub end: u32,

    /// Explicit ports and/or ranges to scan instead of --start/--end. Example: 22,80,8000-8100
    #[arg(short, long, value_parser = parse_ports_and_ranges, conflicts_with = "common")]
    pub ports: Option<PortSet>,

    /// Maximum number of connection attempts in flight.
    #[arg(short = 't', long = "threads", alias = "concurrency", default_value_t = DEFAULT_THREADS)]
    pub threads: usize,

    /// Seconds to wait for a connection before a port is assumed closed.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: f64,

    /// Scan only a fixed list of well-known service ports.
    #[arg(long)]
    pub common: bool,

    /// The order of scanning to be performed. The "serial" option will
    /// scan ports in ascending order while the "random" option will scan
    /// ports randomly.
    #[arg(long, value_enum, ignore_case = true, default_value = "serial")]
    pub scan_order: ScanOrder,

    /// Number of completed probes between progress updates.
    #[arg(long, default_value_t = DEFAULT_PROGRESS_EVERY)]
    pub progress_every: u64,

    /// Automatically ups the ULIMIT with the value you provided.
    #[arg(short, long)]
    pub ulimit: Option<u64>,

    /// A comma-delimited list or file of DNS resolvers.
    #[arg(long)]
    pub resolver: Option<String>,

    /// Greppable mode. Only output the open ports.
    #[arg(short, long)]
    pub greppable: bool,

    /// Accessible mode. Turns off features which negatively affect screen readers.
    #[arg(long)]
    pub accessible: bool,

    /// File the scan record is appended to.
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    /// Do not append a record to the scan log.
    #[arg(long)]
    pub no_log: bool,

    /// Whether to ignore the configuration file or not.
    #[arg(short, long)]
    pub no_config: bool,

    /// Custom path to config file
    #[arg(short, long, value_parser)]
    pub config_path: Option<PathBuf>,

    /// Configurable options given explicitly on the command line.
    #[arg(skip)]
    pub explicit: Vec<String>,
}

#[cfg(not(tarpaulin_include))]
impl Opts {
    pub fn read() -> Self {
        Self::read_from(std::env::args_os())
    }

    /// Parses `args` and remembers which configurable options they set, so
    /// the configuration file cannot override them.
    pub fn read_from<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().get_matches_from(args);
        let mut opts = Self::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
        opts.explicit = CONFIGURABLE
            .iter()
            .filter(|id| matches.value_source(id) == Some(ValueSource::CommandLine))
            .map(|id| (*id).to_owned())
            .collect();
        opts
    }

    fn set_on_command_line(&self, field: &str) -> bool {
        self.explicit.iter().any(|f| f == field)
    }

    fn keep_command_line(&self, field: &str) {
        crate::detail!(
            format!("Ignoring {field} from the configuration file, the command line sets it."),
            self.greppable,
            self.accessible
        );
    }

    /// Asks for target, start port and end port on `output`, reading the
    /// answers from `input`. Blank port answers take the defaults.
    pub fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> anyhow::Result<Self> {
        let target = ask(
            input,
            output,
            "Enter the target IP address or host name: ",
        )?
        .context("No target given")?;
        let start = ask_port(input, output, "Enter the start port", DEFAULT_START_PORT)?;
        let end = ask_port(input, output, "Enter the end port", DEFAULT_END_PORT)?;

        Ok(Self {
            target,
            start,
            end,
            ..Self::default()
        })
    }

    /// The per-probe timeout. It has to be a positive, finite number of
    /// seconds.
    pub fn probe_timeout(&self) -> anyhow::Result<Duration> {
        match Duration::try_from_secs_f64(self.timeout) {
            Ok(timeout) if !timeout.is_zero() => Ok(timeout),
            _ => bail!(
                "Invalid timeout {}: expected a positive number of seconds",
                self.timeout
            ),
        }
    }

    /// The ports this invocation asks for.
    pub fn port_set(&self) -> Result<PortSet, crate::error::ScanError> {
        if self.common {
            return Ok(PortSet::common());
        }
        match &self.ports {
            Some(ports) => Ok(ports.clone()),
            None => PortSet::range(self.start, self.end),
        }
    }

    /// Merges values found within the user configuration file. Options
    /// given on the command line keep their value.
    pub fn merge(&mut self, config: &Config) {
        if !self.no_config {
            self.merge_required(config);
            self.merge_optional(config);
        }
    }

    fn merge_required(&mut self, config: &Config) {
        macro_rules! merge_required {
            ($($field: ident),+) => {
                $(
                    if let Some(e) = &config.$field {
                        if self.set_on_command_line(stringify!($field)) {
                            self.keep_command_line(stringify!($field));
                        } else {
                            self.$field = e.clone();
                        }
                    }
                )+
            }
        }

        merge_required!(
            threads,
            timeout,
            scan_order,
            progress_every,
            greppable,
            accessible,
            log_file
        );
    }

    fn merge_optional(&mut self, config: &Config) {
        macro_rules! merge_optional {
            ($($field: ident),+) => {
                $(
                    if config.$field.is_some() {
                        if self.set_on_command_line(stringify!($field)) {
                            self.keep_command_line(stringify!($field));
                        } else {
                            self.$field = config.$field.clone();
                        }
                    }
                )+
            }
        }

        merge_optional!(resolver, ulimit);
    }
}

fn ask<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> anyhow::Result<Option<String>> {
    write!(output, "{question}")?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let answer = line.trim();
    Ok((!answer.is_empty()).then(|| answer.to_owned()))
}

fn ask_port<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
    default: u32,
) -> anyhow::Result<u32> {
    match ask(input, output, &format!("{question} (default {default}): "))? {
        None => Ok(default),
        Some(answer) => answer
            .parse()
            .with_context(|| format!("Invalid port number '{answer}'")),
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            target: String::new(),
            start: DEFAULT_START_PORT,
            end: DEFAULT_END_PORT,
            ports: None,
            threads: DEFAULT_THREADS,
            timeout: DEFAULT_TIMEOUT_SECS,
            common: false,
            scan_order: ScanOrder::Serial,
            progress_every: DEFAULT_PROGRESS_EVERY,
            ulimit: None,
            resolver: None,
            greppable: false,
            accessible: false,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            no_log: false,
            no_config: false,
            config_path: None,
            explicit: Vec::new(),
        }
    }
}

/// Struct used to deserialize the options specified within our config file.
/// These will be further merged with our command line arguments in order to
/// generate the final Opts struct.
#[cfg(not(tarpaulin_include))]
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    threads: Option<usize>,
    timeout: Option<f64>,
    scan_order: Option<ScanOrder>,
    progress_every: Option<u64>,
    greppable: Option<bool>,
    accessible: Option<bool>,
    ulimit: Option<u64>,
    resolver: Option<String>,
    log_file: Option<PathBuf>,
}

#[cfg(not(tarpaulin_include))]
impl Config {
    /// Reads the configuration file with TOML format and parses it into a
    /// Config struct. A missing file yields an empty configuration.
    ///
    /// # Format
    ///
    /// threads = 500
    /// timeout = 0.5
    /// scan_order = "Random"
    /// log_file = "/var/log/tcpsweep.txt"
    ///
    pub fn read(custom_config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let Some(config_path) = custom_config_path.or_else(default_config_path) else {
            return Ok(Self::default());
        };
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Could not read {}", config_path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Found an error in configuration file {}", config_path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Constructs default path to config toml
pub fn default_config_path() -> Option<PathBuf> {
    let mut config_path = dirs::home_dir()?;
    config_path.push(".tcpsweep.toml");
    Some(config_path)
}
