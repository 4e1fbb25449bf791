use std::net::SocketAddr;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use dsvdc_dsuid::Namespace;
use dsvdc_host::{DEFAULT_HOST_NAME, DEFAULT_MAX_MESSAGE_SIZE};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod dsuid;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a vDC host and wait for a controller.
    Serve(ServeArgs),
    /// Generate or inspect dSUIDs.
    #[command(subcommand)]
    Dsuid(DsuidCommand),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Dsuid(DsuidCommand::Generate(args)) => dsuid::generate(args, format),
        Command::Dsuid(DsuidCommand::Parse(args)) => dsuid::parse(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on. Port 0 picks a free port.
    #[arg(long, env = "DSVDC_LISTEN", default_value = "0.0.0.0:0")]
    pub listen: SocketAddr,
    /// Host dSUID (34 hex digits). Defaults to the well-known host dSUID.
    #[arg(long, env = "DSVDC_DSUID")]
    pub dsuid: Option<String>,
    /// Human-readable host name.
    #[arg(long, env = "DSVDC_NAME", default_value = DEFAULT_HOST_NAME)]
    pub name: String,
    /// Register a demo vDC announced to the controller.
    #[arg(long)]
    pub demo_vdc: bool,
    /// Largest message body accepted or sent, in bytes.
    #[arg(long, env = "DSVDC_MAX_MESSAGE_SIZE", default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,
    /// Close connections idle for this long (e.g. 3600s, 500ms).
    #[arg(long, env = "DSVDC_IDLE_TIMEOUT", default_value = "3600s")]
    pub idle_timeout: String,
    /// Drop requests unanswered for this long (e.g. 30s).
    #[arg(long, env = "DSVDC_REQUEST_MAX_AGE", default_value = "30s")]
    pub request_max_age: String,
}

#[derive(Subcommand, Debug)]
pub enum DsuidCommand {
    /// Generate new dSUIDs.
    Generate(GenerateArgs),
    /// Parse a dSUID and show its parts.
    Parse(ParseArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Algorithm {
    /// Time based.
    V1,
    /// MD5 of namespace and name.
    V3,
    /// Random.
    V4,
    /// SHA-1 of namespace and name.
    V5,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Generation algorithm.
    #[arg(long, short = 'a', value_enum, default_value = "v4")]
    pub algorithm: Algorithm,
    /// Namespace for v3/v5 (enocean, gs1-128, ieee-mac, vdsm, vdc).
    #[arg(long, requires = "name")]
    pub namespace: Option<Namespace>,
    /// Name hashed into v3/v5 dSUIDs.
    #[arg(long, requires = "namespace")]
    pub name: Option<String>,
    /// Number of dSUIDs to generate.
    #[arg(long, short = 'n', default_value_t = 1)]
    pub count: usize,
}

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// dSUID in 34-digit (or bare 32-digit UUID) hex form.
    pub dsuid: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `<n>s` / `<n>ms` (bare numbers are seconds).
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
