use anyhow::{Context, Result};
use clap::Parser;
use corekit::commands::{self, RequestOptions, parse_header, parse_key_value, parse_method};
use corekit::config::DEFAULT_CONFIG_PATH;
use corekit::http::{
    BACKOFF, MAX_DELAY, MAX_TRIES, RETRY_DELAY, RequestDescriptor, RetryPolicy, SessionOptions,
};
use corekit::logging::{LogLevel, LogSettings, configure_logging};
use corekit::runtime::RealRuntime;
use reqwest::Method;
use std::path::PathBuf;
use std::time::Duration;

/// corekit - service plumbing from the command line
///
/// Run HTTP requests with automatic retry, inspect config files, and
/// summarize numbers.
///
/// Logs go to stderr. LOG_LEVEL and LOG_JSON set the defaults for
/// --log-level and --log-json.
///
/// Examples:
///   corekit request https://example.com/health
///   corekit config service.yaml
///   corekit stats 12 15 9 30
#[derive(Parser, Debug)]
#[command(author, version = env!("COREKIT_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<LogLevel>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, overrides_with = "no_log_json")]
    log_json: bool,

    /// Emit logs as plain text
    #[arg(long, global = true, overrides_with = "log_json")]
    no_log_json: bool,
}

impl Cli {
    fn log_json(&self) -> Option<bool> {
        match (self.log_json, self.no_log_json) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Send an HTTP request, retrying transient failures, and print the body
    Request(RequestArgs),

    /// Print a YAML or JSON config file as JSON
    Config(ConfigArgs),

    /// Print summary statistics of numbers given as arguments or on stdin
    Stats(StatsArgs),

    /// Print the current Unix time in milliseconds
    Timestamp,
}

#[derive(clap::Args, Debug)]
struct RequestArgs {
    #[arg(value_name = "URL")]
    url: String,

    /// HTTP method, case-insensitive
    #[arg(short = 'X', long, default_value = "GET", value_parser = parse_method)]
    method: Method,

    /// Request header, repeatable
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Query parameter, repeatable
    #[arg(short = 'q', long = "param", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    params: Vec<(String, String)>,

    /// Proxy URL for a scheme (http, https or all), repeatable
    #[arg(long = "proxy", value_name = "SCHEME=URL", value_parser = parse_key_value)]
    proxies: Vec<(String, String)>,

    /// Write the body as it arrives instead of buffering it
    #[arg(long)]
    stream: bool,

    /// Print the body of a failed response instead of exiting with an error
    #[arg(long)]
    no_raise: bool,

    /// Total number of attempts
    #[arg(long, default_value_t = MAX_TRIES)]
    max_tries: usize,

    /// Seconds to wait before the first retry
    #[arg(long, value_name = "SECS", default_value_t = RETRY_DELAY.as_secs_f64())]
    delay: f64,

    /// Factor applied to the delay after each retry
    #[arg(long, value_name = "FACTOR", default_value_t = BACKOFF)]
    backoff: f64,

    /// Upper bound on any single delay, in seconds
    #[arg(long, value_name = "SECS", default_value_t = MAX_DELAY.as_secs_f64())]
    max_delay: f64,

    /// Per-attempt timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<f64>,
}

impl RequestArgs {
    fn into_options(self) -> Result<RequestOptions> {
        let mut request = RequestDescriptor::new(self.method, self.url).stream(self.stream);
        for (name, value) in self.headers {
            request = request.header(name, value);
        }
        for (key, value) in self.params {
            request = request.param(key, value);
        }
        for (scheme, url) in self.proxies {
            request = request.proxy(scheme, url);
        }

        let policy = RetryPolicy::new()
            .with_max_tries(self.max_tries)
            .with_delay(seconds("--delay", self.delay)?)
            .with_backoff(self.backoff)
            .with_max_delay(seconds("--max-delay", self.max_delay)?)
            .with_raise_on_failure_status(!self.no_raise);

        let session = SessionOptions {
            timeout: self
                .timeout
                .map(|secs| seconds("--timeout", secs))
                .transpose()?,
            ..SessionOptions::default()
        };

        Ok(RequestOptions {
            request,
            policy,
            session,
        })
    }
}

fn seconds(flag: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .with_context(|| format!("Invalid value {} for {}, expected seconds >= 0", secs, flag))
}

#[derive(clap::Args, Debug)]
struct ConfigArgs {
    /// Path of the config file
    #[arg(value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    path: PathBuf,
}

#[derive(clap::Args, Debug)]
struct StatsArgs {
    /// Numbers to summarize; read from stdin when omitted
    #[arg(value_name = "VALUES", allow_negative_numbers = true)]
    values: Vec<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RealRuntime;

    let settings = LogSettings::resolve(&runtime, cli.log_level, cli.log_json())?;
    configure_logging(settings);

    let mut stdout = std::io::stdout();
    match cli.command {
        Commands::Request(args) => {
            commands::request(runtime, args.into_options()?, &mut stdout).await?;
        }
        Commands::Config(args) => commands::show_config(runtime, &args.path, &mut stdout)?,
        Commands::Stats(args) => {
            let values = if args.values.is_empty() {
                let input =
                    std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?;
                commands::parse_values(&input)?
            } else {
                args.values
            };
            commands::show_stats(&values, &mut stdout)?
        }
        Commands::Timestamp => commands::timestamp(runtime, &mut stdout)?,
    }
    Ok(())
}
