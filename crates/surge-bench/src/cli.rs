use clap::{Parser, ValueEnum};

use surge_core::{
    csv_to_list, parse_duration, Result, RunConfig, DEFAULT_ADDRESS, DEFAULT_CLIENTS,
    DEFAULT_DIMENSIONS, DEFAULT_DURATION, DEFAULT_LATENCY_SAMPLES, DEFAULT_LOG_EVERY,
    DEFAULT_SHUTDOWN_GRACE, DEFAULT_TOPIC_TEMPLATE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "surge-bench")]
#[command(about = "STOMP over WebSocket subscriber load tester")]
#[command(version)]
pub struct Cli {
    /// WebSocket endpoint of the STOMP broker
    #[arg(short = 'u', long = "url", env = "WS_URL", default_value = DEFAULT_ADDRESS)]
    pub url: String,

    /// Number of concurrent clients
    #[arg(short, long, env = "VUS", default_value_t = DEFAULT_CLIENTS)]
    pub clients: usize,

    /// Test duration (e.g. 30s, 2m, 1h)
    #[arg(short, long, env = "DURATION", default_value = DEFAULT_DURATION)]
    pub duration: String,

    /// Comma separated values of one topic dimension; repeat per dimension
    #[arg(short = 'D', long = "dimension", default_values = DEFAULT_DIMENSIONS)]
    pub dimensions: Vec<String>,

    /// Topic pattern, `{N}` is replaced by a value of dimension N
    #[arg(long, env = "TOPIC_TEMPLATE", default_value = DEFAULT_TOPIC_TEMPLATE)]
    pub topic_template: String,

    /// Max messages per client before disconnect (0 = unlimited)
    #[arg(short, long, env = "MAX_MESSAGES", default_value_t = 0)]
    pub max_messages: u64,

    /// Log progress every N messages per client (0 = never)
    #[arg(long, env = "LOG_EVERY", default_value_t = DEFAULT_LOG_EVERY)]
    pub log_every: u64,

    /// Number of latency samples kept for percentile calculation
    #[arg(long, env = "LATENCY_SAMPLES", default_value_t = DEFAULT_LATENCY_SAMPLES)]
    pub latency_samples: usize,

    /// Extra time allowed past the duration for clients to disconnect
    #[arg(long, env = "SHUTDOWN_GRACE", default_value = DEFAULT_SHUTDOWN_GRACE)]
    pub shutdown_grace: String,

    #[arg(long, value_enum, env = "SURGE_FORMAT", default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

/// Process exit code for a failed argument parse. Invalid flags are a fatal
/// startup error (1); `--help` and `--version` exit cleanly.
pub fn parse_error_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() {
        1
    } else {
        0
    }
}

impl Cli {
    pub fn run_config(&self) -> Result<RunConfig> {
        let config = RunConfig {
            address: self.url.clone(),
            clients: self.clients,
            duration: parse_duration(&self.duration)?,
            dimensions: self.dimensions.iter().map(|d| csv_to_list(d)).collect(),
            topic_template: self.topic_template.clone(),
            max_messages: self.max_messages,
            log_every: self.log_every,
            latency_samples: self.latency_samples,
            shutdown_grace: parse_duration(&self.shutdown_grace)?,
        };
        config.validate()?;
        Ok(config)
    }
}
