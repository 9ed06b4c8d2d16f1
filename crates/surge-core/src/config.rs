use std::time::Duration;

use crate::{Result, SurgeError};

pub const DEFAULT_ADDRESS: &str = "ws://localhost:9001/ws/websocket";
pub const DEFAULT_CLIENTS: usize = 10;
pub const DEFAULT_DURATION: &str = "1m";
pub const DEFAULT_DIMENSIONS: [&str; 2] = ["ul,sl", "bus,train"];
pub const DEFAULT_TOPIC_TEMPLATE: &str = "/topic/{0}/vehicles/{1}";
pub const DEFAULT_LOG_EVERY: u64 = 25;
pub const DEFAULT_LATENCY_SAMPLES: usize = 10_000;
pub const DEFAULT_SHUTDOWN_GRACE: &str = "5s";

/// Parse `<digits><unit>` where unit is one of `ms`, `s`, `m`, `h` into
/// milliseconds. Surrounding whitespace is ignored.
pub fn parse_duration_ms(value: &str) -> Result<u64> {
    let trimmed = value.trim();
    let invalid = || SurgeError::InvalidDuration(value.to_string());

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (digits, unit) = trimmed.split_at(split);
    if digits.is_empty() {
        return Err(invalid());
    }

    let multiplier: u64 = match unit {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60 * 1_000,
        "h" => 60 * 60 * 1_000,
        _ => return Err(invalid()),
    };

    let amount: u64 = digits.parse().map_err(|_| invalid())?;
    amount.checked_mul(multiplier).ok_or_else(invalid)
}

pub fn parse_duration(value: &str) -> Result<Duration> {
    parse_duration_ms(value).map(Duration::from_millis)
}

/// Split a comma separated list, trimming entries and dropping empty ones.
pub fn csv_to_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}

/// Immutable settings for one load run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub address: String,
    pub clients: usize,
    pub duration: Duration,
    /// Independent topic dimensions; their cross product yields the topics.
    pub dimensions: Vec<Vec<String>>,
    /// Destination pattern with `{0}`, `{1}`, ... placeholders, one per dimension.
    pub topic_template: String,
    /// Per-client cap on received messages, 0 = unbounded.
    pub max_messages: u64,
    /// Per-client progress log cadence, 0 = never.
    pub log_every: u64,
    /// Reservoir capacity used for percentile estimation.
    pub latency_samples: usize,
    /// How long past `duration` the coordinator waits before aborting sessions.
    pub shutdown_grace: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            clients: DEFAULT_CLIENTS,
            duration: Duration::from_secs(60),
            dimensions: DEFAULT_DIMENSIONS.iter().map(|d| csv_to_list(d)).collect(),
            topic_template: DEFAULT_TOPIC_TEMPLATE.to_string(),
            max_messages: 0,
            log_every: DEFAULT_LOG_EVERY,
            latency_samples: DEFAULT_LATENCY_SAMPLES,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.clients == 0 {
            return Err(SurgeError::Config("client count must be at least 1".into()));
        }
        if self.latency_samples == 0 {
            return Err(SurgeError::Config(
                "latency sample capacity must be at least 1".into(),
            ));
        }
        if self.dimensions.len() < 2 {
            return Err(SurgeError::Config(format!(
                "at least two topic dimensions are required, got {}",
                self.dimensions.len()
            )));
        }
        if let Some(idx) = self.dimensions.iter().position(|d| d.is_empty()) {
            return Err(SurgeError::Config(format!("topic dimension {} is empty", idx)));
        }
        for idx in 0..self.dimensions.len() {
            let placeholder = format!("{{{}}}", idx);
            if !self.topic_template.contains(&placeholder) {
                return Err(SurgeError::Config(format!(
                    "topic template '{}' is missing placeholder {}",
                    self.topic_template, placeholder
                )));
            }
        }
        Ok(())
    }

    /// Every topic of the dimension cross product, first dimension outermost.
    pub fn topics(&self) -> Vec<String> {
        let mut combos: Vec<Vec<&str>> = vec![Vec::new()];
        for dimension in &self.dimensions {
            combos = combos
                .into_iter()
                .flat_map(|prefix| {
                    dimension.iter().map(move |value| {
                        let mut next = prefix.clone();
                        next.push(value.as_str());
                        next
                    })
                })
                .collect();
        }

        combos
            .into_iter()
            .map(|values| {
                values
                    .iter()
                    .enumerate()
                    .fold(self.topic_template.clone(), |topic, (idx, value)| {
                        topic.replace(&format!("{{{}}}", idx), value)
                    })
            })
            .collect()
    }
}
