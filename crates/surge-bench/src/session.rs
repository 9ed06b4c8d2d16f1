use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use surge_core::{
    decode_payload, extract_timestamp, Connector, LatencyRecorder, MessageSource, Metrics,
    RunConfig, SourceEvent,
};

/// State shared by every session of one run. Sessions only increment the
/// metrics and feed the latency recorder.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: Arc<RunConfig>,
    pub topics: Arc<Vec<String>>,
    pub metrics: Arc<Metrics>,
    pub latency: Arc<LatencyRecorder>,
}

impl RunContext {
    pub fn new(config: RunConfig) -> Self {
        let topics = config.topics();
        Self {
            latency: Arc::new(LatencyRecorder::new(config.latency_samples)),
            metrics: Arc::new(Metrics::new()),
            topics: Arc::new(topics),
            config: Arc::new(config),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Subscribed,
    Receiving,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    MessageCap,
    ProtocolError,
    TransportError,
    Disconnected,
    Timeout,
    ConnectFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub client_id: String,
    pub messages: u64,
    pub reason: FinishReason,
}

/// One long-lived subscriber connection.
pub struct ClientSession {
    client_id: String,
    ctx: RunContext,
    state: SessionState,
    message_count: u64,
    settled: bool,
    source: Option<Box<dyn MessageSource>>,
}

impl ClientSession {
    pub fn new(client_number: usize, ctx: RunContext) -> Self {
        let started_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            client_id: format!("surge-client-{}-{}-{}", client_number, started_ms, &suffix[..6]),
            ctx,
            state: SessionState::Idle,
            message_count: 0,
            settled: false,
            source: None,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    /// Drive the session to completion: whichever of the stop conditions or
    /// `deadline` comes first ends it, then it is finalized.
    pub async fn run(mut self, connector: Arc<dyn Connector>, deadline: Instant) -> SessionOutcome {
        let reason = tokio::select! {
            reason = self.drive(&*connector) => reason,
            _ = tokio::time::sleep_until(deadline) => {
                debug!("[{}] run duration elapsed", self.client_id);
                FinishReason::Timeout
            }
        };

        match self.finish(reason).await {
            Some(outcome) => outcome,
            None => self.outcome(reason),
        }
    }

    /// Connect, subscribe and receive until a stop condition fires. Does not
    /// release the connection; see [`ClientSession::finish`].
    pub async fn drive(&mut self, connector: &dyn Connector) -> FinishReason {
        let metrics = self.ctx.metrics.clone();

        self.state = SessionState::Connecting;
        let source = match connector
            .connect(&self.ctx.config.address, &self.client_id)
            .await
        {
            Ok(source) => source,
            Err(e) => {
                metrics.client_failed();
                metrics.error();
                error!("[{}] connect failed: {}", self.client_id, e);
                return FinishReason::ConnectFailed;
            }
        };
        metrics.client_connected();
        debug!("[{}] connected", self.client_id);
        let source = self.source.insert(source);

        let topics = self.ctx.topics.clone();
        for topic in topics.iter() {
            if let Err(e) = source.subscribe(topic).await {
                metrics.error();
                error!("[{}] subscribe to {} failed: {}", self.client_id, topic, e);
                return FinishReason::ProtocolError;
            }
        }
        self.state = SessionState::Subscribed;

        loop {
            let Some(source) = self.source.as_mut() else {
                return FinishReason::Disconnected;
            };
            let event = source.next_event().await;
            match event {
                SourceEvent::Message { topic, body } => {
                    self.state = SessionState::Receiving;
                    if let Some(reason) = self.on_message(&topic, &body) {
                        return reason;
                    }
                }
                SourceEvent::ProtocolError(reason) => {
                    metrics.error();
                    error!("[{}] STOMP error: {}", self.client_id, reason);
                    return FinishReason::ProtocolError;
                }
                SourceEvent::TransportError(reason) => {
                    metrics.error();
                    error!("[{}] WebSocket error: {}", self.client_id, reason);
                    return FinishReason::TransportError;
                }
                SourceEvent::Disconnected => {
                    debug!("[{}] disconnected by server", self.client_id);
                    return FinishReason::Disconnected;
                }
            }
        }
    }

    fn on_message(&mut self, topic: &str, body: &[u8]) -> Option<FinishReason> {
        let payload = match decode_payload(body) {
            Ok(payload) => payload,
            Err(e) => {
                self.ctx.metrics.error();
                warn!(
                    "[{}] Failed to parse payload from {}: {}",
                    self.client_id, topic, e
                );
                return None;
            }
        };

        self.ctx.metrics.message_received();
        self.message_count += 1;
        if let Some(timestamp) = extract_timestamp(&payload) {
            self.ctx.latency.record(timestamp);
        }

        let config = &self.ctx.config;
        if config.max_messages > 0 && self.message_count >= config.max_messages {
            info!(
                "[{}] reached max messages ({}), disconnecting",
                self.client_id, self.message_count
            );
            return Some(FinishReason::MessageCap);
        }
        if config.log_every > 0 && self.message_count % config.log_every == 0 {
            info!("[{}] messages={}", self.client_id, self.message_count);
        }
        None
    }

    /// Release the connection and produce the outcome. Only the first call
    /// does anything; later calls return `None`.
    pub async fn finish(&mut self, reason: FinishReason) -> Option<SessionOutcome> {
        if std::mem::replace(&mut self.settled, true) {
            return None;
        }
        self.state = SessionState::Finished;

        if let Some(mut source) = self.source.take() {
            if let Err(e) = source.disconnect().await {
                debug!("[{}] disconnect failed: {}", self.client_id, e);
            }
        }
        debug!(
            "[{}] finished ({:?}) after {} messages",
            self.client_id, reason, self.message_count
        );
        Some(self.outcome(reason))
    }

    fn outcome(&self, reason: FinishReason) -> SessionOutcome {
        SessionOutcome {
            client_id: self.client_id.clone(),
            messages: self.message_count,
            reason,
        }
    }
}
