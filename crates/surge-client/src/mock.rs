//! Scripted in-memory message sources for exercising sessions without a
//! broker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use surge_core::{Connector, MessageSource, Result, SourceEvent, SurgeError};

/// What one connection does once it is handed out.
#[derive(Debug, Clone, Default)]
pub struct Script {
    refuse: Option<String>,
    subscribe_error: Option<String>,
    events: Vec<SourceEvent>,
    event_interval: Option<Duration>,
    close_after_events: bool,
    stall_on_disconnect: bool,
}

impl Script {
    /// Connects, subscribes and then never delivers anything.
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn refuse(reason: impl Into<String>) -> Self {
        Self {
            refuse: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn events(events: Vec<SourceEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    pub fn fail_subscribe(mut self, reason: impl Into<String>) -> Self {
        self.subscribe_error = Some(reason.into());
        self
    }

    /// Pause before every scripted event.
    pub fn every(mut self, interval: Duration) -> Self {
        self.event_interval = Some(interval);
        self
    }

    /// Report `Disconnected` once the scripted events are exhausted.
    pub fn then_disconnect(mut self) -> Self {
        self.close_after_events = true;
        self
    }

    /// `disconnect` never returns.
    pub fn stall_on_disconnect(mut self) -> Self {
        self.stall_on_disconnect = true;
        self
    }
}

pub fn json_message(topic: &str, payload: &serde_json::Value) -> SourceEvent {
    SourceEvent::Message {
        topic: topic.to_string(),
        body: Bytes::from(payload.to_string()),
    }
}

pub fn raw_message(topic: &str, body: &'static [u8]) -> SourceEvent {
    SourceEvent::Message {
        topic: topic.to_string(),
        body: Bytes::from_static(body),
    }
}

/// What the scripted sources observed, shared by every connection of one
/// connector.
#[derive(Debug, Default)]
pub struct ConnectionLog {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    subscriptions: Mutex<Vec<(String, String)>>,
}

impl ConnectionLog {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// `(client id, topic)` pairs in subscription order.
    pub fn subscriptions(&self) -> Vec<(String, String)> {
        self.subscriptions.lock().clone()
    }
}

/// Hands out one script per `connect` call, in order; once the queue is
/// drained every further connection uses the fallback script.
pub struct ScriptedConnector {
    scripts: Mutex<VecDeque<Script>>,
    fallback: Script,
    log: Arc<ConnectionLog>,
}

impl ScriptedConnector {
    pub fn new(scripts: Vec<Script>, fallback: Script) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            fallback,
            log: Arc::new(ConnectionLog::default()),
        }
    }

    pub fn uniform(script: Script) -> Self {
        Self::new(Vec::new(), script)
    }

    pub fn log(&self) -> Arc<ConnectionLog> {
        self.log.clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _address: &str, client_id: &str) -> Result<Box<dyn MessageSource>> {
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        self.log.connects.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = script.refuse {
            return Err(SurgeError::Connect(reason));
        }

        Ok(Box::new(ScriptedSource {
            client_id: client_id.to_string(),
            events: script.events.into(),
            event_interval: script.event_interval,
            close_after_events: script.close_after_events,
            subscribe_error: script.subscribe_error,
            stall_on_disconnect: script.stall_on_disconnect,
            log: self.log.clone(),
        }))
    }
}

struct ScriptedSource {
    client_id: String,
    events: VecDeque<SourceEvent>,
    event_interval: Option<Duration>,
    close_after_events: bool,
    subscribe_error: Option<String>,
    stall_on_disconnect: bool,
    log: Arc<ConnectionLog>,
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        if let Some(reason) = &self.subscribe_error {
            return Err(SurgeError::Protocol(reason.clone()));
        }
        self.log
            .subscriptions
            .lock()
            .push((self.client_id.clone(), topic.to_string()));
        Ok(())
    }

    async fn next_event(&mut self) -> SourceEvent {
        if let Some(interval) = self.event_interval {
            if !self.events.is_empty() {
                tokio::time::sleep(interval).await;
            }
        }
        match self.events.pop_front() {
            Some(event) => event,
            None if self.close_after_events => SourceEvent::Disconnected,
            None => std::future::pending().await,
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.stall_on_disconnect {
            std::future::pending::<()>().await;
        }
        self.log.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripts_are_handed_out_in_order() {
        let connector = ScriptedConnector::new(
            vec![
                Script::refuse("nope"),
                Script::events(vec![json_message("/t", &json!({"timestamp": 1}))])
                    .then_disconnect(),
            ],
            Script::idle(),
        );
        let log = connector.log();

        assert!(matches!(
            connector.connect("mem://", "a").await,
            Err(SurgeError::Connect(_))
        ));

        let mut source = connector.connect("mem://", "b").await.unwrap();
        source.subscribe("/t").await.unwrap();
        assert!(matches!(source.next_event().await, SourceEvent::Message { .. }));
        assert_eq!(source.next_event().await, SourceEvent::Disconnected);
        source.disconnect().await.unwrap();

        assert_eq!(log.connects(), 2);
        assert_eq!(log.disconnects(), 1);
        assert_eq!(log.subscriptions(), vec![("b".to_string(), "/t".to_string())]);
    }

    #[tokio::test]
    async fn test_idle_source_never_yields() {
        let connector = ScriptedConnector::uniform(Script::idle());
        let mut source = connector.connect("mem://", "c").await.unwrap();
        let waited =
            tokio::time::timeout(Duration::from_millis(50), source.next_event()).await;
        assert!(waited.is_err());
    }
}
