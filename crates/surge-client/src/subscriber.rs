use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::Connection;
use surge_core::{Command, Frame, MessageSource, Result, SourceEvent};

/// STOMP session over an established connection. All subscriptions share the
/// connection and surface through `next_event`.
pub struct StompSource {
    client_id: String,
    connection: Connection,
    /// subscription id -> destination
    subscriptions: HashMap<String, String>,
    next_subscription: usize,
}

impl StompSource {
    pub(crate) fn new(client_id: String, connection: Connection) -> Self {
        Self {
            client_id,
            connection,
            subscriptions: HashMap::new(),
            next_subscription: 0,
        }
    }

    fn destination_of(&self, frame: &Frame) -> String {
        frame
            .get_header("destination")
            .or_else(|| {
                frame
                    .get_header("subscription")
                    .and_then(|id| self.subscriptions.get(id))
                    .map(String::as_str)
            })
            .unwrap_or_default()
            .to_string()
    }
}

#[async_trait]
impl MessageSource for StompSource {
    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        let id = format!("sub-{}", self.next_subscription);
        self.next_subscription += 1;

        self.connection.send(&Frame::subscribe(&id, topic)).await?;
        debug!("[{}] subscribed to {} as {}", self.client_id, topic, id);
        self.subscriptions.insert(id, topic.to_string());
        Ok(())
    }

    async fn next_event(&mut self) -> SourceEvent {
        loop {
            match self.connection.receive().await {
                Ok(Some(frame)) => match frame.command {
                    Command::Message => {
                        let topic = self.destination_of(&frame);
                        return SourceEvent::Message {
                            topic,
                            body: frame.body,
                        };
                    }
                    Command::Error => return SourceEvent::ProtocolError(frame.error_reason()),
                    other => {
                        debug!("[{}] ignoring {} frame", self.client_id, other);
                    }
                },
                Ok(None) => return SourceEvent::Disconnected,
                Err(e) => return SourceEvent::TransportError(e.to_string()),
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.connection.is_connected() {
            if let Err(e) = self.connection.send(&Frame::disconnect()).await {
                warn!("[{}] DISCONNECT not delivered: {}", self.client_id, e);
            }
        }
        self.connection.close().await;
        self.subscriptions.clear();
        Ok(())
    }
}
