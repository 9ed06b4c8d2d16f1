use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;

/// Events surfaced by a connected message source, in transport order.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// A message delivered on one of the subscribed topics.
    Message { topic: String, body: Bytes },
    /// The broker reported an error (e.g. a STOMP ERROR frame).
    ProtocolError(String),
    /// The underlying transport failed.
    TransportError(String),
    /// The remote side closed the connection.
    Disconnected,
}

/// Opens connections to a messaging endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, address: &str, client_id: &str) -> Result<Box<dyn MessageSource>>;
}

/// One established connection. Every subscription made on it is delivered
/// through the same `next_event` stream.
#[async_trait]
pub trait MessageSource: Send {
    async fn subscribe(&mut self, topic: &str) -> Result<()>;

    /// Waits for the next event. Once `Disconnected` or an error has been
    /// returned the source is spent.
    async fn next_event(&mut self) -> SourceEvent;

    async fn disconnect(&mut self) -> Result<()>;
}
