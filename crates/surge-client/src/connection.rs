use std::collections::VecDeque;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info};

use surge_core::{Frame, FrameCodec, Result, SurgeError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A WebSocket carrying STOMP frames.
pub struct Connection {
    address: String,
    host: String,
    stream: Option<WsStream>,
    pending: VecDeque<Frame>,
    /// Decode failure reported once the frames preceding it are consumed.
    deferred: Option<SurgeError>,
}

impl Connection {
    pub async fn open(address: &str) -> Result<Self> {
        let request = address
            .into_client_request()
            .map_err(|e| SurgeError::Connect(format!("Invalid address {}: {}", address, e)))?;
        let host = request.uri().host().unwrap_or("localhost").to_string();

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| SurgeError::Connect(format!("Failed to connect to {}: {}", address, e)))?;
        info!("Connected to {}", address);

        Ok(Self {
            address: address.to_string(),
            host,
            stream: Some(stream),
            pending: VecDeque::new(),
            deferred: None,
        })
    }

    /// Host name to announce in the STOMP CONNECT frame.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub async fn send(&mut self, frame: &Frame) -> Result<()> {
        let encoded = FrameCodec::encode(frame)?;
        let message = match String::from_utf8(encoded.to_vec()) {
            Ok(text) => Message::Text(text),
            Err(e) => Message::Binary(e.into_bytes()),
        };

        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| SurgeError::Transport("No active connection".to_string()))?;
        if let Err(e) = stream.send(message).await {
            error!("Send failed: {}. Marking connection as disconnected.", e);
            self.stream = None;
            return Err(SurgeError::Transport(e.to_string()));
        }
        Ok(())
    }

    /// Next STOMP frame, or `None` once the peer has closed the socket.
    pub async fn receive(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }
            if let Some(e) = self.deferred.take() {
                return Err(e);
            }

            let Some(stream) = self.stream.as_mut() else {
                return Ok(None);
            };

            let next = stream.next().await;
            let data = match next {
                Some(Ok(Message::Text(text))) => text.into_bytes(),
                Some(Ok(Message::Binary(data))) => data,
                Some(Ok(Message::Close(reason))) => {
                    debug!("{} closed the connection: {:?}", self.address, reason);
                    self.stream = None;
                    return Ok(None);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    error!("Receive failed: {}. Marking connection as disconnected.", e);
                    self.stream = None;
                    return Err(SurgeError::Transport(e.to_string()));
                }
                None => {
                    self.stream = None;
                    return Ok(None);
                }
            };

            if let Err(e) = FrameCodec::decode_into(&data, &mut self.pending) {
                error!("Malformed frame from {}: {}", self.address, e);
                self.deferred = Some(e);
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                debug!("Close of {} failed: {}", self.address, e);
            }
        }
        self.pending.clear();
        self.deferred = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_frames_ahead_of_a_malformed_frame_are_delivered() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("ws://{}/ws", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let batch = "MESSAGE\ndestination:/a\n\n{}\0MESSAGE\ndestination:/b\n\n{}\0BOGUS\n\n\0";
            ws.send(Message::Text(batch.to_string())).await.unwrap();
            // Hold the socket open until the client is done.
            let _ = ws.next().await;
        });

        let mut connection = Connection::open(&address).await.unwrap();
        let first = connection.receive().await.unwrap().unwrap();
        assert_eq!(first.get_header("destination"), Some("/a"));
        let second = connection.receive().await.unwrap().unwrap();
        assert_eq!(second.get_header("destination"), Some("/b"));
        assert!(matches!(
            connection.receive().await,
            Err(SurgeError::FrameDecode(_))
        ));

        connection.close().await;
        server.await.unwrap();
    }
}
