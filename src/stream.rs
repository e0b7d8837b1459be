//! Streaming telemetry push channel
//!
//! Once subscribed, the streaming service delivers incremental field
//! updates for one vehicle as comma-separated value rows. Each pushed
//! update is decoded into named fields, merged into the vehicle's cached
//! state, and handed to a caller-supplied callback. The channel is
//! considered idle and closed after a fixed silence interval unless
//! configured to resubscribe instead. The transport sits behind the
//! [`StreamConnector`] trait so the protocol can be tested against a
//! scripted connection.

use crate::config::StreamingConfig;
use crate::error::{AurigaError, Result};
use crate::logging::get_logger;
use crate::vehicle::Vehicle;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// One open push channel
#[async_trait::async_trait]
pub trait StreamConnection: Send {
    /// Send a text frame
    async fn send(&mut self, text: String) -> Result<()>;

    /// Receive the next text frame; None when the peer closed the channel
    async fn next_message(&mut self) -> Result<Option<String>>;
}

/// Capability to open a push channel to the streaming service
#[async_trait::async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn StreamConnection>>;
}

/// WebSocket-backed connector used in production
pub struct WebSocketConnector;

struct WebSocketConnection {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait::async_trait]
impl StreamConnector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn StreamConnection>> {
        let (inner, _response) = connect_async(url)
            .await
            .map_err(|e| AurigaError::network(e.to_string()))?;
        Ok(Box::new(WebSocketConnection { inner }))
    }
}

#[async_trait::async_trait]
impl StreamConnection for WebSocketConnection {
    async fn send(&mut self, text: String) -> Result<()> {
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| AurigaError::network(e.to_string()))
    }

    async fn next_message(&mut self) -> Result<Option<String>> {
        while let Some(frame) = self.inner.next().await {
            match frame.map_err(|e| AurigaError::network(e.to_string()))? {
                Message::Text(text) => return Ok(Some(text)),
                Message::Binary(bytes) => {
                    return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()));
                }
                Message::Close(_) => return Ok(None),
                // Ping/pong frames are handled by the transport
                _ => {}
            }
        }
        Ok(None)
    }
}

/// Subscribe to the push channel for a vehicle and deliver updates until
/// the channel closes or goes idle. Each update is merged into the
/// vehicle's cached state before the callback sees it.
pub async fn stream<F>(
    vehicle: &mut Vehicle,
    config: &StreamingConfig,
    connector: &dyn StreamConnector,
    mut on_update: F,
) -> Result<()>
where
    F: FnMut(&Value) + Send,
{
    let logger = get_logger("stream");
    let token = vehicle.dispatch().access_token().await?;
    // The streaming service tags subscriptions with the numeric vehicle id
    let tag = vehicle
        .data()
        .get_i64("vehicle_id")
        .map(|id| id.to_string())
        .map_or_else(|| vehicle.id(), Ok)?;

    let subscribe = json!({
        "msg_type": "data:subscribe_oauth",
        "token": token,
        "value": config.fields.join(","),
        "tag": tag,
    })
    .to_string();

    let mut connection = connector.connect(&config.url).await?;
    connection.send(subscribe.clone()).await?;

    let idle = Duration::from_secs(config.idle_timeout_seconds);
    let mut updates: u64 = 0;

    loop {
        let message = match tokio::time::timeout(idle, connection.next_message()).await {
            Err(_) => {
                if config.restart_on_idle {
                    logger.debug("Channel idle, resubscribing");
                    connection.send(subscribe.clone()).await?;
                    continue;
                }
                logger.debug(&format!("Channel idle, closing after {} update(s)", updates));
                return Ok(());
            }
            Ok(result) => match result? {
                Some(message) => message,
                None => {
                    logger.debug(&format!("Channel closed after {} update(s)", updates));
                    return Ok(());
                }
            },
        };

        let frame: Value = match serde_json::from_str(&message) {
            Ok(frame) => frame,
            Err(_) => continue,
        };
        match frame.get("msg_type").and_then(Value::as_str) {
            Some("data:update") => {
                let row = frame.get("value").and_then(Value::as_str).unwrap_or("");
                let update = decode_update(row, &config.fields);
                vehicle.data_mut().merge(update.clone());
                on_update(&update);
                updates += 1;
            }
            Some("data:error") => {
                let detail = frame
                    .get("value")
                    .and_then(Value::as_str)
                    .unwrap_or("streaming error");
                return Err(AurigaError::vehicle(detail));
            }
            // control:hello and unknown frames carry no data
            _ => {}
        }
    }
}

// A pushed row is "timestamp,field1,field2,..." in subscription order;
// empty columns decode to null, numeric columns to numbers
fn decode_update(row: &str, fields: &[String]) -> Value {
    let mut map = Map::new();
    let mut columns = row.split(',');

    if let Some(ts) = columns.next().and_then(|c| c.parse::<i64>().ok()) {
        map.insert("timestamp".to_string(), ts.into());
    }
    for (field, column) in fields.iter().zip(columns) {
        map.insert(field.clone(), decode_column(column));
    }
    Value::Object(map)
}

fn decode_column(column: &str) -> Value {
    if column.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = column.parse::<i64>() {
        return int.into();
    }
    if let Ok(float) = column.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(float) {
            return Value::Number(number);
        }
    }
    Value::String(column.to_string())
}
