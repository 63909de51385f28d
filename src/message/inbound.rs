use std::borrow::Cow;
use std::future::Future;

use chrono::{DateTime, Utc};
use lapin::message::Delivery;
use lapin::options::BasicAckOptions;
use serde_json::Value;

use crate::codec;
use crate::utils::{AmqpError, Result};

/// The parts of a delivery the fetch race and the forwarding loop rely on.
pub trait Inbound: Send + Sync + 'static {
    fn body(&self) -> &[u8];

    fn content_type(&self) -> Option<&str>;

    /// Envelope timestamp in seconds since the epoch, if the publisher set one.
    fn timestamp(&self) -> Option<u64>;

    /// Acknowledges this delivery alone (never a batch).
    fn ack(&self) -> impl Future<Output = Result<()>> + Send;
}

impl Inbound for Delivery {
    fn body(&self) -> &[u8] {
        &self.data
    }

    fn content_type(&self) -> Option<&str> {
        self.properties.content_type().as_ref().map(|ct| ct.as_str())
    }

    fn timestamp(&self) -> Option<u64> {
        *self.properties.timestamp()
    }

    async fn ack(&self) -> Result<()> {
        self.acker
            .ack(BasicAckOptions { multiple: false })
            .await
            .map_err(AmqpError::Ack)
    }
}

/// A message taken off a queue by a fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Received {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Received {
    pub fn from_inbound<D: Inbound>(delivery: &D) -> Self {
        Self {
            body: delivery.body().to_vec(),
            content_type: delivery.content_type().map(str::to_string),
            timestamp: delivery
                .timestamp()
                .and_then(|secs| i64::try_from(secs).ok())
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        }
    }

    /// The body as text. Invalid UTF-8 sequences are replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Decodes the body into a document, honouring the MessagePack content type.
    pub fn document(&self) -> Result<Value> {
        codec::decode_document(self.content_type.as_deref(), &self.body)
    }
}
