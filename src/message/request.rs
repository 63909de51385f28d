use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

/// String-keyed map of scalar (or nested) values, used for headers and
/// consume arguments. Converted to an AMQP field table on the way out.
pub type Table = BTreeMap<String, Value>;

/// An application-level message: opaque body, declared content type and headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub headers: Table,
}

impl Message {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryFlags {
    pub mandatory: bool,
    pub immediate: bool,
    pub persistent: bool,
}

/// Optional envelope properties. Empty strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvelopeMetadata {
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub expiration: Option<String>,
    pub message_id: Option<String>,
    /// Seconds since the unix epoch. `0` means "not supplied", so the epoch
    /// instant itself cannot be sent as a timestamp.
    pub timestamp: i64,
    pub kind: Option<String>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishRequest {
    pub exchange: String,
    /// Routing key; with the default exchange this is the queue name.
    pub routing_key: String,
    pub message: Message,
    pub flags: DeliveryFlags,
    pub metadata: EnvelopeMetadata,
}

impl PublishRequest {
    pub fn new(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        message: Message,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            message,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AckMode {
    /// The broker considers a message delivered as soon as it is sent.
    Auto,
    /// The client acknowledges each message after handling it.
    #[default]
    Manual,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeFlags {
    pub exclusive: bool,
    pub no_local: bool,
    pub no_wait: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionRequest {
    pub queue: String,
    pub consumer: Option<String>,
    pub ack_mode: AckMode,
    pub flags: ConsumeFlags,
    pub arguments: Table,
}

impl SubscriptionRequest {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            ..Self::default()
        }
    }

    pub fn consumer_tag(&self) -> String {
        consumer_tag(self.consumer.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchRequest {
    pub queue: String,
    pub consumer: Option<String>,
    pub flags: ConsumeFlags,
    pub arguments: Table,
    /// How long to wait for a message, in whole seconds. Values `<= 0` mean one second.
    pub wait_secs: i64,
}

impl FetchRequest {
    pub fn new(queue: impl Into<String>, wait_secs: i64) -> Self {
        Self {
            queue: queue.into(),
            wait_secs,
            ..Self::default()
        }
    }

    pub fn wait_bound(&self) -> Duration {
        Duration::from_secs(self.wait_secs.max(1) as u64)
    }

    pub fn consumer_tag(&self) -> String {
        consumer_tag(self.consumer.as_deref())
    }
}

/// Uses the caller's consumer identity, or generates one when none was given.
fn consumer_tag(requested: Option<&str>) -> String {
    match requested {
        Some(tag) if !tag.is_empty() => tag.to_string(),
        _ => format!("amqpc-{}", Uuid::new_v4()),
    }
}
