use lapin::BasicProperties;
use lapin::options::BasicPublishOptions;
use lapin::types::ShortString;

use crate::codec;
use crate::message::PublishRequest;
use crate::message::table::to_field_table;
use crate::utils::{AmqpError, Result};

/// AMQP delivery mode asking the broker to persist the message.
pub const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Everything handed to the transport for one publish.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub body: Vec<u8>,
    pub properties: BasicProperties,
    pub options: BasicPublishOptions,
}

impl Envelope {
    pub fn build(request: &PublishRequest) -> Result<Self> {
        let message = &request.message;
        let content_type = message.content_type.as_deref();
        let body = codec::encode_body(content_type, &message.body)?;

        let mut properties = BasicProperties::default();
        if !message.headers.is_empty() {
            properties = properties.with_headers(to_field_table(&message.headers));
        }
        if let Some(ct) = non_empty(&message.content_type) {
            properties = properties.with_content_type(ct);
        }
        if request.flags.persistent {
            properties = properties.with_delivery_mode(PERSISTENT_DELIVERY_MODE);
        }

        let meta = &request.metadata;
        // Zero means the caller did not supply a timestamp.
        match meta.timestamp {
            0 => {}
            secs if secs < 0 => return Err(AmqpError::InvalidTimestamp(secs)),
            secs => properties = properties.with_timestamp(secs as u64),
        }
        if let Some(v) = non_empty(&meta.correlation_id) {
            properties = properties.with_correlation_id(v);
        }
        if let Some(v) = non_empty(&meta.reply_to) {
            properties = properties.with_reply_to(v);
        }
        if let Some(v) = non_empty(&meta.expiration) {
            properties = properties.with_expiration(v);
        }
        if let Some(v) = non_empty(&meta.message_id) {
            properties = properties.with_message_id(v);
        }
        if let Some(v) = non_empty(&meta.kind) {
            properties = properties.with_kind(v);
        }
        if let Some(v) = non_empty(&meta.user_id) {
            properties = properties.with_user_id(v);
        }
        if let Some(v) = non_empty(&meta.app_id) {
            properties = properties.with_app_id(v);
        }

        Ok(Self {
            body,
            properties,
            options: BasicPublishOptions {
                mandatory: request.flags.mandatory,
                immediate: request.flags.immediate,
            },
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<ShortString> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .map(ShortString::from)
}
