//! The `error` module defines the error type shared by every operation in `amqpc`.
//!
//! Every failure that can reach a caller is an [`AmqpError`]. Callers that
//! need to react to the category rather than the detail use [`AmqpError::kind`].

#![warn(missing_docs)]

use thiserror::Error;

/// Broad failure categories exposed at the operation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Dial-time failure. The session is unusable until started again.
    Connection,
    /// A channel could not be opened for one operation.
    Channel,
    /// The message body or envelope could not be encoded or decoded.
    Encoding,
    /// The broker rejected a consume/publish/ack exchange, or a stream broke.
    Protocol,
    /// A subscription handler reported a failure.
    Handler,
}

/// Every failure an operation can return.
#[derive(Error, Debug)]
pub enum AmqpError {
    /// The dial error, surfaced exactly as the transport produced it.
    #[error(transparent)]
    Connect(lapin::Error),

    /// The connection refused to open a channel for one operation.
    #[error("failed to open channel: {0}")]
    Channel(#[source] lapin::Error),

    /// A body declared as MessagePack was not a valid JSON document.
    #[error("malformed input document: {0}")]
    MalformedDocument(#[from] serde_json::Error),

    /// The JSON document could not be written as MessagePack.
    #[error("failed to encode message body: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// A received MessagePack body could not be read back as a document.
    #[error("failed to decode message body: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// AMQP timestamps are unsigned, so negative seconds cannot be sent.
    #[error("timestamp {0} is before the unix epoch")]
    InvalidTimestamp(i64),

    /// The broker refused to register a consumer on `queue`.
    #[error("failed to consume from queue '{queue}': {source}")]
    Consume {
        /// Queue named in the consume request.
        queue: String,
        /// Transport error returned by the broker.
        #[source]
        source: lapin::Error,
    },

    /// The broker refused a publish to `exchange` with `routing_key`.
    #[error("failed to publish to '{exchange}'/'{routing_key}': {source}")]
    Publish {
        /// Target exchange; empty for the default exchange.
        exchange: String,
        /// Routing key the message was sent with.
        routing_key: String,
        /// Transport error returned by the broker.
        #[source]
        source: lapin::Error,
    },

    /// An acknowledgement could not be sent.
    #[error("failed to acknowledge delivery: {0}")]
    Ack(#[source] lapin::Error),

    /// The consumer's delivery stream yielded an error.
    #[error("delivery stream failed: {0}")]
    Delivery(#[source] lapin::Error),

    /// The consumer stream ended before the fetch bound elapsed.
    #[error("consumer on queue '{0}' was closed before a message arrived")]
    ConsumerClosed(String),

    /// A subscription handler returned an error; carries its message.
    #[error("message handler failed: {0}")]
    Handler(String),
}

impl AmqpError {
    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AmqpError::Connect(_) => ErrorKind::Connection,
            AmqpError::Channel(_) => ErrorKind::Channel,
            AmqpError::MalformedDocument(_)
            | AmqpError::Encode(_)
            | AmqpError::Decode(_)
            | AmqpError::InvalidTimestamp(_) => ErrorKind::Encoding,
            AmqpError::Consume { .. }
            | AmqpError::Publish { .. }
            | AmqpError::Ack(_)
            | AmqpError::Delivery(_)
            | AmqpError::ConsumerClosed(_) => ErrorKind::Protocol,
            AmqpError::Handler(_) => ErrorKind::Handler,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, AmqpError>;
