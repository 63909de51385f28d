//! # amqpc
//!
//! `amqpc` is the session-oriented core of an AMQP 0-9-1 client. Over a
//! single broker connection it offers three exchanges: publish a message
//! once, subscribe continuously, and fetch one message with a timeout.
//!
//! ## Core Modules
//!
//! - `session`: owns the broker connection and hands out per-operation channel scopes.
//! - `codec`: turns a body plus declared content type into wire bytes (MessagePack re-encoding).
//! - `message`: messages, request types and the received view of a delivery.
//! - `publisher`: builds envelopes and submits them.
//! - `subscriber`: runs a background forwarding loop behind a `Subscription` handle.
//! - `fetcher`: waits for at most one message and acknowledges it.
//! - `config`: loads client settings from files and the environment.
//! - `utils`: the shared error type and logging setup.
//!
//! Sessions and components are plain values: build a [`Session`], wrap it in
//! an `Arc`, and pass it to whichever component needs it.

pub mod codec;
pub mod config;
pub mod fetcher;
pub mod message;
pub mod publisher;
pub mod session;
pub mod subscriber;
pub mod utils;

pub use fetcher::Fetcher;
pub use message::{
    AckMode, ConsumeFlags, DeliveryFlags, EnvelopeMetadata, FetchRequest, Message,
    PublishRequest, Received, SubscriptionRequest,
};
pub use publisher::Publisher;
pub use session::{ChannelScope, Session};
pub use subscriber::{Subscriber, Subscription};
pub use utils::{AmqpError, ErrorKind, Result};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
