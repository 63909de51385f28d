//! The `message` module holds the data model shared by the publish, listen
//! and fetch paths: outgoing messages and their requests, the received view
//! of a delivery, and the conversion of JSON-shaped maps into AMQP tables.

pub mod inbound;
pub mod request;
pub mod table;

pub use inbound::{Inbound, Received};
pub use request::{
    AckMode, ConsumeFlags, DeliveryFlags, EnvelopeMetadata, FetchRequest, Message,
    PublishRequest, SubscriptionRequest, Table,
};
