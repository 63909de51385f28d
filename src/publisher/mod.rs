//! Publishing.
//!
//! A publish takes its own channel, encodes the body, builds the envelope and
//! hands it to the transport. The call returns once the transport accepted
//! the envelope; publisher confirms are not awaited.

mod envelope;

use std::sync::Arc;

use tracing::debug;

use crate::message::PublishRequest;
use crate::session::{ChannelScope, Session};
use crate::utils::{AmqpError, Result};

pub use envelope::{Envelope, PERSISTENT_DELIVERY_MODE};

#[derive(Debug, Clone)]
pub struct Publisher {
    session: Arc<Session>,
}

impl Publisher {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub async fn publish(&self, request: &PublishRequest) -> Result<()> {
        let scope = self.session.channel().await?;
        let outcome = publish_on(&scope, request).await;
        scope.release().await;
        outcome
    }
}

async fn publish_on(scope: &ChannelScope, request: &PublishRequest) -> Result<()> {
    let envelope = Envelope::build(request)?;
    scope
        .channel()
        .basic_publish(
            &request.exchange,
            &request.routing_key,
            envelope.options,
            &envelope.body,
            envelope.properties,
        )
        .await
        .map_err(|source| AmqpError::Publish {
            exchange: request.exchange.clone(),
            routing_key: request.routing_key.clone(),
            source,
        })?;
    debug!(
        exchange = %request.exchange,
        routing_key = %request.routing_key,
        bytes = envelope.body.len(),
        "Published message"
    );
    Ok(())
}
