//! Bounded single-message retrieval.
//!
//! A fetch registers a manual-ack consumer and races the first delivery
//! against the request's wait bound. The winner decides the result: a
//! delivery is acknowledged and returned, an expired bound yields `None`.

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use lapin::options::{BasicConsumeOptions, BasicQosOptions};
use tracing::debug;

use crate::message::table::to_field_table;
use crate::message::{FetchRequest, Inbound, Received};
use crate::session::{ChannelScope, Session};
use crate::utils::{AmqpError, Result};

#[derive(Debug, Clone)]
pub struct Fetcher {
    session: Arc<Session>,
}

impl Fetcher {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Waits at most `request.wait_bound()` for one message.
    ///
    /// `Ok(None)` means nothing arrived in time; it is not an error.
    pub async fn get(&self, request: &FetchRequest) -> Result<Option<Received>> {
        let scope = self.session.channel().await?;
        let outcome = get_on(&scope, request).await;
        scope.release().await;
        outcome
    }
}

async fn get_on(scope: &ChannelScope, request: &FetchRequest) -> Result<Option<Received>> {
    let channel = scope.channel();
    let consume_failed = |source| AmqpError::Consume {
        queue: request.queue.clone(),
        source,
    };

    // One unacknowledged delivery at a time, so nothing else is taken off the queue.
    channel
        .basic_qos(1, BasicQosOptions::default())
        .await
        .map_err(consume_failed)?;

    let consumer = channel
        .basic_consume(
            &request.queue,
            &request.consumer_tag(),
            BasicConsumeOptions {
                no_local: request.flags.no_local,
                no_ack: false,
                exclusive: request.flags.exclusive,
                nowait: request.flags.no_wait,
            },
            to_field_table(&request.arguments),
        )
        .await
        .map_err(consume_failed)?;

    first_delivery(consumer, &request.queue, request.wait_bound()).await
}

/// Races the first item of `deliveries` against `wait`.
pub(crate) async fn first_delivery<S, D>(
    deliveries: S,
    queue: &str,
    wait: Duration,
) -> Result<Option<Received>>
where
    S: Stream<Item = lapin::Result<D>>,
    D: Inbound,
{
    let mut deliveries = pin!(deliveries);
    match tokio::time::timeout(wait, deliveries.next()).await {
        Err(_) => {
            debug!(queue, ?wait, "No message before the wait bound");
            Ok(None)
        }
        Ok(None) => Err(AmqpError::ConsumerClosed(queue.to_string())),
        Ok(Some(Err(e))) => Err(AmqpError::Delivery(e)),
        Ok(Some(Ok(delivery))) => {
            delivery.ack().await?;
            debug!(queue, bytes = delivery.body().len(), "Fetched message");
            Ok(Some(Received::from_inbound(&delivery)))
        }
    }
}
