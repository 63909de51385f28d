use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info};

use super::handler::{ErrorSink, MessageHandler};
use crate::message::{AckMode, Inbound};
use crate::utils::AmqpError;

/// Counters reported when a forwarding loop ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ForwardStats {
    pub received: u64,
    pub failed: u64,
}

pub(crate) struct Forwarding<H> {
    pub queue: String,
    pub handler: H,
    pub errors: Arc<dyn ErrorSink>,
    pub ack_mode: AckMode,
}

/// Hands every delivery to the handler, in stream order, until the stream
/// ends or `stop` fires. A stop sender that goes away counts as a stop.
pub(crate) async fn forward<S, D, H>(
    deliveries: S,
    ctx: Forwarding<H>,
    mut stop: watch::Receiver<bool>,
) -> ForwardStats
where
    S: Stream<Item = lapin::Result<D>>,
    D: Inbound,
    H: MessageHandler,
{
    let mut deliveries = std::pin::pin!(deliveries);
    let mut stats = ForwardStats::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = stop.changed() => {
                debug!(queue = %ctx.queue, "Forwarding stopped");
                break;
            }
            next = deliveries.next() => next,
        };

        let delivery = match next {
            Some(Ok(delivery)) => delivery,
            Some(Err(e)) => {
                ctx.errors.report(&ctx.queue, &AmqpError::Delivery(e));
                break;
            }
            None => {
                info!(queue = %ctx.queue, "Delivery stream ended");
                break;
            }
        };

        stats.received += 1;
        let body = String::from_utf8_lossy(delivery.body()).into_owned();
        match ctx.handler.handle(body) {
            Ok(()) => {
                if ctx.ack_mode == AckMode::Manual {
                    if let Err(e) = delivery.ack().await {
                        ctx.errors.report(&ctx.queue, &e);
                    }
                }
            }
            Err(message) => {
                // Left unacked in manual mode; the broker requeues it on channel close.
                stats.failed += 1;
                ctx.errors.report(&ctx.queue, &AmqpError::Handler(message));
            }
        }
    }

    stats
}
