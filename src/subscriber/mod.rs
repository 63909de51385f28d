//! Continuous subscription.
//!
//! `listen` registers a consumer on its own channel, starts a background
//! forwarding task and returns a [`Subscription`] as soon as the consumer is
//! registered. The handle owns the channel scope for the subscription's whole
//! lifetime: the scope is released when the handle is closed, when the
//! stream ends after [`Subscription::finished`], or, for a detached
//! subscription, when the forwarding task finishes on its own.
//! [`Subscription::ended`] lets a caller wait for the broker to end the
//! stream while keeping the option to close the handle first.
//!
//! Handler failures never reach the caller of `listen`. They go to the
//! subscriber's [`ErrorSink`] and delivery continues with the next message.

mod forward;
mod handler;

use std::sync::Arc;

use futures_util::Stream;
use lapin::options::BasicConsumeOptions;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::message::table::to_field_table;
use crate::message::{AckMode, Inbound, SubscriptionRequest};
use crate::session::{ChannelScope, Session};
use crate::utils::{AmqpError, Result};

pub use forward::ForwardStats;
pub use handler::{ErrorSink, LogSink, MessageHandler, RecordingSink};

use forward::{Forwarding, forward};

#[derive(Clone)]
pub struct Subscriber {
    session: Arc<Session>,
    errors: Arc<dyn ErrorSink>,
}

impl Subscriber {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            errors: Arc::new(LogSink),
        }
    }

    /// Replaces the sink that receives handler and stream failures.
    pub fn with_error_sink(mut self, errors: Arc<dyn ErrorSink>) -> Self {
        self.errors = errors;
        self
    }

    /// Starts forwarding messages from `request.queue` to `handler`.
    ///
    /// Errors only reflect setup: opening the channel or registering the consumer.
    pub async fn listen<H: MessageHandler>(
        &self,
        request: &SubscriptionRequest,
        handler: H,
    ) -> Result<Subscription> {
        let scope = self.session.channel().await?;
        let consumer_tag = request.consumer_tag();

        let registered = scope
            .channel()
            .basic_consume(
                &request.queue,
                &consumer_tag,
                BasicConsumeOptions {
                    no_local: request.flags.no_local,
                    no_ack: request.ack_mode == AckMode::Auto,
                    exclusive: request.flags.exclusive,
                    nowait: request.flags.no_wait,
                },
                to_field_table(&request.arguments),
            )
            .await;
        let consumer = match registered {
            Ok(consumer) => consumer,
            Err(source) => {
                scope.release().await;
                return Err(AmqpError::Consume {
                    queue: request.queue.clone(),
                    source,
                });
            }
        };

        let ctx = Forwarding {
            queue: request.queue.clone(),
            handler,
            errors: self.errors.clone(),
            ack_mode: request.ack_mode,
        };
        info!(queue = %request.queue, consumer = %consumer_tag, "Subscription started");
        Ok(Subscription::spawn(consumer_tag, scope, consumer, ctx))
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// What a [`Subscription`] holds for as long as it forwards messages.
pub trait Lease: Send + 'static {
    fn release(self) -> impl Future<Output = ()> + Send;
}

impl Lease for ChannelScope {
    async fn release(self) {
        ChannelScope::release(self).await;
    }
}

/// A running subscription. Dropping it stops forwarding and drops its lease,
/// which for a [`ChannelScope`] closes the channel.
#[derive(Debug)]
pub struct Subscription<L: Lease = ChannelScope> {
    queue: String,
    consumer_tag: String,
    lease: Option<L>,
    stop: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<ForwardStats>>,
    outcome: Option<ForwardStats>,
}

impl<L: Lease> Subscription<L> {
    pub(crate) fn spawn<S, D, H>(
        consumer_tag: String,
        lease: L,
        deliveries: S,
        ctx: Forwarding<H>,
    ) -> Self
    where
        S: Stream<Item = lapin::Result<D>> + Send + 'static,
        D: Inbound,
        H: MessageHandler,
    {
        let (stop, stopped) = watch::channel(false);
        let queue = ctx.queue.clone();
        let task = tokio::spawn(forward(deliveries, ctx, stopped));
        Self {
            queue,
            consumer_tag,
            lease: Some(lease),
            stop: Some(stop),
            task: Some(task),
            outcome: None,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }

    /// Resolves once forwarding has stopped on its own, because the broker
    /// ended the stream or the stream failed. The lease is kept until the
    /// handle is closed. Cancelling this future leaves the subscription running.
    pub async fn ended(&mut self) {
        if let Some(task) = self.task.as_mut() {
            let stats = join(task, &self.queue).await;
            self.task = None;
            self.outcome = Some(stats);
        }
    }

    /// Stops forwarding, waits for the in-flight handler call, then releases the lease.
    pub async fn close(mut self) -> ForwardStats {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(true);
        }
        self.wind_down().await
    }

    /// Waits until the broker ends the stream, then releases the lease.
    pub async fn finished(mut self) -> ForwardStats {
        self.wind_down().await
    }

    /// Lets the subscription run on its own; the lease is released when
    /// the stream ends.
    pub fn detach(mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        let task = self.task.take();
        let outcome = self.outcome.take();
        let stop = self.stop.take();
        let queue = self.queue.clone();
        tokio::spawn(async move {
            let stats = match task {
                Some(mut task) => join(&mut task, &queue).await,
                None => outcome.unwrap_or_default(),
            };
            info!(queue = %queue, received = stats.received, failed = stats.failed, "Detached subscription ended");
            lease.release().await;
            drop(stop);
        });
    }

    async fn wind_down(&mut self) -> ForwardStats {
        self.ended().await;
        let stats = self.outcome.take().unwrap_or_default();
        if let Some(lease) = self.lease.take() {
            lease.release().await;
        }
        info!(queue = %self.queue, received = stats.received, failed = stats.failed, "Subscription closed");
        stats
    }
}

async fn join(task: &mut JoinHandle<ForwardStats>, queue: &str) -> ForwardStats {
    match task.await {
        Ok(stats) => stats,
        Err(e) => {
            error!(queue, error = %e, "Forwarding task failed");
            ForwardStats::default()
        }
    }
}

impl<L: Lease> Drop for Subscription<L> {
    fn drop(&mut self) {
        // Dropping the stop sender ends the loop; the lease is dropped with the handle.
        self.stop.take();
    }
}

#[cfg(test)]
mod tests;
