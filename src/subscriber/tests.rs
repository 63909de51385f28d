use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::channel::mpsc;
use futures::stream;
use tokio::sync::watch;

use super::forward::{ForwardStats, Forwarding, forward};
use super::handler::{ErrorSink, LogSink, MessageHandler, RecordingSink};
use super::{Lease, Subscription};
use crate::message::{AckMode, Inbound};
use crate::utils::{AmqpError, Result};

struct FakeDelivery {
    body: Vec<u8>,
    acks: Arc<AtomicUsize>,
}

impl Inbound for FakeDelivery {
    fn body(&self) -> &[u8] {
        &self.body
    }

    fn content_type(&self) -> Option<&str> {
        None
    }

    fn timestamp(&self) -> Option<u64> {
        None
    }

    async fn ack(&self) -> Result<()> {
        self.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn deliveries(bodies: &[&str], acks: &Arc<AtomicUsize>) -> Vec<lapin::Result<FakeDelivery>> {
    bodies
        .iter()
        .map(|body| {
            Ok(FakeDelivery {
                body: body.as_bytes().to_vec(),
                acks: acks.clone(),
            })
        })
        .collect()
}

fn context<H>(handler: H, sink: &Arc<RecordingSink>, ack_mode: AckMode) -> Forwarding<H> {
    Forwarding {
        queue: "q1".to_string(),
        handler,
        errors: sink.clone(),
        ack_mode,
    }
}

/// Counts how a [`FakeLease`] ended: released through the handle, or just dropped.
#[derive(Debug, Default)]
struct LeaseLog {
    released: AtomicUsize,
    dropped: AtomicUsize,
}

impl LeaseLog {
    fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct FakeLease {
    log: Arc<LeaseLog>,
}

impl Lease for FakeLease {
    async fn release(self) {
        self.log.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for FakeLease {
    fn drop(&mut self) {
        self.log.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

type Feed = mpsc::UnboundedSender<lapin::Result<FakeDelivery>>;

/// Starts a subscription over a feed the test controls, recording every body
/// the handler sees.
fn subscribe(
    log: &Arc<LeaseLog>,
    seen: &Arc<Mutex<Vec<String>>>,
) -> (Subscription<FakeLease>, Feed) {
    let (feed, deliveries) = mpsc::unbounded();
    let recorder = seen.clone();
    let handler = move |body: String| {
        recorder.lock().unwrap().push(body);
        Ok::<(), String>(())
    };
    let subscription = Subscription::spawn(
        "amqpc-test".to_string(),
        FakeLease { log: log.clone() },
        deliveries,
        context(handler, &Arc::new(RecordingSink::new()), AckMode::Manual),
    );
    (subscription, feed)
}

fn send(feed: &Feed, bodies: &[&str], acks: &Arc<AtomicUsize>) {
    for delivery in deliveries(bodies, acks) {
        feed.unbounded_send(delivery).unwrap();
    }
}

async fn settle(done: impl Fn() -> bool) -> bool {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

#[tokio::test]
async fn handler_sees_messages_in_order_even_after_a_failure() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let acks = Arc::new(AtomicUsize::new(0));
    let sink = Arc::new(RecordingSink::new());

    let recorder = seen.clone();
    let handler = move |body: String| {
        recorder.lock().unwrap().push(body.clone());
        if body == "M1" {
            Err("cannot handle M1")
        } else {
            Ok(())
        }
    };

    let (_stop, stopped) = watch::channel(false);
    let stats = forward(
        stream::iter(deliveries(&["M1", "M2", "M3"], &acks)),
        context(handler, &sink, AckMode::Manual),
        stopped,
    )
    .await;

    assert_eq!(*seen.lock().unwrap(), vec!["M1", "M2", "M3"]);
    assert_eq!(
        stats,
        ForwardStats {
            received: 3,
            failed: 1
        }
    );
    assert_eq!(sink.len(), 1);
    assert!(sink.last().unwrap().contains("cannot handle M1"));
    // The failed message stays unacknowledged.
    assert_eq!(acks.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn auto_ack_mode_never_acknowledges() {
    let acks = Arc::new(AtomicUsize::new(0));
    let sink = Arc::new(RecordingSink::new());
    let (_stop, stopped) = watch::channel(false);

    let stats = forward(
        stream::iter(deliveries(&["a", "b"], &acks)),
        context(|_: String| Ok::<(), String>(()), &sink, AckMode::Auto),
        stopped,
    )
    .await;

    assert_eq!(stats.received, 2);
    assert_eq!(acks.load(Ordering::SeqCst), 0);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn every_handler_failure_is_reported() {
    let acks = Arc::new(AtomicUsize::new(0));
    let sink = Arc::new(RecordingSink::new());
    let (_stop, stopped) = watch::channel(false);

    let stats = forward(
        stream::iter(deliveries(&["x", "y", "z"], &acks)),
        context(
            |body: String| Err::<(), String>(format!("bad {body}")),
            &sink,
            AckMode::Manual,
        ),
        stopped,
    )
    .await;

    assert_eq!(stats.failed, 3);
    assert_eq!(
        sink.errors(),
        vec![
            "q1: message handler failed: bad x",
            "q1: message handler failed: bad y",
            "q1: message handler failed: bad z",
        ]
    );
    assert_eq!(sink.last().as_deref(), Some("q1: message handler failed: bad z"));
}

#[tokio::test]
async fn stop_signal_ends_an_idle_loop() {
    let sink = Arc::new(RecordingSink::new());
    let (stop, stopped) = watch::channel(false);

    let task = tokio::spawn(forward(
        stream::pending::<lapin::Result<FakeDelivery>>(),
        context(|_: String| Ok::<(), String>(()), &sink, AckMode::Manual),
        stopped,
    ));

    stop.send(true).unwrap();
    let stats = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("loop stopped")
        .unwrap();
    assert_eq!(stats, ForwardStats::default());
}

#[tokio::test]
async fn dropped_stop_sender_ends_the_loop() {
    let sink = Arc::new(RecordingSink::new());
    let (stop, stopped) = watch::channel(false);
    drop(stop);

    let stats = forward(
        stream::pending::<lapin::Result<FakeDelivery>>(),
        context(|_: String| Ok::<(), String>(()), &sink, AckMode::Manual),
        stopped,
    )
    .await;
    assert_eq!(stats.received, 0);
}

#[tokio::test]
async fn finished_releases_the_lease_once_the_stream_ends() {
    let log = Arc::new(LeaseLog::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let acks = Arc::new(AtomicUsize::new(0));
    let (subscription, feed) = subscribe(&log, &seen);
    assert_eq!(subscription.queue(), "q1");
    assert_eq!(subscription.consumer_tag(), "amqpc-test");

    send(&feed, &["M1", "M2"], &acks);
    drop(feed);

    let stats = tokio::time::timeout(Duration::from_secs(5), subscription.finished())
        .await
        .expect("finished after the stream ended");
    assert_eq!(stats.received, 2);
    assert_eq!(*seen.lock().unwrap(), vec!["M1", "M2"]);
    assert_eq!(acks.load(Ordering::SeqCst), 2);
    assert_eq!(log.released(), 1);
    assert_eq!(log.dropped(), 1);
}

#[tokio::test]
async fn ended_keeps_the_lease_until_close() {
    let log = Arc::new(LeaseLog::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let acks = Arc::new(AtomicUsize::new(0));
    let (mut subscription, feed) = subscribe(&log, &seen);
    assert!(!subscription.is_finished());

    send(&feed, &["M1"], &acks);
    drop(feed);

    tokio::time::timeout(Duration::from_secs(5), subscription.ended())
        .await
        .expect("ended after the stream ended");
    assert!(subscription.is_finished());
    assert_eq!(log.released(), 0);

    // A second wait returns at once.
    subscription.ended().await;

    let stats = subscription.close().await;
    assert_eq!(stats.received, 1);
    assert_eq!(log.released(), 1);
}

#[tokio::test(start_paused = true)]
async fn ended_stays_pending_while_the_stream_is_open() {
    let log = Arc::new(LeaseLog::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (mut subscription, feed) = subscribe(&log, &seen);

    let waited = tokio::time::timeout(Duration::from_secs(30), subscription.ended()).await;
    assert!(waited.is_err());
    assert!(!subscription.is_finished());

    // Giving up on the wait leaves forwarding untouched.
    let acks = Arc::new(AtomicUsize::new(0));
    send(&feed, &["late"], &acks);
    assert!(settle(|| seen.lock().unwrap().len() == 1).await);

    let stats = subscription.close().await;
    assert_eq!(stats.received, 1);
    assert_eq!(log.released(), 1);
    assert!(feed.is_closed());
}

#[tokio::test]
async fn detach_releases_the_lease_when_the_stream_ends() {
    let log = Arc::new(LeaseLog::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let acks = Arc::new(AtomicUsize::new(0));
    let (subscription, feed) = subscribe(&log, &seen);

    subscription.detach();
    send(&feed, &["M1", "M2"], &acks);
    assert!(settle(|| seen.lock().unwrap().len() == 2).await);
    assert_eq!(log.released(), 0);

    drop(feed);
    assert!(settle(|| log.released() == 1).await);
    assert_eq!(log.dropped(), 1);
    assert_eq!(*seen.lock().unwrap(), vec!["M1", "M2"]);
}

#[tokio::test]
async fn dropping_the_handle_stops_forwarding() {
    let log = Arc::new(LeaseLog::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let acks = Arc::new(AtomicUsize::new(0));
    let (subscription, feed) = subscribe(&log, &seen);

    send(&feed, &["M1"], &acks);
    assert!(settle(|| seen.lock().unwrap().len() == 1).await);

    drop(subscription);
    assert_eq!(log.dropped(), 1);
    assert_eq!(log.released(), 0);

    let _ = feed.unbounded_send(deliveries(&["M2"], &acks).remove(0));
    // The loop drops its end of the feed once it has stopped.
    assert!(settle(|| feed.is_closed()).await);
    assert_eq!(*seen.lock().unwrap(), vec!["M1"]);
}

#[tokio::test]
async fn close_stops_an_open_stream_and_releases_once() {
    let log = Arc::new(LeaseLog::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (subscription, feed) = subscribe(&log, &seen);

    let stats = tokio::time::timeout(Duration::from_secs(5), subscription.close())
        .await
        .expect("close returned");
    assert_eq!(stats, ForwardStats::default());
    assert!(feed.is_closed());
    assert_eq!(log.released(), 1);
    assert_eq!(log.dropped(), 1);
}

#[test]
fn closures_are_message_handlers() {
    let handler = |body: String| {
        if body.is_empty() {
            Err("empty body")
        } else {
            Ok(())
        }
    };
    assert_eq!(handler.handle("x".to_string()), Ok(()));
    assert_eq!(handler.handle(String::new()), Err("empty body".to_string()));
}

#[test]
fn log_sink_accepts_reports() {
    LogSink.report("q1", &AmqpError::Handler("boom".to_string()));
}
