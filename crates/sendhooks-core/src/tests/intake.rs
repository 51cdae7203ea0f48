//! Intake read loop: decoding, polling and shutdown.

use super::harness::MemoryQueue;
use crate::config::DeliveryConfig;
use crate::error::{IntakeError, QueueError};
use crate::event_sink::{EventLevel, RecordingEventSink};
use crate::intake::IntakePipeline;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn intake(queue: Arc<MemoryQueue>, sink: Arc<RecordingEventSink>) -> IntakePipeline {
    IntakePipeline::new(queue, sink, &DeliveryConfig::default())
}

#[tokio::test]
async fn decoded_payload_carries_entry_id() {
    let queue = MemoryQueue::new();
    let id = queue.push_payload("http://a.test/hook", "wh_1");
    let cancel = CancellationToken::new();
    queue.cancel_when_drained(cancel.clone());
    let (tx, mut rx) = mpsc::channel(4);

    intake(queue.clone(), Arc::new(RecordingEventSink::new()))
        .run(tx, cancel)
        .await
        .unwrap();

    let payload = rx.recv().await.unwrap();
    assert_eq!(payload.message_id, id);
    assert_eq!(payload.webhook_id, "wh_1");
    assert_eq!(payload.url, "http://a.test/hook");
    assert_eq!(queue.acked(), vec![id]);
}

#[tokio::test]
async fn malformed_entry_stops_intake_unacknowledged() {
    let queue = MemoryQueue::new();
    let good = queue.push_payload("http://a.test/hook", "wh_good");
    let bad = queue.push_raw(Some("{not json".into()));
    queue.push_payload("http://a.test/hook", "wh_after");
    let sink = Arc::new(RecordingEventSink::new());
    let (tx, mut rx) = mpsc::channel(4);

    let err = intake(queue.clone(), sink.clone())
        .run(tx, CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        IntakeError::Decode { entry_id, .. } => assert_eq!(entry_id, bad),
        other => panic!("expected decode error, got {other:?}"),
    }
    assert_eq!(queue.acked(), vec![good]);
    assert_eq!(rx.recv().await.unwrap().webhook_id, "wh_good");
    assert!(rx.recv().await.is_none());
    assert_eq!(sink.count(EventLevel::Error), 1);
}

#[tokio::test]
async fn missing_data_field_is_a_decode_error() {
    let queue = MemoryQueue::new();
    let id = queue.push_raw(None);
    let sink = Arc::new(RecordingEventSink::new());
    let (tx, _rx) = mpsc::channel(4);

    let err = intake(queue.clone(), sink.clone())
        .run(tx, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IntakeError::Decode { ref entry_id, ref reason }
            if *entry_id == id && reason.contains("'data'")
    ));
    assert!(queue.acked().is_empty());
}

#[tokio::test]
async fn empty_url_is_rejected() {
    let queue = MemoryQueue::new();
    queue.push_raw(Some(r#"{"url":"","webhookId":"wh_1","data":{}}"#.into()));
    let (tx, _rx) = mpsc::channel(4);

    let err = intake(queue, Arc::new(RecordingEventSink::new()))
        .run(tx, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, IntakeError::InvalidPayload { .. }));
}

#[tokio::test]
async fn read_failure_is_returned() {
    let queue = MemoryQueue::new();
    queue.fail_next_read("connection reset by peer");
    let sink = Arc::new(RecordingEventSink::new());
    let (tx, _rx) = mpsc::channel(4);

    let err = intake(queue, sink.clone())
        .run(tx, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, IntakeError::Queue(QueueError::Connection(_))));
    let errors = sink.messages(EventLevel::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("error reading from queue"));
}

#[tokio::test(start_paused = true)]
async fn idle_stream_polls_until_cancelled() {
    let queue = MemoryQueue::new();
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel(4);

    let task = {
        let queue = queue.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            intake(queue, Arc::new(RecordingEventSink::new()))
                .run(tx, cancel)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    queue.push_payload("http://late.test/hook", "wh_late");
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(rx.recv().await.unwrap().webhook_id, "wh_late");
    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn cancelled_before_start_reads_nothing() {
    let queue = MemoryQueue::new();
    queue.push_payload("http://a.test/hook", "wh_1");
    let cancel = CancellationToken::new();
    cancel.cancel();
    let (tx, _rx) = mpsc::channel(4);

    intake(queue.clone(), Arc::new(RecordingEventSink::new()))
        .run(tx, cancel)
        .await
        .unwrap();

    assert_eq!(queue.pending_len(), 1);
}
