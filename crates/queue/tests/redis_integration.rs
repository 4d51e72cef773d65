//! Redis integration tests.
//!
//! These tests require a running Redis instance.
//! Run with: `cargo test --test redis_integration -- --ignored`
//!
//! Set `REDIS_URL` environment variable to point to your Redis instance.
//! Default: <redis://localhost:6379>

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use fred::interfaces::{ClientLike, KeysInterface, ListInterface};
use jobcast_common::IdGenerator;
use jobcast_queue::{
    DeadLetterEntry, JobMessage, JobOutcome, RedisPubSub, RedisWorkQueue, WorkQueue,
    connect_client,
};

const POLL: Duration = Duration::from_secs(1);

fn get_redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

/// A queue name no other test run shares.
fn unique_queue() -> String {
    format!("jobcast_test_{}", IdGenerator::new().generate_token())
}

async fn cleanup(queue: &RedisWorkQueue) {
    let (client, _) = connect_client(&get_redis_url()).await.expect("connect");
    let keys = vec![
        queue.queue_key().to_string(),
        queue.processing_key().to_string(),
        queue.dead_letter_key().to_string(),
    ];
    let _: i64 = client.del(keys).await.expect("del");
    client.quit().await.expect("quit");
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_enqueue_deliver_ack() {
    let name = unique_queue();
    let (queue, _task) = RedisWorkQueue::connect(&get_redis_url(), &name, "c1")
        .await
        .expect("Failed to connect to Redis");

    queue
        .enqueue(&JobMessage::generate_export("task_1"))
        .await
        .expect("enqueue");
    assert_eq!(queue.len().await.unwrap(), 1);

    let delivery = queue.next_delivery(POLL).await.unwrap().expect("delivery");
    let job = JobMessage::decode(&delivery.body).unwrap();
    assert_eq!(job.task_id, "task_1");
    assert!(queue.is_empty().await.unwrap());

    queue.ack(&delivery).await.unwrap();
    assert!(queue.next_delivery(POLL).await.unwrap().is_none());

    cleanup(&queue).await;
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_requeue_increments_redeliveries() {
    let name = unique_queue();
    let (queue, _task) = RedisWorkQueue::connect(&get_redis_url(), &name, "c1")
        .await
        .expect("Failed to connect to Redis");

    queue.publish("first".to_string()).await.unwrap();
    queue.publish("second".to_string()).await.unwrap();

    let delivery = queue.next_delivery(POLL).await.unwrap().unwrap();
    assert_eq!(delivery.body, "first");
    queue.reject(&delivery, true).await.unwrap();

    let again = queue.next_delivery(POLL).await.unwrap().unwrap();
    assert_eq!(again.body, "first");
    assert_eq!(again.id, delivery.id);
    assert_eq!(again.redeliveries, 1);
    queue.ack(&again).await.unwrap();

    cleanup(&queue).await;
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_dead_letter_list() {
    let name = unique_queue();
    let url = get_redis_url();
    let (queue, _task) = RedisWorkQueue::connect(&url, &name, "c1").await.unwrap();

    queue.publish("poison".to_string()).await.unwrap();
    let delivery = queue.next_delivery(POLL).await.unwrap().unwrap();
    queue.dead_letter(&delivery, "ack refused").await.unwrap();

    let (client, _) = connect_client(&url).await.unwrap();
    let stored: Vec<String> = client
        .lrange(queue.dead_letter_key(), 0, -1)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    let entry: DeadLetterEntry = serde_json::from_str(&stored[0]).unwrap();
    assert_eq!(entry.body, "poison");
    assert_eq!(entry.last_error, "ack refused");

    let processing: usize = client.llen(queue.processing_key()).await.unwrap();
    assert_eq!(processing, 0);

    cleanup(&queue).await;
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_foreign_body_is_delivered_as_is() {
    let name = unique_queue();
    let url = get_redis_url();
    let (queue, _task) = RedisWorkQueue::connect(&url, &name, "c1").await.unwrap();

    let (client, _) = connect_client(&url).await.unwrap();
    let body = r#"{"task_id":"external","action":"generate_export"}"#;
    let _: i64 = client.lpush(queue.queue_key(), body).await.unwrap();

    let delivery = queue.next_delivery(POLL).await.unwrap().unwrap();
    assert_eq!(delivery.body, body);
    assert_eq!(delivery.redeliveries, 0);
    queue.ack(&delivery).await.unwrap();

    cleanup(&queue).await;
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_recover_in_flight() {
    let name = unique_queue();
    let url = get_redis_url();
    let (queue, _task) = RedisWorkQueue::connect(&url, &name, "c1").await.unwrap();

    queue.publish("stuck".to_string()).await.unwrap();
    let _abandoned = queue.next_delivery(POLL).await.unwrap().unwrap();

    let (restarted, _task) = RedisWorkQueue::connect(&url, &name, "c1").await.unwrap();
    assert_eq!(restarted.recover_in_flight().await.unwrap(), 1);

    let delivery = restarted.next_delivery(POLL).await.unwrap().unwrap();
    assert_eq!(delivery.body, "stuck");
    assert_eq!(delivery.redeliveries, 1);
    restarted.ack(&delivery).await.unwrap();

    cleanup(&queue).await;
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_pubsub_round_trip() {
    let url = get_redis_url();
    let channel = unique_queue();
    let (pubsub, _tasks) = RedisPubSub::new(&url, &channel)
        .await
        .expect("Failed to connect to Redis");

    let mut local = pubsub.subscribe_local();
    let _forwarder = pubsub.start().await.expect("subscribe");

    let payload = serde_json::to_string(&JobOutcome::completed("task_1", "export_1.xlsx")).unwrap();
    pubsub.publish(&channel, payload.clone()).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), local.recv())
        .await
        .expect("timed out waiting for notification")
        .unwrap();
    assert_eq!(received, payload);

    pubsub.shutdown().await.expect("Failed to shutdown");
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_pubsub_ignores_other_channels() {
    let url = get_redis_url();
    let channel = unique_queue();
    let (pubsub, _tasks) = RedisPubSub::new(&url, &channel).await.unwrap();

    let mut local = pubsub.subscribe_local();
    let _forwarder = pubsub.start().await.unwrap();

    pubsub.publish("some_other_channel", "noise".to_string()).await.unwrap();
    pubsub.publish(&channel, "signal".to_string()).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), local.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, "signal");

    pubsub.shutdown().await.unwrap();
}
