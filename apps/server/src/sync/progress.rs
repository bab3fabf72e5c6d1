//! Job progress pub/sub
//!
//! Real-time job events over Redis pub/sub for multi-instance
//! deployments, with an in-memory fallback for single-instance mode.
//! Publishing is best-effort: a lost event never affects job state.

use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use serde::{Deserialize, Serialize};

use crate::models::{CompletionSummary, JobStatus};

/// Channel capacity for broadcast channels
const BROADCAST_CAPACITY: usize = 256;

/// Redis channel prefix; the full channel is `ratings:job:{job_id}`.
const CHANNEL_PREFIX: &str = "ratings:job:";

/// Event published while a job runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// One more item finished, whatever its outcome.
    Progress {
        current: i32,
        total: i32,
        message: String,
    },
    /// The job moved to a new status.
    StatusChanged { status: JobStatus },
    /// The job reached a terminal status; final counters attached.
    Completed { summary: CompletionSummary },
    /// The job failed as a whole (store write error, not an item failure).
    Error { message: String },
}

/// Job event pub/sub with Redis + in-memory fallback
#[derive(Clone)]
pub struct JobPubSub {
    inner: Arc<JobPubSubInner>,
}

enum JobPubSubInner {
    Redis(RedisPubSub),
    InMemory(InMemoryPubSub),
}

impl JobPubSub {
    /// Create a new pub/sub system backed by Redis
    pub fn new_with_redis(client: redis::Client) -> Self {
        Self {
            inner: Arc::new(JobPubSubInner::Redis(RedisPubSub::new(client))),
        }
    }

    /// Create a new in-memory pub/sub system (single instance mode)
    pub fn new_in_memory() -> Self {
        Self {
            inner: Arc::new(JobPubSubInner::InMemory(InMemoryPubSub::new())),
        }
    }

    /// Try to create with Redis, fall back to in-memory
    pub async fn try_with_redis(redis_url: &str) -> Self {
        match redis::Client::open(redis_url) {
            Ok(client) => match client.get_multiplexed_async_connection().await {
                Ok(mut conn) => {
                    let pong: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
                    if pong.is_ok() {
                        tracing::info!("Redis pub/sub connected for job events");
                        return Self::new_with_redis(client);
                    }
                    tracing::warn!("Redis ping failed for job event pub/sub");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Redis pub/sub connection failed");
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Redis client creation failed for pub/sub");
            }
        }

        tracing::warn!("Using in-memory job event pub/sub (single instance mode only)");
        Self::new_in_memory()
    }

    /// Publish an event for a job. Never fails; errors are logged.
    pub async fn publish(&self, job_id: Uuid, event: JobEvent) {
        match &*self.inner {
            JobPubSubInner::Redis(redis) => redis.publish(job_id, event).await,
            JobPubSubInner::InMemory(memory) => memory.publish(job_id, event),
        }
    }

    /// Subscribe to events for a specific job
    pub async fn subscribe(&self, job_id: Uuid) -> broadcast::Receiver<JobEvent> {
        match &*self.inner {
            JobPubSubInner::Redis(redis) => redis.subscribe(job_id).await,
            JobPubSubInner::InMemory(memory) => memory.subscribe(job_id),
        }
    }

    /// Check if we're using Redis (multi-instance capable)
    pub fn is_redis_backed(&self) -> bool {
        matches!(&*self.inner, JobPubSubInner::Redis(_))
    }

    pub async fn publish_progress(&self, job_id: Uuid, current: i32, total: i32, message: String) {
        self.publish(
            job_id,
            JobEvent::Progress {
                current,
                total,
                message,
            },
        )
        .await;
    }

    pub async fn publish_status(&self, job_id: Uuid, status: JobStatus) {
        self.publish(job_id, JobEvent::StatusChanged { status })
            .await;
    }

    pub async fn publish_completion(&self, job_id: Uuid, summary: CompletionSummary) {
        self.publish(job_id, JobEvent::Completed { summary }).await;
    }

    pub async fn publish_error(&self, job_id: Uuid, message: String) {
        self.publish(job_id, JobEvent::Error { message }).await;
    }
}

/// Redis-backed pub/sub implementation
struct RedisPubSub {
    client: redis::Client,
    /// Local broadcast for redistribution to local subscribers
    local_sender: broadcast::Sender<(Uuid, JobEvent)>,
}

impl RedisPubSub {
    fn new(client: redis::Client) -> Self {
        let (local_sender, _) = broadcast::channel(BROADCAST_CAPACITY);

        let pubsub = Self {
            client,
            local_sender,
        };

        pubsub.start_listener();

        pubsub
    }

    fn start_listener(&self) {
        let client = self.client.clone();
        let sender = self.local_sender.clone();

        tokio::spawn(async move {
            const MAX_RECONNECT_DELAY_SECS: u64 = 60;
            const MAX_RECONNECT_ATTEMPTS: u32 = 100;

            let mut attempts = 0u32;
            let mut delay_secs = 1u64;

            loop {
                match Self::run_listener(&client, &sender).await {
                    Ok(()) => {
                        tracing::warn!("Redis pub/sub listener disconnected, reconnecting...");
                        attempts = 0;
                        delay_secs = 1;
                    }
                    Err(e) => {
                        attempts += 1;
                        if attempts >= MAX_RECONNECT_ATTEMPTS {
                            tracing::error!(
                                "Redis pub/sub max reconnect attempts ({}) exceeded, giving up",
                                MAX_RECONNECT_ATTEMPTS
                            );
                            break;
                        }
                        tracing::error!(
                            error = %e,
                            attempt = attempts,
                            delay_secs = delay_secs,
                            "Redis pub/sub listener error, reconnecting..."
                        );
                    }
                }

                tokio::time::sleep(tokio::time::Duration::from_secs(delay_secs)).await;
                delay_secs = (delay_secs * 2).min(MAX_RECONNECT_DELAY_SECS);
            }
        });
    }

    async fn run_listener(
        client: &redis::Client,
        sender: &broadcast::Sender<(Uuid, JobEvent)>,
    ) -> Result<(), redis::RedisError> {
        use futures_util::StreamExt;

        let conn = client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();

        pubsub.psubscribe(format!("{}*", CHANNEL_PREFIX)).await?;

        let mut stream = pubsub.on_message();

        while let Some(msg) = stream.next().await {
            let channel: String = msg.get_channel_name().to_string();
            let payload: Vec<u8> = msg.get_payload_bytes().to_vec();

            if let Some(job_id_str) = channel.strip_prefix(CHANNEL_PREFIX) {
                if let Ok(job_id) = Uuid::parse_str(job_id_str) {
                    if let Ok(payload_str) = String::from_utf8(payload) {
                        if let Ok(event) = serde_json::from_str::<JobEvent>(&payload_str) {
                            let _ = sender.send((job_id, event));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn publish(&self, job_id: Uuid, event: JobEvent) {
        let channel = format!("{}{}", CHANNEL_PREFIX, job_id);

        match serde_json::to_string(&event) {
            Ok(payload) => match self.client.get_multiplexed_async_connection().await {
                Ok(mut conn) => {
                    let result: Result<(), _> = redis::cmd("PUBLISH")
                        .arg(&channel)
                        .arg(&payload)
                        .query_async(&mut conn)
                        .await;

                    if let Err(e) = result {
                        tracing::error!(error = %e, "Failed to publish job event to Redis");
                        // Fall back to local broadcast
                        let _ = self.local_sender.send((job_id, event));
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to get Redis connection for publish");
                    let _ = self.local_sender.send((job_id, event));
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize job event");
            }
        }
    }

    async fn subscribe(&self, job_id: Uuid) -> broadcast::Receiver<JobEvent> {
        // Filtered receiver that only sees this job's events
        let (tx, rx) = broadcast::channel(BROADCAST_CAPACITY);
        let mut global_rx = self.local_sender.subscribe();

        tokio::spawn(async move {
            while let Ok((event_job_id, event)) = global_rx.recv().await {
                if event_job_id == job_id && tx.send(event).is_err() {
                    // No more receivers, stop filtering
                    break;
                }
            }
        });

        rx
    }
}

/// In-memory pub/sub implementation for single-instance mode
struct InMemoryPubSub {
    /// Per-job broadcast channels
    channels: dashmap::DashMap<Uuid, broadcast::Sender<JobEvent>>,
}

impl InMemoryPubSub {
    fn new() -> Self {
        Self {
            channels: dashmap::DashMap::new(),
        }
    }

    fn publish(&self, job_id: Uuid, event: JobEvent) {
        // The stream ends with a Completed or Error event; subscribers
        // still drain anything buffered after the sender is dropped.
        let stream_over = matches!(event, JobEvent::Completed { .. } | JobEvent::Error { .. });

        let orphaned = match self.channels.get(&job_id) {
            // A send error means every receiver is gone.
            Some(sender) => sender.send(event).is_err(),
            None => false,
        };

        if stream_over || orphaned {
            self.channels.remove(&job_id);
        }
    }

    fn subscribe(&self, job_id: Uuid) -> broadcast::Receiver<JobEvent> {
        let sender = self
            .channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0);
        sender.subscribe()
    }

    #[cfg(test)]
    fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
