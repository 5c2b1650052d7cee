//! Shared builders for integration scenarios.

use async_trait::async_trait;
use bytes::Bytes;
use ev_01_schema_validation::{SchemaRegistry, SchemaValidation};
use ev_02_event_publisher::EventPublisher;
use ev_03_dead_letter::DeadLetterRouter;
use ev_05_durable_consumer::{ConsumerConfig, DurableConsumer, TopicHandler};
use event_runtime::handlers::register_builtin_schemas;
use parking_lot::Mutex;
use serde_json::{json, Value};
use shared_bus::{InMemoryStreamBroker, StoredMessage, StreamBroker, StreamResolver};
use shared_types::{
    EventEnvelope, HandlerError, Headers, Subject, Topic, ValidationResult, HEADER_MSG_ID,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const STREAM: &str = "TEST_EVENTS";
pub const HRV_TOPIC: &str = "domain.hrv.raw-received";

pub fn hrv_topic() -> Topic {
    Topic::new(HRV_TOPIC).unwrap()
}

pub fn resolver() -> StreamResolver {
    StreamResolver::shared(STREAM)
}

/// Broker holding the shared test stream.
pub async fn broker() -> InMemoryStreamBroker {
    let broker = InMemoryStreamBroker::new();
    broker.ensure_stream(&resolver().stream_spec(STREAM)).await.unwrap();
    broker
}

pub fn schemas() -> Arc<SchemaRegistry> {
    let registry = Arc::new(SchemaRegistry::new());
    register_builtin_schemas(&registry).unwrap();
    registry
}

pub fn publisher(broker: &InMemoryStreamBroker, schemas: Arc<SchemaRegistry>) -> EventPublisher {
    EventPublisher::new(Arc::new(broker.clone()), schemas, resolver())
}

pub fn hrv_payload(rmssd: f64) -> Value {
    json!({"rmssd": rmssd, "measuredAt": "2024-05-01T06:30:00Z", "source": "chest-strap"})
}

pub fn hrv_event(id: &str, payload: Value) -> EventEnvelope {
    EventEnvelope::new(&hrv_topic(), "athlete-1", payload).with_event_id(id)
}

/// Append `event` without going through the publisher's schema gate.
pub async fn append_unchecked(broker: &InMemoryStreamBroker, event: &EventEnvelope) {
    append_raw(broker, &event.event_id, Bytes::from(event.to_bytes().unwrap())).await;
}

pub async fn append_raw(broker: &InMemoryStreamBroker, msg_id: &str, payload: Bytes) {
    let mut headers = Headers::new();
    headers.insert(HEADER_MSG_ID.into(), msg_id.into());
    broker
        .publish(&Subject::new(HRV_TOPIC), headers, payload)
        .await
        .unwrap();
}

pub fn dead_letters(broker: &InMemoryStreamBroker, reason: &str) -> Vec<StoredMessage> {
    broker.messages_for_subject(&format!("{HRV_TOPIC}.{reason}"))
}

/// What a [`ScriptedHandler`] does with each event.
#[derive(Debug, Clone)]
pub enum Script {
    Succeed,
    /// Fail with a transient error on the first `n` attempts of every event.
    FailTransientTimes(u32),
    AlwaysTransient,
    Permanent,
    /// Succeed after holding the slot for the given time.
    Slow(Duration),
}

/// Schema-backed handler following a [`Script`], with call accounting.
pub struct ScriptedHandler {
    topic: Topic,
    schemas: Arc<SchemaRegistry>,
    script: Script,
    attempts: Mutex<HashMap<String, u32>>,
    succeeded: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedHandler {
    pub fn new(schemas: Arc<SchemaRegistry>, script: Script) -> Arc<Self> {
        Arc::new(Self {
            topic: hrv_topic(),
            schemas,
            script,
            attempts: Mutex::new(HashMap::new()),
            succeeded: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    /// Total `process` calls.
    pub fn calls(&self) -> u32 {
        self.attempts.lock().values().sum()
    }

    pub fn attempts(&self, event_id: &str) -> u32 {
        self.attempts.lock().get(event_id).copied().unwrap_or(0)
    }

    pub fn succeeded(&self) -> Vec<String> {
        self.succeeded.lock().clone()
    }

    /// Highest number of overlapping `process` calls observed.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TopicHandler for ScriptedHandler {
    fn topic(&self) -> &Topic {
        &self.topic
    }

    fn validate(&self, payload: &Value) -> ValidationResult {
        self.schemas.validate(self.topic.as_str(), payload)
    }

    async fn process(&self, event: &EventEnvelope) -> Result<(), HandlerError> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            let entry = attempts.entry(event.event_id.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let result = match &self.script {
            Script::Succeed => Ok(()),
            Script::FailTransientTimes(n) if attempt <= *n => {
                Err(HandlerError::TransientIo("upstream timed out".into()))
            }
            Script::FailTransientTimes(_) => Ok(()),
            Script::AlwaysTransient => Err(HandlerError::TransientIo("connection reset".into())),
            Script::Permanent => Err(HandlerError::PermanentBusiness("athlete unknown".into())),
            Script::Slow(hold) => {
                tokio::time::sleep(*hold).await;
                Ok(())
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        if result.is_ok() {
            self.succeeded.lock().push(event.event_id.clone());
        }
        result
    }
}

/// A bound, running consumer and the means to stop it.
pub struct RunningConsumer {
    pub consumer: Arc<DurableConsumer>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RunningConsumer {
    pub async fn start(
        broker: &InMemoryStreamBroker,
        handler: Arc<ScriptedHandler>,
        config: ConsumerConfig,
    ) -> Self {
        let shared: Arc<dyn StreamBroker> = Arc::new(broker.clone());
        let router = Arc::new(DeadLetterRouter::new(
            Arc::clone(&shared),
            config.dlq_subject_prefix.clone(),
        ));
        let consumer =
            Arc::new(DurableConsumer::new(handler, shared, resolver(), router, config).unwrap());
        let stream = consumer.bind().await.unwrap();
        let (shutdown, rx) = watch::channel(false);
        let task = consumer.spawn(stream, rx).unwrap();
        Self {
            consumer,
            shutdown,
            task,
        }
    }

    pub async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.task.await.unwrap();
    }
}

/// Consumer settings with fast idle polling.
pub fn consumer_config() -> ConsumerConfig {
    ConsumerConfig {
        idle_backoff: Duration::from_millis(100),
        ..ConsumerConfig::default()
    }
}

/// Poll `condition` on tokio time until it holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached");
}
