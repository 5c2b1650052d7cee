//! # Per-topic Concurrency
//!
//! With `max_concurrent = N` and a handler that holds its slot, at most N
//! handlers overlap. What happens to the rest depends on the saturation
//! policy.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::*;
    use ev_02_event_publisher::EventPublishing;
    use ev_04_concurrency_governor::{GovernorConfig, SaturationPolicy};
    use ev_05_durable_consumer::ConsumerConfig;
    use shared_bus::InMemoryStreamBroker;
    use std::time::Duration;

    const EVENTS: usize = 5;

    async fn seed(broker: &InMemoryStreamBroker) {
        let publisher = publisher(broker, schemas());
        for i in 0..EVENTS {
            publisher
                .publish(&hrv_topic(), &hrv_event(&format!("evt-{i}"), hrv_payload(40.0 + i as f64)))
                .await
                .unwrap();
        }
    }

    fn limited(max_concurrent: usize, saturation: SaturationPolicy) -> ConsumerConfig {
        ConsumerConfig {
            batch: 10,
            governor: GovernorConfig {
                max_concurrent,
                enable_concurrency_control: true,
                saturation,
            },
            ..consumer_config()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_bounds_overlap_and_processes_everything() {
        let broker = broker().await;
        seed(&broker).await;
        let handler = ScriptedHandler::new(schemas(), Script::Slow(Duration::from_secs(1)));

        let running =
            RunningConsumer::start(&broker, handler.clone(), limited(2, SaturationPolicy::Block)).await;
        wait_until(|| running.consumer.stats().snapshot().acked == EVENTS as u64).await;

        assert_eq!(handler.succeeded().len(), EVENTS);
        assert!(handler.max_active() <= 2);
        assert_eq!(handler.max_active(), 2);
        assert!(running.consumer.governor().peak_in_flight() <= 2);
        assert_eq!(running.consumer.stats().snapshot().dropped, 0);

        running.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shed_drops_overflow() {
        let broker = broker().await;
        seed(&broker).await;
        let handler = ScriptedHandler::new(schemas(), Script::Slow(Duration::from_secs(1)));

        let running =
            RunningConsumer::start(&broker, handler.clone(), limited(2, SaturationPolicy::Shed)).await;
        wait_until(|| {
            let stats = running.consumer.stats().snapshot();
            stats.acked + stats.dropped == EVENTS as u64
        })
        .await;

        let stats = running.consumer.stats().snapshot();
        assert_eq!(handler.succeeded().len(), 2);
        assert_eq!(stats.dropped, 3);
        assert_eq!(stats.redeliveries, 0);

        running.stop().await;
        assert_eq!(broker.ack_pending(STREAM, "domain-hrv-raw-received-consumer"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_defer_naks_overflow_for_later() {
        let broker = broker().await;
        seed(&broker).await;
        let handler = ScriptedHandler::new(schemas(), Script::Slow(Duration::from_secs(1)));

        let running =
            RunningConsumer::start(&broker, handler.clone(), limited(2, SaturationPolicy::Defer)).await;
        wait_until(|| running.consumer.stats().snapshot().acked == EVENTS as u64).await;

        let stats = running.consumer.stats().snapshot();
        assert_eq!(handler.succeeded().len(), EVENTS);
        assert!(stats.deferred >= 3);
        assert!(stats.redeliveries >= 3);
        assert_eq!(stats.dropped, 0);
        assert!(handler.max_active() <= 2);

        running.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_control_runs_whole_batch_at_once() {
        let broker = broker().await;
        seed(&broker).await;
        let handler = ScriptedHandler::new(schemas(), Script::Slow(Duration::from_secs(1)));

        let config = ConsumerConfig {
            governor: GovernorConfig {
                max_concurrent: 2,
                enable_concurrency_control: false,
                saturation: SaturationPolicy::Shed,
            },
            ..limited(2, SaturationPolicy::Shed)
        };
        let running = RunningConsumer::start(&broker, handler.clone(), config).await;
        wait_until(|| running.consumer.stats().snapshot().acked == EVENTS as u64).await;

        assert_eq!(handler.max_active(), EVENTS);
        assert_eq!(running.consumer.stats().snapshot().dropped, 0);

        running.stop().await;
    }
}
