//! Reservation writes reach the bus through the outbox, and verdicts come back
//! through a consumer.

#![allow(clippy::unwrap_used, clippy::panic)]

use campsite_core::channels::{ChannelConfig, EventKind};
use campsite_core::contracts::{ReservationId, SagaEvent};
use campsite_core::event_bus::EventBus;
use campsite_core::outbox::OutboxStore;
use campsite_runtime::{EventConsumer, OutboxRelay, RelayError, RetryPolicy};
use campsite_testing::{InMemoryEventBus, init_test_tracing, test_clock, test_now};
use chrono::Duration;
use reservation_service::{
    BookingRules, InMemoryReservationStore, ReservationDraft, ReservationService, ReservationStatus,
    ReservationStore, StayDates, VerdictHandler,
};
use std::sync::Arc;
use tokio::sync::watch;

struct World {
    store: Arc<InMemoryReservationStore>,
    bus: Arc<InMemoryEventBus>,
    service: Arc<ReservationService>,
    relay: OutboxRelay,
}

fn world() -> World {
    init_test_tracing();
    let store = Arc::new(InMemoryReservationStore::new());
    let bus = Arc::new(InMemoryEventBus::new());
    let clock = Arc::new(test_clock());
    let service = Arc::new(ReservationService::new(
        Arc::clone(&store) as Arc<dyn ReservationStore>,
        clock.clone(),
        BookingRules::default(),
    ));
    let relay = OutboxRelay::new(
        Arc::clone(&store) as Arc<dyn OutboxStore>,
        Arc::clone(&bus) as Arc<dyn EventBus>,
        ChannelConfig::default(),
        clock,
    )
    .with_retry_policy(RetryPolicy::none());
    World {
        store,
        bus,
        service,
        relay,
    }
}

fn draft(arrive_in_days: i64) -> ReservationDraft {
    let arrival = test_now() + Duration::days(arrive_in_days);
    ReservationDraft {
        guest_email: "jane@example.com".into(),
        first_name: "Jane".into(),
        last_name: "Doe".into(),
        dates: StayDates::new(arrival, arrival + Duration::days(2)),
    }
}

fn published(bus: &InMemoryEventBus, kind: EventKind) -> Vec<SagaEvent> {
    bus.published(kind.default_channel())
        .iter()
        .map(|e| SagaEvent::from_serialized(e).unwrap())
        .collect()
}

#[tokio::test]
async fn created_event_is_published_once_relayed() {
    let w = world();
    let reservation = w.service.create(draft(3)).await.unwrap();
    assert!(w.bus.history().is_empty());

    assert_eq!(w.relay.run_once().await.unwrap(), 1);
    assert_eq!(w.relay.run_once().await.unwrap(), 0);

    let created = published(&w.bus, EventKind::ReservationCreated);
    assert_eq!(created, vec![SagaEvent::ReservationCreated(reservation.selection())]);
    let envelope = &w.bus.published(EventKind::ReservationCreated.default_channel())[0];
    assert_eq!(envelope.aggregate_id(), Some(reservation.id.to_string().as_str()));
}

#[tokio::test]
async fn failed_publish_keeps_order_for_the_next_pass() {
    let w = world();
    let reservation = w.service.create(draft(3)).await.unwrap();
    w.service.cancel(reservation.id).await.unwrap();

    w.bus.fail_next_publishes(1);
    let error = w.relay.run_once().await.unwrap_err();
    assert!(matches!(error, RelayError::Publish { .. }));
    assert!(w.bus.history().is_empty());

    assert_eq!(w.relay.run_once().await.unwrap(), 2);
    let order: Vec<String> = w.bus.history().into_iter().map(|(channel, _)| channel).collect();
    assert_eq!(order, vec!["event.reservation.created", "event.reservation.cancelled"]);
    assert_eq!(w.store.outbox().await[0].attempts, 1);
}

#[tokio::test]
async fn verdicts_settle_reservations_through_the_consumer() {
    let w = world();
    let accepted = w.service.create(draft(3)).await.unwrap();
    let refused = w.service.create(draft(4)).await.unwrap();

    let consumer = EventConsumer::new(
        Arc::clone(&w.bus) as Arc<dyn EventBus>,
        ChannelConfig::default(),
        Arc::new(VerdictHandler::new(Arc::clone(&w.service))),
    );
    let (shutdown, rx) = watch::channel(false);
    let task = tokio::spawn(async move { consumer.run(rx).await.unwrap() });
    w.bus.wait_for_subscribers(1).await;

    let channels = ChannelConfig::default();
    for verdict in [
        SagaEvent::reserved(accepted.id),
        SagaEvent::rollback(refused.id),
        SagaEvent::reserved(accepted.id),
    ] {
        w.bus
            .publish(channels.channel(verdict.kind()), &verdict.to_serialized().unwrap())
            .await
            .unwrap();
    }

    let settled = |id: ReservationId, status: ReservationStatus| {
        let service = Arc::clone(&w.service);
        async move {
            tokio::time::timeout(std::time::Duration::from_secs(5), async {
                while service.find(id).await.unwrap().status != status {
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                }
            })
            .await
            .unwrap();
        }
    };
    settled(accepted.id, ReservationStatus::Confirmed).await;
    settled(refused.id, ReservationStatus::Rejected).await;

    shutdown.send(true).unwrap();
    task.await.unwrap();

    // Confirmations and rejections emit nothing further.
    w.relay.run_once().await.unwrap();
    assert!(published(&w.bus, EventKind::ReservationCancelled).is_empty());
}

#[tokio::test]
async fn patch_and_cancel_reach_the_bus() {
    let w = world();
    let reservation = w.service.create(draft(3)).await.unwrap();
    w.service.confirm(reservation.id, None).await.unwrap();
    let moved = draft(5).dates;

    w.service.patch(reservation.id, moved).await.unwrap();
    w.service.cancel(reservation.id).await.unwrap();
    w.relay.run_once().await.unwrap();

    let modified = published(&w.bus, EventKind::ReservationModified);
    let SagaEvent::ReservationModified(selection) = modified[0] else {
        panic!("expected a modification, got {modified:?}");
    };
    assert_eq!(selection.arrival_date, moved.arrival_date);
    assert_eq!(
        published(&w.bus, EventKind::ReservationCancelled),
        vec![SagaEvent::cancelled(reservation.id)]
    );
}
