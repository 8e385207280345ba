use std::sync::Arc;
use std::time::Duration;

use subwatch::channels::{InboundPayload, LANE_QUEUE, route_events};
use tokio::sync::mpsc;

use crate::helpers::{Harness, command_event, private_event, wait_until};

fn text(requester: i64, body: &str) -> subwatch::channels::InboundEvent {
    private_event(requester, InboundPayload::Text(body.to_owned()))
}

#[tokio::test]
async fn events_of_one_requester_are_handled_in_order() {
    let h = Harness::with_operators(&[1, 2]);
    let (tx, rx) = mpsc::channel(64);
    let router = tokio::spawn(route_events(
        Arc::clone(&h.dispatcher),
        rx,
        Duration::from_secs(60),
    ));

    // Interleave two requesters' guided flows.
    let events = vec![
        command_event(1, "add"),
        command_event(2, "add"),
        text(1, "First"),
        text(2, "Second"),
        text(1, "2025-01-01"),
        text(2, "2025-01-02"),
    ];
    for event in events {
        tx.send(event).await.expect("queue open");
    }

    let store = Arc::clone(&h.store);
    assert!(wait_until(|| store.list_all().map(|r| r.len() == 2).unwrap_or(false)).await);

    let mut descriptions: Vec<String> = h
        .store
        .list_all()
        .expect("all")
        .into_iter()
        .map(|r| r.description)
        .collect();
    descriptions.sort();
    assert_eq!(descriptions, vec!["First", "Second"]);

    drop(tx);
    router.await.expect("router exits when the queue closes");
}

#[tokio::test]
async fn idle_lane_is_recreated_on_demand() {
    let h = Harness::with_operators(&[1]);
    let (tx, rx) = mpsc::channel(8);
    let router = tokio::spawn(route_events(
        Arc::clone(&h.dispatcher),
        rx,
        Duration::from_millis(20),
    ));

    tx.send(command_event(1, "add")).await.expect("send");
    let transport = Arc::clone(&h.transport);
    assert!(wait_until(|| transport.sent().len() == 1).await);

    // Let the lane time out, then continue the same flow.
    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(text(1, "After idle")).await.expect("send");
    tx.send(text(1, "01/02/2025")).await.expect("send");

    let store = Arc::clone(&h.store);
    assert!(wait_until(|| store.list_all().map(|r| r.len() == 1).unwrap_or(false)).await);
    assert_eq!(h.store.get(1).expect("record").description, "After idle");

    drop(tx);
    router.await.expect("router exit");
}

#[tokio::test]
async fn stalled_requester_does_not_hold_up_others() {
    let h = Harness::with_operators(&[1, 2]);
    h.transport.stall_for(1);
    let (tx, rx) = mpsc::channel(256);
    let router = tokio::spawn(route_events(
        Arc::clone(&h.dispatcher),
        rx,
        Duration::from_secs(60),
    ));

    // Requester 1's replies never complete; overfill their lane.
    for _ in 0..LANE_QUEUE + 8 {
        tx.send(command_event(1, "list")).await.expect("send");
    }
    tx.send(command_event(2, "add")).await.expect("send");

    let transport = Arc::clone(&h.transport);
    assert!(wait_until(|| !transport.sent_to(2).is_empty()).await);
    assert_eq!(
        h.transport.sent_to(2)[0].text(),
        Some(subwatch::render::PROMPT_DESCRIPTION)
    );

    drop(tx);
    router.await.expect("router exit");
}
