use subwatch::flow::PendingFlow;
use subwatch::render;

use crate::helpers::{Harness, utc};

#[tokio::test]
async fn add_flow_creates_record_with_default_duration() {
    let h = Harness::with_operators(&[1]);

    h.command(1, "add").await;
    assert_eq!(h.last_reply(), render::PROMPT_DESCRIPTION);
    assert_eq!(h.dispatcher.flows().peek(1), Some(PendingFlow::AwaitingDescription));

    h.text(1, "   ").await;
    assert_eq!(h.last_reply(), render::REPROMPT_DESCRIPTION);
    assert_eq!(h.dispatcher.flows().peek(1), Some(PendingFlow::AwaitingDescription));

    h.text(1, "  Plan A ").await;
    assert_eq!(h.last_reply(), render::PROMPT_DATE);

    h.text(1, "someday").await;
    assert_eq!(h.last_reply(), render::REPROMPT_DATE);
    assert_eq!(
        h.dispatcher.flows().peek(1),
        Some(PendingFlow::AwaitingDate {
            description: "Plan A".to_owned()
        })
    );

    h.text(1, "2025-01-01").await;
    assert_eq!(h.last_reply(), "Saved #1. Expires 2025-01-31 00:00.");
    assert!(h.dispatcher.flows().peek(1).is_none());

    let record = h.store.get(1).expect("record");
    assert_eq!(record.description, "Plan A");
    assert_eq!(record.expires_at, utc(2025, 1, 31));
    assert!(record.active);
}

#[tokio::test]
async fn cancel_at_date_step_leaks_nothing_into_next_record() {
    let h = Harness::with_operators(&[1]);

    h.command(1, "add").await;
    h.text(1, "Cancelled plan").await;
    h.command(1, "cancel").await;
    assert_eq!(h.last_reply(), render::CANCELLED);
    assert!(h.dispatcher.flows().peek(1).is_none());

    h.command(1, "cancel").await;
    assert_eq!(h.last_reply(), render::NOTHING_TO_CANCEL);

    h.button(1, "menu:add").await;
    h.text(1, "Plan B").await;
    h.text(1, "15/01/2025").await;

    let all = h.store.list_all().expect("all");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].description, "Plan B");
    assert_eq!(all[0].expires_at, utc(2025, 2, 14));
}

#[tokio::test]
async fn flows_are_independent_per_requester() {
    let h = Harness::with_operators(&[1, 2]);
    h.command(1, "add").await;
    h.command(2, "add").await;
    h.text(1, "One").await;
    h.text(2, "Two").await;
    h.text(2, "2025-01-01").await;
    h.text(1, "2025-01-02").await;

    let all = h.store.list_all().expect("all");
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].description, "Two");
    assert_eq!(all[1].description, "One");
}

#[tokio::test]
async fn default_duration_change_applies_to_new_records() {
    let h = Harness::with_operators(&[1]);
    h.button(1, "setdays:60").await;
    assert_eq!(h.last_reply(), render::default_days_set(60));

    h.command(1, "add").await;
    h.text(1, "Long plan").await;
    h.text(1, "2025-01-01").await;
    assert_eq!(h.store.get(1).expect("record").duration_days, 60);
}

#[tokio::test]
async fn text_without_pending_flow_is_ignored() {
    let h = Harness::with_operators(&[1]);
    h.text(1, "just chatting").await;
    assert!(h.transport.sent().is_empty());
    assert!(h.store.list_all().expect("all").is_empty());
}

#[tokio::test]
async fn home_button_abandons_record_flow() {
    let h = Harness::with_operators(&[1]);
    h.command(1, "add").await;
    h.text(1, "Abandoned").await;
    h.button(1, "menu:home").await;
    assert!(h.dispatcher.flows().peek(1).is_none());
    h.text(1, "2025-01-01").await;
    assert!(h.store.list_all().expect("all").is_empty());
}
