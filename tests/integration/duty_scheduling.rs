use std::time::Duration;

use subwatch::scheduler::Trigger;
use subwatch::scheduler::duties::{BACKUP_TIMER, DIGEST_TIMER};
use subwatch::test_utils::Sent;

use crate::helpers::{GRACE, Harness};

#[tokio::test]
async fn backup_interval_change_leaves_one_live_timer() {
    let h = Harness::with_operators(&[1]);

    h.button(1, "backup:on:6").await;
    h.button(1, "backup:on:12").await;

    assert_eq!(
        h.timers.live_named(BACKUP_TIMER),
        vec![Trigger::Repeating {
            first: GRACE,
            every: Duration::from_secs(12 * 3600),
        }]
    );
    assert!(h.store.backup_enabled().expect("enabled"));
    assert_eq!(h.store.backup_interval_hours().expect("hours"), 12);
    assert!(h.last_reply().contains("every 12h"));

    h.button(1, "backup:off").await;
    assert!(h.timers.live_named(BACKUP_TIMER).is_empty());
    assert!(!h.store.backup_enabled().expect("enabled"));
    assert_eq!(h.timers.fire(BACKUP_TIMER).await, None);
}

#[tokio::test]
async fn backup_menu_reflects_persisted_state() {
    let h = Harness::with_operators(&[1]);
    h.button(1, "menu:backup").await;
    assert_eq!(h.last_reply(), "Automatic backup: off");

    h.button(1, "backup:on:24").await;
    h.button(1, "menu:backup").await;
    assert_eq!(h.last_reply(), "Automatic backup: every 24h");
}

#[tokio::test]
async fn unavailable_timers_disable_the_duty_without_failing_the_bot() {
    let h = Harness::with_operators(&[1]);
    h.timers.fail_installs(true);

    h.button(1, "backup:on:6").await;
    assert_eq!(h.last_reply(), "Automatic backup is unavailable right now.");
    assert!(!h.store.backup_enabled().expect("enabled"));

    h.command(1, "list").await;
    assert_eq!(h.last_reply(), subwatch::render::NO_ACTIVE);
}

#[tokio::test]
async fn backup_now_reaches_every_operator_even_if_one_fails() {
    let h = Harness::with_operators(&[1, 2, 3]);
    h.transport.fail_for(2);

    h.button(1, "backup:now").await;

    let documents: Vec<i64> = h
        .transport
        .sent()
        .iter()
        .filter(|s| matches!(s, Sent::Document { .. }))
        .map(Sent::chat_id)
        .collect();
    assert_eq!(documents, vec![1, 3]);
}

#[tokio::test]
async fn fired_backup_timer_broadcasts_archive() {
    let h = Harness::with_operators(&[1, 2]);
    h.button(1, "backup:on:6").await;
    h.transport.clear();

    assert_eq!(h.timers.fire(BACKUP_TIMER).await, Some(()));
    assert_eq!(h.transport.sent().len(), 2);
}

#[tokio::test]
async fn digest_timer_reports_to_operators() {
    let h = Harness::with_operators(&[1]);
    h.command(1, "add").await;
    h.text(1, "Old plan").await;
    h.text(1, "2025-01-01").await;
    h.transport.clear();

    h.duties.start();
    assert_eq!(h.timers.fire(DIGEST_TIMER).await, Some(()));
    let text = h.last_reply();
    assert!(text.contains("Expired (1)"), "{text}");
    assert!(text.contains("Old plan"));
}
