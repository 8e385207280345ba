//! Authorization at the dispatcher boundary.

use subwatch::channels::InboundPayload;
use subwatch::render;

use crate::helpers::{Harness, group_event};

#[tokio::test]
async fn unauthorized_start_is_silent_other_commands_are_denied() {
    let h = Harness::with_operators(&[1]);

    h.command(99, "start").await;
    assert!(h.transport.sent().is_empty(), "bare /start must not answer");

    h.command(99, "list").await;
    assert_eq!(h.last_reply(), render::DENIED);

    h.button(99, "renew:1").await;
    assert_eq!(h.last_reply(), render::DENIED);

    h.text(99, "hello").await;
    assert_eq!(h.last_reply(), render::DENIED);
    assert_eq!(h.transport.sent().len(), 3);
}

#[tokio::test]
async fn denial_does_not_change_state() {
    let h = Harness::with_operators(&[1]);
    h.command(99, "add").await;
    assert!(h.dispatcher.flows().is_empty());

    h.button(99, "admins:add").await;
    assert!(h.dispatcher.flows().is_empty());
    assert_eq!(h.store.list_admins().expect("admins"), vec![1]);
}

// Privilege-escalation surface: while the registry is empty any private-chat
// user is treated as an operator and may register themselves.
#[tokio::test]
async fn empty_registry_bootstrap_lets_private_user_self_register() {
    let h = Harness::new();

    h.command(555, "start").await;
    assert!(!h.transport.sent_to(555).is_empty());

    h.button(555, "admins:add").await;
    assert_eq!(h.last_reply(), render::PROMPT_OPERATOR_ADD);
    h.text(555, "555").await;
    assert_eq!(h.last_reply(), "Operator 555 added.");

    h.command(777, "list").await;
    assert_eq!(h.last_reply(), render::DENIED);
}

#[tokio::test]
async fn empty_registry_still_denies_group_conversations() {
    let h = Harness::new();
    h.dispatcher
        .handle(group_event(
            5,
            -100,
            InboundPayload::Command {
                name: "list".to_owned(),
                args: vec![],
            },
        ))
        .await;
    let sent = h.transport.sent_to(-100);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text(), Some(render::DENIED));
}

#[tokio::test]
async fn listed_operator_is_authorized_in_groups() {
    let h = Harness::with_operators(&[5]);
    h.dispatcher
        .handle(group_event(
            5,
            -100,
            InboundPayload::Command {
                name: "list".to_owned(),
                args: vec![],
            },
        ))
        .await;
    assert_eq!(h.transport.sent_to(-100)[0].text(), Some(render::NO_ACTIVE));
}

#[tokio::test]
async fn operator_add_rejects_non_numeric_and_keeps_waiting() {
    let h = Harness::with_operators(&[1]);
    h.button(1, "admins:add").await;
    h.text(1, "@someone").await;
    assert_eq!(h.last_reply(), render::REPROMPT_OPERATOR_ID);
    h.text(1, "-4").await;
    assert_eq!(h.last_reply(), render::REPROMPT_OPERATOR_ID);

    h.text(1, " 42 ").await;
    assert_eq!(h.last_reply(), "Operator 42 added.");
    assert_eq!(h.store.list_admins().expect("admins"), vec![1, 42]);

    h.button(1, "admins:add").await;
    h.text(1, "42").await;
    assert_eq!(h.last_reply(), "Operator 42 is already registered.");
}

#[tokio::test]
async fn operator_remove_flow() {
    let h = Harness::with_operators(&[1, 2]);
    h.button(1, "admins:remove").await;
    h.text(1, "3").await;
    assert_eq!(h.last_reply(), "Operator 3 not found.");

    h.button(1, "admins:remove").await;
    h.text(1, "2").await;
    assert_eq!(h.last_reply(), "Operator 2 removed.");
    assert_eq!(h.store.list_admins().expect("admins"), vec![1]);

    h.button(1, "admins:list").await;
    assert_eq!(h.last_reply(), "Operators:\n• 1");
}

#[tokio::test]
async fn back_to_admins_menu_abandons_operator_flow() {
    let h = Harness::with_operators(&[1]);
    h.button(1, "admins:add").await;
    h.button(1, "menu:admins").await;
    assert!(h.dispatcher.flows().peek(1).is_none());
    h.text(1, "42").await;
    assert_eq!(h.store.list_admins().expect("admins"), vec![1]);
}
