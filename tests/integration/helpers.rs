//! Shared helpers for integration tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use subwatch::channels::{ConversationKind, InboundEvent, InboundPayload};
use subwatch::scheduler::{DutyContext, DutyScheduler};
use subwatch::store::SubscriptionStore;
use subwatch::test_utils::{FakeTimers, FakeTransport, FixedClock, StaticBackup};
use subwatch::{AdminRegistry, Dispatcher};

/// Grace period used by the harness duty scheduler.
pub(crate) const GRACE: Duration = Duration::from_secs(300);

pub(crate) fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).single().expect("valid instant")
}

/// A dispatcher wired to in-memory fakes, with the store on disk in a tempdir.
pub(crate) struct Harness {
    pub dir: tempfile::TempDir,
    pub store: Arc<SubscriptionStore>,
    pub transport: Arc<FakeTransport>,
    pub timers: Arc<FakeTimers>,
    pub clock: Arc<FixedClock>,
    pub duties: Arc<DutyScheduler>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Harness {
    /// UTC store, clock at 2025-02-11 00:00 UTC, no operators.
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = Arc::new(
            SubscriptionStore::open(&dir.path().join("data.db"), chrono_tz::UTC).expect("open store"),
        );
        let transport = Arc::new(FakeTransport::new());
        let timers = Arc::new(FakeTimers::new());
        let clock = Arc::new(FixedClock::new(utc(2025, 2, 11)));
        let ctx = Arc::new(DutyContext {
            store: Arc::clone(&store),
            admins: AdminRegistry::new(Arc::clone(&store)),
            transport: transport.clone(),
            backup: Arc::new(StaticBackup::new(dir.path().join("backup.zip"), 1024)),
            clock: clock.clone(),
            tz: chrono_tz::UTC,
            max_inline_bytes: 45 * 1024 * 1024,
            max_inline_mb: 45,
            delivery_timeout: Duration::from_secs(1),
            upload_timeout: Duration::from_secs(5),
        });
        let duties = Arc::new(DutyScheduler::new(ctx, timers.clone(), GRACE));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&duties),
            transport.clone(),
            clock.clone(),
            dir.path().join("exports"),
        ));
        Self {
            dir,
            store,
            transport,
            timers,
            clock,
            duties,
            dispatcher,
        }
    }

    /// Harness with `ids` already registered as operators.
    pub(crate) fn with_operators(ids: &[i64]) -> Self {
        let h = Self::new();
        for id in ids {
            h.store.add_admin(*id).expect("add operator");
        }
        h
    }

    /// `/name args…` from `requester` in their private chat.
    pub(crate) async fn command(&self, requester: i64, line: &str) {
        self.dispatcher.handle(command_event(requester, line)).await;
    }

    pub(crate) async fn text(&self, requester: i64, text: &str) {
        self.dispatcher
            .handle(private_event(requester, InboundPayload::Text(text.to_owned())))
            .await;
    }

    pub(crate) async fn button(&self, requester: i64, token: &str) {
        self.dispatcher
            .handle(private_event(requester, InboundPayload::Button(token.to_owned())))
            .await;
    }

    /// Text of the most recent outbound call.
    pub(crate) fn last_reply(&self) -> String {
        self.transport.last_text().unwrap_or_default()
    }
}

pub(crate) fn private_event(requester: i64, payload: InboundPayload) -> InboundEvent {
    InboundEvent {
        requester_id: requester,
        conversation_id: requester,
        conversation_kind: ConversationKind::Private,
        payload,
    }
}

pub(crate) fn group_event(requester: i64, group: i64, payload: InboundPayload) -> InboundEvent {
    InboundEvent {
        requester_id: requester,
        conversation_id: group,
        conversation_kind: ConversationKind::Group,
        payload,
    }
}

/// Parse `line` as `name arg arg…` into a private command event.
pub(crate) fn command_event(requester: i64, line: &str) -> InboundEvent {
    let mut parts = line.split_whitespace();
    let name = parts.next().unwrap_or_default().to_owned();
    let args = parts.map(str::to_owned).collect();
    private_event(requester, InboundPayload::Command { name, args })
}

/// Poll `cond` until it holds or two seconds pass.
pub(crate) async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
