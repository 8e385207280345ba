//! Shared test doubles used by unit and integration tests.
//!
//! Nothing here touches the network or real timers: [`FakeTransport`] records
//! outbound traffic, [`FakeTimers`] records installed timers and fires them on
//! demand, [`FixedClock`] is a settable "now".

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::backup::{BackupArtifact, BackupProducer};
use crate::channels::traits::{InboundEvent, OutboundMessage, Transport};
use crate::clock::Clock;
use crate::error::{BotError, Result};
use crate::scheduler::timer::{Job, TimerFacility, TimerHandle, Trigger};

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// One recorded outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Message {
        chat_id: i64,
        message: OutboundMessage,
    },
    Document {
        chat_id: i64,
        path: PathBuf,
        caption: Option<String>,
    },
}

impl Sent {
    pub fn chat_id(&self) -> i64 {
        match self {
            Self::Message { chat_id, .. } | Self::Document { chat_id, .. } => *chat_id,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Message { message, .. } => Some(&message.text),
            Self::Document { caption, .. } => caption.as_deref(),
        }
    }

    /// Button tokens carried by a message, row-major.
    pub fn tokens(&self) -> Vec<String> {
        match self {
            Self::Message {
                message:
                    OutboundMessage {
                        keyboard: Some(keyboard),
                        ..
                    },
                ..
            } => keyboard
                .rows
                .iter()
                .flatten()
                .map(|b| b.token.clone())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Transport that records everything it is asked to send.
#[derive(Debug, Default)]
pub struct FakeTransport {
    sent: Mutex<Vec<Sent>>,
    failing: Mutex<HashSet<i64>>,
    stalling: Mutex<HashSet<i64>>,
    document_delay: Mutex<Option<Duration>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries to `chat_id` fail from now on.
    pub fn fail_for(&self, chat_id: i64) {
        guard(&self.failing).insert(chat_id);
    }

    /// Deliveries to `chat_id` never complete.
    pub fn stall_for(&self, chat_id: i64) {
        guard(&self.stalling).insert(chat_id);
    }

    /// Every document send takes `delay` before it completes.
    pub fn delay_documents(&self, delay: Duration) {
        *guard(&self.document_delay) = Some(delay);
    }

    pub fn sent(&self) -> Vec<Sent> {
        guard(&self.sent).clone()
    }

    /// Recorded calls addressed to `chat_id`.
    pub fn sent_to(&self, chat_id: i64) -> Vec<Sent> {
        guard(&self.sent)
            .iter()
            .filter(|s| s.chat_id() == chat_id)
            .cloned()
            .collect()
    }

    /// Text of every recorded message, in order.
    pub fn texts(&self) -> Vec<String> {
        guard(&self.sent)
            .iter()
            .filter_map(|s| s.text().map(str::to_owned))
            .collect()
    }

    pub fn last_text(&self) -> Option<String> {
        self.texts().pop()
    }

    pub fn last(&self) -> Option<Sent> {
        guard(&self.sent).last().cloned()
    }

    pub fn clear(&self) {
        guard(&self.sent).clear();
    }

    async fn gate(&self, chat_id: i64) -> anyhow::Result<()> {
        let stall = guard(&self.stalling).contains(&chat_id);
        if stall {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let fail = guard(&self.failing).contains(&chat_id);
        if fail {
            anyhow::bail!("recipient {chat_id} unreachable");
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn id(&self) -> &'static str {
        "fake"
    }

    async fn send_message(&self, chat_id: i64, message: OutboundMessage) -> anyhow::Result<()> {
        self.gate(chat_id).await?;
        guard(&self.sent).push(Sent::Message { chat_id, message });
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: Option<&str>,
    ) -> anyhow::Result<()> {
        self.gate(chat_id).await?;
        let delay = *guard(&self.document_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        guard(&self.sent).push(Sent::Document {
            chat_id,
            path: path.to_path_buf(),
            caption: caption.map(str::to_owned),
        });
        Ok(())
    }

    async fn run(&self, _inbound_tx: mpsc::Sender<InboundEvent>) -> anyhow::Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

struct FakeTimer {
    name: String,
    trigger: Trigger,
    job: Job,
    live: Arc<AtomicBool>,
}

/// Timer facility that never fires on its own.
#[derive(Default)]
pub struct FakeTimers {
    timers: Mutex<Vec<FakeTimer>>,
    fail: AtomicBool,
}

struct FakeHandle {
    live: Arc<AtomicBool>,
}

impl TimerHandle for FakeHandle {
    fn cancel(self: Box<Self>) {
        self.live.store(false, Ordering::SeqCst);
    }
}

impl FakeTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent installs fail as if no runtime were available.
    pub fn fail_installs(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Triggers of the live timers called `name`.
    pub fn live_named(&self, name: &str) -> Vec<Trigger> {
        guard(&self.timers)
            .iter()
            .filter(|t| t.name == name && t.live.load(Ordering::SeqCst))
            .map(|t| t.trigger.clone())
            .collect()
    }

    /// Total installs ever made for `name`, live or cancelled.
    pub fn installed_count(&self, name: &str) -> usize {
        guard(&self.timers).iter().filter(|t| t.name == name).count()
    }

    /// Run the live timer called `name` once. `None` when there is none.
    pub async fn fire(&self, name: &str) -> Option<()> {
        let job = guard(&self.timers)
            .iter()
            .rev()
            .find(|t| t.name == name && t.live.load(Ordering::SeqCst))
            .map(|t| Arc::clone(&t.job))?;
        job().await;
        Some(())
    }
}

impl TimerFacility for FakeTimers {
    fn install(&self, name: &str, trigger: Trigger, job: Job) -> Result<Box<dyn TimerHandle>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BotError::Scheduler("timer facility unavailable".to_owned()));
        }
        let live = Arc::new(AtomicBool::new(true));
        guard(&self.timers).push(FakeTimer {
            name: name.to_owned(),
            trigger,
            job,
            live: Arc::clone(&live),
        });
        Ok(Box::new(FakeHandle { live }))
    }
}

// ---------------------------------------------------------------------------
// Clock and backup
// ---------------------------------------------------------------------------

/// Settable clock.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *guard(&self.now) = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *guard(&self.now)
    }
}

/// Backup producer returning a fixed artifact without touching disk.
#[derive(Debug, Clone)]
pub struct StaticBackup {
    artifact: BackupArtifact,
}

impl StaticBackup {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            artifact: BackupArtifact {
                path: path.into(),
                size,
            },
        }
    }
}

impl BackupProducer for StaticBackup {
    fn produce(&self) -> Result<BackupArtifact> {
        Ok(self.artifact.clone())
    }
}
