//! Process runtime: transport supervision, per-requester lanes, duties.
//!
//! Inbound events arrive on one bounded queue. The router keeps a lane (a
//! task with its own queue) per requester, so one requester's events are
//! handled strictly in order while different requesters proceed concurrently.
//! The router never waits on a lane: when a requester's queue is full their
//! newest event is dropped with a warning. A lane that stays quiet for the idle period closes its queue, finishes what
//! is buffered and exits; the next event for that requester starts a new one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::auth::AdminRegistry;
use crate::backup::{BackupProducer, ZipBackupProducer};
use crate::channels::telegram::TelegramAdapter;
use crate::channels::traits::{InboundEvent, Transport};
use crate::clock::{Clock, SystemClock};
use crate::config::BotConfig;
use crate::dispatcher::Dispatcher;
use crate::scheduler::{DutyContext, DutyScheduler, TimerFacility, TokioTimerFacility};
use crate::store::SubscriptionStore;

/// Capacity of the shared inbound queue.
pub const INBOUND_QUEUE: usize = 256;
/// Capacity of each requester lane.
pub const LANE_QUEUE: usize = 32;
/// Quiet period after which a lane exits.
pub const LANE_IDLE: Duration = Duration::from_secs(300);

/// Fan inbound events out to per-requester lanes until the queue closes.
pub async fn route_events(
    dispatcher: Arc<Dispatcher>,
    mut inbound_rx: mpsc::Receiver<InboundEvent>,
    idle: Duration,
) {
    let mut lanes: HashMap<i64, mpsc::Sender<InboundEvent>> = HashMap::new();

    while let Some(event) = inbound_rx.recv().await {
        lanes.retain(|_, tx| !tx.is_closed());
        let requester = event.requester_id;

        let event = match lanes.get(&requester) {
            Some(tx) => match tx.try_send(event) {
                Ok(()) => continue,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(requester, capacity = LANE_QUEUE, "lane full; event dropped");
                    continue;
                }
                // Lane closed between the check and the send.
                Err(TrySendError::Closed(event)) => event,
            },
            None => event,
        };

        let (tx, rx) = mpsc::channel(LANE_QUEUE);
        tokio::spawn(run_lane(Arc::clone(&dispatcher), rx, idle, requester));
        if tx.try_send(event).is_err() {
            tracing::warn!(requester, "new lane closed before first event");
            continue;
        }
        lanes.insert(requester, tx);
    }
    tracing::debug!("inbound queue closed; router stopped");
}

async fn run_lane(
    dispatcher: Arc<Dispatcher>,
    mut rx: mpsc::Receiver<InboundEvent>,
    idle: Duration,
    requester: i64,
) {
    tracing::trace!(requester, "lane started");
    loop {
        match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(event)) => dispatcher.handle(event).await,
            Ok(None) => break,
            Err(_) => {
                rx.close();
                while let Some(event) = rx.recv().await {
                    dispatcher.handle(event).await;
                }
                break;
            }
        }
    }
    tracing::trace!(requester, "lane exited");
}

/// First restart delay after the transport stops.
const BACKOFF_START_SECS: u64 = 2;
/// Longest restart delay. A run that lasted at least this long resets the
/// delay to [`BACKOFF_START_SECS`].
const BACKOFF_CAP_SECS: u64 = 60;

/// Run the transport's receive loop forever, restarting it with exponential
/// backoff (2s doubling to 60s) whenever it stops.
pub async fn supervise_transport(
    transport: Arc<dyn Transport>,
    inbound_tx: mpsc::Sender<InboundEvent>,
) {
    let mut backoff_secs = BACKOFF_START_SECS;
    loop {
        let started = tokio::time::Instant::now();
        let outcome = transport.run(inbound_tx.clone()).await;
        if started.elapsed() >= Duration::from_secs(BACKOFF_CAP_SECS) {
            backoff_secs = BACKOFF_START_SECS;
        }
        match outcome {
            Ok(()) => {
                if inbound_tx.is_closed() {
                    return;
                }
                tracing::warn!("transport {} stopped; restarting", transport.id());
            }
            Err(err) => {
                tracing::warn!(
                    "transport {} failed: {err}; retrying in {backoff_secs}s",
                    transport.id()
                );
            }
        }
        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
        backoff_secs = backoff_secs.saturating_mul(2).min(BACKOFF_CAP_SECS);
    }
}

/// Collaborators the runtime is assembled from.
pub struct RuntimeParts {
    pub config: BotConfig,
    pub store: Arc<SubscriptionStore>,
    pub transport: Arc<dyn Transport>,
    pub timers: Arc<dyn TimerFacility>,
    pub backup: Arc<dyn BackupProducer>,
    pub clock: Arc<dyn Clock>,
}

impl RuntimeParts {
    /// Production wiring: SQLite store, Telegram transport, tokio timers, zip
    /// backups, system clock. Seeds the operator list.
    pub fn from_config(config: BotConfig) -> anyhow::Result<Self> {
        let tz = config.tz()?;
        let store = Arc::new(SubscriptionStore::open(&config.db_path, tz)?);
        let seeded = AdminRegistry::new(Arc::clone(&store)).seed(&config.seed_admin_ids)?;
        if seeded > 0 {
            tracing::info!(seeded, "seed operators registered");
        }
        let transport: Arc<dyn Transport> = Arc::new(TelegramAdapter::new(&config.bot_token)?);
        let backup: Arc<dyn BackupProducer> =
            Arc::new(ZipBackupProducer::from_config(&config.backup));
        Ok(Self {
            config,
            store,
            transport,
            timers: Arc::new(TokioTimerFacility),
            backup,
            clock: Arc::new(SystemClock),
        })
    }
}

/// Assemble the duties and dispatcher, then serve until `shutdown` resolves.
pub async fn serve(parts: RuntimeParts, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
    let RuntimeParts {
        config,
        store,
        transport,
        timers,
        backup,
        clock,
    } = parts;
    let tz = store.tz();

    let ctx = Arc::new(DutyContext {
        store: Arc::clone(&store),
        admins: AdminRegistry::new(Arc::clone(&store)),
        transport: Arc::clone(&transport),
        backup,
        clock: Arc::clone(&clock),
        tz,
        max_inline_bytes: config.backup.max_inline_mb.saturating_mul(1024 * 1024),
        max_inline_mb: config.backup.max_inline_mb,
        delivery_timeout: Duration::from_secs(config.delivery_timeout_secs.max(1)),
        upload_timeout: Duration::from_secs(config.upload_timeout_secs.max(1)),
    });
    let duties = Arc::new(DutyScheduler::new(
        ctx,
        timers,
        Duration::from_secs(config.backup.grace_minutes.saturating_mul(60)),
    ));
    duties.start();

    let dispatcher = Arc::new(Dispatcher::new(
        store,
        Arc::clone(&duties),
        Arc::clone(&transport),
        clock,
        config.export_dir(),
    ));

    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundEvent>(INBOUND_QUEUE);
    let receiver = tokio::spawn(supervise_transport(Arc::clone(&transport), inbound_tx));
    tracing::info!(transport = transport.id(), timezone = %tz, "subwatch started");

    tokio::select! {
        _ = route_events(dispatcher, inbound_rx, LANE_IDLE) => {
            tracing::warn!("event router stopped");
        }
        _ = shutdown => {
            tracing::info!("shutdown requested");
        }
    }

    receiver.abort();
    duties.shutdown();
    tracing::info!("subwatch stopped");
    Ok(())
}
