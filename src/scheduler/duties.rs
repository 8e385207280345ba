//! The two background duties: the daily digest and the recurring backup.
//!
//! Each duty owns at most one live timer handle, kept in its own slot behind a
//! mutex. Reconfiguring the backup takes the slot lock, cancels whatever is
//! there, installs the replacement and persists the schedule before releasing
//! the lock.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use futures_util::FutureExt;

use super::timer::{Job, TimerFacility, TimerHandle, Trigger};
use crate::auth::AdminRegistry;
use crate::backup::{BackupArtifact, BackupProducer};
use crate::channels::traits::{OutboundMessage, Transport};
use crate::clock::Clock;
use crate::error::{BotError, Result};
use crate::fanout::{Notice, broadcast, upload_timeout};
use crate::render;
use crate::store::SubscriptionStore;
use crate::store::sqlite::LIST_EXPIRED_LIMIT;

pub const DIGEST_TIMER: &str = "digest";
pub const BACKUP_TIMER: &str = "backup";

/// Digest look-ahead window.
pub const UPCOMING_WINDOW_HOURS: i64 = 48;

/// Everything a duty run needs.
pub struct DutyContext {
    pub store: Arc<SubscriptionStore>,
    pub admins: AdminRegistry,
    pub transport: Arc<dyn Transport>,
    pub backup: Arc<dyn BackupProducer>,
    pub clock: Arc<dyn Clock>,
    pub tz: Tz,
    pub max_inline_bytes: u64,
    pub max_inline_mb: u64,
    /// Per-recipient timeout for text notices.
    pub delivery_timeout: Duration,
    /// Minimum per-recipient timeout for archive uploads.
    pub upload_timeout: Duration,
}

impl DutyContext {
    /// Send the expired / expiring-soon report to every operator.
    /// Returns the number of operators reached.
    pub async fn run_digest(&self) -> Result<usize> {
        let now = self.clock.now();
        let expired = self.store.list_expired(now, LIST_EXPIRED_LIMIT)?;
        let upcoming = self
            .store
            .list_expiring_between(now, now + chrono::Duration::hours(UPCOMING_WINDOW_HOURS))?;
        let recipients = self.admins.list()?;
        if recipients.is_empty() {
            tracing::debug!("digest skipped: no operators");
            return Ok(0);
        }

        let notice = Notice::Text(OutboundMessage::text(render::digest(
            &expired, &upcoming, self.tz,
        )));
        let delivered = broadcast(
            self.transport.as_ref(),
            &recipients,
            &notice,
            self.delivery_timeout,
        )
        .await;
        tracing::info!(
            expired = expired.len(),
            upcoming = upcoming.len(),
            delivered,
            "digest sent"
        );
        Ok(delivered)
    }

    /// Produce an archive and deliver it (or its location) to every operator.
    pub async fn run_backup(&self) -> Result<BackupArtifact> {
        let producer = Arc::clone(&self.backup);
        let artifact = tokio::task::spawn_blocking(move || producer.produce())
            .await
            .map_err(|e| BotError::Backup(format!("backup task failed: {e}")))??;

        let (notice, timeout) = if artifact.size > self.max_inline_bytes {
            let text = render::backup_too_large(&artifact.path, artifact.size, self.max_inline_mb);
            (Notice::Text(OutboundMessage::text(text)), self.delivery_timeout)
        } else {
            let notice = Notice::Document {
                path: artifact.path.clone(),
                caption: Some(render::backup_caption(self.clock.now(), self.tz)),
            };
            (notice, upload_timeout(self.upload_timeout, artifact.size))
        };
        let recipients = self.admins.list()?;
        let delivered = broadcast(self.transport.as_ref(), &recipients, &notice, timeout).await;
        tracing::info!(
            path = %artifact.path.display(),
            size = artifact.size,
            delivered,
            "backup delivered"
        );
        Ok(artifact)
    }
}

/// Owner of the duty timers.
pub struct DutyScheduler {
    ctx: Arc<DutyContext>,
    timers: Arc<dyn TimerFacility>,
    grace: Duration,
    digest_slot: Mutex<Option<Box<dyn TimerHandle>>>,
    backup_slot: Mutex<Option<Box<dyn TimerHandle>>>,
}

impl DutyScheduler {
    pub fn new(ctx: Arc<DutyContext>, timers: Arc<dyn TimerFacility>, grace: Duration) -> Self {
        Self {
            ctx,
            timers,
            grace,
            digest_slot: Mutex::new(None),
            backup_slot: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &Arc<DutyContext> {
        &self.ctx
    }

    /// Install the digest and restore the persisted backup schedule.
    /// Failures disable the affected duty and are logged.
    pub fn start(&self) {
        if let Err(e) = self.start_digest() {
            tracing::warn!(duty = DIGEST_TIMER, error = %e, "daily digest disabled");
        }
        match (self.ctx.store.backup_enabled(), self.ctx.store.backup_interval_hours()) {
            (Ok(true), Ok(hours)) => {
                if let Err(e) = self.enable_backup(hours) {
                    tracing::warn!(duty = BACKUP_TIMER, error = %e, "automatic backup disabled");
                }
            }
            (Ok(false), _) => {}
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(duty = BACKUP_TIMER, error = %e, "could not read backup schedule");
            }
        }
    }

    /// Install the daily digest at 09:00 local time.
    pub fn start_digest(&self) -> Result<()> {
        let at = NaiveTime::from_hms_opt(9, 0, 0)
            .ok_or_else(|| BotError::Scheduler("invalid digest time".to_owned()))?;
        let ctx = Arc::clone(&self.ctx);
        let job: Job = Arc::new(move || {
            let ctx = Arc::clone(&ctx);
            async move {
                if let Err(e) = ctx.run_digest().await {
                    tracing::warn!(duty = DIGEST_TIMER, error = %e, "digest run failed");
                }
            }
            .boxed()
        });

        let mut slot = lock_slot(&self.digest_slot)?;
        if let Some(old) = slot.take() {
            old.cancel();
        }
        let handle = self.timers.install(
            DIGEST_TIMER,
            Trigger::DailyAt { at, tz: self.ctx.tz },
            job,
        )?;
        *slot = Some(handle);
        tracing::info!(duty = DIGEST_TIMER, tz = %self.ctx.tz, "daily digest scheduled at 09:00");
        Ok(())
    }

    /// Persist and schedule the recurring backup every `hours` hours.
    ///
    /// The slot stays locked until the store agrees with the live timer. When
    /// the timer cannot be installed the duty is left disabled (in the store
    /// as well) and the error is returned.
    pub fn enable_backup(&self, hours: u32) -> Result<()> {
        let hours = hours.max(1);
        let mut slot = lock_slot(&self.backup_slot)?;
        if let Err(e) = self.replace_backup_timer(&mut slot, Some(hours)) {
            tracing::warn!(duty = BACKUP_TIMER, error = %e, "automatic backup unavailable");
            self.ctx.store.set_backup_schedule(false, None)?;
            return Err(e);
        }
        if let Err(e) = self.ctx.store.set_backup_schedule(true, Some(hours)) {
            if let Some(handle) = slot.take() {
                handle.cancel();
            }
            return Err(e);
        }
        Ok(())
    }

    /// Remove the live timer and persist the disabled state.
    pub fn disable_backup(&self) -> Result<()> {
        let mut slot = lock_slot(&self.backup_slot)?;
        self.replace_backup_timer(&mut slot, None)?;
        self.ctx.store.set_backup_schedule(false, None)
    }

    /// Swap the timer held in `slot`. `None` only removes it.
    fn replace_backup_timer(
        &self,
        slot: &mut Option<Box<dyn TimerHandle>>,
        interval_hours: Option<u32>,
    ) -> Result<()> {
        if let Some(old) = slot.take() {
            old.cancel();
        }
        let Some(hours) = interval_hours else {
            tracing::info!(duty = BACKUP_TIMER, "automatic backup off");
            return Ok(());
        };

        let ctx = Arc::clone(&self.ctx);
        let job: Job = Arc::new(move || {
            let ctx = Arc::clone(&ctx);
            async move {
                if let Err(e) = ctx.run_backup().await {
                    tracing::warn!(duty = BACKUP_TIMER, error = %e, "scheduled backup failed");
                }
            }
            .boxed()
        });
        let trigger = Trigger::Repeating {
            first: self.grace,
            every: Duration::from_secs(u64::from(hours) * 3600),
        };
        *slot = Some(self.timers.install(BACKUP_TIMER, trigger, job)?);
        tracing::info!(duty = BACKUP_TIMER, hours, "automatic backup scheduled");
        Ok(())
    }

    pub fn backup_scheduled(&self) -> bool {
        lock_slot(&self.backup_slot).is_ok_and(|slot| slot.is_some())
    }

    pub fn digest_scheduled(&self) -> bool {
        lock_slot(&self.digest_slot).is_ok_and(|slot| slot.is_some())
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Build and deliver a backup immediately.
    pub async fn backup_now(&self) -> Result<BackupArtifact> {
        self.ctx.run_backup().await
    }

    /// Cancel every live timer.
    pub fn shutdown(&self) {
        for slot in [&self.digest_slot, &self.backup_slot] {
            if let Ok(mut slot) = lock_slot(slot)
                && let Some(handle) = slot.take()
            {
                handle.cancel();
            }
        }
    }
}

fn lock_slot(
    slot: &Mutex<Option<Box<dyn TimerHandle>>>,
) -> Result<MutexGuard<'_, Option<Box<dyn TimerHandle>>>> {
    slot.lock().map_err(|e| BotError::Lock(e.to_string()))
}
