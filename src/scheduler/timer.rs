//! Timer facility: installs named recurring jobs and hands back a handle that
//! cancels them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use futures_util::future::BoxFuture;

use crate::error::{BotError, Result};

/// A unit of scheduled work. Each fire calls it once.
pub type Job = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// When a timer fires.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// First fire after `first`, then every `every`.
    Repeating { first: Duration, every: Duration },
    /// Every day at local wall-clock time `at` in `tz`.
    DailyAt { at: NaiveTime, tz: Tz },
}

/// Owned handle to one live timer.
pub trait TimerHandle: Send {
    /// Stop future fires. A run already in progress completes.
    fn cancel(self: Box<Self>);
}

/// Source of timers.
pub trait TimerFacility: Send + Sync {
    fn install(&self, name: &str, trigger: Trigger, job: Job) -> Result<Box<dyn TimerHandle>>;
}

/// Timers driven by the ambient tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimerFacility;

struct TokioTimerHandle {
    name: String,
    task: tokio::task::JoinHandle<()>,
}

impl TimerHandle for TokioTimerHandle {
    fn cancel(self: Box<Self>) {
        self.task.abort();
        tracing::debug!(timer = %self.name, "timer cancelled");
    }
}

impl TimerFacility for TokioTimerFacility {
    fn install(&self, name: &str, trigger: Trigger, job: Job) -> Result<Box<dyn TimerHandle>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BotError::Scheduler(format!("no async runtime for timer `{name}`: {e}")))?;
        if let Trigger::Repeating { every, .. } = &trigger
            && every.is_zero()
        {
            return Err(BotError::Scheduler(format!("timer `{name}` has a zero interval")));
        }

        let timer_name = name.to_owned();
        let task = runtime.spawn(async move {
            match trigger {
                Trigger::Repeating { first, every } => {
                    let start = tokio::time::Instant::now() + first;
                    let mut ticker = tokio::time::interval_at(start, every);
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    loop {
                        ticker.tick().await;
                        fire(&timer_name, &job);
                    }
                }
                Trigger::DailyAt { at, tz } => loop {
                    let now = Utc::now();
                    let next = next_daily_fire(now, at, tz);
                    let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                    tracing::debug!(timer = %timer_name, next = %next, "daily timer armed");
                    tokio::time::sleep(wait).await;
                    fire(&timer_name, &job);
                    // Step past the fire instant so the next computation lands on tomorrow.
                    tokio::time::sleep(Duration::from_secs(1)).await;
                },
            }
        });

        tracing::debug!(timer = name, "timer installed");
        Ok(Box::new(TokioTimerHandle {
            name: name.to_owned(),
            task,
        }))
    }
}

/// Each fire runs detached so cancelling the timer never cuts a run short.
fn fire(name: &str, job: &Job) {
    tracing::debug!(timer = name, "timer fired");
    tokio::spawn(job());
}

/// The first instant strictly after `now` whose local time in `tz` is `at`.
///
/// Days where `at` does not exist locally (DST gap) are skipped.
pub fn next_daily_fire(now: DateTime<Utc>, at: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let mut date = now.with_timezone(&tz).date_naive();
    for _ in 0..4 {
        if let Some(local) = tz.from_local_datetime(&date.and_time(at)).earliest() {
            let candidate = local.with_timezone(&Utc);
            if candidate > now {
                return candidate;
            }
        }
        match date.checked_add_days(Days::new(1)) {
            Some(next) => date = next,
            None => break,
        }
    }
    now + chrono::Duration::days(1)
}
