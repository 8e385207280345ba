//! Background duties.
//!
//! A daily digest at a fixed local time and a recurring backup whose interval
//! operators change at runtime. Both run on timers from a [`TimerFacility`],
//! outside the request path.

pub mod duties;
pub mod timer;

pub use duties::{DutyContext, DutyScheduler};
pub use timer::{Job, TimerFacility, TimerHandle, TokioTimerFacility, Trigger};
