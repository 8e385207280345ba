//! Integration test binary -- all integration tests consolidated into a single
//! binary.

// Allow unwrap/expect in test code
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

mod access_control;
mod duty_scheduling;
mod guided_input;
mod record_commands;
mod request_lanes;
