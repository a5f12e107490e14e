// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cancellation for plan execution.
//!
//! Runs are cancelled cooperatively: the token is checked between job
//! dispatches, between layers, and inside retry sleeps, and in-flight
//! `produce` calls are allowed to finish. One token covers a whole run;
//! clones handed to ctrl-c handlers or callers all observe the same
//! signal.

pub use tokio_util::sync::CancellationToken;
