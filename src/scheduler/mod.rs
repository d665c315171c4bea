//! Trigger engine, handler executor and dispatch gating.

mod engine;
mod executor;
mod gate;

pub use engine::{Scheduler, SchedulerError, SchedulerHandle, SchedulerState};
pub use executor::{ExecutionReport, HandlerExecutor};
pub use gate::{AlwaysGrant, DispatchGate};
