//! Cooperative, tick-driven structure placement.
#![forbid(unsafe_code)]

mod queue;
pub mod scheduler;

pub use scheduler::{
    PlacementHandle, PlacementId, PlacementOutcome, PlacementProgress, PlacementScheduler,
    SkipMask, TickReport, no_skip,
};
