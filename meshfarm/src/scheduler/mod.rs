//! Batch scheduling of build jobs.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        JobScheduler                          │
//! │  Plan jobs from the catalog, run them over C slots,          │
//! │  write each entry's manifest once its jobs are terminal      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │ BuildWorker  │  │ RetryPolicy  │  │ TelemetrySink      │  │
//! │  │ (per job)    │  │              │  │ (logs, registry)   │  │
//! │  └──────────────┘  └──────────────┘  └────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A batch always yields exactly one [`JobResult`](crate::jobs::JobResult)
//! per submitted job, collected into a [`BatchSummary`]. Status polling goes
//! through the [`JobRegistry`], which is fed by the same telemetry events.

mod config;
mod core;
mod registry;
mod summary;
mod telemetry;

pub use self::core::JobScheduler;
pub use config::{
    RetryPolicy, SchedulerConfig, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_REGISTRY_CAPACITY,
};
pub use registry::{JobRecord, JobRegistry};
pub use summary::{BatchSummary, EntrySummary};
pub use telemetry::{
    MultiplexTelemetrySink, NullTelemetrySink, TelemetryEvent, TelemetrySink,
    TracingTelemetrySink,
};

#[cfg(test)]
pub(crate) use telemetry::testing;
