//! Client side of the latency and jitter measurement

pub mod clock_sync;
pub mod config;
pub mod constants;
pub mod measurement;
pub mod output;
pub mod progress;
pub mod reporter;
pub mod session;
pub mod statistics;

pub use clock_sync::{synchronize_clocks, ClockOffset, SyncOutcome};
pub use config::ClientConfig;
pub use constants::*;
pub use measurement::{
    measure_single_packet, measurement_phase, warmup_phase, LatencyEstimator, MeasurementResult,
    PhasePlan, Sample,
};
pub use output::{CsvWriter, CSV_HEADER};
pub use progress::ProgressTracker;
pub use reporter::Reporter;
pub use session::{run, run_session, ClientReport};
pub use statistics::{Statistics, Summary};
