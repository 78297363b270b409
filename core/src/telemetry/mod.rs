pub mod metrics;

pub use metrics::{MetricsRecorder, SweepCounts};
