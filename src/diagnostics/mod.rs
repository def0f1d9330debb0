pub mod stats;

pub use stats::{PipelineStats, StatsSnapshot};
