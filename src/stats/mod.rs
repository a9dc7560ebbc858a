pub mod latch;
pub mod sampler;
pub mod snapshot;

pub use latch::{Latch, Provenance, RateLatch, Reading, BITRATE_EPSILON_MBPS};
pub use sampler::{SamplerHandle, StatsSampler};
pub use snapshot::{LatchBook, MetricSnapshot, StatsCategory, VideoMetrics};
