// ── Domain model ──
//
// Value types shared by the sampler, the service and the control plane.

pub mod configuration;
pub mod sample;
pub mod state;

pub use configuration::{Configuration, MinUnit, Mode};
pub use sample::{RateSample, ThroughputSample};
pub use state::{ServiceMode, ServiceRuntimeState};
