//! Device Capability Detector
//!
//! Module structure:
//! - detector.rs: host probing, tier classification, cached DeviceCapability
//! - recommendations.rs: tier to catalog model mapping

pub mod detector;
pub mod recommendations;

pub use detector::{
    calculate_tier, DeviceCapability, DeviceDetector, GpuType, HostProbe, HostSnapshot,
    PerformanceTier, StaticProbe, SysinfoProbe,
};
pub use recommendations::recommend;
