// Author: Lukas Bower
// Purpose: Sample and frame telemetry snapshots for the embedded hardware monitor link.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Telemetry sampling and framing for the embedded hardware monitor link.
//!
//! [`Sampler`] produces one immutable [`Snapshot`] per tick from whichever
//! sensor collaborators the embedding application selected at startup (see
//! [`sources`]); [`Framer`] formats those snapshots into the canonical wire
//! line and paces transmission at 1 Hz over a shared writer.

pub mod framer;
pub mod sampler;
pub mod snapshot;
pub mod sources;

pub use framer::{format_telemetry_line, Framer, FramerError, SAMPLE_INTERVAL};
pub use sampler::Sampler;
pub use snapshot::{Snapshot, UNAVAILABLE};
pub use sources::{
    CpuLoadSource, GenericGpuReading, GpuSource, NativeSensors, NetworkReading, OsCounters, RamSource,
    VendorGpu, VendorGpuReading,
};
