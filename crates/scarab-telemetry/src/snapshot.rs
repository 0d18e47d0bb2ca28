// Author: Lukas Bower
// Purpose: Define the immutable telemetry snapshot value type.
use scarab_identity::NetKind;

/// Sentinel used for any reading the sampler could not obtain.
pub const UNAVAILABLE: f32 = -1.0;

/// One immutable telemetry sample. Negative sentinels (`-1`) are preserved
/// end to end; the framer never fabricates a value to replace one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    /// CPU load, percent 0..100 (or the negative sentinel).
    pub cpu_load: i32,
    /// CPU package temperature in °C, or [`UNAVAILABLE`].
    pub cpu_temp: f32,
    /// GPU load, percent 0..100 (or the negative sentinel).
    pub gpu_load: i32,
    /// GPU temperature in °C, or [`UNAVAILABLE`].
    pub gpu_temp: f32,
    /// Dedicated VRAM currently in use, GiB.
    pub gpu_vram_used_gb: f32,
    /// Total dedicated VRAM, GiB.
    pub gpu_vram_total_gb: f32,
    /// System RAM currently in use, GiB.
    pub ram_used_gb: f32,
    /// Total system RAM, GiB.
    pub ram_total_gb: f32,
    /// Download throughput on the chosen interface, MiB/s.
    pub net_down_mbps: f32,
    /// Upload throughput on the chosen interface, MiB/s.
    pub net_up_mbps: f32,
    /// Class of the chosen network interface.
    pub net_kind: NetKind,
    /// Link speed of the chosen interface, Mbps.
    pub net_link_mbps: i64,
}
