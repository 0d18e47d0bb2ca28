// Author: Lukas Bower
// Purpose: Define the CPU/GPU/RAM sensor source traits and the OS-counter fallback collector.

//! Sensor source polymorphism.
//!
//! A native hardware-sensor collector (a visitor over a
//! LibreHardwareMonitor-style `Computer` object) lives outside this
//! crate; here it is a trait a caller can implement and inject, with a
//! concrete OS-counter fallback that needs no external collaborator.
//! Each `*Source` enum is selected once at process startup and held for
//! the sampler's lifetime.

use std::time::Instant;

use scarab_identity::NetKind;

/// CPU temperature sensor labels tried in priority order.
pub const CPU_TEMP_PRIORITY: &[&str] = &["Package", "Core Max", "Core Average", "Tctl"];
/// Motherboard sensor labels accepted as a CPU-temperature fallback.
pub const MOBO_TEMP_FALLBACK: &[&str] = &["CPU", "Socket"];

/// One reading from a generic (non-vendor-specific) GPU sensor node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenericGpuReading {
    /// `"GPU Core"` load sensor, percent.
    pub load_percent: f32,
    /// `"GPU Core"` temperature sensor, °C.
    pub temp_c: f32,
    /// `"GPU Memory Used"`, MiB.
    pub vram_used_mib: f32,
    /// `"GPU Memory Total"`, MiB.
    pub vram_total_mib: f32,
}

/// One reading from a vendor GPU API (e.g. NVML), with VRAM in KiB as the
/// vendor API typically reports it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VendorGpuReading {
    /// Load percentage reported by the vendor API.
    pub load_percent: f32,
    /// First thermal sensor, °C.
    pub temp_c: f32,
    /// Dedicated VRAM in use, KiB.
    pub vram_used_kib: f64,
    /// Total dedicated VRAM, KiB.
    pub vram_total_kib: f64,
}

/// A named sensor reading, used for the CPU/motherboard temperature
/// priority scan: the sampler picks the first entry whose name matches a
/// keyword in [`CPU_TEMP_PRIORITY`]/[`MOBO_TEMP_FALLBACK`].
pub type NamedReading = (String, f32);

/// Collaborator interface over a native hardware-sensor tree (the
/// LibreHardwareMonitor/vendor-GPU-SDK equivalent). Implementations are
/// supplied by the embedding application; this crate ships no concrete one
/// beyond the OS-counter fallback.
pub trait NativeSensors: Send {
    /// `"CPU Total"` load sensor, percent.
    fn cpu_load_percent(&mut self) -> Option<f32>;
    /// Every temperature sensor under the CPU node and its sub-hardware.
    fn cpu_temperature_candidates(&mut self) -> Vec<NamedReading>;
    /// Every motherboard temperature sensor, for the CPU-temp fallback.
    fn motherboard_temperature_candidates(&mut self) -> Vec<NamedReading>;
    /// Generic (non-vendor) GPU node reading, when a GPU is present.
    fn gpu_generic(&mut self) -> Option<GenericGpuReading>;
    /// `"Memory Used"`/`"Memory Available"` sensors, GiB.
    fn ram_hardware_gib(&mut self) -> Option<(f32, f32)>;
}

/// Collaborator interface over a vendor GPU API (NVML and similar).
pub trait VendorGpu: Send {
    /// Sample load, temperature, and VRAM from the vendor API.
    fn sample(&mut self) -> Option<VendorGpuReading>;
}

/// How CPU load is sampled.
pub enum CpuLoadSource {
    /// Preferred: the native sensor tree's `"CPU Total"` sensor.
    Native(Box<dyn NativeSensors>),
    /// Degraded fallback: the OS process/processor counter.
    OsCounter,
}

/// How GPU metrics are sampled.
pub enum GpuSource {
    /// Preferred: a vendor-specific API (e.g. NVML).
    Vendor(Box<dyn VendorGpu>),
    /// Fallback: the generic GPU sensor node.
    Generic(Box<dyn NativeSensors>),
    /// No GPU collaborator available; GPU fields report the sentinel.
    None,
}

/// How RAM is sampled.
pub enum RamSource {
    /// Preferred: the native sensor tree's memory node.
    Hardware(Box<dyn NativeSensors>),
    /// Fallback: an OS query for total/free physical memory.
    Os,
}

fn classify_interface_name(name: &str) -> NetKind {
    let lower = name.to_ascii_lowercase();
    const WIRELESS_HINTS: &[&str] = &["wl", "wifi", "wi-fi", "wireless", "airport"];
    if WIRELESS_HINTS.iter().any(|hint| lower.contains(hint)) {
        NetKind::Wlan
    } else {
        NetKind::Lan
    }
}

/// Link speed of `name`, in bits per second, read from the OS where
/// available. Linux exposes this at `/sys/class/net/<name>/speed`; other
/// platforms have no portable equivalent without a vendor SDK, so this
/// returns `None` there.
fn link_speed_bps(name: &str) -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let raw = std::fs::read_to_string(format!("/sys/class/net/{name}/speed")).ok()?;
        let mbps: i64 = raw.trim().parse().ok()?;
        if mbps > 0 {
            return Some(mbps as u64 * 1_000_000);
        }
        None
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = name;
        None
    }
}

struct InterfaceCounters {
    last_rx_bytes: u64,
    last_tx_bytes: u64,
    last_sample: Instant,
}

/// Reading produced by the OS-level network fallback (always used; the
/// spec defines no vendor/native duality for network metrics).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkReading {
    /// Download throughput, MiB/s.
    pub down_mib_s: f32,
    /// Upload throughput, MiB/s.
    pub up_mib_s: f32,
    /// Interface class.
    pub kind: NetKind,
    /// Link speed, Mbps.
    pub link_mbps: i64,
}

/// The OS-counter fallback used for CPU load, RAM, and (always) network.
/// Wraps a single `sysinfo::System` refreshed on every sample so the three
/// degraded-mode paths share one underlying snapshot, mirroring the
/// teacher's `gpu-bridge-host::MockInventory` pattern of holding one
/// concrete collaborator for the process lifetime.
pub struct OsCounters {
    system: sysinfo::System,
    networks: sysinfo::Networks,
    interfaces: std::collections::HashMap<String, InterfaceCounters>,
}

impl OsCounters {
    /// Build a fresh OS-counter source with an initial refresh.
    #[must_use]
    pub fn new() -> Self {
        let mut system = sysinfo::System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        let networks = sysinfo::Networks::new_with_refreshed_list();
        Self {
            system,
            networks,
            interfaces: std::collections::HashMap::new(),
        }
    }

    /// CPU load percent from the OS processor counter.
    pub fn cpu_load_percent(&mut self) -> Option<f32> {
        self.system.refresh_cpu_usage();
        Some(self.system.global_cpu_usage())
    }

    /// Used/total physical RAM, GiB, from the OS.
    pub fn ram_gib(&mut self) -> (f32, f32) {
        self.system.refresh_memory();
        const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
        let used = (self.system.used_memory() as f64 / GIB) as f32;
        let total = (self.system.total_memory() as f64 / GIB) as f32;
        (used, total)
    }

    /// Best active non-loopback interface with an IPv4 address, preferring
    /// Ethernet-looking names over wireless ones.
    pub fn net_reading(&mut self) -> Option<NetworkReading> {
        self.networks.refresh(true);
        let ipv4_names = ipv4_capable_interface_names();

        let mut chosen: Option<(&String, &sysinfo::NetworkData)> = None;
        for (name, data) in self.networks.iter() {
            if !ipv4_names.contains(name.as_str()) {
                continue;
            }
            let better = match chosen {
                None => true,
                Some((current_name, _)) => {
                    let current_is_lan = classify_interface_name(current_name) == NetKind::Lan;
                    let candidate_is_lan = classify_interface_name(name) == NetKind::Lan;
                    candidate_is_lan && !current_is_lan
                }
            };
            if better {
                chosen = Some((name, data));
            }
        }

        let (name, data) = chosen?;
        let now = Instant::now();
        let rx_total = data.total_received();
        let tx_total = data.total_transmitted();
        let entry = self.interfaces.entry(name.clone()).or_insert(InterfaceCounters {
            last_rx_bytes: rx_total,
            last_tx_bytes: tx_total,
            last_sample: now,
        });
        let elapsed = now.duration_since(entry.last_sample).as_secs_f32().max(0.001);
        let down_mib_s = rx_total.saturating_sub(entry.last_rx_bytes) as f32 / (1024.0 * 1024.0) / elapsed;
        let up_mib_s = tx_total.saturating_sub(entry.last_tx_bytes) as f32 / (1024.0 * 1024.0) / elapsed;
        entry.last_rx_bytes = rx_total;
        entry.last_tx_bytes = tx_total;
        entry.last_sample = now;

        let link_mbps = link_speed_bps(name).map(|bps| (bps / 1_000_000) as i64).unwrap_or(0);

        Some(NetworkReading {
            down_mib_s,
            up_mib_s,
            kind: classify_interface_name(name),
            link_mbps,
        })
    }
}

impl Default for OsCounters {
    fn default() -> Self {
        Self::new()
    }
}

fn ipv4_capable_interface_names() -> std::collections::HashSet<String> {
    if_addrs::get_if_addrs()
        .unwrap_or_default()
        .into_iter()
        .filter(|iface| !iface.is_loopback() && iface.ip().is_ipv4())
        .map(|iface| iface.name)
        .collect()
}
