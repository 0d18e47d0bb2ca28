// Author: Lukas Bower
// Purpose: Produce one telemetry snapshot per tick from whichever sensor collaborators were selected at startup.
use log::debug;

use crate::snapshot::{Snapshot, UNAVAILABLE};
use crate::sources::{CpuLoadSource, GpuSource, OsCounters, RamSource, CPU_TEMP_PRIORITY, MOBO_TEMP_FALLBACK};
use scarab_identity::NetKind;

/// Produces one [`Snapshot`] per call from whichever sensor collaborators
/// were selected at startup. Performs no I/O itself beyond delegating to
/// those collaborators; missing values always surface as sentinels rather
/// than being fabricated.
pub struct Sampler {
    cpu_load: CpuLoadSource,
    gpu: GpuSource,
    ram: RamSource,
    os: OsCounters,
}

impl Sampler {
    /// Build a sampler from the three polymorphic sources. `os` backs the
    /// OS-counter fallback paths and is always used for network metrics.
    #[must_use]
    pub fn new(cpu_load: CpuLoadSource, gpu: GpuSource, ram: RamSource) -> Self {
        Self {
            cpu_load,
            gpu,
            ram,
            os: OsCounters::new(),
        }
    }

    /// Take one sample from each configured source.
    pub fn sample(&mut self) -> Snapshot {
        let cpu_load = self.sample_cpu_load();
        let cpu_temp = self.sample_cpu_temp();
        let (gpu_load, gpu_temp, gpu_vram_used_gb, gpu_vram_total_gb) = self.sample_gpu();
        let (ram_used_gb, ram_total_gb) = self.sample_ram();
        let (net_down_mbps, net_up_mbps, net_kind, net_link_mbps) = self.sample_net();

        Snapshot {
            cpu_load,
            cpu_temp,
            gpu_load,
            gpu_temp,
            gpu_vram_used_gb,
            gpu_vram_total_gb,
            ram_used_gb,
            ram_total_gb,
            net_down_mbps,
            net_up_mbps,
            net_kind,
            net_link_mbps,
        }
    }

    fn sample_cpu_load(&mut self) -> i32 {
        let reading = match &mut self.cpu_load {
            CpuLoadSource::Native(native) => native.cpu_load_percent().or_else(|| self.os.cpu_load_percent()),
            CpuLoadSource::OsCounter => self.os.cpu_load_percent(),
        };
        reading.map(|v| v.round() as i32).unwrap_or(UNAVAILABLE as i32)
    }

    fn sample_cpu_temp(&mut self) -> f32 {
        let native = match &mut self.cpu_load {
            CpuLoadSource::Native(native) => Some(native),
            CpuLoadSource::OsCounter => None,
        };
        let Some(native) = native else {
            return UNAVAILABLE;
        };

        let cpu_candidates = native.cpu_temperature_candidates();
        if let Some(value) = pick_by_priority(&cpu_candidates, CPU_TEMP_PRIORITY) {
            if value > 0.0 {
                return value;
            }
        }
        let mobo_candidates = native.motherboard_temperature_candidates();
        if let Some(value) = pick_by_priority(&mobo_candidates, MOBO_TEMP_FALLBACK) {
            if value > 0.0 {
                return value;
            }
        }
        debug!("no positive cpu temperature sensor matched; reporting unavailable");
        UNAVAILABLE
    }

    fn sample_gpu(&mut self) -> (i32, f32, f32, f32) {
        match &mut self.gpu {
            GpuSource::Vendor(vendor) => match vendor.sample() {
                Some(reading) => (
                    reading.load_percent.round() as i32,
                    reading.temp_c,
                    (reading.vram_used_kib / (1024.0 * 1024.0)) as f32,
                    (reading.vram_total_kib / (1024.0 * 1024.0)) as f32,
                ),
                None => (UNAVAILABLE as i32, UNAVAILABLE, UNAVAILABLE, UNAVAILABLE),
            },
            GpuSource::Generic(native) => match native.gpu_generic() {
                Some(reading) => (
                    reading.load_percent.round() as i32,
                    reading.temp_c,
                    reading.vram_used_mib / 1024.0,
                    reading.vram_total_mib / 1024.0,
                ),
                None => (UNAVAILABLE as i32, UNAVAILABLE, UNAVAILABLE, UNAVAILABLE),
            },
            GpuSource::None => (UNAVAILABLE as i32, UNAVAILABLE, UNAVAILABLE, UNAVAILABLE),
        }
    }

    fn sample_ram(&mut self) -> (f32, f32) {
        match &mut self.ram {
            RamSource::Hardware(native) => native.ram_hardware_gib().unwrap_or_else(|| self.os.ram_gib()),
            RamSource::Os => self.os.ram_gib(),
        }
    }

    fn sample_net(&mut self) -> (f32, f32, NetKind, i64) {
        match self.os.net_reading() {
            Some(reading) => (reading.down_mib_s, reading.up_mib_s, reading.kind, reading.link_mbps),
            None => (UNAVAILABLE, UNAVAILABLE, NetKind::Lan, 0),
        }
    }
}

fn pick_by_priority(candidates: &[(String, f32)], priority: &[&str]) -> Option<f32> {
    for keyword in priority {
        if let Some((_, value)) = candidates
            .iter()
            .find(|(name, _)| name.to_ascii_lowercase().contains(&keyword.to_ascii_lowercase()))
        {
            return Some(*value);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{GenericGpuReading, NamedReading, NativeSensors};

    struct FakeNative {
        cpu_load: Option<f32>,
        cpu_temps: Vec<NamedReading>,
        mobo_temps: Vec<NamedReading>,
    }

    impl NativeSensors for FakeNative {
        fn cpu_load_percent(&mut self) -> Option<f32> {
            self.cpu_load
        }
        fn cpu_temperature_candidates(&mut self) -> Vec<NamedReading> {
            self.cpu_temps.clone()
        }
        fn motherboard_temperature_candidates(&mut self) -> Vec<NamedReading> {
            self.mobo_temps.clone()
        }
        fn gpu_generic(&mut self) -> Option<GenericGpuReading> {
            None
        }
        fn ram_hardware_gib(&mut self) -> Option<(f32, f32)> {
            None
        }
    }

    #[test]
    fn cpu_temp_prefers_package_over_core_average() {
        let native = FakeNative {
            cpu_load: Some(12.0),
            cpu_temps: vec![
                ("Core Average".to_owned(), 40.0),
                ("Package".to_owned(), 54.0),
            ],
            mobo_temps: vec![],
        };
        let mut sampler = Sampler::new(CpuLoadSource::Native(Box::new(native)), GpuSource::None, RamSource::Os);
        let snap = sampler.sample();
        assert_eq!(snap.cpu_temp, 54.0);
        assert_eq!(snap.cpu_load, 12);
    }

    #[test]
    fn cpu_temp_falls_back_to_motherboard_socket_sensor() {
        let native = FakeNative {
            cpu_load: Some(1.0),
            cpu_temps: vec![],
            mobo_temps: vec![("Socket".to_owned(), 38.5)],
        };
        let mut sampler = Sampler::new(CpuLoadSource::Native(Box::new(native)), GpuSource::None, RamSource::Os);
        assert_eq!(sampler.sample().cpu_temp, 38.5);
    }

    #[test]
    fn negative_package_reading_falls_through_to_unavailable() {
        let native = FakeNative {
            cpu_load: Some(5.0),
            cpu_temps: vec![("Package".to_owned(), -1.0)],
            mobo_temps: vec![],
        };
        let mut sampler = Sampler::new(CpuLoadSource::Native(Box::new(native)), GpuSource::None, RamSource::Os);
        assert_eq!(sampler.sample().cpu_temp, UNAVAILABLE);
    }

    #[test]
    fn no_native_source_reports_unavailable_temp() {
        let mut sampler = Sampler::new(CpuLoadSource::OsCounter, GpuSource::None, RamSource::Os);
        assert_eq!(sampler.sample().cpu_temp, UNAVAILABLE);
    }

    #[test]
    fn no_gpu_source_reports_sentinels() {
        let mut sampler = Sampler::new(CpuLoadSource::OsCounter, GpuSource::None, RamSource::Os);
        let snap = sampler.sample();
        assert_eq!(snap.gpu_load, UNAVAILABLE as i32);
        assert_eq!(snap.gpu_temp, UNAVAILABLE);
    }
}
