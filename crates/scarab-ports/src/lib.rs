// Author: Lukas Bower
// Purpose: Enumerate and rank local serial ports for the scarab link manager.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Serial port discovery for the embedded hardware monitor link.
//!
//! `enumerate()` never fails outward: any OS-level enumeration error is
//! logged and surfaced as an empty candidate list so the link manager's
//! scan loop can retry on its own schedule.

use log::warn;

/// Descriptions that mark a port as a debug probe rather than the monitor device.
const SKIP_KEYWORDS: &[&str] = &["JTAG", "Debug", "Debugger", "JLink", "ST-Link"];

/// Descriptions that mark a port as a likely USB-serial bridge chip.
const PREFER_KEYWORDS: &[&str] = &[
    "USB Serial",
    "USB-SERIAL",
    "CP210",
    "CH340",
    "CH341",
    "FTDI",
    "Silicon Labs",
];

/// One candidate serial port, annotated with discovery hints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    /// OS-level port name (e.g. `"COM3"` or `"/dev/ttyUSB0"`).
    pub name: String,
    /// Human-readable description, when the OS exposes one.
    pub description: Option<String>,
    /// True when the port looks like a debug probe and should not be dialed.
    pub skip: bool,
    /// True when the port looks like a USB-serial bridge chip.
    pub prefer: bool,
}

fn contains_keyword(haystack: &str, keywords: &[&str]) -> bool {
    let haystack = haystack.to_ascii_lowercase();
    keywords
        .iter()
        .any(|kw| haystack.contains(&kw.to_ascii_lowercase()))
}

/// Enumerate local serial ports, ordered for dialing.
///
/// Non-skipped ports come first (preferred before others, then by name
/// descending so newly attached USB adapters — which tend to get
/// higher-numbered names — sort first); skipped ports are appended at the
/// end, preserved for diagnostics rather than dropped.
#[must_use]
pub fn enumerate() -> Vec<PortCandidate> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(err) => {
            warn!("serial port enumeration failed: {err}");
            return Vec::new();
        }
    };

    let mut candidates: Vec<PortCandidate> = ports
        .into_iter()
        .map(|port| {
            let description = port_description(&port);
            let haystack = description.as_deref().unwrap_or("");
            PortCandidate {
                name: port.port_name,
                skip: contains_keyword(haystack, SKIP_KEYWORDS),
                prefer: contains_keyword(haystack, PREFER_KEYWORDS),
                description,
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.skip
            .cmp(&b.skip)
            .then_with(|| b.prefer.cmp(&a.prefer))
            .then_with(|| b.name.cmp(&a.name))
    });
    candidates
}

fn port_description(port: &serialport::SerialPortInfo) -> Option<String> {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb) => {
            let mut parts = Vec::new();
            if let Some(manufacturer) = &usb.manufacturer {
                parts.push(manufacturer.clone());
            }
            if let Some(product) = &usb.product {
                parts.push(product.clone());
            }
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" "))
            }
        }
        serialport::SerialPortType::PciPort => None,
        serialport::SerialPortType::BluetoothPort => Some("Bluetooth".to_owned()),
        serialport::SerialPortType::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, description: &str) -> PortCandidate {
        PortCandidate {
            name: name.to_owned(),
            skip: contains_keyword(description, SKIP_KEYWORDS),
            prefer: contains_keyword(description, PREFER_KEYWORDS),
            description: Some(description.to_owned()),
        }
    }

    fn sort(mut candidates: Vec<PortCandidate>) -> Vec<PortCandidate> {
        candidates.sort_by(|a, b| {
            a.skip
                .cmp(&b.skip)
                .then_with(|| b.prefer.cmp(&a.prefer))
                .then_with(|| b.name.cmp(&a.name))
        });
        candidates
    }

    #[test]
    fn jtag_probe_is_flagged_skip_and_sorts_last() {
        let candidates = sort(vec![
            candidate("COM3", "JTAG Debugger"),
            candidate("COM5", "USB Serial Device"),
        ]);
        assert!(!candidates[0].skip);
        assert_eq!(candidates[0].name, "COM5");
        assert!(candidates[1].skip);
        assert_eq!(candidates[1].name, "COM3");
    }

    #[test]
    fn preferred_bridge_chip_sorts_before_plain_port() {
        let candidates = sort(vec![
            candidate("COM4", "Standard Serial over Bluetooth"),
            candidate("COM7", "CP2102 USB to UART Bridge"),
        ]);
        assert!(candidates[0].prefer);
        assert_eq!(candidates[0].name, "COM7");
    }

    #[test]
    fn ties_sort_by_name_descending() {
        let candidates = sort(vec![candidate("COM3", ""), candidate("COM10", "")]);
        assert_eq!(candidates[0].name, "COM3");
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let candidates = sort(vec![candidate("COM9", "jlink debug probe")]);
        assert!(candidates[0].skip);
    }
}
