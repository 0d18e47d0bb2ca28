// Author: Lukas Bower
// Purpose: Implement the WHO_ARE_YOU?/SCARAB_CLIENT_OK handshake and NAME_* identity sync exchange.
use std::io::{self, BufRead, BufReader, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use scarab_identity::{HardwareIdentity, LEGACY_REMOTE_HASH};

/// Substring the device's handshake response must contain to be accepted.
const HANDSHAKE_OK: &str = "SCARAB_CLIENT_OK";
/// Marker preceding the remote identity hash, when present.
const HASH_MARKER: &str = "|H:";
/// Quiet gap enforced between the three `NAME_*` sync lines.
pub const NAME_LINE_GAP: Duration = Duration::from_millis(40);

/// Send `WHO_ARE_YOU?\n` and wait for a line containing `SCARAB_CLIENT_OK`.
///
/// Returns the 8-hex-char remote identity hash embedded in an optional
/// `|H:XXXXXXXX` suffix, or the legacy placeholder `"00000000"` when the
/// peer doesn't report one. Relies on the caller having already configured
/// the port's read timeout (a 200 ms handshake deadline); any I/O error
/// (including a timeout) is treated as "no handshake".
pub fn handshake<T: Read + Write>(port: &mut T) -> Option<String> {
    port.write_all(b"WHO_ARE_YOU?\n").ok()?;
    port.flush().ok()?;

    let line = read_line_best_effort(port)?;
    if !line.contains(HANDSHAKE_OK) {
        return None;
    }
    Some(match line.find(HASH_MARKER) {
        Some(pos) => {
            let rest = &line[pos + HASH_MARKER.len()..];
            let hash: String = rest.chars().take_while(|c| c.is_ascii_hexdigit()).collect();
            if hash.len() == 8 {
                hash.to_ascii_uppercase()
            } else {
                LEGACY_REMOTE_HASH.to_owned()
            }
        }
        None => LEGACY_REMOTE_HASH.to_owned(),
    })
}

/// Push `NAME_CPU=`/`NAME_GPU=`/`NAME_HASH=` to the device when the remote
/// identity hash has diverged from the local one. Fire-and-forget: no
/// response is read, matching the wire contract.
pub fn sync_identity_if_needed<T: Write>(
    port: &mut T,
    identity: &HardwareIdentity,
    remote_hash: &str,
) -> io::Result<bool> {
    if remote_hash == identity.identity_hash {
        return Ok(false);
    }
    write_line(port, &format!("NAME_CPU={}", identity.cpu_name))?;
    thread::sleep(NAME_LINE_GAP);
    write_line(port, &format!("NAME_GPU={}", identity.gpu_name))?;
    thread::sleep(NAME_LINE_GAP);
    write_line(port, &format!("NAME_HASH={}", identity.identity_hash))?;
    Ok(true)
}

fn write_line<T: Write>(port: &mut T, line: &str) -> io::Result<()> {
    port.write_all(line.as_bytes())?;
    port.write_all(b"\n")?;
    port.flush()
}

/// Read one line, tolerating a trailing `\r`, with no externally-visible
/// deadline beyond whatever the caller configured on the port itself.
fn read_line_best_effort<T: Read>(port: &mut T) -> Option<String> {
    let mut reader = BufReader::new(port);
    let mut buf = String::new();
    let deadline = Instant::now() + Duration::from_millis(200);
    loop {
        buf.clear();
        match reader.read_line(&mut buf) {
            Ok(0) => return None,
            Ok(_) => {
                let trimmed = buf.trim_end_matches(['\n', '\r']);
                if !trimmed.is_empty() {
                    return Some(trimmed.to_owned());
                }
                if Instant::now() >= deadline {
                    return None;
                }
            }
            Err(_) => return None,
        }
    }
}
