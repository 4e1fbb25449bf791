use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::dsuid::Dsuid;

const HOST_ID_MASK: u64 = 0xFFFF_FFFF_FFFF;
const SYS_CLASS_NET: &str = "/sys/class/net";

#[derive(Debug, Default)]
struct ClockState {
    last_millis: u64,
    sequence: u16,
}

/// Time-based (v1) dSUID generator.
///
/// Holds the per-process host identifier and the clock sequence. Create one
/// at startup and share it; every id it hands out is distinct as long as the
/// same millisecond is not hit more than 65536 times.
#[derive(Debug)]
pub struct DsuidGenerator {
    host_id: u64,
    clock: Mutex<ClockState>,
}

impl DsuidGenerator {
    /// Generator whose host id is derived from the local hardware address,
    /// scrambled with random bits so the address cannot be recovered.
    pub fn new() -> Self {
        let random = random_host_bits();
        let host_id = match first_hardware_address(Path::new(SYS_CLASS_NET)) {
            Some(mac) => {
                tracing::debug!("derived v1 host id from hardware address");
                mac ^ random
            }
            None => {
                tracing::debug!("no hardware address found, using random v1 host id");
                random
            }
        };
        Self::with_host_id(host_id)
    }

    /// Generator with an explicit 48-bit host id. Higher bits are dropped.
    pub fn with_host_id(host_id: u64) -> Self {
        Self {
            host_id: host_id & HOST_ID_MASK,
            clock: Mutex::new(ClockState::default()),
        }
    }

    pub fn host_id(&self) -> u64 {
        self.host_id
    }

    /// Time-based dSUID for the current wall clock.
    pub fn generate_v1(&self) -> Dsuid {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        self.generate_v1_at(millis)
    }

    /// Time-based dSUID for a given Unix time in milliseconds.
    ///
    /// Layout of the high word: `time_low` = low 32 bits of the timestamp,
    /// `time_mid` = bits 32..48, `time_hi_and_version` = version 1 plus bits
    /// 48..60. The low word is the 16-bit clock sequence followed by the
    /// 48-bit host id. The sequence restarts at 0 whenever the clock moves
    /// forward and is incremented otherwise.
    pub fn generate_v1_at(&self, millis: u64) -> Dsuid {
        let sequence = {
            let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
            if millis > clock.last_millis {
                clock.last_millis = millis;
                clock.sequence = 0;
            } else {
                clock.sequence = clock.sequence.wrapping_add(1);
            }
            clock.sequence
        };

        let mut msb = millis << 32;
        msb |= (millis & 0xFFFF_0000_0000) >> 16;
        msb |= 0x1000 | ((millis >> 48) & 0x0FFF);

        let lsb = (u64::from(sequence) << 48) | self.host_id;

        Dsuid::from_uuid(Uuid::from_u64_pair(msb, lsb))
    }
}

impl Default for DsuidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn random_host_bits() -> u64 {
    (Uuid::new_v4().as_u128() as u64) & HOST_ID_MASK
}

/// First non-loopback, non-zero MAC address listed under `root`.
fn first_hardware_address(root: &Path) -> Option<u64> {
    let mut names: Vec<_> = std::fs::read_dir(root)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    names.sort();

    names
        .iter()
        .filter(|path| path.file_name().is_some_and(|name| name != "lo"))
        .filter_map(|path| std::fs::read_to_string(path.join("address")).ok())
        .filter_map(|text| parse_mac(text.trim()))
        .find(|mac| *mac != 0)
}

fn parse_mac(text: &str) -> Option<u64> {
    let mut value = 0u64;
    let mut octets = 0;
    for part in text.split(':') {
        let byte = u8::from_str_radix(part, 16).ok()?;
        value = (value << 8) | u64::from(byte);
        octets += 1;
    }
    (octets == 6).then_some(value)
}
