use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Well-known namespaces for name-based (v3/v5) dSUID generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// EnOcean device ids.
    EnOcean,
    /// GS1-128 product codes.
    Gs1_128,
    /// IEEE MAC addresses.
    IeeeMac,
    /// vdSM instances.
    Vdsm,
    /// vDC instances.
    Vdc,
}

impl Namespace {
    pub const ALL: [Namespace; 5] = [
        Namespace::EnOcean,
        Namespace::Gs1_128,
        Namespace::IeeeMac,
        Namespace::Vdsm,
        Namespace::Vdc,
    ];

    /// The namespace UUID.
    pub const fn uuid(self) -> Uuid {
        match self {
            Namespace::EnOcean => Uuid::from_u128(0x0ba94a7b_7c92_4dab_b8e3_5fe09e83d0f3),
            Namespace::Gs1_128 => Uuid::from_u128(0x8ca838d5_4c40_47cc_bafa_37ac89658962),
            Namespace::IeeeMac => Uuid::from_u128(0xad019650_5330_4582_8506_62c7340b34e6),
            Namespace::Vdsm => Uuid::from_u128(0x195de5c0_902f_4b71_a706_b43b80765e3d),
            Namespace::Vdc => Uuid::from_u128(0x9888dd3d_b345_4109_b088_2673306d0c65),
        }
    }

    /// The 16 namespace bytes hashed in front of the name.
    pub fn as_bytes(self) -> [u8; 16] {
        self.uuid().into_bytes()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Namespace::EnOcean => "enocean",
            Namespace::Gs1_128 => "gs1-128",
            Namespace::IeeeMac => "ieee-mac",
            Namespace::Vdsm => "vdsm",
            Namespace::Vdc => "vdc",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Namespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase().replace('_', "-");
        Namespace::ALL
            .into_iter()
            .find(|ns| ns.name() == wanted)
            .ok_or_else(|| {
                format!("unknown namespace '{s}' (expected one of: enocean, gs1-128, ieee-mac, vdsm, vdc)")
            })
    }
}
