//! Hardware ROM families and the decoded ROM images handed to emulators.

use alloc::vec::Vec;
use core::fmt;
use core::str::FromStr;

use crate::frame::UnknownName;

/// A supported hardware family, identified by the ROM set installed.
///
/// Declaration order is detection priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RomFamily {
    Mk2,
    St,
    Mk1,
    Cm300,
    Jv880,
    Scb55,
    Rlp3237,
    Sc155,
    Sc155Mk2,
}

impl RomFamily {
    pub const ALL: [RomFamily; 9] = [
        RomFamily::Mk2,
        RomFamily::St,
        RomFamily::Mk1,
        RomFamily::Cm300,
        RomFamily::Jv880,
        RomFamily::Scb55,
        RomFamily::Rlp3237,
        RomFamily::Sc155,
        RomFamily::Sc155Mk2,
    ];

    /// Human readable model name.
    pub const fn display_name(self) -> &'static str {
        match self {
            RomFamily::Mk2 => "SC-55mk2",
            RomFamily::St => "SC-55st",
            RomFamily::Mk1 => "SC-55mk1",
            RomFamily::Cm300 => "CM-300/SCC-1",
            RomFamily::Jv880 => "JV-880",
            RomFamily::Scb55 => "SCB-55",
            RomFamily::Rlp3237 => "RLP-3237",
            RomFamily::Sc155 => "SC-155",
            RomFamily::Sc155Mk2 => "SC-155mk2",
        }
    }

    /// Short name accepted on the command line.
    pub const fn short_name(self) -> &'static str {
        match self {
            RomFamily::Mk2 => "mk2",
            RomFamily::St => "st",
            RomFamily::Mk1 => "mk1",
            RomFamily::Cm300 => "cm300",
            RomFamily::Jv880 => "jv880",
            RomFamily::Scb55 => "scb55",
            RomFamily::Rlp3237 => "rlp3237",
            RomFamily::Sc155 => "sc155",
            RomFamily::Sc155Mk2 => "sc155mk2",
        }
    }

    /// First-generation hardware with the three 1 MiB wave ROM layout.
    pub const fn is_mk1(self) -> bool {
        matches!(self, RomFamily::Mk1 | RomFamily::Cm300 | RomFamily::Sc155)
    }

    pub const fn is_jv880(self) -> bool {
        matches!(self, RomFamily::Jv880)
    }

    /// Families whose second wave ROM occupies the third wave slot.
    pub const fn is_scb55(self) -> bool {
        matches!(self, RomFamily::Scb55 | RomFamily::Rlp3237)
    }

    /// Simulated nanoseconds per emulator step. Best guesses.
    pub const fn ns_per_step(self) -> u64 {
        if self.is_mk1() {
            600
        } else {
            500
        }
    }
}

impl fmt::Display for RomFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for RomFamily {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RomFamily::ALL
            .into_iter()
            .find(|family| family.short_name() == s)
            .ok_or_else(|| UnknownName(s.into()))
    }
}

/// Decoded ROM contents for one hardware family.
///
/// Wave ROMs are already unscrambled. Loaded once per job and shared
/// read-only by every instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RomImages {
    pub family: RomFamily,
    pub rom1: Vec<u8>,
    pub rom2: Vec<u8>,
    /// Address mask for `rom2` (its length minus one)
    pub rom2_mask: usize,
    pub waverom1: Vec<u8>,
    pub waverom2: Vec<u8>,
    pub waverom3: Vec<u8>,
    pub waverom_exp: Option<Vec<u8>>,
    pub waverom_card: Option<Vec<u8>>,
    pub sub_rom: Option<Vec<u8>>,
}

impl RomImages {
    pub fn empty(family: RomFamily) -> Self {
        Self {
            family,
            rom1: Vec::new(),
            rom2: Vec::new(),
            rom2_mask: 0,
            waverom1: Vec::new(),
            waverom2: Vec::new(),
            waverom3: Vec::new(),
            waverom_exp: None,
            waverom_card: None,
            sub_rom: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_parse() {
        for family in RomFamily::ALL {
            assert_eq!(family.short_name().parse::<RomFamily>(), Ok(family));
        }
        assert!("sc88".parse::<RomFamily>().is_err());
    }

    #[test]
    fn step_constants() {
        assert_eq!(RomFamily::Mk1.ns_per_step(), 600);
        assert_eq!(RomFamily::Cm300.ns_per_step(), 600);
        assert_eq!(RomFamily::Sc155.ns_per_step(), 600);
        assert_eq!(RomFamily::Mk2.ns_per_step(), 500);
        assert_eq!(RomFamily::Jv880.ns_per_step(), 500);
        assert_eq!(RomFamily::Sc155Mk2.ns_per_step(), 500);
    }
}
