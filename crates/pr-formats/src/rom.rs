//! ROM set detection and loading.
//!
//! Program ROMs load verbatim. Wave ROMs are stored with their address and
//! data lines scrambled; [`unscramble`] reverses that wiring.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use pr_ir::{RomFamily, RomImages};

use crate::RomError;

pub const ROM1_SIZE: usize = 0x8000;
pub const ROM2_SIZE: usize = 0x80000;
pub const ROMSM_SIZE: usize = 0x1000;

const WAVE_1M: usize = 0x100000;
const WAVE_2M: usize = 0x200000;
const WAVE_8M: usize = 0x800000;

/// Files per family. Slot order: rom1, rom2, waverom1, waverom2,
/// waverom3 / expansion / sub-MCU ROM, PCM card.
const SLOTS: usize = 6;

/// Only the first five slots take part in detection.
const DETECT_SLOTS: usize = 5;

/// Source address bit for each bit of the destination index.
const ADDRESS_PERMUTATION: [u32; 20] = [
    2, 0, 3, 4, 1, 9, 13, 10, 18, 17, 6, 15, 11, 16, 8, 5, 12, 7, 14, 19,
];

/// Source data bit for each bit of the destination byte.
const DATA_PERMUTATION: [u32; 8] = [2, 0, 4, 5, 7, 6, 3, 1];

/// File names for a family, `None` where a slot is unused.
pub fn family_files(family: RomFamily) -> [Option<&'static str>; SLOTS] {
    match family {
        RomFamily::Mk2 | RomFamily::Sc155Mk2 => [
            Some("rom1.bin"),
            Some("rom2.bin"),
            Some("waverom1.bin"),
            Some("waverom2.bin"),
            Some("rom_sm.bin"),
            None,
        ],
        RomFamily::St => [
            Some("rom1.bin"),
            Some("rom2_st.bin"),
            Some("waverom1.bin"),
            Some("waverom2.bin"),
            Some("rom_sm.bin"),
            None,
        ],
        RomFamily::Mk1 => [
            Some("sc55_rom1.bin"),
            Some("sc55_rom2.bin"),
            Some("sc55_waverom1.bin"),
            Some("sc55_waverom2.bin"),
            Some("sc55_waverom3.bin"),
            None,
        ],
        RomFamily::Cm300 => [
            Some("cm300_rom1.bin"),
            Some("cm300_rom2.bin"),
            Some("cm300_waverom1.bin"),
            Some("cm300_waverom2.bin"),
            Some("cm300_waverom3.bin"),
            None,
        ],
        RomFamily::Jv880 => [
            Some("jv880_rom1.bin"),
            Some("jv880_rom2.bin"),
            Some("jv880_waverom1.bin"),
            Some("jv880_waverom2.bin"),
            Some("jv880_waverom_expansion.bin"),
            Some("jv880_waverom_pcmcard.bin"),
        ],
        RomFamily::Scb55 => [
            Some("scb55_rom1.bin"),
            Some("scb55_rom2.bin"),
            Some("scb55_waverom1.bin"),
            Some("scb55_waverom2.bin"),
            None,
            None,
        ],
        RomFamily::Rlp3237 => [
            Some("rlp3237_rom1.bin"),
            Some("rlp3237_rom2.bin"),
            Some("rlp3237_waverom1.bin"),
            None,
            None,
            None,
        ],
        RomFamily::Sc155 => [
            Some("sc155_rom1.bin"),
            Some("sc155_rom2.bin"),
            Some("sc155_waverom1.bin"),
            Some("sc155_waverom2.bin"),
            Some("sc155_waverom3.bin"),
            None,
        ],
    }
}

/// Find the first family, in priority order, whose files are all present.
pub fn detect_family(dir: &Path) -> Result<RomFamily, RomError> {
    RomFamily::ALL
        .into_iter()
        .find(|&family| {
            family_files(family)[..DETECT_SLOTS]
                .iter()
                .flatten()
                .all(|name| dir.join(name).exists())
        })
        .ok_or_else(|| RomError::NotDetected(dir.to_path_buf()))
}

/// Reverse the wave ROM scrambling into `dst`.
///
/// For each destination index `i`, the low 20 bits of `i` are permuted into
/// a source address (higher bits pass through) and the source byte's bits
/// are permuted into the destination byte.
///
/// Panics if `src` is shorter than `dst`.
pub fn unscramble(src: &[u8], dst: &mut [u8]) {
    assert!(src.len() >= dst.len(), "wave ROM source shorter than destination");

    for (i, out) in dst.iter_mut().enumerate() {
        let mut address = i & !0xFFFFF;
        for (j, &bit) in ADDRESS_PERMUTATION.iter().enumerate() {
            if i & (1 << j) != 0 {
                address |= 1 << bit;
            }
        }

        let src_byte = src[address];
        let mut data = 0u8;
        for (j, &bit) in DATA_PERMUTATION.iter().enumerate() {
            if src_byte & (1 << bit) != 0 {
                data |= 1 << j;
            }
        }
        *out = data;
    }
}

/// Load every ROM image for `family` from `dir`.
pub fn load_roms(family: RomFamily, dir: &Path) -> Result<RomImages, RomError> {
    let names = family_files(family);
    let mut files: [Option<Vec<u8>>; SLOTS] = Default::default();
    let mut missing = Vec::new();

    for (slot, name) in names.iter().enumerate() {
        let Some(name) = name else { continue };
        let path = dir.join(name);
        match fs::read(&path) {
            Ok(bytes) => files[slot] = Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let optional = family.is_jv880() && slot >= 4;
                if !optional {
                    missing.push(path);
                }
            }
            Err(source) => return Err(RomError::Io { file: path, source }),
        }
    }

    if !missing.is_empty() {
        return Err(RomError::MissingFiles(missing));
    }

    let path_of = |slot: usize| dir.join(names[slot].unwrap_or_default());
    let mut images = RomImages::empty(family);

    images.rom1 = exact(files[0].take(), ROM1_SIZE, path_of(0))?;

    let mut rom2 = files[1].take().unwrap_or_default();
    rom2.truncate(ROM2_SIZE);
    if rom2.len() != ROM2_SIZE && rom2.len() != ROM2_SIZE / 2 {
        return Err(RomError::WrongSize { file: path_of(1), actual: rom2.len() });
    }
    images.rom2_mask = rom2.len() - 1;
    images.rom2 = rom2;

    if family.is_mk1() {
        images.waverom1 = wave(files[2].take(), WAVE_1M, path_of(2))?;
        images.waverom2 = wave(files[3].take(), WAVE_1M, path_of(3))?;
        images.waverom3 = wave(files[4].take(), WAVE_1M, path_of(4))?;
    } else if family.is_jv880() {
        images.waverom1 = wave(files[2].take(), WAVE_2M, path_of(2))?;
        images.waverom2 = wave(files[3].take(), WAVE_2M, path_of(3))?;
        images.waverom_exp = optional_wave(files[4].take(), WAVE_8M, "expansion");
        images.waverom_card = optional_wave(files[5].take(), WAVE_2M, "PCM card");
    } else {
        images.waverom1 = wave(files[2].take(), WAVE_2M, path_of(2))?;
        if let Some(bytes) = files[3].take() {
            let second = wave(Some(bytes), WAVE_1M, path_of(3))?;
            if family.is_scb55() {
                images.waverom3 = second;
            } else {
                images.waverom2 = second;
            }
        }
        if let Some(bytes) = files[4].take() {
            images.sub_rom = Some(exact(Some(bytes), ROMSM_SIZE, path_of(4))?);
        }
    }

    Ok(images)
}

/// The first `len` bytes of a file, or a short-read error.
fn exact(bytes: Option<Vec<u8>>, len: usize, file: PathBuf) -> Result<Vec<u8>, RomError> {
    let mut bytes = bytes.unwrap_or_default();
    if bytes.len() < len {
        return Err(RomError::ShortRead { file, expected: len, actual: bytes.len() });
    }
    bytes.truncate(len);
    Ok(bytes)
}

fn wave(bytes: Option<Vec<u8>>, len: usize, file: PathBuf) -> Result<Vec<u8>, RomError> {
    let raw = exact(bytes, len, file)?;
    let mut out = vec![0u8; len];
    unscramble(&raw, &mut out);
    Ok(out)
}

fn optional_wave(bytes: Option<Vec<u8>>, len: usize, what: &str) -> Option<Vec<u8>> {
    match bytes {
        Some(raw) if raw.len() >= len => {
            let mut out = vec![0u8; len];
            unscramble(&raw[..len], &mut out);
            Some(out)
        }
        _ => {
            tracing::info!("WaveRom {} not found, skipping it", what);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Apply the hardware scrambling, the inverse of `unscramble`.
    fn scramble(plain: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; plain.len()];
        for (i, &byte) in plain.iter().enumerate() {
            let mut address = i & !0xFFFFF;
            for (j, &bit) in ADDRESS_PERMUTATION.iter().enumerate() {
                if i & (1 << j) != 0 {
                    address |= 1 << bit;
                }
            }
            let mut data = 0u8;
            for (j, &bit) in DATA_PERMUTATION.iter().enumerate() {
                if byte & (1 << j) != 0 {
                    data |= 1 << bit;
                }
            }
            out[address] = data;
        }
        out
    }

    #[test]
    fn permutation_tables_are_bijective() {
        let mut seen = [false; 20];
        for &b in &ADDRESS_PERMUTATION {
            assert!(!seen[b as usize]);
            seen[b as usize] = true;
        }
        let mut seen = [false; 8];
        for &b in &DATA_PERMUTATION {
            assert!(!seen[b as usize]);
            seen[b as usize] = true;
        }
    }

    #[test]
    fn single_bits_follow_tables() {
        let mut src = vec![0u8; WAVE_1M];
        // Destination index 1 reads source address bit 2; source data bit 2
        // lands in destination bit 0.
        src[1 << 2] = 1 << 2;
        // Destination index 1 << 19 reads source address bit 19; source bit
        // 1 lands in destination bit 7.
        src[1 << 19] = 1 << 1;

        let mut dst = vec![0u8; WAVE_1M];
        unscramble(&src, &mut dst);
        assert_eq!(dst[1], 0b0000_0001);
        assert_eq!(dst[1 << 19], 0b1000_0000);
        assert_eq!(dst[0], 0);
    }

    #[test]
    fn high_address_bits_pass_through() {
        let mut src = vec![0u8; WAVE_2M];
        src[0x100000 | (1 << 2)] = 0xFF;
        let mut dst = vec![0u8; WAVE_2M];
        unscramble(&src, &mut dst);
        assert_eq!(dst[0x100001], 0xFF);
        assert_eq!(dst[1], 0);
    }

    #[test]
    fn unscramble_inverts_scramble() {
        let plain: Vec<u8> = (0..WAVE_1M as u32)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
            .collect();
        let scrambled = scramble(&plain);
        assert_ne!(scrambled, plain);
        let mut out = vec![0u8; WAVE_1M];
        unscramble(&scrambled, &mut out);
        assert_eq!(out, plain);
    }
}
