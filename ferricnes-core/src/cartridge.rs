use serde_derive::{Deserialize, Serialize};

use std::error::Error;
use std::fmt::{self, Debug, Display, Formatter};

// ROM images must begin with "NES" followed by the MS-DOS end-of-file marker.
const MAGIC: [u8; 4] = *b"NES\x1a";

const HEADER_SIZE: usize = 16;
const TRAINER_SIZE: usize = 512;

pub const PRG_ROM_BANK_SIZE: usize = 16 * 1024;
pub const CHR_BANK_SIZE: usize = 8 * 1024;
pub const PRG_RAM_SIZE: usize = 8 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    FourScreen,
}

impl Mirroring {
    /// Maps a nametable address in 0x2000-0x3EFF to an offset into the 2KB
    /// internal VRAM. Four-screen carts would need extra VRAM on the board;
    /// we fold them onto the internal 2KB.
    pub fn mirror_address(self, address: u16) -> u16 {
        let address = address & 0x0FFF;
        match self {
            // Nametables 0,1 share the first 1KB page; 2,3 the second.
            Mirroring::Horizontal => ((address >> 1) & 0x0400) | (address & 0x03FF),
            // Nametables 0,2 share the first 1KB page; 1,3 the second.
            Mirroring::Vertical => address & 0x07FF,
            Mirroring::FourScreen => address & 0x07FF,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum LoadError {
    BadMagic,
    UnsupportedMapper(u8),
    Truncated,
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            LoadError::BadMagic => write!(f, "magic constant in iNES header is incorrect"),
            LoadError::UnsupportedMapper(n) => write!(f, "unsupported mapper number: {}", n),
            LoadError::Truncated => write!(f, "ROM image is shorter than its header claims"),
        }
    }
}

impl Error for LoadError {}

pub struct Cartridge {
    pub mapper: u8,
    pub mirroring: Mirroring,
    pub has_battery: bool,
    pub prg_rom: Vec<u8>,
    pub prg_rom_num_banks: u8,
    /// CHR ROM, or 8KB of CHR RAM when the header declares no CHR.
    pub chr: Vec<u8>,
    pub chr_is_ram: bool,
    pub prg_ram: Vec<u8>,
}

impl Debug for Cartridge {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "mapper: {}, mirroring: {:?}, PRG ROM size: {}, CHR size: {}{}",
            self.mapper,
            self.mirroring,
            self.prg_rom.len(),
            self.chr.len(),
            if self.chr_is_ram { " (RAM)" } else { "" },
        )
    }
}

#[derive(Deserialize, Serialize)]
pub struct State {
    #[serde(with = "serde_bytes")]
    pub prg_ram: Vec<u8>,
    /// Present only for CHR RAM boards; CHR ROM contents never change.
    pub chr_ram: Option<serde_bytes::ByteBuf>,
}

impl Cartridge {
    pub fn load(bytes: &[u8]) -> Result<Cartridge, LoadError> {
        if bytes.len() < HEADER_SIZE {
            return Err(LoadError::Truncated);
        }
        if bytes[0..4] != MAGIC {
            return Err(LoadError::BadMagic);
        }

        let prg_rom_num_banks = bytes[4];
        if prg_rom_num_banks == 0 {
            return Err(LoadError::Truncated);
        }
        let prg_rom_size = prg_rom_num_banks as usize * PRG_ROM_BANK_SIZE;
        let chr_rom_size = bytes[5] as usize * CHR_BANK_SIZE;

        let flags_6 = bytes[6];
        let flags_7 = bytes[7];

        let mirroring = if (flags_6 & 0x08) != 0 {
            Mirroring::FourScreen
        } else if (flags_6 & 0x01) != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };

        let has_battery = (flags_6 & 0x02) != 0;
        let has_trainer = (flags_6 & 0x04) != 0;
        let mapper = (flags_7 & 0xF0) | (flags_6 >> 4);

        let prg_start = HEADER_SIZE + if has_trainer { TRAINER_SIZE } else { 0 };
        let chr_start = prg_start + prg_rom_size;

        if bytes.len() < chr_start + chr_rom_size {
            return Err(LoadError::Truncated);
        }

        let prg_rom = bytes[prg_start..prg_start + prg_rom_size].to_vec();

        let (chr, chr_is_ram) = if chr_rom_size > 0 {
            (bytes[chr_start..chr_start + chr_rom_size].to_vec(), false)
        } else {
            (vec![0u8; CHR_BANK_SIZE], true)
        };

        Ok(Cartridge {
            mapper,
            mirroring,
            has_battery,
            prg_rom,
            prg_rom_num_banks,
            chr,
            chr_is_ram,
            prg_ram: vec![0u8; PRG_RAM_SIZE],
        })
    }

    pub fn get_state(&self) -> State {
        State {
            prg_ram: self.prg_ram.clone(),
            chr_ram: if self.chr_is_ram {
                Some(serde_bytes::ByteBuf::from(self.chr.clone()))
            } else {
                None
            },
        }
    }

    pub fn apply_state(&mut self, state: &State) {
        self.prg_ram.copy_from_slice(&state.prg_ram);
        if let (true, Some(chr)) = (self.chr_is_ram, &state.chr_ram) {
            self.chr.copy_from_slice(chr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_rom(prg_banks: u8, chr_banks: u8, flags_6: u8) -> Vec<u8> {
        let mut rom = vec![
            0u8;
            HEADER_SIZE
                + prg_banks as usize * PRG_ROM_BANK_SIZE
                + chr_banks as usize * CHR_BANK_SIZE
        ];
        rom[0..4].copy_from_slice(&MAGIC);
        rom[4] = prg_banks;
        rom[5] = chr_banks;
        rom[6] = flags_6;
        rom
    }

    #[test]
    fn loads_nrom() {
        let cartridge = Cartridge::load(&build_rom(1, 1, 0)).unwrap();
        assert_eq!(cartridge.mapper, 0);
        assert_eq!(cartridge.prg_rom.len(), PRG_ROM_BANK_SIZE);
        assert_eq!(cartridge.chr.len(), CHR_BANK_SIZE);
        assert!(!cartridge.chr_is_ram);
        assert_eq!(cartridge.mirroring, Mirroring::Horizontal);
    }

    #[test]
    fn chr_ram_allocated_when_header_has_no_chr() {
        let cartridge = Cartridge::load(&build_rom(2, 0, 0x01)).unwrap();
        assert!(cartridge.chr_is_ram);
        assert_eq!(cartridge.chr.len(), CHR_BANK_SIZE);
        assert_eq!(cartridge.mirroring, Mirroring::Vertical);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut rom = build_rom(1, 1, 0);
        rom[0] = b'X';
        assert!(matches!(Cartridge::load(&rom), Err(LoadError::BadMagic)));
    }

    #[test]
    fn rejects_truncated_body() {
        let mut rom = build_rom(2, 1, 0);
        rom.truncate(HEADER_SIZE + PRG_ROM_BANK_SIZE);
        assert!(matches!(Cartridge::load(&rom), Err(LoadError::Truncated)));
    }

    #[test]
    fn trainer_is_skipped() {
        let prg_banks = 1u8;
        let mut rom = vec![0u8; HEADER_SIZE + TRAINER_SIZE + PRG_ROM_BANK_SIZE + CHR_BANK_SIZE];
        rom[0..4].copy_from_slice(&MAGIC);
        rom[4] = prg_banks;
        rom[5] = 1;
        rom[6] = 0x04; // trainer present
        let prg_start = HEADER_SIZE + TRAINER_SIZE;
        rom[prg_start] = 0x42;
        let cartridge = Cartridge::load(&rom).unwrap();
        assert_eq!(cartridge.prg_rom[0], 0x42);
    }

    #[test]
    fn horizontal_mirroring_pairs_nametables() {
        let m = Mirroring::Horizontal;
        assert_eq!(m.mirror_address(0x2000), m.mirror_address(0x2400));
        assert_eq!(m.mirror_address(0x2800), m.mirror_address(0x2C00));
        assert_ne!(m.mirror_address(0x2000), m.mirror_address(0x2800));
    }

    #[test]
    fn vertical_mirroring_pairs_nametables() {
        let m = Mirroring::Vertical;
        assert_eq!(m.mirror_address(0x2000), m.mirror_address(0x2800));
        assert_eq!(m.mirror_address(0x2400), m.mirror_address(0x2C00));
        assert_ne!(m.mirror_address(0x2000), m.mirror_address(0x2400));
    }
}
