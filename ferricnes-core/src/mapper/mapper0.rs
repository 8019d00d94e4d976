use crate::cartridge::{self, Cartridge, Mirroring, PRG_ROM_BANK_SIZE};
use crate::mapper::{self, Mapper};
use crate::memory::Memory;
use crate::ppu::Vram;

use serde_derive::{Deserialize, Serialize};

// NROM: 16 or 32KB of PRG ROM mirrored into 0x8000-0xFFFF, CHR ROM or RAM
// at 0x0000-0x1FFF, no bank switching.
pub struct Mapper0 {
    cartridge: Cartridge,
}

impl Mapper0 {
    pub fn new(cartridge: Cartridge) -> Self {
        Mapper0 { cartridge }
    }
}

#[derive(Deserialize, Serialize)]
pub struct State {
    pub cartridge: cartridge::State,
}

impl Mapper for Mapper0 {
    fn prg_read_byte(&mut self, address: u16) -> u8 {
        if address < 0x6000 {
            0
        } else if address < 0x8000 {
            self.cartridge.prg_ram[(address & 0x1FFF) as usize]
        } else if self.cartridge.prg_rom.len() > PRG_ROM_BANK_SIZE {
            self.cartridge.prg_rom[(address & 0x7FFF) as usize]
        } else {
            // Mirror the single 16KB bank into both halves.
            self.cartridge.prg_rom[(address & 0x3FFF) as usize]
        }
    }

    fn prg_write_byte(&mut self, address: u16, value: u8) {
        if (0x6000..0x8000).contains(&address) {
            self.cartridge.prg_ram[(address & 0x1FFF) as usize] = value;
        }
    }

    fn ppu_read_byte(&mut self, vram: &mut Vram, address: u16) -> u8 {
        if address < 0x2000 {
            self.cartridge.chr[address as usize]
        } else {
            vram.read_byte(self.cartridge.mirroring.mirror_address(address))
        }
    }

    fn ppu_write_byte(&mut self, vram: &mut Vram, address: u16, value: u8) {
        if address < 0x2000 {
            if self.cartridge.chr_is_ram {
                self.cartridge.chr[address as usize] = value;
            }
        } else {
            vram.write_byte(self.cartridge.mirroring.mirror_address(address), value);
        }
    }

    fn mirroring(&self) -> Mirroring {
        self.cartridge.mirroring
    }

    fn reset(&mut self) {
        // Nothing to reset
    }

    fn get_state(&self) -> mapper::State {
        mapper::State::State0(State {
            cartridge: self.cartridge.get_state(),
        })
    }

    fn apply_state(&mut self, state: &mapper::State) -> bool {
        match state {
            mapper::State::State0(state) => {
                self.cartridge.apply_state(&state.cartridge);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::CHR_BANK_SIZE;

    fn nrom(prg_banks: u8) -> Mapper0 {
        let mut rom = vec![
            0u8;
            16 + prg_banks as usize * PRG_ROM_BANK_SIZE + CHR_BANK_SIZE
        ];
        rom[0..4].copy_from_slice(b"NES\x1a");
        rom[4] = prg_banks;
        rom[5] = 1;
        for bank in 0..prg_banks as usize {
            rom[16 + bank * PRG_ROM_BANK_SIZE] = bank as u8 + 1;
        }
        Mapper0::new(Cartridge::load(&rom).unwrap())
    }

    #[test]
    fn single_bank_is_mirrored() {
        let mut mapper = nrom(1);
        assert_eq!(mapper.prg_read_byte(0x8000), 1);
        assert_eq!(mapper.prg_read_byte(0xC000), 1);
    }

    #[test]
    fn two_banks_are_not_mirrored() {
        let mut mapper = nrom(2);
        assert_eq!(mapper.prg_read_byte(0x8000), 1);
        assert_eq!(mapper.prg_read_byte(0xC000), 2);
    }

    #[test]
    fn prg_ram_reads_back() {
        let mut mapper = nrom(1);
        mapper.prg_write_byte(0x6000, 0x5A);
        assert_eq!(mapper.prg_read_byte(0x6000), 0x5A);
        assert_eq!(mapper.prg_read_byte(0x7FFF), 0x00);
    }

    #[test]
    fn chr_rom_ignores_writes() {
        let mut mapper = nrom(1);
        let mut vram = Vram::new();
        mapper.ppu_write_byte(&mut vram, 0x0000, 0x77);
        assert_eq!(mapper.ppu_read_byte(&mut vram, 0x0000), 0x00);
    }
}
