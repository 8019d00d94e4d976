use crate::cartridge::{self, Cartridge, Mirroring, PRG_ROM_BANK_SIZE};
use crate::mapper::{self, Mapper};
use crate::memory::Memory;
use crate::ppu::Vram;

use serde_derive::{Deserialize, Serialize};

// UxROM: 16KB switchable PRG bank at 0x8000, last bank fixed at 0xC000.
// Bank select is any write to 0x8000-0xFFFF. CHR is almost always RAM.
pub struct Mapper2 {
    cartridge: Cartridge,
    switchable_bank: u8,
}

impl Mapper2 {
    pub fn new(cartridge: Cartridge) -> Self {
        Mapper2 {
            cartridge,
            switchable_bank: 0,
        }
    }

    fn prg_rom_address(bank: u8, address: u16) -> usize {
        (bank as usize * PRG_ROM_BANK_SIZE) | (address as usize & (PRG_ROM_BANK_SIZE - 1))
    }

    fn read_prg_rom(&self, address: u16) -> u8 {
        let bank = if address < 0xC000 {
            self.switchable_bank
        } else {
            self.cartridge.prg_rom_num_banks - 1
        };

        self.cartridge.prg_rom[Mapper2::prg_rom_address(bank, address)]
    }
}

#[derive(Deserialize, Serialize)]
pub struct State {
    pub cartridge: cartridge::State,
    pub switchable_bank: u8,
}

impl Mapper for Mapper2 {
    fn prg_read_byte(&mut self, address: u16) -> u8 {
        if address < 0x6000 {
            0
        } else if address < 0x8000 {
            self.cartridge.prg_ram[(address & 0x1FFF) as usize]
        } else {
            self.read_prg_rom(address)
        }
    }

    fn prg_write_byte(&mut self, address: u16, value: u8) {
        if address >= 0x8000 {
            self.switchable_bank = value % self.cartridge.prg_rom_num_banks;
        } else if (0x6000..0x8000).contains(&address) {
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
        self.switchable_bank = 0;
    }

    fn get_state(&self) -> mapper::State {
        mapper::State::State2(State {
            cartridge: self.cartridge.get_state(),
            switchable_bank: self.switchable_bank,
        })
    }

    fn apply_state(&mut self, state: &mapper::State) -> bool {
        match state {
            mapper::State::State2(state) => {
                self.cartridge.apply_state(&state.cartridge);
                self.switchable_bank = state.switchable_bank;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uxrom(prg_banks: u8) -> Mapper2 {
        let mut rom = vec![0u8; 16 + prg_banks as usize * PRG_ROM_BANK_SIZE];
        rom[0..4].copy_from_slice(b"NES\x1a");
        rom[4] = prg_banks;
        rom[6] = 2 << 4;
        for bank in 0..prg_banks as usize {
            rom[16 + bank * PRG_ROM_BANK_SIZE] = bank as u8 + 1;
        }
        Mapper2::new(Cartridge::load(&rom).unwrap())
    }

    #[test]
    fn last_bank_is_fixed() {
        let mut mapper = uxrom(4);
        assert_eq!(mapper.prg_read_byte(0xC000), 4);
        mapper.prg_write_byte(0x8000, 2);
        assert_eq!(mapper.prg_read_byte(0xC000), 4);
    }

    #[test]
    fn bank_select_switches_low_window() {
        let mut mapper = uxrom(4);
        assert_eq!(mapper.prg_read_byte(0x8000), 1);
        mapper.prg_write_byte(0x8000, 2);
        assert_eq!(mapper.prg_read_byte(0x8000), 3);
    }

    #[test]
    fn chr_ram_is_writable() {
        let mut mapper = uxrom(2);
        let mut vram = Vram::new();
        mapper.ppu_write_byte(&mut vram, 0x0123, 0x99);
        assert_eq!(mapper.ppu_read_byte(&mut vram, 0x0123), 0x99);
    }
}
