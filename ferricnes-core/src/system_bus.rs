use crate::apu::Apu;
use crate::input::Input;
use crate::mapper::Mapper;
use crate::memory::{Memory, Ram};
use crate::ppu::Ppu;

/// CPU-side address decoding fabric. Borrows every component for the
/// duration of one CPU step; the emulator owns them all.
pub struct SystemBus<'a> {
    ram: &'a mut Ram,
    mapper: &'a mut Box<dyn Mapper>,
    ppu: &'a mut Ppu,
    apu: &'a mut Apu,
    input: &'a mut Input,
}

impl<'a> SystemBus<'a> {
    pub fn new(
        ram: &'a mut Ram,
        mapper: &'a mut Box<dyn Mapper>,
        ppu: &'a mut Ppu,
        apu: &'a mut Apu,
        input: &'a mut Input,
    ) -> Self {
        Self {
            ram,
            mapper,
            ppu,
            apu,
            input,
        }
    }
}

impl Memory for SystemBus<'_> {
    fn read_byte(&mut self, address: u16) -> u8 {
        if address < 0x2000 {
            self.ram.read_byte(address)
        } else if address < 0x4000 {
            self.ppu.read_byte(self.mapper.as_mut(), address)
        } else if address < 0x4016 {
            self.apu.read_byte(address)
        } else if address < 0x4018 {
            self.input.read_byte(address)
        } else if address < 0x4020 {
            // Disabled test registers read as open bus.
            0
        } else {
            self.mapper.prg_read_byte(address)
        }
    }

    fn write_byte(&mut self, address: u16, value: u8) {
        if address < 0x2000 {
            self.ram.write_byte(address, value);
        } else if address < 0x4000 {
            self.ppu.write_byte(self.mapper.as_mut(), address, value);
        } else if address < 0x4016 || address == 0x4017 {
            self.apu.write_byte(address, value);
        } else if address == 0x4016 {
            self.input.write_byte(address, value);
        } else if address >= 0x4020 {
            self.mapper.prg_write_byte(address, value);
        }
    }
}
