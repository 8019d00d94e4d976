mod mapper0;
mod mapper2;

use self::mapper0::Mapper0;
use self::mapper2::Mapper2;
use crate::cartridge::{Cartridge, LoadError, Mirroring};
use crate::ppu::Vram;

use serde_derive::{Deserialize, Serialize};

pub trait Mapper {
    fn prg_read_byte(&mut self, address: u16) -> u8;
    fn prg_write_byte(&mut self, address: u16, value: u8);

    /// PPU-space access for 0x0000-0x3EFF. Pattern tables come from CHR;
    /// nametables route through the internal VRAM with the mirroring the
    /// cartridge selects.
    fn ppu_read_byte(&mut self, vram: &mut Vram, address: u16) -> u8;
    fn ppu_write_byte(&mut self, vram: &mut Vram, address: u16, value: u8);

    fn mirroring(&self) -> Mirroring;

    /// Level-triggered mapper IRQ line. NROM-class boards never assert it.
    fn irq_pending(&self) -> bool {
        false
    }

    /// Rising edges of PPU address bit 12, for scanline-counting mappers.
    fn notify_ppu_a12(&mut self, _rise: bool) {}

    fn reset(&mut self);
    fn get_state(&self) -> State;

    /// Returns false when the state belongs to a different mapper type, in
    /// which case nothing is modified.
    fn apply_state(&mut self, state: &State) -> bool;
}

pub fn create_mapper(cartridge: Cartridge) -> Result<Box<dyn Mapper>, LoadError> {
    match cartridge.mapper {
        0 => Ok(Box::new(Mapper0::new(cartridge))),
        2 => Ok(Box::new(Mapper2::new(cartridge))),
        n => Err(LoadError::UnsupportedMapper(n)),
    }
}

#[derive(Deserialize, Serialize)]
pub enum State {
    State0(mapper0::State),
    State2(mapper2::State),
}
