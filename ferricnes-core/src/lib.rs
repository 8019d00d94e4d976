//! NES emulator core: a 6502-family CPU, PPU, and APU stepped against a
//! shared clock, a memory bus with mirroring and cartridge mapping, and two
//! standard controllers. The core is a pure library; hosts supply video and
//! audio sinks and drive `nes::Nes::run_frame` at display pace.

#[macro_use]
mod opcode;

pub mod apu;
pub mod cartridge;
pub mod cpu;
pub mod input;
pub mod mapper;
pub mod memory;
pub mod nes;
pub mod ppu;
pub mod serialize;
pub mod sink;
pub mod system_bus;
