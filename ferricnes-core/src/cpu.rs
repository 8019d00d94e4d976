use crate::memory::Memory;
use crate::ppu::OAMDATA_ADDRESS;

use serde_derive::{Deserialize, Serialize};

use std::fmt;
use std::fmt::{Debug, Formatter};

pub const OAMDMA_ADDRESS: u16 = 0x4014;

const NMI_VECTOR: u16 = 0xFFFA;
const RESET_VECTOR: u16 = 0xFFFC;
const IRQ_VECTOR: u16 = 0xFFFE;
const BRK_VECTOR: u16 = 0xFFFE;

#[derive(Copy, Clone, Deserialize, Serialize)]
pub struct Flags {
    pub c: bool, // Carry
    pub z: bool, // Zero
    pub i: bool, // Interrupt inhibit
    pub d: bool, // Decimal (ignored on the 2A03)
    pub b: bool, // Break command
    pub u: bool, // Unused, always reads 1
    pub v: bool, // Overflow
    pub n: bool, // Negative
}

impl Default for Flags {
    fn default() -> Self {
        Flags {
            c: false,
            z: false,
            i: false,
            d: false,
            b: false,
            u: true,
            v: false,
            n: false,
        }
    }
}

impl From<Flags> for u8 {
    fn from(flags: Flags) -> u8 {
        (flags.c as u8)
            | ((flags.z as u8) << 1)
            | ((flags.i as u8) << 2)
            | ((flags.d as u8) << 3)
            | ((flags.b as u8) << 4)
            | 0x20
            | ((flags.v as u8) << 6)
            | ((flags.n as u8) << 7)
    }
}

impl From<u8> for Flags {
    fn from(bits: u8) -> Self {
        Flags {
            c: (bits & 0x01) != 0,
            z: (bits & 0x02) != 0,
            i: (bits & 0x04) != 0,
            d: (bits & 0x08) != 0,
            b: (bits & 0x10) != 0,
            u: true,
            v: (bits & 0x40) != 0,
            n: (bits & 0x80) != 0,
        }
    }
}

impl Debug for Flags {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "N: {}, V: {}, B: {}, D: {}, I: {}, Z: {}, C: {}",
            self.n as u8,
            self.v as u8,
            self.b as u8,
            self.d as u8,
            self.i as u8,
            self.z as u8,
            self.c as u8
        )
    }
}

#[derive(Copy, Clone, Default, Deserialize, Serialize)]
pub struct Regs {
    pub pc: u16,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
}

impl Debug for Regs {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "pc: {:04X}, a: {:02X}, x: {:02X}, y: {:02X}, sp: {:02X}",
            self.pc, self.a, self.x, self.y, self.sp
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Register8 {
    A,
    X,
    Y,
    Sp,
    Status,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum AddressMode {
    Immediate,
    Absolute,
    ZeroPage,
    AbsoluteIndexed(Register8),
    ZeroPageIndexed(Register8),
    IndexedIndirect(Register8),
    IndirectIndexed(Register8),
    Register(Register8),
}

fn mem_pages_same(m1: u16, m2: u16) -> bool {
    (m1 & 0xFF00) == (m2 & 0xFF00)
}

#[derive(Default)]
pub struct Cpu {
    pub cycles: u64,
    stall_cycles: u32,
    regs: Regs,
    flags: Flags,
    nmi_pending: bool,
    irq_line: bool,
    illegal_opcodes: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct State {
    pub cycles: u64,
    pub stall_cycles: u32,
    pub regs: Regs,
    pub flags: Flags,
    pub nmi_pending: bool,
    pub irq_line: bool,
    pub illegal_opcodes: u64,
}

impl Cpu {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get_state(&self) -> State {
        State {
            cycles: self.cycles,
            stall_cycles: self.stall_cycles,
            regs: self.regs,
            flags: self.flags,
            nmi_pending: self.nmi_pending,
            irq_line: self.irq_line,
            illegal_opcodes: self.illegal_opcodes,
        }
    }

    pub fn apply_state(&mut self, state: &State) {
        self.cycles = state.cycles;
        self.stall_cycles = state.stall_cycles;
        self.regs = state.regs;
        self.flags = state.flags;
        self.nmi_pending = state.nmi_pending;
        self.irq_line = state.irq_line;
        self.illegal_opcodes = state.illegal_opcodes;
    }

    /// Adds cycles during which the CPU is off the bus (DMA transfers).
    pub fn stall(&mut self, cycles: u32) {
        self.stall_cycles += cycles;
    }

    pub fn regs(&self) -> Regs {
        self.regs
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Opcodes decoded as two-cycle NOPs because they are not implemented.
    pub fn illegal_opcodes(&self) -> u64 {
        self.illegal_opcodes
    }

    /// Latches an edge-triggered NMI for service before the next instruction.
    pub fn nmi(&mut self) {
        self.nmi_pending = true;
    }

    /// Sets the level-triggered IRQ line. Serviced between instructions
    /// while the I flag is clear.
    pub fn set_irq_line(&mut self, level: bool) {
        self.irq_line = level;
    }

    pub fn reset(&mut self, mem: &mut impl Memory) {
        self.regs.pc = mem.read_word(RESET_VECTOR);
        self.regs.sp = 0xFD;
        self.flags = Flags {
            i: true,
            ..Flags::default()
        };
        self.nmi_pending = false;
        self.irq_line = false;
        self.stall_cycles = 0;
    }

    /// Executes one instruction (or consumes pending DMA stall cycles) and
    /// returns the number of CPU cycles spent.
    pub fn step(&mut self, mem: &mut impl Memory) -> u32 {
        if self.stall_cycles > 0 {
            let stalled = self.stall_cycles;
            self.stall_cycles = 0;
            self.cycles += stalled as u64;
            return stalled;
        }

        let cycles = self.cycles;

        self.handle_interrupts(mem);

        let opcode = self.next_pc_byte(mem);
        handle_opcode!(opcode, self, mem);

        (self.cycles - cycles) as u32
    }

    fn handle_oam_dma(&mut self, mem: &mut impl Memory, addr_hi: u8) {
        // One extra alignment cycle when the transfer starts on an odd CPU
        // cycle, then a wait cycle before the copy begins.
        if self.cycles % 2 == 1 {
            self.cycles += 1;
        }
        self.dummy_read(mem);

        let start = (addr_hi as u16) << 8;
        for i in 0..256 {
            let value = self.read_byte(mem, start + i);
            self.write_byte(mem, OAMDATA_ADDRESS, value);
        }
    }

    #[inline(always)]
    fn read_byte(&mut self, mem: &mut impl Memory, address: u16) -> u8 {
        let b = mem.read_byte(address);
        self.cycles += 1;
        b
    }

    #[inline(always)]
    fn read_word(&mut self, mem: &mut impl Memory, address: u16) -> u16 {
        self.read_byte(mem, address) as u16
            | ((self.read_byte(mem, address.wrapping_add(1)) as u16) << 8)
    }

    #[inline(always)]
    fn dummy_read(&mut self, mem: &mut impl Memory) {
        self.read_byte(mem, self.regs.pc);
    }

    #[inline(always)]
    fn next_pc_byte(&mut self, mem: &mut impl Memory) -> u8 {
        let b = self.read_byte(mem, self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        b
    }

    #[inline(always)]
    fn next_pc_word(&mut self, mem: &mut impl Memory) -> u16 {
        let w = self.read_word(mem, self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(2);
        w
    }

    // Pointer reads wrap within the zero page.
    fn load_word_zero_page(&mut self, mem: &mut impl Memory, offset: u8) -> u16 {
        if offset == 0xFF {
            self.read_byte(mem, 0xFF) as u16 | ((self.read_byte(mem, 0x00) as u16) << 8)
        } else {
            self.read_word(mem, offset as u16)
        }
    }

    fn load(
        &mut self,
        mem: &mut impl Memory,
        am: AddressMode,
        is_modify_instruction: bool,
    ) -> (u8, Option<u16>) {
        use self::AddressMode::*;
        match am {
            Immediate => (self.next_pc_byte(mem), None),
            Absolute => {
                let addr = self.next_pc_word(mem);
                (self.read_byte(mem, addr), Some(addr))
            }
            ZeroPage => {
                let addr = self.next_pc_byte(mem) as u16;
                (self.read_byte(mem, addr), Some(addr))
            }
            AbsoluteIndexed(reg) => {
                let base = self.next_pc_word(mem);
                let index = self.get_register(reg) as u16;
                let addr = base.wrapping_add(index);

                // Crossing a page boundary costs an extra read with an
                // incorrect high byte.
                if is_modify_instruction || !mem_pages_same(base, addr) {
                    self.read_byte(mem, (base & 0xFF00) | (addr & 0x00FF));
                }

                (self.read_byte(mem, addr), Some(addr))
            }
            ZeroPageIndexed(reg) => {
                let base = self.next_pc_byte(mem);
                self.read_byte(mem, base as u16);
                let addr = base.wrapping_add(self.get_register(reg)) as u16;

                (self.read_byte(mem, addr), Some(addr))
            }
            IndexedIndirect(reg) => {
                let base = self.next_pc_byte(mem);
                self.read_byte(mem, base as u16);
                let index = self.get_register(reg);
                let addr = self.load_word_zero_page(mem, base.wrapping_add(index));

                (self.read_byte(mem, addr), Some(addr))
            }
            IndirectIndexed(reg) => {
                let zp_offset = self.next_pc_byte(mem);
                let base = self.load_word_zero_page(mem, zp_offset);
                let index = self.get_register(reg) as u16;
                let addr = base.wrapping_add(index);

                if is_modify_instruction || !mem_pages_same(base, addr) {
                    self.read_byte(mem, (base & 0xFF00) | (addr & 0x00FF));
                }

                (self.read_byte(mem, addr), Some(addr))
            }
            Register(reg) => {
                self.dummy_read(mem);
                (self.get_register(reg), None)
            }
        }
    }

    #[inline(always)]
    fn write_byte(&mut self, mem: &mut impl Memory, address: u16, value: u8) {
        self.cycles += 1;
        if address == OAMDMA_ADDRESS {
            self.handle_oam_dma(mem, value);
        } else {
            mem.write_byte(address, value);
        }
    }

    fn store(&mut self, mem: &mut impl Memory, am: AddressMode, val: u8) {
        use self::AddressMode::*;
        match am {
            Absolute => {
                let addr = self.next_pc_word(mem);
                self.write_byte(mem, addr, val);
            }
            ZeroPage => {
                let addr = self.next_pc_byte(mem) as u16;
                self.write_byte(mem, addr, val);
            }
            AbsoluteIndexed(reg) => {
                let base = self.next_pc_word(mem);
                let index = self.get_register(reg) as u16;
                let addr = base.wrapping_add(index);
                self.read_byte(mem, (base & 0xFF00) | (addr & 0x00FF));
                self.write_byte(mem, addr, val);
            }
            ZeroPageIndexed(reg) => {
                let base = self.next_pc_byte(mem);
                self.read_byte(mem, base as u16);
                let addr = base.wrapping_add(self.get_register(reg)) as u16;
                self.write_byte(mem, addr, val);
            }
            IndexedIndirect(reg) => {
                let base = self.next_pc_byte(mem);
                self.read_byte(mem, base as u16);
                let index = self.get_register(reg);
                let addr = self.load_word_zero_page(mem, base.wrapping_add(index));
                self.write_byte(mem, addr, val);
            }
            IndirectIndexed(reg) => {
                let zp_offset = self.next_pc_byte(mem);
                let base = self.load_word_zero_page(mem, zp_offset);
                let index = self.get_register(reg) as u16;
                let addr = base.wrapping_add(index);
                self.read_byte(mem, (base & 0xFF00) | (addr & 0x00FF));
                self.write_byte(mem, addr, val);
            }
            Register(reg) => self.set_register(reg, val),
            _ => unreachable!("invalid address mode for store: {:?}", am),
        }
    }

    ///////////////////////
    // Flag helpers
    ///////////////////////

    #[inline(always)]
    fn set_zero_negative(&mut self, result: u8) {
        self.flags.z = result == 0;
        self.flags.n = (result & 0x80) != 0;
    }

    ///////////////////////
    // Register helpers
    ///////////////////////

    #[inline(always)]
    fn get_register(&self, r: Register8) -> u8 {
        use self::Register8::*;
        match r {
            A => self.regs.a,
            X => self.regs.x,
            Y => self.regs.y,
            Sp => self.regs.sp,
            Status => self.flags.into(),
        }
    }

    #[inline(always)]
    fn set_register(&mut self, r: Register8, val: u8) {
        use self::Register8::*;
        match r {
            A => self.regs.a = val,
            X => self.regs.x = val,
            Y => self.regs.y = val,
            Sp => self.regs.sp = val,
            Status => self.flags = val.into(),
        }
    }

    //////////////////////
    // Instruction helpers
    //////////////////////

    fn ld_reg(&mut self, mem: &mut impl Memory, am: AddressMode, r: Register8) {
        let (m, _) = self.load(mem, am, false);
        self.set_zero_negative(m);
        self.set_register(r, m);
    }

    fn st_reg(&mut self, mem: &mut impl Memory, am: AddressMode, r: Register8) {
        let val = self.get_register(r);
        self.store(mem, am, val);
    }

    fn branch(&mut self, mem: &mut impl Memory, cond: bool) {
        let offset = self.next_pc_byte(mem) as i8;
        if cond {
            self.dummy_read(mem);
            let addr = self.regs.pc.wrapping_add(offset as i16 as u16);

            // Branching to a new page costs another cycle.
            if !mem_pages_same(self.regs.pc, addr) {
                self.read_byte(mem, (self.regs.pc & 0xFF00) | (addr & 0x00FF));
            }

            self.regs.pc = addr;
        }
    }

    fn compare(&mut self, mem: &mut impl Memory, am: AddressMode, reg: Register8) {
        let (m, _) = self.load(mem, am, false);
        let r = self.get_register(reg);
        let result = r.wrapping_sub(m);

        self.set_zero_negative(result);
        self.flags.c = m <= r;
    }

    fn add_value(&mut self, value: u8) {
        let result = self.regs.a as u32 + value as u32 + self.flags.c as u32;

        self.flags.c = (result & 0x100) != 0;
        let result = result as u8;
        self.flags.v = !(self.regs.a ^ value) & (self.regs.a ^ result) & 0x80 != 0;
        self.set_zero_negative(result);

        self.regs.a = result;
    }

    fn sub_value(&mut self, value: u8) {
        let result = self.regs.a as i32 - value as i32 - (!self.flags.c) as i32;

        self.flags.c = result >= 0;

        let result = result as u8;
        self.flags.v = (self.regs.a ^ value) & (self.regs.a ^ result) & 0x80 != 0;
        self.set_zero_negative(result);

        self.regs.a = result;
    }

    fn increment(&mut self, mem: &mut impl Memory, am: AddressMode) {
        if let (val, Some(addr)) = self.load(mem, am, true) {
            self.write_byte(mem, addr, val);
            let result = val.wrapping_add(1);
            self.set_zero_negative(result);
            self.write_byte(mem, addr, result);
        } else {
            unreachable!()
        }
    }

    fn decrement(&mut self, mem: &mut impl Memory, am: AddressMode) {
        if let (val, Some(addr)) = self.load(mem, am, true) {
            self.write_byte(mem, addr, val);
            let result = val.wrapping_sub(1);
            self.set_zero_negative(result);
            self.write_byte(mem, addr, result);
        } else {
            unreachable!()
        }
    }

    fn shift_result(&mut self, mem: &mut impl Memory, am: AddressMode, val: u8, result: u8, addr: Option<u16>) {
        self.set_zero_negative(result);

        if let Some(addr) = addr {
            self.write_byte(mem, addr, val);
            self.write_byte(mem, addr, result);
        } else if let AddressMode::Register(reg) = am {
            self.set_register(reg, result);
        }
    }

    fn arithmetic_shift_left(&mut self, mem: &mut impl Memory, am: AddressMode) {
        let (val, addr) = self.load(mem, am, true);
        let result = val << 1;
        self.flags.c = (val & 0x80) != 0;
        self.shift_result(mem, am, val, result, addr);
    }

    fn logical_shift_right(&mut self, mem: &mut impl Memory, am: AddressMode) {
        let (val, addr) = self.load(mem, am, true);
        let result = val >> 1;
        self.flags.c = (val & 0x01) != 0;
        self.shift_result(mem, am, val, result, addr);
    }

    fn rotate_left(&mut self, mem: &mut impl Memory, am: AddressMode) {
        let (val, addr) = self.load(mem, am, true);
        let result = (val << 1) | self.flags.c as u8;
        self.flags.c = (val & 0x80) != 0;
        self.shift_result(mem, am, val, result, addr);
    }

    fn rotate_right(&mut self, mem: &mut impl Memory, am: AddressMode) {
        let (val, addr) = self.load(mem, am, true);
        let result = (val >> 1) | ((self.flags.c as u8) << 7);
        self.flags.c = (val & 0x01) != 0;
        self.shift_result(mem, am, val, result, addr);
    }

    // Stack helpers

    fn push_byte(&mut self, mem: &mut impl Memory, val: u8) {
        let sp = self.regs.sp;
        self.write_byte(mem, 0x0100 | (sp as u16), val);
        self.regs.sp = sp.wrapping_sub(1);
    }

    fn pull_byte(&mut self, mem: &mut impl Memory) -> u8 {
        let sp = self.regs.sp.wrapping_add(1);
        self.regs.sp = sp;

        self.read_byte(mem, 0x0100 | (sp as u16))
    }

    fn push_word(&mut self, mem: &mut impl Memory, val: u16) {
        self.push_byte(mem, (val >> 8) as u8);
        self.push_byte(mem, val as u8);
    }

    fn pull_word(&mut self, mem: &mut impl Memory) -> u16 {
        let lsb = self.pull_byte(mem);
        let msb = self.pull_byte(mem);

        ((msb as u16) << 8) | (lsb as u16)
    }

    ///////////////////
    // Instructions
    ///////////////////

    fn lda(&mut self, mem: &mut impl Memory, am: AddressMode) {
        self.ld_reg(mem, am, Register8::A);
    }

    fn ldx(&mut self, mem: &mut impl Memory, am: AddressMode) {
        self.ld_reg(mem, am, Register8::X);
    }

    fn ldy(&mut self, mem: &mut impl Memory, am: AddressMode) {
        self.ld_reg(mem, am, Register8::Y);
    }

    fn sta(&mut self, mem: &mut impl Memory, am: AddressMode) {
        self.st_reg(mem, am, Register8::A);
    }

    fn stx(&mut self, mem: &mut impl Memory, am: AddressMode) {
        self.st_reg(mem, am, Register8::X);
    }

    fn sty(&mut self, mem: &mut impl Memory, am: AddressMode) {
        self.st_reg(mem, am, Register8::Y);
    }

    fn adc(&mut self, mem: &mut impl Memory, am: AddressMode) {
        let (m, _) = self.load(mem, am, false);
        self.add_value(m);
    }

    fn sbc(&mut self, mem: &mut impl Memory, am: AddressMode) {
        let (m, _) = self.load(mem, am, false);
        self.sub_value(m);
    }

    fn and(&mut self, mem: &mut impl Memory, am: AddressMode) {
        let (m, _) = self.load(mem, am, false);
        let result = m & self.regs.a;
        self.set_zero_negative(result);
        self.regs.a = result;
    }

    fn ora(&mut self, mem: &mut impl Memory, am: AddressMode) {
        let (m, _) = self.load(mem, am, false);
        let result = m | self.regs.a;
        self.set_zero_negative(result);
        self.regs.a = result;
    }

    fn eor(&mut self, mem: &mut impl Memory, am: AddressMode) {
        let (m, _) = self.load(mem, am, false);
        let result = m ^ self.regs.a;
        self.set_zero_negative(result);
        self.regs.a = result;
    }

    fn sec(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.flags.c = true;
    }

    fn clc(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.flags.c = false;
    }

    fn sei(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.flags.i = true;
    }

    fn cli(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.flags.i = false;
    }

    fn sed(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.flags.d = true;
    }

    fn cld(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.flags.d = false;
    }

    fn clv(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.flags.v = false;
    }

    fn jmp(&mut self, mem: &mut impl Memory) {
        self.regs.pc = self.next_pc_word(mem);
    }

    fn jmpi(&mut self, mem: &mut impl Memory) {
        let addr = self.next_pc_word(mem);

        let lsb = self.read_byte(mem, addr);

        // Hardware quirk: an indirect vector at the end of a page wraps
        // within that page, so the MSB comes from xx00 rather than the
        // following page.
        let msb = self.read_byte(
            mem,
            if (addr & 0xFF) == 0xFF {
                addr & 0xFF00
            } else {
                addr + 1
            },
        );

        self.regs.pc = ((msb as u16) << 8) | (lsb as u16);
    }

    fn bmi(&mut self, mem: &mut impl Memory) {
        self.branch(mem, self.flags.n);
    }

    fn bpl(&mut self, mem: &mut impl Memory) {
        self.branch(mem, !self.flags.n);
    }

    fn bcc(&mut self, mem: &mut impl Memory) {
        self.branch(mem, !self.flags.c);
    }

    fn bcs(&mut self, mem: &mut impl Memory) {
        self.branch(mem, self.flags.c);
    }

    fn beq(&mut self, mem: &mut impl Memory) {
        self.branch(mem, self.flags.z);
    }

    fn bne(&mut self, mem: &mut impl Memory) {
        self.branch(mem, !self.flags.z);
    }

    fn bvs(&mut self, mem: &mut impl Memory) {
        self.branch(mem, self.flags.v);
    }

    fn bvc(&mut self, mem: &mut impl Memory) {
        self.branch(mem, !self.flags.v);
    }

    fn cmp(&mut self, mem: &mut impl Memory, am: AddressMode) {
        self.compare(mem, am, Register8::A)
    }

    fn cpx(&mut self, mem: &mut impl Memory, am: AddressMode) {
        self.compare(mem, am, Register8::X)
    }

    fn cpy(&mut self, mem: &mut impl Memory, am: AddressMode) {
        self.compare(mem, am, Register8::Y)
    }

    fn bit(&mut self, mem: &mut impl Memory, am: AddressMode) {
        let (m, _) = self.load(mem, am, false);
        let a = self.regs.a;

        self.flags.n = (m & 0x80) != 0;
        self.flags.v = (m & 0x40) != 0;
        self.flags.z = (m & a) == 0;
    }

    fn inc(&mut self, mem: &mut impl Memory, am: AddressMode) {
        self.increment(mem, am);
    }

    fn dec(&mut self, mem: &mut impl Memory, am: AddressMode) {
        self.decrement(mem, am);
    }

    fn inx(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        let val = self.regs.x.wrapping_add(1);
        self.set_zero_negative(val);
        self.regs.x = val;
    }

    fn iny(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        let val = self.regs.y.wrapping_add(1);
        self.set_zero_negative(val);
        self.regs.y = val;
    }

    fn dex(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        let val = self.regs.x.wrapping_sub(1);
        self.set_zero_negative(val);
        self.regs.x = val;
    }

    fn dey(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        let val = self.regs.y.wrapping_sub(1);
        self.set_zero_negative(val);
        self.regs.y = val;
    }

    fn tax(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.set_zero_negative(self.regs.a);
        self.regs.x = self.regs.a;
    }

    fn txa(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.set_zero_negative(self.regs.x);
        self.regs.a = self.regs.x;
    }

    fn tay(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.set_zero_negative(self.regs.a);
        self.regs.y = self.regs.a;
    }

    fn tya(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.set_zero_negative(self.regs.y);
        self.regs.a = self.regs.y;
    }

    fn tsx(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.set_zero_negative(self.regs.sp);
        self.regs.x = self.regs.sp;
    }

    fn txs(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.regs.sp = self.regs.x;
    }

    fn jsr(&mut self, mem: &mut impl Memory) {
        let addr_lo = self.next_pc_byte(mem);
        self.cycles += 1;
        self.push_word(mem, self.regs.pc);
        let addr_hi = self.next_pc_byte(mem);
        self.regs.pc = ((addr_hi as u16) << 8) | addr_lo as u16;
    }

    fn rts(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.cycles += 1;
        self.regs.pc = self.pull_word(mem).wrapping_add(1);
        self.cycles += 1;
    }

    fn pha(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.push_byte(mem, self.regs.a);
    }

    fn pla(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.cycles += 1;
        let val = self.pull_byte(mem);
        self.set_zero_negative(val);
        self.regs.a = val;
    }

    fn php(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        let mut status = self.flags;
        status.b = true;
        status.u = true;
        self.push_byte(mem, status.into());
    }

    fn plp(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.cycles += 1;
        let val = self.pull_byte(mem);
        self.flags = val.into();
    }

    fn lsr(&mut self, mem: &mut impl Memory, am: AddressMode) {
        self.logical_shift_right(mem, am);
    }

    fn asl(&mut self, mem: &mut impl Memory, am: AddressMode) {
        self.arithmetic_shift_left(mem, am);
    }

    fn ror(&mut self, mem: &mut impl Memory, am: AddressMode) {
        self.rotate_right(mem, am);
    }

    fn rol(&mut self, mem: &mut impl Memory, am: AddressMode) {
        self.rotate_left(mem, am);
    }

    fn brk(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.push_word(mem, self.regs.pc.wrapping_add(1));
        let mut status = self.flags;
        status.b = true;
        status.u = true;
        self.push_byte(mem, status.into());
        self.flags.i = true;
        self.regs.pc = self.read_word(mem, BRK_VECTOR);
    }

    fn rti(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.cycles += 1;
        let status = self.pull_byte(mem);
        let pc = self.pull_word(mem);

        self.flags = status.into();
        self.regs.pc = pc;
    }

    fn nop(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
    }

    // Unofficial immediate NOP: reads and discards an operand byte.
    fn skb(&mut self, mem: &mut impl Memory) {
        self.next_pc_byte(mem);
    }

    // Unofficial NOP with a real memory operand: performs the read,
    // affects nothing.
    fn ign(&mut self, mem: &mut impl Memory, am: AddressMode) {
        let _ = self.load(mem, am, false);
    }

    // Unimplemented opcodes execute as two-cycle NOPs and are counted so
    // the scheduler can report them.
    fn illegal(&mut self, mem: &mut impl Memory) {
        self.dummy_read(mem);
        self.illegal_opcodes += 1;
    }

    ///////////////
    // Interrupts
    ///////////////

    fn handle_interrupts(&mut self, mem: &mut impl Memory) {
        if self.nmi_pending {
            self.nmi_pending = false;
            self.interrupt(mem, NMI_VECTOR);
        } else if self.irq_line && !self.flags.i {
            self.interrupt(mem, IRQ_VECTOR);
        }
    }

    // Seven cycles: two internal, push PCH/PCL/P, fetch the vector.
    // B is pushed clear for hardware interrupts, unlike BRK.
    fn interrupt(&mut self, mem: &mut impl Memory, vector: u16) {
        self.dummy_read(mem);
        self.dummy_read(mem);
        self.push_word(mem, self.regs.pc);
        let mut status = self.flags;
        status.b = false;
        status.u = true;
        self.push_byte(mem, status.into());
        self.flags.i = true;
        self.regs.pc = self.read_word(mem, vector);
    }
}
