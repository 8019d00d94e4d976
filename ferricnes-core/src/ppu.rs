use crate::mapper::Mapper;
use crate::memory::Memory;
use crate::nes::Region;

use bitflags::bitflags;
use once_cell::sync::Lazy;
use serde_derive::{Deserialize, Serialize};

use std::ops::{Deref, DerefMut};

pub const SCREEN_WIDTH: usize = 256;
pub const SCREEN_HEIGHT: usize = 240;

const DOTS_PER_SCANLINE: u16 = 341;

const VISIBLE_END_SCANLINE: u16 = 239;
const VBLANK_START_SCANLINE: u16 = 241;

// Memory-mapped register addresses
const PPUCTRL_ADDRESS: u16 = 0x2000;
const PPUMASK_ADDRESS: u16 = 0x2001;
const PPUSTATUS_ADDRESS: u16 = 0x2002;
const OAMADDR_ADDRESS: u16 = 0x2003;
pub const OAMDATA_ADDRESS: u16 = 0x2004;
const PPUSCROLL_ADDRESS: u16 = 0x2005;
const PPUADDR_ADDRESS: u16 = 0x2006;
const PPUDATA_ADDRESS: u16 = 0x2007;

#[allow(clippy::unreadable_literal)]
static BASE_PALETTE: &[u32] = &[
    0x666666, 0x002A88, 0x1412A7, 0x3B00A4, 0x5C007E, 0x6E0040, 0x6C0600, 0x561D00, 0x333500,
    0x0B4800, 0x005200, 0x004F08, 0x00404D, 0x000000, 0x000000, 0x000000, 0xADADAD, 0x155FD9,
    0x4240FF, 0x7527FE, 0xA01ACC, 0xB71E7B, 0xB53120, 0x994E00, 0x6B6D00, 0x388700, 0x0C9300,
    0x008F32, 0x007C8D, 0x000000, 0x000000, 0x000000, 0xFFFEFF, 0x64B0FF, 0x9290FF, 0xC676FF,
    0xF36AFF, 0xFE6ECC, 0xFE8170, 0xEA9E22, 0xBCBE00, 0x88D800, 0x5CE430, 0x45E082, 0x48CDDE,
    0x4F4F4F, 0x000000, 0x000000, 0xFFFEFF, 0xC0DFFF, 0xD3D2FF, 0xE8C8FF, 0xFBC2FF, 0xFEC4EA,
    0xFECCC5, 0xF7D8A5, 0xE4E594, 0xCFEF96, 0xBDF4AB, 0xB3F3CC, 0xB5EBF2, 0xB8B8B8, 0x000000,
    0x000000,
];

// RGBA8888: R in the low byte so the u32 framebuffer is R,G,B,A in memory
// on little-endian hosts.
static RGBA_PALETTE: Lazy<[u32; 64]> = Lazy::new(|| {
    let mut palette = [0; 64];
    for (n, color) in BASE_PALETTE.iter().enumerate() {
        let r = (color >> 16) & 0xFF;
        let g = (color >> 8) & 0xFF;
        let b = color & 0xFF;
        palette[n] = 0xFF00_0000 | (b << 16) | (g << 8) | r;
    }
    palette
});

fn rgba_color(palette_index: u8, emphasis: u8) -> u32 {
    let rgba = RGBA_PALETTE[(palette_index & 0x3F) as usize];
    if emphasis == 0 {
        return rgba;
    }

    let mut r = rgba & 0xFF;
    let mut g = (rgba >> 8) & 0xFF;
    let mut b = (rgba >> 16) & 0xFF;

    // Each emphasis bit attenuates the other two channels.
    if emphasis & 0x01 != 0 {
        g = g * 13 / 16;
        b = b * 13 / 16;
    }
    if emphasis & 0x02 != 0 {
        r = r * 13 / 16;
        b = b * 13 / 16;
    }
    if emphasis & 0x04 != 0 {
        r = r * 13 / 16;
        g = g * 13 / 16;
    }

    0xFF00_0000 | (b << 16) | (g << 8) | r
}

/// Reverses the bits of a byte, for horizontally flipped sprites.
fn flip_byte(mut b: u8) -> u8 {
    b = (b & 0xF0) >> 4 | (b & 0x0F) << 4;
    b = (b & 0xCC) >> 2 | (b & 0x33) << 2;
    (b & 0xAA) >> 1 | (b & 0x55) << 1
}

pub struct Ppu {
    cycles: u64,
    regs: Regs,

    // When reading PPUDATA below the palettes the CPU receives the contents
    // of an internal read buffer, which is then refilled from the current
    // VRAM address. Palette reads bypass the buffer, but still refill it
    // with the nametable byte that would be mirrored "underneath".
    ppu_data_read_buffer: u8,

    // The PPU I/O latch. Writing any register fills it; reading a
    // write-only register returns its current value, as do the unused low
    // bits of PPUSTATUS.
    ppu_gen_latch: u8,

    mem: MemMap,
    oam: Oam,

    scanline: u16,
    dot: u16,
    frame: u64,
    odd_frame: bool,
    region: Region,

    // Background pipeline
    bg_pattern_shift_lo: u16,
    bg_pattern_shift_hi: u16,
    bg_attribute_shift_lo: u16,
    bg_attribute_shift_hi: u16,
    next_tile_index: u8,
    next_tile_attribute: u8,
    next_tile_pattern_lo: u8,
    next_tile_pattern_hi: u8,

    // Sprite pipeline for the scanline being rendered
    secondary_oam: [u8; 32],
    sprite_count: u8,
    sprite_patterns_lo: [u8; 8],
    sprite_patterns_hi: [u8; 8],
    sprite_attributes: [u8; 8],
    sprite_x_positions: [u8; 8],
    sprite_zero_on_line: bool,

    // Level observed by the scheduler; it does its own edge detection.
    nmi_output: bool,
    nmi_occurred: bool,

    a12_state: bool,

    frame_buffer: Vec<u32>,
}

#[derive(Deserialize, Serialize)]
pub struct State {
    pub cycles: u64,
    pub ppu_ctrl: u8,
    pub ppu_mask: u8,
    pub ppu_status: u8,
    pub oam_addr: u8,
    pub v: u16,
    pub t: u16,
    pub x: u8,
    pub w: bool,
    pub ppu_data_read_buffer: u8,
    pub ppu_gen_latch: u8,
    #[serde(with = "serde_bytes")]
    pub vram: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub palette_ram: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub oam: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub secondary_oam: Vec<u8>,
    pub scanline: u16,
    pub dot: u16,
    pub frame: u64,
    pub odd_frame: bool,
    pub bg_pattern_shift_lo: u16,
    pub bg_pattern_shift_hi: u16,
    pub bg_attribute_shift_lo: u16,
    pub bg_attribute_shift_hi: u16,
    pub next_tile_index: u8,
    pub next_tile_attribute: u8,
    pub next_tile_pattern_lo: u8,
    pub next_tile_pattern_hi: u8,
    pub sprite_count: u8,
    pub sprite_patterns_lo: [u8; 8],
    pub sprite_patterns_hi: [u8; 8],
    pub sprite_attributes: [u8; 8],
    pub sprite_x_positions: [u8; 8],
    pub sprite_zero_on_line: bool,
    pub nmi_output: bool,
    pub nmi_occurred: bool,
}

impl Ppu {
    pub fn new(region: Region) -> Ppu {
        Ppu {
            cycles: 0,
            regs: Regs::new(),
            ppu_data_read_buffer: 0,
            ppu_gen_latch: 0,
            mem: MemMap::new(),
            oam: Oam::new(),
            scanline: 0,
            dot: 0,
            frame: 0,
            odd_frame: false,
            region,
            bg_pattern_shift_lo: 0,
            bg_pattern_shift_hi: 0,
            bg_attribute_shift_lo: 0,
            bg_attribute_shift_hi: 0,
            next_tile_index: 0,
            next_tile_attribute: 0,
            next_tile_pattern_lo: 0,
            next_tile_pattern_hi: 0,
            secondary_oam: [0xFF; 32],
            sprite_count: 0,
            sprite_patterns_lo: [0; 8],
            sprite_patterns_hi: [0; 8],
            sprite_attributes: [0; 8],
            sprite_x_positions: [0; 8],
            sprite_zero_on_line: false,
            nmi_output: false,
            nmi_occurred: false,
            a12_state: false,
            frame_buffer: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
        }
    }

    pub fn reset(&mut self) {
        self.cycles = 0;
        *self.regs.ppu_ctrl = 0;
        self.regs.ppu_mask = PpuMask::empty();
        self.regs.ppu_status = PpuStatus::empty();
        self.regs.w = false;
        self.ppu_data_read_buffer = 0;
        self.scanline = 0;
        self.dot = 0;
        self.odd_frame = false;
        self.nmi_output = false;
        self.nmi_occurred = false;
        self.bg_pattern_shift_lo = 0;
        self.bg_pattern_shift_hi = 0;
        self.bg_attribute_shift_lo = 0;
        self.bg_attribute_shift_hi = 0;
    }

    pub fn frame_buffer(&self) -> &[u32] {
        &self.frame_buffer
    }

    pub fn scanline(&self) -> u16 {
        self.scanline
    }

    pub fn dot(&self) -> u16 {
        self.dot
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// The PPU side of the NMI line. The scheduler samples this after every
    /// tick and detects rising edges itself.
    pub fn nmi_line(&self) -> bool {
        self.nmi_output && self.nmi_occurred
    }

    fn pre_render_scanline(&self) -> u16 {
        self.region.scanlines_per_frame() - 1
    }

    /// Runs the PPU for one dot. Returns true when this tick finished a
    /// frame (the pre-render scanline wrapped around).
    pub fn tick(&mut self, mapper: &mut dyn Mapper) -> bool {
        if self.scanline == self.pre_render_scanline() {
            self.tick_pre_render(mapper);
        } else if self.scanline <= VISIBLE_END_SCANLINE {
            self.tick_visible(mapper);
        } else if self.scanline == VBLANK_START_SCANLINE && self.dot == 1 {
            self.regs.ppu_status.set(PpuStatus::VBLANK_STARTED, true);
            self.nmi_occurred = true;
        }

        self.cycles += 1;

        self.dot += 1;
        if self.dot >= DOTS_PER_SCANLINE {
            self.dot = 0;
            if self.scanline == self.pre_render_scanline() {
                self.scanline = 0;
                self.frame += 1;
                self.odd_frame = !self.odd_frame;
                return true;
            }
            self.scanline += 1;
        }

        false
    }

    fn tick_pre_render(&mut self, mapper: &mut dyn Mapper) {
        if self.dot == 1 {
            self.regs.ppu_status.set(PpuStatus::VBLANK_STARTED, false);
            self.regs.ppu_status.set(PpuStatus::SPRITE_ZERO_HIT, false);
            self.regs.ppu_status.set(PpuStatus::SPRITE_OVERFLOW, false);
            self.nmi_occurred = false;
            self.sprite_patterns_lo = [0; 8];
            self.sprite_patterns_hi = [0; 8];
            self.sprite_count = 0;
        }

        if self.rendering_enabled() {
            if (1..=256).contains(&self.dot) || (321..=336).contains(&self.dot) {
                self.fetch_background(mapper);
                self.shift_background_registers();
            }

            if self.dot == 256 {
                self.increment_y();
            } else if self.dot == 257 {
                self.copy_horizontal_bits();
            } else if (280..=304).contains(&self.dot) {
                self.copy_vertical_bits();
            }

            // The last dot of the pre-render line is skipped on odd frames.
            if self.dot == 339 && self.odd_frame && self.region.has_odd_frame_skip() {
                self.dot = 340;
            }
        }
    }

    fn tick_visible(&mut self, mapper: &mut dyn Mapper) {
        if self.rendering_enabled() {
            if (1..=256).contains(&self.dot) {
                self.render_pixel();
                self.fetch_background(mapper);
                self.shift_background_registers();
            } else if self.dot == 257 {
                // Secondary OAM fill and pattern fetches for the next
                // scanline, done in one step at dot granularity.
                self.evaluate_sprites();
                self.fetch_sprites(mapper);
            } else if (321..=336).contains(&self.dot) {
                self.fetch_background(mapper);
                self.shift_background_registers();
            }

            if self.dot == 256 {
                self.increment_y();
            } else if self.dot == 257 {
                self.copy_horizontal_bits();
            }
        } else if (1..=256).contains(&self.dot) {
            // Rendering disabled: the screen shows the backdrop color.
            let backdrop = self.mem.palette_ram.read_byte(0x3F00);
            let x = (self.dot - 1) as usize;
            let y = self.scanline as usize;
            self.frame_buffer[y * SCREEN_WIDTH + x] =
                rgba_color(backdrop, self.regs.ppu_mask.emphasis());
        }
    }

    ///////////////////////
    // Background pipeline
    ///////////////////////

    fn fetch_background(&mut self, mapper: &mut dyn Mapper) {
        let fetch_cycle = if self.dot >= 321 {
            self.dot - 321
        } else {
            self.dot - 1
        };

        match fetch_cycle & 0x07 {
            0 => {
                if self.dot != 321 {
                    self.load_background_shift_registers();
                }
                let address = 0x2000 | (self.regs.v & 0x0FFF);
                self.next_tile_index = self.mem_read_byte(mapper, address);
            }
            2 => {
                let v = self.regs.v;
                let address = 0x23C0 | (v & 0x0C00) | ((v >> 4) & 0x38) | ((v >> 2) & 0x07);
                let attribute = self.mem_read_byte(mapper, address);
                let shift = ((v >> 4) & 0x04) | (v & 0x02);
                self.next_tile_attribute = (attribute >> shift) & 0x03;
            }
            4 => {
                let address = self.background_pattern_address();
                self.next_tile_pattern_lo = self.mem_read_byte(mapper, address);
            }
            6 => {
                let address = self.background_pattern_address() + 8;
                self.next_tile_pattern_hi = self.mem_read_byte(mapper, address);
            }
            7 => {
                self.increment_coarse_x();
            }
            _ => (),
        }
    }

    fn background_pattern_address(&self) -> u16 {
        let fine_y = (self.regs.v >> 12) & 0x07;
        self.regs.ppu_ctrl.background_pattern_table_address()
            + self.next_tile_index as u16 * 16
            + fine_y
    }

    fn load_background_shift_registers(&mut self) {
        self.bg_pattern_shift_lo =
            (self.bg_pattern_shift_lo & 0xFF00) | self.next_tile_pattern_lo as u16;
        self.bg_pattern_shift_hi =
            (self.bg_pattern_shift_hi & 0xFF00) | self.next_tile_pattern_hi as u16;

        let attribute_lo = if self.next_tile_attribute & 0x01 != 0 {
            0xFF
        } else {
            0x00
        };
        let attribute_hi = if self.next_tile_attribute & 0x02 != 0 {
            0xFF
        } else {
            0x00
        };
        self.bg_attribute_shift_lo = (self.bg_attribute_shift_lo & 0xFF00) | attribute_lo;
        self.bg_attribute_shift_hi = (self.bg_attribute_shift_hi & 0xFF00) | attribute_hi;
    }

    fn shift_background_registers(&mut self) {
        self.bg_pattern_shift_lo <<= 1;
        self.bg_pattern_shift_hi <<= 1;
        self.bg_attribute_shift_lo <<= 1;
        self.bg_attribute_shift_hi <<= 1;
    }

    fn background_pixel(&self) -> (u8, u8) {
        if !self.regs.ppu_mask.contains(PpuMask::SHOW_BACKGROUND) {
            return (0, 0);
        }
        if self.dot <= 8 && !self.regs.ppu_mask.contains(PpuMask::SHOW_BACKGROUND_LEFT_8) {
            return (0, 0);
        }

        let select = 0x8000 >> self.regs.x;
        let pixel_lo = (self.bg_pattern_shift_lo & select != 0) as u8;
        let pixel_hi = (self.bg_pattern_shift_hi & select != 0) as u8;
        let palette_lo = (self.bg_attribute_shift_lo & select != 0) as u8;
        let palette_hi = (self.bg_attribute_shift_hi & select != 0) as u8;

        ((pixel_hi << 1) | pixel_lo, (palette_hi << 1) | palette_lo)
    }

    ///////////////////////
    // Sprite pipeline
    ///////////////////////

    fn evaluate_sprites(&mut self) {
        let sprite_height = self.regs.ppu_ctrl.sprite_size().height() as u16;
        let scanline = self.scanline;

        self.secondary_oam = [0xFF; 32];
        self.sprite_count = 0;
        self.sprite_zero_on_line = false;

        let mut n = 0;
        while n < 64 {
            let y = self.oam[n * 4] as u16;
            if scanline.wrapping_sub(y) < sprite_height {
                if self.sprite_count < 8 {
                    let index = self.sprite_count as usize * 4;
                    self.secondary_oam[index..index + 4]
                        .copy_from_slice(&self.oam[n * 4..n * 4 + 4]);
                    if n == 0 {
                        self.sprite_zero_on_line = true;
                    }
                    self.sprite_count += 1;
                } else {
                    self.overflow_evaluation(n, sprite_height);
                    break;
                }
            }
            n += 1;
        }
    }

    // After eight sprites are found the hardware keeps scanning, but a bug
    // increments the OAM byte offset alongside the sprite index on each
    // miss, so tile/attribute/X bytes get compared as if they were Y
    // coordinates. That produces both false negatives and false positives.
    fn overflow_evaluation(&mut self, start: usize, sprite_height: u16) {
        let mut n = start;
        let mut m = 0;
        while n < 64 {
            let y = self.oam[(n * 4 + m) & 0xFF] as u16;
            if self.scanline.wrapping_sub(y) < sprite_height {
                self.regs.ppu_status.set(PpuStatus::SPRITE_OVERFLOW, true);
                break;
            }
            n += 1;
            m = (m + 1) & 3;
        }
    }

    fn fetch_sprites(&mut self, mapper: &mut dyn Mapper) {
        let sprite_height = self.regs.ppu_ctrl.sprite_size().height() as u16;
        let scanline = self.scanline;

        for i in 0..8usize {
            if i >= self.sprite_count as usize {
                self.sprite_patterns_lo[i] = 0;
                self.sprite_patterns_hi[i] = 0;
                continue;
            }

            let y = self.secondary_oam[i * 4] as u16;
            let tile_index = self.secondary_oam[i * 4 + 1];
            let attributes = self.secondary_oam[i * 4 + 2];
            let x = self.secondary_oam[i * 4 + 3];

            let flip_vertical = attributes & 0x80 != 0;
            let mut row = scanline.wrapping_sub(y);

            let (table, tile, row) = if sprite_height == 16 {
                // 8x16: bit 0 of the tile index selects the pattern table.
                let table = (tile_index as u16 & 0x01) * 0x1000;
                let tile = tile_index & 0xFE;
                if flip_vertical {
                    row = 15 - row;
                }
                if row >= 8 {
                    (table, tile + 1, row - 8)
                } else {
                    (table, tile, row)
                }
            } else {
                let table = self.regs.ppu_ctrl.sprite_pattern_table_address();
                if flip_vertical {
                    row = 7 - row;
                }
                (table, tile_index, row)
            };

            let address = table + tile as u16 * 16 + row;
            let mut pattern_lo = self.mem_read_byte(mapper, address);
            let mut pattern_hi = self.mem_read_byte(mapper, address + 8);

            if attributes & 0x40 != 0 {
                pattern_lo = flip_byte(pattern_lo);
                pattern_hi = flip_byte(pattern_hi);
            }

            self.sprite_patterns_lo[i] = pattern_lo;
            self.sprite_patterns_hi[i] = pattern_hi;
            self.sprite_attributes[i] = attributes;
            self.sprite_x_positions[i] = x;
        }
    }

    /// Returns (pixel, palette, behind_background, is_sprite_zero) for the
    /// first opaque sprite pixel at the current dot.
    fn sprite_pixel(&self, x: usize) -> (u8, u8, bool, bool) {
        if !self.regs.ppu_mask.contains(PpuMask::SHOW_SPRITES) {
            return (0, 0, false, false);
        }
        if x < 8 && !self.regs.ppu_mask.contains(PpuMask::SHOW_SPRITES_LEFT_8) {
            return (0, 0, false, false);
        }

        for i in 0..self.sprite_count as usize {
            let offset = x as i16 - self.sprite_x_positions[i] as i16;
            if !(0..8).contains(&offset) {
                continue;
            }

            let shift = 7 - offset as u8;
            let pixel_lo = (self.sprite_patterns_lo[i] >> shift) & 0x01;
            let pixel_hi = (self.sprite_patterns_hi[i] >> shift) & 0x01;
            let pixel = (pixel_hi << 1) | pixel_lo;
            if pixel == 0 {
                continue;
            }

            let palette = (self.sprite_attributes[i] & 0x03) + 4;
            let behind = self.sprite_attributes[i] & 0x20 != 0;
            let is_zero = self.sprite_zero_on_line && i == 0;
            return (pixel, palette, behind, is_zero);
        }

        (0, 0, false, false)
    }

    fn render_pixel(&mut self) {
        let x = (self.dot - 1) as usize;
        let y = self.scanline as usize;

        let (bg_pixel, bg_palette) = self.background_pixel();
        let (sprite_pixel, sprite_palette, behind, is_zero) = self.sprite_pixel(x);

        let (pixel, palette) = match (bg_pixel, sprite_pixel) {
            (0, 0) => (0, 0),
            (0, _) => (sprite_pixel, sprite_palette),
            (_, 0) => (bg_pixel, bg_palette),
            _ => {
                if is_zero
                    && x != 255
                    && self.regs.ppu_mask.contains(PpuMask::SHOW_BACKGROUND)
                    && self.regs.ppu_mask.contains(PpuMask::SHOW_SPRITES)
                {
                    self.regs.ppu_status.set(PpuStatus::SPRITE_ZERO_HIT, true);
                }
                if behind {
                    (bg_pixel, bg_palette)
                } else {
                    (sprite_pixel, sprite_palette)
                }
            }
        };

        let palette_address = if pixel == 0 {
            0x3F00
        } else {
            0x3F00 | ((palette as u16) << 2) | pixel as u16
        };
        let mut color_index = self.mem.palette_ram.read_byte(palette_address);
        if self.regs.ppu_mask.contains(PpuMask::GREYSCALE) {
            color_index &= 0x30;
        }

        self.frame_buffer[y * SCREEN_WIDTH + x] =
            rgba_color(color_index, self.regs.ppu_mask.emphasis());
    }

    ///////////////////////
    // Scrolling
    ///////////////////////

    fn increment_coarse_x(&mut self) {
        if (self.regs.v & 0x001F) == 31 {
            self.regs.v &= !0x001F; // coarse X = 0
            self.regs.v ^= 0x0400; // switch horizontal nametable
        } else {
            self.regs.v += 1;
        }
    }

    fn increment_y(&mut self) {
        if (self.regs.v & 0x7000) != 0x7000 {
            self.regs.v += 0x1000;
        } else {
            self.regs.v &= !0x7000;
            let mut y = (self.regs.v & 0x03E0) >> 5;
            if y == 29 {
                y = 0;
                self.regs.v ^= 0x0800; // switch vertical nametable
            } else if y == 31 {
                y = 0;
            } else {
                y += 1;
            }

            self.regs.v = (self.regs.v & !0x03E0) | (y << 5);
        }
    }

    fn copy_horizontal_bits(&mut self) {
        self.regs.v = (self.regs.v & !0x041F) | (self.regs.t & 0x041F);
    }

    fn copy_vertical_bits(&mut self) {
        self.regs.v = (self.regs.v & !0x7BE0) | (self.regs.t & 0x7BE0);
    }

    fn rendering_enabled(&self) -> bool {
        self.regs.ppu_mask.contains(PpuMask::SHOW_BACKGROUND)
            || self.regs.ppu_mask.contains(PpuMask::SHOW_SPRITES)
    }

    ///////////////////////
    // Register access
    ///////////////////////

    pub fn read_byte(&mut self, mapper: &mut dyn Mapper, address: u16) -> u8 {
        let value = match 0x2000 | (address & 0x0007) {
            PPUSTATUS_ADDRESS => self.read_ppu_status(),
            OAMDATA_ADDRESS => self.oam[self.regs.oam_addr as usize],
            PPUDATA_ADDRESS => self.read_ppu_data_byte(mapper),
            _ => self.ppu_gen_latch,
        };

        self.ppu_gen_latch = value;

        value
    }

    pub fn write_byte(&mut self, mapper: &mut dyn Mapper, address: u16, value: u8) {
        self.ppu_gen_latch = value;

        match 0x2000 | (address & 0x0007) {
            PPUCTRL_ADDRESS => self.write_ppu_ctrl(value),
            PPUMASK_ADDRESS => self.regs.ppu_mask = PpuMask::from_bits_truncate(value),
            OAMADDR_ADDRESS => self.regs.oam_addr = value,
            OAMDATA_ADDRESS => self.write_oam_byte(value),
            PPUSCROLL_ADDRESS => self.write_ppu_scroll(value),
            PPUADDR_ADDRESS => self.write_ppu_addr(value),
            PPUDATA_ADDRESS => self.write_ppu_data_byte(mapper, value),
            _ => (),
        }
    }

    fn read_ppu_status(&mut self) -> u8 {
        self.regs.w = false;

        let status = self.regs.ppu_status.bits() | (self.ppu_gen_latch & 0x1F);

        // Reading clears the VBlank flag and the NMI level with it.
        self.regs.ppu_status.set(PpuStatus::VBLANK_STARTED, false);
        self.nmi_occurred = false;

        status
    }

    fn write_ppu_ctrl(&mut self, value: u8) {
        self.regs.t = (self.regs.t & !0x0C00) | ((value as u16 & 0x03) << 10);
        *self.regs.ppu_ctrl = value;
        self.nmi_output = self.regs.ppu_ctrl.generate_nmi_at_vblank();
    }

    fn write_oam_byte(&mut self, value: u8) {
        self.oam[self.regs.oam_addr as usize] = value;
        self.regs.oam_addr = self.regs.oam_addr.wrapping_add(1);
    }

    fn write_ppu_scroll(&mut self, value: u8) {
        if !self.regs.w {
            self.regs.t = (self.regs.t & !0x001F) | ((value as u16) >> 3);
            self.regs.x = value & 0x07;
        } else {
            self.regs.t = (self.regs.t & !0x73E0)
                | ((value as u16 & 0x07) << 12)
                | ((value as u16 & 0xF8) << 2);
        }
        self.regs.w = !self.regs.w;
    }

    fn write_ppu_addr(&mut self, value: u8) {
        if !self.regs.w {
            self.regs.t = (self.regs.t & 0x00FF) | ((value as u16 & 0x3F) << 8);
        } else {
            self.regs.t = (self.regs.t & 0xFF00) | value as u16;
            self.regs.v = self.regs.t;
        }
        self.regs.w = !self.regs.w;
    }

    fn read_ppu_data_byte(&mut self, mapper: &mut dyn Mapper) -> u8 {
        let address = self.regs.v & 0x3FFF;

        let value = if address < PaletteRam::START_ADDRESS {
            let buffered = self.ppu_data_read_buffer;
            self.ppu_data_read_buffer = self.mem_read_byte(mapper, address);
            buffered
        } else {
            // Palette reads bypass the buffer; the buffer receives the
            // nametable byte underneath the palette address.
            self.ppu_data_read_buffer = self.mem_read_byte(mapper, address & 0x2FFF);
            self.mem.palette_ram.read_byte(address)
        };

        self.increment_ppu_addr();

        value
    }

    fn write_ppu_data_byte(&mut self, mapper: &mut dyn Mapper, value: u8) {
        let address = self.regs.v & 0x3FFF;
        self.mem_write_byte(mapper, address, value);
        self.increment_ppu_addr();
    }

    fn increment_ppu_addr(&mut self) {
        self.regs.v = self
            .regs
            .v
            .wrapping_add(match self.regs.ppu_ctrl.vram_address_increment() {
                VramAddressIncrement::Add1Across => 1,
                VramAddressIncrement::Add32Down => 32,
            })
            & 0x7FFF;
    }

    ///////////////////////
    // PPU address space
    ///////////////////////

    fn mem_read_byte(&mut self, mapper: &mut dyn Mapper, address: u16) -> u8 {
        let address = address & 0x3FFF;
        self.watch_a12(mapper, address);
        if address < PaletteRam::START_ADDRESS {
            mapper.ppu_read_byte(&mut self.mem.vram, address)
        } else {
            self.mem.palette_ram.read_byte(address)
        }
    }

    fn mem_write_byte(&mut self, mapper: &mut dyn Mapper, address: u16, value: u8) {
        let address = address & 0x3FFF;
        self.watch_a12(mapper, address);
        if address < PaletteRam::START_ADDRESS {
            mapper.ppu_write_byte(&mut self.mem.vram, address, value);
        } else {
            self.mem.palette_ram.write_byte(address, value);
        }
    }

    // Scanline-counting mappers watch address line 12 of the PPU bus.
    fn watch_a12(&mut self, mapper: &mut dyn Mapper, address: u16) {
        let a12 = address & 0x1000 != 0;
        if a12 && !self.a12_state {
            mapper.notify_ppu_a12(true);
        }
        self.a12_state = a12;
    }

    pub fn get_state(&self) -> State {
        State {
            cycles: self.cycles,
            ppu_ctrl: *self.regs.ppu_ctrl,
            ppu_mask: self.regs.ppu_mask.bits(),
            ppu_status: self.regs.ppu_status.bits(),
            oam_addr: self.regs.oam_addr,
            v: self.regs.v,
            t: self.regs.t,
            x: self.regs.x,
            w: self.regs.w,
            ppu_data_read_buffer: self.ppu_data_read_buffer,
            ppu_gen_latch: self.ppu_gen_latch,
            vram: self.mem.vram.to_vec(),
            palette_ram: self.mem.palette_ram.to_vec(),
            oam: self.oam.to_vec(),
            secondary_oam: self.secondary_oam.to_vec(),
            scanline: self.scanline,
            dot: self.dot,
            frame: self.frame,
            odd_frame: self.odd_frame,
            bg_pattern_shift_lo: self.bg_pattern_shift_lo,
            bg_pattern_shift_hi: self.bg_pattern_shift_hi,
            bg_attribute_shift_lo: self.bg_attribute_shift_lo,
            bg_attribute_shift_hi: self.bg_attribute_shift_hi,
            next_tile_index: self.next_tile_index,
            next_tile_attribute: self.next_tile_attribute,
            next_tile_pattern_lo: self.next_tile_pattern_lo,
            next_tile_pattern_hi: self.next_tile_pattern_hi,
            sprite_count: self.sprite_count,
            sprite_patterns_lo: self.sprite_patterns_lo,
            sprite_patterns_hi: self.sprite_patterns_hi,
            sprite_attributes: self.sprite_attributes,
            sprite_x_positions: self.sprite_x_positions,
            sprite_zero_on_line: self.sprite_zero_on_line,
            nmi_output: self.nmi_output,
            nmi_occurred: self.nmi_occurred,
        }
    }

    pub fn apply_state(&mut self, state: &State) {
        self.cycles = state.cycles;
        *self.regs.ppu_ctrl = state.ppu_ctrl;
        self.regs.ppu_mask = PpuMask::from_bits_truncate(state.ppu_mask);
        self.regs.ppu_status = PpuStatus::from_bits_truncate(state.ppu_status);
        self.regs.oam_addr = state.oam_addr;
        self.regs.v = state.v;
        self.regs.t = state.t;
        self.regs.x = state.x;
        self.regs.w = state.w;
        self.ppu_data_read_buffer = state.ppu_data_read_buffer;
        self.ppu_gen_latch = state.ppu_gen_latch;
        self.mem.vram.copy_from_slice(&state.vram);
        self.mem.palette_ram.copy_from_slice(&state.palette_ram);
        self.oam.copy_from_slice(&state.oam);
        self.secondary_oam.copy_from_slice(&state.secondary_oam);
        self.scanline = state.scanline;
        self.dot = state.dot;
        self.frame = state.frame;
        self.odd_frame = state.odd_frame;
        self.bg_pattern_shift_lo = state.bg_pattern_shift_lo;
        self.bg_pattern_shift_hi = state.bg_pattern_shift_hi;
        self.bg_attribute_shift_lo = state.bg_attribute_shift_lo;
        self.bg_attribute_shift_hi = state.bg_attribute_shift_hi;
        self.next_tile_index = state.next_tile_index;
        self.next_tile_attribute = state.next_tile_attribute;
        self.next_tile_pattern_lo = state.next_tile_pattern_lo;
        self.next_tile_pattern_hi = state.next_tile_pattern_hi;
        self.sprite_count = state.sprite_count;
        self.sprite_patterns_lo = state.sprite_patterns_lo;
        self.sprite_patterns_hi = state.sprite_patterns_hi;
        self.sprite_attributes = state.sprite_attributes;
        self.sprite_x_positions = state.sprite_x_positions;
        self.sprite_zero_on_line = state.sprite_zero_on_line;
        self.nmi_output = state.nmi_output;
        self.nmi_occurred = state.nmi_occurred;
    }
}

// VRAM address increment per CPU read/write of PPUDATA
enum VramAddressIncrement {
    Add1Across,
    Add32Down,
}

enum SpriteSize {
    Size8x8,
    Size8x16,
}

impl SpriteSize {
    fn height(&self) -> u8 {
        match *self {
            SpriteSize::Size8x8 => 8,
            SpriteSize::Size8x16 => 16,
        }
    }
}

struct PpuCtrl {
    val: u8,
}

impl PpuCtrl {
    fn vram_address_increment(&self) -> VramAddressIncrement {
        if (self.val & 0x04) == 0 {
            VramAddressIncrement::Add1Across
        } else {
            VramAddressIncrement::Add32Down
        }
    }

    // For 8x8 sprites (ignored in 8x16 mode)
    fn sprite_pattern_table_address(&self) -> u16 {
        if (self.val & 0x08) == 0 { 0x0000 } else { 0x1000 }
    }

    fn background_pattern_table_address(&self) -> u16 {
        if (self.val & 0x10) == 0 { 0x0000 } else { 0x1000 }
    }

    fn sprite_size(&self) -> SpriteSize {
        if (self.val & 0x20) == 0 {
            SpriteSize::Size8x8
        } else {
            SpriteSize::Size8x16
        }
    }

    fn generate_nmi_at_vblank(&self) -> bool {
        (self.val & 0x80) != 0
    }
}

impl Deref for PpuCtrl {
    type Target = u8;

    fn deref(&self) -> &u8 {
        &self.val
    }
}

impl DerefMut for PpuCtrl {
    fn deref_mut(&mut self) -> &mut u8 {
        &mut self.val
    }
}

bitflags! {
    #[derive(Copy, Clone)]
    struct PpuMask: u8 {
        const GREYSCALE              = 1 << 0;
        const SHOW_BACKGROUND_LEFT_8 = 1 << 1;
        const SHOW_SPRITES_LEFT_8    = 1 << 2;
        const SHOW_BACKGROUND        = 1 << 3;
        const SHOW_SPRITES           = 1 << 4;
        const EMPHASIZE_RED          = 1 << 5;
        const EMPHASIZE_GREEN        = 1 << 6;
        const EMPHASIZE_BLUE         = 1 << 7;
    }
}

impl PpuMask {
    fn emphasis(self) -> u8 {
        self.bits() >> 5
    }
}

bitflags! {
    #[derive(Copy, Clone)]
    struct PpuStatus: u8 {
        const SPRITE_OVERFLOW = 1 << 5;
        const SPRITE_ZERO_HIT = 1 << 6;
        const VBLANK_STARTED  = 1 << 7;
    }
}

struct Regs {
    ppu_ctrl: PpuCtrl,     // 0x2000
    ppu_mask: PpuMask,     // 0x2001
    ppu_status: PpuStatus, // 0x2002
    oam_addr: u8,          // 0x2003

    // Internal latches
    v: u16,  // Current VRAM address (15 bits)
    t: u16,  // Temporary VRAM address (15 bits)
    x: u8,   // Fine X scroll (3 bits)
    w: bool, // First-or-second write toggle
}

impl Regs {
    fn new() -> Regs {
        Regs {
            ppu_ctrl: PpuCtrl { val: 0 },
            ppu_mask: PpuMask::empty(),
            ppu_status: PpuStatus::empty(),
            oam_addr: 0,
            v: 0,
            t: 0,
            x: 0,
            w: false,
        }
    }
}

// OAM holds a display list of up to 64 sprites, 4 bytes each.
pub struct Oam {
    bytes: [u8; Oam::SIZE],
}

impl Oam {
    const SIZE: usize = 64 * 4;

    fn new() -> Oam {
        Oam {
            bytes: [0u8; Oam::SIZE],
        }
    }
}

impl Deref for Oam {
    type Target = [u8; Oam::SIZE];

    fn deref(&self) -> &Self::Target {
        &self.bytes
    }
}

impl DerefMut for Oam {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.bytes
    }
}

// 2KB internal dedicated video RAM, holding the nametables.
pub struct Vram {
    bytes: [u8; Vram::SIZE],
}

impl Vram {
    const SIZE: usize = 0x0800;

    pub fn new() -> Vram {
        Vram {
            bytes: [0u8; Vram::SIZE],
        }
    }
}

impl Default for Vram {
    fn default() -> Self {
        Vram::new()
    }
}

impl Memory for Vram {
    fn read_byte(&mut self, address: u16) -> u8 {
        self[address as usize & (Vram::SIZE - 1)]
    }

    fn write_byte(&mut self, address: u16, value: u8) {
        self[address as usize & (Vram::SIZE - 1)] = value
    }
}

impl Deref for Vram {
    type Target = [u8; Vram::SIZE];

    fn deref(&self) -> &Self::Target {
        &self.bytes
    }
}

impl DerefMut for Vram {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.bytes
    }
}

pub struct PaletteRam {
    bytes: [u8; PaletteRam::SIZE],
}

impl PaletteRam {
    const SIZE: usize = 32;
    const START_ADDRESS: u16 = 0x3F00;

    fn new() -> PaletteRam {
        PaletteRam {
            bytes: [0u8; PaletteRam::SIZE],
        }
    }

    // Entries 0x10/0x14/0x18/0x1C mirror 0x00/0x04/0x08/0x0C.
    fn mirror(address: u16) -> usize {
        let index = (address as usize) & 0x1F;
        if index >= 0x10 && index % 4 == 0 {
            index - 0x10
        } else {
            index
        }
    }
}

impl Memory for PaletteRam {
    fn read_byte(&mut self, address: u16) -> u8 {
        self[PaletteRam::mirror(address)]
    }

    fn write_byte(&mut self, address: u16, value: u8) {
        self[PaletteRam::mirror(address)] = value
    }
}

impl Deref for PaletteRam {
    type Target = [u8; PaletteRam::SIZE];

    fn deref(&self) -> &Self::Target {
        &self.bytes
    }
}

impl DerefMut for PaletteRam {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.bytes
    }
}

struct MemMap {
    vram: Vram,
    palette_ram: PaletteRam,
}

impl MemMap {
    fn new() -> Self {
        MemMap {
            vram: Vram::new(),
            palette_ram: PaletteRam::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Cartridge;
    use crate::mapper::create_mapper;

    fn test_mapper() -> Box<dyn Mapper> {
        // NROM with CHR RAM and vertical mirroring.
        let mut rom = vec![0u8; 16 + 16 * 1024];
        rom[0..4].copy_from_slice(b"NES\x1a");
        rom[4] = 1;
        rom[5] = 0;
        rom[6] = 0x01;
        create_mapper(Cartridge::load(&rom).unwrap()).unwrap()
    }

    fn run_to(ppu: &mut Ppu, mapper: &mut Box<dyn Mapper>, scanline: u16, dot: u16) {
        while !(ppu.scanline() == scanline && ppu.dot() == dot) {
            ppu.tick(mapper.as_mut());
        }
    }

    #[test]
    fn vblank_flag_sets_at_241_1_and_clears_at_pre_render() {
        let mut mapper = test_mapper();
        let mut ppu = Ppu::new(Region::Ntsc);

        run_to(&mut ppu, &mut mapper, 241, 2);
        assert!(ppu.regs.ppu_status.contains(PpuStatus::VBLANK_STARTED));

        run_to(&mut ppu, &mut mapper, 261, 2);
        assert!(!ppu.regs.ppu_status.contains(PpuStatus::VBLANK_STARTED));
    }

    #[test]
    fn nmi_line_requires_ctrl_bit_7() {
        let mut mapper = test_mapper();
        let mut ppu = Ppu::new(Region::Ntsc);

        run_to(&mut ppu, &mut mapper, 241, 2);
        assert!(!ppu.nmi_line());

        ppu.write_byte(mapper.as_mut(), 0x2000, 0x80);
        assert!(ppu.nmi_line());
    }

    #[test]
    fn status_read_clears_vblank_and_write_toggle() {
        let mut mapper = test_mapper();
        let mut ppu = Ppu::new(Region::Ntsc);

        run_to(&mut ppu, &mut mapper, 241, 2);
        ppu.write_byte(mapper.as_mut(), 0x2006, 0x21); // w: false -> true

        let status = ppu.read_byte(mapper.as_mut(), 0x2002);
        assert_ne!(status & 0x80, 0);
        assert!(!ppu.regs.w);

        let status = ppu.read_byte(mapper.as_mut(), 0x2002);
        assert_eq!(status & 0x80, 0);
    }

    #[test]
    fn ppu_addr_write_pair_copies_t_to_v() {
        let mut mapper = test_mapper();
        let mut ppu = Ppu::new(Region::Ntsc);

        ppu.write_byte(mapper.as_mut(), 0x2006, 0x23);
        assert_eq!(ppu.regs.v, 0);
        ppu.write_byte(mapper.as_mut(), 0x2006, 0x45);
        assert_eq!(ppu.regs.v, 0x2345);
    }

    #[test]
    fn scroll_writes_update_t_and_fine_x() {
        let mut mapper = test_mapper();
        let mut ppu = Ppu::new(Region::Ntsc);

        ppu.write_byte(mapper.as_mut(), 0x2005, 0x7D); // X = 0b01111_101
        assert_eq!(ppu.regs.x, 0x05);
        assert_eq!(ppu.regs.t & 0x001F, 0x0F);

        ppu.write_byte(mapper.as_mut(), 0x2005, 0x5E); // Y = 0b01011_110
        assert_eq!((ppu.regs.t >> 12) & 0x07, 0x06); // fine Y
        assert_eq!((ppu.regs.t >> 5) & 0x1F, 0x0B); // coarse Y
    }

    #[test]
    fn ctrl_write_sets_nametable_bits_of_t() {
        let mut mapper = test_mapper();
        let mut ppu = Ppu::new(Region::Ntsc);

        ppu.write_byte(mapper.as_mut(), 0x2000, 0x03);
        assert_eq!(ppu.regs.t & 0x0C00, 0x0C00);
    }

    #[test]
    fn ppu_data_reads_are_buffered() {
        let mut mapper = test_mapper();
        let mut ppu = Ppu::new(Region::Ntsc);

        ppu.write_byte(mapper.as_mut(), 0x2006, 0x20);
        ppu.write_byte(mapper.as_mut(), 0x2006, 0x00);
        ppu.write_byte(mapper.as_mut(), 0x2007, 0xAA);
        ppu.write_byte(mapper.as_mut(), 0x2007, 0xBB);

        ppu.write_byte(mapper.as_mut(), 0x2006, 0x20);
        ppu.write_byte(mapper.as_mut(), 0x2006, 0x00);
        ppu.read_byte(mapper.as_mut(), 0x2007); // stale buffer
        assert_eq!(ppu.read_byte(mapper.as_mut(), 0x2007), 0xAA);
        assert_eq!(ppu.read_byte(mapper.as_mut(), 0x2007), 0xBB);
    }

    #[test]
    fn ppu_data_increments_by_32_when_ctrl_bit_2_set() {
        let mut mapper = test_mapper();
        let mut ppu = Ppu::new(Region::Ntsc);

        ppu.write_byte(mapper.as_mut(), 0x2000, 0x04);
        ppu.write_byte(mapper.as_mut(), 0x2006, 0x20);
        ppu.write_byte(mapper.as_mut(), 0x2006, 0x00);
        ppu.write_byte(mapper.as_mut(), 0x2007, 0x11);
        assert_eq!(ppu.regs.v, 0x2020);
    }

    #[test]
    fn palette_mirrors_backdrop_entries() {
        let mut mapper = test_mapper();
        let mut ppu = Ppu::new(Region::Ntsc);

        for (mirror, target) in [(0x3F10, 0x3F00), (0x3F14, 0x3F04), (0x3F18, 0x3F08), (0x3F1C, 0x3F0C)]
        {
            ppu.write_byte(mapper.as_mut(), 0x2006, (mirror >> 8) as u8);
            ppu.write_byte(mapper.as_mut(), 0x2006, mirror as u8);
            ppu.write_byte(mapper.as_mut(), 0x2007, 0x2A);
            assert_eq!(
                ppu.mem.palette_ram.read_byte(target),
                0x2A,
                "0x{:04X} should mirror 0x{:04X}",
                mirror,
                target
            );
        }
    }

    #[test]
    fn oam_data_writes_increment_oam_addr() {
        let mut mapper = test_mapper();
        let mut ppu = Ppu::new(Region::Ntsc);

        ppu.write_byte(mapper.as_mut(), 0x2003, 0x10);
        ppu.write_byte(mapper.as_mut(), 0x2004, 0xAB);
        ppu.write_byte(mapper.as_mut(), 0x2004, 0xCD);
        assert_eq!(ppu.oam[0x10], 0xAB);
        assert_eq!(ppu.oam[0x11], 0xCD);
        assert_eq!(ppu.regs.oam_addr, 0x12);
    }

    #[test]
    fn frame_completes_by_dot_advancement_with_rendering_disabled() {
        let mut mapper = test_mapper();
        let mut ppu = Ppu::new(Region::Ntsc);

        let mut completed = 0;
        for _ in 0..(341 * 262) {
            if ppu.tick(mapper.as_mut()) {
                completed += 1;
            }
        }
        assert_eq!(completed, 1);
    }

    #[test]
    fn sprite_zero_hit_on_overlap() {
        let mut mapper = test_mapper();
        let mut ppu = Ppu::new(Region::Ntsc);

        // Solid tile 1 in CHR RAM.
        for row in 0..8u16 {
            mapper.ppu_write_byte(&mut ppu.mem.vram, 16 + row, 0xFF);
        }
        // Background shows tile 1 everywhere.
        for address in 0x2000u16..0x23C0 {
            mapper.ppu_write_byte(&mut ppu.mem.vram, address, 1);
        }
        // Sprite 0 at top-left with tile 1.
        ppu.oam[0] = 10; // Y (sprite appears on scanline 11)
        ppu.oam[1] = 1; // tile
        ppu.oam[2] = 0; // attributes
        ppu.oam[3] = 40; // X

        ppu.write_byte(mapper.as_mut(), 0x2001, 0x1E); // render both, no clip

        let mut saw_hit_scanline = None;
        for _ in 0..(341 * 262) {
            ppu.tick(mapper.as_mut());
            if ppu.regs.ppu_status.contains(PpuStatus::SPRITE_ZERO_HIT) && saw_hit_scanline.is_none()
            {
                saw_hit_scanline = Some(ppu.scanline());
                break;
            }
        }

        assert_eq!(saw_hit_scanline, Some(11));
    }

    #[test]
    fn sprite_overflow_set_with_nine_sprites_in_range() {
        let mut mapper = test_mapper();
        let mut ppu = Ppu::new(Region::Ntsc);

        for i in 0..9 {
            ppu.oam[i * 4] = 20;
        }
        ppu.write_byte(mapper.as_mut(), 0x2001, 0x18);

        run_to(&mut ppu, &mut mapper, 21, 300);
        assert!(ppu.regs.ppu_status.contains(PpuStatus::SPRITE_OVERFLOW));
    }

    #[test]
    fn pal_frame_has_312_scanlines() {
        let mut mapper = test_mapper();
        let mut ppu = Ppu::new(Region::Pal);

        let mut ticks = 0u32;
        loop {
            ticks += 1;
            if ppu.tick(mapper.as_mut()) {
                break;
            }
        }
        assert_eq!(ticks, 341 * 312);
    }
}
