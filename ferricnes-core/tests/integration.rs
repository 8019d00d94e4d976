//! Whole-machine tests driven through hand-assembled iNES images.

use ferricnes_core::cartridge::{Cartridge, LoadError};
use ferricnes_core::input::Button;
use ferricnes_core::memory::Memory;
use ferricnes_core::nes::{Nes, Region, StateError};
use ferricnes_core::serialize;
use ferricnes_core::sink::{AudioBufferSink, NullAudioSink, NullVideoSink, VideoFrameSink};

const HEADER_SIZE: usize = 16;
const PRG_BANK: usize = 16 * 1024;
const CHR_BANK: usize = 8 * 1024;

/// Builds a minimal iNES image: NROM, the given PRG bank count, one CHR
/// bank, reset vector pointing at 0x8000.
fn build_rom(prg_banks: u8) -> Vec<u8> {
    let mut rom = vec![0u8; HEADER_SIZE + prg_banks as usize * PRG_BANK + CHR_BANK];
    rom[0..4].copy_from_slice(b"NES\x1a");
    rom[4] = prg_banks;
    rom[5] = 1;
    set_prg(&mut rom, prg_banks, 0xFFFC, &[0x00, 0x80]);
    rom
}

/// Writes bytes into PRG space by CPU address (0x8000 and up).
fn set_prg(rom: &mut [u8], prg_banks: u8, address: u16, bytes: &[u8]) {
    let prg_size = prg_banks as usize * PRG_BANK;
    for (i, &byte) in bytes.iter().enumerate() {
        let offset = (address as usize + i - 0x8000) % prg_size;
        rom[HEADER_SIZE + offset] = byte;
    }
}

fn nes_with_program(program: &[u8]) -> Nes {
    let mut rom = build_rom(1);
    set_prg(&mut rom, 1, 0x8000, program);
    Nes::new(Cartridge::load(&rom).unwrap(), Region::Ntsc, 44_100, 512).unwrap()
}

#[test]
fn reset_vector_is_honored() {
    let mut rom = build_rom(1);
    set_prg(&mut rom, 1, 0xFFFC, &[0x34, 0x12]);
    let nes = Nes::new(Cartridge::load(&rom).unwrap(), Region::Ntsc, 44_100, 512).unwrap();

    assert_eq!(nes.cpu.regs().pc, 0x1234);
    assert_eq!(nes.cpu.regs().sp, 0xFD);
    assert!(nes.cpu.flags().i);
}

#[test]
fn lda_immediate_updates_flags_per_instruction() {
    let mut nes = nes_with_program(&[0xA9, 0x00, 0xA9, 0x80]);
    let mut video = NullVideoSink::new();
    let mut audio = NullAudioSink::new();

    assert_eq!(nes.step(&mut video, &mut audio), 2);
    assert_eq!(nes.cpu.regs().a, 0x00);
    assert!(nes.cpu.flags().z);

    assert_eq!(nes.step(&mut video, &mut audio), 2);
    assert_eq!(nes.cpu.regs().a, 0x80);
    assert!(!nes.cpu.flags().z);
    assert!(nes.cpu.flags().n);
}

#[test]
fn oam_dma_copies_a_page_and_costs_513_cycles() {
    let mut nes = nes_with_program(&[
        0xA9, 0xAB, // LDA #$AB
        0x8D, 0x00, 0x02, // STA $0200
        0xA9, 0xCD, // LDA #$CD
        0x8D, 0x07, 0x02, // STA $0207
        0xA9, 0x02, // LDA #$02
        0x8D, 0x14, 0x40, // STA $4014 (OAM DMA from page 2)
        0x4C, 0x0F, 0x80, // spin
    ]);
    let mut video = NullVideoSink::new();
    let mut audio = NullAudioSink::new();

    let mut total = 0;
    for _ in 0..5 {
        total += nes.step(&mut video, &mut audio);
    }
    assert_eq!(total, 14);

    // The store instruction itself plus the 513-cycle transfer.
    assert_eq!(nes.step(&mut video, &mut audio), 517);

    let oam = nes.ppu.get_state().oam;
    assert_eq!(oam[0x00], 0xAB);
    assert_eq!(oam[0x07], 0xCD);
    assert_eq!(oam[0x01], 0x00);
}

#[test]
fn vblank_nmi_fires_once_per_frame() {
    let mut rom = build_rom(1);
    set_prg(
        &mut rom,
        1,
        0x8000,
        &[
            0xA9, 0x80, // LDA #$80
            0x8D, 0x00, 0x20, // STA $2000 (enable NMI at VBlank)
            0x4C, 0x05, 0x80, // spin
        ],
    );
    // NMI handler: INC $F0; RTI
    set_prg(&mut rom, 1, 0x8010, &[0xE6, 0xF0, 0x40]);
    set_prg(&mut rom, 1, 0xFFFA, &[0x10, 0x80]);

    let mut nes = Nes::new(Cartridge::load(&rom).unwrap(), Region::Ntsc, 44_100, 512).unwrap();
    let mut video = NullVideoSink::new();
    let mut audio = NullAudioSink::new();

    let stats = nes.run_frame(&mut video, &mut audio);
    assert_eq!(stats.frames_completed, 1);
    assert_eq!(stats.frame_index, 1);
    assert_eq!(nes.system_bus().read_byte(0x00F0), 1);

    let stats = nes.run_frame(&mut video, &mut audio);
    assert_eq!(stats.frames_completed, 1);
    assert_eq!(nes.system_bus().read_byte(0x00F0), 2);
}

#[test]
fn run_frame_cycle_count_is_stable() {
    let mut nes = nes_with_program(&[0x4C, 0x00, 0x80]);
    let mut video = NullVideoSink::new();
    let mut audio = NullAudioSink::new();

    for _ in 0..5 {
        let stats = nes.run_frame(&mut video, &mut audio);
        assert_eq!(stats.frames_completed, 1);
        assert!(
            (29_770..=29_790).contains(&stats.cpu_cycles),
            "cpu_cycles = {}",
            stats.cpu_cycles
        );
        assert_eq!(stats.ppu_cycles, stats.cpu_cycles * 3);
    }
}

#[test]
fn pal_frames_run_longer() {
    let mut rom = build_rom(1);
    set_prg(&mut rom, 1, 0x8000, &[0x4C, 0x00, 0x80]);
    let mut nes = Nes::new(Cartridge::load(&rom).unwrap(), Region::Pal, 44_100, 512).unwrap();
    let mut video = NullVideoSink::new();
    let mut audio = NullAudioSink::new();

    let stats = nes.run_frame(&mut video, &mut audio);
    assert_eq!(stats.frames_completed, 1);
    assert!(
        (35_450..=35_480).contains(&stats.cpu_cycles),
        "cpu_cycles = {}",
        stats.cpu_cycles
    );
}

#[test]
fn controller_strobe_shifts_out_button_state() {
    let mut nes = nes_with_program(&[
        0xA9, 0x01, // LDA #$01
        0x8D, 0x16, 0x40, // STA $4016 (strobe high)
        0xA9, 0x00, // LDA #$00
        0x8D, 0x16, 0x40, // STA $4016 (latch)
        0xAD, 0x16, 0x40, 0x85, 0x10, // LDA $4016; STA $10
        0xAD, 0x16, 0x40, 0x85, 0x11, // ...
        0xAD, 0x16, 0x40, 0x85, 0x12, //
        0xAD, 0x16, 0x40, 0x85, 0x13, //
        0xAD, 0x16, 0x40, 0x85, 0x14, //
        0xAD, 0x16, 0x40, 0x85, 0x15, //
        0xAD, 0x16, 0x40, 0x85, 0x16, //
        0xAD, 0x16, 0x40, 0x85, 0x17, //
        0x4C, 0x32, 0x80, // spin
    ]);
    nes.set_button(0, Button::Start, true);

    let mut video = NullVideoSink::new();
    let mut audio = NullAudioSink::new();
    for _ in 0..24 {
        nes.step(&mut video, &mut audio);
    }

    let mut bus = nes.system_bus();
    let bits: Vec<u8> = (0..8).map(|i| bus.read_byte(0x0010 + i) & 0x01).collect();
    assert_eq!(bits, vec![0, 0, 0, 1, 0, 0, 0, 0]);
}

#[test]
fn apu_length_counter_tracks_half_frame_steps() {
    let mut nes = nes_with_program(&[0x4C, 0x00, 0x80]);
    {
        let mut bus = nes.system_bus();
        bus.write_byte(0x4015, 0xFF); // enable all channels
        bus.write_byte(0x4000, 0x10); // pulse 1: constant volume, no halt
        bus.write_byte(0x4003, 0x00); // load length counter (10)
    }

    let mut video = NullVideoSink::new();
    let mut audio = NullAudioSink::new();

    // The 4-step sequencer period (29830 cycles) slightly exceeds one frame
    // (29780), so the first frame sees one half-frame step and the steady
    // state is two per frame.
    nes.run_frame(&mut video, &mut audio);
    assert_eq!(nes.apu.get_state().pulse_1.length_counter.count(), 9);

    nes.run_frame(&mut video, &mut audio);
    assert_eq!(nes.apu.get_state().pulse_1.length_counter.count(), 7);
}

#[test]
fn illegal_opcodes_count_in_frame_stats() {
    // 0x02 is not implemented; it should behave as a two-cycle NOP.
    let mut nes = nes_with_program(&[0x02, 0x4C, 0x00, 0x80]);
    let mut video = NullVideoSink::new();
    let mut audio = NullAudioSink::new();

    let stats = nes.run_frame(&mut video, &mut audio);
    assert_eq!(stats.frames_completed, 1);
    assert!(stats.illegal_opcodes > 0);
}

#[test]
fn audio_batches_have_requested_size() {
    let mut nes = nes_with_program(&[0x4C, 0x00, 0x80]);
    let mut video = NullVideoSink::new();
    let mut audio = AudioBufferSink::new();

    nes.run_frame(&mut video, &mut audio);
    // One NTSC frame at 44.1kHz is ~735 samples; with a batch size of 512
    // exactly one batch should have been delivered.
    assert_eq!(audio.samples().len(), 512);

    nes.run_frame(&mut video, &mut audio);
    assert_eq!(audio.samples().len(), 1024);
}

#[test]
fn load_rom_failure_keeps_previous_cartridge() {
    let mut nes = nes_with_program(&[0x4C, 0x00, 0x80]);

    assert!(matches!(nes.load_rom(&[0u8; 4]), Err(LoadError::Truncated)));

    let mut bad_magic = build_rom(1);
    bad_magic[0] = b'X';
    assert!(matches!(nes.load_rom(&bad_magic), Err(LoadError::BadMagic)));

    let mut bad_mapper = build_rom(1);
    bad_mapper[6] = 7 << 4;
    assert!(matches!(
        nes.load_rom(&bad_mapper),
        Err(LoadError::UnsupportedMapper(7))
    ));

    // The original program is still mapped.
    assert_eq!(nes.system_bus().read_byte(0x8000), 0x4C);
}

#[test]
fn load_rom_replaces_cartridge_and_cold_resets() {
    let mut nes = nes_with_program(&[0x4C, 0x00, 0x80]);
    let mut video = NullVideoSink::new();
    let mut audio = NullAudioSink::new();
    nes.run_frame(&mut video, &mut audio);
    assert_eq!(nes.frame(), 1);

    let mut rom = build_rom(1);
    set_prg(&mut rom, 1, 0x8000, &[0xEA]);
    set_prg(&mut rom, 1, 0xFFFC, &[0x40, 0x80]);
    nes.load_rom(&rom).unwrap();

    assert_eq!(nes.frame(), 0);
    assert_eq!(nes.cpu.regs().pc, 0x8040);
}

#[test]
fn save_state_round_trip_is_observably_identical() {
    // Batch size 1 so the audio stream comparison is independent of batch
    // alignment (pending unbatched samples are not part of save states).
    let mut rom = build_rom(1);
    set_prg(&mut rom, 1, 0x8000, &[0xE6, 0x20, 0x4C, 0x00, 0x80]); // INC $20; spin
    let mut nes = Nes::new(Cartridge::load(&rom).unwrap(), Region::Ntsc, 44_100, 1).unwrap();
    let mut video = VideoFrameSink::new();
    let mut audio = AudioBufferSink::new();

    for _ in 0..3 {
        nes.run_frame(&mut video, &mut audio);
    }

    let state = serialize::get_state(&nes);

    let stats_a = nes.run_frame(&mut video, &mut audio);
    let frame_a = video.frame().to_vec();
    let audio_a = audio.drain();
    let cpu_a = nes.cpu.get_state();

    serialize::apply_state(&mut nes, &state).unwrap();

    let stats_b = nes.run_frame(&mut video, &mut audio);
    let frame_b = video.frame().to_vec();
    let audio_b = audio.drain();
    let cpu_b = nes.cpu.get_state();

    assert_eq!(stats_a.cpu_cycles, stats_b.cpu_cycles);
    assert_eq!(frame_a, frame_b);
    assert_eq!(audio_a, audio_b);
    assert_eq!(cpu_a.regs.pc, cpu_b.regs.pc);
    assert_eq!(cpu_a.cycles, cpu_b.cycles);
}

#[test]
fn save_state_survives_json_round_trip() {
    let mut nes = nes_with_program(&[0x4C, 0x00, 0x80]);
    let mut video = NullVideoSink::new();
    let mut audio = NullAudioSink::new();
    nes.run_frame(&mut video, &mut audio);

    let json = serde_json::to_string(&serialize::get_state(&nes)).unwrap();
    let state: serialize::VersionedState = serde_json::from_str(&json).unwrap();
    serialize::apply_state(&mut nes, &state).unwrap();
}

#[test]
fn region_mismatch_is_rejected_without_touching_state() {
    let mut rom = build_rom(1);
    set_prg(&mut rom, 1, 0x8000, &[0x4C, 0x00, 0x80]);

    let mut ntsc = Nes::new(
        Cartridge::load(&rom).unwrap(),
        Region::Ntsc,
        44_100,
        512,
    )
    .unwrap();
    let mut pal = Nes::new(Cartridge::load(&rom).unwrap(), Region::Pal, 44_100, 512).unwrap();

    let mut video = NullVideoSink::new();
    let mut audio = NullAudioSink::new();
    let stats = ntsc.run_frame(&mut video, &mut audio);
    assert_eq!(stats.frames_completed, 1);

    let state = ntsc.get_state();
    let frame_before = pal.frame();
    assert_eq!(pal.apply_state(&state), Err(StateError::RegionMismatch));
    assert_eq!(pal.frame(), frame_before);
}

#[test]
fn ram_and_ppu_register_mirrors_hold_through_the_bus() {
    let mut nes = nes_with_program(&[0x4C, 0x00, 0x80]);
    let mut bus = nes.system_bus();

    bus.write_byte(0x0000, 0x5A);
    for addr in [0x0800u16, 0x1000, 0x1800] {
        assert_eq!(bus.read_byte(addr), 0x5A);
    }

    // OAMADDR through a mirror, visible through another mirror.
    bus.write_byte(0x2003, 0x30);
    bus.write_byte(0x2004, 0x99);
    bus.write_byte(0x3FEB, 0x30); // 0x3FEB & 7 == 3 -> OAMADDR
    assert_eq!(bus.read_byte(0x3FEC), 0x99); // 0x3FEC & 7 == 4 -> OAMDATA
}
