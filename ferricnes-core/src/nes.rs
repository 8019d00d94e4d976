use crate::apu::{self, Apu};
use crate::cartridge::{Cartridge, LoadError};
use crate::cpu::{self, Cpu};
use crate::input::{self, Button, Input};
use crate::mapper::{self, create_mapper, Mapper};
use crate::memory::Ram;
use crate::ppu::{self, Ppu};
use crate::sink::{AudioSink, VideoSink};
use crate::system_bus::SystemBus;

use serde_derive::{Deserialize, Serialize};

use std::error::Error;
use std::fmt::{self, Display, Formatter};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Region {
    Ntsc,
    Pal,
}

impl Region {
    pub fn cpu_frequency(self) -> u32 {
        match self {
            Region::Ntsc => 1_789_773,
            Region::Pal => 1_662_607,
        }
    }

    pub fn frames_per_second(self) -> f64 {
        match self {
            Region::Ntsc => 60.0,
            Region::Pal => 50.0,
        }
    }

    pub fn scanlines_per_frame(self) -> u16 {
        match self {
            Region::Ntsc => 262,
            Region::Pal => 312,
        }
    }

    /// CPU cycles per frame at 3 PPU dots per CPU cycle.
    pub fn cycles_per_frame(self) -> u32 {
        341 * self.scanlines_per_frame() as u32 / 3
    }

    /// NTSC drops the last pre-render dot on odd rendered frames.
    pub fn has_odd_frame_skip(self) -> bool {
        self == Region::Ntsc
    }
}

/// Accounting for one `run_frame` call.
#[derive(Copy, Clone, Debug, Default)]
pub struct FrameStats {
    pub cpu_cycles: u32,
    pub ppu_cycles: u32,
    pub frames_completed: u32,
    pub frame_index: u64,
    pub illegal_opcodes: u64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum StateError {
    IncompatibleMapper,
    RegionMismatch,
}

impl Display for StateError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            StateError::IncompatibleMapper => {
                write!(f, "save state belongs to a different mapper type")
            }
            StateError::RegionMismatch => write!(f, "save state belongs to a different region"),
        }
    }
}

impl Error for StateError {}

pub struct Nes {
    ram: Ram,
    pub mapper: Box<dyn Mapper>,
    pub cpu: Cpu,
    pub ppu: Ppu,
    pub apu: Apu,
    pub input: Input,

    region: Region,
    audio_batch: usize,
    audio_queue: Vec<f32>,
    // Previous level of the PPU NMI line, for edge detection.
    nmi_line: bool,
    frame: u64,
    pub cycles: u64,
    stopped: bool,
}

#[derive(Deserialize, Serialize)]
pub struct State {
    pub region: Region,
    #[serde(with = "serde_bytes")]
    pub ram: Vec<u8>,
    pub mapper: mapper::State,
    pub cpu: cpu::State,
    pub ppu: ppu::State,
    pub apu: apu::State,
    pub input: input::State,
    pub cycles: u64,
    pub frame: u64,
}

impl Nes {
    pub fn new(
        cartridge: Cartridge,
        region: Region,
        sample_rate: u32,
        audio_batch: usize,
    ) -> Result<Nes, LoadError> {
        let mut nes = Nes {
            ram: Ram::new(),
            mapper: create_mapper(cartridge)?,
            cpu: Cpu::new(),
            ppu: Ppu::new(region),
            apu: Apu::new(region, sample_rate),
            input: Input::new(),
            region,
            audio_batch: audio_batch.max(1),
            audio_queue: Vec::new(),
            nmi_line: false,
            frame: 0,
            cycles: 0,
            stopped: false,
        };

        nes.reset();

        Ok(nes)
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Host-visible stop flag; the core itself never blocks.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn stopped(&self) -> bool {
        self.stopped
    }

    pub fn set_button(&mut self, port: usize, button: Button, pressed: bool) {
        self.input.set_button(port, button, pressed);
    }

    /// Replaces the cartridge and cold-resets the machine. On failure the
    /// previous cartridge is retained untouched.
    pub fn load_rom(&mut self, bytes: &[u8]) -> Result<(), LoadError> {
        let cartridge = Cartridge::load(bytes)?;
        let mapper = create_mapper(cartridge)?;

        self.stopped = true;
        self.mapper = mapper;
        self.reset();

        Ok(())
    }

    /// Cold reset: clears RAM and rebuilds the PPU/APU, then resets the CPU
    /// through the freshly reset bus so it reads the reset vector.
    pub fn reset(&mut self) {
        self.ram = Ram::new();
        self.ppu = Ppu::new(self.region);
        self.apu = Apu::new(self.region, self.apu.sample_rate());
        self.input = Input::new();
        self.mapper.reset();
        self.audio_queue.clear();
        self.nmi_line = false;
        self.frame = 0;
        self.cycles = 0;
        self.stopped = false;

        let mut bus = SystemBus::new(
            &mut self.ram,
            &mut self.mapper,
            &mut self.ppu,
            &mut self.apu,
            &mut self.input,
        );
        self.cpu.reset(&mut bus);
    }

    /// Reset-button semantics: registers and sequencers reset, RAM and VRAM
    /// survive.
    pub fn soft_reset(&mut self) {
        self.apu.reset();
        self.ppu.reset();
        self.input.reset();
        self.mapper.reset();
        self.audio_queue.clear();
        self.nmi_line = false;

        let mut bus = SystemBus::new(
            &mut self.ram,
            &mut self.mapper,
            &mut self.ppu,
            &mut self.apu,
            &mut self.input,
        );
        self.cpu.reset(&mut bus);
    }

    /// Runs the machine until one frame has been produced (or a safety cap
    /// of two frames' worth of CPU cycles is hit, in case a program turns
    /// rendering entirely off mid-frame).
    pub fn run_frame<V: VideoSink, A: AudioSink>(
        &mut self,
        video_sink: &mut V,
        audio_sink: &mut A,
    ) -> FrameStats {
        let start_cycles = self.cycles;
        let start_illegal = self.cpu.illegal_opcodes();
        let cycle_cap = 2 * self.region.cycles_per_frame() as u64;

        let mut frames_completed = 0;
        while frames_completed == 0 && self.cycles - start_cycles < cycle_cap {
            frames_completed += self.step_system(audio_sink);
        }

        if frames_completed > 0 {
            video_sink.write_frame(self.ppu.frame_buffer());
        }

        let cpu_cycles = (self.cycles - start_cycles) as u32;
        FrameStats {
            cpu_cycles,
            ppu_cycles: cpu_cycles * 3,
            frames_completed,
            frame_index: self.frame,
            illegal_opcodes: self.cpu.illegal_opcodes() - start_illegal,
        }
    }

    /// Runs a single CPU instruction with the same PPU/APU interleaving as
    /// `run_frame`. Returns the CPU cycles consumed.
    pub fn step<V: VideoSink, A: AudioSink>(
        &mut self,
        video_sink: &mut V,
        audio_sink: &mut A,
    ) -> u32 {
        let start_cycles = self.cycles;
        if self.step_system(audio_sink) > 0 {
            video_sink.write_frame(self.ppu.frame_buffer());
        }
        (self.cycles - start_cycles) as u32
    }

    // One CPU instruction (or DMA stall), three PPU dots per CPU cycle with
    // NMI edge sampling after every dot, APU catch-up, then IRQ resampling.
    // Returns the number of frames completed during the instruction.
    fn step_system<A: AudioSink>(&mut self, audio_sink: &mut A) -> u32 {
        let cpu_cycles = {
            let mut bus = SystemBus::new(
                &mut self.ram,
                &mut self.mapper,
                &mut self.ppu,
                &mut self.apu,
                &mut self.input,
            );
            self.cpu.step(&mut bus)
        };
        self.cycles += cpu_cycles as u64;

        let mut frames_completed = 0;
        for _ in 0..3 * cpu_cycles {
            if self.ppu.tick(self.mapper.as_mut()) {
                frames_completed += 1;
                self.frame += 1;
            }

            let nmi_line = self.ppu.nmi_line();
            if nmi_line && !self.nmi_line {
                self.cpu.nmi();
            }
            self.nmi_line = nmi_line;
        }

        let stall_cycles = self.apu.step(self.mapper.as_mut(), cpu_cycles);
        if stall_cycles > 0 {
            self.cpu.stall(stall_cycles);
        }

        self.pump_audio(audio_sink);

        let irq = self.apu.irq_pending() || self.mapper.irq_pending();
        self.cpu.set_irq_line(irq);

        frames_completed
    }

    fn pump_audio<A: AudioSink>(&mut self, audio_sink: &mut A) {
        self.audio_queue.extend_from_slice(self.apu.samples());
        self.apu.clear_samples();

        while self.audio_queue.len() >= self.audio_batch {
            audio_sink.write_samples(&self.audio_queue[..self.audio_batch]);
            self.audio_queue.drain(..self.audio_batch);
        }
    }

    /// Direct bus access for hosts and tests (debugger peeks and pokes).
    pub fn system_bus(&mut self) -> SystemBus<'_> {
        SystemBus::new(
            &mut self.ram,
            &mut self.mapper,
            &mut self.ppu,
            &mut self.apu,
            &mut self.input,
        )
    }

    pub fn get_state(&self) -> State {
        State {
            region: self.region,
            ram: self.ram.to_vec(),
            mapper: self.mapper.get_state(),
            cpu: self.cpu.get_state(),
            ppu: self.ppu.get_state(),
            apu: self.apu.get_state(),
            input: self.input.get_state(),
            cycles: self.cycles,
            frame: self.frame,
        }
    }

    /// Applies a previously captured state. Nothing is modified when the
    /// state is incompatible with the current machine.
    pub fn apply_state(&mut self, state: &State) -> Result<(), StateError> {
        if state.region != self.region {
            return Err(StateError::RegionMismatch);
        }
        if !self.mapper.apply_state(&state.mapper) {
            return Err(StateError::IncompatibleMapper);
        }

        self.ram.copy_from_slice(&state.ram);
        self.cpu.apply_state(&state.cpu);
        self.ppu.apply_state(&state.ppu);
        self.apu.apply_state(&state.apu);
        self.input.apply_state(&state.input);
        self.cycles = state.cycles;
        self.frame = state.frame;
        self.nmi_line = self.ppu.nmi_line();
        self.audio_queue.clear();

        Ok(())
    }
}
