use crate::mapper::Mapper;
use crate::memory::Memory;
use crate::nes::Region;

use serde_derive::{Deserialize, Serialize};

static DUTY_CYCLE_TABLE: &[[u8; 8]] = &[
    [0, 1, 0, 0, 0, 0, 0, 0],
    [0, 1, 1, 0, 0, 0, 0, 0],
    [0, 1, 1, 1, 1, 0, 0, 0],
    [1, 0, 0, 1, 1, 1, 1, 1],
];

#[rustfmt::skip]
static LENGTH_TABLE: &[u8] = &[
    10, 254, 20,  2, 40,  4, 80,  6, 160,  8, 60, 10, 14, 12, 26, 14,
    12,  16, 24, 18, 48, 20, 96, 22, 192, 24, 72, 26, 16, 28, 32, 30,
];

#[rustfmt::skip]
static TRIANGLE_TABLE: &[u8] = &[
    15, 14, 13, 12, 11, 10,  9,  8,  7,  6,  5,  4,  3,  2,  1,  0,
     0,  1,  2,  3,  4,  5,  6,  7,  8,  9, 10, 11, 12, 13, 14, 15,
];

// Noise timer periods in APU cycles; the timer is clocked every second
// CPU cycle, like the pulse timers.
static NOISE_TABLE: &[u16] = &[
    4, 8, 16, 32, 64, 96, 128, 160, 202, 254, 380, 508, 762, 1016, 2034, 4068,
];

// DMC output-bit periods in CPU cycles.
static DMC_TABLE: &[u16] = &[
    428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54,
];

// Frame sequencer step points, in CPU cycles (the half-cycle APU values
// 3728.5 / 7456.5 / 11185.5 / 14914.5 / 18640.5 doubled).
const QUARTER_FRAME_1: u32 = 7457;
const QUARTER_FRAME_2: u32 = 14913;
const QUARTER_FRAME_3: u32 = 22371;
const QUARTER_FRAME_4: u32 = 29829;
const FOUR_STEP_PERIOD: u32 = 29830;
const FIVE_STEP_LAST: u32 = 37281;
const FIVE_STEP_PERIOD: u32 = 37282;

/// Non-linear mixer, pulse group.
fn mix_pulses(pulse_1: u8, pulse_2: u8) -> f64 {
    let sum = (pulse_1 + pulse_2) as f64;
    if sum == 0.0 {
        0.0
    } else {
        95.88 / (8128.0 / sum + 100.0)
    }
}

/// Non-linear mixer, triangle/noise/DMC group.
fn mix_tnd(triangle: u8, noise: u8, dmc: u8) -> f64 {
    let group = triangle as f64 / 8227.0 + noise as f64 / 12241.0 + dmc as f64 / 22638.0;
    if group == 0.0 {
        0.0
    } else {
        159.79 / (1.0 / group + 100.0)
    }
}

pub struct Apu {
    cycles: u64,

    pulse_1: Pulse,
    pulse_2: Pulse,
    triangle: Triangle,
    noise: Noise,
    dmc: Dmc,
    frame_counter: FrameCounter,

    sample_rate: u32,
    cycles_per_sample: f64,
    // Fractional progress toward the next host sample.
    sample_phase: f64,
    // Mixed output pending delivery. Not part of save states.
    samples: Vec<f32>,
}

#[derive(Deserialize, Serialize)]
pub struct State {
    pub cycles: u64,
    pub pulse_1: Pulse,
    pub pulse_2: Pulse,
    pub triangle: Triangle,
    pub noise: Noise,
    pub dmc: Dmc,
    pub frame_counter: FrameCounter,
    pub sample_phase: f64,
}

impl Apu {
    pub fn new(region: Region, sample_rate: u32) -> Apu {
        Apu {
            cycles: 0,
            pulse_1: Pulse::new(SweepNegationType::OnesComplement),
            pulse_2: Pulse::new(SweepNegationType::TwosComplement),
            triangle: Triangle::new(),
            noise: Noise::new(),
            dmc: Dmc::new(),
            frame_counter: FrameCounter::new(),
            sample_rate,
            cycles_per_sample: region.cpu_frequency() as f64 / sample_rate as f64,
            sample_phase: 0.0,
            samples: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn reset(&mut self) {
        self.cycles = 0;
        self.pulse_1 = Pulse::new(SweepNegationType::OnesComplement);
        self.pulse_2 = Pulse::new(SweepNegationType::TwosComplement);
        self.triangle = Triangle::new();
        self.noise = Noise::new();
        self.dmc = Dmc::new();
        self.frame_counter = FrameCounter::new();
        self.sample_phase = 0.0;
        self.samples.clear();
    }

    pub fn get_state(&self) -> State {
        State {
            cycles: self.cycles,
            pulse_1: self.pulse_1.clone(),
            pulse_2: self.pulse_2.clone(),
            triangle: self.triangle.clone(),
            noise: self.noise.clone(),
            dmc: self.dmc.clone(),
            frame_counter: self.frame_counter,
            sample_phase: self.sample_phase,
        }
    }

    pub fn apply_state(&mut self, state: &State) {
        self.cycles = state.cycles;
        self.pulse_1 = state.pulse_1.clone();
        self.pulse_2 = state.pulse_2.clone();
        self.triangle = state.triangle.clone();
        self.noise = state.noise.clone();
        self.dmc = state.dmc.clone();
        self.frame_counter = state.frame_counter;
        self.sample_phase = state.sample_phase;
        self.samples.clear();
    }

    pub fn irq_pending(&self) -> bool {
        self.frame_counter.interrupt_flag || self.dmc.irq_flag
    }

    /// Mixed samples accumulated since the last `clear_samples`.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn clear_samples(&mut self) {
        self.samples.clear();
    }

    /// Runs the APU for the given number of CPU cycles. Returns how many
    /// cycles the CPU must stall for DMC sample fetches performed here.
    pub fn step(&mut self, mapper: &mut dyn Mapper, cycles: u32) -> u32 {
        let mut stall_cycles = 0;

        for _ in 0..cycles {
            self.cycles += 1;

            self.step_frame_counter();

            if self.cycles % 2 == 0 {
                self.pulse_1.step_timer();
                self.pulse_2.step_timer();
                self.noise.step_timer();
            }
            self.triangle.step_timer();
            stall_cycles += self.dmc.step_timer(mapper);

            self.sample_phase += 1.0;
            if self.sample_phase >= self.cycles_per_sample {
                self.sample_phase -= self.cycles_per_sample;
                let sample = self.generate_sample();
                self.samples.push(sample);
            }
        }

        stall_cycles
    }

    fn generate_sample(&self) -> f32 {
        let pulse_out = mix_pulses(self.pulse_1.output(), self.pulse_2.output());
        let tnd_out = mix_tnd(
            self.triangle.output(),
            self.noise.output(),
            self.dmc.output(),
        );

        // The mixer output spans [0, 1]; recenter it to [-1, 1].
        (((pulse_out + tnd_out) * 2.0 - 1.0).clamp(-1.0, 1.0)) as f32
    }

    fn step_frame_counter(&mut self) {
        // Four Step  Five Step    Function
        // ---------  -----------  -----------------------------
        // - - - f    - - - - -    IRQ (if bit 6 is clear)
        // - l - l    l - l - l    Length counter and sweep
        // e e e e    e e e - e    Envelope and linear counter
        self.frame_counter.cycle += 1;

        match self.frame_counter.mode {
            FrameCounterMode::FourStep => {
                match self.frame_counter.cycle {
                    QUARTER_FRAME_1 | QUARTER_FRAME_3 => {
                        self.step_envelope_and_linear_counter();
                    }
                    QUARTER_FRAME_2 => {
                        self.step_envelope_and_linear_counter();
                        self.step_length_counter();
                        self.step_sweep();
                    }
                    QUARTER_FRAME_4 => {
                        self.step_envelope_and_linear_counter();
                        self.step_length_counter();
                        self.step_sweep();
                        if !self.frame_counter.interrupt_inhibit_flag {
                            self.frame_counter.interrupt_flag = true;
                        }
                    }
                    _ => (),
                }
                if self.frame_counter.cycle >= FOUR_STEP_PERIOD {
                    self.frame_counter.cycle = 0;
                }
            }
            FrameCounterMode::FiveStep => {
                match self.frame_counter.cycle {
                    QUARTER_FRAME_1 | QUARTER_FRAME_3 => {
                        self.step_envelope_and_linear_counter();
                    }
                    QUARTER_FRAME_2 | FIVE_STEP_LAST => {
                        self.step_envelope_and_linear_counter();
                        self.step_length_counter();
                        self.step_sweep();
                    }
                    _ => (),
                }
                if self.frame_counter.cycle >= FIVE_STEP_PERIOD {
                    self.frame_counter.cycle = 0;
                }
            }
        }
    }

    fn step_length_counter(&mut self) {
        self.pulse_1.length_counter.step();
        self.pulse_2.length_counter.step();
        self.triangle.length_counter.step();
        self.noise.length_counter.step();
    }

    fn step_sweep(&mut self) {
        self.pulse_1.step_sweep();
        self.pulse_2.step_sweep();
    }

    fn step_envelope_and_linear_counter(&mut self) {
        self.pulse_1.envelope.step();
        self.pulse_2.envelope.step();
        self.triangle.step_linear_counter();
        self.noise.envelope.step();
    }

    fn read_status(&mut self) -> u8 {
        let mut status = 0x00;

        if self.pulse_1.length_counter.count > 0 {
            status |= 0x01;
        }
        if self.pulse_2.length_counter.count > 0 {
            status |= 0x02;
        }
        if self.triangle.length_counter.count > 0 {
            status |= 0x04;
        }
        if self.noise.length_counter.count > 0 {
            status |= 0x08;
        }
        if self.dmc.current_length > 0 {
            status |= 0x10;
        }
        if self.frame_counter.interrupt_flag {
            status |= 0x40;
        }
        if self.dmc.irq_flag {
            status |= 0x80;
        }

        // Reading clears the frame IRQ but not the DMC IRQ.
        self.frame_counter.interrupt_flag = false;

        status
    }

    fn write_status(&mut self, value: u8) {
        self.pulse_1.enabled = (value & 0x01) != 0;
        if !self.pulse_1.enabled {
            self.pulse_1.length_counter.reset();
        }

        self.pulse_2.enabled = (value & 0x02) != 0;
        if !self.pulse_2.enabled {
            self.pulse_2.length_counter.reset();
        }

        self.triangle.enabled = (value & 0x04) != 0;
        if !self.triangle.enabled {
            self.triangle.length_counter.reset();
        }

        self.noise.enabled = (value & 0x08) != 0;
        if !self.noise.enabled {
            self.noise.length_counter.reset();
        }

        self.dmc.irq_flag = false;
        self.dmc.enabled = (value & 0x10) != 0;
        if !self.dmc.enabled {
            self.dmc.current_length = 0;
        } else if self.dmc.current_length == 0 {
            self.dmc.restart();
        }
    }

    fn write_frame_counter(&mut self, value: u8) {
        self.frame_counter.mode = if value & 0x80 == 0 {
            FrameCounterMode::FourStep
        } else {
            FrameCounterMode::FiveStep
        };
        self.frame_counter.cycle = 0;

        self.frame_counter.interrupt_inhibit_flag = value & 0x40 != 0;
        if self.frame_counter.interrupt_inhibit_flag {
            self.frame_counter.interrupt_flag = false;
        }

        // Selecting five-step mode clocks the sequencer units immediately.
        if self.frame_counter.mode == FrameCounterMode::FiveStep {
            self.step_envelope_and_linear_counter();
            self.step_length_counter();
            self.step_sweep();
        }
    }
}

impl Memory for Apu {
    fn read_byte(&mut self, address: u16) -> u8 {
        if address == 0x4015 {
            self.read_status()
        } else {
            0
        }
    }

    fn write_byte(&mut self, address: u16, value: u8) {
        match address {
            0x4000 => self.pulse_1.write_control(value),
            0x4001 => self.pulse_1.write_sweep(value),
            0x4002 => self.pulse_1.write_timer_lo(value),
            0x4003 => self.pulse_1.write_timer_hi(value),
            0x4004 => self.pulse_2.write_control(value),
            0x4005 => self.pulse_2.write_sweep(value),
            0x4006 => self.pulse_2.write_timer_lo(value),
            0x4007 => self.pulse_2.write_timer_hi(value),
            0x4008 => self.triangle.write_linear_counter(value),
            0x400A => self.triangle.write_timer_lo(value),
            0x400B => self.triangle.write_length_counter_and_timer_hi(value),
            0x400C => self.noise.write_control(value),
            0x400E => self.noise.write_mode_and_timer_period(value),
            0x400F => self.noise.write_length_counter_and_envelope_restart(value),
            0x4010 => self.dmc.write_control(value),
            0x4011 => self.dmc.write_value(value),
            0x4012 => self.dmc.write_sample_address(value),
            0x4013 => self.dmc.write_sample_length(value),
            0x4015 => self.write_status(value),
            0x4017 => self.write_frame_counter(value),
            _ => (),
        }
    }
}

#[derive(Copy, Clone, Deserialize, Serialize)]
enum SweepNegationType {
    OnesComplement,
    TwosComplement,
}

#[derive(Copy, Clone, Deserialize, Serialize)]
struct Envelope {
    enabled: bool,
    start: bool,
    loop_flag: bool,
    volume: u8,
    value: u8,
    period: u8,
}

impl Envelope {
    fn new() -> Envelope {
        Envelope {
            enabled: false,
            start: false,
            loop_flag: false,
            volume: 0,
            value: 0,
            period: 0,
        }
    }

    fn step(&mut self) {
        if self.start {
            self.start = false;
            self.volume = 15;
            self.value = self.period;
        } else if self.value > 0 {
            self.value -= 1;
        } else {
            self.value = self.period;

            if self.volume > 0 {
                self.volume -= 1;
            } else if self.loop_flag {
                self.volume = 15;
            }
        }
    }
}

#[derive(Copy, Clone, Deserialize, Serialize)]
struct Sweep {
    enabled: bool,
    negate: bool,
    reload: bool,
    divider: u8,
    period: u8,
    shift_count: u8,
}

impl Sweep {
    fn new() -> Sweep {
        Sweep {
            enabled: false,
            negate: false,
            reload: false,
            divider: 0,
            period: 0,
            shift_count: 0,
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct LengthCounter {
    enabled: bool,
    count: u8,
}

impl LengthCounter {
    fn new() -> LengthCounter {
        LengthCounter {
            enabled: true,
            count: 0,
        }
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    fn step(&mut self) {
        if self.enabled && self.count > 0 {
            self.count -= 1;
        }
    }

    fn set(&mut self, value: u8) {
        self.count = LENGTH_TABLE[value as usize];
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct Pulse {
    enabled: bool,
    negation_type: SweepNegationType,
    timer_value: u16,
    timer_period: u16,
    duty_mode: u8,
    duty_cycle: u8,
    pub length_counter: LengthCounter,
    envelope: Envelope,
    sweep: Sweep,
    constant_volume: u8,
}

impl Pulse {
    fn new(negation_type: SweepNegationType) -> Pulse {
        Pulse {
            enabled: false,
            negation_type,
            timer_value: 0,
            timer_period: 0,
            duty_mode: 0,
            duty_cycle: 0,
            length_counter: LengthCounter::new(),
            envelope: Envelope::new(),
            sweep: Sweep::new(),
            constant_volume: 0,
        }
    }

    fn write_control(&mut self, value: u8) {
        self.duty_mode = value >> 6;
        self.length_counter.enabled = (value & 0x20) == 0;
        self.envelope.loop_flag = !self.length_counter.enabled;
        self.envelope.enabled = (value & 0x10) == 0;
        self.constant_volume = value & 0x0F;
        self.envelope.period = self.constant_volume;
        self.envelope.start = true;
    }

    fn write_sweep(&mut self, value: u8) {
        self.sweep.enabled = (value & 0x80) != 0;
        self.sweep.period = ((value >> 4) & 0x07) + 1;
        self.sweep.negate = (value & 0x08) != 0;
        self.sweep.shift_count = value & 0x07;
        self.sweep.reload = true;
    }

    fn write_timer_lo(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0xFF00) | (value as u16);
    }

    fn write_timer_hi(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0x00FF) | (((value & 0x07) as u16) << 8);
        if self.enabled {
            self.length_counter.set(value >> 3);
        }
        self.envelope.start = true;
        self.duty_cycle = 0;
    }

    fn step_sweep(&mut self) {
        if self.sweep.reload {
            if self.sweep.enabled && self.sweep.divider == 0 {
                self.sweep_timer_period();
            }
            self.sweep.divider = self.sweep.period;
            self.sweep.reload = false;
        } else if self.sweep.divider > 0 {
            self.sweep.divider -= 1;
        } else {
            if self.sweep.enabled {
                self.sweep_timer_period();
            }
            self.sweep.divider = self.sweep.period;
        }
    }

    fn sweep_timer_period(&mut self) {
        if self.sweep.shift_count == 0 {
            return;
        }
        let delta = self.timer_period >> self.sweep.shift_count;
        if self.sweep.negate {
            // Pulse 1 negates with ones' complement, pulse 2 with two's.
            let delta = match self.negation_type {
                SweepNegationType::OnesComplement => delta + 1,
                SweepNegationType::TwosComplement => delta,
            };
            self.timer_period = self.timer_period.saturating_sub(delta);
        } else {
            self.timer_period += delta;
        }
    }

    fn step_timer(&mut self) {
        if self.timer_value == 0 {
            self.timer_value = self.timer_period;
            self.duty_cycle = (self.duty_cycle + 1) % 8;
        } else {
            self.timer_value -= 1;
        }
    }

    fn output(&self) -> u8 {
        if !self.enabled
            || self.length_counter.count == 0
            || DUTY_CYCLE_TABLE[self.duty_mode as usize][self.duty_cycle as usize] == 0
            || self.timer_period < 8
            || self.timer_period > 0x7FF
        {
            0
        } else if self.envelope.enabled {
            self.envelope.volume
        } else {
            self.constant_volume
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
struct LinearCounter {
    period: u8,
    count: u8,
    reload: bool,
}

impl LinearCounter {
    fn new() -> LinearCounter {
        LinearCounter {
            period: 0,
            count: 0,
            reload: false,
        }
    }

    fn step(&mut self, length_counter_enabled: bool) {
        if self.reload {
            self.count = self.period;
        } else if self.count != 0 {
            self.count -= 1;
        }

        if length_counter_enabled {
            self.reload = false;
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct Triangle {
    enabled: bool,
    timer_value: u16,
    timer_period: u16,
    pub length_counter: LengthCounter,
    linear_counter: LinearCounter,
    sequence_step: u8,
}

impl Triangle {
    fn new() -> Triangle {
        Triangle {
            enabled: false,
            timer_value: 0,
            timer_period: 0,
            length_counter: LengthCounter::new(),
            linear_counter: LinearCounter::new(),
            sequence_step: 0,
        }
    }

    fn write_linear_counter(&mut self, value: u8) {
        self.length_counter.enabled = value & 0x80 == 0;
        self.linear_counter.period = value & 0x7F;
    }

    fn write_timer_lo(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0xFF00) | (value as u16);
    }

    fn write_length_counter_and_timer_hi(&mut self, value: u8) {
        if self.enabled {
            self.length_counter.set(value >> 3);
        }
        self.timer_period = (self.timer_period & 0x00FF) | (((value & 0x07) as u16) << 8);
        self.timer_value = self.timer_period;
        self.linear_counter.reload = true;
    }

    fn step_timer(&mut self) {
        if self.timer_value == 0 {
            self.timer_value = self.timer_period;
            // The sequencer only advances while both gates are open.
            if self.length_counter.count > 0 && self.linear_counter.count > 0 {
                self.sequence_step = (self.sequence_step + 1) % 32;
            }
        } else {
            self.timer_value -= 1;
        }
    }

    fn step_linear_counter(&mut self) {
        self.linear_counter.step(self.length_counter.enabled);
    }

    fn output(&self) -> u8 {
        TRIANGLE_TABLE[self.sequence_step as usize]
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct Noise {
    enabled: bool,
    mode: bool,
    shift_register: u16,
    timer_value: u16,
    timer_period: u16,
    pub length_counter: LengthCounter,
    envelope: Envelope,
    constant_volume: u8,
}

impl Noise {
    fn new() -> Noise {
        Noise {
            enabled: false,
            mode: false,
            shift_register: 1,
            timer_value: 0,
            timer_period: 0,
            length_counter: LengthCounter::new(),
            envelope: Envelope::new(),
            constant_volume: 0,
        }
    }

    fn write_control(&mut self, value: u8) {
        self.length_counter.enabled = (value & 0x20) == 0;
        self.envelope.loop_flag = !self.length_counter.enabled;
        self.envelope.enabled = (value & 0x10) == 0;
        self.constant_volume = value & 0x0F;
        self.envelope.period = self.constant_volume;
        self.envelope.start = true;
    }

    fn write_mode_and_timer_period(&mut self, value: u8) {
        self.mode = (value & 0x80) != 0;
        self.timer_period = NOISE_TABLE[(value & 0x0F) as usize];
    }

    fn write_length_counter_and_envelope_restart(&mut self, value: u8) {
        if self.enabled {
            self.length_counter.set(value >> 3);
        }
        self.envelope.start = true;
    }

    fn step_timer(&mut self) {
        if self.timer_value == 0 {
            self.timer_value = self.timer_period;
            let shift = if self.mode { 6 } else { 1 };
            let b1 = self.shift_register & 0x0001;
            let b2 = (self.shift_register >> shift) & 0x0001;
            self.shift_register >>= 1;
            self.shift_register |= (b1 ^ b2) << 14;
        } else {
            self.timer_value -= 1;
        }
    }

    fn output(&self) -> u8 {
        if !self.enabled || self.length_counter.count == 0 || self.shift_register & 0x0001 == 1 {
            0
        } else if self.envelope.enabled {
            self.envelope.volume
        } else {
            self.constant_volume
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct Dmc {
    enabled: bool,
    loop_flag: bool,
    irq_enabled: bool,
    irq_flag: bool,
    value: u8,
    sample_address: u16,
    sample_length: u16,
    current_address: u16,
    current_length: u16,
    shift_register: u8,
    bit_count: u8,
    tick_period: u16,
    tick_value: u16,
}

impl Dmc {
    fn new() -> Dmc {
        Dmc {
            enabled: false,
            loop_flag: false,
            irq_enabled: false,
            irq_flag: false,
            value: 0,
            sample_address: 0,
            sample_length: 0,
            current_address: 0,
            current_length: 0,
            shift_register: 0,
            bit_count: 0,
            tick_period: 0,
            tick_value: 0,
        }
    }

    fn write_control(&mut self, value: u8) {
        self.irq_enabled = value & 0x80 != 0;
        if !self.irq_enabled {
            self.irq_flag = false;
        }
        self.loop_flag = value & 0x40 != 0;
        self.tick_period = DMC_TABLE[(value & 0x0F) as usize];
    }

    fn write_value(&mut self, value: u8) {
        self.value = value & 0x7F;
    }

    fn write_sample_address(&mut self, value: u8) {
        self.sample_address = 0xC000 | ((value as u16) << 6);
    }

    fn write_sample_length(&mut self, value: u8) {
        self.sample_length = ((value as u16) << 4) | 0x0001;
    }

    fn restart(&mut self) {
        self.current_address = self.sample_address;
        self.current_length = self.sample_length;
    }

    /// Returns CPU stall cycles when a sample byte had to be fetched.
    fn step_timer(&mut self, mapper: &mut dyn Mapper) -> u32 {
        if !self.enabled {
            return 0;
        }

        let stall_cycles = self.step_reader(mapper);
        if self.tick_value == 0 {
            self.tick_value = self.tick_period.saturating_sub(1);
            self.step_shifter();
        } else {
            self.tick_value -= 1;
        }

        stall_cycles
    }

    fn step_reader(&mut self, mapper: &mut dyn Mapper) -> u32 {
        if self.current_length == 0 || self.bit_count != 0 {
            return 0;
        }

        self.shift_register = mapper.prg_read_byte(self.current_address);
        self.bit_count = 8;
        self.current_address = self.current_address.wrapping_add(1);
        if self.current_address == 0 {
            self.current_address = 0x8000;
        }
        self.current_length -= 1;
        if self.current_length == 0 {
            if self.loop_flag {
                self.restart();
            } else if self.irq_enabled {
                self.irq_flag = true;
            }
        }

        // Each sample fetch steals the bus from the CPU.
        4
    }

    fn step_shifter(&mut self) {
        if self.bit_count == 0 {
            return;
        }

        if self.shift_register & 0x01 != 0 {
            if self.value <= 125 {
                self.value += 2;
            }
        } else if self.value >= 2 {
            self.value -= 2;
        }

        self.shift_register >>= 1;
        self.bit_count -= 1;
    }

    fn output(&self) -> u8 {
        self.value
    }
}

#[derive(Eq, PartialEq, Clone, Copy, Deserialize, Serialize)]
enum FrameCounterMode {
    FourStep,
    FiveStep,
}

#[derive(Clone, Copy, Deserialize, Serialize)]
pub struct FrameCounter {
    cycle: u32,
    mode: FrameCounterMode,
    interrupt_flag: bool,
    interrupt_inhibit_flag: bool,
}

impl FrameCounter {
    fn new() -> FrameCounter {
        FrameCounter {
            cycle: 0,
            mode: FrameCounterMode::FourStep,
            interrupt_flag: false,
            interrupt_inhibit_flag: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Cartridge;
    use crate::mapper::create_mapper;

    fn test_mapper() -> Box<dyn Mapper> {
        let mut rom = vec![0u8; 16 + 2 * 16 * 1024 + 8 * 1024];
        rom[0..4].copy_from_slice(b"NES\x1a");
        rom[4] = 2;
        rom[5] = 1;
        create_mapper(Cartridge::load(&rom).unwrap()).unwrap()
    }

    fn run_cycles(apu: &mut Apu, mapper: &mut Box<dyn Mapper>, cycles: u32) -> u32 {
        apu.step(mapper.as_mut(), cycles)
    }

    #[test]
    fn length_counter_decrements_twice_per_sequencer_pass() {
        let mut mapper = test_mapper();
        let mut apu = Apu::new(Region::Ntsc, 44_100);

        apu.write_byte(0x4015, 0xFF); // enable all channels
        apu.write_byte(0x4000, 0x10); // constant volume, length counting on
        apu.write_byte(0x4003, 0x00); // load length counter with 10

        let loaded = apu.pulse_1.length_counter.count();
        assert_eq!(loaded, 10);

        // Half-frame steps land at 14913 and 29829 CPU cycles.
        run_cycles(&mut apu, &mut mapper, FOUR_STEP_PERIOD);
        assert_eq!(apu.pulse_1.length_counter.count(), loaded - 2);
    }

    #[test]
    fn length_counter_halt_stops_decrement() {
        let mut mapper = test_mapper();
        let mut apu = Apu::new(Region::Ntsc, 44_100);

        apu.write_byte(0x4015, 0x01);
        apu.write_byte(0x4000, 0x30); // halt flag set
        apu.write_byte(0x4003, 0x00);

        run_cycles(&mut apu, &mut mapper, Region::Ntsc.cycles_per_frame());
        assert_eq!(apu.pulse_1.length_counter.count(), 10);
    }

    #[test]
    fn frame_irq_raised_in_four_step_mode() {
        let mut mapper = test_mapper();
        let mut apu = Apu::new(Region::Ntsc, 44_100);

        run_cycles(&mut apu, &mut mapper, QUARTER_FRAME_4 + 1);
        assert!(apu.irq_pending());

        // Reading 0x4015 acknowledges the frame IRQ.
        let status = apu.read_byte(0x4015);
        assert_ne!(status & 0x40, 0);
        assert!(!apu.irq_pending());
    }

    #[test]
    fn five_step_mode_never_raises_frame_irq() {
        let mut mapper = test_mapper();
        let mut apu = Apu::new(Region::Ntsc, 44_100);

        apu.write_byte(0x4017, 0x80);
        run_cycles(&mut apu, &mut mapper, FIVE_STEP_PERIOD + 10);
        assert!(!apu.irq_pending());
    }

    #[test]
    fn irq_inhibit_clears_pending_frame_irq() {
        let mut mapper = test_mapper();
        let mut apu = Apu::new(Region::Ntsc, 44_100);

        run_cycles(&mut apu, &mut mapper, QUARTER_FRAME_4 + 1);
        assert!(apu.irq_pending());
        apu.write_byte(0x4017, 0x40);
        assert!(!apu.irq_pending());
    }

    #[test]
    fn sample_rate_paces_output() {
        let mut mapper = test_mapper();
        let mut apu = Apu::new(Region::Ntsc, 44_100);

        run_cycles(&mut apu, &mut mapper, Region::Ntsc.cycles_per_frame());
        // One NTSC frame at 44.1kHz is ~735 samples.
        let count = apu.samples().len();
        assert!((730..=740).contains(&count), "{} samples", count);
    }

    #[test]
    fn dmc_fetch_stalls_cpu() {
        let mut mapper = test_mapper();
        let mut apu = Apu::new(Region::Ntsc, 44_100);

        apu.write_byte(0x4012, 0x00); // sample address 0xC000
        apu.write_byte(0x4013, 0x00); // length 1
        apu.write_byte(0x4015, 0x10); // enable DMC

        let stall = run_cycles(&mut apu, &mut mapper, 1);
        assert_eq!(stall, 4);
    }

    #[test]
    fn mixer_is_silent_with_no_input() {
        assert_eq!(mix_pulses(0, 0), 0.0);
        assert_eq!(mix_tnd(0, 0, 0), 0.0);
    }

    #[test]
    fn samples_are_scaled_to_unit_range() {
        let mut mapper = test_mapper();
        let mut apu = Apu::new(Region::Ntsc, 44_100);

        // Silent channels sit at the bottom of the [-1, 1] output range.
        run_cycles(&mut apu, &mut mapper, 200);
        assert!(!apu.samples().is_empty());
        assert!(apu.samples().iter().all(|&sample| sample == -1.0));

        // Full-scale input lands at the top, within clamping tolerance.
        let max = ((mix_pulses(15, 15) + mix_tnd(15, 15, 127)) * 2.0 - 1.0).clamp(-1.0, 1.0);
        assert!(max > 0.99 && max <= 1.0);
    }
}
