use ferricnes_core::cartridge::Cartridge;
use ferricnes_core::nes::{Nes, Region};
use ferricnes_core::ppu::{SCREEN_HEIGHT, SCREEN_WIDTH};
use ferricnes_core::serialize;
use ferricnes_core::sink::{AudioBufferSink, AudioSink, VideoFrameSink};

use clap::Parser;
use tracing::{debug, error, info};

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

mod logger;

#[derive(Debug, Parser)]
#[command(name = "ferricnes", about = "A headless frontend to the FerricNES emulator core")]
struct Opt {
    /// The iNES ROM to load
    #[arg(value_name = "ROM")]
    rom_path: PathBuf,

    /// Number of frames to run
    #[arg(short = 'n', long, default_value_t = 60)]
    frames: u64,

    /// Console region
    #[arg(long, value_enum, default_value = "ntsc")]
    region: RegionArg,

    /// Audio sample rate in Hz
    #[arg(long, default_value_t = 44_100)]
    sample_rate: u32,

    /// Samples per batch delivered to the audio sink
    #[arg(long, default_value_t = 1024)]
    audio_batch: usize,

    /// Write the final frame to a binary PPM file
    #[arg(long)]
    dump_frame: Option<PathBuf>,

    /// Load a JSON save state before running
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// Write a JSON save state after running
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Silence all log output
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging mode (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
enum RegionArg {
    Ntsc,
    Pal,
}

impl From<RegionArg> for Region {
    fn from(region: RegionArg) -> Region {
        match region {
            RegionArg::Ntsc => Region::Ntsc,
            RegionArg::Pal => Region::Pal,
        }
    }
}

fn main() {
    let opt = Opt::parse();

    if !opt.quiet {
        logger::initialize(opt.verbose);
    }

    if let Err(e) = run(&opt) {
        error!("error: {}", e);
        process::exit(1);
    }
}

fn run(opt: &Opt) -> Result<(), Box<dyn Error>> {
    let bytes = fs::read(&opt.rom_path)?;
    let cartridge = Cartridge::load(&bytes)?;
    info!("{:?}", cartridge);

    let mut nes = Nes::new(
        cartridge,
        opt.region.into(),
        opt.sample_rate,
        opt.audio_batch,
    )?;

    if let Some(path) = &opt.load_state {
        let state: serialize::VersionedState = serde_json::from_str(&fs::read_to_string(path)?)?;
        serialize::apply_state(&mut nes, &state)?;
        info!("loaded save state from {}", path.display());
    }

    let mut video_sink = VideoFrameSink::new();
    let mut audio_sink = AudioBufferSink::new();

    let mut cpu_cycles = 0u64;
    let mut illegal_opcodes = 0u64;
    for _ in 0..opt.frames {
        let stats = nes.run_frame(&mut video_sink, &mut audio_sink);
        cpu_cycles += stats.cpu_cycles as u64;
        illegal_opcodes += stats.illegal_opcodes;
        debug!(
            "frame {}: {} CPU cycles",
            stats.frame_index, stats.cpu_cycles
        );
    }

    info!(
        "ran {} frames: {} CPU cycles, {} audio samples",
        opt.frames,
        cpu_cycles,
        audio_sink.samples_written()
    );
    if illegal_opcodes > 0 {
        info!("encountered {} illegal opcodes", illegal_opcodes);
    }

    if let Some(path) = &opt.dump_frame {
        write_ppm(path, video_sink.frame())?;
        info!("wrote frame to {}", path.display());
    }

    if let Some(path) = &opt.save_state {
        let json = serde_json::to_string(&serialize::get_state(&nes))?;
        fs::write(path, json)?;
        info!("wrote save state to {}", path.display());
    }

    Ok(())
}

// RGBA framebuffer to binary PPM (no alpha).
fn write_ppm(path: &Path, frame: &[u32]) -> std::io::Result<()> {
    let mut out = Vec::with_capacity(32 + frame.len() * 3);
    out.extend_from_slice(format!("P6\n{} {}\n255\n", SCREEN_WIDTH, SCREEN_HEIGHT).as_bytes());
    for pixel in frame {
        out.push(*pixel as u8);
        out.push((*pixel >> 8) as u8);
        out.push((*pixel >> 16) as u8);
    }
    fs::write(path, out)
}
