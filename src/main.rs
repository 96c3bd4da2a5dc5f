use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn, LevelFilter};
use simple_logger::SimpleLogger;

use chipvm::config::{Config, DEFAULT_IPS, DEFAULT_SCALE};
use chipvm::disasm::disassemble_file;
use chipvm::{CpalSound, DecodeStrategy, Display, Emulator, MinifbDisplay, Mute, Sound};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Decoder {
    Nibble,
    Table,
}

impl From<Decoder> for DecodeStrategy {
    fn from(decoder: Decoder) -> Self {
        match decoder {
            Decoder::Nibble => DecodeStrategy::Nibble,
            Decoder::Table => DecodeStrategy::Table,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "chipvm", about = "CHIP-8 interpreter and disassembler")]
struct Args {
    /// Program image to load at 0x200.
    rom: PathBuf,

    /// Write a disassembly to `<ROM>.dis.txt` instead of running.
    #[arg(long)]
    diss: bool,

    /// Instructions executed per second.
    #[arg(long, default_value_t = DEFAULT_IPS)]
    ips: u32,

    /// Window scale factor.
    #[arg(long, default_value_t = DEFAULT_SCALE)]
    scale: u32,

    #[arg(long, value_enum, default_value_t = Decoder::Nibble)]
    decoder: Decoder,

    /// Seed for the random number instruction.
    #[arg(long)]
    seed: Option<u64>,

    /// Stop on the first faulting instruction.
    #[arg(long)]
    halt_on_error: bool,

    #[arg(long, conflicts_with = "trace")]
    verbose: bool,

    /// Log every executed instruction.
    #[arg(long)]
    trace: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.trace {
        LevelFilter::Trace
    } else if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new()
        .with_level(level)
        .env()
        .init()?;

    if args.diss {
        let out = disassemble_file(&args.rom, args.decoder.into())
            .with_context(|| format!("disassembling {}", args.rom.display()))?;
        println!("{}", out.display());
        return Ok(());
    }

    let config = Config {
        scale: args.scale,
        instructions_per_second: args.ips,
        decoder: args.decoder.into(),
        seed: args.seed,
        halt_on_error: args.halt_on_error,
        ..Config::default()
    };

    let mut display = MinifbDisplay::new();
    display
        .init(&config.title, config.scale)
        .context("opening window")?;
    let keyboard = display.keyboard();
    let sound: Box<dyn Sound> = match CpalSound::new() {
        Ok(sound) => Box::new(sound),
        Err(e) => {
            warn!("{e}, running without sound");
            Box::new(Mute)
        }
    };

    let mut emu = Emulator::new(display, keyboard, sound, config);
    emu.load_file(&args.rom)
        .with_context(|| format!("loading {}", args.rom.display()))?;
    info!("running {}", args.rom.display());
    emu.run();
    Ok(())
}
