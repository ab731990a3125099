mod backend;
mod cpu;
#[cfg(test)]
mod cpu_tests;
mod frontend;
mod instructions;
mod loader;

use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use crate::cpu::{load_cpu_config, CPUConfig, SimStats, CPU};
use crate::loader::loader::{load_from_file, ProgramSource};

/// Cycle-accurate simulator of an out-of-order superscalar pipeline
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// instruction trace path
    trace: String,
    /// CPU configuration (YAML); built-in defaults apply when omitted
    #[arg(short = 'c', long)]
    config: Option<String>,
    /// fetch width override
    #[arg(short = 'f', long)]
    frontend_n_wide: Option<u8>,
    /// common data bus width override
    #[arg(short = 'r', long)]
    cdb_n_wide: Option<u8>,
    /// type-0 execution unit count override
    #[arg(long)]
    eu0: Option<u8>,
    /// type-1 execution unit count override
    #[arg(long)]
    eu1: Option<u8>,
    /// type-2 execution unit count override
    #[arg(long)]
    eu2: Option<u8>,
    /// print the running counters every cycle
    #[arg(long)]
    trace_cycle: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut cpu_config = match &args.config {
        Some(path) => load_cpu_config(path)
            .map_err(|err| anyhow!("could not load config `{}`: {}", path, err))?,
        None => CPUConfig::default(),
    };
    if let Some(frontend_n_wide) = args.frontend_n_wide {
        cpu_config.frontend_n_wide = frontend_n_wide;
    }
    if let Some(cdb_n_wide) = args.cdb_n_wide {
        cpu_config.cdb_n_wide = cdb_n_wide;
    }
    if let Some(eu0) = args.eu0 {
        cpu_config.eu0_count = eu0;
    }
    if let Some(eu1) = args.eu1 {
        cpu_config.eu1_count = eu1;
    }
    if let Some(eu2) = args.eu2 {
        cpu_config.eu2_count = eu2;
    }
    if args.trace_cycle {
        cpu_config.trace.cycle = true;
    }

    let program = load_from_file(&args.trace)
        .with_context(|| format!("could not load trace `{}`", &args.trace))?;
    let program = Rc::new(program);

    let mut cpu = CPU::new(&cpu_config, Box::new(ProgramSource::new(&program)));
    let mut stats = SimStats::default();
    cpu.run(&mut stats);
    cpu.complete(&mut stats);

    println!("{}", stats);
    Ok(())
}
