use std::cell::RefCell;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs::File;
use std::rc::Rc;

use serde::Deserialize;

use crate::backend::backend::Backend;
use crate::frontend::frontend::{Frontend, InstrSource};
use crate::instructions::instructions::{InstrTable, Latch};

// Size of the architectural register file visible in the trace.
pub const ARCH_REG_COUNT: u16 = 128;

pub(crate) struct PerfCounters {
    pub fetch_cnt: u64,
    pub dispatch_cnt: u64,
    pub schedule_cnt: u64,
    pub issue_cnt: u64,
    pub retire_cnt: u64,
    pub cycle_cnt: u64,
    // dispatch queue occupancy, sampled once per cycle
    pub instr_queue_sum: f64,
    pub instr_queue_max: u64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            fetch_cnt: 0,
            dispatch_cnt: 0,
            schedule_cnt: 0,
            issue_cnt: 0,
            retire_cnt: 0,
            cycle_cnt: 0,
            instr_queue_sum: 0.0,
            instr_queue_max: 0,
        }
    }
}

/// Per-stage trace switches; every enabled stage prints one line per
/// instruction it handles.
#[derive(Clone, Copy, Deserialize, Debug, Default)]
#[serde(default)]
pub struct Trace {
    pub fetch: bool,
    pub dispatch: bool,
    pub schedule: bool,
    pub issue: bool,
    pub execute: bool,
    pub broadcast: bool,
    pub retire: bool,
    pub cycle: bool,
}

#[derive(Clone, Deserialize, Debug)]
#[serde(default)]
pub struct CPUConfig {
    // the number of instructions fetched from the trace per clock cycle
    pub frontend_n_wide: u8,
    // the number of results the common data bus broadcasts per clock cycle;
    // 0 is treated as 1
    pub cdb_n_wide: u8,
    // the number of type-0 execution units
    pub eu0_count: u8,
    // the number of type-1 execution units
    pub eu1_count: u8,
    // the number of type-2 execution units
    pub eu2_count: u8,
    // if processing of instructions should be traced (printed)
    pub trace: Trace,
}

impl Default for CPUConfig {
    fn default() -> CPUConfig {
        CPUConfig {
            frontend_n_wide: 4,
            cdb_n_wide: 2,
            eu0_count: 2,
            eu1_count: 2,
            eu2_count: 1,
            trace: Trace::default(),
        }
    }
}

impl CPUConfig {
    pub(crate) fn eu_count(&self, eu_type: u8) -> u8 {
        match eu_type {
            0 => self.eu0_count,
            1 => self.eu1_count,
            2 => self.eu2_count,
            _ => unreachable!("unknown execution unit type {}", eu_type),
        }
    }

    pub(crate) fn eu_count_total(&self) -> u16 {
        self.eu0_count as u16 + self.eu1_count as u16 + self.eu2_count as u16
    }

    // the reservation station holds twice as many instructions as there
    // are execution units
    pub(crate) fn rs_capacity(&self) -> u16 {
        2 * self.eu_count_total()
    }
}

pub fn load_cpu_config(file_path: &str) -> Result<CPUConfig, Box<dyn Error>> {
    let file = File::open(file_path)?;
    let config = serde_yaml::from_reader(file)?;
    Ok(config)
}

/// Final statistics of a simulation run. `run` fills the totals,
/// `complete` derives the averages from them.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SimStats {
    pub cycle_count: u64,
    pub retired_count: u64,
    pub avg_inst_issued: f32,
    pub avg_inst_retired: f32,
    pub avg_instr_queue_size: f32,
    pub max_instr_queue_size: u64,
}

impl Display for SimStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cycles:                 {}", self.cycle_count)?;
        writeln!(f, "Retired instructions:   {}", self.retired_count)?;
        writeln!(f, "Avg issued per cycle:   {:.4}", self.avg_inst_issued)?;
        writeln!(f, "Avg retired per cycle:  {:.4}", self.avg_inst_retired)?;
        writeln!(f, "Avg dispatch queue:     {:.4}", self.avg_instr_queue_size)?;
        write!(f, "Max dispatch queue:     {}", self.max_instr_queue_size)
    }
}

/// The simulated core: a fetch frontend feeding an out-of-order backend
/// through a double-buffered latch. Constructing a CPU is the setup step;
/// all state is fresh per instance.
pub struct CPU {
    frontend: Frontend,
    backend: Backend,
    instr_table: Rc<RefCell<InstrTable>>,
    perf_counters: Rc<RefCell<PerfCounters>>,
    trace: Trace,
}

impl CPU {
    pub fn new(cpu_config: &CPUConfig, instr_source: Box<dyn InstrSource>) -> CPU {
        assert!(cpu_config.frontend_n_wide > 0, "CPU: fetch width must be at least 1");
        assert!(cpu_config.eu_count_total() > 0, "CPU: at least one execution unit is required");

        let mut cpu_config = cpu_config.clone();
        if cpu_config.cdb_n_wide == 0 {
            cpu_config.cdb_n_wide = 1;
        }

        let instr_table = Rc::new(RefCell::new(InstrTable::new()));
        let perf_counters = Rc::new(RefCell::new(PerfCounters::new()));
        let fd_latch = Rc::new(RefCell::new(Latch::new()));

        let backend = Backend::new(&cpu_config, &instr_table, &fd_latch, &perf_counters);

        let frontend = Frontend::new(
            &cpu_config,
            instr_source,
            &fd_latch,
            &instr_table,
            &perf_counters,
        );

        CPU {
            frontend,
            backend,
            instr_table,
            perf_counters,
            trace: cpu_config.trace,
        }
    }

    /// Run the simulation until the trace is exhausted and the pipeline
    /// has drained, then record the cycle and retirement totals.
    pub fn run(&mut self, stats: &mut SimStats) {
        let mut cycle: u64 = 0;

        while !(self.frontend.is_done() && self.backend.is_idle()) {
            cycle += 1;
            self.perf_counters.borrow_mut().cycle_cnt += 1;

            if self.trace.cycle {
                let perf_counters = self.perf_counters.borrow();
                println!(
                    "[Cycle:{}][Fetched={}][Dispatched={}][Scheduled={}][Issued={}][Retired={}]",
                    perf_counters.cycle_cnt,
                    perf_counters.fetch_cnt,
                    perf_counters.dispatch_cnt,
                    perf_counters.schedule_cnt,
                    perf_counters.issue_cnt,
                    perf_counters.retire_cnt,
                );
            }

            self.backend.do_cycle(cycle);
            self.frontend.do_cycle(cycle);
            self.backend.advance_latches();
        }

        if self.instr_table.borrow().is_empty() {
            stats.cycle_count = 0;
            stats.retired_count = 0;
            return;
        }

        // the final iteration only performed the last retirement and an
        // empty latch advance, so it does not count
        stats.cycle_count = cycle - 1;
        stats.retired_count = self.perf_counters.borrow().retire_cnt;
    }

    /// Derive the per-cycle averages. Zero cycles means an empty trace;
    /// every derived value stays zero in that case.
    pub fn complete(&self, stats: &mut SimStats) {
        if stats.cycle_count == 0 {
            stats.avg_inst_issued = 0.0;
            stats.avg_inst_retired = 0.0;
            stats.avg_instr_queue_size = 0.0;
            stats.max_instr_queue_size = 0;
            return;
        }

        let perf_counters = self.perf_counters.borrow();
        stats.avg_inst_issued = perf_counters.issue_cnt as f32 / stats.cycle_count as f32;
        stats.avg_inst_retired = stats.retired_count as f32 / stats.cycle_count as f32;
        stats.avg_instr_queue_size =
            (perf_counters.instr_queue_sum / stats.cycle_count as f64) as f32;
        stats.max_instr_queue_size = perf_counters.instr_queue_max;
    }
}
