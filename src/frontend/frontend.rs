use std::cell::RefCell;
use std::rc::Rc;

use crate::cpu::{CPUConfig, PerfCounters};
use crate::instructions::instructions::{InstrTable, Latch, TraceInstr};

/// Pull interface the fetch stage consumes. `read_instruction` writes the
/// next trace record into `out` and returns true, or returns false once at
/// the end of the trace.
pub trait InstrSource {
    fn read_instruction(&mut self, out: &mut TraceInstr) -> bool;
}

/// The fetch stage. Pulls up to `frontend_n_wide` records per cycle from
/// the instruction source into the fetch/dispatch latch. The first failed
/// pull marks the trace done for the remainder of the run.
pub(crate) struct Frontend {
    instr_source: Box<dyn InstrSource>,
    n_wide: u8,
    fd_latch: Rc<RefCell<Latch>>,
    instr_table: Rc<RefCell<InstrTable>>,
    trace_done: bool,
    trace: bool,
    perf_counters: Rc<RefCell<PerfCounters>>,
}

impl Frontend {
    pub(crate) fn new(
        cpu_config: &CPUConfig,
        instr_source: Box<dyn InstrSource>,
        fd_latch: &Rc<RefCell<Latch>>,
        instr_table: &Rc<RefCell<InstrTable>>,
        perf_counters: &Rc<RefCell<PerfCounters>>,
    ) -> Frontend {
        Frontend {
            instr_source,
            n_wide: cpu_config.frontend_n_wide,
            fd_latch: Rc::clone(fd_latch),
            instr_table: Rc::clone(instr_table),
            trace_done: false,
            trace: cpu_config.trace.fetch,
            perf_counters: Rc::clone(perf_counters),
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.trace_done
    }

    pub(crate) fn do_cycle(&mut self, cycle: u64) {
        if self.trace_done {
            return;
        }

        let mut instr_table = self.instr_table.borrow_mut();
        let mut fd_latch = self.fd_latch.borrow_mut();
        let mut perf_counters = self.perf_counters.borrow_mut();

        for _ in 0..self.n_wide {
            let mut record = TraceInstr::default();
            if !self.instr_source.read_instruction(&mut record) {
                self.trace_done = true;
                break;
            }

            let tag = instr_table.allocate(record, cycle);
            fd_latch.push_next(tag);
            perf_counters.fetch_cnt += 1;

            if self.trace {
                println!("Fetched {}", instr_table.get(tag));
            }
        }
    }
}
