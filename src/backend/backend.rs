use std::cell::RefCell;
use std::rc::Rc;

use crate::backend::common_data_bus::CDB;
use crate::backend::execution_unit::EUTable;
use crate::backend::register_alias_table::RAT;
use crate::backend::reservation_station::RSTable;
use crate::cpu::{CPUConfig, PerfCounters, Trace, ARCH_REG_COUNT};
use crate::instructions::instructions::{InstrQueue, InstrTable, Latch, Tag, EU_TYPE_COUNT, SOURCE_COUNT};

/// Everything behind the fetch stage: the dispatch queue, the reservation
/// station, register renaming, the execution units and the common data
/// bus, advanced one cycle at a time.
///
/// Within a cycle the stages run in reverse pipeline order, retirement
/// first and dispatch last, so every stage consumes the latch contents its
/// predecessor produced on the previous cycle and never data written
/// earlier in the same cycle. The frontend runs after the backend and
/// fills the fetch/dispatch latch; the latch swap closes the cycle.
pub(crate) struct Backend {
    instr_table: Rc<RefCell<InstrTable>>,
    instr_queue: InstrQueue,
    fd_latch: Rc<RefCell<Latch>>,
    ds_latch: Latch,
    se_latch: Latch,
    rs_table: RSTable,
    rat: RAT,
    eu_table: EUTable,
    cdb: CDB,
    state_update: Vec<Tag>,
    trace: Trace,
    perf_counters: Rc<RefCell<PerfCounters>>,
}

impl Backend {
    pub(crate) fn new(
        cpu_config: &CPUConfig,
        instr_table: &Rc<RefCell<InstrTable>>,
        fd_latch: &Rc<RefCell<Latch>>,
        perf_counters: &Rc<RefCell<PerfCounters>>,
    ) -> Backend {
        Backend {
            instr_table: Rc::clone(instr_table),
            instr_queue: InstrQueue::new(),
            fd_latch: Rc::clone(fd_latch),
            ds_latch: Latch::new(),
            se_latch: Latch::new(),
            rs_table: RSTable::new(cpu_config.rs_capacity()),
            rat: RAT::new(ARCH_REG_COUNT),
            eu_table: EUTable::new(cpu_config),
            cdb: CDB::new(cpu_config.cdb_n_wide),
            state_update: Vec::new(),
            trace: cpu_config.trace,
            perf_counters: Rc::clone(perf_counters),
        }
    }

    pub(crate) fn do_cycle(&mut self, cycle: u64) {
        self.cycle_retire();
        self.cycle_eu_table(cycle);
        self.cycle_broadcast(cycle);
        self.cycle_begin_execution(cycle);
        self.cycle_rs_allocation(cycle);
        self.cycle_instr_queue(cycle);
        self.sample_instr_queue();
        self.cycle_issue(cycle);
        self.cycle_dispatch();
    }

    pub(crate) fn advance_latches(&mut self) {
        self.fd_latch.borrow_mut().advance();
        self.ds_latch.advance();
        self.se_latch.advance();
    }

    /// True when no instruction is held anywhere behind the fetch stage.
    pub(crate) fn is_idle(&self) -> bool {
        self.instr_queue.is_empty()
            && self.rs_table.is_empty()
            && self.state_update.is_empty()
            && self.cdb.is_empty()
            && !self.eu_table.any_busy()
            && self.fd_latch.borrow().is_empty()
            && self.ds_latch.is_empty()
            && self.se_latch.is_empty()
    }

    // Stage 5: everything that entered state update last cycle leaves the
    // reservation station. Retirement width is unbounded; the bus already
    // throttled the inflow.
    fn cycle_retire(&mut self) {
        if self.state_update.is_empty() {
            return;
        }

        let mut perf_counters = self.perf_counters.borrow_mut();
        let instr_table = self.instr_table.borrow();

        for tag in std::mem::take(&mut self.state_update) {
            self.rs_table.remove(tag);
            perf_counters.retire_cnt += 1;

            if self.trace.retire {
                let instr = instr_table.get(tag);
                println!(
                    "Retired {} [fetch:{} dispatch:{} schedule:{} execute:{} state:{}]",
                    instr,
                    instr.fetched_at,
                    instr.dispatched_at,
                    instr.scheduled_at,
                    instr.executed_at,
                    instr.state_updated_at,
                );
            }
        }
    }

    // Stage 4a: advance the latency timer of every busy execution unit.
    // Units that finish park their instruction on the bus wait list; the
    // unit itself stays occupied until the broadcast happens.
    fn cycle_eu_table(&mut self, cycle: u64) {
        let mut instr_table = self.instr_table.borrow_mut();

        for eu in self.eu_table.iter_mut() {
            let tag = match eu.instr {
                None => continue,
                Some(tag) => tag,
            };
            if eu.cycles_remaining == 0 {
                // finished earlier, still waiting for a bus slot
                continue;
            }

            eu.cycles_remaining -= 1;
            if eu.cycles_remaining > 0 {
                continue;
            }

            let instr = instr_table.get_mut(tag);
            if instr.waiting_cdb {
                continue;
            }
            if instr.completed_at == 0 {
                instr.completed_at = cycle;
            }
            instr.waiting_cdb = true;
            if !instr.enqueued_cdb {
                instr.enqueued_cdb = true;
                self.cdb.enqueue(tag);
            }
        }
    }

    // Stage 4b: broadcast the granted completions. Each broadcast frees
    // its execution unit, releases the rename entry when it still owns it,
    // wakes the dependents and moves the instruction into state update.
    fn cycle_broadcast(&mut self, cycle: u64) {
        if self.cdb.is_empty() {
            return;
        }

        let mut instr_table = self.instr_table.borrow_mut();
        let granted = self.cdb.select(&instr_table);

        for tag in granted {
            let (eu_index, dest_reg) = {
                let instr = instr_table.get_mut(tag);
                instr.waiting_cdb = false;
                instr.enqueued_cdb = false;
                instr.state_updated_at = cycle;

                if self.trace.broadcast {
                    println!("Broadcast {}", instr);
                }

                (instr.eu_index.take(), instr.trace.dest_reg)
            };

            match eu_index {
                Some(eu_index) => self.eu_table.deallocate(eu_index),
                None => panic!("Backend: I{} broadcast without an execution unit", tag),
            }

            self.rat.clear_if_owner(dest_reg, tag);
            self.rs_table.wakeup(tag, &mut instr_table);
            self.state_update.push(tag);
        }
    }

    // Stage 4c: bind the schedule/execute latch to execution units. The
    // issue projection guaranteed a free unit of the right type.
    fn cycle_begin_execution(&mut self, cycle: u64) {
        let issued = self.se_latch.drain_current();
        if issued.is_empty() {
            return;
        }

        let mut instr_table = self.instr_table.borrow_mut();

        for tag in issued {
            let instr = instr_table.get_mut(tag);
            let eu_index = match self.eu_table.find_idle(instr.eu_type) {
                Some(eu_index) => eu_index,
                None => panic!(
                    "Backend: no idle type-{} execution unit for {} (availability projection bug)",
                    instr.eu_type, instr
                ),
            };

            self.eu_table.allocate(eu_index, tag);
            instr.eu_index = Some(eu_index);
            instr.executed_at = cycle;

            if self.trace.execute {
                println!("Executing {}", instr);
            }
        }
    }

    // Stage 3a: drain the dispatch/schedule latch into the reservation
    // station. Source readiness comes from the rename table as it stands
    // at the start of this cycle; the destination then claims its entry.
    fn cycle_rs_allocation(&mut self, cycle: u64) {
        let scheduled = self.ds_latch.drain_current();
        if scheduled.is_empty() {
            return;
        }

        let mut perf_counters = self.perf_counters.borrow_mut();
        let mut instr_table = self.instr_table.borrow_mut();

        for tag in scheduled {
            let instr = instr_table.get_mut(tag);
            instr.scheduled_at = cycle;
            instr.ready_at = cycle;

            for s in 0..SOURCE_COUNT {
                match self.rat.producer(instr.trace.src_reg[s]) {
                    None => {
                        instr.src_ready[s] = true;
                        instr.src_tag[s] = None;
                    }
                    Some(producer) => {
                        instr.src_ready[s] = false;
                        instr.src_tag[s] = Some(producer);
                    }
                }
            }
            self.rat.update(instr.trace.dest_reg, tag);

            if self.trace.schedule {
                println!("Scheduled {}", instr);
            }

            self.rs_table.insert(tag);
            perf_counters.schedule_cnt += 1;
        }
    }

    // Stage 2b: drain the fetch/dispatch latch into the dispatch queue.
    fn cycle_instr_queue(&mut self, cycle: u64) {
        let dispatched = self.fd_latch.borrow_mut().drain_current();
        if dispatched.is_empty() {
            return;
        }

        let mut perf_counters = self.perf_counters.borrow_mut();
        let mut instr_table = self.instr_table.borrow_mut();

        for tag in dispatched {
            let instr = instr_table.get_mut(tag);
            instr.dispatched_at = cycle;

            if self.trace.dispatch {
                println!("Dispatched {}", instr);
            }

            self.instr_queue.enqueue(tag);
            perf_counters.dispatch_cnt += 1;
        }
    }

    // The dispatch queue occupancy is observed once per cycle, after the
    // fetch/dispatch latch drained and before issue runs.
    fn sample_instr_queue(&mut self) {
        let mut perf_counters = self.perf_counters.borrow_mut();
        let size = self.instr_queue.size() as u64;
        perf_counters.instr_queue_sum += size as f64;
        if size > perf_counters.instr_queue_max {
            perf_counters.instr_queue_max = size;
        }
    }

    // Stage 3b: scan the reservation station oldest tag first and issue
    // every entry whose sources are ready, as long as the projection still
    // has a unit of its type free at the next execute window. A type whose
    // reservation runs out only skips entries of that type.
    fn cycle_issue(&mut self, cycle: u64) {
        if self.rs_table.is_empty() {
            return;
        }

        let mut perf_counters = self.perf_counters.borrow_mut();
        let mut instr_table = self.instr_table.borrow_mut();

        let free_next = self.eu_table.projected_idle(cycle, self.cdb.n_wide(), &instr_table);
        let mut reserved = [0u16; EU_TYPE_COUNT];

        for tag in self.rs_table.tags_in_age_order() {
            let instr = instr_table.get_mut(tag);
            if instr.issued {
                continue;
            }
            if cycle < instr.ready_at {
                continue;
            }
            if !instr.src_all_ready() {
                continue;
            }

            let eu_type = instr.eu_type as usize;
            if reserved[eu_type] >= free_next[eu_type] {
                continue;
            }

            instr.issued = true;
            reserved[eu_type] += 1;

            if self.trace.issue {
                println!("Issued {}", instr);
            }

            self.se_latch.push_next(tag);
            perf_counters.issue_cnt += 1;
        }
    }

    // Stage 2a: refill the dispatch/schedule latch from the dispatch
    // queue, in program order, while the reservation station has headroom
    // for everything already admitted this cycle.
    fn cycle_dispatch(&mut self) {
        while self.rs_table.has_space(self.ds_latch.next_len()) {
            match self.instr_queue.dequeue() {
                Some(tag) => self.ds_latch.push_next(tag),
                None => break,
            }
        }
    }
}
