use crate::cpu::CPUConfig;
use crate::instructions::instructions::{InstrTable, Tag, EU_TYPE_COUNT};

// All three execution unit types finish in a single cycle.
pub(crate) const EU_LATENCY: [u8; EU_TYPE_COUNT] = [1, 1, 1];

/// A single execution unit. It holds at most one instruction, from the
/// cycle execution starts until the cycle the result goes out on the
/// common data bus; finishing the latency timer alone does not release it.
pub(crate) struct EU {
    pub(crate) index: u8,
    pub(crate) eu_type: u8,
    pub(crate) instr: Option<Tag>,
    pub(crate) cycles_remaining: u8,
}

/// The table containing all execution units of the core: `eu0_count` units
/// of type 0, `eu1_count` of type 1 and `eu2_count` of type 2.
pub(crate) struct EUTable {
    array: Vec<EU>,
}

struct FreeCandidate {
    tag: Tag,
    eu_type: u8,
    free_at: u64,
}

impl EUTable {
    pub(crate) fn new(cpu_config: &CPUConfig) -> EUTable {
        let mut array = Vec::with_capacity(cpu_config.eu_count_total() as usize);
        for eu_type in 0..EU_TYPE_COUNT as u8 {
            for _ in 0..cpu_config.eu_count(eu_type) {
                array.push(EU {
                    index: array.len() as u8,
                    eu_type,
                    instr: None,
                    cycles_remaining: 0,
                });
            }
        }
        EUTable { array }
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut EU> {
        self.array.iter_mut()
    }

    pub(crate) fn any_busy(&self) -> bool {
        self.array.iter().any(|eu| eu.instr.is_some())
    }

    pub(crate) fn find_idle(&self, eu_type: u8) -> Option<u8> {
        self.array
            .iter()
            .find(|eu| eu.eu_type == eu_type && eu.instr.is_none())
            .map(|eu| eu.index)
    }

    pub(crate) fn allocate(&mut self, eu_index: u8, tag: Tag) {
        let eu = &mut self.array[eu_index as usize];
        debug_assert!(eu.instr.is_none(), "EU {} is already busy", eu_index);

        eu.instr = Some(tag);
        eu.cycles_remaining = EU_LATENCY[eu.eu_type as usize];
    }

    pub(crate) fn deallocate(&mut self, eu_index: u8) {
        let eu = &mut self.array[eu_index as usize];
        debug_assert!(eu.instr.is_some(), "EU {} is not busy", eu_index);

        eu.instr = None;
        eu.cycles_remaining = 0;
    }

    /// Project how many units of each type will be free at the start of the
    /// next execute window: the idle units, plus the busy units whose
    /// instruction the common data bus can evict in time. Only the first
    /// `cdb_n_wide` completions in (completion cycle, tag) order count,
    /// which caps issue by the bus bandwidth.
    pub(crate) fn projected_idle(
        &self,
        cycle: u64,
        cdb_n_wide: u8,
        instr_table: &InstrTable,
    ) -> [u16; EU_TYPE_COUNT] {
        let mut idle = [0u16; EU_TYPE_COUNT];
        let mut candidates = Vec::new();

        for eu in &self.array {
            let tag = match eu.instr {
                None => {
                    idle[eu.eu_type as usize] += 1;
                    continue;
                }
                Some(tag) => tag,
            };

            let instr = instr_table.get(tag);
            if instr.waiting_cdb {
                candidates.push(FreeCandidate {
                    tag,
                    eu_type: eu.eu_type,
                    free_at: instr.completed_at,
                });
            } else if eu.cycles_remaining == 1 {
                // finishes this cycle, broadcastable the next
                candidates.push(FreeCandidate {
                    tag,
                    eu_type: eu.eu_type,
                    free_at: cycle + 1,
                });
            }
        }

        candidates.sort_by_key(|candidate| (candidate.free_at, candidate.tag));
        for candidate in candidates.iter().take(cdb_n_wide as usize) {
            idle[candidate.eu_type as usize] += 1;
        }
        idle
    }
}
