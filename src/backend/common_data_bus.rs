use crate::instructions::instructions::{InstrTable, Tag};

/// The common data bus. Completed instructions wait here until one of the
/// `n_wide` broadcast slots of a cycle picks them up; whoever completed
/// first goes first, with the tag breaking ties so older instructions win.
pub(crate) struct CDB {
    n_wide: u8,
    wait_list: Vec<Tag>,
}

impl CDB {
    pub(crate) fn new(n_wide: u8) -> CDB {
        debug_assert!(n_wide > 0, "CDB: bus width must be at least 1");

        CDB {
            n_wide,
            wait_list: Vec::new(),
        }
    }

    pub(crate) fn n_wide(&self) -> u8 {
        self.n_wide
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.wait_list.is_empty()
    }

    pub(crate) fn enqueue(&mut self, tag: Tag) {
        debug_assert!(!self.wait_list.contains(&tag), "CDB: I{} enqueued twice", tag);

        self.wait_list.push(tag);
    }

    /// Grant up to `n_wide` broadcasts in (completion cycle, tag) order.
    /// Ungranted instructions stay queued; their completion cycle does not
    /// change, so they naturally win ties against younger completions on
    /// the next cycle.
    pub(crate) fn select(&mut self, instr_table: &InstrTable) -> Vec<Tag> {
        if self.wait_list.is_empty() {
            return Vec::new();
        }

        self.wait_list.sort_by_key(|&tag| {
            let instr = instr_table.get(tag);
            (instr.completed_at, instr.tag)
        });

        let granted = (self.n_wide as usize).min(self.wait_list.len());
        self.wait_list.drain(..granted).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::instructions::TraceInstr;

    fn completed(instr_table: &mut InstrTable, completed_at: u64) -> Tag {
        let tag = instr_table.allocate(TraceInstr::default(), 1);
        instr_table.get_mut(tag).completed_at = completed_at;
        tag
    }

    #[test]
    fn test_select_orders_by_completion_then_tag() {
        let mut instr_table = InstrTable::new();
        let a = completed(&mut instr_table, 7);
        let b = completed(&mut instr_table, 5);
        let c = completed(&mut instr_table, 5);

        let mut cdb = CDB::new(2);
        cdb.enqueue(a);
        cdb.enqueue(c);
        cdb.enqueue(b);

        // the two cycle-5 completions go first, oldest tag leading
        assert_eq!(cdb.select(&instr_table), vec![b, c]);
        assert!(!cdb.is_empty());
        assert_eq!(cdb.select(&instr_table), vec![a]);
        assert!(cdb.is_empty());
    }

    #[test]
    fn test_ungranted_instruction_retries() {
        let mut instr_table = InstrTable::new();
        let first = completed(&mut instr_table, 4);
        let second = completed(&mut instr_table, 4);

        let mut cdb = CDB::new(1);
        cdb.enqueue(first);
        cdb.enqueue(second);

        assert_eq!(cdb.select(&instr_table), vec![first]);

        // a fresh completion from a later cycle loses against the holdover
        let late = completed(&mut instr_table, 5);
        cdb.enqueue(late);
        assert_eq!(cdb.select(&instr_table), vec![second]);
        assert_eq!(cdb.select(&instr_table), vec![late]);
    }
}
