use crate::instructions::instructions::{InstrTable, Tag, SOURCE_COUNT};

/// The unified reservation station: the pool of every instruction that has
/// been scheduled but not yet retired. Entries are held from the cycle the
/// dispatch/schedule latch drains into the pool until state update removes
/// them. Age order is recovered from the tags when the scheduler scans, so
/// the pool itself is unordered.
pub(crate) struct RSTable {
    pub(crate) capacity: u16,
    entries: Vec<Tag>,
}

impl RSTable {
    pub(crate) fn new(capacity: u16) -> RSTable {
        RSTable {
            capacity,
            entries: Vec::with_capacity(capacity as usize),
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Room for one more entry, counting the `pending` admissions already
    /// sitting in the dispatch/schedule latch for this cycle.
    pub(crate) fn has_space(&self, pending: usize) -> bool {
        self.entries.len() + pending < self.capacity as usize
    }

    pub(crate) fn insert(&mut self, tag: Tag) {
        debug_assert!(
            self.entries.len() < self.capacity as usize,
            "RSTable: insert of I{} exceeds capacity {}",
            tag,
            self.capacity
        );
        debug_assert!(!self.entries.contains(&tag), "RSTable: I{} inserted twice", tag);

        self.entries.push(tag);
    }

    pub(crate) fn remove(&mut self, tag: Tag) {
        match self.entries.iter().position(|&entry| entry == tag) {
            Some(index) => {
                self.entries.swap_remove(index);
            }
            None => panic!("RSTable: I{} is not in the reservation station", tag),
        }
    }

    /// All entries, oldest tag first. The scheduler walks this to preserve
    /// program order among the instructions that can issue.
    pub(crate) fn tags_in_age_order(&self) -> Vec<Tag> {
        let mut ordered = self.entries.clone();
        ordered.sort_unstable();
        ordered
    }

    /// Broadcast wake-up: flip every source that is pending on `producer`
    /// to ready.
    pub(crate) fn wakeup(&self, producer: Tag, instr_table: &mut InstrTable) {
        for &tag in &self.entries {
            let instr = instr_table.get_mut(tag);
            for s in 0..SOURCE_COUNT {
                if !instr.src_ready[s] && instr.src_tag[s] == Some(producer) {
                    instr.src_ready[s] = true;
                    instr.src_tag[s] = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::instructions::TraceInstr;

    #[test]
    fn test_has_space_counts_pending_admissions() {
        let mut rs_table = RSTable::new(2);
        assert!(rs_table.has_space(0));
        assert!(!rs_table.has_space(2));

        rs_table.insert(1);
        assert!(rs_table.has_space(0));
        assert!(!rs_table.has_space(1));
    }

    #[test]
    fn test_tags_in_age_order() {
        let mut rs_table = RSTable::new(8);
        rs_table.insert(3);
        rs_table.insert(1);
        rs_table.insert(2);
        assert_eq!(rs_table.tags_in_age_order(), vec![1, 2, 3]);

        rs_table.remove(1);
        assert_eq!(rs_table.tags_in_age_order(), vec![2, 3]);
    }

    #[test]
    fn test_wakeup_flips_only_matching_sources() {
        let mut instr_table = InstrTable::new();
        let producer = instr_table.allocate(TraceInstr::default(), 1);
        let waiter = instr_table.allocate(TraceInstr::default(), 1);
        let bystander = instr_table.allocate(TraceInstr::default(), 1);

        {
            let instr = instr_table.get_mut(waiter);
            instr.src_ready = [false, true];
            instr.src_tag = [Some(producer), None];
        }
        {
            let instr = instr_table.get_mut(bystander);
            instr.src_ready = [false, false];
            instr.src_tag = [Some(99), Some(99)];
        }

        let mut rs_table = RSTable::new(8);
        rs_table.insert(waiter);
        rs_table.insert(bystander);
        rs_table.wakeup(producer, &mut instr_table);

        assert!(instr_table.get(waiter).src_all_ready());
        assert_eq!(instr_table.get(waiter).src_tag[0], None);
        assert!(!instr_table.get(bystander).src_all_ready());
    }
}
