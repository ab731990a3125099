use std::rc::Rc;

use crate::cpu::{CPUConfig, SimStats, CPU};
use crate::loader::loader::{load_from_string, LoadError, ProgramSource};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_trace() {
        let mut harness = TestHarness::default();
        harness.run("");

        harness.assert_cycles(0);
        harness.assert_retired(0);
        harness.assert_avg_issued(0.0);
        harness.assert_avg_retired(0.0);
        harness.assert_avg_queue(0.0);
        harness.assert_max_queue(0);
    }

    // A lone instruction walks through one stage per cycle: fetched 1,
    // dispatched 2, scheduled 3, executing 4, broadcast 5, retired 6.
    #[test]
    fn test_single_instruction() {
        let mut harness = TestHarness::default();
        harness.cpu_config.frontend_n_wide = 1;
        harness.cpu_config.cdb_n_wide = 1;
        harness.cpu_config.eu0_count = 1;
        harness.cpu_config.eu1_count = 1;
        harness.cpu_config.eu2_count = 1;
        harness.run("0 5 -1 -1");

        harness.assert_cycles(5);
        harness.assert_retired(1);
        harness.assert_avg_issued(1.0 / 5.0);
        harness.assert_avg_retired(1.0 / 5.0);
        harness.assert_avg_queue(1.0 / 5.0);
        harness.assert_max_queue(1);
    }

    // The consumer sits in the reservation station until the producer's
    // broadcast wakes it.
    #[test]
    fn test_dependency_chain() {
        let src = r#"
0 1 -1 -1
0 2  1 -1
"#;
        let mut harness = TestHarness::default();
        harness.cpu_config.frontend_n_wide = 2;
        harness.cpu_config.cdb_n_wide = 1;
        harness.cpu_config.eu0_count = 1;
        harness.cpu_config.eu1_count = 1;
        harness.cpu_config.eu2_count = 1;
        harness.run(src);

        harness.assert_cycles(7);
        harness.assert_retired(2);
        harness.assert_avg_issued(2.0 / 7.0);
        harness.assert_max_queue(2);
    }

    // An instruction may consume two in-flight producers at once; it only
    // wakes after the second broadcast, which the single bus delays by a
    // cycle.
    #[test]
    fn test_two_pending_sources() {
        let src = r#"
0 1 -1 -1
1 2 -1 -1
2 3  1  2
"#;
        let mut harness = TestHarness::default();
        harness.cpu_config.frontend_n_wide = 4;
        harness.cpu_config.cdb_n_wide = 1;
        harness.cpu_config.eu0_count = 1;
        harness.cpu_config.eu1_count = 1;
        harness.cpu_config.eu2_count = 1;
        harness.run(src);

        harness.assert_cycles(8);
        harness.assert_retired(3);
    }

    // Two independent instructions of the same type serialize on the lone
    // execution unit even though the bus could broadcast both.
    #[test]
    fn test_single_eu_contention() {
        let src = r#"
0 1 -1 -1
0 2 -1 -1
"#;
        let mut harness = TestHarness::default();
        harness.cpu_config.frontend_n_wide = 2;
        harness.cpu_config.cdb_n_wide = 2;
        harness.cpu_config.eu0_count = 1;
        harness.cpu_config.eu1_count = 1;
        harness.cpu_config.eu2_count = 1;
        harness.run(src);

        harness.assert_cycles(6);
        harness.assert_retired(2);
    }

    #[test]
    fn test_second_eu_removes_contention() {
        let src = r#"
0 1 -1 -1
0 2 -1 -1
"#;
        let mut harness = TestHarness::default();
        harness.cpu_config.frontend_n_wide = 2;
        harness.cpu_config.cdb_n_wide = 2;
        harness.cpu_config.eu0_count = 2;
        harness.cpu_config.eu1_count = 1;
        harness.cpu_config.eu2_count = 1;
        harness.run(src);

        harness.assert_cycles(5);
        harness.assert_retired(2);
    }

    // Three writers of r3 in sequence, then a consumer. Renaming pins the
    // consumer to the youngest writer, so the older broadcasts must not
    // wake it; the consumer only issues after the third writer broadcasts.
    #[test]
    fn test_rename_supersedes_older_writers() {
        let src = r#"
0 3 -1 -1
0 3 -1 -1
0 3 -1 -1
0 4  3 -1
"#;
        let mut harness = TestHarness::default();
        harness.cpu_config.frontend_n_wide = 4;
        harness.cpu_config.cdb_n_wide = 1;
        harness.cpu_config.eu0_count = 1;
        harness.cpu_config.eu1_count = 1;
        harness.cpu_config.eu2_count = 1;
        harness.run(src);

        harness.assert_cycles(9);
        harness.assert_retired(4);
        harness.assert_avg_issued(4.0 / 9.0);
    }

    // Two units finish together but the single bus slot broadcasts the
    // older tag first; the younger one keeps its unit an extra cycle.
    #[test]
    fn test_cdb_bottleneck() {
        let src = r#"
0 1 -1 -1
0 2 -1 -1
"#;
        let mut harness = TestHarness::default();
        harness.cpu_config.frontend_n_wide = 2;
        harness.cpu_config.cdb_n_wide = 1;
        harness.cpu_config.eu0_count = 2;
        harness.cpu_config.eu1_count = 1;
        harness.cpu_config.eu2_count = 1;
        harness.run(src);

        harness.assert_cycles(6);
        harness.assert_retired(2);
    }

    #[test]
    fn test_wider_cdb_lifts_bottleneck() {
        let src = r#"
0 1 -1 -1
0 2 -1 -1
"#;
        let mut harness = TestHarness::default();
        harness.cpu_config.frontend_n_wide = 2;
        harness.cpu_config.cdb_n_wide = 2;
        harness.cpu_config.eu0_count = 2;
        harness.cpu_config.eu1_count = 1;
        harness.cpu_config.eu2_count = 1;
        harness.run(src);

        harness.assert_cycles(5);
        harness.assert_retired(2);
    }

    #[test]
    fn test_cdb_width_zero_is_treated_as_one() {
        let src = r#"
0 1 -1 -1
0 2 -1 -1
"#;
        let mut harness = TestHarness::default();
        harness.cpu_config.frontend_n_wide = 2;
        harness.cpu_config.cdb_n_wide = 0;
        harness.cpu_config.eu0_count = 2;
        harness.cpu_config.eu1_count = 1;
        harness.cpu_config.eu2_count = 1;
        harness.run(src);

        harness.assert_cycles(6);
        harness.assert_retired(2);
    }

    // Opcodes 3, 4 and 5 land on units 0, 1 and 2; with one unit of each
    // type all three run in parallel.
    #[test]
    fn test_op_codes_spread_over_eu_types() {
        let src = r#"
3 1 -1 -1
4 2 -1 -1
5 3 -1 -1
"#;
        let mut harness = TestHarness::default();
        harness.cpu_config.frontend_n_wide = 4;
        harness.cpu_config.cdb_n_wide = 3;
        harness.cpu_config.eu0_count = 1;
        harness.cpu_config.eu1_count = 1;
        harness.cpu_config.eu2_count = 1;
        harness.run(src);

        harness.assert_cycles(5);
        harness.assert_retired(3);
        harness.assert_avg_issued(3.0 / 5.0);
    }

    #[test]
    fn test_identical_runs_are_deterministic() {
        let src = r#"
0 1 -1 -1
1 2  1 -1
2 3  1  2
0 1 -1 -1
5 4  3  1
"#;
        let mut first = TestHarness::default();
        first.cpu_config.cdb_n_wide = 1;
        first.run(src);

        let mut second = TestHarness::default();
        second.cpu_config.cdb_n_wide = 1;
        second.run(src);

        assert_eq!(first.stats, second.stats);
    }

    struct TestHarness {
        cpu_config: CPUConfig,
        stats: SimStats,
    }

    impl TestHarness {
        fn default() -> TestHarness {
            TestHarness {
                cpu_config: CPUConfig::default(),
                stats: SimStats::default(),
            }
        }

        fn run(&mut self, src: &str) {
            let program = match load_from_string(src) {
                Ok(program) => Rc::new(program),
                Err(err) => {
                    match err {
                        LoadError::IOError(msg) => println!("{}", msg),
                        LoadError::SyntaxError(msg_vec) => {
                            for msg in msg_vec {
                                println!("{}", msg);
                            }
                        }
                    }
                    panic!("trace did not load");
                }
            };

            let mut cpu = CPU::new(&self.cpu_config, Box::new(ProgramSource::new(&program)));
            cpu.run(&mut self.stats);
            cpu.complete(&mut self.stats);
        }

        fn assert_cycles(&self, expected: u64) {
            assert_eq!(self.stats.cycle_count, expected);
        }

        fn assert_retired(&self, expected: u64) {
            assert_eq!(self.stats.retired_count, expected);
        }

        fn assert_avg_issued(&self, expected: f32) {
            assert!(
                (self.stats.avg_inst_issued - expected).abs() < 1e-6,
                "avg_inst_issued was {}, expected {}",
                self.stats.avg_inst_issued,
                expected
            );
        }

        fn assert_avg_retired(&self, expected: f32) {
            assert!(
                (self.stats.avg_inst_retired - expected).abs() < 1e-6,
                "avg_inst_retired was {}, expected {}",
                self.stats.avg_inst_retired,
                expected
            );
        }

        fn assert_avg_queue(&self, expected: f32) {
            assert!(
                (self.stats.avg_instr_queue_size - expected).abs() < 1e-6,
                "avg_instr_queue_size was {}, expected {}",
                self.stats.avg_instr_queue_size,
                expected
            );
        }

        fn assert_max_queue(&self, expected: u64) {
            assert_eq!(self.stats.max_instr_queue_size, expected);
        }
    }
}
