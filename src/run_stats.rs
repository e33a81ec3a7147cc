use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Instant;




/**
 * Accumulated timing for one named piece of work.
 */
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Stat {
    pub count: u64,
    pub seconds: f64,
}




/**
 * Named timers accumulated over a run. Handles are cheap to clone and share
 * the same table, so the engine can record into it while the driver holds
 * on to it for the final report.
 */
#[derive(Clone, Default)]
pub struct RunStats {
    table: Arc<Mutex<BTreeMap<String, Stat>>>,
}




/**
 * A running timer; the elapsed time is added to its stat when `stop` is
 * called.
 */
pub struct RunTimer {
    stats: RunStats,
    name: String,
    start: Instant,
}




// ============================================================================
impl RunStats {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, name: &str) -> RunTimer {
        RunTimer {
            stats: self.clone(),
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    pub fn add(&self, name: &str, seconds: f64) {
        let mut table = self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let stat = table.entry(name.to_string()).or_default();
        stat.count += 1;
        stat.seconds += seconds;
    }

    pub fn get(&self, name: &str) -> Option<Stat> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).get(name).copied()
    }

    /**
     * Write one line per stat, in name order.
     */
    pub fn report<W: Write>(&self, rank: usize, out: &mut W) -> io::Result<()> {
        let table = self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        writeln!(out, "CPU({}): run statistics", rank)?;

        for (name, stat) in table.iter() {
            writeln!(out, "CPU({}):   {:<24} calls = {:>8}  time = {:.6}s", rank, name, stat.count, stat.seconds)?;
        }
        Ok(())
    }
}

impl RunTimer {
    pub fn stop(self) -> f64 {
        let seconds = self.start.elapsed().as_secs_f64();
        self.stats.add(&self.name, seconds);
        seconds
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::RunStats;

    #[test]
    fn timers_accumulate_into_shared_table() {
        let stats = RunStats::new();
        let shared = stats.clone();

        shared.start("coarse_time_step").stop();
        shared.start("coarse_time_step").stop();
        stats.add("regrid", 0.5);

        assert_eq!(stats.get("coarse_time_step").map(|s| s.count), Some(2));
        assert_eq!(stats.get("regrid").map(|s| s.seconds), Some(0.5));
        assert_eq!(stats.get("missing"), None);
    }

    #[test]
    fn report_lists_stats_in_name_order() {
        let stats = RunStats::new();
        stats.add("regrid", 1.0);
        stats.add("coarse_time_step", 2.0);

        let mut out = Vec::new();
        stats.report(3, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines[0], "CPU(3): run statistics");
        assert!(lines[1].contains("coarse_time_step"));
        assert!(lines[2].contains("regrid"));
    }
}
