use std::cell::Cell;
use std::fs::File;
use std::io::Write;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use amrdrive::arena::{Arena, BasicArena, CoalescingArena};
use amrdrive::diagnostics::{count_tag_array, count_tags, print_tag_array, print_tags};
use amrdrive::driver::{self, Controller, RunParams, RunState};
use amrdrive::engine::advection::{AdvectionEngine, PlotFile};
use amrdrive::engine::AmrEngine;
use amrdrive::error::Error;
use amrdrive::index_space::{range2d, IndexSpace};
use amrdrive::message::local::LocalCommunicator;
use amrdrive::parallel::ProcessGroup;
use amrdrive::parm_parse::ParmParse;
use amrdrive::run_stats::RunStats;
use amrdrive::tag_map::{Tag, TagMap, TagMapArray};




/**
 * An engine which advances by a fixed dt and counts its calls.
 */
struct Stepper {
    dt: f64,
    time: f64,
    steps: u64,
    healthy_for: Option<u64>,
    finished: Rc<Cell<bool>>,
}

impl Stepper {
    fn new(dt: f64, finished: Rc<Cell<bool>>) -> Self {
        Self { dt, time: 0.0, steps: 0, healthy_for: None, finished }
    }
}

impl AmrEngine for Stepper {
    fn init(&mut self, strt_time: f64, _: Option<f64>) -> Result<(), Error> {
        self.time = strt_time;
        Ok(())
    }

    fn coarse_time_step(&mut self, stop_time: Option<f64>) -> Result<(), Error> {
        self.time = stop_time.map_or(self.time + self.dt, |stop| (self.time + self.dt).min(stop));
        self.steps += 1;
        Ok(())
    }

    fn level_steps(&self, _: usize) -> u64 {
        self.steps
    }

    fn cum_time(&self) -> f64 {
        self.time
    }

    fn ok_to_continue(&self) -> bool {
        self.healthy_for.map_or(true, |n| self.steps < n)
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.finished.set(true);
        Ok(())
    }
}

fn run_stepper(params: RunParams, dt: f64) -> (Result<driver::RunSummary, Error>, bool) {
    let finished = Rc::new(Cell::new(false));
    let engine = Stepper::new(dt, finished.clone());
    let result = Controller::new(params).run(|| Ok(engine));
    (result, finished.get())
}




// ============================================================================
#[test]
fn step_bound_stops_after_exactly_max_step_advances() {
    let (result, finished) = run_stepper(RunParams::new(Some(3), 0.0, None).unwrap(), 1.0);
    let summary = result.unwrap();
    assert_eq!(summary.steps, 3);
    assert_eq!(summary.time, 3.0);
    assert!(finished);
}

#[test]
fn time_bound_stops_at_stop_time() {
    let (result, _) = run_stepper(RunParams::new(None, 0.0, Some(2.0)).unwrap(), 1.0);
    let summary = result.unwrap();
    assert_eq!(summary.steps, 2);
    assert_eq!(summary.time, 2.0);
}

#[test]
fn earlier_of_two_bounds_wins() {
    let (result, _) = run_stepper(RunParams::new(Some(10), 0.0, Some(2.5)).unwrap(), 1.0);
    assert_eq!(result.unwrap().steps, 3);

    let (result, _) = run_stepper(RunParams::new(Some(1), 0.0, Some(2.5)).unwrap(), 1.0);
    assert_eq!(result.unwrap().steps, 1);
}

#[test]
fn zero_step_bound_never_advances() {
    let (result, finished) = run_stepper(RunParams::new(Some(0), 0.0, None).unwrap(), 1.0);
    assert_eq!(result.unwrap().steps, 0);
    assert!(finished);
}

#[test]
fn unhealthy_engine_stops_the_loop() {
    let finished = Rc::new(Cell::new(false));
    let mut engine = Stepper::new(1.0, finished.clone());
    engine.healthy_for = Some(4);

    let mut controller = Controller::new(RunParams::new(Some(100), 0.0, None).unwrap());
    assert_eq!(controller.state(), RunState::Uninitialized);
    assert_eq!(controller.run(|| Ok(engine)).unwrap().steps, 4);
    assert_eq!(controller.state(), RunState::Terminated);
    assert!(finished.get());
}

#[test]
fn invalid_parameters_are_rejected_before_the_engine_is_built() {
    let group = ProcessGroup::start(LocalCommunicator::serial());
    let stats = RunStats::new();

    for (inputs, expect_negative) in [("strt_time = -1.0 max_step = 3", true), ("strt_time = 0.0", false)] {
        let pp = ParmParse::parse(inputs).unwrap();
        let built = Cell::new(false);
        let make_engine = || {
            built.set(true);
            Ok(Stepper::new(1.0, Rc::default()))
        };
        let result = driver::execute(&group, &pp, make_engine, &stats, &BasicArena, &mut Vec::new());

        match result {
            Err(Error::NegativeStartTime(t)) => assert!(expect_negative && t == -1.0),
            Err(Error::NoStoppingCriterion) => assert!(!expect_negative),
            other => panic!("unexpected result {:?}", other.map(|s| s.steps)),
        }
        assert!(!built.get());
    }
}


#[test]
fn single_bound_parameters_build_and_run_the_engine() {
    let group = ProcessGroup::start(LocalCommunicator::serial());
    let stats = RunStats::new();

    for (inputs, steps) in [("max_step = -1 stop_time = 5.0", 5), ("max_step = 3 stop_time = -1.0", 3)] {
        let pp = ParmParse::parse(inputs).unwrap();
        let finished = Rc::new(Cell::new(false));
        let built = Cell::new(false);
        let make_engine = || {
            built.set(true);
            Ok(Stepper::new(1.0, finished.clone()))
        };
        let summary = driver::execute(&group, &pp, make_engine, &stats, &BasicArena, &mut Vec::new()).unwrap();

        assert!(built.get());
        assert!(finished.get());
        assert_eq!(summary.steps, steps);
    }
}

#[test]
fn explicit_unbounded_parameters_are_rejected() {
    let group = ProcessGroup::start(LocalCommunicator::serial());
    let pp = ParmParse::parse("max_step = -1 stop_time = -1.0").unwrap();
    let built = Cell::new(false);
    let make_engine = || {
        built.set(true);
        Ok(Stepper::new(1.0, Rc::default()))
    };
    let result = driver::execute(&group, &pp, make_engine, &RunStats::new(), &BasicArena, &mut Vec::new());

    assert!(matches!(result, Err(Error::NoStoppingCriterion)));
    assert!(!built.get());
}




// ============================================================================
#[test]
fn tag_counts_agree_between_printing_and_counting() {
    let space = range2d(-4..5, 0..7);
    let map = TagMap::from_function(space, |c| match (c[0] * 3 + c[1]) % 5 {
        0 => Tag::SET,
        1 => Tag::BUFFER,
        _ => Tag::CLEAR,
    });
    assert_eq!(print_tags(&map, &mut Vec::new()).unwrap(), count_tags(&map, &mut Vec::new()).unwrap());
}

#[test]
fn collection_total_is_the_sum_regardless_of_order() {
    let maps = vec![
        TagMap::from_function(range2d(0..3, 0..3), |_| Tag::SET),
        TagMap::new(range2d(3..6, 0..3)),
        TagMap::from_function(IndexSpace::from_corners([9, 9], [9, 9]), |_| Tag::BUFFER),
    ];
    let sum: u64 = maps.iter().map(|m| count_tags(m, &mut Vec::new()).unwrap()).sum();

    let forward: TagMapArray<2> = maps.iter().cloned().collect();
    let reverse: TagMapArray<2> = maps.iter().rev().cloned().collect();

    assert_eq!(sum, 10);
    assert_eq!(count_tag_array(&forward, &mut Vec::new()).unwrap(), sum);
    assert_eq!(count_tag_array(&reverse, &mut Vec::new()).unwrap(), sum);
    assert_eq!(print_tag_array(&forward, &mut Vec::new()).unwrap(), sum);
}




// ============================================================================
#[test]
fn reported_run_time_is_the_maximum_over_ranks() {
    let handles: Vec<_> = LocalCommunicator::group(3)
        .into_iter()
        .map(|comm| thread::spawn(move || {
            let group = ProcessGroup::start(comm);
            if group.rank() == 2 {
                thread::sleep(Duration::from_millis(200));
            }
            let elapsed = [1.0, 7.5, 2.0][group.rank()];
            let mut out = Vec::new();
            let reduced = driver::report_run_time(&group, elapsed, &mut out).unwrap();
            group.end();
            (reduced, String::from_utf8(out).unwrap())
        }))
        .collect();

    for (rank, handle) in handles.into_iter().enumerate() {
        let (reduced, text) = handle.join().unwrap();
        if rank == 0 {
            assert_eq!(reduced, Some(7.5));
            assert_eq!(text, "Run time = 7.5\n");
        } else {
            assert_eq!(reduced, None);
            assert!(text.is_empty());
        }
    }
}

#[test]
fn shutdown_report_includes_arena_usage_only_when_tracked() {
    let group = ProcessGroup::start(LocalCommunicator::serial());
    let stats = RunStats::new();
    stats.add("coarse_time_step", 0.25);

    let coalescing = CoalescingArena::new();
    coalescing.alloc(10);

    let mut out = Vec::new();
    driver::report_shutdown(&group, &stats, &coalescing, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<_> = text.lines().collect();

    assert_eq!(lines[0], "CPU(0): run statistics");
    assert!(lines[1].contains("coarse_time_step"));
    assert_eq!(lines[2], "CPU(0): Heap Space (bytes) used by Coalescing FAB Arena: 80");
    assert!(lines[3].starts_with("Run time = "));

    let mut out = Vec::new();
    driver::report_shutdown(&group, &stats, &BasicArena, &mut out).unwrap();
    assert!(!String::from_utf8(out).unwrap().contains("Heap Space"));
}




// ============================================================================
#[test]
fn advection_run_from_input_file_writes_plot_files() {
    let dir = tempfile::tempdir().unwrap();
    let infile = dir.path().join("inputs");
    let prefix = dir.path().join("plt");

    writeln!(
        File::create(&infile).unwrap(),
        "# test run\nmax_step = 100\nstop_time = 10.0\namr.n_cell = 32 32\namr.max_grid_size = 16\namr.plot_file = \"{}\"",
        prefix.display()
    )
    .unwrap();

    let overrides = vec!["max_step=4".to_string(), "-amr.print_tags".to_string()];
    let handles: Vec<_> = LocalCommunicator::group(2)
        .into_iter()
        .map(|comm| {
            let infile = infile.clone();
            let overrides = overrides.clone();
            thread::spawn(move || {
                let group = ProcessGroup::start(comm);
                let pp = ParmParse::from_file_and_args(&infile, &overrides).unwrap();
                let arena: Arc<dyn Arena> = Arc::new(CoalescingArena::new());
                let stats = RunStats::new();
                let (rank, size) = (group.rank(), group.size());
                let make_engine = || AdvectionEngine::new(&pp, arena.clone(), stats.clone(), rank, size);
                let summary = driver::execute(&group, &pp, make_engine, &stats, arena.as_ref(), &mut Vec::new()).unwrap();
                group.end();
                summary
            })
        })
        .collect();

    let summaries: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(summaries[0], summaries[1]);
    assert_eq!(summaries[0].steps, 4);

    let mut num_patches = 0;
    for rank in 0..2 {
        let path = dir.path().join(format!("plt00004.{}.cbor", rank));
        let plot: PlotFile = ciborium::de::from_reader(File::open(path).unwrap()).unwrap();
        assert_eq!(plot.rank, rank);
        assert_eq!(plot.step, 4);
        num_patches += plot.patches.len();
    }
    assert_eq!(num_patches, 4);
}
