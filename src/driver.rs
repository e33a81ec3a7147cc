//! The run controller: resolves the run parameters, drives the coarse time
//! step loop of an `AmrEngine` until a stopping criterion is met, and
//! reports run statistics, arena usage and wall time at shutdown.
//!

use std::io::{self, Write};
use std::ops::{Deref, DerefMut};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::arena::Arena;
use crate::engine::AmrEngine;
use crate::error::Error;
use crate::message::comm::Communicator;
use crate::parallel::ProcessGroup;
use crate::parm_parse::ParmParse;
use crate::run_stats::RunStats;

/// Run parameters, resolved once before the engine is built. A bound of
/// `None` means the run is not limited in that dimension; at least one of
/// `max_step` and `stop_time` is always set.
///
#[derive(Clone, Debug, PartialEq)]
pub struct RunParams {
    pub max_step: Option<u64>,
    pub strt_time: f64,
    pub stop_time: Option<f64>,
    pub sleep: Duration,
}

impl RunParams {
    /// Validate a set of bounds.
    ///
    pub fn new(max_step: Option<u64>, strt_time: f64, stop_time: Option<f64>) -> Result<Self, Error> {
        if strt_time < 0.0 {
            return Err(Error::NegativeStartTime(strt_time));
        }
        if max_step.is_none() && stop_time.is_none() {
            return Err(Error::NoStoppingCriterion);
        }
        Ok(Self {
            max_step,
            strt_time,
            stop_time,
            sleep: Duration::from_secs(0),
        })
    }

    /// Read `max_step`, `strt_time`, `stop_time` and `sleep` from the
    /// parameter table. A negative `max_step` or `stop_time` (the defaults)
    /// leaves that bound unset.
    ///
    pub fn from_parm(pp: &ParmParse) -> Result<Self, Error> {
        let max_step: i64 = pp.query_or("max_step", -1)?;
        let strt_time: f64 = pp.query_or("strt_time", 0.0)?;
        let stop_time: f64 = pp.query_or("stop_time", -1.0)?;
        let sleep: i64 = pp.query_or("sleep", 0)?;

        let max_step = if max_step < 0 { None } else { Some(max_step as u64) };
        let stop_time = if stop_time < 0.0 { None } else { Some(stop_time) };

        Ok(Self {
            sleep: Duration::from_secs(sleep.max(0) as u64),
            ..Self::new(max_step, strt_time, stop_time)?
        })
    }
}

/// Life cycle of a run.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Uninitialized,
    Running,
    Terminated,
}

/// What the step loop achieved.
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunSummary {
    pub steps: u64,
    pub time: f64,
}

/// Owns an engine for the duration of a run. `close` performs the engine's
/// final output and gives back its result; if the handle is dropped without
/// being closed (for example while an error propagates), the final output
/// still happens and any failure is logged.
///
pub struct EngineHandle<E: AmrEngine> {
    engine: E,
    closed: bool,
}

impl<E: AmrEngine> EngineHandle<E> {
    pub fn new(engine: E) -> Self {
        Self { engine, closed: false }
    }

    pub fn close(mut self) -> Result<(), Error> {
        self.closed = true;
        self.engine.finish()
    }
}

impl<E: AmrEngine> Deref for EngineHandle<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.engine
    }
}

impl<E: AmrEngine> DerefMut for EngineHandle<E> {
    fn deref_mut(&mut self) -> &mut E {
        &mut self.engine
    }
}

impl<E: AmrEngine> Drop for EngineHandle<E> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.engine.finish() {
                warn!("final output failed: {}", e);
            }
        }
    }
}

/// Drives the coarse time step loop.
///
pub struct Controller {
    params: RunParams,
    state: RunState,
}

impl Controller {
    pub fn new(params: RunParams) -> Self {
        Self {
            params,
            state: RunState::Uninitialized,
        }
    }

    pub fn params(&self) -> &RunParams {
        &self.params
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// The loop condition: the engine is healthy, and neither the step bound
    /// nor the time bound (where set) has been reached.
    ///
    pub fn keep_going<E: AmrEngine>(&self, engine: &E) -> bool {
        engine.ok_to_continue()
            && self.params.max_step.map_or(true, |max| engine.level_steps(0) < max)
            && self.params.stop_time.map_or(true, |stop| engine.cum_time() < stop)
    }

    /// Build the engine, initialize it, advance it until `keep_going` fails
    /// and then close it. The engine's final output is complete when this
    /// returns.
    ///
    pub fn run<E, F>(&mut self, make_engine: F) -> Result<RunSummary, Error>
    where
        E: AmrEngine,
        F: FnOnce() -> Result<E, Error>,
    {
        let mut engine = EngineHandle::new(make_engine()?);
        engine.init(self.params.strt_time, self.params.stop_time)?;

        self.state = RunState::Running;
        info!("running from t = {} (max_step = {:?}, stop_time = {:?})", engine.cum_time(), self.params.max_step, self.params.stop_time);

        while self.keep_going(&*engine) {
            engine.coarse_time_step(self.params.stop_time)?;
            debug!("coarse step {} reached t = {}", engine.level_steps(0), engine.cum_time());
        }

        if !engine.ok_to_continue() {
            warn!("engine stopped the run at step {}", engine.level_steps(0));
        }
        let summary = RunSummary {
            steps: engine.level_steps(0),
            time: engine.cum_time(),
        };
        engine.close()?;

        self.state = RunState::Terminated;
        info!("run terminated after {} steps at t = {}", summary.steps, summary.time);
        Ok(summary)
    }
}

/// Reduce the elapsed wall time to its maximum over all ranks, and have the
/// I/O processor print it. Returns the reduced value on the I/O processor.
///
pub fn report_run_time<C, W>(group: &ProcessGroup<C>, elapsed: f64, out: &mut W) -> io::Result<Option<f64>>
where
    C: Communicator,
    W: Write,
{
    let run_time = group.reduce_real_max(elapsed);

    if let (true, Some(t)) = (group.is_io_processor(), run_time) {
        writeln!(out, "Run time = {}", t)?;
    }
    Ok(run_time)
}

/// Write the shutdown report. This must follow the engine's final output.
/// The statistics report comes first; then, only for arenas that track
/// heap space, a barrier and each rank's arena usage; and finally the run
/// time.
///
pub fn report_shutdown<C, W>(group: &ProcessGroup<C>, stats: &RunStats, arena: &dyn Arena, out: &mut W) -> Result<Option<f64>, Error>
where
    C: Communicator,
    W: Write,
{
    let to_error = |e| Error::io("<output>", e);

    stats.report(group.rank(), out).map_err(to_error)?;

    if let Some(bytes) = arena.heap_space_used() {
        group.barrier();
        writeln!(out, "CPU({}): Heap Space (bytes) used by Coalescing FAB Arena: {}", group.rank(), bytes).map_err(to_error)?;
    }
    report_run_time(group, group.second(), out).map_err(to_error)
}

/// Resolve the run parameters, run the engine built by `make_engine`, and
/// write the shutdown report. Invalid parameters are reported before the
/// engine is built.
///
pub fn execute<C, E, F, W>(
    group: &ProcessGroup<C>,
    pp: &ParmParse,
    make_engine: F,
    stats: &RunStats,
    arena: &dyn Arena,
    out: &mut W,
) -> Result<RunSummary, Error>
where
    C: Communicator,
    E: AmrEngine,
    F: FnOnce() -> Result<E, Error>,
    W: Write,
{
    let params = RunParams::from_parm(pp)?;

    if params.sleep > Duration::from_secs(0) {
        info!("rank {} sleeping for {:?}", group.rank(), params.sleep);
        thread::sleep(params.sleep);
    }

    let summary = Controller::new(params).run(make_engine)?;
    report_shutdown(group, stats, arena, out)?;
    Ok(summary)
}

/// The command line usage text.
///
pub fn usage(program: &str) -> String {
    format!(
        "usage:\n\
         {} [--rank <n> --peers <addr,...> | --local-ranks <n>] infile [options]\n\
         \tOptions:\n\
         \t     [<root>.]<var>  = <val_list>\n\
         \tor  -[<root>.]<var>\n\
         \t where:\n\
         \t    <root>     =  class name of variable\n\
         \t    <var>      =  variable name\n\
         \t    <val_list> =  list of values\n",
        program
    )
}

#[cfg(test)]
mod test {
    use super::{Controller, EngineHandle, RunParams, RunState};
    use crate::engine::AmrEngine;
    use crate::error::Error;
    use crate::parm_parse::ParmParse;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Counter {
        steps: u64,
        finished: Rc<Cell<u32>>,
    }

    impl AmrEngine for Counter {
        fn init(&mut self, _: f64, _: Option<f64>) -> Result<(), Error> {
            Ok(())
        }
        fn coarse_time_step(&mut self, _: Option<f64>) -> Result<(), Error> {
            self.steps += 1;
            if self.steps == 2 { Err(Error::Engine("blew up".into())) } else { Ok(()) }
        }
        fn level_steps(&self, _: usize) -> u64 {
            self.steps
        }
        fn cum_time(&self) -> f64 {
            0.0
        }
        fn ok_to_continue(&self) -> bool {
            true
        }
        fn finish(&mut self) -> Result<(), Error> {
            self.finished.set(self.finished.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn negative_sentinels_become_unbounded() {
        let pp = ParmParse::parse("max_step = 10 sleep = 2").unwrap();
        let params = RunParams::from_parm(&pp).unwrap();
        assert_eq!(params.max_step, Some(10));
        assert_eq!(params.stop_time, None);
        assert_eq!(params.strt_time, 0.0);
        assert_eq!(params.sleep.as_secs(), 2);
    }

    #[test]
    fn zero_is_a_bound() {
        let params = RunParams::from_parm(&ParmParse::parse("stop_time = 0.0").unwrap()).unwrap();
        assert_eq!(params.stop_time, Some(0.0));
    }

    #[test]
    fn unparseable_bound_is_rejected() {
        assert!(matches!(
            RunParams::from_parm(&ParmParse::parse("max_step = 1.5").unwrap()),
            Err(Error::BadParameter { .. })
        ));
    }

    #[test]
    fn engine_error_still_runs_final_output() {
        let finished = Rc::new(Cell::new(0));
        let engine = Counter { steps: 0, finished: finished.clone() };
        let mut controller = Controller::new(RunParams::new(Some(5), 0.0, None).unwrap());

        assert!(controller.run(|| Ok(engine)).is_err());
        assert_eq!(finished.get(), 1);
        assert_eq!(controller.state(), RunState::Running);
    }

    #[test]
    fn closed_handle_finishes_once() {
        let finished = Rc::new(Cell::new(0));
        let handle = EngineHandle::new(Counter { steps: 0, finished: finished.clone() });
        handle.close().unwrap();
        assert_eq!(finished.get(), 1);
    }
}
