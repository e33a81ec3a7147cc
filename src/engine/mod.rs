//! The interface between the run controller and the simulation engine that
//! owns the level hierarchy, plus the reference engine the binary runs.
//!

pub mod advection;

use crate::error::Error;

/// A time-dependent AMR solver, seen from the driver. The driver owns one
/// engine for the whole run and only ever advances the coarsest level; any
/// sub-cycling of finer levels and regridding happen inside
/// `coarse_time_step`.
///
/// In a multi-rank run every method is treated as a collective operation.
///
pub trait AmrEngine {
    /// Set up the initial level hierarchy at `strt_time`. `stop_time` is
    /// `None` when the run is not time-bounded.
    fn init(&mut self, strt_time: f64, stop_time: Option<f64>) -> Result<(), Error>;

    /// Advance the coarse level by one time step, not passing `stop_time`.
    fn coarse_time_step(&mut self, stop_time: Option<f64>) -> Result<(), Error>;

    /// Number of steps taken so far on the given level.
    fn level_steps(&self, level: usize) -> u64;

    /// Simulated time reached by the coarse level.
    fn cum_time(&self) -> f64;

    /// Return false if the engine can no longer make progress.
    fn ok_to_continue(&self) -> bool;

    /// Write whatever final output the engine produces at the end of a run.
    fn finish(&mut self) -> Result<(), Error>;
}
