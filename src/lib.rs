//! Amrdrive is the top-level driver for a time-dependent adaptive mesh
//! refinement (AMR) simulation. It reads run parameters from an input file
//! and the command line, constructs an engine that owns the level hierarchy,
//! advances the coarse level until a step or time bound is reached, and
//! reports run statistics and wall time across a process group. Rectangular
//! index spaces, tag maps and their diagnostics are the vocabulary shared
//! with the engine's regridding.

pub mod arena;
pub mod diagnostics;
pub mod driver;
pub mod engine;
pub mod error;
pub mod index_space;
pub mod message;
pub mod parallel;
pub mod parm_parse;
pub mod patch;
pub mod run_stats;
pub mod tag_map;
