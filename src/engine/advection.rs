//! A reference engine: a scalar blob carried across the periodic unit square
//! at constant velocity by a first-order upwind scheme.
//!
//! The coarse level is decomposed into patches of at most
//! `amr.max_grid_size` cells per side. Every `amr.regrid_int` steps the
//! engine runs error estimation, tagging cells where the undivided gradient
//! exceeds `amr.tag_threshold` (plus a one-cell buffer ring), and records
//! the refined bounding box of each patch's tags as the grids of the next
//! level. Those grids are not integrated; they are reported in the plot
//! file.
//!
//! The coarse level is replicated on every rank of the process group, which
//! keeps the ranks in lock-step without exchanging field data; patch `k` is
//! owned by rank `k % size` for output purposes.
//!

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::AmrEngine;
use crate::arena::Arena;
use crate::diagnostics;
use crate::error::Error;
use crate::index_space::{range2d, CellIndex, IndexSpace};
use crate::parm_parse::ParmParse;
use crate::patch::Patch;
use crate::run_stats::RunStats;
use crate::tag_map::{Tag, TagMap, TagMapArray};

/// Parameters of the reference engine, read from the `amr.` and `adv.`
/// sections of the input.
///
#[derive(Clone, Debug)]
pub struct AdvectionConfig {
    pub n_cell: [i64; 2],
    pub max_grid_size: i64,
    pub regrid_int: u64,
    pub max_level: u32,
    pub ref_ratio: i64,
    pub tag_threshold: f64,
    pub print_tags: bool,
    pub plot_file: Option<String>,
    pub velocity: [f64; 2],
    pub cfl: f64,
}

impl Default for AdvectionConfig {
    fn default() -> Self {
        Self {
            n_cell: [64, 64],
            max_grid_size: 16,
            regrid_int: 2,
            max_level: 1,
            ref_ratio: 2,
            tag_threshold: 0.05,
            print_tags: false,
            plot_file: None,
            velocity: [1.0, 0.5],
            cfl: 0.8,
        }
    }
}

fn bad_parameter<T: ToString>(name: &str, value: T) -> Error {
    Error::BadParameter {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn pair<T: Copy + ToString>(name: &str, values: Option<Vec<T>>, default: [T; 2]) -> Result<[T; 2], Error> {
    match values.as_deref() {
        None => Ok(default),
        Some(&[x]) => Ok([x, x]),
        Some(&[x, y]) => Ok([x, y]),
        Some(other) => Err(bad_parameter(
            name,
            other.iter().map(ToString::to_string).collect::<Vec<_>>().join(" "),
        )),
    }
}

impl AdvectionConfig {
    pub fn from_parm(pp: &ParmParse) -> Result<Self, Error> {
        let amr = pp.with_prefix("amr");
        let adv = pp.with_prefix("adv");
        let d = Self::default();

        let config = Self {
            n_cell: pair("amr.n_cell", amr.query_all("n_cell")?, d.n_cell)?,
            max_grid_size: amr.query_or("max_grid_size", d.max_grid_size)?,
            regrid_int: amr.query_or("regrid_int", d.regrid_int)?,
            max_level: amr.query_or("max_level", d.max_level)?,
            ref_ratio: amr.query_or("ref_ratio", d.ref_ratio)?,
            tag_threshold: amr.query_or("tag_threshold", d.tag_threshold)?,
            print_tags: amr.contains("print_tags"),
            plot_file: amr.query("plot_file")?,
            velocity: pair("adv.velocity", adv.query_all("velocity")?, d.velocity)?,
            cfl: adv.query_or("cfl", d.cfl)?,
        };

        if config.n_cell.iter().any(|&n| n <= 0) {
            return Err(bad_parameter("amr.n_cell", format!("{} {}", config.n_cell[0], config.n_cell[1])));
        }
        if config.max_grid_size <= 0 {
            return Err(bad_parameter("amr.max_grid_size", config.max_grid_size));
        }
        if config.regrid_int == 0 {
            return Err(bad_parameter("amr.regrid_int", config.regrid_int));
        }
        if config.ref_ratio < 2 {
            return Err(bad_parameter("amr.ref_ratio", config.ref_ratio));
        }
        if !(config.cfl > 0.0 && config.cfl <= 1.0) {
            return Err(bad_parameter("adv.cfl", config.cfl));
        }
        Ok(config)
    }
}

/// Contents of a plot file: this rank's patches, plus the step, time and
/// next-level grids shared by all ranks.
///
#[derive(Debug, Serialize, Deserialize)]
pub struct PlotFile {
    pub step: u64,
    pub time: f64,
    pub rank: usize,
    pub domain: ([i64; 2], [i64; 2]),
    pub fine_grids: Vec<([i64; 2], [i64; 2])>,
    pub patches: Vec<PatchRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PatchRecord {
    pub lo: [i64; 2],
    pub hi: [i64; 2],
    pub data: Vec<f64>,
}

fn corners(space: &IndexSpace<2>) -> ([i64; 2], [i64; 2]) {
    (space.small_end().components(), space.big_end().components())
}

pub struct AdvectionEngine {
    config: AdvectionConfig,
    domain: IndexSpace<2>,
    blocks: [i64; 2],
    patches: Vec<Patch<2>>,
    fine_grids: Vec<IndexSpace<2>>,
    arena: Arc<dyn Arena>,
    stats: RunStats,
    rank: usize,
    size: usize,
    step: u64,
    time: f64,
    healthy: bool,
}

impl AdvectionEngine {
    pub fn new(pp: &ParmParse, arena: Arc<dyn Arena>, stats: RunStats, rank: usize, size: usize) -> Result<Self, Error> {
        Ok(Self::with_config(AdvectionConfig::from_parm(pp)?, arena, stats, rank, size))
    }

    pub fn with_config(config: AdvectionConfig, arena: Arc<dyn Arena>, stats: RunStats, rank: usize, size: usize) -> Self {
        let [n0, n1] = config.n_cell;
        let m = config.max_grid_size;

        Self {
            domain: range2d(0..n0, 0..n1),
            blocks: [(n0 + m - 1) / m, (n1 + m - 1) / m],
            config,
            patches: Vec::new(),
            fine_grids: Vec::new(),
            arena,
            stats,
            rank,
            size,
            step: 0,
            time: 0.0,
            healthy: true,
        }
    }

    pub fn patches(&self) -> &[Patch<2>] {
        &self.patches
    }

    pub fn fine_grids(&self) -> &[IndexSpace<2>] {
        &self.fine_grids
    }

    /// The integral of the field over the domain.
    pub fn total(&self) -> f64 {
        let (dx, dy) = self.cell_spacing();
        self.patches.iter().flat_map(|p| p.data().iter()).sum::<f64>() * dx * dy
    }

    fn cell_spacing(&self) -> (f64, f64) {
        (1.0 / self.config.n_cell[0] as f64, 1.0 / self.config.n_cell[1] as f64)
    }

    fn cell_center(&self, index: CellIndex<2>) -> (f64, f64) {
        let (dx, dy) = self.cell_spacing();
        ((index[0] as f64 + 0.5) * dx, (index[1] as f64 + 0.5) * dy)
    }

    /// Field value at any index, wrapped periodically into the domain.
    fn value(&self, i: i64, j: i64) -> f64 {
        let [n0, n1] = self.config.n_cell;
        let m = self.config.max_grid_size;
        let (i, j) = (i.rem_euclid(n0), j.rem_euclid(n1));
        let k = (i / m) * self.blocks[1] + j / m;

        self.patches[k as usize].get(CellIndex::new([i, j]))
    }

    fn upwind(&self, index: CellIndex<2>, dt: f64) -> f64 {
        let (dx, dy) = self.cell_spacing();
        let [vx, vy] = self.config.velocity;
        let [i, j] = index.components();
        let u = self.value(i, j);

        let du_x = if vx >= 0.0 { u - self.value(i - 1, j) } else { self.value(i + 1, j) - u };
        let du_y = if vy >= 0.0 { u - self.value(i, j - 1) } else { self.value(i, j + 1) - u };

        u - vx * dt / dx * du_x - vy * dt / dy * du_y
    }

    fn estimate_dt(&self) -> f64 {
        let (dx, dy) = self.cell_spacing();
        let [vx, vy] = self.config.velocity;
        let rate = vx.abs() / dx + vy.abs() / dy;

        if rate > 0.0 {
            self.config.cfl / rate
        } else {
            self.config.cfl * dx.min(dy)
        }
    }

    fn error_estimate(&self) -> TagMapArray<2> {
        let threshold = self.config.tag_threshold;

        self.patches
            .iter()
            .map(|patch| {
                let space = *patch.index_space();
                let set = TagMap::from_function(space, |c| {
                    let [i, j] = c.components();
                    let gx = 0.5 * (self.value(i + 1, j) - self.value(i - 1, j)).abs();
                    let gy = 0.5 * (self.value(i, j + 1) - self.value(i, j - 1)).abs();
                    if gx.max(gy) > threshold { Tag::SET } else { Tag::CLEAR }
                });
                TagMap::from_function(space, |c| {
                    if set.get(c).is_tagged() {
                        Tag::SET
                    } else if IndexSpace::new(c, c)
                        .extend_all(1)
                        .iter()
                        .any(|n| space.contains(n) && set.get(n).is_tagged())
                    {
                        Tag::BUFFER
                    } else {
                        Tag::CLEAR
                    }
                })
            })
            .collect()
    }

    fn regrid(&mut self) -> Result<(), Error> {
        let timer = self.stats.start("regrid");
        let tags = {
            let timer = self.stats.start("error_estimate");
            let tags = self.error_estimate();
            timer.stop();
            tags
        };
        let ratio = self.config.ref_ratio;

        self.fine_grids = tags
            .iter()
            .filter_map(|map| IndexSpace::bounding(map.tagged_cells()))
            .map(|b| b.refine(ratio))
            .collect();

        if self.config.print_tags && self.rank == 0 {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            diagnostics::print_tag_array(&tags, &mut out)
                .and_then(|_| diagnostics::print_box_array(&self.fine_grids, &mut out))
                .map_err(|e| Error::io("<stdout>", e))?;
        } else {
            debug!("step {}: {} tagged cells, {} fine grids", self.step, tags.num_tagged(), self.fine_grids.len());
        }
        timer.stop();
        Ok(())
    }

    fn plot_file_path(&self, prefix: &str) -> PathBuf {
        PathBuf::from(format!("{}{:05}.{}.cbor", prefix, self.step, self.rank))
    }

    fn write_plot_file(&self, prefix: &str) -> Result<PathBuf, Error> {
        let plot = PlotFile {
            step: self.step,
            time: self.time,
            rank: self.rank,
            domain: corners(&self.domain),
            fine_grids: self.fine_grids.iter().map(corners).collect(),
            patches: self
                .patches
                .iter()
                .enumerate()
                .filter(|(k, _)| k % self.size == self.rank)
                .map(|(_, p)| {
                    let (lo, hi) = corners(p.index_space());
                    PatchRecord { lo, hi, data: p.data().to_vec() }
                })
                .collect(),
        };
        let path = self.plot_file_path(prefix);
        let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        let mut buffer = BufWriter::new(file);

        ciborium::ser::into_writer(&plot, &mut buffer).map_err(|e| Error::Encode(format!("{:?}", e)))?;
        buffer.flush().map_err(|e| Error::io(&path, e))?;
        Ok(path)
    }
}

impl AmrEngine for AdvectionEngine {
    fn init(&mut self, strt_time: f64, _stop_time: Option<f64>) -> Result<(), Error> {
        let m = self.config.max_grid_size;
        let [n0, n1] = self.config.n_cell;

        self.step = 0;
        self.time = strt_time;

        let patches = range2d(0..self.blocks[0], 0..self.blocks[1])
            .iter()
            .map(|b| {
                let [bi, bj] = b.components();
                IndexSpace::from_corners([bi * m, bj * m], [((bi + 1) * m).min(n0) - 1, ((bj + 1) * m).min(n1) - 1])
            })
            .map(|space| {
                Patch::from_function(self.arena.as_ref(), 0, space, |c| {
                    let (x, y) = self.cell_center(c);
                    f64::exp(-((x - 0.5).powi(2) + (y - 0.5).powi(2)) / 0.01)
                })
            })
            .collect();
        self.patches = patches;

        info!(
            "initialized {} patches on domain {} at t = {}",
            self.patches.len(),
            self.domain,
            self.time
        );
        if self.config.max_level > 0 {
            self.regrid()?;
        }
        Ok(())
    }

    fn coarse_time_step(&mut self, stop_time: Option<f64>) -> Result<(), Error> {
        if self.patches.is_empty() {
            return Err(Error::Engine("coarse_time_step called before init".to_string()));
        }
        let timer = self.stats.start("coarse_time_step");

        if self.config.max_level > 0 && self.step > 0 && self.step % self.config.regrid_int == 0 {
            self.regrid()?;
        }

        let mut dt = self.estimate_dt();
        let mut reaches_stop = false;

        if let Some(stop) = stop_time {
            if self.time + dt >= stop {
                dt = stop - self.time;
                reaches_stop = true;
            }
        }

        let arena = self.arena.clone();
        let mut buffers: Vec<_> = self.patches.iter().map(|p| arena.alloc(p.index_space().len())).collect();
        {
            let this = &*self;
            buffers
                .par_iter_mut()
                .zip(this.patches.par_iter())
                .for_each(|(buffer, patch)| {
                    for (x, index) in buffer.iter_mut().zip(patch.index_space().iter()) {
                        *x = this.upwind(index, dt)
                    }
                });
        }
        for (patch, buffer) in self.patches.iter_mut().zip(buffers) {
            patch.replace_data(arena.as_ref(), buffer)
        }

        self.step += 1;
        self.time = match (reaches_stop, stop_time) {
            (true, Some(stop)) => stop,
            _ => self.time + dt,
        };
        self.healthy = self.patches.iter().all(|p| p.data().iter().all(|x| x.is_finite()));

        if !self.healthy {
            warn!("field is no longer finite at step {}", self.step);
        }
        let seconds = timer.stop();
        debug!("[{}] t={:.6} dt={:.3e} ({:.4}s)", self.step, self.time, dt, seconds);
        Ok(())
    }

    fn level_steps(&self, level: usize) -> u64 {
        if level == 0 {
            self.step
        } else {
            0
        }
    }

    fn cum_time(&self) -> f64 {
        self.time
    }

    fn ok_to_continue(&self) -> bool {
        self.healthy
    }

    fn finish(&mut self) -> Result<(), Error> {
        let result = match (&self.config.plot_file, self.patches.is_empty()) {
            (Some(prefix), false) => self.write_plot_file(prefix).map(|path| {
                info!("wrote {}", path.display());
            }),
            _ => Ok(()),
        };
        for patch in self.patches.drain(..) {
            patch.release(self.arena.as_ref())
        }
        result
    }
}
