// src/config.rs
//
// Solver settings, name parsing for the operator kinds, and the run record
// that the drivers write next to their output.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use crate::error::MgError;
use crate::grid::GridGeometry;

// ---------------------------
// Operator kinds
// ---------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmootherKind {
    /// Weighted Jacobi (uses `MgConfig::omega`).
    Jacobi,
    /// Red-black Gauss-Seidel.
    GaussSeidel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    V,
    W,
    /// Full multigrid on the first cycle, V-cycles afterwards.
    Fmg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictorKind {
    HalfWeight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProlongatorKind {
    /// Bilinear in 2D, trilinear in 3D.
    Bilinear,
}

fn normalize(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .collect::<String>()
        .to_ascii_lowercase()
}

impl FromStr for SmootherKind {
    type Err = MgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "mggs" | "gs" | "gaussseidel" | "rbgs" | "redblack" | "redblackgs" => {
                Ok(Self::GaussSeidel)
            }
            "mgjacob" | "jacob" | "jacobi" | "wjacobi" | "weightedjacobi" => Ok(Self::Jacobi),
            _ => Err(MgError::config(format!("unknown smoother '{s}'"))),
        }
    }
}

impl FromStr for CycleKind {
    type Err = MgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "mgvregular" | "mgvrecursive" | "v" | "vcycle" => Ok(Self::V),
            "mgw" | "w" | "wcycle" => Ok(Self::W),
            "mgfmg" | "fmg" | "fullmultigrid" => Ok(Self::Fmg),
            _ => Err(MgError::config(format!("unknown multigrid cycle '{s}'"))),
        }
    }
}

impl FromStr for RestrictorKind {
    type Err = MgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "halfweight" | "half" | "mghalfrestrict" => Ok(Self::HalfWeight),
            _ => Err(MgError::config(format!("unknown restrictor '{s}'"))),
        }
    }
}

impl FromStr for ProlongatorKind {
    type Err = MgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "bilinear" | "trilinear" | "linear" | "mgbilinprol" => Ok(Self::Bilinear),
            _ => Err(MgError::config(format!("unknown prolongator '{s}'"))),
        }
    }
}

// ---------------------------
// Solver configuration
// ---------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MgConfig {
    /// Number of grid levels including the finest. 1 disables coarsening.
    pub levels: usize,
    /// Cycles per solve. There is no tolerance stop.
    pub cycles: usize,
    /// Sweeps before restricting.
    pub pre_smooth: usize,
    /// Sweeps after correcting.
    pub post_smooth: usize,
    /// Sweeps on the coarsest level.
    pub coarse_solve: usize,

    pub pre_smoother: SmootherKind,
    pub post_smoother: SmootherKind,
    pub coarse_smoother: SmootherKind,

    pub cycle: CycleKind,
    pub restrictor: RestrictorKind,
    pub prolongator: ProlongatorKind,

    /// Weighted Jacobi relaxation parameter (0 < omega <= 1).
    pub omega: f64,

    /// Remove the mean when no face is Dirichlet.
    pub neutralize: bool,

    /// Record the residual L1 norm after every cycle (one extra residual
    /// evaluation and reduction per cycle).
    pub monitor: bool,
}

impl Default for MgConfig {
    fn default() -> Self {
        Self {
            levels: 3,
            cycles: 10,
            pre_smooth: 2,
            post_smooth: 2,
            coarse_solve: 50,
            pre_smoother: SmootherKind::GaussSeidel,
            post_smoother: SmootherKind::GaussSeidel,
            coarse_smoother: SmootherKind::GaussSeidel,
            cycle: CycleKind::V,
            restrictor: RestrictorKind::HalfWeight,
            prolongator: ProlongatorKind::Bilinear,
            omega: 2.0 / 3.0,
            neutralize: true,
            monitor: false,
        }
    }
}

impl MgConfig {
    /// Defaults overlaid with `PIC_MG_*` environment variables.
    pub fn from_env() -> Result<Self, MgError> {
        Self::default().with_env()
    }

    /// Overlay `PIC_MG_*` environment variables on `self`.
    ///
    /// Unset variables keep the current value; malformed ones are errors.
    pub fn with_env(mut self) -> Result<Self, MgError> {
        fn get<T: FromStr>(name: &str) -> Result<Option<T>, MgError> {
            match std::env::var(name) {
                Ok(s) => s
                    .trim()
                    .parse::<T>()
                    .map(Some)
                    .map_err(|_| MgError::config(format!("{name}: cannot parse '{s}'"))),
                Err(_) => Ok(None),
            }
        }
        fn get_kind<T: FromStr<Err = MgError>>(name: &str) -> Result<Option<T>, MgError> {
            match std::env::var(name) {
                Ok(s) => s
                    .parse::<T>()
                    .map(Some)
                    .map_err(|e| MgError::config(format!("{name}: {e}"))),
                Err(_) => Ok(None),
            }
        }
        fn get_bool(name: &str) -> Result<Option<bool>, MgError> {
            match std::env::var(name) {
                Ok(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => Ok(Some(true)),
                    "0" | "false" | "no" | "off" => Ok(Some(false)),
                    _ => Err(MgError::config(format!("{name}: expected a boolean, got '{s}'"))),
                },
                Err(_) => Ok(None),
            }
        }

        if let Some(v) = get("PIC_MG_LEVELS")? {
            self.levels = v;
        }
        if let Some(v) = get("PIC_MG_CYCLES")? {
            self.cycles = v;
        }
        if let Some(v) = get("PIC_MG_PRE_SMOOTH")? {
            self.pre_smooth = v;
        }
        if let Some(v) = get("PIC_MG_POST_SMOOTH")? {
            self.post_smooth = v;
        }
        if let Some(v) = get("PIC_MG_COARSE_SOLVE")? {
            self.coarse_solve = v;
        }

        // one name for all roles, then per-role overrides
        if let Some(v) = get_kind::<SmootherKind>("PIC_MG_SMOOTHER")? {
            self.pre_smoother = v;
            self.post_smoother = v;
            self.coarse_smoother = v;
        }
        if let Some(v) = get_kind("PIC_MG_PRE_SMOOTHER")? {
            self.pre_smoother = v;
        }
        if let Some(v) = get_kind("PIC_MG_POST_SMOOTHER")? {
            self.post_smoother = v;
        }
        if let Some(v) = get_kind("PIC_MG_COARSE_SMOOTHER")? {
            self.coarse_smoother = v;
        }

        if let Some(v) = get_kind("PIC_MG_CYCLE")? {
            self.cycle = v;
        }
        if let Some(v) = get_kind("PIC_MG_RESTRICTOR")? {
            self.restrictor = v;
        }
        if let Some(v) = get_kind("PIC_MG_PROLONGATOR")? {
            self.prolongator = v;
        }
        if let Some(v) = get("PIC_MG_OMEGA")? {
            self.omega = v;
        }
        if let Some(v) = get_bool("PIC_MG_NEUTRALIZE")? {
            self.neutralize = v;
        }
        if let Some(v) = get_bool("PIC_MG_MONITOR")? {
            self.monitor = v;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), MgError> {
        if self.levels == 0 {
            return Err(MgError::config("multigrid needs at least one level"));
        }
        if self.cycles == 0 {
            return Err(MgError::config("at least one cycle per solve is required"));
        }
        if !(self.omega.is_finite() && self.omega > 0.0 && self.omega <= 1.0) {
            return Err(MgError::config(format!(
                "Jacobi weight must lie in (0, 1], got {}",
                self.omega
            )));
        }
        Ok(())
    }
}

// ---------------------------
// Run record
// ---------------------------

/// Everything needed to reproduce a driver run, written as `config.json`.
#[derive(Debug, Serialize)]
pub struct RunConfig {
    pub geometry: GridGeometry,
    pub multigrid: MgConfig,
    pub problem: ProblemConfig,
    pub run: RunInfo,
}

#[derive(Debug, Serialize)]
pub struct ProblemConfig {
    /// Human-readable description of the right-hand side.
    pub description: String,
    /// Ranks per axis (all ones for a serial run).
    pub ranks_per_axis: Vec<usize>,
}

#[derive(Debug, Serialize)]
pub struct RunInfo {
    pub binary: String,
    pub run_id: String,

    // Optional provenance
    pub git_commit: Option<String>,
    pub timestamp_utc: Option<String>,
}

impl RunConfig {
    pub fn write_to_dir(&self, out_dir: &Path) -> std::io::Result<()> {
        let path = out_dir.join("config.json");
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
