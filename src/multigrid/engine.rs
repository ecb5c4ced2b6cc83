// src/multigrid/engine.rs

use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::config::{CycleKind, MgConfig};
use crate::domain::Domain;
use crate::error::MgError;
use crate::grid::{Grid, GridGeometry};

use super::hierarchy::Hierarchy;
use super::residual::{residual, residual_l1};
use super::schedule::{Direction, Op, Schedule, Step};
use super::smoother::Smoother;
use super::transfer::{Prolongator, Restrictor};

/// Operators resolved once from the configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Operators {
    pub pre: Smoother,
    pub post: Smoother,
    pub coarse: Smoother,
    pub restrictor: Restrictor,
    pub prolongator: Prolongator,
}

impl Operators {
    pub fn from_config(cfg: &MgConfig) -> Self {
        Self {
            pre: Smoother::from_kind(cfg.pre_smoother, cfg.omega),
            post: Smoother::from_kind(cfg.post_smoother, cfg.omega),
            coarse: Smoother::from_kind(cfg.coarse_smoother, cfg.omega),
            restrictor: cfg.restrictor.into(),
            prolongator: cfg.prolongator.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub cycles: usize,
    pub elapsed: Duration,
    /// Global residual L1 norm after each cycle, when monitoring is enabled.
    pub residual_l1: Vec<f64>,
}

/// Geometric multigrid solver for `L phi = rho` on one rank's subdomain.
#[derive(Debug, Clone)]
pub struct MgSolver {
    cfg: MgConfig,
    ops: Operators,
    hier: Hierarchy,
    /// Schedules of the first and of every later cycle; `None` for a single level.
    schedules: Option<(Schedule, Schedule)>,
    neutralize: bool,
}

impl MgSolver {
    /// Validate `cfg` against `finest` and allocate every coarse level.
    pub fn new(finest: &GridGeometry, cfg: MgConfig) -> Result<Self, MgError> {
        cfg.validate()?;
        let hier = Hierarchy::build(finest, cfg.levels)?;
        let ops = Operators::from_config(&cfg);
        // FMG runs on the first cycle of a solve only, later cycles are V-cycles
        let schedules = if cfg.levels > 1 {
            let repeat = match cfg.cycle {
                CycleKind::Fmg => Schedule::v(cfg.levels)?,
                kind => Schedule::for_kind(kind, cfg.levels)?,
            };
            Some((Schedule::for_kind(cfg.cycle, cfg.levels)?, repeat))
        } else {
            None
        };
        let neutralize = cfg.neutralize && finest.needs_neutralization();
        if schedules.is_none() {
            warn!(
                "multigrid with a single level: each cycle is {} plain {:?} sweeps",
                cfg.pre_smooth + cfg.post_smooth,
                ops.coarse
            );
        }

        info!(
            "multigrid: {} levels, {:?} cycle, true extents {:?} -> {:?}, neutralize={}",
            cfg.levels,
            cfg.cycle,
            finest.true_size,
            hier.geometry(hier.n_levels() - 1).true_size,
            neutralize
        );

        Ok(Self {
            cfg,
            ops,
            hier,
            schedules,
            neutralize,
        })
    }

    pub fn config(&self) -> &MgConfig {
        &self.cfg
    }

    pub fn operators(&self) -> &Operators {
        &self.ops
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hier
    }

    /// True when the solver subtracts the mean (no Dirichlet face, enabled in config).
    pub fn neutralizes(&self) -> bool {
        self.neutralize
    }

    /// Run `cfg.cycles` cycles on `phi`, using its current values as the
    /// initial guess. Every cycle kind only subtracts corrections from `phi`;
    /// FMG solves for the correction of the initial guess on the coarse
    /// levels, so a converged `phi` stays put.
    ///
    /// `rho` is read-only and only its true nodes are read. Without a
    /// Dirichlet face it must be balanced by the caller, e.g. with
    /// [`Domain::neutralize`]; an unbalanced source has no solution and the
    /// residual stalls at its imbalance. On return the ghosts of
    /// `phi` are consistent with its neighbours and boundaries. Collective
    /// over all ranks of `domain`.
    pub fn solve<D: Domain + ?Sized>(
        &mut self,
        phi: &mut Grid,
        rho: &Grid,
        domain: &mut D,
    ) -> Result<SolveReport, MgError> {
        self.check_field("phi", phi)?;
        self.check_field("rho", rho)?;

        let start = Instant::now();
        let mut residuals = Vec::new();

        for cycle in 0..self.cfg.cycles {
            if let Some((first, repeat)) = &self.schedules {
                let schedule = if cycle == 0 { first } else { repeat };
                for &step in schedule.steps() {
                    trace!("cycle {cycle}: {step:?}");
                    run_step(
                        &self.cfg,
                        &self.ops,
                        self.neutralize,
                        &mut self.hier,
                        step,
                        phi,
                        rho,
                        domain,
                    )?;
                }
            } else {
                self.relax_single_level(phi, rho, domain)?;
            }

            if self.cfg.monitor {
                let res = &mut self.hier.scratch_mut(0).res;
                residuals.push(residual_l1(phi, rho, res, domain)?);
            }
        }

        let report = SolveReport {
            cycles: self.cfg.cycles,
            elapsed: start.elapsed(),
            residual_l1: residuals,
        };
        debug!(
            "multigrid solve: {} cycles in {:.3} ms, final residual {:?}",
            report.cycles,
            report.elapsed.as_secs_f64() * 1e3,
            report.residual_l1.last()
        );
        Ok(report)
    }

    /// Local residual `L phi - rho` of the finest level, written into `res`.
    /// Returns the local L1 sum.
    pub fn finest_residual(&self, phi: &Grid, rho: &Grid, res: &mut Grid) -> Result<f64, MgError> {
        self.check_field("phi", phi)?;
        self.check_field("rho", rho)?;
        self.check_field("res", res)?;
        Ok(residual(phi, rho, res))
    }

    fn relax_single_level<D: Domain + ?Sized>(
        &mut self,
        phi: &mut Grid,
        rho: &Grid,
        domain: &mut D,
    ) -> Result<(), MgError> {
        let sweeps = self.cfg.pre_smooth + self.cfg.post_smooth;
        let tmp = &mut self.hier.scratch_mut(0).tmp;
        domain.refresh(phi)?;
        self.ops.coarse.smooth(phi, rho, tmp, sweeps, domain)?;
        if self.neutralize {
            domain.neutralize(phi)?;
        }
        Ok(())
    }

    fn check_field(&self, name: &str, grid: &Grid) -> Result<(), MgError> {
        let expect = self.hier.geometry(0);
        if grid.geometry().same_layout(expect) {
            Ok(())
        } else {
            Err(MgError::GeometryMismatch(format!(
                "{name}: true size {:?} / ghosts {:?} / {} values, solver built for {:?} / {:?} / {}",
                grid.geometry().true_size,
                grid.geometry().ghosts,
                grid.geometry().n_values,
                expect.true_size,
                expect.ghosts,
                expect.n_values
            )))
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_step<D: Domain + ?Sized>(
    cfg: &MgConfig,
    ops: &Operators,
    neutralize: bool,
    hier: &mut Hierarchy,
    step: Step,
    phi0: &mut Grid,
    rho0: &Grid,
    domain: &mut D,
) -> Result<(), MgError> {
    let l = step.level;
    match (step.op, step.direction) {
        (Op::Smooth, Direction::Descend) => {
            let v = hier.level(l, phi0, rho0);
            domain.refresh(v.phi)?;
            ops.pre.smooth(v.phi, v.rho, v.tmp, cfg.pre_smooth, domain)?;
        }
        (Op::Smooth, Direction::Ascend) => {
            let v = hier.level(l, phi0, rho0);
            ops.post.smooth(v.phi, v.rho, v.tmp, cfg.post_smooth, domain)?;
            if neutralize {
                domain.neutralize(v.phi)?;
            }
        }
        (Op::RestrictResidual, _) => {
            let (v, next) = hier.with_coarser(l, phi0, rho0);
            residual(v.phi, v.rho, v.res);
            domain.refresh(v.res)?;
            ops.restrictor.restrict(v.res, &mut next.rho);
            next.phi.fill(0.0);
        }
        (Op::SolveCoarsest, _) => {
            if neutralize {
                domain.neutralize(&mut hier.coarse_mut(l).rho)?;
            }
            let v = hier.level(l, phi0, rho0);
            domain.refresh(v.phi)?;
            ops.coarse.smooth(v.phi, v.rho, v.tmp, cfg.coarse_solve, domain)?;
            if neutralize {
                domain.neutralize(v.phi)?;
            }
        }
        (Op::Correct, _) => {
            let (v, next) = hier.with_coarser(l, phi0, rho0);
            ops.prolongator.prolongate(&next.phi, v.res, domain)?;
            v.phi.sub_true(v.res)?;
            domain.refresh(v.phi)?;
        }
        // the finest level hands down the residual of the caller's phi
        (Op::RestrictProblem, _) if l == 0 => {
            let (v, next) = hier.with_coarser(l, phi0, rho0);
            domain.refresh(v.phi)?;
            residual(v.phi, v.rho, v.res);
            domain.refresh(v.res)?;
            ops.restrictor.restrict(v.res, &mut next.rho);
            next.phi.fill(0.0);
        }
        (Op::RestrictProblem, _) => {
            domain.refresh(&mut hier.coarse_mut(l).rho)?;
            let (v, next) = hier.with_coarser(l, phi0, rho0);
            ops.restrictor.restrict(v.rho, &mut next.rho);
            next.phi.fill(0.0);
        }
        (Op::InterpolateSolution, _) if l == 0 => {
            let (v, next) = hier.with_coarser(l, phi0, rho0);
            ops.prolongator.prolongate(&next.phi, v.res, domain)?;
            v.phi.sub_true(v.res)?;
            domain.refresh(v.phi)?;
        }
        (Op::InterpolateSolution, _) => {
            let (v, next) = hier.with_coarser(l, phi0, rho0);
            ops.prolongator.prolongate(&next.phi, v.phi, domain)?;
            domain.refresh(v.phi)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmootherKind;
    use crate::domain::Subdomain;
    use crate::grid::BoundaryKind;
    use crate::manufactured::Manufactured;

    #[test]
    fn operators_follow_roles() {
        let cfg = MgConfig {
            pre_smoother: SmootherKind::Jacobi,
            omega: 0.5,
            ..MgConfig::default()
        };
        let ops = Operators::from_config(&cfg);
        assert_eq!(ops.pre, Smoother::WeightedJacobi { omega: 0.5 });
        assert_eq!(ops.post, Smoother::RedBlackGaussSeidel);
        assert_eq!(ops.restrictor, Restrictor::HalfWeight);
    }

    #[test]
    fn mismatched_fields_are_rejected() {
        let geom = GridGeometry::uniform(&[8, 8], BoundaryKind::Periodic).unwrap();
        let mut solver = MgSolver::new(&geom, MgConfig::default()).unwrap();
        let other = GridGeometry::uniform(&[16, 8], BoundaryKind::Periodic).unwrap();
        let mut phi = Grid::new(other).unwrap();
        let rho = Grid::new(geom.clone()).unwrap();
        let mut dom = Subdomain::serial(&geom);
        assert!(matches!(
            solver.solve(&mut phi, &rho, &mut dom),
            Err(MgError::GeometryMismatch(_))
        ));
    }

    #[test]
    fn dirichlet_problems_are_not_neutralized() {
        let geom = GridGeometry::uniform(&[8, 8], BoundaryKind::Dirichlet).unwrap();
        assert!(!MgSolver::new(&geom, MgConfig::default()).unwrap().neutralizes());
        let geom = GridGeometry::uniform(&[8, 8], BoundaryKind::Neumann).unwrap();
        assert!(MgSolver::new(&geom, MgConfig::default()).unwrap().neutralizes());
    }

    #[test]
    fn fmg_keeps_a_converged_guess() {
        let geom = GridGeometry::uniform(&[16, 16], BoundaryKind::Periodic).unwrap();
        let problem = Manufactured::standard(&geom).unwrap();
        let mut rho = Grid::new(geom.clone()).unwrap();
        let mut exact = Grid::new(geom.clone()).unwrap();
        problem.fill_rho_discrete(&mut rho);
        problem.fill_phi(&mut exact);

        let cfg = MgConfig {
            levels: 3,
            cycles: 1,
            cycle: CycleKind::Fmg,
            ..MgConfig::default()
        };
        let mut solver = MgSolver::new(&geom, cfg).unwrap();
        let mut dom = Subdomain::serial(&geom);
        let mut phi = exact.clone();
        solver.solve(&mut phi, &rho, &mut dom).unwrap();
        for (off, _) in phi.true_nodes() {
            assert!((phi.values()[off] - exact.values()[off]).abs() < 1e-12);
        }

        // from zero the same single cycle is only a first approximation
        let mut cold = Grid::new(geom).unwrap();
        solver.solve(&mut cold, &rho, &mut dom).unwrap();
        let worst = cold
            .true_nodes()
            .map(|(off, _)| (cold.values()[off] - exact.values()[off]).abs())
            .fold(0.0f64, f64::max);
        assert!(worst > 1e-9 && worst < 0.1, "max error after one FMG cycle {worst}");
    }

    #[test]
    fn monitored_residual_decreases() {
        let geom = GridGeometry::uniform(&[32, 32], BoundaryKind::Periodic).unwrap();
        let cfg = MgConfig {
            levels: 4,
            cycles: 6,
            monitor: true,
            ..MgConfig::default()
        };
        let mut solver = MgSolver::new(&geom, cfg).unwrap();
        let mut dom = Subdomain::serial(&geom);
        let mut phi = Grid::new(geom.clone()).unwrap();
        let mut rho = Grid::new(geom).unwrap();
        let k = 2.0 * std::f64::consts::PI / 32.0;
        rho.fill_true_with(|x| (k * x[0] as f64).cos() + (3.0 * k * x[1] as f64).sin());

        let report = solver.solve(&mut phi, &rho, &mut dom).unwrap();
        assert_eq!(report.residual_l1.len(), 6);
        for w in report.residual_l1.windows(2) {
            assert!(w[1] <= w[0] * 1.0001, "residuals {:?}", report.residual_l1);
        }
        assert!(report.residual_l1[5] < 1e-3 * report.residual_l1[0]);
    }
}
