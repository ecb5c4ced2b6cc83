// src/multigrid/hierarchy.rs
//
// Level storage. Level 0 `phi`/`rho` belong to the caller and are lent to the
// solver per call; everything coarser, and the residual/scratch grids of every
// level, are owned here and never resized.

use crate::error::MgError;
use crate::grid::{Grid, GridGeometry};

/// Solution and right-hand side of a level below the finest.
#[derive(Debug, Clone)]
pub struct CoarseLevel {
    pub phi: Grid,
    pub rho: Grid,
}

/// Residual and smoother scratch of one level.
#[derive(Debug, Clone)]
pub struct Scratch {
    pub res: Grid,
    pub tmp: Grid,
}

/// Mutable view of one level, with level 0 taken from the caller's grids.
pub struct LevelView<'a> {
    pub phi: &'a mut Grid,
    pub rho: &'a Grid,
    pub res: &'a mut Grid,
    pub tmp: &'a mut Grid,
}

#[derive(Debug, Clone)]
pub struct Hierarchy {
    geometries: Vec<GridGeometry>,
    coarse: Vec<CoarseLevel>,
    scratch: Vec<Scratch>,
}

impl Hierarchy {
    /// Build `levels` levels below and including `finest`.
    pub fn build(finest: &GridGeometry, levels: usize) -> Result<Self, MgError> {
        if levels == 0 {
            return Err(MgError::config("multigrid needs at least one level"));
        }
        finest.validate()?;
        if finest.n_values != 1 {
            return Err(MgError::config(format!(
                "multigrid solves scalar fields, got {} components",
                finest.n_values
            )));
        }

        let factor = u32::try_from(levels - 1)
            .ok()
            .and_then(|shift| 1usize.checked_shl(shift))
            .ok_or_else(|| MgError::config(format!("{levels} levels is not a usable level count")))?;
        for axis in 0..finest.n_dims() {
            let extent = finest.true_size[axis];
            if extent % factor != 0 {
                return Err(MgError::NotCoarsenable {
                    axis,
                    extent,
                    factor,
                    levels,
                });
            }
            if finest.origin[axis] % factor != 0 {
                return Err(MgError::config(format!(
                    "subdomain origin {} on axis {axis} is not a multiple of {factor}",
                    finest.origin[axis]
                )));
            }
        }

        let mut geometries = vec![finest.clone()];
        for _ in 1..levels {
            let next = geometries[geometries.len() - 1].coarsened()?;
            for axis in 0..next.n_dims() {
                let depth = next.lower_ghosts(axis).max(next.upper_ghosts(axis));
                if next.true_size[axis] < depth {
                    return Err(MgError::config(format!(
                        "level {} has {} true nodes on axis {axis}, fewer than its {depth} ghost layers",
                        geometries.len(),
                        next.true_size[axis]
                    )));
                }
            }
            geometries.push(next);
        }

        let coarse = geometries[1..]
            .iter()
            .map(|g| {
                Ok(CoarseLevel {
                    phi: Grid::new(g.clone())?,
                    rho: Grid::new(g.clone())?,
                })
            })
            .collect::<Result<Vec<_>, MgError>>()?;
        let scratch = geometries
            .iter()
            .map(|g| {
                Ok(Scratch {
                    res: Grid::new(g.clone())?,
                    tmp: Grid::new(g.clone())?,
                })
            })
            .collect::<Result<Vec<_>, MgError>>()?;

        Ok(Self {
            geometries,
            coarse,
            scratch,
        })
    }

    pub fn n_levels(&self) -> usize {
        self.geometries.len()
    }

    pub fn geometry(&self, level: usize) -> &GridGeometry {
        &self.geometries[level]
    }

    pub fn geometries(&self) -> &[GridGeometry] {
        &self.geometries
    }

    /// Coarse level `level >= 1`.
    pub fn coarse_mut(&mut self, level: usize) -> &mut CoarseLevel {
        &mut self.coarse[level - 1]
    }

    pub fn coarse(&self, level: usize) -> &CoarseLevel {
        &self.coarse[level - 1]
    }

    pub fn scratch_mut(&mut self, level: usize) -> &mut Scratch {
        &mut self.scratch[level]
    }

    /// Fields of `level`, substituting the caller's grids on level 0.
    pub fn level<'a>(&'a mut self, level: usize, phi0: &'a mut Grid, rho0: &'a Grid) -> LevelView<'a> {
        let Scratch { res, tmp } = &mut self.scratch[level];
        let (phi, rho) = if level == 0 {
            (phi0, rho0)
        } else {
            let c = &mut self.coarse[level - 1];
            (&mut c.phi, &c.rho)
        };
        LevelView { phi, rho, res, tmp }
    }

    /// Fields of `level` together with the next coarser level.
    pub fn with_coarser<'a>(
        &'a mut self,
        level: usize,
        phi0: &'a mut Grid,
        rho0: &'a Grid,
    ) -> (LevelView<'a>, &'a mut CoarseLevel) {
        let Scratch { res, tmp } = &mut self.scratch[level];
        let (finer, coarser) = self.coarse.split_at_mut(level);
        let (phi, rho) = if level == 0 {
            (phi0, rho0)
        } else {
            let c = &mut finer[level - 1];
            (&mut c.phi, &c.rho)
        };
        (LevelView { phi, rho, res, tmp }, &mut coarser[0])
    }
}
