// src/multigrid/schedule.rs
//
// Cycle shapes as flat step lists. The engine interprets any schedule; the
// V, W and FMG shapes are just generators.

use crate::config::CycleKind;
use crate::error::MgError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Descend,
    Ascend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Pre-smooth (descending) or post-smooth (ascending).
    Smooth,
    /// Residual of this level restricted into the right-hand side of the next.
    RestrictResidual,
    /// Extended relaxation on the coarsest level.
    SolveCoarsest,
    /// Prolongate the next level's solution and subtract it.
    Correct,
    /// Restrict this level's right-hand side into the next (FMG).
    RestrictProblem,
    /// Prolongate the next level's solution into this level (FMG).
    InterpolateSolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub level: usize,
    pub direction: Direction,
    pub op: Op,
}

impl Step {
    fn new(level: usize, direction: Direction, op: Op) -> Self {
        Self { level, direction, op }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    steps: Vec<Step>,
}

impl Schedule {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Schedule for one cycle of `kind` over `levels >= 2` levels.
    pub fn for_kind(kind: CycleKind, levels: usize) -> Result<Self, MgError> {
        match kind {
            CycleKind::V => Self::v(levels),
            CycleKind::W => Self::w(levels),
            CycleKind::Fmg => Self::fmg(levels),
        }
    }

    pub fn v(levels: usize) -> Result<Self, MgError> {
        let bottom = coarsest(levels)?;
        let mut steps = Vec::new();
        push_v(&mut steps, 0, bottom, 0);
        Ok(Self { steps })
    }

    /// A V-cycle whose ascent stops at `bottom / 2`, then a V-cycle from there
    /// down to the coarsest and up to the finest level.
    pub fn w(levels: usize) -> Result<Self, MgError> {
        let bottom = coarsest(levels)?;
        let middle = bottom / 2;
        let mut steps = Vec::new();
        push_v(&mut steps, 0, bottom, middle);
        push_v(&mut steps, middle, bottom, 0);
        Ok(Self { steps })
    }

    /// Restrict the problem to the coarsest level and solve it there, then for
    /// each finer level interpolate the solution up and run a V-cycle rooted
    /// at that level. The finest level hands down the residual of its current
    /// solution and receives a correction.
    pub fn fmg(levels: usize) -> Result<Self, MgError> {
        let bottom = coarsest(levels)?;
        let mut steps = Vec::new();
        for l in 0..bottom {
            steps.push(Step::new(l, Direction::Descend, Op::RestrictProblem));
        }
        steps.push(Step::new(bottom, Direction::Descend, Op::SolveCoarsest));
        for l in (0..bottom).rev() {
            steps.push(Step::new(l, Direction::Ascend, Op::InterpolateSolution));
            push_v(&mut steps, l, bottom, l);
        }
        Ok(Self { steps })
    }
}

/// Index of the coarsest level; a cycle needs somewhere to coarsen to.
fn coarsest(levels: usize) -> Result<usize, MgError> {
    if levels < 2 {
        return Err(MgError::config(format!(
            "a multigrid cycle needs at least 2 levels, got {levels}"
        )));
    }
    Ok(levels - 1)
}

/// Descend from `start` to `bottom`, solve, ascend to `top`.
fn push_v(steps: &mut Vec<Step>, start: usize, bottom: usize, top: usize) {
    for l in start..bottom {
        steps.push(Step::new(l, Direction::Descend, Op::Smooth));
        steps.push(Step::new(l, Direction::Descend, Op::RestrictResidual));
    }
    steps.push(Step::new(bottom, Direction::Descend, Op::SolveCoarsest));
    for l in (top..bottom).rev() {
        steps.push(Step::new(l, Direction::Ascend, Op::Correct));
        steps.push(Step::new(l, Direction::Ascend, Op::Smooth));
    }
}
