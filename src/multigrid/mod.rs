// src/multigrid/mod.rs
//
// Geometric multigrid for the discrete Poisson equation L phi = rho, with
// residual r = L phi - rho and the coarse correction subtracted on ascent.

pub mod engine;
pub mod hierarchy;
pub mod residual;
pub mod schedule;
pub mod smoother;
mod stencil;
pub mod transfer;

pub use engine::{MgSolver, Operators, SolveReport};
pub use hierarchy::{CoarseLevel, Hierarchy, LevelView, Scratch};
pub use residual::{error_grid, residual, residual_l1, sum_true_squared};
pub use schedule::{Direction, Op, Schedule, Step};
pub use smoother::Smoother;
pub use transfer::{Prolongator, Restrictor};
