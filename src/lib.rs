// src/lib.rs

pub mod comm;
pub mod config;
pub mod domain;
pub mod error;
pub mod grid;
pub mod manufactured;
pub mod multigrid;
pub mod spectral;
pub mod visualisation;

pub use comm::{Communicator, LocalComm, SerialComm};
pub use config::{CycleKind, MgConfig, ProlongatorKind, RestrictorKind, SmootherKind};
pub use domain::{Decomposition, Domain, Subdomain};
pub use error::MgError;
pub use grid::{BoundaryKind, Grid, GridGeometry, Side};
pub use multigrid::{MgSolver, SolveReport};
pub use spectral::SpectralPoisson;
