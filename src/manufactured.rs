// src/manufactured.rs
//
// Manufactured periodic solutions for validating the solver.
//
// phi(x) = sum over modes of A * prod_d cos(2 pi w_d x_d / N_d + p_d), with x the
// global node index and N_d the global true extent. Every mode has a nonzero
// wavenumber on some axis, so phi has zero mean on the periodic grid.

use crate::error::MgError;
use crate::grid::{Grid, GridGeometry};

use std::f64::consts::PI;

#[derive(Debug, Clone, PartialEq)]
pub struct Mode {
    pub amplitude: f64,
    pub wave: Vec<usize>,
    pub phase: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Manufactured {
    extent: Vec<usize>,
    step: Vec<f64>,
    modes: Vec<Mode>,
}

impl Manufactured {
    pub fn new(global: &GridGeometry, modes: Vec<Mode>) -> Result<Self, MgError> {
        let n_dims = global.n_dims();
        for (m, mode) in modes.iter().enumerate() {
            if mode.wave.len() != n_dims || mode.phase.len() != n_dims {
                return Err(MgError::config(format!(
                    "mode {m} needs {n_dims} wavenumbers and phases"
                )));
            }
            if mode.wave.iter().all(|&w| w == 0) {
                return Err(MgError::config(format!("mode {m} is constant")));
            }
        }
        Ok(Self {
            extent: global.true_size.clone(),
            step: global.step.clone(),
            modes,
        })
    }

    /// Two low modes with different shapes per axis.
    pub fn standard(global: &GridGeometry) -> Result<Self, MgError> {
        let n_dims = global.n_dims();
        let mut low = vec![0; n_dims];
        let mut mixed = vec![1; n_dims];
        low[0] = 1;
        mixed[n_dims - 1] = 2;
        let mut shifted = vec![0.0; n_dims];
        shifted[0] = -0.5 * PI;
        Self::new(
            global,
            vec![
                Mode {
                    amplitude: 1.0,
                    wave: low,
                    phase: vec![0.0; n_dims],
                },
                Mode {
                    amplitude: 0.5,
                    wave: mixed,
                    phase: shifted,
                },
            ],
        )
    }

    fn angle(&self, d: usize, w: usize) -> f64 {
        2.0 * PI * w as f64 / self.extent[d] as f64
    }

    pub fn phi(&self, x: &[usize]) -> f64 {
        self.modes
            .iter()
            .map(|m| {
                m.amplitude
                    * (0..x.len())
                        .map(|d| (self.angle(d, m.wave[d]) * x[d] as f64 + m.phase[d]).cos())
                        .product::<f64>()
            })
            .sum()
    }

    /// Right-hand side for which `phi` solves the discrete Poisson equation exactly.
    pub fn rho_discrete(&self, x: &[usize]) -> f64 {
        self.weighted(x, |d, theta| {
            (2.0 * theta.cos() - 2.0) / (self.step[d] * self.step[d])
        })
    }

    /// Right-hand side of the continuous problem; the discrete solution then
    /// differs from `phi` by the O(h^2) discretization error.
    pub fn rho_continuous(&self, x: &[usize]) -> f64 {
        self.weighted(x, |d, theta| -(theta / self.step[d]).powi(2))
    }

    // sum over modes of eigenvalue(mode) * mode(x)
    fn weighted<F>(&self, x: &[usize], eig: F) -> f64
    where
        F: Fn(usize, f64) -> f64,
    {
        self.modes
            .iter()
            .map(|m| {
                let lambda: f64 = (0..x.len()).map(|d| eig(d, self.angle(d, m.wave[d]))).sum();
                let value: f64 = (0..x.len())
                    .map(|d| (self.angle(d, m.wave[d]) * x[d] as f64 + m.phase[d]).cos())
                    .product();
                lambda * m.amplitude * value
            })
            .sum()
    }

    pub fn fill_phi(&self, grid: &mut Grid) {
        grid.fill_true_with(|x| self.phi(x));
    }

    pub fn fill_rho_discrete(&self, grid: &mut Grid) {
        grid.fill_true_with(|x| self.rho_discrete(x));
    }

    pub fn fill_rho_continuous(&self, grid: &mut Grid) {
        grid.fill_true_with(|x| self.rho_continuous(x));
    }
}
