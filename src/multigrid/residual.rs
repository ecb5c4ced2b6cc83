// src/multigrid/residual.rs
//
// Residual `r = L phi - rho` and the diagnostics built on it.

use rayon::prelude::*;

use crate::domain::Domain;
use crate::error::MgError;
use crate::grid::Grid;

use super::stencil::Stencil;

/// Write `L phi - rho` into the true nodes of `res` and return the local
/// `sum |r|`. Ghosts of `phi` must be valid; ghosts of `res` are not touched.
pub fn residual(phi: &Grid, rho: &Grid, res: &mut Grid) -> f64 {
    let st = Stencil::new(phi);
    let nx = st.row_len();
    let phi_ro = phi.values();
    let rho_ro = rho.values();

    res.values_mut()
        .par_chunks_mut(nx)
        .enumerate()
        .map(|(row_idx, res_row)| {
            let Some(row) = st.true_row(row_idx) else {
                return 0.0f64;
            };
            let base = row_idx * nx;
            let mut l1 = 0.0;
            for i in st.true_cols() {
                let id = base + i;
                let r = st.laplacian(phi_ro, id, i, &row) - rho_ro[id];
                res_row[i] = r;
                l1 += r.abs();
            }
            l1
        })
        .sum()
}

/// Global `sum |L phi - rho|` over true nodes. Overwrites `res`.
pub fn residual_l1<D: Domain + ?Sized>(
    phi: &Grid,
    rho: &Grid,
    res: &mut Grid,
    domain: &mut D,
) -> Result<f64, MgError> {
    phi.check_layout(rho)?;
    phi.check_layout(res)?;
    let local = residual(phi, rho, res);
    domain.global_sum(local)
}

/// Global sum of squared true node values.
pub fn sum_true_squared<D: Domain + ?Sized>(grid: &Grid, domain: &mut D) -> Result<f64, MgError> {
    let vals = grid.values();
    let local: f64 = grid.true_nodes().map(|(off, _)| vals[off] * vals[off]).sum();
    domain.global_sum(local)
}

/// `error = numerical - analytical` on true nodes.
pub fn error_grid(numerical: &Grid, analytical: &Grid, error: &mut Grid) -> Result<(), MgError> {
    numerical.check_layout(analytical)?;
    numerical.check_layout(error)?;
    let num = numerical.values();
    let ana = analytical.values();
    let out = error.values_mut();
    for (off, _) in numerical.true_nodes() {
        out[off] = num[off] - ana[off];
    }
    Ok(())
}
