// src/multigrid/transfer.rs
//
// Inter-level transfer. Coarse true node `c` coincides with fine node `2c`
// (indices relative to the subdomain origin, which is even on every level).

use rayon::prelude::*;

use crate::config::{ProlongatorKind, RestrictorKind};
use crate::domain::Domain;
use crate::error::MgError;
use crate::grid::{Grid, MAX_DIMS};

use super::stencil::Stencil;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restrictor {
    /// Centre weight 1/2, each of the 2D axis neighbours 1/(4D).
    HalfWeight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prolongator {
    /// Bilinear (2D) / trilinear (3D) interpolation.
    Bilinear,
}

impl From<RestrictorKind> for Restrictor {
    fn from(kind: RestrictorKind) -> Self {
        match kind {
            RestrictorKind::HalfWeight => Restrictor::HalfWeight,
        }
    }
}

impl From<ProlongatorKind> for Prolongator {
    fn from(kind: ProlongatorKind) -> Self {
        match kind {
            ProlongatorKind::Bilinear => Prolongator::Bilinear,
        }
    }
}

impl Restrictor {
    /// Fill the true nodes of `coarse` from `fine`. Reads fine ghosts, which
    /// must already be exchanged; performs no communication.
    pub fn restrict(&self, fine: &Grid, coarse: &mut Grid) {
        match self {
            Restrictor::HalfWeight => half_weight(fine, coarse),
        }
    }
}

fn half_weight(fine: &Grid, coarse: &mut Grid) {
    let sf = Stencil::new(fine);
    let sc = Stencil::new(coarse);
    let n_dims = sf.n_dims;
    let w_centre = 0.5;
    let w_nbr = 1.0 / (4.0 * n_dims as f64);
    let fine_ro = fine.values();
    let nxc = sc.row_len();

    coarse
        .values_mut()
        .par_chunks_mut(nxc)
        .enumerate()
        .for_each(|(row_idx, coarse_row)| {
            let Some(row) = sc.true_row(row_idx) else {
                return;
            };
            // fine offset of the row start, axes 1.. only
            let mut base = 0;
            for d in 1..n_dims {
                base += (sf.lo[d] + 2 * (row[d] - sc.lo[d])) * sf.strides[d];
            }
            for ic in sc.true_cols() {
                let id = base + sf.lo[0] + 2 * (ic - sc.lo[0]);
                let mut nbrs = 0.0;
                for d in 0..n_dims {
                    let s = sf.strides[d];
                    nbrs += fine_ro[id - s] + fine_ro[id + s];
                }
                coarse_row[ic] = w_centre * fine_ro[id] + w_nbr * nbrs;
            }
        });
}

impl Prolongator {
    /// Overwrite the true nodes of `fine` with the interpolant of `coarse`.
    ///
    /// Coarse ghosts are not read. Fine ghosts are refreshed axis by axis
    /// through `domain` as the interpolation proceeds, so the call is collective.
    pub fn prolongate<D: Domain + ?Sized>(
        &self,
        coarse: &Grid,
        fine: &mut Grid,
        domain: &mut D,
    ) -> Result<(), MgError> {
        match self {
            Prolongator::Bilinear => bilinear(coarse, fine, domain),
        }
    }
}

fn bilinear<D: Domain + ?Sized>(coarse: &Grid, fine: &mut Grid, domain: &mut D) -> Result<(), MgError> {
    let sf = Stencil::new(fine);
    let sc = Stencil::new(coarse);
    let n_dims = sf.n_dims;

    // local (true-relative) fine coordinates of a node
    let local = |c: &[usize; MAX_DIMS]| {
        let mut l = [0usize; MAX_DIMS];
        for d in 0..n_dims {
            l[d] = c[d] - sf.lo[d];
        }
        l
    };

    // inject at coincident nodes
    {
        let coarse_ro = coarse.values();
        let nodes = fine.true_nodes();
        let out = fine.values_mut();
        for (off, c) in nodes {
            let l = local(&c);
            if (0..n_dims).any(|d| l[d] % 2 == 1) {
                continue;
            }
            let mut id_c = 0;
            for d in 0..n_dims {
                id_c += (sc.lo[d] + l[d] / 2) * sc.strides[d];
            }
            out[off] = coarse_ro[id_c];
        }
    }

    // fill odd nodes axis by axis, highest axis first
    for axis in (0..n_dims).rev() {
        domain.refresh_axis(fine, axis)?;
        let s = sf.strides[axis];
        let nodes = fine.true_nodes();
        let out = fine.values_mut();
        for (off, c) in nodes {
            let l = local(&c);
            if l[axis] % 2 == 0 || (0..axis).any(|d| l[d] % 2 == 1) {
                continue;
            }
            out[off] = 0.5 * (out[off - s] + out[off + s]);
        }
    }
    Ok(())
}
