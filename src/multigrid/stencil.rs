// src/multigrid/stencil.rs
//
// Layout and coefficients of the 5-point (2D) / 7-point (3D) Laplacian on
// one level, extracted once so that parallel row kernels can run while the
// output grid is mutably borrowed.

use crate::grid::{BoundaryKind, Grid, GridGeometry, Side, MAX_DIMS};

/// Change to the axis part of the operator on the node next to a physical face:
/// the neighbour pair is weighted by `scale`, and `extra / h^2` joins the diagonal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FaceRow {
    pub scale: f64,
    pub extra: f64,
}

impl FaceRow {
    const PLAIN: FaceRow = FaceRow { scale: 1.0, extra: 0.0 };

    /// Row of the first or last true node when the face sits between nodes.
    ///
    /// Lower Dirichlet face `1/f` steps below node 0 (`f` the level factor):
    /// extrapolating through the face value puts `(1 - f) phi_0` into the
    /// ghost, which moves to the diagonal. Upper Neumann face `1 - 1/f` steps
    /// past the last node: the flux balance over a cell of width `w` scales
    /// the mirrored row by `1 / (2 w)`. Both reduce to the plain row when `f = 1`.
    fn for_face(geom: &GridGeometry, axis: usize, side: Side) -> Self {
        if !geom.on_physical_face(axis, side) {
            return Self::PLAIN;
        }
        let f = geom.level_factor();
        match (geom.boundary_kind(axis, side), side) {
            (BoundaryKind::Dirichlet, Side::Lower) => FaceRow {
                scale: 1.0,
                extra: f - 1.0,
            },
            (BoundaryKind::Neumann, Side::Upper) => {
                let width = 1.5 - 1.0 / f;
                FaceRow {
                    scale: 1.0 / (2.0 * width),
                    extra: 0.0,
                }
            }
            _ => Self::PLAIN,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Stencil {
    pub n_dims: usize,
    /// Stored nodes per axis.
    pub size: [usize; MAX_DIMS],
    /// Lower ghost depth per axis (padded index of the first true node).
    pub lo: [usize; MAX_DIMS],
    pub true_size: [usize; MAX_DIMS],
    pub strides: [usize; MAX_DIMS],
    /// 1 / h_d^2
    pub inv_h2: [f64; MAX_DIMS],
    /// sum_d 2 / h_d^2
    pub diag: f64,
    /// Parity of (global index - padded index) summed over axes.
    pub parity_shift: usize,
    pub lower_rows: [FaceRow; MAX_DIMS],
    pub upper_rows: [FaceRow; MAX_DIMS],
    /// Some face row differs from the plain one.
    pub has_face_rows: bool,
}

impl Stencil {
    pub fn new(grid: &Grid) -> Self {
        let geom = grid.geometry();
        let n_dims = geom.n_dims();
        let mut s = Self {
            n_dims,
            size: [1; MAX_DIMS],
            lo: [0; MAX_DIMS],
            true_size: [1; MAX_DIMS],
            strides: [0; MAX_DIMS],
            inv_h2: [0.0; MAX_DIMS],
            diag: 0.0,
            parity_shift: 0,
            lower_rows: [FaceRow::PLAIN; MAX_DIMS],
            upper_rows: [FaceRow::PLAIN; MAX_DIMS],
            has_face_rows: false,
        };
        let mut shift: isize = 0;
        for d in 0..n_dims {
            s.lower_rows[d] = FaceRow::for_face(geom, d, Side::Lower);
            s.upper_rows[d] = FaceRow::for_face(geom, d, Side::Upper);
            s.size[d] = grid.size()[d];
            s.lo[d] = geom.lower_ghosts(d);
            s.true_size[d] = geom.true_size[d];
            s.strides[d] = grid.stride(d);
            s.inv_h2[d] = 1.0 / (geom.step[d] * geom.step[d]);
            shift += geom.origin[d] as isize - geom.lower_ghosts(d) as isize;
        }
        s.diag = 2.0 * s.inv_h2[..n_dims].iter().sum::<f64>();
        s.parity_shift = shift.rem_euclid(2) as usize;
        s.has_face_rows = s.lower_rows[..n_dims]
            .iter()
            .chain(&s.upper_rows[..n_dims])
            .any(|r| *r != FaceRow::PLAIN);
        s
    }

    #[inline]
    pub fn row_len(&self) -> usize {
        self.size[0]
    }

    /// Padded coordinates of row `row` (entry 0 left at zero), or `None` for
    /// a row that lies in a ghost layer of some axis other than 0.
    #[inline]
    pub fn true_row(&self, row: usize) -> Option<[usize; MAX_DIMS]> {
        let mut c = [0usize; MAX_DIMS];
        let mut rem = row;
        for d in 1..self.n_dims {
            c[d] = rem % self.size[d];
            rem /= self.size[d];
            if c[d] < self.lo[d] || c[d] >= self.lo[d] + self.true_size[d] {
                return None;
            }
        }
        Some(c)
    }

    /// Padded range of true nodes along axis 0.
    #[inline]
    pub fn true_cols(&self) -> std::ops::Range<usize> {
        self.lo[0]..self.lo[0] + self.true_size[0]
    }

    #[inline]
    pub fn neighbour_sum(&self, phi: &[f64], id: usize) -> f64 {
        let mut acc = 0.0;
        for d in 0..self.n_dims {
            let s = self.strides[d];
            acc += self.inv_h2[d] * (phi[id - s] + phi[id + s]);
        }
        acc
    }

    /// Neighbour sum and diagonal at `id`, whose padded coordinates are `i`
    /// on axis 0 and `row` on the others.
    #[inline]
    fn terms(&self, phi: &[f64], id: usize, i: usize, row: &[usize; MAX_DIMS]) -> (f64, f64) {
        if !self.has_face_rows {
            return (self.neighbour_sum(phi, id), self.diag);
        }
        let mut acc = 0.0;
        let mut diag = 0.0;
        for d in 0..self.n_dims {
            let p = if d == 0 { i } else { row[d] };
            let mut coef = self.inv_h2[d];
            let mut extra = 0.0;
            if p == self.lo[d] {
                coef *= self.lower_rows[d].scale;
                extra += self.lower_rows[d].extra;
            }
            if p + 1 == self.lo[d] + self.true_size[d] {
                coef *= self.upper_rows[d].scale;
                extra += self.upper_rows[d].extra;
            }
            let s = self.strides[d];
            acc += coef * (phi[id - s] + phi[id + s]);
            diag += 2.0 * coef + extra * self.inv_h2[d];
        }
        (acc, diag)
    }

    /// `L phi` at `id` (padded coordinates `i`, `row`).
    #[inline]
    pub fn laplacian(&self, phi: &[f64], id: usize, i: usize, row: &[usize; MAX_DIMS]) -> f64 {
        let (nbr, diag) = self.terms(phi, id, i, row);
        nbr - diag * phi[id]
    }

    /// Value that zeroes the local residual at `id` given its neighbours.
    #[inline]
    pub fn relaxed(&self, phi: &[f64], rho: &[f64], id: usize, i: usize, row: &[usize; MAX_DIMS]) -> f64 {
        let (nbr, diag) = self.terms(phi, id, i, row);
        (nbr - rho[id]) / diag
    }

    /// Red-black colour of a node from its axis-0 padded index and row coordinates.
    #[inline]
    pub fn colour(&self, i: usize, row: &[usize; MAX_DIMS]) -> usize {
        (i + row[1..self.n_dims].iter().sum::<usize>() + self.parity_shift) & 1
    }
}
