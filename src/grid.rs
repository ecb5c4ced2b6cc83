// src/grid.rs

use serde::{Deserialize, Serialize};

use crate::error::MgError;

/// Highest dimensionality a grid can have.
pub const MAX_DIMS: usize = 3;

/// Boundary condition attached to one face of the global domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryKind {
    /// Face wraps around to the opposite face (ghosts filled by halo exchange).
    Periodic,
    /// Ghost layers hold the face value.
    Dirichlet,
    /// Ghost layers mirror the edge node; the face value is the outward derivative.
    Neumann,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Lower,
    Upper,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Lower, Side::Upper];
}

/// Index of face `(axis, side)` in per-face vectors: lower faces first, then upper faces.
#[inline]
pub fn face(n_dims: usize, axis: usize, side: Side) -> usize {
    match side {
        Side::Lower => axis,
        Side::Upper => n_dims + axis,
    }
}

/// Shape and boundary metadata of a (sub)domain grid.
///
/// Per-face vectors (`ghosts`, `boundary`) hold the lower faces first, then the
/// upper faces. `origin` is the global index of the first true node of this
/// subdomain, so the same geometry type serves serial and decomposed runs.
/// `global_size` is the true extent of the whole domain on the same level.
///
/// `level` counts how often the geometry was coarsened. The physical faces
/// stay where the finest grid put them: the Dirichlet face one fine step
/// below node 0, the Neumann face on the last fine node. On coarse levels
/// those positions fall between nodes, which [`Grid::fill_boundary_face`]
/// and the multigrid stencil account for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub true_size: Vec<usize>,
    pub ghosts: Vec<usize>,
    pub step: Vec<f64>,
    pub boundary: Vec<BoundaryKind>,
    pub origin: Vec<usize>,
    pub n_values: usize,
    #[serde(default)]
    pub global_size: Vec<usize>,
    #[serde(default)]
    pub level: usize,
}

impl GridGeometry {
    /// Scalar geometry with one ghost layer per side and origin at zero.
    pub fn new(
        true_size: &[usize],
        step: &[f64],
        boundary: &[BoundaryKind],
    ) -> Result<Self, MgError> {
        let n_dims = true_size.len();
        let geom = Self {
            true_size: true_size.to_vec(),
            ghosts: vec![1; 2 * n_dims],
            step: step.to_vec(),
            boundary: boundary.to_vec(),
            origin: vec![0; n_dims],
            n_values: 1,
            global_size: true_size.to_vec(),
            level: 0,
        };
        geom.validate()?;
        Ok(geom)
    }

    /// Same boundary kind on every face, unit step.
    pub fn uniform(true_size: &[usize], kind: BoundaryKind) -> Result<Self, MgError> {
        let n_dims = true_size.len();
        Self::new(true_size, &vec![1.0; n_dims], &vec![kind; 2 * n_dims])
    }

    pub fn with_ghosts(mut self, ghosts: &[usize]) -> Result<Self, MgError> {
        self.ghosts = ghosts.to_vec();
        self.validate()?;
        Ok(self)
    }

    pub fn with_origin(mut self, origin: &[usize]) -> Result<Self, MgError> {
        self.origin = origin.to_vec();
        self.validate()?;
        Ok(self)
    }

    pub fn with_values(mut self, n_values: usize) -> Result<Self, MgError> {
        self.n_values = n_values;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), MgError> {
        let d = self.true_size.len();
        if !(2..=MAX_DIMS).contains(&d) {
            return Err(MgError::config(format!(
                "grids must be 2D or 3D, got {d} axes"
            )));
        }
        if self.step.len() != d || self.origin.len() != d {
            return Err(MgError::config(format!(
                "step/origin need {d} entries (got {}/{})",
                self.step.len(),
                self.origin.len()
            )));
        }
        if self.ghosts.len() != 2 * d || self.boundary.len() != 2 * d {
            return Err(MgError::config(format!(
                "ghost depths and boundary kinds need {} per-face entries",
                2 * d
            )));
        }
        if !self.global_size.is_empty() && self.global_size.len() != d {
            return Err(MgError::config(format!(
                "global extent needs {d} entries (got {})",
                self.global_size.len()
            )));
        }
        if self.n_values == 0 {
            return Err(MgError::config("a grid needs at least one value per node"));
        }
        for axis in 0..d {
            if self.true_size[axis] == 0 {
                return Err(MgError::config(format!("axis {axis} has no true nodes")));
            }
            if !(self.step[axis].is_finite() && self.step[axis] > 0.0) {
                return Err(MgError::config(format!(
                    "step size on axis {axis} must be positive, got {}",
                    self.step[axis]
                )));
            }
            let lo = self.boundary[axis];
            let hi = self.boundary[d + axis];
            if (lo == BoundaryKind::Periodic) != (hi == BoundaryKind::Periodic) {
                return Err(MgError::config(format!(
                    "axis {axis}: periodic boundaries must be set on both faces"
                )));
            }
        }
        if self.ghosts.iter().any(|&g| g == 0) {
            return Err(MgError::config("every face needs at least one ghost layer"));
        }
        Ok(())
    }

    #[inline]
    pub fn n_dims(&self) -> usize {
        self.true_size.len()
    }

    #[inline]
    pub fn lower_ghosts(&self, axis: usize) -> usize {
        self.ghosts[axis]
    }

    #[inline]
    pub fn upper_ghosts(&self, axis: usize) -> usize {
        self.ghosts[self.n_dims() + axis]
    }

    /// Number of stored nodes along `axis` (true + both ghost layers).
    #[inline]
    pub fn size(&self, axis: usize) -> usize {
        self.true_size[axis] + self.lower_ghosts(axis) + self.upper_ghosts(axis)
    }

    #[inline]
    pub fn boundary_kind(&self, axis: usize, side: Side) -> BoundaryKind {
        self.boundary[face(self.n_dims(), axis, side)]
    }

    #[inline]
    pub fn is_periodic(&self, axis: usize) -> bool {
        self.boundary[axis] == BoundaryKind::Periodic
    }

    pub fn n_true_points(&self) -> usize {
        self.true_size.iter().product()
    }

    /// Without a Dirichlet face the Poisson problem is only defined up to a constant.
    pub fn needs_neutralization(&self) -> bool {
        !self.boundary.contains(&BoundaryKind::Dirichlet)
    }

    /// True extent of the whole domain along `axis`.
    #[inline]
    pub fn global_extent(&self, axis: usize) -> usize {
        let own_end = self.origin[axis] + self.true_size[axis];
        self.global_size.get(axis).map_or(own_end, |&g| g.max(own_end))
    }

    /// Whether this (sub)grid owns the physical, non-periodic face `(axis, side)`.
    pub fn on_physical_face(&self, axis: usize, side: Side) -> bool {
        if self.is_periodic(axis) {
            return false;
        }
        match side {
            Side::Lower => self.origin[axis] == 0,
            Side::Upper => self.origin[axis] + self.true_size[axis] == self.global_extent(axis),
        }
    }

    /// Finest-grid steps per step of this level.
    #[inline]
    pub fn level_factor(&self) -> f64 {
        2f64.powi(self.level as i32)
    }

    /// Width, in steps of this level, of the cell owned by the node with
    /// global index `global` along `axis`.
    ///
    /// Interior and periodic nodes own a full cell. The node on a lower
    /// Neumann face owns half a cell. The node next to an upper Neumann face
    /// owns half a cell plus its distance to the face, which is zero on the
    /// finest level and grows toward one step on coarse levels.
    pub fn control_width(&self, axis: usize, global: usize) -> f64 {
        let mut w = 1.0;
        if global == 0 && self.boundary_kind(axis, Side::Lower) == BoundaryKind::Neumann {
            w -= 0.5;
        }
        if global + 1 == self.global_extent(axis)
            && self.boundary_kind(axis, Side::Upper) == BoundaryKind::Neumann
        {
            w += 0.5 - 1.0 / self.level_factor();
        }
        w
    }

    /// Geometry of the next coarser multigrid level.
    pub fn coarsened(&self) -> Result<Self, MgError> {
        let mut coarse = self.clone();
        for axis in 0..self.n_dims() {
            let n = self.true_size[axis];
            if n % 2 != 0 || self.origin[axis] % 2 != 0 {
                return Err(MgError::NotCoarsenable {
                    axis,
                    extent: n,
                    factor: 2,
                    levels: 2,
                });
            }
            coarse.true_size[axis] = n / 2;
            coarse.origin[axis] = self.origin[axis] / 2;
            coarse.step[axis] = 2.0 * self.step[axis];
            if let Some(g) = coarse.global_size.get_mut(axis) {
                *g /= 2;
            }
        }
        coarse.level = self.level + 1;
        Ok(coarse)
    }

    /// Same node layout (extent, ghosts, components, dimensionality).
    pub fn same_layout(&self, other: &GridGeometry) -> bool {
        self.true_size == other.true_size
            && self.ghosts == other.ghosts
            && self.n_values == other.n_values
    }
}

/// Structured field with ghost layers over a flat strided store.
///
/// Node values are stored component-fastest, then axis 0, axis 1, ...
/// `size_prod[0] = n_values` and `size_prod[d + 1] = size_prod[d] * size[d]`,
/// so `size_prod[d]` is the stride of axis `d` and `size_prod[n_dims]` the
/// length of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    geom: GridGeometry,
    size: Vec<usize>,
    size_prod: Vec<usize>,
    bnd_values: Vec<f64>,
    val: Vec<f64>,
}

impl Grid {
    /// Allocate a zeroed grid with homogeneous boundary values.
    pub fn new(geom: GridGeometry) -> Result<Self, MgError> {
        geom.validate()?;
        let n_dims = geom.n_dims();
        let size: Vec<usize> = (0..n_dims).map(|d| geom.size(d)).collect();
        let mut size_prod = Vec::with_capacity(n_dims + 1);
        size_prod.push(geom.n_values);
        for d in 0..n_dims {
            size_prod.push(size_prod[d] * size[d]);
        }
        let len = size_prod[n_dims];
        Ok(Self {
            bnd_values: vec![0.0; 2 * n_dims],
            geom,
            size,
            size_prod,
            val: vec![0.0; len],
        })
    }

    #[inline]
    pub fn geometry(&self) -> &GridGeometry {
        &self.geom
    }

    #[inline]
    pub fn n_dims(&self) -> usize {
        self.geom.n_dims()
    }

    /// Stored nodes per axis.
    #[inline]
    pub fn size(&self) -> &[usize] {
        &self.size
    }

    #[inline]
    pub fn size_prod(&self) -> &[usize] {
        &self.size_prod
    }

    #[inline]
    pub fn stride(&self, axis: usize) -> usize {
        self.size_prod[axis]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.val.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.val.is_empty()
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.val
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.val
    }

    /// Dirichlet value or Neumann outward derivative on a face.
    #[inline]
    pub fn boundary_value(&self, axis: usize, side: Side) -> f64 {
        self.bnd_values[face(self.n_dims(), axis, side)]
    }

    pub fn set_boundary_value(&mut self, axis: usize, side: Side, value: f64) {
        let f = face(self.n_dims(), axis, side);
        self.bnd_values[f] = value;
    }

    /// Offset of component `comp` at `idx`, given relative to the first true node.
    /// Ghost nodes have negative indices or indices `>= true_size`.
    #[inline]
    pub fn offset_of(&self, comp: usize, idx: &[isize]) -> usize {
        debug_assert_eq!(idx.len(), self.n_dims());
        debug_assert!(comp < self.geom.n_values);
        let mut off = comp;
        for (d, &i) in idx.iter().enumerate() {
            let p = i + self.geom.lower_ghosts(d) as isize;
            debug_assert!(p >= 0 && (p as usize) < self.size[d]);
            off += p as usize * self.size_prod[d];
        }
        off
    }

    #[inline]
    pub fn offset(&self, idx: &[isize]) -> usize {
        self.offset_of(0, idx)
    }

    #[inline]
    pub fn get(&self, idx: &[isize]) -> f64 {
        self.val[self.offset(idx)]
    }

    #[inline]
    pub fn set(&mut self, idx: &[isize], v: f64) {
        let off = self.offset(idx);
        self.val[off] = v;
    }

    /// Offset of a node given in padded (ghost-inclusive) coordinates.
    #[inline]
    pub fn padded_offset(&self, coords: &[usize]) -> usize {
        coords
            .iter()
            .zip(&self.size_prod)
            .map(|(&c, &s)| c * s)
            .sum()
    }

    /// Padded coordinate range of the true nodes along `axis`.
    #[inline]
    pub fn true_range(&self, axis: usize) -> std::ops::Range<usize> {
        let lo = self.geom.lower_ghosts(axis);
        lo..lo + self.geom.true_size[axis]
    }

    pub fn fill(&mut self, v: f64) {
        self.val.fill(v);
    }

    /// Iterate over the nodes of a box given in padded coordinates.
    pub fn padded_box(&self, start: &[usize], end: &[usize]) -> BoxIter {
        BoxIter::new(self.n_dims(), start, end, &self.size_prod)
    }

    /// Iterate over all true nodes (component 0).
    pub fn true_nodes(&self) -> BoxIter {
        let n_dims = self.n_dims();
        let mut start = [0usize; MAX_DIMS];
        let mut end = [0usize; MAX_DIMS];
        for d in 0..n_dims {
            let r = self.true_range(d);
            start[d] = r.start;
            end[d] = r.end;
        }
        BoxIter::new(n_dims, &start[..n_dims], &end[..n_dims], &self.size_prod)
    }

    /// Global index of a node given in padded coordinates.
    #[inline]
    pub fn global_index(&self, axis: usize, padded: usize) -> isize {
        padded as isize - self.geom.lower_ghosts(axis) as isize + self.geom.origin[axis] as isize
    }

    /// Set every true node from a function of its global node index.
    pub fn fill_true_with<F>(&mut self, mut f: F)
    where
        F: FnMut(&[usize]) -> f64,
    {
        let n_dims = self.n_dims();
        let mut global = [0usize; MAX_DIMS];
        for (off, coords) in self.true_nodes() {
            for d in 0..n_dims {
                global[d] = self.global_index(d, coords[d]) as usize;
            }
            self.val[off] = f(&global[..n_dims]);
        }
    }

    /// Number of padded rows along axis 0 (scalar grids only).
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.val.len() / self.size_prod[1]
    }

    /// Padded coordinates of a row of a scalar grid; entry 0 is left at zero.
    #[inline]
    pub fn row_coords(&self, row: usize) -> [usize; MAX_DIMS] {
        let mut c = [0usize; MAX_DIMS];
        let mut rem = row;
        for d in 1..self.n_dims() {
            c[d] = rem % self.size[d];
            rem /= self.size[d];
        }
        c
    }

    /// True when every axis other than axis 0 sits inside the true range.
    #[inline]
    pub fn is_true_row(&self, coords: &[usize; MAX_DIMS]) -> bool {
        (1..self.n_dims()).all(|d| self.true_range(d).contains(&coords[d]))
    }

    /// Overwrite true nodes with those of `other` (same layout required).
    pub fn copy_true_from(&mut self, other: &Grid) -> Result<(), MgError> {
        self.check_layout(other)?;
        for (off, _) in self.true_nodes() {
            self.val[off] = other.val[off];
        }
        Ok(())
    }

    /// `self -= other` on true nodes.
    pub fn sub_true(&mut self, other: &Grid) -> Result<(), MgError> {
        self.check_layout(other)?;
        for (off, _) in self.true_nodes() {
            self.val[off] -= other.val[off];
        }
        Ok(())
    }

    /// Local sum of true node values.
    pub fn sum_true(&self) -> f64 {
        self.true_nodes().map(|(off, _)| self.val[off]).sum()
    }

    /// Local sums of `w * value` and of `w` over true nodes, with `w` the
    /// product of the per-axis [`GridGeometry::control_width`].
    pub fn weighted_sum_true(&self) -> (f64, f64) {
        let n_dims = self.n_dims();
        let mut sum = 0.0;
        let mut weight = 0.0;
        for (off, coords) in self.true_nodes() {
            let w: f64 = (0..n_dims)
                .map(|d| {
                    let global = self.global_index(d, coords[d]) as usize;
                    self.geom.control_width(d, global)
                })
                .product();
            sum += w * self.val[off];
            weight += w;
        }
        (sum, weight)
    }

    /// Exchange backing stores with `other` without copying.
    pub fn swap_values(&mut self, other: &mut Grid) -> Result<(), MgError> {
        self.check_layout(other)?;
        std::mem::swap(&mut self.val, &mut other.val);
        Ok(())
    }

    /// Copy all components of a padded box into a flat buffer.
    pub fn pack_box(&self, start: &[usize], end: &[usize], out: &mut Vec<f64>) {
        out.clear();
        let nv = self.geom.n_values;
        for (off, _) in self.padded_box(start, end) {
            out.extend_from_slice(&self.val[off..off + nv]);
        }
    }

    /// Inverse of [`Grid::pack_box`]; `buf` must hold exactly one box worth of values.
    pub fn unpack_box(&mut self, start: &[usize], end: &[usize], buf: &[f64]) -> Result<(), MgError> {
        let nv = self.geom.n_values;
        let n: usize = start.iter().zip(end).map(|(s, e)| e.saturating_sub(*s)).product();
        if buf.len() != n * nv {
            return Err(MgError::Comm(format!(
                "halo buffer holds {} values, box needs {}",
                buf.len(),
                n * nv
            )));
        }
        for ((off, _), chunk) in self.padded_box(start, end).zip(buf.chunks_exact(nv)) {
            self.val[off..off + nv].copy_from_slice(chunk);
        }
        Ok(())
    }

    /// Padded box covering one slab of `axis` and the full padded extent of the other axes.
    pub fn slab(&self, axis: usize, range: std::ops::Range<usize>) -> ([usize; MAX_DIMS], [usize; MAX_DIMS]) {
        let mut start = [0usize; MAX_DIMS];
        let mut end = [0usize; MAX_DIMS];
        for d in 0..self.n_dims() {
            end[d] = self.size[d];
        }
        start[axis] = range.start;
        end[axis] = range.end;
        (start, end)
    }

    /// Fill the ghost layers of a physical (non-periodic) face from its boundary kind.
    ///
    /// Dirichlet ghosts take the face value, scaled by the level factor on
    /// the lower face, whose position lies inside the first cell on coarse
    /// levels (the stencil adds the matching diagonal term). Neumann ghosts
    /// mirror the edge node: layer `k` gets `phi(k) + 2 k h g`, with `g` the
    /// outward normal derivative. Periodic faces are left to the halo exchange.
    pub fn fill_boundary_face(&mut self, axis: usize, side: Side) {
        let kind = self.geom.boundary_kind(axis, side);
        let mut value = self.boundary_value(axis, side);
        if kind == BoundaryKind::Dirichlet && side == Side::Lower {
            value *= self.geom.level_factor();
        }
        let n_dims = self.n_dims();
        let nv = self.geom.n_values;
        let lo = self.geom.lower_ghosts(axis);
        let n = self.geom.true_size[axis];
        let depth = match side {
            Side::Lower => lo,
            Side::Upper => self.geom.upper_ghosts(axis),
        };
        let stride = self.size_prod[axis];
        let h = self.geom.step[axis];

        for k in 1..=depth {
            // padded index of ghost layer k and of its mirror image
            let (ghost, mirror) = match side {
                Side::Lower => (lo - k, lo + k.min(n - 1)),
                Side::Upper => (lo + n - 1 + k, lo + n - 1 - k.min(n - 1)),
            };
            let (start, end) = self.slab(axis, ghost..ghost + 1);
            let boxed: Vec<usize> = self
                .padded_box(&start[..n_dims], &end[..n_dims])
                .map(|(off, _)| off)
                .collect();
            match kind {
                BoundaryKind::Periodic => return,
                BoundaryKind::Dirichlet => {
                    for off in boxed {
                        self.val[off..off + nv].fill(value);
                    }
                }
                BoundaryKind::Neumann => {
                    let shift = 2.0 * k as f64 * h * value;
                    for off in boxed {
                        let src = off + mirror * stride - ghost * stride;
                        for c in 0..nv {
                            self.val[off + c] = self.val[src + c] + shift;
                        }
                    }
                }
            }
        }
    }

    pub fn check_layout(&self, other: &Grid) -> Result<(), MgError> {
        if self.geom.same_layout(&other.geom) {
            Ok(())
        } else {
            Err(MgError::GeometryMismatch(format!(
                "true size {:?} / ghosts {:?} vs true size {:?} / ghosts {:?}",
                self.geom.true_size, self.geom.ghosts, other.geom.true_size, other.geom.ghosts
            )))
        }
    }
}

/// Odometer over a box of padded coordinates, axis 0 fastest.
/// Yields the flat offset of component 0 and the padded coordinates.
#[derive(Debug, Clone)]
pub struct BoxIter {
    n_dims: usize,
    start: [usize; MAX_DIMS],
    end: [usize; MAX_DIMS],
    strides: [usize; MAX_DIMS],
    cur: [usize; MAX_DIMS],
    done: bool,
}

impl BoxIter {
    fn new(n_dims: usize, start: &[usize], end: &[usize], size_prod: &[usize]) -> Self {
        let mut it = Self {
            n_dims,
            start: [0; MAX_DIMS],
            end: [0; MAX_DIMS],
            strides: [0; MAX_DIMS],
            cur: [0; MAX_DIMS],
            done: false,
        };
        for d in 0..n_dims {
            it.start[d] = start[d];
            it.end[d] = end[d];
            it.strides[d] = size_prod[d];
            it.cur[d] = start[d];
            if start[d] >= end[d] {
                it.done = true;
            }
        }
        it
    }
}

impl Iterator for BoxIter {
    type Item = (usize, [usize; MAX_DIMS]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let coords = self.cur;
        let off = (0..self.n_dims).map(|d| coords[d] * self.strides[d]).sum();

        let mut d = 0;
        loop {
            if d == self.n_dims {
                self.done = true;
                break;
            }
            self.cur[d] += 1;
            if self.cur[d] < self.end[d] {
                break;
            }
            self.cur[d] = self.start[d];
            d += 1;
        }
        Some((off, coords))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn periodic_2d(nx: usize, ny: usize) -> GridGeometry {
        GridGeometry::uniform(&[nx, ny], BoundaryKind::Periodic).unwrap()
    }

    #[test]
    fn grid_indexing_is_consistent() {
        let g = Grid::new(periodic_2d(4, 3)).unwrap();
        // padded 6 x 5, one ghost layer each side
        assert_eq!(g.size(), &[6, 5]);
        assert_eq!(g.size_prod(), &[1, 6, 30]);
        assert_eq!(g.len(), 30);
        assert_eq!(g.offset(&[0, 0]), 7);
        assert_eq!(g.offset(&[-1, -1]), 0);
        assert_eq!(g.offset(&[3, 2]), 3 * 6 + 4);
        assert_eq!(g.offset(&[4, 3]), 29);
    }

    #[test]
    fn vector_grid_interleaves_components() {
        let geom = periodic_2d(2, 2).with_values(2).unwrap();
        let g = Grid::new(geom).unwrap();
        assert_eq!(g.size_prod(), &[2, 8, 32]);
        assert_eq!(g.offset_of(1, &[0, 0]) - g.offset_of(0, &[0, 0]), 1);
        assert_eq!(g.offset_of(0, &[1, 0]) - g.offset_of(0, &[0, 0]), 2);
    }

    #[test]
    fn true_nodes_visits_interior_once() {
        let g = Grid::new(periodic_2d(4, 3).with_ghosts(&[2, 1, 1, 2]).unwrap()).unwrap();
        let offs: Vec<usize> = g.true_nodes().map(|(o, _)| o).collect();
        assert_eq!(offs.len(), 12);
        assert_eq!(offs[0], g.offset(&[0, 0]));
        assert_eq!(*offs.last().unwrap(), g.offset(&[3, 2]));
        let mut sorted = offs.clone();
        sorted.dedup();
        assert_eq!(sorted.len(), 12);
    }

    #[test]
    fn fill_true_with_uses_global_indices() {
        let geom = periodic_2d(4, 4).with_origin(&[8, 4]).unwrap();
        let mut g = Grid::new(geom).unwrap();
        g.fill_true_with(|x| (x[0] * 100 + x[1]) as f64);
        assert_eq!(g.get(&[0, 0]), 804.0);
        assert_eq!(g.get(&[3, 1]), 1105.0);
        // ghosts untouched
        assert_eq!(g.get(&[-1, 0]), 0.0);
    }

    #[test]
    fn coarsening_halves_extent_and_doubles_step() {
        let geom = GridGeometry::new(
            &[8, 4, 16],
            &[0.5, 1.0, 2.0],
            &[BoundaryKind::Dirichlet; 6],
        )
        .unwrap()
        .with_origin(&[8, 0, 16])
        .unwrap();
        let c = geom.coarsened().unwrap();
        assert_eq!(c.true_size, vec![4, 2, 8]);
        assert_eq!(c.step, vec![1.0, 2.0, 4.0]);
        assert_eq!(c.origin, vec![4, 0, 8]);
        assert_eq!(c.ghosts, geom.ghosts);
        assert_eq!(c.global_size, vec![4, 2, 8]);
        assert_eq!(c.level, 1);
    }

    #[test]
    fn physical_faces_follow_the_global_extent() {
        let mut global = GridGeometry::uniform(&[8, 8], BoundaryKind::Dirichlet).unwrap();
        global.boundary[1] = BoundaryKind::Periodic;
        global.boundary[3] = BoundaryKind::Periodic;
        let half = GridGeometry {
            true_size: vec![4, 8],
            ..global.clone()
        };
        let right = half.clone().with_origin(&[4, 0]).unwrap();
        assert!(half.on_physical_face(0, Side::Lower));
        assert!(!half.on_physical_face(0, Side::Upper));
        assert!(!right.on_physical_face(0, Side::Lower));
        assert!(right.on_physical_face(0, Side::Upper));
        assert!(!global.on_physical_face(1, Side::Lower));
        assert!(right.coarsened().unwrap().on_physical_face(0, Side::Upper));
    }

    #[test]
    fn neumann_cells_shrink_at_faces() {
        let geom = GridGeometry::uniform(&[8, 4], BoundaryKind::Neumann).unwrap();
        assert_eq!(geom.control_width(0, 0), 0.5);
        assert_eq!(geom.control_width(0, 3), 1.0);
        assert_eq!(geom.control_width(0, 7), 0.5);

        // two levels down the upper face (fine node 7) sits 3/4 of a step past node 1
        let c = geom.coarsened().unwrap().coarsened().unwrap();
        assert_eq!(c.level, 2);
        assert_eq!(c.control_width(0, 0), 0.5);
        assert_eq!(c.control_width(0, 1), 1.25);

        let mut g = Grid::new(geom).unwrap();
        g.fill(2.0);
        // 7 x 3 cells
        assert_eq!(g.weighted_sum_true(), (42.0, 21.0));
    }

    #[test]
    fn coarse_lower_dirichlet_ghost_is_scaled() {
        let geom = GridGeometry::uniform(&[8, 8], BoundaryKind::Dirichlet)
            .unwrap()
            .coarsened()
            .unwrap()
            .coarsened()
            .unwrap();
        let mut g = Grid::new(geom).unwrap();
        g.set_boundary_value(0, Side::Lower, 1.0);
        g.set_boundary_value(0, Side::Upper, 1.0);
        g.fill_boundary_face(0, Side::Lower);
        g.fill_boundary_face(0, Side::Upper);
        // face a quarter step below node 0: the line through (-1/4, 1) and (0, 0) is 4 at -1
        assert_eq!(g.get(&[-1, 0]), 4.0);
        assert_eq!(g.get(&[2, 0]), 1.0);
    }

    #[test]
    fn odd_extent_cannot_be_coarsened() {
        let geom = periodic_2d(6, 3);
        assert!(matches!(
            geom.coarsened(),
            Err(MgError::NotCoarsenable { axis: 1, extent: 3, .. })
        ));
    }

    #[test]
    fn invalid_geometries_are_rejected() {
        assert!(GridGeometry::uniform(&[4], BoundaryKind::Periodic).is_err());
        assert!(GridGeometry::uniform(&[4, 4, 4, 4], BoundaryKind::Periodic).is_err());
        let mixed = [
            BoundaryKind::Periodic,
            BoundaryKind::Dirichlet,
            BoundaryKind::Dirichlet,
            BoundaryKind::Dirichlet,
        ];
        assert!(GridGeometry::new(&[4, 4], &[1.0, 1.0], &mixed).is_err());
        assert!(periodic_2d(4, 4).with_ghosts(&[1, 0, 1, 1]).is_err());
    }

    #[test]
    fn dirichlet_ghosts_take_face_value() {
        let geom = GridGeometry::uniform(&[4, 4], BoundaryKind::Dirichlet)
            .unwrap()
            .with_ghosts(&[2, 1, 1, 1])
            .unwrap();
        let mut g = Grid::new(geom).unwrap();
        g.fill(7.0);
        g.set_boundary_value(0, Side::Lower, -1.5);
        g.fill_boundary_face(0, Side::Lower);
        for j in -1..=4 {
            assert_eq!(g.get(&[-1, j]), -1.5);
            assert_eq!(g.get(&[-2, j]), -1.5);
            assert_eq!(g.get(&[0, j]), 7.0, "true nodes must not change");
        }
    }

    #[test]
    fn neumann_ghosts_mirror_edge_node() {
        let geom = GridGeometry::new(&[4, 4], &[0.5, 1.0], &[BoundaryKind::Neumann; 4])
            .unwrap()
            .with_ghosts(&[1, 1, 2, 1])
            .unwrap();
        let mut g = Grid::new(geom).unwrap();
        g.fill_true_with(|x| x[0] as f64);
        g.set_boundary_value(0, Side::Upper, 0.25);
        g.fill_boundary_face(0, Side::Lower);
        g.fill_boundary_face(0, Side::Upper);
        // lower: phi(-1) = phi(1), homogeneous
        assert_eq!(g.get(&[-1, 2]), 1.0);
        // upper: phi(3 + k) = phi(3 - k) + 2 k h g
        assert!((g.get(&[4, 2]) - (2.0 + 2.0 * 0.5 * 0.25)).abs() < 1e-15);
        assert!((g.get(&[5, 2]) - (1.0 + 4.0 * 0.5 * 0.25)).abs() < 1e-15);
    }

    #[test]
    fn pack_then_unpack_moves_a_slab() {
        let mut a = Grid::new(periodic_2d(4, 3)).unwrap();
        a.fill_true_with(|x| (10 * x[1] + x[0]) as f64);
        let mut b = Grid::new(periodic_2d(4, 3)).unwrap();
        let (s, e) = a.slab(0, 4..5);
        let mut buf = Vec::new();
        a.pack_box(&s[..2], &e[..2], &mut buf);
        assert_eq!(buf.len(), 5);
        let (s0, e0) = b.slab(0, 0..1);
        b.unpack_box(&s0[..2], &e0[..2], &buf).unwrap();
        assert_eq!(b.get(&[-1, 1]), 13.0);
        assert!(b.unpack_box(&s0[..2], &e0[..2], &buf[..3]).is_err());
    }

    #[test]
    fn row_coords_match_offsets() {
        let g = Grid::new(
            GridGeometry::uniform(&[2, 3, 2], BoundaryKind::Periodic).unwrap(),
        )
        .unwrap();
        let row = 7;
        let c = g.row_coords(row);
        assert_eq!(g.padded_offset(&c[..3]), row * g.size()[0]);
        assert_eq!(c, [0, 2, 1]);
        assert!(g.is_true_row(&c));
        assert!(!g.is_true_row(&g.row_coords(0)));
    }
}
