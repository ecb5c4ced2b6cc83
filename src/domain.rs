// src/domain.rs
//
// Distributed-grid service the multigrid engine talks to: halo exchange,
// physical boundaries, neutralization and global reductions.

use crate::comm::{Communicator, SerialComm};
use crate::error::MgError;
use crate::grid::{Grid, GridGeometry, Side};

/// Operations on a grid that need knowledge of the rank layout.
///
/// Every method is collective: all ranks of the decomposition must call it in
/// the same order with grids of the same level.
pub trait Domain {
    /// Fill the ghost layers along `axis` that face another subdomain
    /// (including periodic wrap, possibly onto this rank).
    fn exchange_axis(&mut self, grid: &mut Grid, axis: usize) -> Result<(), MgError>;

    /// Fill the ghost layers along `axis` that lie on a physical face.
    fn apply_boundary_axis(&mut self, grid: &mut Grid, axis: usize) -> Result<(), MgError>;

    /// Sum of `x` over all ranks.
    fn global_sum(&mut self, x: f64) -> Result<f64, MgError>;

    fn exchange(&mut self, grid: &mut Grid) -> Result<(), MgError> {
        for axis in 0..grid.n_dims() {
            self.exchange_axis(grid, axis)?;
        }
        Ok(())
    }

    fn apply_boundary(&mut self, grid: &mut Grid) -> Result<(), MgError> {
        for axis in 0..grid.n_dims() {
            self.apply_boundary_axis(grid, axis)?;
        }
        Ok(())
    }

    /// Halo exchange followed by the physical boundary, one axis at a time so
    /// that edge and corner ghosts see already-filled lower axes.
    fn refresh(&mut self, grid: &mut Grid) -> Result<(), MgError> {
        for axis in 0..grid.n_dims() {
            self.exchange_axis(grid, axis)?;
            self.apply_boundary_axis(grid, axis)?;
        }
        Ok(())
    }

    fn refresh_axis(&mut self, grid: &mut Grid, axis: usize) -> Result<(), MgError> {
        self.exchange_axis(grid, axis)?;
        self.apply_boundary_axis(grid, axis)
    }

    /// Subtract the global mean of the true nodes from every stored value.
    ///
    /// Nodes are weighted by the cell they own, so on Neumann faces the
    /// boundary nodes count half (a quarter in corners). That weighted sum
    /// is what the discrete operator annihilates, which makes a neutralized
    /// source compatible with homogeneous Neumann faces. On a periodic grid
    /// it is the plain mean.
    fn neutralize(&mut self, grid: &mut Grid) -> Result<(), MgError> {
        let (local, weight) = grid.weighted_sum_true();
        let total = self.global_sum(local)?;
        let w_total = self.global_sum(weight)?;
        let mean = total / w_total;
        grid.values_mut().iter_mut().for_each(|v| *v -= mean);
        Ok(())
    }
}

/// Cartesian layout of ranks over the global grid, axis 0 fastest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decomposition {
    ranks_per_axis: Vec<usize>,
    periodic: Vec<bool>,
    rank: usize,
    coords: Vec<usize>,
}

impl Decomposition {
    pub fn new(global: &GridGeometry, ranks_per_axis: &[usize], rank: usize) -> Result<Self, MgError> {
        let n_dims = global.n_dims();
        if ranks_per_axis.len() != n_dims {
            return Err(MgError::config(format!(
                "rank layout has {} axes, grid has {n_dims}",
                ranks_per_axis.len()
            )));
        }
        if ranks_per_axis.iter().any(|&r| r == 0) {
            return Err(MgError::config("every axis needs at least one rank"));
        }
        let n_ranks: usize = ranks_per_axis.iter().product();
        if rank >= n_ranks {
            return Err(MgError::config(format!(
                "rank {rank} outside a layout of {n_ranks} ranks"
            )));
        }
        let mut coords = vec![0; n_dims];
        let mut rem = rank;
        for d in 0..n_dims {
            coords[d] = rem % ranks_per_axis[d];
            rem /= ranks_per_axis[d];
        }
        Ok(Self {
            ranks_per_axis: ranks_per_axis.to_vec(),
            periodic: (0..n_dims).map(|d| global.is_periodic(d)).collect(),
            rank,
            coords,
        })
    }

    /// One rank owning the whole grid.
    pub fn serial(global: &GridGeometry) -> Self {
        let n_dims = global.n_dims();
        Self {
            ranks_per_axis: vec![1; n_dims],
            periodic: (0..n_dims).map(|d| global.is_periodic(d)).collect(),
            rank: 0,
            coords: vec![0; n_dims],
        }
    }

    pub fn n_ranks(&self) -> usize {
        self.ranks_per_axis.iter().product()
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn coords(&self) -> &[usize] {
        &self.coords
    }

    pub fn ranks_per_axis(&self) -> &[usize] {
        &self.ranks_per_axis
    }

    pub fn rank_of(&self, coords: &[usize]) -> usize {
        let mut r = 0;
        for d in (0..coords.len()).rev() {
            r = r * self.ranks_per_axis[d] + coords[d];
        }
        r
    }

    /// Face neighbour; `None` on a physical (non-periodic) face.
    pub fn neighbor(&self, axis: usize, side: Side) -> Option<usize> {
        let n = self.ranks_per_axis[axis];
        let c = self.coords[axis];
        let mut nb = self.coords.clone();
        nb[axis] = match side {
            Side::Lower if c > 0 => c - 1,
            Side::Lower if self.periodic[axis] => n - 1,
            Side::Upper if c + 1 < n => c + 1,
            Side::Upper if self.periodic[axis] => 0,
            _ => return None,
        };
        Some(self.rank_of(&nb))
    }

    /// Geometry of this rank's block of `global`.
    pub fn local_geometry(&self, global: &GridGeometry) -> Result<GridGeometry, MgError> {
        let mut local = global.clone();
        for d in 0..global.n_dims() {
            let n = global.true_size[d];
            let r = self.ranks_per_axis[d];
            if n % r != 0 {
                return Err(MgError::config(format!(
                    "extent {n} on axis {d} cannot be split over {r} ranks"
                )));
            }
            local.true_size[d] = n / r;
            local.origin[d] = global.origin[d] + self.coords[d] * (n / r);
        }
        local.validate()?;
        Ok(local)
    }
}

/// One rank's block of a decomposed grid, talking to its face neighbours
/// through a [`Communicator`].
#[derive(Debug)]
pub struct Subdomain<C: Communicator> {
    comm: C,
    decomp: Decomposition,
    send_buf: Vec<f64>,
    recv_buf: Vec<f64>,
}

impl Subdomain<SerialComm> {
    /// Whole grid on the calling thread.
    pub fn serial(global: &GridGeometry) -> Self {
        Self {
            comm: SerialComm,
            decomp: Decomposition::serial(global),
            send_buf: Vec::new(),
            recv_buf: Vec::new(),
        }
    }
}

impl<C: Communicator> Subdomain<C> {
    pub fn new(comm: C, decomp: Decomposition) -> Result<Self, MgError> {
        if comm.size() != decomp.n_ranks() || comm.rank() != decomp.rank() {
            return Err(MgError::config(format!(
                "communicator is rank {} of {}, decomposition expects rank {} of {}",
                comm.rank(),
                comm.size(),
                decomp.rank(),
                decomp.n_ranks()
            )));
        }
        Ok(Self {
            comm,
            decomp,
            send_buf: Vec::new(),
            recv_buf: Vec::new(),
        })
    }

    pub fn decomposition(&self) -> &Decomposition {
        &self.decomp
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }
}

// Messages along `axis` heading to the lower neighbour carry tag 2*axis,
// those heading to the upper neighbour 2*axis + 1.
fn halo_tag(axis: usize, toward: Side) -> u16 {
    (2 * axis + usize::from(toward == Side::Upper)) as u16
}

impl<C: Communicator> Domain for Subdomain<C> {
    fn exchange_axis(&mut self, grid: &mut Grid, axis: usize) -> Result<(), MgError> {
        let n_dims = grid.n_dims();
        let geom = grid.geometry();
        let lo = geom.lower_ghosts(axis);
        let hi = geom.upper_ghosts(axis);
        let n = geom.true_size[axis];
        if n < lo.max(hi) {
            return Err(MgError::config(format!(
                "axis {axis}: {n} true nodes cannot fill {} ghost layers",
                lo.max(hi)
            )));
        }

        // my lower edge slab becomes the lower neighbour's upper ghosts, and vice versa
        let to_lower = grid.slab(axis, lo..lo + hi);
        let to_upper = grid.slab(axis, n..lo + n);
        let lower_ghost = grid.slab(axis, 0..lo);
        let upper_ghost = grid.slab(axis, lo + n..lo + n + hi);

        // values in one layer of a slab across the full padded cross-section
        let slab_len = grid.len() / grid.size()[axis];

        let lower = self.decomp.neighbor(axis, Side::Lower);
        let upper = self.decomp.neighbor(axis, Side::Upper);
        let me = self.decomp.rank();

        // wrap onto this rank: copy without messaging
        if lower == Some(me) && upper == Some(me) {
            grid.pack_box(&to_upper.0[..n_dims], &to_upper.1[..n_dims], &mut self.send_buf);
            grid.unpack_box(&lower_ghost.0[..n_dims], &lower_ghost.1[..n_dims], &self.send_buf)?;
            grid.pack_box(&to_lower.0[..n_dims], &to_lower.1[..n_dims], &mut self.send_buf);
            grid.unpack_box(&upper_ghost.0[..n_dims], &upper_ghost.1[..n_dims], &self.send_buf)?;
            return Ok(());
        }

        if let Some(peer) = lower {
            grid.pack_box(&to_lower.0[..n_dims], &to_lower.1[..n_dims], &mut self.send_buf);
            self.comm.send(peer, halo_tag(axis, Side::Lower), &self.send_buf)?;
        }
        if let Some(peer) = upper {
            grid.pack_box(&to_upper.0[..n_dims], &to_upper.1[..n_dims], &mut self.send_buf);
            self.comm.send(peer, halo_tag(axis, Side::Upper), &self.send_buf)?;
        }
        if let Some(peer) = lower {
            // the lower neighbour sent its upper edge toward us
            self.recv_buf.resize(lo * slab_len, 0.0);
            self.comm.recv(peer, halo_tag(axis, Side::Upper), &mut self.recv_buf)?;
            grid.unpack_box(&lower_ghost.0[..n_dims], &lower_ghost.1[..n_dims], &self.recv_buf)?;
        }
        if let Some(peer) = upper {
            self.recv_buf.resize(hi * slab_len, 0.0);
            self.comm.recv(peer, halo_tag(axis, Side::Lower), &mut self.recv_buf)?;
            grid.unpack_box(&upper_ghost.0[..n_dims], &upper_ghost.1[..n_dims], &self.recv_buf)?;
        }
        Ok(())
    }

    fn apply_boundary_axis(&mut self, grid: &mut Grid, axis: usize) -> Result<(), MgError> {
        for side in Side::BOTH {
            if self.decomp.neighbor(axis, side).is_none() {
                grid.fill_boundary_face(axis, side);
            }
        }
        Ok(())
    }

    fn global_sum(&mut self, x: f64) -> Result<f64, MgError> {
        self.comm.all_reduce_sum(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalComm;
    use crate::grid::BoundaryKind;

    fn global(nx: usize, ny: usize, kind: BoundaryKind) -> GridGeometry {
        GridGeometry::uniform(&[nx, ny], kind).unwrap()
    }

    #[test]
    fn neighbours_wrap_only_on_periodic_axes() {
        let mut geom = global(8, 8, BoundaryKind::Periodic);
        geom.boundary[1] = BoundaryKind::Dirichlet;
        geom.boundary[3] = BoundaryKind::Dirichlet;
        let d = Decomposition::new(&geom, &[2, 3], 4).unwrap();
        // rank 4 = (0, 2)
        assert_eq!(d.coords(), &[0, 2]);
        assert_eq!(d.neighbor(0, Side::Lower), Some(5));
        assert_eq!(d.neighbor(0, Side::Upper), Some(5));
        assert_eq!(d.neighbor(1, Side::Lower), Some(2));
        assert_eq!(d.neighbor(1, Side::Upper), None);
    }

    #[test]
    fn local_geometry_offsets_origin() {
        let geom = global(8, 12, BoundaryKind::Periodic);
        let d = Decomposition::new(&geom, &[2, 3], 5).unwrap();
        let local = d.local_geometry(&geom).unwrap();
        assert_eq!(local.true_size, vec![4, 4]);
        assert_eq!(local.origin, vec![4, 8]);
        assert!(Decomposition::new(&geom, &[3, 1], 0)
            .unwrap()
            .local_geometry(&geom)
            .is_err());
    }

    #[test]
    fn serial_periodic_exchange_wraps_onto_itself() {
        let geom = global(4, 3, BoundaryKind::Periodic);
        let mut dom = Subdomain::serial(&geom);
        let mut g = Grid::new(geom).unwrap();
        g.fill_true_with(|x| (10 * x[1] + x[0]) as f64);
        dom.exchange(&mut g).unwrap();
        assert_eq!(g.get(&[-1, 0]), 3.0);
        assert_eq!(g.get(&[4, 2]), 20.0);
        assert_eq!(g.get(&[1, -1]), 21.0);
        assert_eq!(g.get(&[1, 3]), 1.0);
        // corner filled by the second axis pass
        assert_eq!(g.get(&[-1, -1]), 23.0);
    }

    #[test]
    fn neutralize_removes_global_mean() {
        let geom = global(4, 4, BoundaryKind::Periodic);
        let mut dom = Subdomain::serial(&geom);
        let mut g = Grid::new(geom).unwrap();
        g.fill_true_with(|x| x[0] as f64);
        dom.neutralize(&mut g).unwrap();
        assert!(g.sum_true().abs() < 1e-12);
        assert_eq!(g.get(&[0, 0]), -1.5);
    }

    #[test]
    fn neutralize_halves_neumann_edges_across_ranks() {
        // cos(pi x / 4) sums to zero over nodes 0..8, its trapezoid sum does not
        let geom = global(8, 4, BoundaryKind::Neumann);
        let f = |x: &[usize]| (std::f64::consts::PI * x[0] as f64 / 4.0).cos();

        let mut serial = Grid::new(geom.clone()).unwrap();
        serial.fill_true_with(f);
        assert!(serial.sum_true().abs() < 1e-12);
        Subdomain::serial(&geom).neutralize(&mut serial).unwrap();
        assert!(serial.weighted_sum_true().0.abs() < 1e-12);
        // edge nodes weigh 1/2 along x; 3 cells along y over 7 x 3 cells
        let mean = -0.5 * (f(&[0, 0]) + f(&[7, 0])) * 3.0 / 21.0;
        assert!((serial.get(&[3, 1]) - (f(&[3, 1]) - mean)).abs() < 1e-12);

        let world = LocalComm::world(2);
        let parts: Vec<Grid> = std::thread::scope(|s| {
            let handles: Vec<_> = world
                .into_iter()
                .map(|comm| {
                    let geom = geom.clone();
                    s.spawn(move || {
                        let decomp = Decomposition::new(&geom, &[2, 1], comm.rank()).unwrap();
                        let mut g = Grid::new(decomp.local_geometry(&geom).unwrap()).unwrap();
                        g.fill_true_with(f);
                        Subdomain::new(comm, decomp).unwrap().neutralize(&mut g).unwrap();
                        g
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for j in 0..4isize {
            for i in 0..4isize {
                assert!((parts[0].get(&[i, j]) - serial.get(&[i, j])).abs() < 1e-12);
                assert!((parts[1].get(&[i, j]) - serial.get(&[i + 4, j])).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn two_rank_exchange_matches_serial() {
        let geom = global(8, 4, BoundaryKind::Periodic);
        let mut serial = Grid::new(geom.clone()).unwrap();
        let f = |x: &[usize]| (x[0] * 7 + x[1] * 3) as f64;
        serial.fill_true_with(f);
        Subdomain::serial(&geom).exchange(&mut serial).unwrap();

        let world = LocalComm::world(2);
        let grids: Vec<Grid> = std::thread::scope(|s| {
            let handles: Vec<_> = world
                .into_iter()
                .map(|comm| {
                    let geom = geom.clone();
                    s.spawn(move || {
                        let decomp = Decomposition::new(&geom, &[2, 1], comm.rank()).unwrap();
                        let mut g = Grid::new(decomp.local_geometry(&geom).unwrap()).unwrap();
                        g.fill_true_with(f);
                        let mut dom = Subdomain::new(comm, decomp).unwrap();
                        dom.exchange(&mut g).unwrap();
                        g
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for j in -1..=4isize {
            assert_eq!(grids[0].get(&[-1, j]), serial.get(&[-1, j]));
            assert_eq!(grids[0].get(&[4, j]), serial.get(&[4, j]));
            assert_eq!(grids[1].get(&[-1, j]), serial.get(&[3, j]));
            assert_eq!(grids[1].get(&[4, j]), serial.get(&[8, j]));
        }
    }
}
