// src/spectral.rs
//
// Direct FFT solve of the discrete periodic Poisson problem.
//
// The 2D/3D five/seven-point Laplacian is diagonal in the Fourier basis of a
// fully periodic grid, with eigenvalue sum_d (2 cos(2 pi k_d / N_d) - 2) / h_d^2.
// Dividing the transformed source by it gives the exact discrete solution
// (zero mean; the k = 0 mode of rho is dropped). Serial only: used as a
// reference for the iterative solver and by the drivers.

use std::sync::Arc;

use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::error::MgError;
use crate::grid::{Grid, GridGeometry};

pub struct SpectralPoisson {
    geom: GridGeometry,
    forward: Vec<Arc<dyn Fft<f64>>>,
    inverse: Vec<Arc<dyn Fft<f64>>>,
    eigen: Vec<f64>,
}

impl std::fmt::Debug for SpectralPoisson {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralPoisson")
            .field("true_size", &self.geom.true_size)
            .field("step", &self.geom.step)
            .finish()
    }
}

impl SpectralPoisson {
    /// Plan the transforms for a whole, fully periodic, scalar grid.
    pub fn new(geom: &GridGeometry) -> Result<Self, MgError> {
        geom.validate()?;
        let n_dims = geom.n_dims();
        if (0..n_dims).any(|d| !geom.is_periodic(d)) {
            return Err(MgError::config("spectral solve needs periodic faces on every axis"));
        }
        if geom.n_values != 1 || geom.origin.iter().any(|&o| o != 0) {
            return Err(MgError::config(
                "spectral solve works on the whole scalar grid of a single rank",
            ));
        }

        let mut planner = FftPlanner::<f64>::new();
        let forward = geom.true_size.iter().map(|&n| planner.plan_fft_forward(n)).collect();
        let inverse = geom.true_size.iter().map(|&n| planner.plan_fft_inverse(n)).collect();

        // eigenvalue per flat wavenumber index, axis 0 fastest
        let total: usize = geom.true_size.iter().product();
        let eigen = (0..total)
            .map(|flat| {
                let mut rem = flat;
                (0..n_dims)
                    .map(|d| {
                        let n = geom.true_size[d];
                        let k = rem % n;
                        rem /= n;
                        let theta = 2.0 * std::f64::consts::PI * k as f64 / n as f64;
                        (2.0 * theta.cos() - 2.0) / (geom.step[d] * geom.step[d])
                    })
                    .sum()
            })
            .collect();

        Ok(Self {
            geom: geom.clone(),
            forward,
            inverse,
            eigen,
        })
    }

    /// Write the zero-mean solution of `L phi = rho` into the true nodes of
    /// `phi`. Ghosts of `phi` are left alone.
    pub fn solve(&self, rho: &Grid, phi: &mut Grid) -> Result<(), MgError> {
        for (name, g) in [("rho", rho), ("phi", &*phi)] {
            if !g.geometry().same_layout(&self.geom) {
                return Err(MgError::GeometryMismatch(format!(
                    "{name}: true size {:?}, spectral solver planned for {:?}",
                    g.geometry().true_size,
                    self.geom.true_size
                )));
            }
        }

        let mut data: Vec<Complex<f64>> = rho
            .true_nodes()
            .map(|(off, _)| Complex::new(rho.values()[off], 0.0))
            .collect();
        let mut tmp = vec![Complex::new(0.0, 0.0); data.len()];

        self.transform(&mut data, &mut tmp, &self.forward);
        data.par_iter_mut().zip(self.eigen.par_iter()).for_each(|(v, &lambda)| {
            if lambda == 0.0 {
                *v = Complex::new(0.0, 0.0);
            } else {
                *v /= lambda;
            }
        });
        self.transform(&mut data, &mut tmp, &self.inverse);

        // rustfft is unnormalised
        let scale = 1.0 / data.len() as f64;
        let offsets: Vec<usize> = phi.true_nodes().map(|(off, _)| off).collect();
        let out = phi.values_mut();
        for (off, v) in offsets.into_iter().zip(&data) {
            out[off] = v.re * scale;
        }
        Ok(())
    }

    /// 1D transforms along every axis of the dense, axis-0-fastest `data`.
    fn transform(&self, data: &mut [Complex<f64>], tmp: &mut [Complex<f64>], plans: &[Arc<dyn Fft<f64>>]) {
        let size = &self.geom.true_size;
        let mut stride = 1;
        for (d, fft) in plans.iter().enumerate() {
            let n = size[d];
            if stride == 1 {
                data.par_chunks_mut(n).for_each(|line| fft.process(line));
            } else {
                // gather lines along axis d into contiguous rows of tmp
                {
                    let data_ro: &[Complex<f64>] = data;
                    tmp.par_chunks_mut(n).enumerate().for_each(|(line, row)| {
                        let inner = line % stride;
                        let base = (line / stride) * stride * n + inner;
                        for (k, v) in row.iter_mut().enumerate() {
                            *v = data_ro[base + k * stride];
                        }
                    });
                }
                tmp.par_chunks_mut(n).for_each(|row| fft.process(row));

                // scatter back one outer block at a time
                let tmp_ro: &[Complex<f64>] = tmp;
                data.par_chunks_mut(stride * n).enumerate().for_each(|(outer, block)| {
                    for k in 0..n {
                        for inner in 0..stride {
                            block[k * stride + inner] = tmp_ro[(outer * stride + inner) * n + k];
                        }
                    }
                });
            }
            stride *= n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Domain, Subdomain};
    use crate::grid::BoundaryKind;
    use crate::manufactured::Manufactured;
    use crate::multigrid::residual_l1;

    #[test]
    fn reproduces_manufactured_field() {
        let geom = GridGeometry::new(&[16, 8, 12], &[1.0, 0.5, 2.0], &[BoundaryKind::Periodic; 6]).unwrap();
        let m = Manufactured::standard(&geom).unwrap();
        let mut rho = Grid::new(geom.clone()).unwrap();
        let mut phi = Grid::new(geom.clone()).unwrap();
        m.fill_rho_discrete(&mut rho);
        SpectralPoisson::new(&geom).unwrap().solve(&rho, &mut phi).unwrap();
        for (off, coords) in phi.true_nodes() {
            let x: Vec<usize> = (0..3).map(|d| coords[d] - 1).collect();
            assert!((phi.values()[off] - m.phi(&x)).abs() < 1e-12);
        }
    }

    #[test]
    fn drops_the_mean_of_rho() {
        let geom = GridGeometry::uniform(&[8, 8], BoundaryKind::Periodic).unwrap();
        let mut rho = Grid::new(geom.clone()).unwrap();
        rho.fill_true_with(|x| if x == [2, 5] { 4.0 } else { 0.0 });
        let mut phi = Grid::new(geom.clone()).unwrap();
        SpectralPoisson::new(&geom).unwrap().solve(&rho, &mut phi).unwrap();
        assert!(phi.sum_true().abs() < 1e-12);

        // phi solves the balanced problem rho - mean(rho)
        let mut dom = Subdomain::serial(&geom);
        dom.refresh(&mut phi).unwrap();
        let mut balanced = rho.clone();
        dom.neutralize(&mut balanced).unwrap();
        let mut res = Grid::new(geom).unwrap();
        assert!(residual_l1(&phi, &balanced, &mut res, &mut dom).unwrap() < 1e-10);
    }

    #[test]
    fn needs_periodic_whole_grid() {
        let geom = GridGeometry::uniform(&[8, 8], BoundaryKind::Neumann).unwrap();
        assert!(SpectralPoisson::new(&geom).is_err());
        let part = GridGeometry::uniform(&[8, 8], BoundaryKind::Periodic)
            .unwrap()
            .with_origin(&[8, 0])
            .unwrap();
        assert!(SpectralPoisson::new(&part).is_err());
    }
}
