// src/multigrid/smoother.rs

use rayon::prelude::*;

use crate::config::SmootherKind;
use crate::domain::Domain;
use crate::error::MgError;
use crate::grid::Grid;

use super::stencil::Stencil;

/// Relaxation scheme for `L phi = rho`, resolved once from the configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Smoother {
    /// `phi <- (1 - omega) phi + omega phi*`, computed out of place.
    WeightedJacobi { omega: f64 },
    /// Two half-sweeps over nodes of equal global index parity.
    RedBlackGaussSeidel,
}

impl Smoother {
    pub fn from_kind(kind: SmootherKind, omega: f64) -> Self {
        match kind {
            SmootherKind::Jacobi => Smoother::WeightedJacobi { omega },
            SmootherKind::GaussSeidel => Smoother::RedBlackGaussSeidel,
        }
    }

    /// Run `sweeps` sweeps on `phi`. Ghosts of `phi` must be valid on entry
    /// and are valid on exit. `tmp` is scratch with the same layout.
    pub fn smooth<D: Domain + ?Sized>(
        &self,
        phi: &mut Grid,
        rho: &Grid,
        tmp: &mut Grid,
        sweeps: usize,
        domain: &mut D,
    ) -> Result<(), MgError> {
        match *self {
            Smoother::WeightedJacobi { omega } => {
                for _ in 0..sweeps {
                    jacobi_sweep(phi, rho, tmp, omega);
                    phi.swap_values(tmp)?;
                    domain.refresh(phi)?;
                }
            }
            Smoother::RedBlackGaussSeidel => {
                for _ in 0..sweeps {
                    for colour in 0..2 {
                        gauss_seidel_colour(phi, rho, tmp, colour);
                        domain.refresh(phi)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// One weighted Jacobi sweep from `phi` into the true nodes of `tmp`.
fn jacobi_sweep(phi: &Grid, rho: &Grid, tmp: &mut Grid, omega: f64) {
    let st = Stencil::new(phi);
    let phi_ro = phi.values();
    let rho_ro = rho.values();
    let nx = st.row_len();

    tmp.values_mut()
        .par_chunks_mut(nx)
        .enumerate()
        .for_each(|(row_idx, tmp_row)| {
            let Some(row) = st.true_row(row_idx) else {
                return;
            };
            let base = row_idx * nx;
            for i in st.true_cols() {
                let id = base + i;
                let phi_new = st.relaxed(phi_ro, rho_ro, id, i, &row);
                tmp_row[i] = (1.0 - omega) * phi_ro[id] + omega * phi_new;
            }
        });
}

/// Update nodes of one colour. Within a colour updates only read the other
/// colour, so new values are computed into `tmp` in parallel, then copied back.
fn gauss_seidel_colour(phi: &mut Grid, rho: &Grid, tmp: &mut Grid, colour: usize) {
    let st = Stencil::new(phi);
    let nx = st.row_len();
    let rho_ro = rho.values();

    {
        let phi_ro = phi.values();
        tmp.values_mut()
            .par_chunks_mut(nx)
            .enumerate()
            .for_each(|(row_idx, tmp_row)| {
                let Some(row) = st.true_row(row_idx) else {
                    return;
                };
                let base = row_idx * nx;
                for i in st.true_cols() {
                    if st.colour(i, &row) != colour {
                        continue;
                    }
                    tmp_row[i] = st.relaxed(phi_ro, rho_ro, base + i, i, &row);
                }
            });
    }

    let tmp_ro = tmp.values();
    phi.values_mut()
        .par_chunks_mut(nx)
        .enumerate()
        .for_each(|(row_idx, phi_row)| {
            let Some(row) = st.true_row(row_idx) else {
                return;
            };
            let base = row_idx * nx;
            for i in st.true_cols() {
                if st.colour(i, &row) == colour {
                    phi_row[i] = tmp_ro[base + i];
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Subdomain;
    use crate::grid::{BoundaryKind, GridGeometry};

    fn dirichlet_4x4() -> GridGeometry {
        GridGeometry::uniform(&[4, 4], BoundaryKind::Dirichlet).unwrap()
    }

    // Naive red-black reference on a padded 6x6 array.
    fn reference_rbgs(phi: &mut [[f64; 6]; 6], rho: &[[f64; 6]; 6], sweeps: usize) {
        for _ in 0..sweeps {
            for colour in 0..2 {
                for j in 1..5 {
                    for i in 1..5 {
                        if (i - 1 + j - 1) % 2 != colour {
                            continue;
                        }
                        phi[j][i] = (phi[j][i - 1] + phi[j][i + 1] + phi[j - 1][i] + phi[j + 1][i]
                            - rho[j][i])
                            / 4.0;
                    }
                }
            }
        }
    }

    #[test]
    fn red_black_matches_hand_loop() {
        let geom = dirichlet_4x4();
        let mut dom = Subdomain::serial(&geom);
        let mut phi = Grid::new(geom.clone()).unwrap();
        let mut rho = Grid::new(geom.clone()).unwrap();
        let mut tmp = Grid::new(geom).unwrap();
        rho.set(&[1, 1], 1.0);

        Smoother::RedBlackGaussSeidel
            .smooth(&mut phi, &rho, &mut tmp, 1, &mut dom)
            .unwrap();
        // (1, 1) is red: neighbours still zero
        assert_eq!(phi.get(&[1, 1]), -0.25);
        assert_eq!(phi.get(&[0, 1]), -0.0625);

        Smoother::RedBlackGaussSeidel
            .smooth(&mut phi, &rho, &mut tmp, 2, &mut dom)
            .unwrap();

        let mut p = [[0.0; 6]; 6];
        let mut r = [[0.0; 6]; 6];
        r[2][2] = 1.0;
        reference_rbgs(&mut p, &r, 3);
        for j in 0..4isize {
            for i in 0..4isize {
                let want = p[j as usize + 1][i as usize + 1];
                assert!(
                    (phi.get(&[i, j]) - want).abs() < 1e-15,
                    "({i},{j}): {} vs {want}",
                    phi.get(&[i, j])
                );
            }
        }
    }

    #[test]
    fn jacobi_keeps_ghosts_consistent() {
        let geom = GridGeometry::uniform(&[8, 8], BoundaryKind::Periodic).unwrap();
        let mut dom = Subdomain::serial(&geom);
        let mut phi = Grid::new(geom.clone()).unwrap();
        let mut rho = Grid::new(geom.clone()).unwrap();
        let mut tmp = Grid::new(geom).unwrap();
        rho.fill_true_with(|x| if x == [2, 3] { 1.0 } else if x == [5, 5] { -1.0 } else { 0.0 });

        Smoother::WeightedJacobi { omega: 2.0 / 3.0 }
            .smooth(&mut phi, &rho, &mut tmp, 3, &mut dom)
            .unwrap();
        for j in 0..8isize {
            assert_eq!(phi.get(&[-1, j]), phi.get(&[7, j]));
            assert_eq!(phi.get(&[8, j]), phi.get(&[0, j]));
        }
        assert!(phi.get(&[2, 3]) < 0.0);
        assert!(phi.get(&[5, 5]) > 0.0);
    }
}
