// tests/decomposed.rs
//
// Block-decomposed solves over in-process ranks must reproduce the
// single-rank result.

use pic_mg::comm::LocalComm;
use pic_mg::config::{CycleKind, MgConfig, SmootherKind};
use pic_mg::domain::{Decomposition, Domain, Subdomain};
use pic_mg::multigrid::MgSolver;
use pic_mg::{BoundaryKind, Communicator, Grid, GridGeometry, Side};

type Source = fn(&[usize]) -> f64;

fn solve_on<C: Communicator>(
    comm: C,
    global: &GridGeometry,
    ranks: &[usize],
    rho_at: Source,
    upper_x: f64,
    cfg: &MgConfig,
) -> (Grid, Vec<f64>) {
    let decomp = Decomposition::new(global, ranks, comm.rank()).unwrap();
    let local = decomp.local_geometry(global).unwrap();
    let mut dom = Subdomain::new(comm, decomp).unwrap();
    let mut phi = Grid::new(local.clone()).unwrap();
    let mut rho = Grid::new(local.clone()).unwrap();
    phi.set_boundary_value(0, Side::Upper, upper_x);
    rho.fill_true_with(rho_at);
    if local.needs_neutralization() {
        dom.neutralize(&mut rho).unwrap();
    }
    dom.refresh(&mut rho).unwrap();
    let mut solver = MgSolver::new(&local, cfg.clone()).unwrap();
    let report = solver.solve(&mut phi, &rho, &mut dom).unwrap();
    (phi, report.residual_l1)
}

/// Largest difference between the decomposed and the serial solution, plus
/// both residual histories.
fn compare(global: &GridGeometry, ranks: &[usize], rho_at: Source, upper_x: f64, cfg: &MgConfig) -> (f64, Vec<f64>, Vec<f64>) {
    let ones = vec![1; global.n_dims()];
    let (serial, serial_res) = solve_on(pic_mg::SerialComm, global, &ones, rho_at, upper_x, cfg);

    let n_ranks = ranks.iter().product();
    let parts: Vec<(Grid, Vec<f64>)> = std::thread::scope(|s| {
        let handles: Vec<_> = LocalComm::world(n_ranks)
            .into_iter()
            .map(|comm| s.spawn(move || solve_on(comm, global, ranks, rho_at, upper_x, cfg)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut max_diff = 0.0f64;
    for (phi, _) in &parts {
        for (off, coords) in phi.true_nodes() {
            let idx: Vec<isize> = (0..global.n_dims())
                .map(|d| phi.global_index(d, coords[d]))
                .collect();
            max_diff = max_diff.max((phi.values()[off] - serial.get(&idx)).abs());
        }
    }
    // every rank sees the same global residual
    for (_, res) in &parts[1..] {
        assert_eq!(res, &parts[0].1);
    }
    (max_diff, serial_res, parts[0].1.clone())
}

fn two_bumps(x: &[usize]) -> f64 {
    let k = 2.0 * std::f64::consts::PI / 32.0;
    (k * x[0] as f64).cos() * (2.0 * k * x[1] as f64).sin() + 0.25 * (3.0 * k * x[1] as f64).cos()
}

fn point_charges(x: &[usize]) -> f64 {
    match x {
        [3, 5, ..] => 1.0,
        [12, 9, ..] => -1.0,
        _ => 0.0,
    }
}

#[test]
fn two_by_two_v_cycles_match_serial() {
    let global = GridGeometry::uniform(&[32, 32], BoundaryKind::Periodic).unwrap();
    let cfg = MgConfig {
        levels: 4,
        cycles: 6,
        monitor: true,
        ..MgConfig::default()
    };
    let (diff, serial, split) = compare(&global, &[2, 2], two_bumps, 0.0, &cfg);
    assert!(diff < 1e-9, "max difference {diff}");
    for (a, b) in serial.iter().zip(&split) {
        assert!((a - b).abs() <= 1e-9 * a.abs().max(1e-12), "{serial:?} vs {split:?}");
    }
}

#[test]
fn fmg_and_jacobi_match_serial_on_strips() {
    let global = GridGeometry::uniform(&[32, 16], BoundaryKind::Periodic).unwrap();
    let cfg = MgConfig {
        levels: 3,
        cycles: 4,
        cycle: CycleKind::Fmg,
        pre_smoother: SmootherKind::Jacobi,
        post_smoother: SmootherKind::Jacobi,
        ..MgConfig::default()
    };
    let (diff, _, _) = compare(&global, &[4, 1], two_bumps, 0.0, &cfg);
    assert!(diff < 1e-9, "max difference {diff}");
}

#[test]
fn three_dimensional_blocks_match_serial() {
    let global = GridGeometry::uniform(&[16, 16, 16], BoundaryKind::Periodic).unwrap();
    let cfg = MgConfig {
        levels: 3,
        cycles: 3,
        cycle: CycleKind::W,
        ..MgConfig::default()
    };
    let (diff, _, _) = compare(&global, &[2, 2, 2], point_charges, 0.0, &cfg);
    assert!(diff < 1e-9, "max difference {diff}");
}

#[test]
fn dirichlet_faces_split_across_ranks() {
    let mut global = GridGeometry::uniform(&[32, 32], BoundaryKind::Periodic).unwrap();
    global.boundary[0] = BoundaryKind::Dirichlet;
    global.boundary[2] = BoundaryKind::Dirichlet;
    let cfg = MgConfig {
        levels: 4,
        cycles: 8,
        monitor: true,
        ..MgConfig::default()
    };
    let (diff, serial, _) = compare(&global, &[2, 2], point_charges, 1.0, &cfg);
    assert!(diff < 1e-9, "max difference {diff}");
    for w in serial.windows(2) {
        assert!(w[1] < 0.5 * w[0], "residuals {serial:?}");
    }
}

#[test]
fn neumann_faces_split_across_ranks() {
    let global = GridGeometry::uniform(&[32, 32], BoundaryKind::Neumann).unwrap();
    let cfg = MgConfig {
        levels: 4,
        cycles: 8,
        cycle: CycleKind::W,
        monitor: true,
        ..MgConfig::default()
    };
    let (diff, serial, _) = compare(&global, &[2, 2], two_bumps, 0.0, &cfg);
    assert!(diff < 1e-9, "max difference {diff}");
    assert!(serial[7] < 1e-4 * serial[0], "residuals {serial:?}");
}

#[test]
fn subdomain_rejects_mismatched_communicator() {
    let global = GridGeometry::uniform(&[8, 8], BoundaryKind::Periodic).unwrap();
    let mut world = LocalComm::world(2);
    let comm = world.remove(1);
    let decomp = Decomposition::new(&global, &[2, 2], 1).unwrap();
    assert!(Subdomain::new(comm, decomp).is_err());
}

#[test]
fn neutralize_uses_global_mean() {
    let global = GridGeometry::uniform(&[8, 8], BoundaryKind::Periodic).unwrap();
    let means: Vec<f64> = std::thread::scope(|s| {
        let handles: Vec<_> = LocalComm::world(2)
            .into_iter()
            .map(|comm| {
                let global = &global;
                s.spawn(move || {
                    let decomp = Decomposition::new(global, &[2, 1], comm.rank()).unwrap();
                    let mut g = Grid::new(decomp.local_geometry(global).unwrap()).unwrap();
                    // rank 0 holds zeros, rank 1 holds ones
                    g.fill_true_with(|x| if x[0] >= 4 { 1.0 } else { 0.0 });
                    let mut dom = Subdomain::new(comm, decomp).unwrap();
                    dom.neutralize(&mut g).unwrap();
                    g.sum_true() / g.geometry().n_true_points() as f64
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(means, vec![-0.5, 0.5]);
}
