// src/bin/mg_decomposed.rs
//
// Runs the manufactured periodic problem on a block decomposition, one thread
// per rank talking through in-process channels, and compares the assembled
// result against a single-rank solve of the same problem.
//
// Run:
//   cargo run --release --bin mg_decomposed
//   cargo run --release --bin mg_decomposed -- n=128 ranks=4x2 levels=5
//
// The maximum pointwise difference should be at round-off level: the
// red-black colouring follows global indices, so every rank layout performs
// the same arithmetic up to the order of global sums.

use std::time::Instant;

use log::info;

use pic_mg::comm::LocalComm;
use pic_mg::config::MgConfig;
use pic_mg::domain::{Decomposition, Domain, Subdomain};
use pic_mg::manufactured::Manufactured;
use pic_mg::multigrid::MgSolver;
use pic_mg::{BoundaryKind, Communicator, Grid, GridGeometry, MgError};

fn parse_ranks(s: &str) -> Result<Vec<usize>, MgError> {
    s.split('x')
        .map(|p| {
            p.parse::<usize>()
                .map_err(|_| MgError::Config(format!("ranks: cannot parse '{s}'")))
        })
        .collect()
}

/// Solve on one rank; returns the local solution and the last monitored residual.
fn solve_rank<C: Communicator>(
    comm: C,
    global: &GridGeometry,
    ranks: &[usize],
    problem: &Manufactured,
    cfg: &MgConfig,
) -> Result<(Grid, Option<f64>), MgError> {
    let decomp = Decomposition::new(global, ranks, comm.rank())?;
    let local = decomp.local_geometry(global)?;
    let mut domain = Subdomain::new(comm, decomp)?;

    let mut phi = Grid::new(local.clone())?;
    let mut rho = Grid::new(local.clone())?;
    problem.fill_rho_discrete(&mut rho);
    domain.refresh(&mut rho)?;

    let mut solver = MgSolver::new(&local, cfg.clone())?;
    let report = solver.solve(&mut phi, &rho, &mut domain)?;
    Ok((phi, report.residual_l1.last().copied()))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut n = 64usize;
    let mut ranks = vec![2usize, 2];
    let mut cfg = MgConfig {
        levels: 4,
        cycles: 8,
        monitor: true,
        ..MgConfig::default()
    }
    .with_env()?;

    for arg in std::env::args().skip(1) {
        match arg.split_once('=') {
            Some(("n", v)) => n = v.parse()?,
            Some(("ranks", v)) => ranks = parse_ranks(v)?,
            Some(("levels", v)) => cfg.levels = v.parse()?,
            Some(("cycles", v)) => cfg.cycles = v.parse()?,
            Some(("cycle", v)) => cfg.cycle = v.parse()?,
            _ => {
                eprintln!("usage: mg_decomposed [n=N] [ranks=RxR[xR]] [levels=L] [cycles=C] [cycle=NAME]");
                std::process::exit(2);
            }
        }
    }

    let dims = ranks.len();
    let global = GridGeometry::new(
        &vec![n; dims],
        &vec![1.0; dims],
        &vec![BoundaryKind::Periodic; 2 * dims],
    )?;
    let problem = Manufactured::standard(&global)?;

    let t0 = Instant::now();
    let (serial, serial_res) = solve_rank(
        pic_mg::SerialComm,
        &global,
        &vec![1; dims],
        &problem,
        &cfg,
    )?;
    let t_serial = t0.elapsed();

    let n_ranks: usize = ranks.iter().product();
    info!("decomposing {:?} over {:?} ({} ranks)", global.true_size, ranks, n_ranks);
    let t0 = Instant::now();
    let results: Vec<Result<(Grid, Option<f64>), MgError>> = std::thread::scope(|s| {
        let handles: Vec<_> = LocalComm::world(n_ranks)
            .into_iter()
            .map(|comm| {
                let (global, ranks, problem, cfg) = (&global, &ranks, &problem, &cfg);
                s.spawn(move || solve_rank(comm, global, ranks, problem, cfg))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(MgError::Comm("rank thread panicked".to_string())))
            })
            .collect()
    });
    let t_split = t0.elapsed();

    let mut max_diff = 0.0f64;
    let mut split_res = None;
    for result in results {
        let (phi, res) = result?;
        split_res = split_res.or(res);
        for (off, coords) in phi.true_nodes() {
            let idx: Vec<isize> = (0..dims).map(|d| phi.global_index(d, coords[d])).collect();
            max_diff = max_diff.max((phi.values()[off] - serial.get(&idx)).abs());
        }
    }

    println!("grid {:?}, ranks {:?}, {} levels, {} cycles", global.true_size, ranks, cfg.levels, cfg.cycles);
    println!("serial:     {:>10.3} ms, residual {:?}", t_serial.as_secs_f64() * 1e3, serial_res);
    println!("decomposed: {:>10.3} ms, residual {:?}", t_split.as_secs_f64() * 1e3, split_res);
    println!("max |phi_decomposed - phi_serial| = {max_diff:.3e}");
    Ok(())
}
