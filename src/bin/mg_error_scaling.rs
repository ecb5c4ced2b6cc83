// src/bin/mg_error_scaling.rs
//
// Discretization error study: solves the continuous-source manufactured
// problem on a fixed physical box at increasing resolution and reports the
// error against the analytic potential. Second-order convergence shows up as
// an observed order close to 2. The algebraic error of the multigrid solve,
// measured against the exact FFT solution of the same discrete problem, is
// reported alongside and should stay far below the discretization error.
//
// Run:
//   cargo run --release --bin mg_error_scaling
//   cargo run --release --bin mg_error_scaling -- dims=3 nmax=64
//
// Output:
//   out/mg_error_scaling/error_scaling.csv
//   out/mg_error_scaling/error_scaling.png

use std::fs::{File, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::Path;

use pic_mg::config::MgConfig;
use pic_mg::domain::{Domain, Subdomain};
use pic_mg::manufactured::Manufactured;
use pic_mg::multigrid::{MgSolver, error_grid, sum_true_squared};
use pic_mg::visualisation::save_error_scaling_plot;
use pic_mg::{BoundaryKind, Grid, GridGeometry, SpectralPoisson};

struct Sample {
    n: usize,
    h: f64,
    rms: f64,
    max_abs: f64,
    algebraic: f64,
}

fn solve_at(dims: usize, n: usize, length: f64, cfg: &MgConfig) -> Result<Sample, Box<dyn std::error::Error>> {
    let h = length / n as f64;
    let geom = GridGeometry::new(
        &vec![n; dims],
        &vec![h; dims],
        &vec![BoundaryKind::Periodic; 2 * dims],
    )?;
    let problem = Manufactured::standard(&geom)?;

    // as many levels as the grid allows, down to 4 nodes per axis
    let levels = (n / 4).max(1).trailing_zeros() as usize + 1;
    let cfg = MgConfig {
        levels,
        ..cfg.clone()
    };

    let mut domain = Subdomain::serial(&geom);
    let mut phi = Grid::new(geom.clone())?;
    let mut rho = Grid::new(geom.clone())?;
    let mut exact = Grid::new(geom.clone())?;
    problem.fill_rho_continuous(&mut rho);
    problem.fill_phi(&mut exact);
    domain.refresh(&mut rho)?;

    let mut solver = MgSolver::new(&geom, cfg)?;
    solver.solve(&mut phi, &rho, &mut domain)?;

    let mut err = Grid::new(geom.clone())?;
    error_grid(&phi, &exact, &mut err)?;
    let rms = (sum_true_squared(&err, &mut domain)? / geom.n_true_points() as f64).sqrt();
    let max_abs = err
        .true_nodes()
        .map(|(off, _)| err.values()[off].abs())
        .fold(0.0f64, f64::max);

    let mut direct = Grid::new(geom.clone())?;
    SpectralPoisson::new(&geom)?.solve(&rho, &mut direct)?;
    let algebraic = phi
        .true_nodes()
        .map(|(off, _)| (phi.values()[off] - direct.values()[off]).abs())
        .fold(0.0f64, f64::max);

    Ok(Sample {
        n,
        h,
        rms,
        max_abs,
        algebraic,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut dims = 2usize;
    let mut n_max = 256usize;
    for arg in std::env::args().skip(1) {
        match arg.split_once('=') {
            Some(("dims", v)) => dims = v.parse()?,
            Some(("nmax", v)) => n_max = v.parse()?,
            _ => {
                eprintln!("usage: mg_error_scaling [dims=2|3] [nmax=N]");
                std::process::exit(2);
            }
        }
    }

    let length = 1.0;
    let cfg = MgConfig {
        cycles: 30,
        ..MgConfig::default()
    }
    .with_env()?;

    let out_dir = Path::new("out").join("mg_error_scaling");
    create_dir_all(&out_dir)?;
    let mut csv = BufWriter::new(File::create(out_dir.join("error_scaling.csv"))?);
    writeln!(csv, "n,h,rms_error,max_error,algebraic_error,observed_order")?;

    println!(
        "{:>6}  {:>10}  {:>12}  {:>12}  {:>12}  {:>6}",
        "n", "h", "rms", "max", "vs fft", "order"
    );
    let mut points = Vec::new();
    let mut prev: Option<Sample> = None;
    let mut n = 8;
    while n <= n_max {
        let s = solve_at(dims, n, length, &cfg)?;
        let order = prev
            .as_ref()
            .map(|p| (p.rms / s.rms).ln() / (p.h / s.h).ln())
            .unwrap_or(f64::NAN);
        writeln!(
            csv,
            "{},{:.6e},{:.6e},{:.6e},{:.6e},{:.4}",
            s.n, s.h, s.rms, s.max_abs, s.algebraic, order
        )?;
        println!(
            "{:>6}  {:>10.4e}  {:>12.4e}  {:>12.4e}  {:>12.4e}  {:>6.3}",
            s.n, s.h, s.rms, s.max_abs, s.algebraic, order
        );
        points.push((s.h, s.rms));
        prev = Some(s);
        n *= 2;
    }
    csv.flush()?;

    save_error_scaling_plot(
        &points,
        &out_dir.join("error_scaling.png").to_string_lossy(),
    )?;
    Ok(())
}
