// src/main.rs
//
// Exploratory driver: solves a manufactured periodic Poisson problem with the
// multigrid solver and reports the residual after every cycle.
//
// Solver settings come from PIC_MG_* environment variables (see
// MgConfig::from_env) and can be overridden on the command line.
//
// Examples:
//
//   cargo run --release -- n=128 levels=6 cycles=12
//       -> 2D 128x128 periodic problem, V-cycles, residual table on stdout.
//
//   RUST_LOG=debug cargo run --release -- dims=3 n=64 cycle=mgFMG smoother=mgJacob
//       -> 3D run with full multigrid and Jacobi smoothing.
//
// Outputs (per run directory):
//   runs/<run_id>/
//     ├── config.json
//     ├── residual.csv
//     ├── residual.png
//     └── phi.png

use std::env;
use std::fs::{File, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;

use pic_mg::config::{MgConfig, ProblemConfig, RunConfig, RunInfo};
use pic_mg::domain::{Domain, Subdomain};
use pic_mg::manufactured::Manufactured;
use pic_mg::multigrid::{MgSolver, error_grid, sum_true_squared};
use pic_mg::visualisation::{save_residual_plot, save_slice_plot};
use pic_mg::{BoundaryKind, Grid, GridGeometry, MgError};

fn print_usage() {
    eprintln!(
        r#"Usage:
  cargo run -- [dims=2|3] [n=N] [h=VAL]
             [levels=L] [cycles=C] [pre=N] [post=N] [coarse=N]
             [smoother=mgGS|mgJacob] [cycle=mgVRegular|mgW|mgFMG] [omega=VAL]
             [out=DIR] [run=RUN_ID]

Notes:
  - The grid is periodic with N nodes per axis; N must be divisible by 2^(L-1).
  - rho is the exact discrete Laplacian of a two-mode cosine field, so the
    error printed at the end should fall to round-off.
  - Unset options fall back to PIC_MG_* environment variables, then defaults.
"#
    );
}

fn sanitize_run_id(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn default_run_id(dims: usize, n: usize, cfg: &MgConfig) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| std::time::Duration::from_secs(0));
    format!(
        "{}{:03}_{}d_n{}_L{}_{:?}",
        now.as_secs(),
        now.subsec_millis(),
        dims,
        n,
        cfg.levels,
        cfg.cycle
    )
}

fn unique_run_dir(out_root: &str, run_id: &str) -> PathBuf {
    let base = PathBuf::from(out_root);
    let mut dir = base.join(run_id);
    if !dir.exists() {
        return dir;
    }
    for k in 1..1000 {
        let cand = base.join(format!("{}_{}", run_id, k));
        if !cand.exists() {
            dir = cand;
            break;
        }
    }
    dir
}

#[derive(Debug)]
struct Args {
    dims: usize,
    n: usize,
    h: f64,
    out_root: String,
    run_id: Option<String>,
    cfg: MgConfig,
}

fn parse_args(argv: &[String]) -> Result<Option<Args>, MgError> {
    fn num<T: std::str::FromStr>(key: &str, v: &str) -> Result<T, MgError> {
        v.parse::<T>()
            .map_err(|_| MgError::Config(format!("{key}: cannot parse '{v}'")))
    }

    let mut args = Args {
        dims: 2,
        n: 64,
        h: 1.0,
        out_root: "runs".to_string(),
        run_id: None,
        cfg: MgConfig {
            levels: 5,
            monitor: true,
            ..MgConfig::default()
        }
        .with_env()?,
    };

    for arg in argv.iter().skip(1) {
        if arg == "-h" || arg == "--help" || arg == "help" {
            print_usage();
            return Ok(None);
        }
        let Some((key, v)) = arg.split_once('=') else {
            return Err(MgError::Config(format!("unrecognised argument '{arg}'")));
        };
        match key {
            "dims" => args.dims = num(key, v)?,
            "n" => args.n = num(key, v)?,
            "h" => args.h = num(key, v)?,
            "levels" => args.cfg.levels = num(key, v)?,
            "cycles" => args.cfg.cycles = num(key, v)?,
            "pre" => args.cfg.pre_smooth = num(key, v)?,
            "post" => args.cfg.post_smooth = num(key, v)?,
            "coarse" => args.cfg.coarse_solve = num(key, v)?,
            "omega" => args.cfg.omega = num(key, v)?,
            "smoother" => {
                let kind = v.parse()?;
                args.cfg.pre_smoother = kind;
                args.cfg.post_smoother = kind;
                args.cfg.coarse_smoother = kind;
            }
            "cycle" => args.cfg.cycle = v.parse()?,
            "out" => args.out_root = v.to_string(),
            "run" => args.run_id = Some(sanitize_run_id(v)),
            _ => return Err(MgError::Config(format!("unknown option '{key}'"))),
        }
    }
    args.cfg.validate()?;
    Ok(Some(args))
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let Args {
        dims,
        n,
        h,
        out_root,
        run_id,
        cfg,
    } = args;

    let geom = GridGeometry::new(
        &vec![n; dims],
        &vec![h; dims],
        &vec![BoundaryKind::Periodic; 2 * dims],
    )?;
    let problem = Manufactured::standard(&geom)?;

    let mut domain = Subdomain::serial(&geom);
    let mut phi = Grid::new(geom.clone())?;
    let mut rho = Grid::new(geom.clone())?;
    let mut exact = Grid::new(geom.clone())?;
    problem.fill_rho_discrete(&mut rho);
    problem.fill_phi(&mut exact);
    domain.refresh(&mut rho)?;

    let mut solver = MgSolver::new(&geom, cfg.clone())?;

    let run_id = run_id.unwrap_or_else(|| default_run_id(dims, n, &cfg));
    let out_dir = unique_run_dir(&out_root, &run_id);
    create_dir_all(&out_dir)?;
    info!("writing to {}", out_dir.display());

    RunConfig {
        geometry: geom.clone(),
        multigrid: cfg.clone(),
        problem: ProblemConfig {
            description: "periodic two-mode cosine, rho = discrete Laplacian".to_string(),
            ranks_per_axis: vec![1; dims],
        },
        run: RunInfo {
            binary: "pic_mg".to_string(),
            run_id: run_id.clone(),
            git_commit: None,
            timestamp_utc: None,
        },
    }
    .write_to_dir(&out_dir)?;

    let report = solver.solve(&mut phi, &rho, &mut domain)?;

    let mut csv = BufWriter::new(File::create(out_dir.join("residual.csv"))?);
    writeln!(csv, "cycle,residual_l1,reduction")?;
    println!("{:>6}  {:>14}  {:>10}", "cycle", "residual_l1", "reduction");
    let mut prev: Option<f64> = None;
    for (c, &r) in report.residual_l1.iter().enumerate() {
        let factor = prev.map(|p| r / p).unwrap_or(f64::NAN);
        writeln!(csv, "{},{:.16e},{:.6e}", c + 1, r, factor)?;
        println!("{:>6}  {:>14.6e}  {:>10.4}", c + 1, r, factor);
        prev = Some(r);
    }
    csv.flush()?;

    save_residual_plot(
        &report.residual_l1,
        &out_dir.join("residual.png").to_string_lossy(),
    )?;
    save_slice_plot(&phi, "phi", &out_dir.join("phi.png").to_string_lossy())?;

    let mut err = Grid::new(geom.clone())?;
    error_grid(&phi, &exact, &mut err)?;
    let rms = (sum_true_squared(&err, &mut domain)? / geom.n_true_points() as f64).sqrt();
    println!(
        "\n{} cycles in {:.3} ms, rms error vs exact discrete solution {:.3e}",
        report.cycles,
        report.elapsed.as_secs_f64() * 1e3,
        rms
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let argv: Vec<String> = env::args().collect();

    let args = match parse_args(&argv) {
        Ok(Some(a)) => a,
        Ok(None) => return ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
