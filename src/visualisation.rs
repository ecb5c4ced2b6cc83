// src/visualisation.rs

use plotters::prelude::*;

use crate::grid::Grid;

/// Blue-white-red map of `v` within `[lo, hi]`.
fn value_to_color(v: f64, lo: f64, hi: f64) -> RGBColor {
    let (lo, hi) = if !lo.is_finite() || !hi.is_finite() || (hi - lo).abs() < 1e-300 {
        (-1.0, 1.0)
    } else {
        (lo, hi)
    };
    let x = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);
    let r = (255.0 * x) as u8;
    let b = (255.0 * (1.0 - x)) as u8;
    let g = (255.0 * (1.0 - 2.0 * (x - 0.5).abs())).clamp(0.0, 255.0) as u8;
    RGBColor(r, g, b)
}

/// Heat map of the true nodes of a scalar grid. 3D grids are cut at the
/// middle of axis 2.
pub fn save_slice_plot(
    grid: &Grid,
    title: &str,
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let geom = grid.geometry();
    let nx = geom.true_size[0] as i32;
    let ny = geom.true_size[1] as i32;
    let at = |i: i32, j: i32| -> f64 {
        if grid.n_dims() == 3 {
            grid.get(&[i as isize, j as isize, (geom.true_size[2] / 2) as isize])
        } else {
            grid.get(&[i as isize, j as isize])
        }
    };

    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for j in 0..ny {
        for i in 0..nx {
            let v = at(i, j);
            if v.is_finite() {
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
    }

    let root = BitMapBackend::new(filename, (800, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(40)
        .caption(format!("{title} (blue = {lo:.3e}, red = {hi:.3e})"), ("sans-serif", 20))
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(0..nx, 0..ny)?;

    chart
        .configure_mesh()
        .x_desc("x (node index)")
        .y_desc("y (node index)")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series((0..nx).flat_map(|i| {
        (0..ny).map(move |j| {
            Rectangle::new([(i, j), (i + 1, j + 1)], value_to_color(at(i, j), lo, hi).filled())
        })
    }))?;

    root.present()?;
    Ok(())
}

/// Residual L1 norm per cycle on a log axis.
pub fn save_residual_plot(residuals: &[f64], filename: &str) -> Result<(), Box<dyn std::error::Error>> {
    let positive: Vec<(f64, f64)> = residuals
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_finite() && **r > 0.0)
        .map(|(c, &r)| ((c + 1) as f64, r))
        .collect();
    if positive.is_empty() {
        return Ok(());
    }

    let y_min = positive.iter().map(|p| p.1).fold(f64::INFINITY, f64::min) * 0.5;
    let y_max = positive.iter().map(|p| p.1).fold(0.0, f64::max) * 2.0;
    let x_max = (residuals.len() as f64).max(2.0);

    let root = BitMapBackend::new(filename, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption("Multigrid residual vs cycle", ("sans-serif", 30))
        .set_left_and_bottom_label_area_size(60)
        .build_cartesian_2d(1.0..x_max, (y_min..y_max).log_scale())?;

    chart
        .configure_mesh()
        .x_desc("cycle")
        .y_desc("|L phi - rho|_1")
        .draw()?;

    chart.draw_series(LineSeries::new(positive.iter().copied(), &BLACK))?;
    chart.draw_series(positive.iter().map(|&p| Circle::new(p, 3, BLACK.filled())))?;

    root.present()?;
    Ok(())
}

/// Error against grid spacing on log-log axes.
pub fn save_error_scaling_plot(
    samples: &[(f64, f64)],
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let pts: Vec<(f64, f64)> = samples
        .iter()
        .copied()
        .filter(|(h, e)| *h > 0.0 && *e > 0.0)
        .collect();
    if pts.len() < 2 {
        return Ok(());
    }
    let h_min = pts.iter().map(|p| p.0).fold(f64::INFINITY, f64::min) * 0.8;
    let h_max = pts.iter().map(|p| p.0).fold(0.0, f64::max) * 1.25;
    let e_min = pts.iter().map(|p| p.1).fold(f64::INFINITY, f64::min) * 0.5;
    let e_max = pts.iter().map(|p| p.1).fold(0.0, f64::max) * 2.0;

    let root = BitMapBackend::new(filename, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption("Discretization error vs grid spacing", ("sans-serif", 30))
        .set_left_and_bottom_label_area_size(60)
        .build_cartesian_2d((h_min..h_max).log_scale(), (e_min..e_max).log_scale())?;

    chart.configure_mesh().x_desc("h").y_desc("rms error").draw()?;

    chart
        .draw_series(LineSeries::new(pts.iter().copied(), &BLACK))?
        .label("measured")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK));

    // second-order reference through the coarsest sample
    let (h0, e0) = pts[0];
    chart
        .draw_series(LineSeries::new(
            pts.iter().map(|&(h, _)| (h, e0 * (h / h0).powi(2))),
            &RED,
        ))?
        .label("O(h^2)")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}
