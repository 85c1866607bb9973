//! ASCII plotting for terminal output.
//!
//! Fixed-size grid with deterministic output (helpful for golden tests).
//!
//! Plot elements:
//! - observed samples: `o`
//! - fitted model: `-` line
//! - optional highlights: `+` (observed above model), `x` (observed below)

use crate::report::ResidualRankings;

/// Render observed samples over the modeled spectrum.
///
/// `x`, `y` and `model` are parallel per-sample slices.
pub fn render_spectrum_plot(
    x: &[f64],
    y: &[f64],
    model: &[f64],
    width: usize,
    height: usize,
    rankings: Option<&ResidualRankings>,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (x_min, x_max) = range(x.iter().copied()).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = range(y.iter().chain(model).copied()).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Model first so samples overlay it.
    let curve: Vec<(f64, f64)> = x.iter().copied().zip(model.iter().copied()).collect();
    draw_curve(&mut grid, &curve, x_min, x_max, y_min, y_max);

    for (&xi, &yi) in x.iter().zip(y) {
        let col = map_x(xi, x_min, x_max, width);
        let row = map_y(yi, y_min, y_max, height);
        grid[row][col] = highlight(xi, rankings);
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: x=[{x_min:.3}, {x_max:.3}] | y=[{y_min:.3}, {y_max:.3}]\n"
    ));
    for row in grid {
        out.push_str(row.into_iter().collect::<String>().trim_end());
        out.push('\n');
    }
    out
}

fn highlight(x: f64, rankings: Option<&ResidualRankings>) -> char {
    match rankings {
        Some(r) if r.over.iter().any(|row| row.x == x) => '+',
        Some(r) if r.under.iter().any(|row| row.x == x) => 'x',
        _ => 'o',
    }
}

fn range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values.filter(|v| v.is_finite()) {
        min = min.min(v);
        max = max.max(v);
    }
    if min.is_finite() && max.is_finite() && max > min {
        Some((min, max))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // Row 0 is the top.
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(
    grid: &mut [Vec<char>],
    curve: &[(f64, f64)],
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
) {
    let height = grid.len();
    let width = grid.first().map_or(0, Vec::len);

    let mut prev = None;
    for &(x, y) in curve.iter().filter(|(_, y)| y.is_finite()) {
        let col = map_x(x, x_min, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        match prev {
            Some((c0, r0)) => draw_line(grid, c0, r0, col, row, '-'),
            None => grid[row][col] = '-',
        }
        prev = Some((col, row));
    }
}

/// Integer line drawing (Bresenham).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if let Some(cell) = grid
            .get_mut(y0 as usize)
            .and_then(|row| row.get_mut(x0 as usize))
        {
            if *cell == ' ' {
                *cell = ch;
            }
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
