//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - a quick look at an ensemble without leaving the terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - ensemble member values: `o`
//! - merged series: `-` line, broken where values are missing
//! - `now`: `|` column

use chrono::NaiveDateTime;

use crate::domain::{AnalyzedData, EnsembleSeries, GP_DATE_FORMAT, MergedSeries, PlotField};

/// Render one field of an ensemble and its merged series.
///
/// x is hours since `meta.start`, spanning the whole window.
pub fn render_ascii_plot(
    ensemble: &EnsembleSeries<AnalyzedData>,
    merged: &MergedSeries<AnalyzedData>,
    field: PlotField,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let meta = &merged.meta;
    let x_max = hours_since(meta.start, meta.end).max(1.0);
    let now_x = hours_since(meta.start, meta.now);

    let members: Vec<(f64, f64)> = ensemble
        .data
        .iter()
        .flat_map(|(_, series)| series.as_ref().iter())
        .map(|row| (hours_since(meta.start, row.valid_time), row.field(field)))
        .filter(|(_, y)| y.is_finite())
        .collect();

    // NaN gaps are kept so the line breaks there.
    let line: Vec<(f64, f64)> = merged
        .data
        .as_ref()
        .iter()
        .map(|row| (hours_since(meta.start, row.valid_time), row.field(field)))
        .collect();

    let (y_min, y_max) = y_range(&members, &line).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Line first so points can overlay.
    draw_curve(&mut grid, &line, x_max, y_min, y_max);

    let now_col = map_x(now_x, x_max, width);
    for row in grid.iter_mut() {
        if row[now_col] == ' ' {
            row[now_col] = '|';
        }
    }

    for &(x, y) in &members {
        let col = map_x(x, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        grid[row][col] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: {} {} | x=[0, {x_max:.0}] h since {}, now at {now_x:.0} h | y=[{y_min:.2}, {y_max:.2}]\n",
        meta.file_stem(),
        field.label(),
        meta.start.format(GP_DATE_FORMAT),
    ));

    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    out
}

fn hours_since(start: NaiveDateTime, t: NaiveDateTime) -> f64 {
    (t - start).num_minutes() as f64 / 60.0
}

fn y_range(points: &[(f64, f64)], curve: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    for &(_, y) in points.iter().chain(curve.iter()) {
        if y.is_finite() {
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }

    if min_y.is_finite() && max_y.is_finite() {
        if max_y > min_y {
            Some((min_y, max_y))
        } else {
            // Flat series: center it.
            Some((min_y - 0.5, max_y + 0.5))
        }
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = (x / x_max).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], x_max: f64, y_min: f64, y_max: f64) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(x, y) in curve {
        if !y.is_finite() {
            prev = None;
            continue;
        }
        let col = map_x(x, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        if let Some((c0, r0)) = prev {
            draw_line(grid, c0, r0, col, row, '-');
        } else {
            grid[row][col] = '-';
        }
        prev = Some((col, row));
    }
}

/// Integer line drawing (Bresenham-ish).
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
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MetaData, Site, TimeSeries};
    use chrono::NaiveDate;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2017, 9, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn meta() -> MetaData {
        MetaData {
            site: Site::new("kmso"),
            model: "gfs".to_string(),
            start: at(0),
            now: at(3),
            end: at(9),
        }
    }

    fn row(h: u32, hdw: f64) -> AnalyzedData {
        AnalyzedData {
            valid_time: at(h),
            lead_time: h as i32,
            hdw,
            t0: f64::NAN,
            dt0: f64::NAN,
            e0: f64::NAN,
            de: f64::NAN,
        }
    }

    #[test]
    fn plot_golden_snapshot_small() {
        let rows = vec![row(0, 10.0), row(9, 20.0)];
        let ens = EnsembleSeries {
            meta: meta(),
            data: vec![(at(0), TimeSeries::new(rows.clone()))],
        };
        let mrg = MergedSeries {
            meta: meta(),
            data: TimeSeries::new(rows),
        };

        let txt = render_ascii_plot(&ens, &mrg, PlotField::Hdw, 10, 5);
        let expected = concat!(
            "Plot: kmso_GFS HDW | x=[0, 9] h since 2017-09-01-00, now at 3 h | y=[9.50, 20.50]\n",
            "   |    -o\n",
            "   |  --  \n",
            "   |--    \n",
            "  --      \n",
            "o- |      \n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn missing_values_leave_only_now_marker() {
        let rows = vec![row(0, f64::NAN), row(9, f64::NAN)];
        let ens = EnsembleSeries {
            meta: meta(),
            data: vec![(at(0), TimeSeries::new(rows.clone()))],
        };
        let mrg = MergedSeries {
            meta: meta(),
            data: TimeSeries::new(rows),
        };

        let txt = render_ascii_plot(&ens, &mrg, PlotField::Hdw, 10, 5);
        let body: Vec<&str> = txt.lines().skip(1).collect();
        assert_eq!(body, vec!["   |      "; 5]);
        assert!(txt.starts_with("Plot: kmso_GFS HDW"));
    }
}
