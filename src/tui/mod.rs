//! Ratatui-based terminal UI.
//!
//! The TUI lists the loaded ensembles on the left and charts one field of the
//! selected ensemble on the right: merged series as a line, every ensemble
//! member as dots, `now` as a vertical marker.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDateTime;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
};

use crate::app::pipeline::PreparedEnsemble;
use crate::domain::{GP_DATE_FORMAT, PlotField, RunConfig};
use crate::error::AppError;

mod plotters_chart;

use plotters_chart::EnsemblePlottersChart;

const X_LABEL: &str = "hours since start";

/// Start the TUI on already prepared ensembles.
pub fn run(ensembles: Vec<PreparedEnsemble>, config: &RunConfig) -> Result<(), AppError> {
    let mut app = App::new(ensembles, config.field, config.output_dir.clone());

    let _guard = TerminalGuard::new()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal =
        Terminal::new(backend).map_err(|e| AppError::runtime(format!("Failed to initialize terminal: {e}")))?;

    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::runtime(format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::runtime(format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

struct App {
    ensembles: Vec<PreparedEnsemble>,
    selected: usize,
    field: PlotField,
    output_dir: PathBuf,
    status: String,
}

impl App {
    fn new(ensembles: Vec<PreparedEnsemble>, field: PlotField, output_dir: PathBuf) -> Self {
        let status = format!("Loaded {} ensemble(s).", ensembles.len());
        Self {
            ensembles,
            selected: 0,
            field,
            output_dir,
            status,
        }
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::runtime(format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::runtime(format!("Event poll error: {e}")))?
            {
                continue;
            }

            match event::read().map_err(|e| AppError::runtime(format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns `true` when the app should quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Down => {
                if self.selected + 1 < self.ensembles.len() {
                    self.selected += 1;
                }
            }
            KeyCode::Left => {
                self.field = self.field.prev();
                self.status = format!("field: {}", self.field.label());
            }
            KeyCode::Right | KeyCode::Char('f') => {
                self.field = self.field.next();
                self.status = format!("field: {}", self.field.label());
            }
            KeyCode::Char('s') => self.save_selected(),
            _ => {}
        }
        false
    }

    fn save_selected(&mut self) {
        let Some(prep) = self.ensembles.get(self.selected) else {
            self.status = "Nothing to save.".to_string();
            return;
        };
        self.status = match crate::io::export::save_ensemble(
            &self.output_dir,
            &prep.ensemble,
            &prep.merged,
            prep.partitions.as_ref(),
        ) {
            Ok(written) => format!("Saved {} file(s) to {}", written.len(), self.output_dir.display()),
            Err(err) => format!("Save failed: {err}"),
        };
    }

    fn draw(&self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(4), Constraint::Min(0), Constraint::Length(3)])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let mut lines: Vec<Line> = Vec::new();
        lines.push(Line::from(vec![
            Span::styled("fwx", Style::default().fg(Color::Cyan)),
            Span::raw(" fire-weather ensembles"),
        ]));

        if let Some(prep) = self.ensembles.get(self.selected) {
            let meta = &prep.merged.meta;
            lines.push(Line::from(Span::styled(
                format!(
                    "{} | now: {} | window: {} → {} | field: {}",
                    meta.title(),
                    meta.now.format(GP_DATE_FORMAT),
                    meta.start.format(GP_DATE_FORMAT),
                    meta.end.format(GP_DATE_FORMAT),
                    self.field.label(),
                ),
                Style::default().fg(Color::Gray),
            )));
        }

        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(28), Constraint::Min(0)])
            .split(area);

        self.draw_list(frame, chunks[0]);
        self.draw_chart(frame, chunks[1]);
    }

    fn draw_list(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let items: Vec<ListItem> = self
            .ensembles
            .iter()
            .map(|p| {
                let meta = &p.ensemble.meta;
                ListItem::new(format!(
                    "{} {} ({})",
                    meta.site.id,
                    meta.model.to_uppercase(),
                    p.ensemble.len()
                ))
            })
            .collect();

        let list = List::new(items)
            .block(Block::default().title("Ensembles").borders(Borders::ALL))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White))
            .highlight_symbol("» ");

        let mut state = ListState::default();
        state.select(Some(self.selected));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let block = Block::default().title(self.field.label()).borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let Some(prep) = self.ensembles.get(self.selected) else {
            let msg = Paragraph::new("No ensembles loaded.").style(Style::default().fg(Color::Yellow));
            frame.render_widget(msg, inner);
            return;
        };

        let data = chart_series(prep, self.field);
        if data.members.is_empty() {
            let msg = Paragraph::new(format!("No {} values in this ensemble.", self.field.label()))
                .style(Style::default().fg(Color::Yellow));
            frame.render_widget(msg, inner);
            return;
        }

        let (chart_rect, insets) = chart_layout(inner);
        let widget = EnsemblePlottersChart {
            merged: &data.merged,
            members: &data.members,
            now_x: data.now_x,
            x_bounds: data.x_bounds,
            y_bounds: data.y_bounds,
            x_label: X_LABEL,
            y_label: self.field.label(),
            fmt_x: fmt_axis_x,
            fmt_y: fmt_axis_y,
        };

        frame.render_widget(widget, chart_rect);
        if let Some(insets) = insets {
            draw_axis_ticks(frame, inner, chart_rect, insets, data.x_bounds, data.y_bounds, self.field);
        }
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "↑/↓ ensemble  ←/→ f field  s save .dat  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

/// Chart-ready data for one ensemble and field.
#[derive(Debug, Clone, PartialEq)]
struct ChartData {
    merged: Vec<Vec<(f64, f64)>>,
    members: Vec<(f64, f64)>,
    now_x: f64,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
}

fn chart_series(prep: &PreparedEnsemble, field: PlotField) -> ChartData {
    let meta = &prep.merged.meta;
    let hours = |t: NaiveDateTime| (t - meta.start).num_minutes() as f64 / 60.0;

    let members: Vec<(f64, f64)> = prep
        .ensemble
        .data
        .iter()
        .flat_map(|(_, s)| s.as_ref().iter())
        .map(|r| (hours(r.valid_time), r.field(field)))
        .filter(|(_, y)| y.is_finite())
        .collect();

    // Split the line at missing values.
    let mut merged = Vec::new();
    let mut segment = Vec::new();
    for r in prep.merged.data.as_ref() {
        let y = r.field(field);
        if y.is_finite() {
            segment.push((hours(r.valid_time), y));
        } else if !segment.is_empty() {
            merged.push(std::mem::take(&mut segment));
        }
    }
    if !segment.is_empty() {
        merged.push(segment);
    }

    let x_max = hours(meta.end);
    let x_bounds = if x_max > 0.0 { [0.0, x_max] } else { [0.0, 1.0] };

    let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(_, y) in members.iter().chain(merged.iter().flatten()) {
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }
    if !y_min.is_finite() || !y_max.is_finite() {
        y_min = 0.0;
        y_max = 1.0;
    } else if y_max <= y_min {
        y_min -= 0.5;
        y_max += 0.5;
    }
    let pad = ((y_max - y_min).abs() * 0.05).max(1e-12);

    ChartData {
        merged,
        members,
        now_x: hours(meta.now),
        x_bounds,
        y_bounds: [y_min - pad, y_max + pad],
    }
}

fn fmt_axis_x(v: f64) -> String {
    format!("{v:.0}")
}

fn fmt_axis_y(v: f64) -> String {
    format!("{v:.1}")
}

#[derive(Debug, Clone, Copy)]
struct AxisInsets {
    left: u16,
    right: u16,
    top: u16,
    bottom: u16,
}

fn chart_layout(inner: Rect) -> (Rect, Option<AxisInsets>) {
    let insets = AxisInsets {
        left: 8,
        right: 2,
        top: 1,
        bottom: 2,
    };

    if inner.width <= insets.left + insets.right + 10 || inner.height <= insets.top + insets.bottom + 5 {
        return (inner, None);
    }

    let rect = Rect {
        x: inner.x + insets.left,
        y: inner.y + insets.top,
        width: inner.width - insets.left - insets.right,
        height: inner.height - insets.top - insets.bottom,
    };

    (rect, Some(insets))
}

fn draw_axis_ticks(
    frame: &mut ratatui::Frame<'_>,
    inner: Rect,
    chart: Rect,
    insets: AxisInsets,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
    field: PlotField,
) {
    let ticks = 5usize;
    let style = Style::default().fg(Color::Gray);

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let x_val = x_bounds[0] + u * (x_bounds[1] - x_bounds[0]);
        let x = chart.x + ((chart.width - 1) as f64 * u).round() as u16;
        let label = fmt_axis_x(x_val);
        let label_len = label.len() as u16;
        let start = x.saturating_sub((label.len() / 2) as u16);
        let y = chart.y + chart.height;
        if y >= inner.y + inner.height - 1 {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let y_val = y_bounds[0] + u * (y_bounds[1] - y_bounds[0]);
        let y = chart.y + (chart.height - 1) - ((chart.height - 1) as f64 * u).round() as u16;
        let label = fmt_axis_y(y_val);
        let label_len = label.len() as u16;
        let x = inner.x + insets.left.saturating_sub(1);
        let start = x.saturating_sub(label.len() as u16);
        if start < inner.x {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    let x_label = Paragraph::new(X_LABEL)
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::Gray));
    let x_rect = Rect {
        x: chart.x,
        y: chart.y + chart.height + 1,
        width: chart.width,
        height: 1,
    };
    if x_rect.y < inner.y + inner.height {
        frame.render_widget(x_label, x_rect);
    }

    let y_label = Paragraph::new(field.label()).style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));
    let y_rect = Rect {
        x: inner.x,
        y: inner.y,
        width: insets.left.saturating_sub(1),
        height: 1,
    };
    frame.render_widget(y_label, y_rect);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalyzedData, EnsembleSeries, MetaData, Site, TimeSeries};
    use chrono::NaiveDate;
    use ratatui::backend::TestBackend;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2017, 9, 2)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn prepared(site: &str, hdw: &[f64]) -> PreparedEnsemble {
        let meta = MetaData {
            site: Site::new(site),
            model: "nam".to_string(),
            start: at(0),
            now: at(6),
            end: at(18),
        };
        let rows = hdw
            .iter()
            .enumerate()
            .map(|(i, &v)| AnalyzedData {
                valid_time: at(6 * i as u32),
                lead_time: 6 * i as i32,
                hdw: v,
                t0: f64::NAN,
                dt0: f64::NAN,
                e0: 100.0,
                de: 50.0,
            })
            .collect();
        let ensemble = EnsembleSeries {
            meta,
            data: vec![(at(0), TimeSeries::new(rows))],
        };
        PreparedEnsemble {
            merged: ensemble.clone().merge(),
            ensemble,
            partitions: None,
            row_errors: Vec::new(),
            rows_read: hdw.len(),
        }
    }

    #[test]
    fn chart_series_breaks_line_at_gaps() {
        let data = chart_series(&prepared("kmso", &[10.0, f64::NAN, 30.0, 40.0]), PlotField::Hdw);
        assert_eq!(data.merged, vec![vec![(0.0, 10.0)], vec![(12.0, 30.0), (18.0, 40.0)]]);
        assert_eq!(data.members.len(), 3);
        assert_eq!(data.now_x, 6.0);
        assert_eq!(data.x_bounds, [0.0, 18.0]);
        assert!((data.y_bounds[0] - 8.5).abs() < 1e-9);
        assert!((data.y_bounds[1] - 41.5).abs() < 1e-9);
    }

    #[test]
    fn keys_select_cycle_and_quit() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = App::new(
            vec![prepared("a", &[1.0]), prepared("b", &[2.0])],
            PlotField::Hdw,
            dir.path().to_path_buf(),
        );

        assert!(!app.handle_key(KeyCode::Up));
        assert_eq!(app.selected, 0);
        app.handle_key(KeyCode::Down);
        app.handle_key(KeyCode::Down);
        assert_eq!(app.selected, 1);

        app.handle_key(KeyCode::Char('f'));
        assert_eq!(app.field, PlotField::E0);
        app.handle_key(KeyCode::Left);
        app.handle_key(KeyCode::Left);
        assert_eq!(app.field, PlotField::DeRatio);

        app.handle_key(KeyCode::Char('s'));
        assert!(app.status.starts_with("Saved 2 file(s)"), "{}", app.status);
        assert!(dir.path().join("b_NAM_ens.dat").exists());

        assert!(app.handle_key(KeyCode::Char('q')));
    }

    #[test]
    fn draws_without_panicking() {
        let app = App::new(vec![prepared("kmso", &[10.0, 20.0, 15.0])], PlotField::Hdw, PathBuf::from("."));
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| app.draw(f)).unwrap();

        let empty = App::new(Vec::new(), PlotField::Hdw, PathBuf::from("."));
        terminal.draw(|f| empty.draw(f)).unwrap();
    }
}
