//! Figures.
//!
//! - gnuplot data blocks (`datablock`)
//! - script assembly from templates (`script`)
//! - gnuplot process / script file sinks (`gnuplot`)
//! - terminal plots (`ascii`)

pub mod ascii;
pub mod datablock;
pub mod gnuplot;
pub mod script;

pub use ascii::render_ascii_plot;
pub use gnuplot::{FigureSink, Gnuplot, ScriptFiles};
pub use script::{Figure, FigureKind, ensemble_figure, merged_figure};
