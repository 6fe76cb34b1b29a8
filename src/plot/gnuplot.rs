//! Where finished figures go: a live gnuplot process, or script files on disk.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};

use tracing::{debug, info};

use crate::error::AppError;
use crate::plot::script::{Figure, session_preamble};

/// Consumer of figures.
pub trait FigureSink {
    fn draw(&mut self, figure: &Figure) -> Result<(), AppError>;

    /// Flush and release the sink. Errors here concern the whole session.
    fn finish(&mut self) -> Result<(), AppError>;
}

/// A gnuplot process fed through its stdin.
///
/// gnuplot is started once with `-p` and receives the session preamble; every
/// figure is then streamed into the same process.
pub struct Gnuplot {
    child: Child,
    stdin: Option<ChildStdin>,
    program: String,
}

impl Gnuplot {
    pub fn launch(program: &str, output_prefix: &str) -> Result<Self, AppError> {
        let mut child = Command::new(program)
            .arg("-p")
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                AppError::runtime(format!(
                    "Failed to start '{program}': {e}. Install gnuplot, set FWX_GNUPLOT, or use --script-only."
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::runtime(format!("'{program}' has no stdin pipe.")))?;

        stdin
            .write_all(&session_preamble(output_prefix))
            .map_err(|e| AppError::runtime(format!("Failed to initialize {program}: {e}")))?;

        debug!(program, output_prefix, "gnuplot session started");

        Ok(Self {
            child,
            stdin: Some(stdin),
            program: program.to_string(),
        })
    }
}

impl FigureSink for Gnuplot {
    fn draw(&mut self, figure: &Figure) -> Result<(), AppError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| AppError::runtime("gnuplot session already closed."))?;

        stdin
            .write_all(&figure.script)
            .and_then(|_| stdin.flush())
            .map_err(|e| AppError::runtime(format!("Failed to send {} to {}: {e}", figure.output_name, self.program)))?;

        info!(output = %figure.output_name, "plotted");
        Ok(())
    }

    fn finish(&mut self) -> Result<(), AppError> {
        // Closing stdin ends the gnuplot session.
        drop(self.stdin.take());

        let status = self
            .child
            .wait()
            .map_err(|e| AppError::runtime(format!("Failed to wait for {}: {e}", self.program)))?;

        if status.success() {
            Ok(())
        } else {
            Err(AppError::runtime(format!("{} exited with {status}.", self.program)))
        }
    }
}

impl Drop for Gnuplot {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            let _ = self.child.wait();
        }
    }
}

/// Writes every figure as a standalone `.gp` script instead of plotting.
pub struct ScriptFiles {
    dir: PathBuf,
    output_prefix: String,
    written: Vec<PathBuf>,
}

impl ScriptFiles {
    pub fn new(dir: PathBuf, output_prefix: impl Into<String>) -> Self {
        Self {
            dir,
            output_prefix: output_prefix.into(),
            written: Vec::new(),
        }
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl FigureSink for ScriptFiles {
    fn draw(&mut self, figure: &Figure) -> Result<(), AppError> {
        let path = crate::io::export::write_script(&self.dir, &self.output_prefix, figure)?;
        info!(path = %path.display(), "wrote script");
        self.written.push(path);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::script::FigureKind;

    fn figure() -> Figure {
        Figure {
            kind: FigureKind::Ensemble,
            output_name: "kmso_GFS_ens.png".to_string(),
            script: b"plot 1\n".to_vec(),
        }
    }

    #[test]
    fn missing_binary_is_runtime_error_with_hint() {
        let err = match Gnuplot::launch("fwx-no-such-gnuplot-binary", "out") {
            Ok(_) => panic!("launch should fail"),
            Err(e) => e,
        };
        assert_eq!(err.exit_code(), 4);
        assert!(err.message().contains("--script-only"));
    }

    #[test]
    fn script_files_collects_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ScriptFiles::new(dir.path().to_path_buf(), "images");
        sink.draw(&figure()).unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.written(), &[dir.path().join("kmso_GFS_ens.gp")]);
    }

    #[cfg(unix)]
    #[test]
    fn session_reports_non_zero_exit() {
        // `false` ignores stdin and exits 1.
        let mut gp = match Gnuplot::launch("false", "out") {
            Ok(gp) => gp,
            // Writing the preamble may race the process exit.
            Err(e) => {
                assert_eq!(e.exit_code(), 4);
                return;
            }
        };
        let _ = gp.draw(&figure());
        let err = gp.finish().unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
