//! Explicit output sinks for build and run output.
//!
//! Callers decide where backend output goes by handing an [`OutputSinks`]
//! to the pipeline or engine. Each write is copied to every sink.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use wigwam_common::error::{Result, WigwamError};

/// A fan-out writer over any number of sinks.
#[derive(Default)]
pub struct OutputSinks {
    sinks: Vec<Box<dyn Write + Send>>,
}

impl OutputSinks {
    /// Creates a writer with no sinks. Output is discarded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer that forwards to standard error.
    #[must_use]
    pub fn stderr() -> Self {
        let mut sinks = Self::new();
        sinks.push(io::stderr());
        sinks
    }

    /// Adds a sink.
    pub fn push(&mut self, sink: impl Write + Send + 'static) {
        self.sinks.push(Box::new(sink));
    }

    /// Adds a file sink, appending to `path` and creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn push_file(&mut self, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| WigwamError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        self.push(file);
        Ok(())
    }

    /// Returns the number of attached sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns whether no sinks are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Write for OutputSinks {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for sink in &mut self.sinks {
            sink.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for OutputSinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSinks")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
