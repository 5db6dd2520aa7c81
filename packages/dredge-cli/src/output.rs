//! Destinations for the JSON documents the commands produce.

use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Suffix of the per-recording report written into an output directory
const REPORT_SUFFIX: &str = "_motion.json";

#[derive(Debug, Clone, PartialEq)]
enum Destination {
    Stdout,
    File(PathBuf),
    /// One `<stem>_motion.json` per source recording
    Directory(PathBuf),
}

/// Serializes documents and sends them to stdout, a file or a report directory.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonSink {
    destination: Destination,
    compact: bool,
}

impl JsonSink {
    /// One document per line on stdout when `compact`, pretty-printed otherwise
    pub fn stdout(compact: bool) -> Self {
        Self {
            destination: Destination::Stdout,
            compact,
        }
    }

    /// A named file, or stdout when no path is given
    pub fn file_or_stdout(path: Option<&str>, compact: bool) -> Self {
        match path {
            Some(p) => Self {
                destination: Destination::File(PathBuf::from(p)),
                compact,
            },
            None => Self::stdout(compact),
        }
    }

    /// Per-recording reports under `dir`, creating it if needed
    pub fn report_dir(dir: &str, compact: bool) -> Result<Self, String> {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Failed to create output directory '{}': {}", dir, e))?;
        Ok(Self {
            destination: Destination::Directory(PathBuf::from(dir)),
            compact,
        })
    }

    /// Write `value`; `source` names the recording it describes.
    ///
    /// Returns the file written, if any.
    pub fn emit<T: Serialize>(&self, value: &T, source: &str) -> Result<Option<PathBuf>, String> {
        let json = self.render(value)?;
        match &self.destination {
            Destination::Stdout => {
                let stdout = std::io::stdout();
                let mut handle = stdout.lock();
                writeln!(handle, "{}", json)
                    .and_then(|_| handle.flush())
                    .map_err(|e| format!("Failed to write to stdout: {}", e))?;
                Ok(None)
            }
            Destination::File(path) => write_file(path, &json).map(Some),
            Destination::Directory(dir) => write_file(&dir.join(report_name(source)), &json).map(Some),
        }
    }

    fn render<T: Serialize>(&self, value: &T) -> Result<String, String> {
        let rendered = if self.compact {
            serde_json::to_string(value)
        } else {
            serde_json::to_string_pretty(value)
        };
        rendered.map_err(|e| format!("JSON serialization failed: {}", e))
    }
}

fn write_file(path: &Path, json: &str) -> Result<PathBuf, String> {
    std::fs::write(path, json)
        .map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
    Ok(path.to_path_buf())
}

/// Report file name for a recording: `<stem>_motion.json`
fn report_name(source: &str) -> String {
    let stem = Path::new(source)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("recording");
    format!("{}{}", stem, REPORT_SUFFIX)
}
