use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Set to any value to also append stage timings to the profile log file
pub const PROFILE_ENV_VAR: &str = "DREDGE_PROFILE";

/// Times a pipeline stage until dropped
pub struct ProfileScope {
    label: String,
    start: Instant,
}

impl ProfileScope {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        log::debug!("[PROFILE] {} - {:.3}ms", self.label, elapsed_ms);

        if std::env::var_os(PROFILE_ENV_VAR).is_none() {
            return;
        }
        if let Err(e) = append_profile_log(&self.label, elapsed_ms) {
            log::warn!("Failed to write profile log: {}", e);
        }
    }
}

/// Location of the profile log in the platform data directory
pub fn profile_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dredge")
        .join("stage_timings.log")
}

fn append_profile_log(label: &str, duration_ms: f64) -> std::io::Result<()> {
    let path = profile_log_path();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(
        file,
        "{} | {} | {:.3}ms",
        chrono::Utc::now().to_rfc3339(),
        label,
        duration_ms
    )
}

/// Time the rest of the enclosing block
#[macro_export]
macro_rules! profile_scope {
    ($label:expr) => {
        let _profile_scope = $crate::profiling::ProfileScope::new($label);
    };
}
