use crate::cli::BatchArgs;
use crate::commands::estimate::estimate_file;
use crate::exit_codes;
use crate::output::JsonSink;
use crate::params;
use dredge_rs::InputFormat;
use std::time::Instant;

/// Band searched for the dominant drift frequency in batch reports
const REPORT_BAND_HZ: (f64, f64) = (0.05, 10.0);

pub fn execute(args: BatchArgs) -> i32 {
    let files = match resolve_files(&args) {
        Ok(f) => f,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if files.is_empty() {
        eprintln!("Error: No matching files found");
        return exit_codes::INPUT_ERROR;
    }

    if args.dry_run {
        for f in &files {
            println!("{}", f);
        }
        if !args.quiet {
            eprintln!("Found {} file(s)", files.len());
        }
        return exit_codes::SUCCESS;
    }

    let options = match params::load_options(&args.input) {
        Ok(o) => o,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    let config = match params::build_config(&args.estimation) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    // Without a report directory every report is one JSON line on stdout
    let sink = match args.output_dir {
        Some(ref dir) => match JsonSink::report_dir(dir, args.compact) {
            Ok(sink) => sink,
            Err(msg) => {
                eprintln!("Error: {}", msg);
                return exit_codes::EXECUTION_ERROR;
            }
        },
        None => JsonSink::stdout(true),
    };

    let started = Instant::now();
    let mut summary = BatchSummary::default();

    for (i, file_path) in files.iter().enumerate() {
        if !args.quiet {
            eprintln!("[{}/{}] {}...", i + 1, files.len(), file_path);
        }

        let outcome = estimate_file(file_path, &options, &config, REPORT_BAND_HZ)
            .map_err(|(_, msg)| msg)
            .and_then(|report| sink.emit(&report, file_path));

        if let Err(msg) = outcome {
            eprintln!("  Error: {}", msg);
            summary.failed.push(file_path.clone());
            if !args.continue_on_error {
                summary.skipped = files.len() - i - 1;
                break;
            }
        } else {
            summary.succeeded += 1;
        }
    }

    if !args.quiet {
        eprintln!("{}", summary.describe(started.elapsed().as_secs_f64()));
    }
    summary.exit_code()
}

/// Outcome of a batch run
#[derive(Debug, Default)]
struct BatchSummary {
    succeeded: usize,
    failed: Vec<String>,
    /// Files never attempted after a failure stopped the run
    skipped: usize,
}

impl BatchSummary {
    fn exit_code(&self) -> i32 {
        match (self.succeeded, self.failed.len()) {
            (_, 0) => exit_codes::SUCCESS,
            (0, _) => exit_codes::EXECUTION_ERROR,
            _ => exit_codes::PARTIAL_FAILURE,
        }
    }

    fn describe(&self, elapsed_s: f64) -> String {
        let mut text = format!(
            "Estimated {} recording(s), {} failed, {} skipped in {:.1}s",
            self.succeeded,
            self.failed.len(),
            self.skipped,
            elapsed_s
        );
        for file in &self.failed {
            text.push_str("\n  failed: ");
            text.push_str(file);
        }
        text
    }
}

fn resolve_files(args: &BatchArgs) -> Result<Vec<String>, String> {
    match (&args.glob, &args.files) {
        (Some(pattern), _) => expand_pattern(pattern),
        (None, Some(files)) => Ok(files.clone()),
        (None, None) => Err("One of --glob or --files must be specified".to_string()),
    }
}

/// Recordings matched by `pattern`, sorted; files of other types are skipped
fn expand_pattern(pattern: &str) -> Result<Vec<String>, String> {
    let entries = glob::glob(pattern)
        .map_err(|e| format!("Invalid glob pattern '{}': {}", pattern, e))?;

    let mut recordings = Vec::new();
    for path in entries.filter_map(|entry| {
        entry
            .map_err(|e| log::warn!("Skipping unreadable path: {}", e))
            .ok()
    }) {
        if !path.is_file() {
            continue;
        }
        if InputFormat::from_extension(&path).is_err() {
            log::info!("Skipping {}: not a recording", path.display());
            continue;
        }
        match path.to_str() {
            Some(s) => recordings.push(s.to_string()),
            None => log::warn!("Skipping non UTF-8 path {}", path.display()),
        }
    }
    recordings.sort();
    Ok(recordings)
}
