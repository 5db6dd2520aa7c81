use crate::cli::{self, EstimationArgs, InputArgs};
use dredge_rs::{
    ChannelGeometry, DriftComponent, InputFormat, LoadOptions, MotionConfig, SampleType,
    WindowShape,
};
use std::path::Path;

/// Validate a single file path: existence and supported extension.
pub fn validate_file(file_path: &str) -> Result<(), String> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("Input file not found: {}", file_path));
    }
    InputFormat::from_extension(path).map_err(|e| e.to_string())?;
    Ok(())
}

pub fn parse_sample_type(s: &str) -> Result<SampleType, String> {
    SampleType::from_str(s)
        .ok_or_else(|| format!("Unknown sample type '{}'. Valid types: f32, f64, i16", s))
}

/// Build reader options from the input flags.
pub fn load_options(args: &InputArgs) -> Result<LoadOptions, String> {
    if !args.fs.is_finite() || args.fs <= 0.0 {
        return Err(format!("Sampling frequency (--fs) must be positive, got {}", args.fs));
    }
    if !args.gain.is_finite() || args.gain == 0.0 {
        return Err(format!("Gain (--gain) must be finite and non-zero, got {}", args.gain));
    }

    let geometry = match &args.depths {
        Some(depths) => ChannelGeometry::Explicit(depths.clone()),
        None => {
            if !args.pitch_um.is_finite() || args.pitch_um <= 0.0 {
                return Err(format!(
                    "Channel pitch (--pitch-um) must be positive, got {}",
                    args.pitch_um
                ));
            }
            ChannelGeometry::Uniform {
                pitch_um: args.pitch_um,
                first_um: args.first_depth_um,
            }
        }
    };

    Ok(LoadOptions {
        sampling_frequency: args.fs,
        t_start: args.t0,
        geometry,
        sample_type: parse_sample_type(&args.format)?,
        n_channels: args.channels,
        gain: args.gain,
    })
}

/// Resolve the estimator configuration: file (or defaults), then flag overrides.
pub fn build_config(args: &EstimationArgs) -> Result<MotionConfig, String> {
    let mut config = match &args.config {
        Some(path) => MotionConfig::from_json_file(path)
            .map_err(|e| format!("Failed to load config '{}': {}", path, e))?,
        None => MotionConfig::default(),
    };

    if args.rigid {
        config.rigid = true;
    }
    if args.non_rigid {
        config.rigid = false;
    }
    if let Some(v) = args.window_s {
        config.window_s = v;
    }
    if let Some(v) = args.bin_um {
        config.bin_um = v;
    }
    if let Some(v) = args.win_scale_um {
        config.win_scale_um = v;
    }
    if let Some(ref shape) = args.win_shape {
        config.win_shape = WindowShape::from_str(shape).ok_or_else(|| {
            format!(
                "Unknown window shape '{}'. Valid shapes: gaussian, rect, triangle",
                shape
            )
        })?;
    }
    if let Some(v) = args.max_disp_um {
        config.max_disp_um = Some(v);
    }
    if let Some(v) = args.mincorr {
        config.mincorr = v;
    }
    if let Some(v) = args.mincorr_percentile {
        config.mincorr_percentile = Some(v);
    }
    if args.soft_weights {
        config.soft_weights = true;
    }
    if let Some(v) = args.lambda_t {
        config.lambda_t = v;
    }
    if let Some(v) = args.lambda_s {
        config.lambda_s = v;
    }
    if let Some(v) = args.chunk_len_s {
        config.chunk_len_s = Some(v);
    }
    if args.no_chunking {
        config.chunk_len_s = None;
    }
    if let Some(v) = args.max_iterations {
        config.max_iterations = v;
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Drift components from "--sine amp,freq" and "--step at,size" values.
pub fn drift_components(sines: &[String], steps: &[String]) -> Result<Vec<DriftComponent>, String> {
    let mut components = Vec::new();
    for (amplitude_um, frequency_hz) in cli::parse_pairs(sines)? {
        if !frequency_hz.is_finite() || frequency_hz < 0.0 {
            return Err(format!("Sine frequency must be non-negative, got {}", frequency_hz));
        }
        components.push(DriftComponent::sine(amplitude_um, frequency_hz));
    }
    for (at_s, size_um) in cli::parse_pairs(steps)? {
        components.push(DriftComponent::Step { at_s, size_um });
    }
    Ok(components)
}
