use crate::error::{MotionError, Result};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// Open a file and map it into memory (read-only)
pub fn mmap_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path).map_err(MotionError::IoError)?;
    let mmap = unsafe { Mmap::map(&file).map_err(MotionError::IoError)? };
    Ok(mmap)
}

/// Sample encoding of a raw binary recording (little-endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    #[default]
    F32,
    F64,
    I16,
}

impl SampleType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "f32" | "float32" => Some(Self::F32),
            "f64" | "float64" => Some(Self::F64),
            "i16" | "int16" => Some(Self::I16),
            _ => None,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F64 => 8,
            Self::I16 => 2,
        }
    }
}

/// Decode little-endian samples, multiplying each by `gain`
pub fn decode_samples(bytes: &[u8], sample_type: SampleType, gain: f64) -> Result<Vec<f64>> {
    let size = sample_type.size();
    if bytes.len() % size != 0 {
        return Err(MotionError::MalformedInput(format!(
            "{} bytes is not a whole number of {:?} samples",
            bytes.len(),
            sample_type
        )));
    }

    let values = bytes.chunks_exact(size).map(|b| match sample_type {
        SampleType::F32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
        SampleType::F64 => f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]),
        SampleType::I16 => i16::from_le_bytes([b[0], b[1]]) as f64,
    });
    Ok(values.map(|v| v * gain).collect())
}

/// Encode samples as little-endian bytes
pub fn encode_samples(values: &[f64], sample_type: SampleType) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * sample_type.size());
    for &v in values {
        match sample_type {
            SampleType::F32 => bytes.extend_from_slice(&(v as f32).to_le_bytes()),
            SampleType::F64 => bytes.extend_from_slice(&v.to_le_bytes()),
            SampleType::I16 => bytes.extend_from_slice(&(v.round() as i16).to_le_bytes()),
        }
    }
    bytes
}
