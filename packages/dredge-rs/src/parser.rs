use crate::error::{MotionError, Result};

/// Row-major matrix read from a delimited text file
#[derive(Debug, Clone, PartialEq)]
pub struct TextMatrix {
    pub n_rows: usize,
    pub n_cols: usize,
    pub values: Vec<f64>,
}

/// Parse a text matrix: one row per time bin, one column per channel
///
/// Values are separated by whitespace, commas or semicolons. Blank lines and
/// lines starting with `#` are skipped. A first data line that does not parse
/// as numbers is taken as a column header.
pub fn parse_matrix(content: &str) -> Result<TextMatrix> {
    parse_matrix_bytes(content.as_bytes())
}

/// Parse a text matrix from a byte slice (e.g. a memory map)
pub fn parse_matrix_bytes(content: &[u8]) -> Result<TextMatrix> {
    let mut values = Vec::new();
    let mut row = Vec::with_capacity(64);
    let mut n_rows = 0;
    let mut n_cols = 0;
    let mut seen_data = false;

    for (line_idx, line) in content.split(|&b| b == b'\n').enumerate() {
        let line = trim_ascii(line);
        if line.is_empty() || line[0] == b'#' {
            continue;
        }

        row.clear();
        let parsed = line
            .split(|&b| b == b',' || b == b';' || b.is_ascii_whitespace())
            .filter(|field| !field.is_empty())
            .try_for_each(|field| match parse_f64(field) {
                Some(v) => {
                    row.push(v);
                    Ok(())
                }
                None => Err(field),
            });

        if let Err(field) = parsed {
            if !seen_data {
                log::debug!("Treating line {} as a header", line_idx + 1);
                seen_data = true;
                continue;
            }
            return Err(MotionError::ParseError(format!(
                "line {}: cannot parse '{}' as a number",
                line_idx + 1,
                String::from_utf8_lossy(field)
            )));
        }
        seen_data = true;

        if row.is_empty() {
            continue;
        }
        if let Some(pos) = row.iter().position(|v| !v.is_finite()) {
            return Err(MotionError::ParseError(format!(
                "line {}: non-finite value in column {}",
                line_idx + 1,
                pos + 1
            )));
        }

        if n_rows == 0 {
            n_cols = row.len();
        } else if row.len() != n_cols {
            return Err(MotionError::ParseError(format!(
                "line {}: row {} has {} columns, expected {}",
                line_idx + 1,
                n_rows + 1,
                row.len(),
                n_cols
            )));
        }
        values.extend_from_slice(&row);
        n_rows += 1;
    }

    if n_rows == 0 {
        return Err(MotionError::ParseError(
            "no numeric rows found".to_string(),
        ));
    }

    log::info!("Parsed text matrix: {} rows × {} columns", n_rows, n_cols);

    Ok(TextMatrix {
        n_rows,
        n_cols,
        values,
    })
}

fn parse_f64(bytes: &[u8]) -> Option<f64> {
    std::str::from_utf8(bytes).ok()?.parse::<f64>().ok()
}

fn trim_ascii(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if first.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = bytes {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}
