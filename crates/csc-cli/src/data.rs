//! CSV loading for signals and dictionaries.
//!
//! Signals: one sample per row. Rows with several comma-separated fields
//! (e.g. `index,value` or `time,value`) contribute their last field. A
//! non-numeric first row is taken as a header.
//!
//! Dictionaries: one atom per row, comma separated.
//!
//! Blank lines and lines starting with `#` are ignored in both.

use anyhow::{Context, Result};
use lib_csc::Dictionary;
use std::path::Path;

/// Load a signal from a CSV file.
pub fn load_signal(path: &Path) -> Result<Vec<f64>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read signal file: {:?}", path))?;
    parse_signal(&content).with_context(|| format!("Invalid signal file: {:?}", path))
}

/// Load a dictionary from a CSV file.
pub fn load_dictionary(path: &Path, pad_atoms: bool) -> Result<Dictionary> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dictionary file: {:?}", path))?;
    let rows = parse_rows(&content).with_context(|| format!("Invalid dictionary file: {:?}", path))?;

    let dictionary = if pad_atoms {
        Dictionary::from_padded(rows)?
    } else {
        Dictionary::new(rows)?
    };
    Ok(dictionary)
}

/// Parse signal samples.
pub fn parse_signal(content: &str) -> Result<Vec<f64>> {
    let mut samples = Vec::new();

    for (line_no, line) in data_lines(content) {
        let field = line.rsplit(',').next().unwrap_or(line).trim();
        match field.parse::<f64>() {
            Ok(v) => samples.push(v),
            Err(_) if samples.is_empty() && line_no == first_data_line(content) => {
                tracing::debug!("Skipping header row: {}", line);
            }
            Err(_) => anyhow::bail!("line {}: cannot parse {:?} as a number", line_no, field),
        }
    }

    if samples.is_empty() {
        anyhow::bail!("no samples found");
    }
    Ok(samples)
}

/// Parse comma-separated numeric rows.
pub fn parse_rows(content: &str) -> Result<Vec<Vec<f64>>> {
    data_lines(content)
        .map(|(line_no, line)| {
            line.split(',')
                .map(|field| {
                    let field = field.trim();
                    field
                        .parse::<f64>()
                        .with_context(|| format!("line {}: cannot parse {:?} as a number", line_no, field))
                })
                .collect()
        })
        .collect()
}

/// Non-empty, non-comment lines with 1-based line numbers.
fn data_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

fn first_data_line(content: &str) -> usize {
    data_lines(content).next().map_or(0, |(line_no, _)| line_no)
}
