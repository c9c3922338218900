//! Motion table loading.
//!
//! The motion table is a plain text file with one position combination per
//! line: `pos1,pos2,pos3,pos4[,label]`. Blank lines and lines starting with
//! `#` are ignored. Everything else must parse; a malformed row is a fatal
//! configuration error reported with its line number and raw content, so the
//! operator sees the problem before any stage has moved.

use crate::error::{AppResult, TomoError};
use std::path::Path;

/// Number of stages driven by a two-qubit tomography run.
pub const STAGE_COUNT: usize = 4;

/// One row of the motion table: a full set of stage target positions plus an
/// optional label.
///
/// Identity is the row's index in the table, or the label if present. Combos
/// are created at load time and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Combo {
    /// Target position for each stage, in table column order.
    pub positions: [f64; STAGE_COUNT],
    /// Optional label, used verbatim in the output filename.
    pub label: Option<String>,
}

impl Combo {
    /// Deterministic output filename for this combo.
    ///
    /// `<label>.csv` when a label is present, otherwise `comboNNN.csv` from
    /// the zero-based table index.
    pub fn output_file_name(&self, index: usize) -> String {
        match &self.label {
            Some(label) => format!("{label}.csv"),
            None => format!("combo{index:03}.csv"),
        }
    }

    /// Human-readable identity for log messages.
    pub fn identity(&self, index: usize) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("combo{index:03}"),
        }
    }
}

/// Read and parse a motion table file.
pub fn load_table(path: &Path) -> AppResult<Vec<Combo>> {
    let raw = std::fs::read_to_string(path).map_err(|err| {
        TomoError::Configuration(format!("cannot read motion table {}: {err}", path.display()))
    })?;
    parse_table(&raw)
}

/// Parse motion table text into an ordered combo sequence.
///
/// Preserves file order. Returns [`TomoError::Table`] on the first malformed
/// non-ignorable row.
pub fn parse_table(input: &str) -> AppResult<Vec<Combo>> {
    let mut combos = Vec::new();

    for (number, line) in input.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let malformed = || TomoError::Table {
            line: number + 1,
            content: trimmed.to_string(),
        };

        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if fields.len() < STAGE_COUNT || fields.len() > STAGE_COUNT + 1 {
            return Err(malformed());
        }

        let mut positions = [0.0; STAGE_COUNT];
        for (slot, field) in positions.iter_mut().zip(&fields) {
            *slot = field.parse().map_err(|_| malformed())?;
        }

        let label = fields
            .get(STAGE_COUNT)
            .filter(|label| !label.is_empty())
            .map(|label| label.to_string());

        combos.push(Combo { positions, label });
    }

    Ok(combos)
}
