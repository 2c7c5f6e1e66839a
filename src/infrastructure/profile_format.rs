//! Text coverprofile reader and writer.
//!
//! Format:
//!
//! ```text
//! mode: count
//! example.com/pkg/file.go:12.34,15.2 3 1
//! ```
//!
//! Each block line is `<file>:<startLine>.<startCol>,<endLine>.<endCol>
//! <numStmt> <count>`. The file name is everything before the last colon.

use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use thiserror::Error;

use crate::domain::models::profile::{Block, CoverMode, Position, Profile};

const MODE_PREFIX: &str = "mode: ";

/// Coverprofile parsing errors
#[derive(Error, Debug)]
pub enum ProfileParseError {
    #[error("Profile is empty or does not start with a mode line")]
    MissingMode,

    #[error("line {line}: unknown coverage mode '{mode}'")]
    InvalidMode { line: usize, mode: String },

    #[error("line {line}: mode '{found}' conflicts with earlier mode '{expected}'")]
    ModeConflict {
        line: usize,
        expected: CoverMode,
        found: String,
    },

    #[error("line {line}: malformed block '{text}'")]
    InvalidLine { line: usize, text: String },

    #[error("line {line}: block end precedes its start in '{text}'")]
    InvalidRange { line: usize, text: String },

    #[error("{file_name}: inconsistent statement counts for block {block}")]
    InconsistentStatements { file_name: String, block: String },

    #[error("I/O error reading profile: {0}")]
    Io(#[from] io::Error),
}

/// Parse a coverprofile into one `Profile` per file, sorted by file name.
///
/// Repeated identical mode lines (concatenated profiles) are skipped.
/// Blocks recorded more than once for the same range are folded together.
pub fn parse<R: BufRead>(reader: R) -> Result<Vec<Profile>, ProfileParseError> {
    let mut mode: Option<CoverMode> = None;
    let mut files: BTreeMap<String, Vec<Block>> = BTreeMap::new();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        let text = line.trim_end();
        if text.is_empty() {
            continue;
        }

        if let Some(raw_mode) = text.strip_prefix(MODE_PREFIX) {
            let parsed = CoverMode::from_str(raw_mode).ok_or_else(|| ProfileParseError::InvalidMode {
                line: line_no,
                mode: raw_mode.to_string(),
            })?;
            match mode {
                None => mode = Some(parsed),
                Some(expected) if expected == parsed => {}
                Some(expected) => {
                    return Err(ProfileParseError::ModeConflict {
                        line: line_no,
                        expected,
                        found: raw_mode.to_string(),
                    });
                }
            }
            continue;
        }

        if mode.is_none() {
            return Err(ProfileParseError::MissingMode);
        }

        let (file_name, block) = parse_block_line(text, line_no)?;
        files.entry(file_name.to_string()).or_default().push(block);
    }

    let mode = mode.ok_or(ProfileParseError::MissingMode)?;

    files
        .into_iter()
        .map(|(file_name, blocks)| {
            let blocks = fold_duplicates(&file_name, mode, blocks)?;
            Ok(Profile {
                file_name,
                mode,
                blocks,
            })
        })
        .collect()
}

/// Parse profile text held in memory.
pub fn parse_str(text: &str) -> Result<Vec<Profile>, ProfileParseError> {
    parse(text.as_bytes())
}

/// Read and parse a coverprofile file.
pub fn read_file(path: &Path) -> Result<Vec<Profile>, ProfileParseError> {
    let file = std::fs::File::open(path)?;
    parse(BufReader::new(file))
}

/// Write profiles that all share `mode`.
pub fn write<W: Write>(mut writer: W, mode: CoverMode, profiles: &[Profile]) -> io::Result<()> {
    writeln!(writer, "{MODE_PREFIX}{mode}")?;
    for profile in profiles {
        for b in &profile.blocks {
            writeln!(
                writer,
                "{}:{}.{},{}.{} {} {}",
                profile.file_name,
                b.start_line,
                b.start_col,
                b.end_line,
                b.end_col,
                b.num_stmt,
                b.count
            )?;
        }
    }
    Ok(())
}

/// Write profiles to `path`, replacing any existing file.
pub fn write_file(path: &Path, mode: CoverMode, profiles: &[Profile]) -> io::Result<()> {
    let file = std::fs::File::create(path)?;
    let mut writer = io::BufWriter::new(file);
    write(&mut writer, mode, profiles)?;
    writer.flush()
}

fn parse_block_line(text: &str, line_no: usize) -> Result<(&str, Block), ProfileParseError> {
    let invalid = || ProfileParseError::InvalidLine {
        line: line_no,
        text: text.to_string(),
    };

    let (file_name, rest) = text.rsplit_once(':').ok_or_else(invalid)?;
    if file_name.is_empty() {
        return Err(invalid());
    }

    let mut fields = rest.split_ascii_whitespace();
    let (range, num_stmt, count) = match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(range), Some(num_stmt), Some(count), None) => (range, num_stmt, count),
        _ => return Err(invalid()),
    };

    let (start, end) = range.split_once(',').ok_or_else(invalid)?;
    let start = parse_position(start).ok_or_else(invalid)?;
    let end = parse_position(end).ok_or_else(invalid)?;
    let num_stmt: u32 = num_stmt.parse().map_err(|_| invalid())?;
    let count: u64 = count.parse().map_err(|_| invalid())?;

    let block = Block::new(start, end, num_stmt, count).map_err(|_| ProfileParseError::InvalidRange {
        line: line_no,
        text: text.to_string(),
    })?;
    Ok((file_name, block))
}

fn parse_position(text: &str) -> Option<Position> {
    let (line, col) = text.split_once('.')?;
    Some(Position::new(line.parse().ok()?, col.parse().ok()?))
}

/// Sort blocks and collapse entries recorded for the same range.
fn fold_duplicates(
    file_name: &str,
    mode: CoverMode,
    mut blocks: Vec<Block>,
) -> Result<Vec<Block>, ProfileParseError> {
    blocks.sort_by(Block::cmp_range);

    let mut folded: Vec<Block> = Vec::with_capacity(blocks.len());
    for b in blocks {
        match folded.last_mut() {
            Some(last) if last.same_range(&b) => {
                if last.num_stmt != b.num_stmt {
                    return Err(ProfileParseError::InconsistentStatements {
                        file_name: file_name.to_string(),
                        block: b.to_string(),
                    });
                }
                last.count = match mode {
                    CoverMode::Set => last.count | b.count,
                    CoverMode::Count | CoverMode::Atomic => last.count.saturating_add(b.count),
                };
            }
            _ => folded.push(b),
        }
    }
    Ok(folded)
}
