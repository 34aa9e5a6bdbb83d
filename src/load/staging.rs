//! Staged bulk-load files
//!
//! Rows are written in the format read by
//! `LOAD DATA INFILE ... FIELDS TERMINATED BY '\t' OPTIONALLY ENCLOSED BY '"'
//! ESCAPED BY '"' LINES TERMINATED BY '\n'`:
//!
//! - numbers are written bare
//! - text is enclosed in `"`; a `"` inside is doubled and NUL, tab, newline
//!   and carriage return become `"0`, `"t`, `"n`, `"r`
//! - SQL NULL is the bare word `NULL`
//!
//! so every row occupies exactly one physical line.

use super::LoadError;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// One field of a staged row
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Text(&'a str),
    Null,
}

impl<'a> From<Option<u64>> for Value<'a> {
    fn from(value: Option<u64>) -> Self {
        value.map(Value::UInt).unwrap_or(Value::Null)
    }
}

/// Append one encoded row, including the line terminator
pub fn encode_row(values: &[Value<'_>], out: &mut String) {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push('\t');
        }
        match value {
            Value::Int(v) => out.push_str(&v.to_string()),
            Value::UInt(v) => out.push_str(&v.to_string()),
            Value::Float(v) => out.push_str(&v.to_string()),
            Value::Bool(v) => out.push(if *v { '1' } else { '0' }),
            Value::Null => out.push_str("NULL"),
            Value::Text(text) => {
                out.push('"');
                for c in text.chars() {
                    match c {
                        '"' => out.push_str("\"\""),
                        '\0' => out.push_str("\"0"),
                        '\t' => out.push_str("\"t"),
                        '\n' => out.push_str("\"n"),
                        '\r' => out.push_str("\"r"),
                        c => out.push(c),
                    }
                }
                out.push('"');
            }
        }
    }
    out.push('\n');
}

/// Decode one staged line back into field values. `None` is SQL NULL.
pub fn decode_line(line: &str) -> Result<Vec<Option<String>>, String> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.split('\t').map(decode_field).collect()
}

fn decode_field(field: &str) -> Result<Option<String>, String> {
    if field == "NULL" {
        return Ok(None);
    }
    let inner = match field.strip_prefix('"') {
        Some(rest) => rest
            .strip_suffix('"')
            .ok_or_else(|| format!("unterminated text field {:?}", field))?,
        None => return Ok(Some(field.to_string())),
    };

    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '"' {
            value.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => value.push('"'),
            Some('0') => value.push('\0'),
            Some('t') => value.push('\t'),
            Some('n') => value.push('\n'),
            Some('r') => value.push('\r'),
            other => return Err(format!("bad escape {:?} in {:?}", other, field)),
        }
    }
    Ok(Some(value))
}

/// Append-only staged file for one table
pub struct StagedFile {
    path: PathBuf,
    writer: BufWriter<File>,
    line: String,
    rows: u64,
}

impl StagedFile {
    /// Create (or truncate) the staged file at `path`
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LoadError::staging(&path, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| LoadError::staging(&path, e))?;
        Ok(Self {
            path,
            writer: BufWriter::with_capacity(256 * 1024, file),
            line: String::new(),
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn append(&mut self, values: &[Value<'_>]) -> Result<(), LoadError> {
        self.line.clear();
        encode_row(values, &mut self.line);
        self.writer
            .write_all(self.line.as_bytes())
            .map_err(|e| LoadError::staging(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    /// Flush buffered rows to disk so the file can be bulk-loaded
    pub fn flush(&mut self) -> Result<(), LoadError> {
        self.writer.flush().map_err(|e| LoadError::staging(&self.path, e))
    }

    /// Empty the file for the next cycle
    pub fn reset(&mut self) -> Result<(), LoadError> {
        self.flush()?;
        let file = self.writer.get_mut();
        file.set_len(0).map_err(|e| LoadError::staging(&self.path, e))?;
        std::io::Seek::rewind(file).map_err(|e| LoadError::staging(&self.path, e))?;
        self.rows = 0;
        Ok(())
    }
}

/// Streaming reader over the rows of a staged file
pub struct StagedRows {
    path: PathBuf,
    lines: std::io::Lines<BufReader<File>>,
    line_number: usize,
}

impl Iterator for StagedRows {
    type Item = Result<Vec<Option<String>>, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(LoadError::staging(&self.path, e))),
            };
            self.line_number += 1;
            if line.is_empty() {
                continue;
            }
            return Some(decode_line(&line).map_err(|message| LoadError::Malformed {
                path: self.path.clone(),
                line: self.line_number,
                message,
            }));
        }
    }
}

/// Open a staged file for reading row by row
pub fn staged_rows(path: &Path) -> Result<StagedRows, LoadError> {
    let file = File::open(path).map_err(|e| LoadError::staging(path, e))?;
    Ok(StagedRows {
        path: path.to_path_buf(),
        lines: BufReader::new(file).lines(),
        line_number: 0,
    })
}

/// Read every row of a staged file
pub fn read_staged(path: &Path) -> Result<Vec<Vec<Option<String>>>, LoadError> {
    staged_rows(path)?.collect()
}
