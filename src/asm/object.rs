//! Text object-file format for assembled programs.
//!
//! One record per line:
//! - `/ comment` and blank lines are ignored
//! - `START aaa` names the start address (3 hex digits)
//! - `aaa wwww` places a 16-bit word at a 12-bit address
//!
//! The same 3-digit/4-digit hex pairing the assembler hands to memory,
//! so an object file is readable against a memory dump.

use crate::asm::assembler::Assembly;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use thiserror::Error;

/// A loaded object file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectFile {
    /// Assembled words by address.
    pub words: BTreeMap<u16, u16>,
    /// Start address for the program counter.
    pub start: u16,
}

impl ObjectFile {
    /// Create an empty object file.
    pub fn new() -> Self {
        Self {
            words: BTreeMap::new(),
            start: 0,
        }
    }

    /// Capture an assembly result.
    pub fn from_assembly(assembly: &Assembly) -> Self {
        Self {
            words: assembly.machine_code.clone(),
            start: assembly.start_address,
        }
    }

    /// Number of words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Default for ObjectFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Load an object file from disk.
pub fn load_object<P: AsRef<Path>>(path: P) -> Result<ObjectFile, ObjectError> {
    let file = std::fs::File::open(path.as_ref()).map_err(|e| ObjectError::Io(e.to_string()))?;
    let reader = BufReader::new(file);

    let mut object = ObjectFile::new();
    let mut start_seen = false;

    for (index, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(|e| ObjectError::Io(e.to_string()))?;
        let text = match line.find('/') {
            Some(pos) => &line[..pos],
            None => &line[..],
        };
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }

        let parse_error = |message: String| ObjectError::Parse {
            line: index + 1,
            message,
        };

        if tokens[0].eq_ignore_ascii_case("START") {
            if tokens.len() != 2 {
                return Err(parse_error("START takes one address".into()));
            }
            let start = u16::from_str_radix(tokens[1], 16)
                .map_err(|_| parse_error(format!("bad start address `{}`", tokens[1])))?;
            if start > 0xFFF {
                return Err(parse_error(format!("start address {:X} out of range", start)));
            }
            object.start = start;
            start_seen = true;
            continue;
        }

        if tokens.len() != 2 {
            return Err(parse_error("expected `addr word` hex pair".into()));
        }
        let addr = u16::from_str_radix(tokens[0], 16)
            .map_err(|_| parse_error(format!("bad address `{}`", tokens[0])))?;
        if addr > 0xFFF {
            return Err(parse_error(format!("address {:X} out of range", addr)));
        }
        let word = u32::from_str_radix(tokens[1], 16)
            .map_err(|_| parse_error(format!("bad word `{}`", tokens[1])))?;
        if word > 0xFFFF {
            return Err(parse_error(format!("word {:X} out of range", word)));
        }
        object.words.insert(addr, word as u16);
    }

    if !start_seen {
        object.start = object.words.keys().next().copied().unwrap_or(0);
    }

    Ok(object)
}

/// Save an object file to disk.
pub fn save_object<P: AsRef<Path>>(path: P, object: &ObjectFile) -> Result<(), ObjectError> {
    let mut file = std::fs::File::create(path.as_ref()).map_err(|e| ObjectError::Io(e.to_string()))?;

    let io_err = |e: std::io::Error| ObjectError::Io(e.to_string());
    writeln!(file, "/ basic computer object file").map_err(io_err)?;
    writeln!(file, "/ {} words", object.len()).map_err(io_err)?;
    writeln!(file, "START {:03X}", object.start).map_err(io_err)?;
    for (&addr, &word) in &object.words {
        writeln!(file, "{:03X} {:04X}", addr, word).map_err(io_err)?;
    }

    Ok(())
}

/// Errors from object-file operations.
#[derive(Debug, Clone, Error)]
pub enum ObjectError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;

    #[test]
    fn test_object_round_trip() {
        let assembly = assemble("ORG 100\nLDA 105\nHLT\nEND\n");
        assert!(assembly.success);
        let object = ObjectFile::from_assembly(&assembly);

        let dir = std::env::temp_dir();
        let path = dir.join("mano-object-round-trip.obj");
        save_object(&path, &object).unwrap();
        let loaded = load_object(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, object);
        assert_eq!(loaded.start, 0x100);
    }

    #[test]
    fn test_load_without_start_record() {
        let dir = std::env::temp_dir();
        let path = dir.join("mano-object-no-start.obj");
        std::fs::write(&path, "/ comment only\n200 7001\n").unwrap();
        let loaded = load_object(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.start, 0x200, "defaults to the lowest address");
        assert_eq!(loaded.words[&0x200], 0x7001);
    }

    #[test]
    fn test_load_rejects_bad_records() {
        let dir = std::env::temp_dir();
        let path = dir.join("mano-object-bad.obj");

        std::fs::write(&path, "zzz 7001\n").unwrap();
        assert!(matches!(
            load_object(&path),
            Err(ObjectError::Parse { line: 1, .. })
        ));

        std::fs::write(&path, "100 12345\n").unwrap();
        assert!(matches!(load_object(&path), Err(ObjectError::Parse { .. })));

        std::fs::write(&path, "2000 7001\n").unwrap();
        assert!(matches!(load_object(&path), Err(ObjectError::Parse { .. })));

        std::fs::remove_file(&path).ok();
    }
}
