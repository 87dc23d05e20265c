//! Disassembler for basic-computer machine words.
//!
//! The inverse of the assembler's instruction tables. Words that carry
//! no recognizable operation come back as `HEX` literals so a full
//! memory image always round-trips to valid source.

use crate::cpu::decode::{decode, ioi, rri, Instruction};
use crate::word::{fmt_addr, fmt_word};
use std::collections::BTreeMap;

/// Disassemble a single machine word to assembly text.
pub fn disassemble_word(word: u16) -> String {
    match decode(word) {
        Instruction::Mri { op, indirect, addr } => {
            if indirect {
                format!("{} {} I", op.mnemonic(), fmt_addr(addr))
            } else {
                format!("{} {}", op.mnemonic(), fmt_addr(addr))
            }
        }
        Instruction::Rri { mask } => format_mask(mask, &rri::TABLE, word),
        Instruction::Ioi { mask } => format_mask(mask, &ioi::TABLE, word),
    }
}

/// Disassemble an address-to-word map as a listing.
pub fn disassemble(machine_code: &BTreeMap<u16, u16>) -> String {
    let mut output = String::new();
    for (&addr, &word) in machine_code {
        output.push_str(&format!(
            "{}: {:<12} / {}\n",
            fmt_addr(addr),
            disassemble_word(word),
            fmt_word(word)
        ));
    }
    output
}

/// Render an RRI/IOI bitmask. Multiple set bits print in application
/// order; a mask with no known bits falls back to a HEX literal.
fn format_mask(mask: u16, table: &[(&'static str, u16)], word: u16) -> String {
    let names: Vec<&str> = table
        .iter()
        .filter(|(_, bit)| mask & bit != 0)
        .map(|(name, _)| *name)
        .collect();
    if names.is_empty() {
        format!("HEX {}", fmt_word(word))
    } else {
        names.join(" ")
    }
}
