//! Two-pass assembler for basic-computer programs.
//!
//! Syntax:
//! ```text
//! / Comment to end of line
//! LOOP, LDA VAL     / label, mnemonic, operand
//!       ADD VAL I   / trailing I selects indirect addressing
//!       ORG 100     / pseudo-ops: ORG, END, HEX, DEC
//! VAL,  DEC -5
//!       END
//! ```
//!
//! Pass 1 binds labels and checks structure; pass 2 resolves operands
//! and emits machine words. Diagnostics accumulate instead of aborting:
//! the caller always gets the full error list.

use crate::cpu::decode::{encode, ioi, rri, Instruction, MriOp};
use crate::word::dec_to_word16;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Per-address annotation: does the assembled word represent executable
/// code or literal data? Display collaborators use this to choose
/// between disassembly and raw values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Usage {
    Code,
    Data,
}

/// The result of assembling one source text.
#[derive(Debug, Clone)]
pub struct Assembly {
    /// True when no errors were found; the machine-code map is complete.
    pub success: bool,
    /// Assembled words by address. Empty when pass 1 failed.
    pub machine_code: BTreeMap<u16, u16>,
    /// Label bindings (names case-folded to upper).
    pub labels: HashMap<String, u16>,
    /// Code/data tag for each assembled address.
    pub usage: BTreeMap<u16, Usage>,
    /// First ORG in the source, else 0.
    pub start_address: u16,
    /// All diagnostics, in source order.
    pub errors: Vec<AsmError>,
}

/// Assembly diagnostics. Lines are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    #[error("line {line}: invalid label `{label}`")]
    InvalidLabel { line: usize, label: String },

    #[error("line {line}: duplicate label `{label}`")]
    DuplicateLabel { line: usize, label: String },

    #[error("line {line}: unknown mnemonic `{mnemonic}`")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("line {line}: {mnemonic} requires an operand")]
    MissingOperand { line: usize, mnemonic: String },

    #[error("line {line}: invalid operand `{operand}` for {mnemonic}")]
    InvalidOperand {
        line: usize,
        mnemonic: String,
        operand: String,
    },

    #[error("line {line}: value `{value}` out of range for {mnemonic}")]
    ValueOutOfRange {
        line: usize,
        mnemonic: String,
        value: String,
    },

    #[error("line {line}: `{operand}` is neither a defined label nor a 3-digit hex address")]
    UnresolvedOperand { line: usize, operand: String },
}

/// Assemble source text into machine words, labels, and usage tags.
pub fn assemble(source: &str) -> Assembly {
    let mut asm = Assembler::new();
    asm.pass1(source);

    if !asm.errors.is_empty() {
        return Assembly {
            success: false,
            machine_code: BTreeMap::new(),
            labels: asm.labels,
            usage: BTreeMap::new(),
            start_address: asm.start_address.unwrap_or(0),
            errors: asm.errors,
        };
    }

    asm.pass2();

    Assembly {
        success: asm.errors.is_empty(),
        machine_code: asm.machine_code,
        labels: asm.labels,
        usage: asm.usage,
        start_address: asm.start_address.unwrap_or(0),
        errors: asm.errors,
    }
}

/// An emitting statement, located by pass 1.
#[derive(Debug, Clone)]
enum Stmt {
    /// Literal word from HEX or DEC.
    Literal(u16),
    /// Fixed-word RRI or IOI instruction.
    Fixed(u16),
    /// Memory-reference instruction with an unresolved operand.
    Mri {
        op: MriOp,
        operand: String,
        indirect: bool,
    },
}

#[derive(Debug, Clone)]
struct Located {
    line: usize,
    addr: u16,
    usage: Usage,
    stmt: Stmt,
}

struct Assembler {
    /// Location counter, 12 bits.
    lc: u16,
    labels: HashMap<String, u16>,
    start_address: Option<u16>,
    located: Vec<Located>,
    machine_code: BTreeMap<u16, u16>,
    usage: BTreeMap<u16, Usage>,
    errors: Vec<AsmError>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            lc: 0,
            labels: HashMap::new(),
            start_address: None,
            located: Vec::new(),
            machine_code: BTreeMap::new(),
            usage: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    /// Pass 1: bind labels, validate structure, assign addresses.
    fn pass1(&mut self, source: &str) {
        for (index, raw_line) in source.lines().enumerate() {
            let line = index + 1;

            // Comments run from `/` to end of line.
            let text = match raw_line.find('/') {
                Some(pos) => &raw_line[..pos],
                None => raw_line,
            };
            let mut tokens = text.split_whitespace();

            let Some(first) = tokens.next() else { continue };

            // A first token ending in `,` is a label; it binds to the
            // location counter before the statement takes effect.
            let statement_head = if let Some(name) = first.strip_suffix(',') {
                if !valid_label(name) {
                    self.errors.push(AsmError::InvalidLabel {
                        line,
                        label: name.to_string(),
                    });
                } else {
                    let key = name.to_uppercase();
                    if self.labels.contains_key(&key) {
                        self.errors.push(AsmError::DuplicateLabel { line, label: key });
                    } else {
                        self.labels.insert(key, self.lc);
                    }
                }
                match tokens.next() {
                    Some(head) => head,
                    None => continue, // label-only line just binds
                }
            } else {
                first
            };

            let mnemonic = statement_head.to_uppercase();
            let rest: Vec<&str> = tokens.collect();

            match mnemonic.as_str() {
                "ORG" => {
                    if let Some(value) = self.require_hex(line, &mnemonic, &rest, 0xFFF) {
                        if self.start_address.is_none() {
                            self.start_address = Some(value);
                        }
                        self.lc = value;
                    }
                }
                "END" => return,
                "HEX" => {
                    if let Some(value) = self.require_hex(line, &mnemonic, &rest, 0xFFFF) {
                        self.emit(line, Usage::Data, Stmt::Literal(value));
                    }
                }
                "DEC" => {
                    if let Some(value) = self.require_dec(line, &mnemonic, &rest) {
                        self.emit(line, Usage::Data, Stmt::Literal(value));
                    }
                }
                _ => self.pass1_instruction(line, &mnemonic, &rest),
            }
        }
    }

    fn pass1_instruction(&mut self, line: usize, mnemonic: &str, rest: &[&str]) {
        if let Some(op) = MriOp::from_mnemonic(mnemonic) {
            let Some(operand) = rest.first() else {
                self.errors.push(AsmError::MissingOperand {
                    line,
                    mnemonic: mnemonic.to_string(),
                });
                return;
            };
            let indirect = rest.len() == 2 && rest[1].eq_ignore_ascii_case("I");
            if rest.len() > 2 || (rest.len() == 2 && !indirect) {
                self.errors.push(AsmError::InvalidOperand {
                    line,
                    mnemonic: mnemonic.to_string(),
                    operand: rest[1..].join(" "),
                });
                return;
            }
            self.emit(
                line,
                Usage::Code,
                Stmt::Mri {
                    op,
                    operand: operand.to_uppercase(),
                    indirect,
                },
            );
            return;
        }

        let fixed = rri::TABLE
            .iter()
            .find(|(name, _)| *name == mnemonic)
            .map(|(_, bit)| 0x7000 | bit)
            .or_else(|| {
                ioi::TABLE
                    .iter()
                    .find(|(name, _)| *name == mnemonic)
                    .map(|(_, bit)| 0xF000 | bit)
            });

        match fixed {
            Some(word) => {
                if !rest.is_empty() {
                    self.errors.push(AsmError::InvalidOperand {
                        line,
                        mnemonic: mnemonic.to_string(),
                        operand: rest.join(" "),
                    });
                    return;
                }
                self.emit(line, Usage::Code, Stmt::Fixed(word));
            }
            None => self.errors.push(AsmError::UnknownMnemonic {
                line,
                mnemonic: mnemonic.to_string(),
            }),
        }
    }

    /// Pass 2: resolve MRI operands and emit machine words.
    fn pass2(&mut self) {
        for located in std::mem::take(&mut self.located) {
            let word = match located.stmt {
                Stmt::Literal(word) | Stmt::Fixed(word) => word,
                Stmt::Mri {
                    op,
                    ref operand,
                    indirect,
                } => match self.resolve(located.line, operand) {
                    Some(addr) => encode(&Instruction::Mri { op, indirect, addr }),
                    None => continue,
                },
            };
            self.machine_code.insert(located.addr, word);
            self.usage.insert(located.addr, located.usage);
        }
    }

    /// MRI operand resolution: symbol table first, then a hex literal
    /// of at most three digits. Defined labels shadow literals, so
    /// programs may use `A`, `B`, `C` as names.
    fn resolve(&mut self, line: usize, operand: &str) -> Option<u16> {
        if let Some(&addr) = self.labels.get(operand) {
            return Some(addr);
        }
        if operand.len() <= 3 {
            if let Ok(addr) = u16::from_str_radix(operand, 16) {
                return Some(addr);
            }
        }
        self.errors.push(AsmError::UnresolvedOperand {
            line,
            operand: operand.to_string(),
        });
        None
    }

    fn emit(&mut self, line: usize, usage: Usage, stmt: Stmt) {
        self.located.push(Located {
            line,
            addr: self.lc,
            usage,
            stmt,
        });
        self.lc = (self.lc + 1) & 0xFFF;
    }

    fn require_hex(&mut self, line: usize, mnemonic: &str, rest: &[&str], max: u32) -> Option<u16> {
        let Some(&operand) = rest.first() else {
            self.errors.push(AsmError::MissingOperand {
                line,
                mnemonic: mnemonic.to_string(),
            });
            return None;
        };
        match u32::from_str_radix(operand, 16) {
            Ok(value) if value <= max => Some(value as u16),
            Ok(_) => {
                self.errors.push(AsmError::ValueOutOfRange {
                    line,
                    mnemonic: mnemonic.to_string(),
                    value: operand.to_string(),
                });
                None
            }
            Err(_) => {
                self.errors.push(AsmError::InvalidOperand {
                    line,
                    mnemonic: mnemonic.to_string(),
                    operand: operand.to_string(),
                });
                None
            }
        }
    }

    fn require_dec(&mut self, line: usize, mnemonic: &str, rest: &[&str]) -> Option<u16> {
        let Some(&operand) = rest.first() else {
            self.errors.push(AsmError::MissingOperand {
                line,
                mnemonic: mnemonic.to_string(),
            });
            return None;
        };
        match operand.parse::<i32>() {
            Ok(value) => match dec_to_word16(value) {
                Some(word) => Some(word),
                None => {
                    self.errors.push(AsmError::ValueOutOfRange {
                        line,
                        mnemonic: mnemonic.to_string(),
                        value: operand.to_string(),
                    });
                    None
                }
            },
            Err(_) => {
                self.errors.push(AsmError::InvalidOperand {
                    line,
                    mnemonic: mnemonic.to_string(),
                    operand: operand.to_string(),
                });
                None
            }
        }
    }
}

/// Labels match `[A-Za-z_][A-Za-z0-9_]*`.
fn valid_label(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
