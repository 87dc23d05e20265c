//! Register file and flags of the basic computer.
//!
//! The machine carries nine registers and seven one-bit flags:
//! - AC: 16-bit accumulator
//! - DR: 16-bit data register (memory-operand staging)
//! - AR: 12-bit address register
//! - PC: 12-bit program counter
//! - IR: 16-bit instruction register
//! - TR: 16-bit temporary register (interrupt PC save)
//! - INPR / OUTR: 8-bit input and output latches
//! - SC: 3-bit sequence counter naming the current phase T0..T6
//! - I, E, S, IEN, FGI, FGO, R: indirect, carry, run, interrupt-enable,
//!   input-available, output-ready, and interrupt-request flags

use crate::word::ADDR_MASK;
use serde::{Deserialize, Serialize};

/// The register file.
///
/// Fields are public and host-readable; hosts mutate only through the
/// `Cpu` API, which maintains the width invariants (PC and AR always
/// fit in 12 bits, INPR and OUTR in 8).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// AC: 16-bit accumulator.
    pub ac: u16,
    /// DR: 16-bit data register.
    pub dr: u16,
    /// AR: 12-bit address register.
    pub ar: u16,
    /// PC: 12-bit program counter.
    pub pc: u16,
    /// IR: 16-bit instruction register.
    pub ir: u16,
    /// TR: 16-bit temporary register.
    pub tr: u16,
    /// INPR: latched input character.
    pub inpr: u8,
    /// OUTR: latched output character.
    pub outr: u8,
    /// SC: sequence counter, 0..=6.
    pub sc: u8,
    /// I: indirect addressing flag, from IR bit 15.
    pub i: bool,
    /// E: arithmetic carry, the 17th accumulator bit.
    pub e: bool,
    /// S: run flag; false is a sticky halt.
    pub s: bool,
    /// IEN: interrupt-enable master.
    pub ien: bool,
    /// FGI: input available.
    pub fgi: bool,
    /// FGO: output device ready.
    pub fgo: bool,
    /// R: pending-interrupt request.
    pub r: bool,
}

impl Registers {
    /// Create a register file in the reset state.
    pub fn new() -> Self {
        Self {
            ac: 0,
            dr: 0,
            ar: 0,
            pc: 0,
            ir: 0,
            tr: 0,
            inpr: 0,
            outr: 0,
            sc: 0,
            i: false,
            e: false,
            s: true,
            ien: false,
            fgi: false,
            // The output device starts ready.
            fgo: true,
            r: false,
        }
    }

    /// Restore the reset state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Set the program counter, reduced to 12 bits.
    #[inline]
    pub fn set_pc(&mut self, addr: u16) {
        self.pc = addr & ADDR_MASK;
    }

    /// Set the address register, reduced to 12 bits.
    #[inline]
    pub fn set_ar(&mut self, addr: u16) {
        self.ar = addr & ADDR_MASK;
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}
