//! Memory subsystem of the basic computer.
//!
//! The machine addresses 4096 sixteen-bit words. Addresses arriving from
//! the CPU are already reduced to 12 bits; anything wider coming from a
//! host is answered defensively: reads return zero with a logged warning,
//! writes are dropped.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// The number of memory cells in the basic computer.
pub const MEMORY_SIZE: usize = 4096;

/// Main memory: 4096 sixteen-bit words.
#[derive(Clone, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<u16>,
}

impl Memory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![0; MEMORY_SIZE],
        }
    }

    /// Read the cell at `addr`.
    ///
    /// Out-of-range addresses read as zero and log a warning.
    #[inline]
    pub fn read(&self, addr: u16) -> u16 {
        match self.cells.get(addr as usize) {
            Some(&word) => word,
            None => {
                warn!("memory read out of range: {:04X}, returning 0", addr);
                0
            }
        }
    }

    /// Write `word` to the cell at `addr`.
    ///
    /// Out-of-range writes are dropped.
    #[inline]
    pub fn write(&mut self, addr: u16, word: u16) {
        match self.cells.get_mut(addr as usize) {
            Some(cell) => *cell = word,
            None => {
                debug!("memory write out of range: {:04X}, dropped", addr);
            }
        }
    }

    /// Zero all cells.
    pub fn reset(&mut self) {
        for cell in &mut self.cells {
            *cell = 0;
        }
    }

    /// Load an assembled program: each (address, word) pair is written,
    /// with addresses reduced modulo 4096.
    pub fn load_program(&mut self, machine_code: &BTreeMap<u16, u16>) {
        for (&addr, &word) in machine_code {
            self.cells[(addr as usize) % MEMORY_SIZE] = word;
        }
    }

    /// All (address, word) pairs whose cell is non-zero, in ascending
    /// address order. Display collaborators use this for memory tables.
    pub fn enumerate_nonzero(&self) -> Vec<(u16, u16)> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, &word)| word != 0)
            .map(|(addr, &word)| (addr as u16, word))
            .collect()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|&&w| w != 0).count();
        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}
