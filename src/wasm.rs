//! WebAssembly bindings for the basic-computer emulator.
//!
//! JavaScript-friendly wrappers around the core: assemble, step, poll
//! registers, deliver input, and drain output characters.

use crate::asm::{assemble, disassemble_word};
use crate::cpu::CpuState;
use crate::Cpu;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// WebAssembly-friendly CPU wrapper.
#[wasm_bindgen]
pub struct WasmCpu {
    cpu: Cpu,
    output: Rc<RefCell<Vec<u8>>>,
}

#[wasm_bindgen]
impl WasmCpu {
    /// Create a new CPU instance.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        let output = Rc::new(RefCell::new(Vec::new()));
        let mut cpu = Cpu::new();
        let sink = Rc::clone(&output);
        cpu.on_output(move |ch| sink.borrow_mut().push(ch));
        Self { cpu, output }
    }

    /// Assemble source code, load it, and set the start address.
    /// Returns the number of assembled words.
    #[wasm_bindgen]
    pub fn load_asm(&mut self, source: &str) -> Result<usize, JsError> {
        let assembly = assemble(source);
        if !assembly.success {
            let messages: Vec<String> =
                assembly.errors.iter().map(|e| e.to_string()).collect();
            return Err(JsError::new(&messages.join("\n")));
        }

        self.cpu.reset();
        self.output.borrow_mut().clear();
        self.cpu.mem.load_program(&assembly.machine_code);
        self.cpu.set_pc(assembly.start_address);
        Ok(assembly.machine_code.len())
    }

    /// Execute one micro-operation. Returns the micro-op description.
    #[wasm_bindgen]
    pub fn step(&mut self) -> String {
        self.cpu.step().message
    }

    /// Run until halt, input wait, or max micro-ops. Returns the total
    /// micro-op count.
    #[wasm_bindgen]
    pub fn run(&mut self, max_steps: u32) -> u64 {
        self.cpu.run(u64::from(max_steps));
        self.cpu.steps
    }

    /// Reset CPU and memory. The host reloads its program afterwards.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.output.borrow_mut().clear();
    }

    /// Deliver one input character to the machine.
    #[wasm_bindgen]
    pub fn set_input(&mut self, ch: u8) {
        self.cpu.set_input(ch);
    }

    /// Drop pending input.
    #[wasm_bindgen]
    pub fn clear_input(&mut self) {
        self.cpu.clear_input();
    }

    /// Signal that emitted output was accepted (re-raises FGO).
    #[wasm_bindgen]
    pub fn ack_output(&mut self) {
        self.cpu.ack_output();
    }

    /// Output characters emitted since the last call, drained.
    #[wasm_bindgen]
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut *self.output.borrow_mut())
    }

    /// Check if the CPU can execute.
    #[wasm_bindgen]
    pub fn is_running(&self) -> bool {
        self.cpu.is_running()
    }

    /// Check if the CPU is halted.
    #[wasm_bindgen]
    pub fn is_halted(&self) -> bool {
        self.cpu.is_halted()
    }

    /// Check if an INP is blocked waiting for a character.
    #[wasm_bindgen]
    pub fn waiting_for_input(&self) -> bool {
        self.cpu.is_waiting_for_input()
    }

    /// Get micro-op count.
    #[wasm_bindgen]
    pub fn steps(&self) -> u64 {
        self.cpu.steps
    }

    /// Get program counter.
    #[wasm_bindgen]
    pub fn pc(&self) -> u16 {
        self.cpu.regs.pc
    }

    /// Get accumulator value.
    #[wasm_bindgen]
    pub fn accumulator(&self) -> u16 {
        self.cpu.regs.ac
    }

    /// Get state as string.
    #[wasm_bindgen]
    pub fn state(&self) -> String {
        match self.cpu.state {
            CpuState::Run => "Run".to_string(),
            CpuState::Halt => "Halt".to_string(),
            CpuState::WaitInput => "WaitInput".to_string(),
        }
    }

    /// Get the memory word at an address (zero past the end).
    #[wasm_bindgen]
    pub fn memory_at(&self, addr: u16) -> u16 {
        self.cpu.mem.read(addr)
    }

    /// Get all 4096 memory words.
    #[wasm_bindgen]
    pub fn memory_all(&self) -> Vec<u16> {
        (0..crate::cpu::MEMORY_SIZE as u16)
            .map(|addr| self.cpu.mem.read(addr))
            .collect()
    }

    /// Get registers and flags as a JSON string.
    #[wasm_bindgen]
    pub fn registers_json(&self) -> String {
        let regs = &self.cpu.regs;
        format!(
            r#"{{"ac":{},"dr":{},"ar":{},"pc":{},"ir":{},"tr":{},"inpr":{},"outr":{},"sc":{},"i":{},"e":{},"s":{},"ien":{},"fgi":{},"fgo":{},"r":{},"steps":{}}}"#,
            regs.ac,
            regs.dr,
            regs.ar,
            regs.pc,
            regs.ir,
            regs.tr,
            regs.inpr,
            regs.outr,
            regs.sc,
            regs.i,
            regs.e,
            regs.s,
            regs.ien,
            regs.fgi,
            regs.fgo,
            regs.r,
            self.cpu.steps
        )
    }
}

impl Default for WasmCpu {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble source code and return the assembled word count.
#[wasm_bindgen]
pub fn wasm_assemble(source: &str) -> Result<usize, JsError> {
    let assembly = assemble(source);
    if !assembly.success {
        let messages: Vec<String> = assembly.errors.iter().map(|e| e.to_string()).collect();
        return Err(JsError::new(&messages.join("\n")));
    }
    Ok(assembly.machine_code.len())
}

/// Disassemble a single machine word.
#[wasm_bindgen]
pub fn wasm_disassemble(word: u16) -> String {
    disassemble_word(word)
}
