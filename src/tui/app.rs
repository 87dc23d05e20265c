//! Front-panel application state and logic.

use crate::asm::{disassemble_word, ObjectFile};
use crate::cpu::CpuState;
use crate::Cpu;
use std::cell::RefCell;
use std::rc::Rc;

/// Front-panel application state.
pub struct FrontPanelApp {
    /// The CPU being driven.
    pub cpu: Cpu,
    /// Original program for reloads.
    pub program: ObjectFile,
    /// Is the panel free-running?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Output characters emitted so far.
    pub output: Rc<RefCell<String>>,
    /// Memory view scroll offset.
    pub mem_scroll: usize,
}

impl FrontPanelApp {
    /// Create a front panel with a loaded program.
    pub fn new(program: ObjectFile) -> Self {
        let output = Rc::new(RefCell::new(String::new()));
        let cpu = Self::fresh_cpu(&program, &output);

        Self {
            cpu,
            program,
            running: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            output,
            mem_scroll: 0,
        }
    }

    fn fresh_cpu(program: &ObjectFile, output: &Rc<RefCell<String>>) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.mem.load_program(&program.words);
        cpu.set_pc(program.start);
        let sink = Rc::clone(output);
        cpu.on_output(move |ch| sink.borrow_mut().push(ch as char));
        cpu
    }

    /// Execute one micro-operation.
    pub fn step(&mut self) {
        match self.cpu.state {
            CpuState::Halt => {
                self.status = "CPU halted. Press 'x' to reset.".into();
                self.running = false;
                return;
            }
            CpuState::WaitInput => {
                self.status = "Waiting for input: type a character.".into();
                self.running = false;
                return;
            }
            CpuState::Run => {}
        }

        let report = self.cpu.step();
        let phase = report
            .phase
            .map(|p| format!("{:?}", p))
            .unwrap_or_else(|| "--".into());
        self.status = format!("{}: {}", phase, report.message);

        // The panel accepts output characters as soon as they appear.
        if !self.cpu.regs.fgo {
            self.cpu.ack_output();
        }

        if report.state == CpuState::WaitInput {
            self.status = "Waiting for input: type a character.".into();
            self.running = false;
        }
    }

    /// Start free-running.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// Run one iteration of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }
        if self.cpu.state != CpuState::Run {
            self.running = false;
            self.status = format!("Stopped after {} micro-ops: {:?}", self.cpu.steps, self.cpu.state);
            return;
        }
        self.step();
    }

    /// Deliver a typed character to a waiting INP.
    pub fn deliver_input(&mut self, ch: char) {
        if self.cpu.is_waiting_for_input() {
            self.cpu.set_input(ch as u8);
            self.status = format!("Input {:?} latched, FGI set.", ch);
        }
    }

    /// Reset CPU and reload the program.
    pub fn reset(&mut self) {
        self.output.borrow_mut().clear();
        self.cpu = Self::fresh_cpu(&self.program, &self.output);
        self.running = false;
        self.status = "Reset. Ready.".into();
    }

    /// Disassembly lines around the current PC.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(u16, String, bool)> {
        let pc = self.cpu.regs.pc;
        let start = pc.saturating_sub(lines as u16 / 2);

        (0..lines as u16)
            .filter_map(|i| {
                let addr = start + i;
                if addr > 0xFFF {
                    return None;
                }
                let word = self.cpu.mem.read(addr);
                Some((addr, disassemble_word(word), addr == pc))
            })
            .collect()
    }
}
