//! CPU control unit of the basic computer.
//!
//! The CPU advances one micro-operation per `step()` call, driven by the
//! sequence counter SC. A full instruction takes 3 to 7 steps:
//!
//! - T0: interrupt check, then AR <- PC
//! - T1: IR <- M[AR], PC <- PC + 1
//! - T2: AR <- IR(0-11), I <- IR(15), decode
//! - T3: opcode 7 executes in one step; MRI fetches the indirect address
//! - T4..T6: memory-reference execute phases
//!
//! The interrupt cycle (R set at T0) saves PC into M[0] and vectors to
//! address 1 in a single step.

use crate::cpu::decode::{self, ioi, rri, Instruction, MriOp};
use crate::cpu::{Memory, Registers};
use crate::word::{add16, fmt_addr, inc12, inc16, not16, sign_bit};
use serde::{Deserialize, Serialize};

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// Executing normally.
    Run,
    /// Halted by HLT; sticky until reset or a new start address.
    Halt,
    /// An INP micro-op is blocked on FGI = 0.
    WaitInput,
}

/// The phase a micro-operation executed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    T0,
    T1,
    T2,
    T3,
    T4,
    T5,
    T6,
    /// The single-step interrupt cycle taken in place of T0.
    Interrupt,
}

/// What one `step()` call did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    /// Execution state after the step.
    pub state: CpuState,
    /// Phase of the micro-op, or `None` if no micro-op ran (halted CPU,
    /// sequence-counter recovery).
    pub phase: Option<Phase>,
    /// Front-panel description of the micro-op.
    pub message: String,
    /// Register snapshot after the step.
    pub registers: Registers,
}

/// Hook invoked synchronously when OUT latches a character.
pub type OutputHook = Box<dyn FnMut(u8)>;

/// Hook invoked while an INP is blocked waiting for input.
pub type InputRequiredHook = Box<dyn FnMut()>;

/// The basic-computer CPU with its memory.
pub struct Cpu {
    /// Register file and flags.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Micro-operations executed (for profiling and run limits).
    pub steps: u64,
    /// Instruction decoded at T2, carried through T3..T6.
    current: Option<Instruction>,
    output_hook: Option<OutputHook>,
    input_required_hook: Option<InputRequiredHook>,
}

impl Cpu {
    /// Create a CPU in the reset state with zeroed memory.
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            state: CpuState::Run,
            steps: 0,
            current: None,
            output_hook: None,
            input_required_hook: None,
        }
    }

    /// Reset registers, flags, and memory to initial values.
    /// Hosts reload the program afterwards.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.reset();
        self.state = CpuState::Run;
        self.steps = 0;
        self.current = None;
    }

    /// Set the start address and raise the run flag.
    pub fn set_pc(&mut self, addr: u16) {
        self.regs.set_pc(addr);
        self.regs.s = true;
        self.regs.sc = 0;
        self.current = None;
        self.state = CpuState::Run;
    }

    /// Latch an input character: INPR <- ch, FGI <- 1. A CPU blocked in
    /// `WaitInput` becomes runnable; the next `step()` retries the INP.
    pub fn set_input(&mut self, ch: u8) {
        self.regs.inpr = ch;
        self.regs.fgi = true;
        if self.state == CpuState::WaitInput {
            self.state = CpuState::Run;
        }
    }

    /// Drop pending input: FGI <- 0. A waiting CPU keeps waiting.
    pub fn clear_input(&mut self) {
        self.regs.fgi = false;
    }

    /// Signal that the output collaborator accepted OUTR: FGO <- 1.
    pub fn ack_output(&mut self) {
        self.regs.fgo = true;
    }

    /// Register the OUT hook, called synchronously during the step that
    /// executes OUT, before `step()` returns.
    pub fn on_output(&mut self, hook: impl FnMut(u8) + 'static) {
        self.output_hook = Some(Box::new(hook));
    }

    /// Register the input-required hook, called on every step an INP
    /// spends blocked. Collaborators are free to ignore repeats.
    pub fn on_input_required(&mut self, hook: impl FnMut() + 'static) {
        self.input_required_hook = Some(Box::new(hook));
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halt
    }

    /// Check if the CPU can execute micro-ops.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Run
    }

    /// Check if the CPU is blocked on input.
    pub fn is_waiting_for_input(&self) -> bool {
        self.state == CpuState::WaitInput
    }

    /// Execute micro-ops until halt, input wait, or the step limit.
    /// Returns the number of micro-ops executed.
    pub fn run(&mut self, max_steps: u64) -> u64 {
        let start = self.steps;
        while self.state == CpuState::Run && self.steps - start < max_steps {
            self.step();
        }
        self.steps - start
    }

    /// Execute one micro-operation.
    pub fn step(&mut self) -> StepReport {
        if !self.regs.s {
            self.state = CpuState::Halt;
            return self.report(None, "CPU halted; reset or set a start address to continue");
        }

        self.steps += 1;

        match self.regs.sc {
            0 => {
                if self.regs.r {
                    self.interrupt_cycle()
                } else {
                    self.regs.ar = self.regs.pc;
                    self.regs.sc = 1;
                    self.report(Some(Phase::T0), "AR <- PC")
                }
            }
            1 => {
                self.regs.ir = self.mem.read(self.regs.ar);
                self.regs.pc = inc12(self.regs.pc);
                self.regs.sc = 2;
                let message = format!("IR <- M[{}], PC <- PC + 1", fmt_addr(self.regs.ar));
                self.report(Some(Phase::T1), message)
            }
            2 => {
                self.regs.set_ar(self.regs.ir);
                self.regs.i = sign_bit(self.regs.ir);
                self.current = Some(decode::decode(self.regs.ir));
                self.regs.sc = 3;
                self.report(Some(Phase::T2), "AR <- IR(0-11), I <- IR(15), decode opcode")
            }
            3 => match self.current {
                Some(Instruction::Rri { mask }) => self.execute_rri(mask),
                Some(Instruction::Ioi { mask }) => self.execute_ioi(mask),
                Some(Instruction::Mri { indirect, .. }) => {
                    let message = if indirect {
                        self.regs.set_ar(self.mem.read(self.regs.ar));
                        "AR <- M[AR] (indirect)".to_string()
                    } else {
                        "direct addressing, AR holds the effective address".to_string()
                    };
                    self.regs.sc = 4;
                    self.report(Some(Phase::T3), message)
                }
                None => self.recover_sequence(),
            },
            4 => self.mri_t4(),
            5 => self.mri_t5(),
            6 => self.mri_t6(),
            _ => self.recover_sequence(),
        }
    }

    /// Single-step interrupt cycle: save PC into M[0], vector to 001.
    fn interrupt_cycle(&mut self) -> StepReport {
        self.regs.tr = self.regs.pc;
        self.regs.ar = 0;
        self.mem.write(0, self.regs.tr);
        self.regs.pc = 1;
        self.regs.ien = false;
        self.regs.r = false;
        self.regs.sc = 0;
        self.current = None;
        self.report(
            Some(Phase::Interrupt),
            "interrupt: TR <- PC, M[000] <- TR, PC <- 001, IEN <- 0",
        )
    }

    /// MRI first execute step.
    fn mri_t4(&mut self) -> StepReport {
        let op = match self.current {
            Some(Instruction::Mri { op, .. }) => op,
            _ => return self.recover_sequence(),
        };
        let message;
        match op {
            MriOp::And | MriOp::Add | MriOp::Lda | MriOp::Isz => {
                self.regs.dr = self.mem.read(self.regs.ar);
                self.regs.sc = 5;
                message = format!("DR <- M[{}]", fmt_addr(self.regs.ar));
            }
            MriOp::Sta => {
                self.mem.write(self.regs.ar, self.regs.ac);
                message = format!("M[{}] <- AC", fmt_addr(self.regs.ar));
                self.end_instruction();
            }
            MriOp::Bun => {
                self.regs.pc = self.regs.ar;
                message = "PC <- AR".to_string();
                self.end_instruction();
            }
            MriOp::Bsa => {
                // The 12-bit return address is stored zero-extended.
                self.mem.write(self.regs.ar, self.regs.pc);
                message = format!("M[{}] <- PC, AR <- AR + 1", fmt_addr(self.regs.ar));
                self.regs.ar = inc12(self.regs.ar);
                self.regs.sc = 5;
            }
        }
        self.report(Some(Phase::T4), message)
    }

    /// MRI second execute step.
    fn mri_t5(&mut self) -> StepReport {
        let op = match self.current {
            Some(Instruction::Mri { op, .. }) => op,
            _ => return self.recover_sequence(),
        };
        let message;
        match op {
            MriOp::And => {
                self.regs.ac &= self.regs.dr;
                message = "AC <- AC AND DR";
                self.end_instruction();
            }
            MriOp::Add => {
                let (sum, carry) = add16(self.regs.ac, self.regs.dr);
                self.regs.ac = sum;
                self.regs.e = carry;
                message = "AC <- AC + DR, E <- carry";
                self.end_instruction();
            }
            MriOp::Lda => {
                self.regs.ac = self.regs.dr;
                message = "AC <- DR";
                self.end_instruction();
            }
            MriOp::Bsa => {
                self.regs.pc = self.regs.ar;
                message = "PC <- AR";
                self.end_instruction();
            }
            MriOp::Isz => {
                self.regs.dr = inc16(self.regs.dr);
                self.mem.write(self.regs.ar, self.regs.dr);
                self.regs.sc = 6;
                message = "DR <- DR + 1, M[AR] <- DR";
            }
            MriOp::Sta | MriOp::Bun => return self.recover_sequence(),
        }
        self.report(Some(Phase::T5), message)
    }

    /// MRI third execute step (ISZ skip decision).
    fn mri_t6(&mut self) -> StepReport {
        match self.current {
            Some(Instruction::Mri { op: MriOp::Isz, .. }) => {
                let message = if self.regs.dr == 0 {
                    self.regs.pc = inc12(self.regs.pc);
                    "DR = 0: PC <- PC + 1 (skip)"
                } else {
                    "DR != 0: no skip"
                };
                self.end_instruction();
                self.report(Some(Phase::T6), message)
            }
            _ => self.recover_sequence(),
        }
    }

    /// Register-reference execution: every set bit is applied, in the
    /// fixed order of the operation table. The report names the last
    /// operation applied.
    fn execute_rri(&mut self, mask: u16) -> StepReport {
        let mut message = "register-reference: no operation bits set";

        if mask & rri::CLA != 0 {
            self.regs.ac = 0;
            message = "AC <- 0";
        }
        if mask & rri::CLE != 0 {
            self.regs.e = false;
            message = "E <- 0";
        }
        if mask & rri::CMA != 0 {
            self.regs.ac = not16(self.regs.ac);
            message = "AC <- NOT AC";
        }
        if mask & rri::CME != 0 {
            self.regs.e = !self.regs.e;
            message = "E <- NOT E";
        }
        if mask & rri::CIR != 0 {
            let low = self.regs.ac & 1 != 0;
            self.regs.ac = (self.regs.ac >> 1) | (u16::from(self.regs.e) << 15);
            self.regs.e = low;
            message = "AC, E <- rotate right through E";
        }
        if mask & rri::CIL != 0 {
            let high = sign_bit(self.regs.ac);
            self.regs.ac = (self.regs.ac << 1) | u16::from(self.regs.e);
            self.regs.e = high;
            message = "AC, E <- rotate left through E";
        }
        if mask & rri::INC != 0 {
            self.regs.ac = inc16(self.regs.ac);
            message = "AC <- AC + 1";
        }
        if mask & rri::SPA != 0 {
            // Strict positive: AC = 0 does not skip. The Mano text skips
            // on the sign bit alone; this machine requires nonzero too.
            if !sign_bit(self.regs.ac) && self.regs.ac != 0 {
                self.regs.pc = inc12(self.regs.pc);
            }
            message = "skip if AC > 0";
        }
        if mask & rri::SNA != 0 {
            if sign_bit(self.regs.ac) {
                self.regs.pc = inc12(self.regs.pc);
            }
            message = "skip if AC < 0";
        }
        if mask & rri::SZA != 0 {
            if self.regs.ac == 0 {
                self.regs.pc = inc12(self.regs.pc);
            }
            message = "skip if AC = 0";
        }
        if mask & rri::SZE != 0 {
            if !self.regs.e {
                self.regs.pc = inc12(self.regs.pc);
            }
            message = "skip if E = 0";
        }
        if mask & rri::HLT != 0 {
            self.regs.s = false;
            self.state = CpuState::Halt;
            message = "S <- 0 (halt)";
        }

        self.end_instruction();
        self.report(Some(Phase::T3), message)
    }

    /// Input/output execution. A blocked INP suspends the whole word:
    /// SC stays at 3 and the same instruction re-executes once input
    /// arrives.
    fn execute_ioi(&mut self, mask: u16) -> StepReport {
        let mut message = "input/output: no operation bits set";

        if mask & ioi::INP != 0 {
            if self.regs.fgi {
                self.regs.ac = (self.regs.ac & 0xFF00) | u16::from(self.regs.inpr);
                self.regs.fgi = false;
                self.state = CpuState::Run;
                message = "AC(0-7) <- INPR, FGI <- 0";
            } else {
                self.state = CpuState::WaitInput;
                if let Some(hook) = self.input_required_hook.as_mut() {
                    hook();
                }
                return self.report(Some(Phase::T3), "INP blocked: FGI = 0, waiting for input");
            }
        }
        if mask & ioi::OUT != 0 {
            self.regs.outr = (self.regs.ac & 0x00FF) as u8;
            self.regs.fgo = false;
            let ch = self.regs.outr;
            if let Some(hook) = self.output_hook.as_mut() {
                hook(ch);
            }
            message = "OUTR <- AC(0-7), FGO <- 0";
        }
        if mask & ioi::SKI != 0 {
            if self.regs.fgi {
                self.regs.pc = inc12(self.regs.pc);
            }
            message = "skip if FGI = 1";
        }
        if mask & ioi::SKO != 0 {
            if self.regs.fgo {
                self.regs.pc = inc12(self.regs.pc);
            }
            message = "skip if FGO = 1";
        }
        if mask & ioi::ION != 0 {
            self.regs.ien = true;
            message = "IEN <- 1";
        }
        if mask & ioi::IOF != 0 {
            self.regs.ien = false;
            message = "IEN <- 0";
        }

        self.end_instruction();
        self.report(Some(Phase::T3), message)
    }

    /// Close the instruction: SC back to 0 and the interrupt request
    /// latched for the next T0.
    fn end_instruction(&mut self) {
        self.regs.sc = 0;
        self.current = None;
        self.regs.r = self.regs.ien && (self.regs.fgi || self.regs.fgo);
    }

    /// An unreachable sequence-counter value resets SC to 0 and reports
    /// the recovery instead of panicking.
    fn recover_sequence(&mut self) -> StepReport {
        let sc = self.regs.sc;
        self.regs.sc = 0;
        self.current = None;
        self.report(None, format!("invalid sequence counter {}, reset to T0", sc))
    }

    fn report(&self, phase: Option<Phase>, message: impl Into<String>) -> StepReport {
        StepReport {
            state: self.state,
            phase,
            message: message.into(),
            registers: self.regs.clone(),
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("steps", &self.steps)
            .field("regs", &self.regs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Load raw words starting at `start` and point the PC there.
    fn load(cpu: &mut Cpu, start: u16, words: &[u16]) {
        for (offset, &word) in words.iter().enumerate() {
            cpu.mem.write(start + offset as u16, word);
        }
        cpu.set_pc(start);
    }

    /// Step through exactly one instruction (until SC returns to 0).
    fn step_instruction(cpu: &mut Cpu) {
        loop {
            let report = cpu.step();
            if report.state != CpuState::Run || cpu.regs.sc == 0 {
                break;
            }
        }
    }

    #[test]
    fn test_add_two_numbers_program() {
        // LDA A / ADD B / STA C / HLT with A=5, B=3, C=0 at 104..106.
        let mut cpu = Cpu::new();
        load(
            &mut cpu,
            0x100,
            &[0x2104, 0x1105, 0x3106, 0x7001, 0x0005, 0x0003, 0x0000],
        );

        cpu.run(100);

        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.ac, 0x0008);
        assert_eq!(cpu.mem.read(0x106), 0x0008);
        assert!(!cpu.regs.e);
    }

    #[test]
    fn test_halt_is_sticky() {
        let mut cpu = Cpu::new();
        load(&mut cpu, 0x000, &[0x7001]);
        cpu.run(100);
        assert!(cpu.is_halted());

        let before = cpu.regs.clone();
        let report = cpu.step();
        assert_eq!(report.state, CpuState::Halt);
        assert_eq!(report.phase, None);
        assert_eq!(cpu.regs, before, "halted step must not mutate");
    }

    #[test]
    fn test_instruction_step_counts() {
        let mut cpu = Cpu::new();
        // CLA: T0, T1, T2, T3 = 4 steps.
        load(&mut cpu, 0x000, &[0x7800]);
        for _ in 0..4 {
            cpu.step();
        }
        assert_eq!(cpu.regs.sc, 0);

        // LDA direct: 6 steps (T0..T5).
        let mut cpu = Cpu::new();
        load(&mut cpu, 0x000, &[0x2005]);
        for _ in 0..6 {
            cpu.step();
        }
        assert_eq!(cpu.regs.sc, 0);

        // ISZ direct: 7 steps (T0..T6).
        let mut cpu = Cpu::new();
        load(&mut cpu, 0x000, &[0x6005]);
        for _ in 0..7 {
            cpu.step();
        }
        assert_eq!(cpu.regs.sc, 0);
    }

    #[test]
    fn test_indirect_addressing() {
        // LDA 005 I with M[005] = 0x200 and M[200] = 0x1234.
        let mut cpu = Cpu::new();
        load(&mut cpu, 0x000, &[0xA005]);
        cpu.mem.write(0x005, 0x0200);
        cpu.mem.write(0x200, 0x1234);

        step_instruction(&mut cpu);
        assert_eq!(cpu.regs.ac, 0x1234);
    }

    #[test]
    fn test_add_carry_into_e() {
        let mut cpu = Cpu::new();
        load(&mut cpu, 0x000, &[0x1003, 0x7001, 0x0000, 0x0001]);
        cpu.regs.ac = 0xFFFF;
        cpu.run(100);

        assert_eq!(cpu.regs.ac, 0x0000);
        assert!(cpu.regs.e, "ADD carry-out sets E");
    }

    #[test]
    fn test_bsa_subroutine() {
        // 100: BSA 102 / 101: HLT / 102: (link) / 103: BUN 102 I
        let mut cpu = Cpu::new();
        load(&mut cpu, 0x100, &[0x5102, 0x7001, 0x0000, 0xC102]);

        cpu.run(100);

        assert!(cpu.is_halted());
        // BSA stored the return address, then the indirect BUN used it.
        assert_eq!(cpu.mem.read(0x102), 0x0101);
    }

    #[test]
    fn test_bsa_negate_program() {
        // ORG 100: BSA SUB / HLT / SUB: link / LDA X / CMA / INC /
        // STA X / BUN SUB I / X: 5. Negates X in place.
        let mut cpu = Cpu::new();
        load(
            &mut cpu,
            0x100,
            &[
                0x5102, // BSA 102
                0x7001, // HLT
                0x0000, // SUB: return link
                0x2108, // LDA 108
                0x7200, // CMA
                0x7020, // INC
                0x3108, // STA 108
                0xC102, // BUN 102 I
                0x0005, // X: DEC 5
            ],
        );

        cpu.run(200);

        assert!(cpu.is_halted());
        assert_eq!(cpu.mem.read(0x102), 0x0101, "return link saved by BSA");
        assert_eq!(cpu.mem.read(0x108), 0xFFFB, "X negated to -5");
    }

    #[test]
    fn test_isz_skip_sequence() {
        // Execute ISZ 200 three times against a cell starting at 0xFFFE.
        let mut cpu = Cpu::new();
        cpu.mem.write(0x200, 0xFFFE);
        load(&mut cpu, 0x000, &[0x6200, 0x6200, 0x6200]);

        let pc_before = cpu.regs.pc;
        step_instruction(&mut cpu);
        assert_eq!(cpu.mem.read(0x200), 0xFFFF);
        assert_eq!(cpu.regs.pc, pc_before + 1, "no skip");

        step_instruction(&mut cpu);
        assert_eq!(cpu.mem.read(0x200), 0x0000);
        assert_eq!(cpu.regs.pc, pc_before + 3, "skip over the next word");

        cpu.set_pc(0x002);
        step_instruction(&mut cpu);
        assert_eq!(cpu.mem.read(0x200), 0x0001);
        assert_eq!(cpu.regs.pc, 0x003, "no skip");
    }

    #[test]
    fn test_circular_shift_round_trip() {
        let mut cpu = Cpu::new();
        load(&mut cpu, 0x000, &[0x7080, 0x7040]); // CIR, CIL
        cpu.regs.ac = 0x8001;
        cpu.regs.e = false;

        step_instruction(&mut cpu);
        assert_eq!(cpu.regs.ac, 0x4000);
        assert!(cpu.regs.e);

        step_instruction(&mut cpu);
        assert_eq!(cpu.regs.ac, 0x8001);
        assert!(!cpu.regs.e);
    }

    #[test]
    fn test_complement_involutions() {
        let mut cpu = Cpu::new();
        load(&mut cpu, 0x000, &[0x7200, 0x7200, 0x7100, 0x7100]); // CMA CMA CME CME
        cpu.regs.ac = 0x5A5A;
        cpu.regs.e = true;

        step_instruction(&mut cpu);
        assert_eq!(cpu.regs.ac, 0xA5A5);
        step_instruction(&mut cpu);
        assert_eq!(cpu.regs.ac, 0x5A5A);

        step_instruction(&mut cpu);
        assert!(!cpu.regs.e);
        step_instruction(&mut cpu);
        assert!(cpu.regs.e);
    }

    #[test]
    fn test_inc_leaves_e_alone() {
        let mut cpu = Cpu::new();
        load(&mut cpu, 0x000, &[0x7020]); // INC
        cpu.regs.ac = 0xFFFF;
        cpu.regs.e = false;

        step_instruction(&mut cpu);
        assert_eq!(cpu.regs.ac, 0x0000);
        assert!(!cpu.regs.e, "INC never touches E");
    }

    #[test]
    fn test_spa_strict_positive() {
        // AC = 0 must not skip under the strict semantics.
        for (ac, skips) in [(0x0000u16, false), (0x0001, true), (0x8000, false)] {
            let mut cpu = Cpu::new();
            load(&mut cpu, 0x000, &[0x7010]); // SPA
            cpu.regs.ac = ac;
            step_instruction(&mut cpu);
            let expected = if skips { 0x002 } else { 0x001 };
            assert_eq!(cpu.regs.pc, expected, "AC={:04X}", ac);
        }
    }

    #[test]
    fn test_sna_sza_sze() {
        let mut cpu = Cpu::new();
        load(&mut cpu, 0x000, &[0x7008]); // SNA
        cpu.regs.ac = 0x8000;
        step_instruction(&mut cpu);
        assert_eq!(cpu.regs.pc, 0x002);

        let mut cpu = Cpu::new();
        load(&mut cpu, 0x000, &[0x7004]); // SZA
        cpu.regs.ac = 0;
        step_instruction(&mut cpu);
        assert_eq!(cpu.regs.pc, 0x002);

        let mut cpu = Cpu::new();
        load(&mut cpu, 0x000, &[0x7002]); // SZE
        cpu.regs.e = false;
        step_instruction(&mut cpu);
        assert_eq!(cpu.regs.pc, 0x002);
    }

    #[test]
    fn test_multi_bit_rri() {
        // CLA | CLE in one word clears both.
        let mut cpu = Cpu::new();
        load(&mut cpu, 0x000, &[0x7C00]);
        cpu.regs.ac = 0x1234;
        cpu.regs.e = true;

        step_instruction(&mut cpu);
        assert_eq!(cpu.regs.ac, 0);
        assert!(!cpu.regs.e);
    }

    #[test]
    fn test_out_invokes_hook_and_clears_fgo() {
        let outputs = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&outputs);

        let mut cpu = Cpu::new();
        cpu.on_output(move |ch| sink.borrow_mut().push(ch));
        load(&mut cpu, 0x000, &[0xF400]); // OUT
        cpu.regs.ac = 0x0141;

        step_instruction(&mut cpu);

        assert_eq!(*outputs.borrow(), vec![0x41]);
        assert_eq!(cpu.regs.outr, 0x41);
        assert!(!cpu.regs.fgo);

        cpu.ack_output();
        assert!(cpu.regs.fgo);
    }

    #[test]
    fn test_inp_blocked_holds_sc() {
        let requests = Rc::new(RefCell::new(0u32));
        let counter = Rc::clone(&requests);

        let mut cpu = Cpu::new();
        cpu.on_input_required(move || *counter.borrow_mut() += 1);
        load(&mut cpu, 0x000, &[0xF800]); // INP

        cpu.step(); // T0
        cpu.step(); // T1
        cpu.step(); // T2
        let report = cpu.step(); // T3, blocked

        assert_eq!(report.state, CpuState::WaitInput);
        assert_eq!(cpu.regs.sc, 3, "SC held so the INP re-executes");
        assert_eq!(*requests.borrow(), 1);

        // Stepping while still blocked re-invokes the hook, nothing else.
        cpu.step();
        assert_eq!(cpu.regs.sc, 3);
        assert_eq!(*requests.borrow(), 2);

        // Input arrives; the retried INP consumes it.
        cpu.set_input(0x41);
        assert!(cpu.is_running());
        let report = cpu.step();
        assert_eq!(report.state, CpuState::Run);
        assert_eq!(cpu.regs.ac & 0x00FF, 0x0041);
        assert!(!cpu.regs.fgi);
        assert_eq!(cpu.regs.sc, 0);
    }

    #[test]
    fn test_inp_preserves_high_byte() {
        let mut cpu = Cpu::new();
        load(&mut cpu, 0x000, &[0xF800]);
        cpu.regs.ac = 0xAB00;
        cpu.set_input(0xCD);

        step_instruction(&mut cpu);
        assert_eq!(cpu.regs.ac, 0xABCD);
    }

    #[test]
    fn test_ski_with_pending_input() {
        let mut cpu = Cpu::new();
        load(&mut cpu, 0x100, &[0xF200]); // SKI
        cpu.set_input(0x20);

        step_instruction(&mut cpu);

        assert_eq!(cpu.regs.pc, 0x102, "SKI skipped");
        assert!(cpu.regs.fgi, "only INP clears FGI");
    }

    #[test]
    fn test_sko_follows_fgo() {
        let mut cpu = Cpu::new();
        load(&mut cpu, 0x000, &[0xF100]); // SKO, FGO raised at reset
        step_instruction(&mut cpu);
        assert_eq!(cpu.regs.pc, 0x002);

        let mut cpu = Cpu::new();
        load(&mut cpu, 0x000, &[0xF100]);
        cpu.regs.fgo = false;
        step_instruction(&mut cpu);
        assert_eq!(cpu.regs.pc, 0x001);
    }

    #[test]
    fn test_interrupt_round_trip() {
        // ISR at 001: INP / OUT / LDA 000 / BUN 000 I.
        // Main at 100: CLA / ION / LOOP: BUN LOOP.
        let outputs = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&outputs);

        let mut cpu = Cpu::new();
        cpu.on_output(move |ch| sink.borrow_mut().push(ch));
        for (addr, word) in [
            (0x001u16, 0xF800u16), // INP
            (0x002, 0xF400),       // OUT
            (0x003, 0x2000),       // LDA 000
            (0x004, 0xC000),       // BUN 000 I
            (0x100, 0x7800),       // CLA
            (0x101, 0xF080),       // ION
            (0x102, 0x4102),       // LOOP: BUN LOOP
        ] {
            cpu.mem.write(addr, word);
        }
        cpu.set_pc(0x100);

        // CLA then ION. FGO is raised at reset, so R latches as soon as
        // ION completes.
        step_instruction(&mut cpu);
        step_instruction(&mut cpu);
        assert!(cpu.regs.r, "R = IEN AND (FGI OR FGO)");
        assert_eq!(cpu.regs.pc, 0x102);

        // Next T0 takes the interrupt cycle instead of a fetch.
        let report = cpu.step();
        assert_eq!(report.phase, Some(Phase::Interrupt));
        assert_eq!(cpu.mem.read(0x000), 0x0102, "return PC saved in M[0]");
        assert_eq!(cpu.regs.pc, 0x001);
        assert!(!cpu.regs.ien);
        assert!(!cpu.regs.r);

        // ISR INP blocks until the host supplies a character.
        cpu.run(100);
        assert!(cpu.is_waiting_for_input());
        cpu.set_input(0x41);

        // INP, OUT, LDA 000, BUN 000 I, then back in the loop.
        cpu.run(4 * 7);
        assert_eq!(*outputs.borrow(), vec![0x41]);
        assert_eq!(cpu.regs.ac, 0x0102, "LDA 000 loaded the saved PC");
        assert!(
            (0x102..=0x103).contains(&cpu.regs.pc),
            "resumed in the loop, PC={:03X}",
            cpu.regs.pc
        );
        assert!(!cpu.regs.ien, "re-enabling interrupts needs an explicit ION");
    }

    #[test]
    fn test_no_interrupt_without_ien() {
        let mut cpu = Cpu::new();
        load(&mut cpu, 0x100, &[0x7800, 0x7001]); // CLA, HLT
        cpu.set_input(0x41); // FGI = 1 but IEN = 0

        step_instruction(&mut cpu);
        assert!(!cpu.regs.r);
        cpu.run(100);
        assert!(cpu.is_halted());
        assert_eq!(cpu.mem.read(0x000), 0, "no interrupt vectoring happened");
    }

    #[test]
    fn test_invalid_sequence_counter_recovers() {
        let mut cpu = Cpu::new();
        cpu.regs.sc = 7;
        let report = cpu.step();
        assert_eq!(report.phase, None);
        assert!(report.message.contains("invalid sequence counter"));
        assert_eq!(cpu.regs.sc, 0);
    }

    #[test]
    fn test_reset_idempotent() {
        let mut cpu = Cpu::new();
        load(&mut cpu, 0x100, &[0x7800]);
        cpu.run(10);

        cpu.reset();
        let once = (cpu.regs.clone(), cpu.mem.enumerate_nonzero());
        cpu.reset();
        assert_eq!((cpu.regs.clone(), cpu.mem.enumerate_nonzero()), once);
    }

    #[test]
    fn test_assemble_load_run() {
        // The full chain: source text through the assembler, into
        // memory, run to halt.
        let source = "\
ORG 100
LDA A
ADD B
STA C
HLT
A, DEC 5
B, DEC 3
C, DEC 0
END
";
        let assembly = crate::asm::assemble(source);
        assert!(assembly.success, "{:?}", assembly.errors);

        let mut cpu = Cpu::new();
        cpu.mem.load_program(&assembly.machine_code);
        cpu.set_pc(assembly.start_address);
        cpu.run(1000);

        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.ac, 0x0008);

        // Memory is the assembled image plus the program's one store.
        let mut expected = assembly.machine_code.clone();
        expected.insert(0x106, 0x0008);
        let image: std::collections::BTreeMap<u16, u16> =
            cpu.mem.enumerate_nonzero().into_iter().collect();
        let nonzero_expected: std::collections::BTreeMap<u16, u16> = expected
            .into_iter()
            .filter(|&(_, word)| word != 0)
            .collect();
        assert_eq!(image, nonzero_expected);
    }

    #[test]
    fn test_pc_wraps_within_12_bits() {
        let mut cpu = Cpu::new();
        load(&mut cpu, 0xFFF, &[0x7800]); // CLA at the top of memory
        step_instruction(&mut cpu);
        assert_eq!(cpu.regs.pc, 0x000, "PC wrapped");
    }
}
