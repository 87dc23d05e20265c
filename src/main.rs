//! Basic Computer Emulator - CLI Entry Point
//!
//! Commands:
//! - `mano-emu run <program>` - Run an ASM or object file to halt
//! - `mano-emu asm <source>` - Assemble to an object file
//! - `mano-emu disasm <object>` - Disassemble an object file
//! - `mano-emu debug <program>` - Interactive front panel (feature "tui")

use clap::{Parser, Subcommand};
use mano::asm::{assemble, disassemble, load_object, save_object, ObjectFile};
use mano::cpu::CpuState;
use mano::Cpu;
use std::io::Write;

#[derive(Parser)]
#[command(name = "mano-emu")]
#[command(version = "0.1.0")]
#[command(about = "An emulator and assembler for Mano's basic computer")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the ASM or object file to execute
        program: String,
        /// Maximum number of micro-operations to run
        #[arg(short, long, default_value = "100000")]
        max_steps: u64,
        /// Show each micro-operation
        #[arg(short, long)]
        trace: bool,
    },
    /// Assemble source to an object file
    Asm {
        /// Path to the source file
        source: String,
        /// Output object file
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Disassemble an object file to readable text
    Disasm {
        /// Path to the object file
        object: String,
    },
    /// Interactive front panel
    #[cfg(feature = "tui")]
    Debug {
        /// Path to the ASM or object file to load
        program: String,
    },
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { program, max_steps, trace }) => {
            run_program(&program, max_steps, trace);
        }
        Some(Commands::Asm { source, output }) => {
            assemble_file(&source, output);
        }
        Some(Commands::Disasm { object }) => {
            disassemble_file(&object);
        }
        #[cfg(feature = "tui")]
        Some(Commands::Debug { program }) => {
            debug_program(&program);
        }
        None => {
            println!("Basic Computer Emulator v0.1.0");
            println!("A micro-operation-accurate emulator of Mano's basic computer");
            println!();
            println!("Use --help for available commands");
        }
    }
}

/// Load a program from either assembly source or an object file.
fn load_program(path: &str) -> ObjectFile {
    if path.ends_with(".asm") {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("❌ Failed to read file: {}", e);
                std::process::exit(1);
            }
        };

        let assembly = assemble(&source);
        if !assembly.success {
            eprintln!("❌ Assembly failed:");
            for error in &assembly.errors {
                eprintln!("   {}", error);
            }
            std::process::exit(1);
        }
        println!("📝 Assembled {} words", assembly.machine_code.len());
        ObjectFile::from_assembly(&assembly)
    } else {
        match load_object(path) {
            Ok(object) => {
                println!("📂 Loaded {} words", object.len());
                object
            }
            Err(e) => {
                eprintln!("❌ Failed to load object file: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn run_program(path: &str, max_steps: u64, trace: bool) {
    println!("🔧 Running: {}", path);

    let object = load_program(path);
    if object.is_empty() {
        eprintln!("❌ No words to execute");
        std::process::exit(1);
    }

    let mut cpu = Cpu::new();
    cpu.mem.load_program(&object.words);
    cpu.set_pc(object.start);
    cpu.on_output(|ch| {
        print!("{}", ch as char);
        std::io::stdout().flush().ok();
    });

    println!();
    println!("━━━ Execution ━━━");

    while cpu.steps < max_steps {
        let report = cpu.step();
        if trace {
            if let Some(phase) = report.phase {
                println!(
                    "{:?}  PC={:03X} AC={:04X} E={}  {}",
                    phase,
                    report.registers.pc,
                    report.registers.ac,
                    u8::from(report.registers.e),
                    report.message
                );
            }
        }

        match report.state {
            CpuState::Run => {}
            CpuState::Halt => break,
            CpuState::WaitInput => {
                eprint!("input> ");
                let mut line = String::new();
                match std::io::stdin().read_line(&mut line) {
                    Ok(n) if n > 0 => {
                        let ch = line.bytes().next().unwrap_or(b'\n');
                        cpu.set_input(ch);
                    }
                    _ => {
                        eprintln!("❌ No input available, stopping");
                        break;
                    }
                }
            }
        }

        // This host accepts every output character immediately.
        if !cpu.regs.fgo {
            cpu.ack_output();
        }
    }

    println!();
    println!("━━━ Result ━━━");
    println!("Micro-ops: {}", cpu.steps);
    println!("State: {:?}", cpu.state);
    println!("AC: {:04X}  E: {}", cpu.regs.ac, u8::from(cpu.regs.e));
    println!("PC: {:03X}  SC: T{}", cpu.regs.pc, cpu.regs.sc);

    if cpu.steps >= max_steps {
        println!();
        println!("⚠️  Reached max steps limit ({}). Use --max-steps to increase.", max_steps);
    }
}

fn assemble_file(source_path: &str, output: Option<String>) {
    let out_path = output.unwrap_or_else(|| source_path.replace(".asm", ".obj"));

    println!("📝 Assembling: {} → {}", source_path, out_path);

    let source = match std::fs::read_to_string(source_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ Failed to read file: {}", e);
            std::process::exit(1);
        }
    };

    let assembly = assemble(&source);
    if !assembly.success {
        eprintln!("❌ Assembly failed:");
        for error in &assembly.errors {
            eprintln!("   {}", error);
        }
        std::process::exit(1);
    }

    println!("✓ Assembled {} words, {} labels", assembly.machine_code.len(), assembly.labels.len());

    let object = ObjectFile::from_assembly(&assembly);
    if let Err(e) = save_object(&out_path, &object) {
        eprintln!("❌ Failed to save object file: {}", e);
        std::process::exit(1);
    }

    println!("✓ Saved to {}", out_path);
}

fn disassemble_file(object_path: &str) {
    println!("📖 Disassembling: {}", object_path);
    println!();

    let object = match load_object(object_path) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("❌ Failed to load object file: {}", e);
            std::process::exit(1);
        }
    };

    println!("/ start address {:03X}", object.start);
    print!("{}", disassemble(&object.words));
}

#[cfg(feature = "tui")]
fn debug_program(path: &str) {
    println!("🔍 Loading: {}", path);

    let object = load_program(path);
    if object.is_empty() {
        eprintln!("❌ No words to execute");
        std::process::exit(1);
    }

    println!("🚀 Launching front panel...");

    if let Err(e) = mano::tui::run_front_panel(object) {
        eprintln!("❌ Front panel error: {}", e);
        std::process::exit(1);
    }
}
