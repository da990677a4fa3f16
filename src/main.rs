// lox - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::process;

use lox_vm::{Vm, VmConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Bad command line.
const EXIT_USAGE: i32 = 64;
/// Script file could not be read.
const EXIT_IO: i32 = 74;

fn main() {
    init_logging();
    let args: Vec<String> = env::args().collect();

    // Handle --version flag
    if args.len() == 2 && (args[1] == "--version" || args[1] == "-v") {
        println!("Lox v{}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let config = config_from_env();
    debug!(?config, "starting");
    let mut vm = Vm::with_config(config);

    match args.len() {
        1 => run_repl(&mut vm),
        2 => run_file(&args[1], &mut vm),
        _ => {
            eprintln!("Usage: lox [script]");
            process::exit(EXIT_USAGE);
        }
    }
}

/// Log to stderr, filtered by `RUST_LOG` (warnings only by default).
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// `LOX_STRESS_GC` and `LOX_TRACE` switch on the matching debug options.
fn config_from_env() -> VmConfig {
    let enabled = |name: &str| env::var(name).is_ok_and(|v| !v.is_empty() && v != "0");
    VmConfig {
        stress_gc: enabled("LOX_STRESS_GC"),
        trace_execution: enabled("LOX_TRACE"),
        ..VmConfig::default()
    }
}

/// Run a script file, exiting with a non-zero status on failure.
fn run_file(path: &str, vm: &mut Vm) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Could not read file '{}': {}", path, e);
            process::exit(EXIT_IO);
        }
    };

    if let Err(e) = vm.interpret(&source) {
        eprintln!("{}", e.report());
        process::exit(e.exit_code());
    }
}

/// Run the interactive REPL. Each line is compiled and run on its own;
/// globals carry over between lines.
fn run_repl(vm: &mut Vm) {
    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {
                if line.trim().is_empty() {
                    continue;
                }
                if let Err(e) = vm.interpret(&line) {
                    eprintln!("{}", e.report());
                }
            }
            Err(e) => {
                eprintln!("Read error: {}", e);
                break;
            }
        }
    }
}
