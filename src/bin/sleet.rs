use std::{fs, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use sleet::{compile, VirtualMachine};

#[derive(Parser)]
#[command(name = "sleet")]
#[command(about = "The Sleet programming language")]
struct Cli {
    /// Script to run
    file: String,

    /// Print the compiled bytecode before running it
    #[arg(short, long)]
    disassemble: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let source = fs::read_to_string(&cli.file)
        .with_context(|| format!("Failed to read file: {}", cli.file))?;

    let bytecode = match compile(&source, &cli.file) {
        Ok(bytecode) => bytecode,
        Err(error) => {
            eprintln!("{}", error);
            return Ok(ExitCode::FAILURE);
        }
    };

    if cli.disassemble {
        println!("{}", bytecode.disassemble());
    }

    let mut vm = VirtualMachine::new(&cli.file, bytecode);
    if let Err(error) = vm.run() {
        eprintln!("{}", error);
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}
