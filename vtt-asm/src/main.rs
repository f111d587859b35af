//! binary assembler tool
//!
//! Takes a file of VTT assembly and prints the instruction stream it lowers
//! to, or a listing of the assembled bytecode.

use std::{error::Error, path::PathBuf};

use clap::Parser;
use vtt_asm::{assemble, format_bytecode, transform_assembly};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The VTT assembly file.
    input: PathBuf,

    /// Name of the program, used in error messages.
    #[arg(short, long)]
    name: Option<String>,

    /// Print the components declared by a composite glyph program.
    #[arg(short, long)]
    glyph: bool,

    /// Print a listing of the assembled bytecode.
    #[arg(short, long)]
    bytecode: bool,

    /// Write the assembled bytecode to this file.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let text = std::fs::read_to_string(&args.input)
        .map_err(|e| format!("failed to read '{}': {e}", args.input.display()))?;
    let name = args
        .name
        .clone()
        .unwrap_or_else(|| args.input.display().to_string());

    let mut components = Vec::new();
    let assembly = transform_assembly(&text, &mut components)
        .map_err(|e| format!("failed to compile '{name}':\n{e}"))?;
    log::info!("'{name}': {} components", components.len());
    if args.glyph {
        for component in &components {
            println!("{component:?}");
        }
    }

    if !(args.bytecode || args.output.is_some()) {
        println!("{assembly}");
        return Ok(());
    }
    let bytecode = assemble(&assembly).map_err(|e| format!("'{name}': {e}"))?;
    if args.bytecode {
        print!("{}", format_bytecode(&bytecode).map_err(|e| e.to_string())?);
    }
    if let Some(path) = &args.output {
        std::fs::write(path, &bytecode)
            .map_err(|e| format!("failed to write '{}': {e}", path.display()))?;
    }
    Ok(())
}
