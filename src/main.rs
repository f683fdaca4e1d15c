use std::fs;
use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use mint::{compile, vm::ExeState};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// script
    script: Option<PathBuf>,

    /// run this source instead of a script file
    #[arg(short = 'e', long = "eval", conflicts_with = "script")]
    source: Option<String>,

    /// print the bytecode listing before running
    #[arg(long)]
    disassemble: bool,

    /// print the syntax tree before running
    #[arg(long)]
    ast: bool,

    /// print the value the program leaves behind
    #[arg(long)]
    result: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let source = match (cli.source, cli.script) {
        (Some(source), _) => source,
        (None, Some(script)) => fs::read_to_string(script)?,
        (None, None) => bail!("no script given, pass a path or `-e SOURCE`"),
    };

    let chunk = mint::parse(&source)?;
    if cli.ast {
        println!("{chunk:#?}");
    }
    let main = compile::compile(&chunk)?;
    if cli.disassemble {
        println!("{}", main.proto.disassemble());
    }

    let value = ExeState::new().execute(&main)?;
    if cli.result {
        println!("{value:?}");
    }

    Ok(())
}
