//! List the contents of an LH5 file.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::ExitCode;

use lh5::file::{FileMode, Lh5File};
use lh5::inspect::inspect;

const USAGE: &str = "usage: lh5ls <file> [<group-path>] [--attributes|-a] [--recursive-depth N|-d N]";

#[derive(Debug)]
struct Args {
    file: PathBuf,
    group: String,
    attributes: bool,
    depth: Option<usize>,
}

fn parse_args(mut args: VecDeque<String>) -> Result<Option<Args>, String> {
    let mut positional = Vec::new();
    let mut attributes = false;
    let mut depth = None;

    while let Some(arg) = args.pop_front() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "-a" | "--attributes" => attributes = true,
            "-d" | "--recursive-depth" => {
                let n = args
                    .pop_front()
                    .ok_or_else(|| format!("expected a depth following {arg}"))?;
                depth = Some(
                    n.parse::<usize>()
                        .map_err(|e| format!("invalid depth '{n}': {e}"))?,
                );
            }
            flag if flag.starts_with('-') => return Err(format!("unrecognized argument '{flag}'")),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let file = positional.next().ok_or("missing file argument")?;
    let group = positional.next().unwrap_or_default();
    if let Some(extra) = positional.next() {
        return Err(format!("unexpected argument '{extra}'"));
    }
    Ok(Some(Args {
        file: PathBuf::from(file),
        group,
        attributes,
        depth,
    }))
}

fn run(args: &Args) -> lh5::Result<()> {
    let file = Lh5File::open(&args.file, FileMode::Read)?;
    let summary = inspect(&file, &args.group, args.depth)?;
    print!("{}", summary.display(args.attributes));
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let mut args: VecDeque<String> = std::env::args().collect();
    let _ = args.pop_front();

    let args = match parse_args(args) {
        Ok(Some(args)) => args,
        Ok(None) => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("lh5ls: {e}\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };
    log::debug!("{args:?}");

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("lh5ls: {}: {e}", args.file.display());
            ExitCode::FAILURE
        }
    }
}
