//! Command-line driver for the micro VM.
//!
//! # Usage
//! ```text
//! micro <command> [ARGS]
//! ```
//!
//! # Commands
//! - `interpret <file>`: Run a compiled program (`.mc`)
//! - `compile <input> [output]`: Assemble source into a compiled program
//! - `run <input>`: Assemble source and run it directly
//! - `help`: Print usage
//!
//! `interpret` and `run` exit with the program's halt status, or 1 if
//! assembly, loading or execution fails.

use micro::utils::log;
use micro::virtual_machine::assembler::assemble_file;
use micro::virtual_machine::config::VmConfig;
use micro::virtual_machine::errors::VMError;
use micro::virtual_machine::program::Program;
use micro::virtual_machine::vm::VM;
use micro::{error, info, warn};
use std::env;
use std::path::{Path, PathBuf};
use std::process;

/// Extension given to compiled programs when no output path is passed.
const COMPILED_EXTENSION: &str = "mc";

/// A parsed command line.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Help,
    Interpret(PathBuf),
    Compile { input: PathBuf, output: PathBuf },
    Run(PathBuf),
}

/// Parses everything after the program name. Command names are case-insensitive.
fn parse_command(args: &[String]) -> Result<Command, String> {
    let Some((command, rest)) = args.split_first() else {
        return Err("Missing command".to_string());
    };

    let command = command.to_lowercase();
    match (command.as_str(), rest) {
        ("help" | "--help" | "-h", _) => Ok(Command::Help),
        ("interpret", [file]) => Ok(Command::Interpret(PathBuf::from(file))),
        ("compile", [input]) => Ok(Command::Compile {
            input: PathBuf::from(input),
            output: default_output(input),
        }),
        ("compile", [input, output]) => Ok(Command::Compile {
            input: PathBuf::from(input),
            output: PathBuf::from(output),
        }),
        ("run", [input]) => Ok(Command::Run(PathBuf::from(input))),
        (other, _) => Err(format!("Unexpected arguments for `{other}`")),
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("micro");

    if let Err(e) = log::init_from_env() {
        eprintln!("{e}");
        process::exit(1);
    }

    let command = match parse_command(args.get(1..).unwrap_or_default()) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}\n");
            print_usage(program);
            process::exit(1);
        }
    };

    let result = match command {
        Command::Help => {
            print_usage(program);
            process::exit(0);
        }
        Command::Interpret(file) => interpret(&file),
        Command::Compile { input, output } => compile(&input, &output).map(|_| 0),
        Command::Run(input) => run(&input),
    };

    match result {
        Ok(status) => process::exit(status),
        Err(e) => {
            // Assembly failures were already reported with a source excerpt.
            if !matches!(e, VMError::AssemblyError { .. }) {
                error!("{e}");
            }
            process::exit(1);
        }
    }
}

/// `<input>` with its extension replaced by `.mc`, or with `.mc` appended
/// when the input already carries that extension.
fn default_output(input: &str) -> PathBuf {
    let path = Path::new(input);
    if path.extension().is_some_and(|ext| ext == COMPILED_EXTENSION) {
        warn!("{input} already ends in .{COMPILED_EXTENSION}, writing to {input}.{COMPILED_EXTENSION}");
        let mut appended = path.as_os_str().to_owned();
        appended.push(".");
        appended.push(COMPILED_EXTENSION);
        return PathBuf::from(appended);
    }
    path.with_extension(COMPILED_EXTENSION)
}

fn execute(code: &[u8]) -> Result<i32, VMError> {
    let config = VmConfig::from_env()?;
    VM::new(&config, code)?.run()
}

fn interpret(file: &Path) -> Result<i32, VMError> {
    let program = Program::read_from(file)?;
    execute(&program.code)
}

fn compile(input: &Path, output: &Path) -> Result<(), VMError> {
    let program = Program::new(assemble_file(input)?);
    program.write_to(output)?;
    info!(
        "Compiled {} -> {} ({} bytes of bytecode)",
        input.display(),
        output.display(),
        program.code.len()
    );
    Ok(())
}

fn run(input: &Path) -> Result<i32, VMError> {
    let code = assemble_file(input)?;
    execute(&code)
}

const USAGE: &str = "\
Micro register VM

USAGE:
    {program} <command> [ARGS]

COMMANDS:
    interpret <file>            Run a compiled program
    compile <input> [output]    Assemble source into a compiled program
                                (output defaults to <input> with a .mc extension)
    run <input>                 Assemble source and run it directly
    help                        Print this help message

ENVIRONMENT:
    MICRO_LOG                   Log level: debug, info, warn or error (default info)
    MICRO_LOG_TIMESTAMPS        Set to 0, false or off to drop log timestamps
    MICRO_MEMORY                Linear memory size in bytes (default 2097152)
    MICRO_REGISTERS             Register count, 1-256 (default 256)
    MICRO_BYTECODE_CAPACITY     Bytecode buffer size (default: program length)

EXAMPLES:
    {program} compile hello.masm
    {program} interpret hello.mc
    {program} run hello.masm
";

/// Prints usage information to stderr.
fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn commands_ignore_case() {
        assert_eq!(
            parse_command(&args(&["RUN", "a.masm"])),
            Ok(Command::Run(PathBuf::from("a.masm")))
        );
        assert_eq!(
            parse_command(&args(&["Interpret", "a.mc"])),
            Ok(Command::Interpret(PathBuf::from("a.mc")))
        );
        assert_eq!(parse_command(&args(&["HELP"])), Ok(Command::Help));
    }

    #[test]
    fn compile_arguments() {
        assert_eq!(
            parse_command(&args(&["compile", "a.masm"])),
            Ok(Command::Compile {
                input: PathBuf::from("a.masm"),
                output: PathBuf::from("a.mc"),
            })
        );
        assert_eq!(
            parse_command(&args(&["compile", "a.masm", "out.bin"])),
            Ok(Command::Compile {
                input: PathBuf::from("a.masm"),
                output: PathBuf::from("out.bin"),
            })
        );
    }

    #[test]
    fn rejects_missing_or_extra_arguments() {
        assert!(parse_command(&[]).is_err());
        assert!(parse_command(&args(&["run"])).is_err());
        assert!(parse_command(&args(&["interpret", "a", "b"])).is_err());
        assert!(parse_command(&args(&["assemble", "a"])).is_err());
    }

    #[test]
    fn default_output_replaces_extension() {
        assert_eq!(default_output("hello.masm"), PathBuf::from("hello.mc"));
        assert_eq!(default_output("dir/prog"), PathBuf::from("dir/prog.mc"));
    }

    #[test]
    fn default_output_never_overwrites_input() {
        assert_eq!(default_output("prog.mc"), PathBuf::from("prog.mc.mc"));
        assert_ne!(default_output("dir/prog.mc"), PathBuf::from("dir/prog.mc"));
    }
}
