use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{bail, miette, IntoDiagnostic, Result};

use mano::output::{Condition, Output};
use mano::{tprintln, Air, Machine, Stop};

/// Mano is an assembler and clock-accurate simulator for Mano's basic computer.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.asm` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble and run a `.asm` file, then show its output and registers
    Run {
        /// `.asm` file to run
        name: PathBuf,
        #[command(flatten)]
        options: RunOptions,
    },
    /// Check a `.asm` file without running it
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Print the assembled words of a `.asm` file next to their source lines
    Listing {
        /// File to assemble
        name: PathBuf,
    },
}

#[derive(clap::Args, Default)]
struct RunOptions {
    /// Characters to queue on the input device
    #[arg(short, long)]
    input: Option<String>,
    /// Give up after this many instruction cycles [default: $MANO_MAX_STEPS or 100000]
    #[arg(long)]
    max_steps: Option<u64>,
    /// Log every clock pulse and register transfer
    #[arg(short, long)]
    trace: bool,
    /// Pause before executing the instruction at this hex address (repeatable)
    #[arg(short, long = "break", value_name = "ADDRESS", value_parser = parse_address)]
    breaks: Vec<u16>,
    /// Produce minimal output, suited for blackbox tests
    #[arg(short, long)]
    minimal: bool,
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    mano::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(mano::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    if let Some(command) = args.command {
        match command {
            Command::Run { name, options } => run(&name, options),
            Command::Check { name } => {
                file_message(Green, "Checking", &name);
                let contents = read_source(&name)?;
                let _ = assemble(&contents)?;
                message(Green, "Success", "no errors found!");
                Ok(())
            }
            Command::Listing { name } => {
                file_message(Green, "Assembling", &name);
                let contents = read_source(&name)?;
                let air = assemble(&contents)?;
                print_listing(&air, &contents);
                message(Green, "Finished", &format!("{} words", air.len()));
                Ok(())
            }
        }
    } else if let Some(path) = args.path {
        run(&path, RunOptions::default())
    } else {
        println!("\n~ mano v{VERSION} ~");
        println!("{}", LOGO.truecolor(120, 190, 255).bold());
        println!("{SHORT_INFO}");
        std::process::exit(0);
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &PathBuf) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message(color: MsgColor, left: &str, right: &str) {
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn run(name: &PathBuf, options: RunOptions) -> Result<()> {
    Output::set_minimal(options.minimal);

    file_message(MsgColor::Green, "Assembling", name);
    let contents = read_source(name)?;
    let air = assemble(&contents)?;

    let mut machine = Machine::new();
    machine.set_trace(options.trace || mano::env::is_trace_enabled());
    machine.load(&air);
    if let Some(input) = &options.input {
        machine.push_input(input);
    }
    for &address in &options.breaks {
        machine.breakpoints_mut().insert(address);
    }

    let max_steps = options.max_steps.unwrap_or_else(mano::env::max_steps);
    message(
        MsgColor::Green,
        "Running",
        &format!("from 0x{:03X}", air.entry()),
    );
    let stop = machine.run(max_steps);

    Output::Trace(Condition::Always).print_log(&machine.take_log());
    let stop = stop.into_diagnostic()?;

    if !machine.output().is_empty() {
        Output::Normal.start_new_line();
        Output::Normal.print_str(machine.output());
    }
    Output::Normal.start_new_line();
    Output::Trace(Condition::Always).print_registers(&machine);

    match stop {
        Stop::Halted => {
            tprintln!(Sometimes, "Halted after {} steps.", machine.cycles());
            file_message(MsgColor::Green, "Completed", name);
            Ok(())
        }
        Stop::Breakpoint(address) => {
            let line = air
                .span_of(address)
                .and_then(|span| contents.get(span.as_range()))
                .unwrap_or_default();
            message(
                MsgColor::Cyan,
                "Paused",
                &format!("at 0x{address:03X}  {}", line.trim()),
            );
            Ok(())
        }
        Stop::BudgetExhausted | Stop::Cancelled => Err(miette!(
            help = "raise the limit with `--max-steps` or `MANO_MAX_STEPS`",
            "Program did not halt within {max_steps} steps"
        )),
    }
}

/// Hex address with an optional `0x` prefix, as written for `ORG`.
fn parse_address(s: &str) -> Result<u16, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let address =
        u16::from_str_radix(digits, 16).map_err(|e| format!("`{s}` is not a hex address: {e}"))?;
    if address > mano::isa::ADDRESS_MASK {
        return Err(format!("0x{address:X} is outside the 4096-word memory"));
    }
    Ok(address)
}

fn read_source(name: &PathBuf) -> Result<String> {
    match name.extension().and_then(|ext| ext.to_str()) {
        Some("asm") => fs::read_to_string(name).into_diagnostic(),
        Some(_) => bail!("File has unknown extension. Exiting..."),
        None => bail!("File has no extension. Exiting..."),
    }
}

/// Return assembled program, or a diagnostic pointing into `contents`
fn assemble(contents: &str) -> Result<Air> {
    mano::assemble(contents).map_err(|err| err.report(contents))
}

fn print_listing(air: &Air, contents: &str) {
    println!("{:>12} 0x{:03X}", "Entry".cyan(), air.entry());
    for word in air {
        let line = contents.get(word.span.as_range()).unwrap_or_default();
        let decoded = word
            .disassemble()
            .map_or_else(|| "-".to_string(), |instr| instr.to_string());
        println!(
            "{:>12} {:04X}  {:<10} {}",
            format!("{:03X}", word.address).as_str().dimmed(),
            word.word,
            decoded,
            line.trim()
        );
    }
}

const LOGO: &str = r#"
  _ __ ___   __ _ _ __   ___
 | '_ ` _ \ / _` | '_ \ / _ \
 | | | | | | (_| | | | | (_) |
 |_| |_| |_|\__,_|_| |_|\___/"#;

const SHORT_INFO: &str = r"
Welcome to mano, an assembler and clock-pulse simulator for the basic computer
found in Mano's Computer System Architecture.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
