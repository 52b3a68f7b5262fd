use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use color_eyre::eyre::{bail, eyre, Result, WrapErr};
use log::LevelFilter;
use simple_logger::SimpleLogger;

use ls8::loader;
use ls8::vm::{State, Vm};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum LogLevel {
  Off,
  Error,
  Warn,
  Info,
  Debug,
  Trace,
}

impl From<LogLevel> for LevelFilter {
  fn from(level: LogLevel) -> Self {
    match level {
      LogLevel::Off => LevelFilter::Off,
      LogLevel::Error => LevelFilter::Error,
      LogLevel::Warn => LevelFilter::Warn,
      LogLevel::Info => LevelFilter::Info,
      LogLevel::Debug => LevelFilter::Debug,
      LogLevel::Trace => LevelFilter::Trace,
    }
  }
}

/// LS-8 emulator
#[derive(Parser, Debug)]
#[command(name = "ls8", about = "Run an LS-8 program listing", long_about = None)]
struct Args {
  /// Path to the program listing
  program: PathBuf,

  /// Print a hex dump of the machine to stderr before every instruction
  #[arg(long, default_value_t = false)]
  trace: bool,

  /// Fail if the program has not halted after this many instructions
  #[arg(long, value_name = "N")]
  max_steps: Option<u64>,

  #[arg(long, value_enum, default_value_t = LogLevel::Info)]
  log_level: LogLevel,
}

fn main() -> Result<()> {
  color_eyre::install()?;
  let args = Args::parse();
  SimpleLogger::new()
    .with_level(args.log_level.into())
    .init()
    .map_err(|err| eyre!("could not install logger: {err}"))?;

  let program = loader::load_file(&args.program)
    .wrap_err_with(|| format!("failed to load {}", args.program.display()))?;
  let mut vm = Vm::with_program(&program)?;

  let stdout = io::stdout();
  let mut out = stdout.lock();
  let result = execute(&mut vm, &mut out, &args);
  out.flush()?;
  result
}

fn execute<W>(vm: &mut Vm, out: &mut W, args: &Args) -> Result<()>
where
  W: Write,
{
  let mut steps: u64 = 0;
  while vm.state() == State::Running {
    if args.max_steps.is_some_and(|max| steps >= max) {
      bail!("program did not halt within {steps} instructions");
    }
    if args.trace {
      eprintln!("{}", vm.trace());
    }
    vm.step(out)
      .wrap_err_with(|| format!("machine faulted after {steps} instructions"))?;
    steps += 1;
  }
  Ok(())
}
