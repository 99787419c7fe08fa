// Copyright 2026 the DotNyet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Command-line launcher for compiled `.NYET` programs.
//!
//! This is a std-only binary crate; the interpreter itself lives in the
//! `dotnyet` library. The launcher owns envelope verification policy,
//! logging setup, and the stdin/stdout host.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

use dotnyet::format::DecodeError;
use dotnyet::host::{Host, HostError};
use dotnyet::program::{self, Program};
use dotnyet::trace::{TraceEvent, TraceMask, TraceSink};
use dotnyet::value::Value;
use dotnyet::vm::{Limits, Vm};

#[derive(Parser, Debug)]
#[command(
    name = "dotnyet",
    version,
    about = "Run compiled .NYET programs",
    disable_version_flag = true
)]
struct Cli {
    /// Print version information.
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,

    /// Log level for diagnostic output (stderr).
    #[arg(short = 'l', long, value_enum, default_value_t = LogLevel::Info, global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a compiled .NYET program.
    Run {
        /// Path to the program file (enveloped or bare image).
        file: PathBuf,

        /// Skip envelope verification and treat the file as a bare image.
        #[arg(short = 'n', long)]
        no_verify: bool,

        /// Arguments passed to the program, space-joined onto its stack.
        #[arg(last = true)]
        args: Vec<String>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Host backed by the process's stdin and stdout.
struct StdHost {
    stdin: io::Stdin,
    stdout: io::Stdout,
}

impl StdHost {
    fn new() -> Self {
        Self {
            stdin: io::stdin(),
            stdout: io::stdout(),
        }
    }
}

impl Host for StdHost {
    fn print(&mut self, text: &str) -> Result<(), HostError> {
        let mut out = self.stdout.lock();
        out.write_all(text.as_bytes())
            .and_then(|()| out.flush())
            .map_err(|e| HostError::Io(e.to_string()))
    }

    fn read_line(&mut self) -> Result<String, HostError> {
        let mut line = String::new();
        let n = self
            .stdin
            .lock()
            .read_line(&mut line)
            .map_err(|e| HostError::Io(e.to_string()))?;
        if n == 0 {
            return Err(HostError::Io("end of input".into()));
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(line)
    }
}

/// Forwards instruction-level trace events to the logger.
struct DebugTrace;

impl TraceSink for DebugTrace {
    fn mask(&self) -> TraceMask {
        TraceMask::INSTR
    }

    fn event(&mut self, event: TraceEvent<'_>) {
        if let TraceEvent::Instr { ip, opcode } = event {
            debug!("step ip={ip} opcode={opcode:#04x}");
        }
    }
}

fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Applies the launcher's envelope policy: verified envelopes are
/// stripped; a missing envelope or unknown version logs a warning and
/// falls back to bare-image mode.
fn load_program(bytes: Vec<u8>, no_verify: bool) -> Result<Program, DecodeError> {
    if no_verify {
        return Program::from_image(bytes);
    }
    match program::strip_envelope(&bytes) {
        Ok(Some(image)) => Program::from_image(image.to_vec()),
        Ok(None) => {
            warn!("no NYET envelope present, running as a bare image");
            Program::from_image(bytes)
        }
        Err(DecodeError::UnsupportedVersion { version }) => {
            warn!(version, "unknown envelope version, running as a bare image");
            Program::from_image(bytes)
        }
        Err(DecodeError::UnexpectedEof) => {
            warn!("truncated envelope, running as a bare image");
            Program::from_image(bytes)
        }
        Err(e) => Err(e),
    }
}

fn cmd_run(file: &PathBuf, no_verify: bool, args: &[String], trace_steps: bool) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let program = load_program(bytes, no_verify)
        .map_err(|e| anyhow!("failed to load {}: {e}", file.display()))?;

    let mut vm = Vm::new(StdHost::new(), Limits::default());
    let program_args = [Value::Str(args.join(" "))];

    let mut sink = DebugTrace;
    let (mask, trace): (TraceMask, Option<&mut dyn TraceSink>) = if trace_steps {
        (sink.mask(), Some(&mut sink))
    } else {
        (TraceMask::NONE, None)
    };

    match vm.run(&program, &program_args, mask, trace) {
        Ok(()) => Ok(()),
        Err(info) => {
            let opcode = info
                .opcode
                .map_or_else(|| String::from("none"), |b| format!("{b:#04x}"));
            warn!(ip = info.ip, opcode = %opcode, "{}", info.trap);
            Err(anyhow!("{info}"))
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout with a zero exit; real
            // argument errors exit non-zero.
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_tracing(cli.log_level);

    let result = match &cli.command {
        Command::Run {
            file,
            no_verify,
            args,
        } => cmd_run(file, *no_verify, args, cli.log_level == LogLevel::Debug),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
