//! Purpose: `uniwire` CLI entry point.
//! Role: Binary crate root; inspects interface descriptions and verifies component libraries.
//! Invariants: Command output is JSON on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::error::{ContextKind, ContextValue, ErrorKind as ClapErrorKind};
use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::aot::Shell;
use serde::Serialize;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use uniwire::api::{
    Component, ComponentDef, DylibSource, Error, ErrorKind, RuntimeConfig, to_exit_code,
};

#[derive(Parser)]
#[command(
    name = "uniwire",
    version,
    about = "Inspect and verify uniwire components",
    long_about = None,
    after_help = r#"EXAMPLES
  $ uniwire checksums component.json
  $ uniwire verify component.json --lib target/release/libdemo.so
  $ UNIWIRE_LIBRARY_OVERRIDE_DEMO=./libdemo.so uniwire verify component.json"#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "List entry points and API checksums for an interface description")]
    Checksums {
        #[arg(help = "Interface description (JSON)", value_hint = ValueHint::FilePath)]
        def: PathBuf,
        #[arg(long, help = "Pretty-print the JSON output")]
        pretty: bool,
    },
    #[command(about = "Load a component library and check its contract")]
    Verify {
        #[arg(help = "Interface description (JSON)", value_hint = ValueHint::FilePath)]
        def: PathBuf,
        #[arg(
            long,
            help = "Library path (default: env override, then platform library name)",
            value_hint = ValueHint::FilePath
        )]
        lib: Option<PathBuf>,
    },
    #[command(about = "Print shell completions")]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<i32, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(code);
            }
            _ => return Err(usage_error(&err)),
        },
    };

    match cli.command {
        Command::Checksums { def, pretty } => {
            let def = ComponentDef::load(&def)?;
            let contract = def.contract();
            let value = json!({
                "namespace": &def.namespace,
                "contract_version": contract.contract_version,
                "entry_points": def.entry_points(),
            });
            emit_json(&value, pretty)?;
            Ok(0)
        }
        Command::Verify { def, lib } => {
            let def = ComponentDef::load(&def)?;
            let contract = def.contract();
            let config = RuntimeConfig::from_env(&def.namespace)?;
            let component = match lib {
                Some(path) => Component::load(DylibSource::load(&path)?, &contract, &config)?,
                None => Component::open(&contract, &config)?,
            };
            let value = json!({
                "ok": true,
                "namespace": component.namespace(),
                "contract_version": contract.contract_version,
                "checksums": contract.checksums.len(),
            });
            emit_json(&value, false)?;
            Ok(0)
        }
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "uniwire", &mut io::stdout());
            Ok(0)
        }
    }
}

fn emit_json(value: &Value, pretty: bool) -> Result<(), Error> {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("json encode failed")
            .with_source(err)
    })?;
    println!("{text}");
    Ok(())
}

/// Error shape on stderr when it is not a terminal: `{"error": {...}}`.
#[derive(Serialize)]
struct ErrorReport<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    kind: String,
    exit_code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    symbol: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<i8>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    causes: Vec<String>,
}

impl<'a> ErrorReport<'a> {
    fn new(err: &'a Error) -> Self {
        let causes = std::iter::successors(err.source(), |&cause| cause.source())
            .map(ToString::to_string)
            .collect();
        Self {
            error: ErrorBody {
                kind: format!("{:?}", err.kind()),
                exit_code: to_exit_code(err.kind()),
                message: err.message().unwrap_or(kind_label(err.kind())).to_string(),
                hint: err.hint(),
                symbol: err.symbol(),
                status_code: err.code(),
                causes,
            },
        }
    }
}

/// Short phrase for a failure class, used when an error carries no message.
fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Internal => "internal error",
        ErrorKind::Usage => "invalid usage",
        ErrorKind::Protocol => "boundary protocol violation",
        ErrorKind::Panic => "component panicked",
        ErrorKind::Checksum => "component contract mismatch",
        ErrorKind::Load => "component library failed to load",
        ErrorKind::Cancelled => "call cancelled",
        ErrorKind::Callback => "callback failed",
        ErrorKind::Io => "i/o error",
    }
}

fn emit_error(err: &Error) {
    if !io::stderr().is_terminal() {
        match serde_json::to_string(&ErrorReport::new(err)) {
            Ok(line) => eprintln!("{line}"),
            Err(_) => eprintln!("{{\"error\":{{\"kind\":\"Internal\",\"exit_code\":1}}}}"),
        }
        return;
    }
    match err.message() {
        Some(message) => eprintln!("uniwire: {}: {message}", kind_label(err.kind())),
        None => eprintln!("uniwire: {}", kind_label(err.kind())),
    }
    if let Some(symbol) = err.symbol() {
        eprintln!("  symbol: {symbol}");
    }
    if let Some(cause) = err.source() {
        eprintln!("  caused by: {cause}");
    }
    if let Some(hint) = err.hint() {
        eprintln!("  hint: {hint}");
    }
}

/// Maps a rejected command line onto a `Usage` error naming the offending argument.
fn usage_error(err: &clap::Error) -> Error {
    let problem = match err.kind() {
        ClapErrorKind::MissingRequiredArgument => "missing required argument",
        ClapErrorKind::MissingSubcommand => "missing command",
        ClapErrorKind::InvalidSubcommand => "unknown command",
        ClapErrorKind::UnknownArgument => "unknown argument",
        ClapErrorKind::InvalidValue | ClapErrorKind::ValueValidation => "invalid value for",
        ClapErrorKind::ArgumentConflict => "conflicting argument",
        ClapErrorKind::TooManyValues | ClapErrorKind::WrongNumberOfValues => {
            "wrong number of values for"
        }
        _ => "invalid arguments",
    };
    let context = err
        .get(ContextKind::InvalidArg)
        .or_else(|| err.get(ContextKind::InvalidSubcommand));
    let subject = match context {
        Some(ContextValue::String(arg)) => Some(arg.clone()),
        Some(ContextValue::Strings(args)) => Some(args.join(", ")),
        _ => None,
    };
    let message = match subject {
        Some(subject) => format!("{problem} {subject}"),
        None => problem.to_string(),
    };
    let hint = match err.get(ContextKind::SuggestedSubcommand) {
        Some(ContextValue::String(suggestion)) => format!("Did you mean `uniwire {suggestion}`?"),
        Some(ContextValue::Strings(suggestions)) if !suggestions.is_empty() => {
            format!("Did you mean `uniwire {}`?", suggestions[0])
        }
        _ => "Try `uniwire --help`.".to_string(),
    };
    Error::new(ErrorKind::Usage).with_message(message).with_hint(hint)
}
