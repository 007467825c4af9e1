//! vibemq-delivery - selector and delivery tooling
//!
//! Usage:
//!   vibemq-delivery [OPTIONS] <COMMAND>
//!
//! Commands:
//!   compile   Compile a selector and print its canonical form
//!   eval      Evaluate a selector against a message
//!
//! Options:
//!   -c, --config <FILE>    Configuration file path
//!   -l, --log-level        Log level (error, warn, info, debug, trace)
//!   -h, --help             Print help

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use vibemq_delivery::config::Config;
use vibemq_delivery::message::Message;
use vibemq_delivery::selector::{CompiledSelector, SelectorCompiler, Value};

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    #[default]
    Warn,
    /// Informational messages
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// Selector compiler and evaluator for the VibeMQ delivery core
#[derive(Parser, Debug)]
#[command(name = "vibemq-delivery")]
#[command(author = "VibeMQ Contributors")]
#[command(version)]
#[command(about = "Compile and evaluate VibeMQ message selectors")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a selector and print its canonical form
    Compile {
        /// Selector text
        #[arg(short, long)]
        selector: String,
    },
    /// Evaluate a selector against a message built from the arguments
    Eval {
        /// Selector text
        #[arg(short, long)]
        selector: String,

        /// JSON payload; its fields are visible to the selector
        #[arg(long, conflicts_with = "json_file")]
        json: Option<String>,

        /// File holding a JSON payload
        #[arg(long)]
        json_file: Option<PathBuf>,

        /// Message field as KEY=VALUE (repeatable)
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, Value)>,
    },
}

/// `KEY=VALUE`, with the value typed as integer, float, boolean or text
fn parse_field(arg: &str) -> Result<(String, Value), String> {
    let (key, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", arg))?;
    if key.is_empty() {
        return Err(format!("empty field name in '{}'", arg));
    }
    let value = if let Ok(i) = raw.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Float(f)
    } else if raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("false") {
        Value::Bool(raw.eq_ignore_ascii_case("true"))
    } else {
        Value::from(raw)
    };
    Ok((key.to_string(), value))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration file if specified, otherwise use defaults
    let file_config = if let Some(config_path) = &args.config {
        match Config::load(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Error loading config file: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    // Setup logging - CLI overrides config, config overrides default (warn)
    let log_level = args.log_level.unwrap_or_else(|| {
        match file_config.log.level.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Warn,
        }
    });

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    let compiler = match SelectorCompiler::new(&file_config.selector) {
        Ok(compiler) => compiler,
        Err(e) => {
            eprintln!("Invalid selector configuration: {}", e);
            std::process::exit(1);
        }
    };

    match args.command {
        Command::Compile { selector } => {
            let compiled = compile_or_exit(&compiler, &selector);
            println!("{}", compiled);
            if let Some(constant) = compiled.constant() {
                println!("constant: {}", constant);
            }
        }
        Command::Eval {
            selector,
            json,
            json_file,
            fields,
        } => {
            let compiled = compile_or_exit(&compiler, &selector);

            let payload = match (json, json_file) {
                (Some(inline), _) => Some(inline.into_bytes()),
                (None, Some(path)) => Some(std::fs::read(&path)?),
                (None, None) => None,
            };

            let mut builder = Message::builder(1);
            for (key, value) in fields {
                builder = builder.data(key, value);
            }
            if let Some(payload) = payload {
                builder = builder.json_payload(payload);
            }
            let message = builder.build();

            let value = compiled.evaluate_value(&message);
            debug!(selector = %compiled, result = %value, "evaluated");
            let matched = matches!(value, Value::Bool(true));
            println!("{}", if matched { "match" } else { "no match" });
            if !matched {
                std::process::exit(2);
            }
        }
    }

    Ok(())
}

fn compile_or_exit(compiler: &SelectorCompiler, selector: &str) -> CompiledSelector {
    match compiler.compile(selector) {
        Ok(compiled) => compiled,
        Err(e) => {
            eprintln!("{}", e);
            if let Some(position) = e.position() {
                eprintln!("  {}", selector);
                let column = selector.get(..position).unwrap_or(selector).chars().count();
                eprintln!("  {}^", " ".repeat(column));
            }
            std::process::exit(1);
        }
    }
}
