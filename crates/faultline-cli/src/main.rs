//! faultline CLI: run fault scripts with the error registrar installed.
//!
//! Usage: faultline run [-d key=value]... [--mask EXPR] <script>
//!        faultline mask <EXPR>
//!
//! `run` prints the request output, with one `Dispatched ...` line per value
//! the registrar delivered, and exits with the request's exit code.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use faultline::{parse_mask, parse_script, run_with_registrar, ErrorLevel, IniSystem, Transcript};

#[derive(Parser, Debug)]
#[command(name = "faultline", about = "Route runtime faults to a single handler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a fault script
    Run {
        /// Script to execute
        script: PathBuf,

        /// Reporting mask for the registrar (default: the configured error_reporting)
        #[arg(long)]
        mask: Option<String>,

        /// Define INI entry (key=value)
        #[arg(short = 'd', value_name = "KEY=VALUE", value_parser = parse_define)]
        define: Vec<(String, String)>,

        /// php.ini file to load before the -d overrides
        #[arg(short = 'c', long = "ini")]
        ini_path: Option<PathBuf>,
    },

    /// Evaluate an error_reporting expression
    Mask {
        /// e.g. "E_ALL & ~E_NOTICE"
        #[arg(allow_hyphen_values = true)]
        expr: String,
    },
}

/// Parse a `-d key=value` flag. A bare key means `key=1`.
fn parse_define(arg: &str) -> Result<(String, String)> {
    let (key, value) = match arg.split_once('=') {
        Some((key, value)) => (key.trim(), value.trim()),
        None => (arg.trim(), "1"),
    };
    if key.is_empty() {
        return Err(anyhow!("missing directive name in '{}'", arg));
    }
    Ok((key.to_string(), value.to_string()))
}

fn load_config(ini_path: Option<&Path>, defines: &[(String, String)]) -> Result<IniSystem> {
    let mut ini = IniSystem::new();
    if let Some(path) = ini_path {
        let text = fs::read_to_string(path)
            .with_context(|| format!("could not read ini file {}", path.display()))?;
        ini.parse_ini_string(&text);
    }
    for (key, value) in defines {
        ini.define(key, value.as_str());
    }
    Ok(ini)
}

fn run_file(
    script_path: &Path,
    mask: Option<&str>,
    ini_path: Option<&Path>,
    defines: &[(String, String)],
) -> Result<Transcript> {
    let source = fs::read_to_string(script_path)
        .with_context(|| format!("could not open input file {}", script_path.display()))?;
    let script = parse_script(&source)
        .with_context(|| format!("could not parse {}", script_path.display()))?;

    let ini = load_config(ini_path, defines)?;
    let mask_expr = mask.map(str::to_string).unwrap_or_else(|| ini.get("error_reporting").to_string());
    let mask = parse_mask(&mask_expr).with_context(|| format!("invalid mask '{}'", mask_expr))?;

    tracing::debug!(script = %script_path.display(), mask, "running script");
    Ok(run_with_registrar(&script, mask, ini))
}

fn describe_mask(expr: &str) -> Result<String> {
    let mask = parse_mask(expr).with_context(|| format!("invalid mask '{}'", expr))?;
    Ok(format!("{} {}", mask, ErrorLevel::names_in(mask).join(" | ")))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let code = match execute(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("faultline: {:#}", e);
            1
        }
    };
    process::exit(code);
}

fn execute(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run {
            script,
            mask,
            define,
            ini_path,
        } => {
            let transcript = run_file(&script, mask.as_deref(), ini_path.as_deref(), &define)?;
            print!("{}", transcript.output);
            Ok(transcript.status.code)
        }
        Command::Mask { expr } => {
            println!("{}", describe_mask(&expr)?);
            Ok(0)
        }
    }
}
