//! Tabula - spreadsheet formula engine on the command line

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use directories::ProjectDirs;
use tabula_core::{Document, EngineConfig};
use tabula_engine::engine::format_value;

fn print_usage() {
    eprintln!("Usage: tabula [OPTIONS] [FILE]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  [FILE]                    Sheet file to load and recalculate");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --command <FORMULA>   Evaluate a formula and print the result");
    eprintln!("  --cell <ADDR>             Print only this cell of FILE");
    eprintln!("  --config <FILE>           Engine config (default: config.toml in the config dir)");
    eprintln!("  -v, --verbose             Log recalculation details");
    eprintln!("  -h, --help                Print help");
}

struct Options {
    file_path: Option<PathBuf>,
    command: Option<String>,
    cell: Option<String>,
    config: Option<PathBuf>,
    verbose: bool,
}

fn parse_args(args: &[String]) -> anyhow::Result<Option<Options>> {
    let mut options = Options {
        file_path: None,
        command: None,
        cell: None,
        config: None,
        verbose: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => return Ok(None),
            "-v" | "--verbose" => options.verbose = true,
            "-c" | "--command" => {
                i += 1;
                let Some(formula) = args.get(i) else {
                    bail!("--command requires a formula");
                };
                options.command = Some(formula.clone());
            }
            "--cell" => {
                i += 1;
                let Some(addr) = args.get(i) else {
                    bail!("--cell requires a cell address");
                };
                options.cell = Some(addr.clone());
            }
            "--config" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    bail!("--config requires a file path");
                };
                options.config = Some(PathBuf::from(path));
            }
            arg if arg.starts_with('-') => bail!("Unknown option: {}", arg),
            arg => {
                if options.file_path.is_some() {
                    bail!("Unexpected argument: {}", arg);
                }
                options.file_path = Some(PathBuf::from(arg));
            }
        }
        i += 1;
    }
    Ok(Some(options))
}

/// An explicit config must exist; the default one is optional.
fn load_config(explicit: Option<&Path>) -> anyhow::Result<EngineConfig> {
    if let Some(path) = explicit {
        return EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()));
    }
    let Some(proj) = ProjectDirs::from("", "", "tabula") else {
        return Ok(EngineConfig::default());
    };
    let path = proj.config_dir().join("config.toml");
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(EngineConfig::default());
    }
    EngineConfig::load(&path).with_context(|| format!("loading config {}", path.display()))
}

/// Returns whether the printed result was an error value.
fn run(options: Options) -> anyhow::Result<bool> {
    let config = load_config(options.config.as_deref())?;
    let mut doc = Document::with_config(config);

    if let Some(path) = &options.file_path {
        doc.load_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
    }

    if let Some(formula) = &options.command {
        let value = doc.evaluate_formula(formula.trim(), None)?;
        println!("{}", format_value(&value));
        return Ok(value.is_error());
    }

    if let Some(addr) = &options.cell {
        let value = doc.get_computed_value(addr)?;
        println!("{}", format_value(&value));
        return Ok(value.is_error());
    }

    if options.file_path.is_none() {
        bail!("Nothing to do: give a FILE or --command");
    }
    for (id, value) in doc.cells_in_order() {
        println!("{}: {}", doc.address_of(id), format_value(&value));
    }
    Ok(false)
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => {
            print_usage();
            return;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(1);
        }
    };

    let default_filter = if options.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match run(options) {
        Ok(false) => {}
        Ok(true) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
