// hmo - address linkage and geographic merges for property datasets

mod exit_codes;
mod link;
mod merge;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use exit_codes::{EXIT_INVALID_CONFIG, EXIT_RUNTIME, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "hmo")]
#[command(about = "Link property records across datasets and merge geographic data")]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    /// Log progress to stderr (RUST_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Match two address datasets and write the scored candidate table
    #[command(after_help = "\
Examples:
  hmo link link.toml
  hmo link link.toml --output candidates.csv
  hmo link link.toml --json > result.json")]
    Link {
        /// Path to the link config (kind = "link")
        config: PathBuf,

        /// Write the candidate table CSV to this file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Print the full result (meta, summary, warnings, table) as JSON
        #[arg(long)]
        json: bool,
    },

    /// Attach datasets onto a reference frame by key, geography or buffer
    #[command(after_help = "\
Examples:
  hmo merge merge.toml
  hmo merge merge.toml --output enriched.csv")]
    Merge {
        /// Path to the merge config (kind = "merge")
        config: PathBuf,

        /// Write the merged CSV to this file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Validate a link or merge config without running it
    #[command(after_help = "\
Examples:
  hmo validate link.toml
  hmo validate merge.toml")]
    Validate {
        /// Path to the config file
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        None => {
            eprintln!("Usage: hmo <command> [options]");
            eprintln!("       hmo --help for more information");
            Err(CliError { code: EXIT_USAGE, message: String::new(), hint: None })
        }
        Some(Commands::Link { config, output, json }) => link::cmd_link(config, output, json),
        Some(Commands::Merge { config, output }) => merge::cmd_merge(config, output),
        Some(Commands::Validate { config }) => cmd_validate(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_INVALID_CONFIG, message: msg.into(), hint: None }
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self { code: EXIT_RUNTIME, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Engine errors surfacing while loading or running: config-shaped ones
/// keep the config exit code.
impl From<hmo_linkage::LinkageError> for CliError {
    fn from(e: hmo_linkage::LinkageError) -> Self {
        use hmo_linkage::LinkageError as E;
        match e {
            E::ConfigParse(_) | E::ConfigValidation(_) => CliError::config(e.to_string()),
            E::MissingColumn { .. } => CliError::runtime(e.to_string())
                .with_hint("check the column names in the config against the CSV header"),
            E::DuplicateKey { .. } => CliError::runtime(e.to_string())
                .with_hint("join keys and record ids must be unique"),
            _ => CliError::runtime(e.to_string()),
        }
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
    Link,
    Merge,
}

/// Read a config file and probe its top-level `kind` (default "link").
pub fn read_config(path: &Path) -> Result<(String, ConfigKind), CliError> {
    #[derive(serde::Deserialize)]
    struct KindProbe {
        #[serde(default = "default_kind")]
        kind: String,
    }
    fn default_kind() -> String {
        "link".into()
    }

    let config_str = std::fs::read_to_string(path)
        .map_err(|e| CliError::runtime(format!("cannot read config {}: {e}", path.display())))?;

    let kind = toml::from_str::<KindProbe>(&config_str)
        .map(|p| p.kind)
        .unwrap_or_else(|_| "link".into());

    match kind.as_str() {
        "link" => Ok((config_str, ConfigKind::Link)),
        "merge" => Ok((config_str, ConfigKind::Merge)),
        other => Err(CliError::config(format!(
            "unknown config kind: \"{other}\" (expected \"link\" or \"merge\")"
        ))),
    }
}

/// Read a data file named in the config, relative to the config's directory.
pub fn read_input(config_path: &Path, file: &str) -> Result<String, CliError> {
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let path = base_dir.join(file);
    std::fs::read_to_string(&path)
        .map_err(|e| CliError::runtime(format!("cannot read {}: {e}", path.display())))
}

/// Write to `output`, or stdout when none is given.
pub fn write_output(output: Option<&Path>, content: &str) -> Result<(), CliError> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .map_err(|e| CliError::runtime(format!("cannot write {}: {e}", path.display())))?;
            eprintln!("wrote {}", path.display());
        }
        None => print!("{content}"),
    }
    Ok(())
}

// ============================================================================
// validate
// ============================================================================

fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let (config_str, kind) = read_config(&config_path)?;
    match kind {
        ConfigKind::Link => {
            let config = hmo_linkage::LinkConfig::from_toml(&config_str)
                .map_err(|e| CliError::config(e.to_string()))?;
            eprintln!(
                "valid: link '{}' ({} x {} address column(s))",
                config.name,
                config.reference.addresses.len(),
                config.additional.addresses.len(),
            );
        }
        ConfigKind::Merge => {
            let config = hmo_linkage::MergeConfig::from_toml(&config_str)
                .map_err(|e| CliError::config(e.to_string()))?;
            eprintln!("valid: merge '{}' with {} step(s)", config.name, config.steps.len());
        }
    }
    Ok(())
}
