//! `hmo link`: config-driven address matching.

use std::path::PathBuf;

use hmo_linkage::{LinkConfig, LinkInput};

use crate::exit_codes::{EXIT_EMPTY_CANDIDATES, EXIT_INVALID_CONFIG};
use crate::{read_config, read_input, write_output, CliError, ConfigKind};

pub fn cmd_link(config_path: PathBuf, output: Option<PathBuf>, json: bool) -> Result<(), CliError> {
    let (config_str, kind) = read_config(&config_path)?;
    if kind != ConfigKind::Link {
        return Err(CliError {
            code: EXIT_INVALID_CONFIG,
            message: format!("{} is not a link config", config_path.display()),
            hint: Some("run merge configs with `hmo merge`".into()),
        });
    }

    let config = LinkConfig::from_toml(&config_str).map_err(|e| CliError::config(e.to_string()))?;
    let reference = read_input(&config_path, &config.reference.file)?;
    let additional = read_input(&config_path, &config.additional.file)?;

    let input = LinkInput::from_csv(&config, &reference, &additional)?;
    let result = hmo_linkage::run(&config, &input)?;

    let csv = result.table.to_csv()?;
    if json {
        let json_str = serde_json::to_string_pretty(&result)
            .map_err(|e| CliError::runtime(format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
        if output.is_some() {
            write_output(output.as_deref(), &csv)?;
        }
    } else {
        write_output(output.as_deref(), &csv)?;
    }

    let s = &result.summary;
    eprintln!(
        "link '{}': {} candidate pairs ({} exact, {} blocked in {} blocks) from {} x {} records",
        result.meta.config_name,
        s.exact_pairs + s.blocked_pairs,
        s.exact_pairs,
        s.blocked_pairs,
        s.blocks,
        s.ref_records,
        s.add_records,
    );
    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }

    if result.table.is_empty() {
        return Err(CliError {
            code: EXIT_EMPTY_CANDIDATES,
            message: "no candidate pairs generated".into(),
            hint: Some("no exact match and no shared postcode; check the postcode columns".into()),
        });
    }
    Ok(())
}
