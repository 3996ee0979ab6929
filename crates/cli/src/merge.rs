//! `hmo merge`: apply merge steps onto a reference frame in order.

use std::path::PathBuf;

use hmo_linkage::{apply_step, CsvOptions, Frame, MergeConfig};

use crate::exit_codes::EXIT_INVALID_CONFIG;
use crate::{read_config, read_input, write_output, CliError, ConfigKind};

pub fn cmd_merge(config_path: PathBuf, output: Option<PathBuf>) -> Result<(), CliError> {
    let (config_str, kind) = read_config(&config_path)?;
    if kind != ConfigKind::Merge {
        return Err(CliError {
            code: EXIT_INVALID_CONFIG,
            message: format!("{} is not a merge config", config_path.display()),
            hint: Some("add kind = \"merge\" or run link configs with `hmo link`".into()),
        });
    }

    let config = MergeConfig::from_toml(&config_str).map_err(|e| CliError::config(e.to_string()))?;

    let options = CsvOptions {
        points: config.reference.geometry.clone(),
        ..CsvOptions::default()
    };
    let data = read_input(&config_path, &config.reference.file)?;
    let mut frame = Frame::from_csv("reference", &data, &options)?;

    for step in &config.steps {
        let options = CsvOptions {
            points: step.geometry.clone(),
            ..CsvOptions::default()
        };
        let data = read_input(&config_path, &step.file)?;
        let additional = Frame::from_csv(&step.name, &data, &options)?;

        log::debug!("step '{}': {} rows from {}", step.name, additional.len(), step.file);

        let result = apply_step(&frame, &additional, step, &config.reference.id)?;
        eprintln!(
            "{} '{}': {} of {} reference rows matched",
            step.strategy,
            step.name,
            result.matched(),
            result.frame.len()
        );
        frame = result.frame;
    }

    write_output(output.as_deref(), &frame.to_csv()?)
}
