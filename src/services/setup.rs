use anyhow::{anyhow, Result};
use inquire::{Confirm, MultiSelect, Text};
use std::path::Path;

use crate::core::config::Config;
use crate::core::language::Language;

/// What the command line already decided; those questions are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct Preset {
    pub input_folder: bool,
    pub languages: bool,
}

/// Asks for the input folder and the target languages when running
/// attended, and offers to store the answers in `config_path`.
pub fn run_setup(config: &mut Config, preset: Preset, config_path: &Path) -> Result<()> {
    if config.unattended {
        return Ok(());
    }
    let mut changed = false;

    if !preset.input_folder {
        let folder = Text::new("Folder with the summaries (.txt):")
            .with_default(&config.input_folder)
            .prompt()?;
        let folder = folder.trim().to_string();
        if folder.is_empty() {
            return Err(anyhow!("An input folder is required"));
        }
        if folder != config.input_folder {
            config.input_folder = folder;
            changed = true;
        }
    }

    if !preset.languages {
        let current = config.selected_languages()?;
        let defaults: Vec<usize> = Language::ALL
            .iter()
            .enumerate()
            .filter(|(_, l)| current.contains(l))
            .map(|(i, _)| i)
            .collect();
        let selected = MultiSelect::new("Target languages:", Language::ALL.to_vec())
            .with_default(&defaults)
            .prompt()?;
        let codes: Vec<String> = selected.iter().map(|l| l.code().to_string()).collect();
        if codes != config.languages {
            config.languages = codes;
            changed = true;
        }
    }

    if changed {
        let save = Confirm::new(&format!("Save these choices to {}?", config_path.display()))
            .with_default(false)
            .prompt()?;
        if save {
            config.save(config_path)?;
            println!("Configuration saved.");
        }
    }
    Ok(())
}
