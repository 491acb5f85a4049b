use crate::core::error::StoryError;
use crate::core::io::Storage;
use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Supported translation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Italiano,
    Ingles,
    Espanhol,
    Polones,
    Romeno,
    Alemao,
    Frances,
    Hungaro,
    Grego,
    Croata,
    EspanholMx,
    Suica,
}

impl Language {
    pub const ALL: [Language; 12] = [
        Language::Italiano,
        Language::Ingles,
        Language::Espanhol,
        Language::Polones,
        Language::Romeno,
        Language::Alemao,
        Language::Frances,
        Language::Hungaro,
        Language::Grego,
        Language::Croata,
        Language::EspanholMx,
        Language::Suica,
    ];

    /// Code used in folder and file names.
    pub fn code(self) -> &'static str {
        match self {
            Language::Italiano => "italiano",
            Language::Ingles => "ingles",
            Language::Espanhol => "espanhol",
            Language::Polones => "polones",
            Language::Romeno => "romeno",
            Language::Alemao => "alemao",
            Language::Frances => "frances",
            Language::Hungaro => "hungaro",
            Language::Grego => "grego",
            Language::Croata => "croata",
            Language::EspanholMx => "espanhol_mx",
            Language::Suica => "suica",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Language::Italiano => "Italiano",
            Language::Ingles => "Inglês",
            Language::Espanhol => "Espanhol",
            Language::Polones => "Polonês",
            Language::Romeno => "Romeno",
            Language::Alemao => "Alemão",
            Language::Frances => "Francês",
            Language::Hungaro => "Húngaro",
            Language::Grego => "Grego",
            Language::Croata => "Croata",
            Language::EspanholMx => "Espanhol (México)",
            Language::Suica => "Suíço (Alemão)",
        }
    }

    /// `{names_folder}/{code}.json`
    pub fn names_file(self, names_folder: &Path) -> PathBuf {
        names_folder.join(format!("{}.json", self.code()))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Language {
    type Err = StoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_lowercase();
        Language::ALL
            .iter()
            .copied()
            .find(|l| l.code() == code)
            .ok_or_else(|| StoryError::configuration(format!("Unknown language code: '{}'", s.trim())))
    }
}

/// Parses a comma separated list such as `"italiano, polones"`.
pub fn parse_language_list(input: &str) -> Result<Vec<Language>, StoryError> {
    let mut out = Vec::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let language: Language = part.parse()?;
        if !out.contains(&language) {
            out.push(language);
        }
    }
    Ok(out)
}

/// Localized name candidates for one language, split by gender.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NameCandidates {
    #[serde(default)]
    pub masculino: Vec<String>,
    #[serde(default)]
    pub feminino: Vec<String>,
}

impl NameCandidates {
    pub fn is_empty(&self) -> bool {
        self.masculino.is_empty() && self.feminino.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.masculino.iter().chain(self.feminino.iter()).any(|n| n == name)
    }

    /// Loads the candidate file of `language`. A missing or unreadable file
    /// yields `None`; the caller skips the language.
    pub async fn load(
        storage: &dyn Storage,
        names_folder: &Path,
        language: Language,
    ) -> Result<Option<Self>> {
        let path = language.names_file(names_folder);
        if !storage.exists(&path).await? {
            warn!("Name list for {} not found at {:?}", language, path);
            return Ok(None);
        }
        let content = storage
            .read_string(&path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        match serde_json::from_str::<NameCandidates>(&content) {
            Ok(candidates) => Ok(Some(candidates)),
            Err(e) => {
                warn!("Name list {:?} is not valid JSON: {}", path, e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::NativeStorage;
    use std::fs;

    #[test]
    fn test_codes_round_trip_through_from_str() {
        for language in Language::ALL {
            assert_eq!(language.code().parse::<Language>().unwrap(), language);
        }
        assert_eq!(" Espanhol_MX ".parse::<Language>().unwrap(), Language::EspanholMx);
    }

    #[test]
    fn test_parse_language_list() {
        let list = parse_language_list("italiano, ,frances,italiano").unwrap();
        assert_eq!(list, vec![Language::Italiano, Language::Frances]);
        assert!(parse_language_list("").unwrap().is_empty());
        assert!(parse_language_list("italiano,latim").is_err());
    }

    #[tokio::test]
    async fn test_load_candidates() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = NativeStorage::new();

        fs::write(
            dir.path().join("italiano.json"),
            r#"{"masculino": ["Marco"], "feminino": ["Giulia", "Chiara"]}"#,
        )?;
        fs::write(dir.path().join("grego.json"), r#"{"masculino": []}"#)?;
        fs::write(dir.path().join("croata.json"), "not json")?;

        let it = NameCandidates::load(&storage, dir.path(), Language::Italiano).await?;
        let it = it.expect("italiano list");
        assert!(it.contains("Giulia"));
        assert!(!it.contains("Maria"));

        let el = NameCandidates::load(&storage, dir.path(), Language::Grego).await?;
        assert!(el.expect("grego list").is_empty());

        assert!(NameCandidates::load(&storage, dir.path(), Language::Croata).await?.is_none());
        assert!(NameCandidates::load(&storage, dir.path(), Language::Romeno).await?.is_none());
        Ok(())
    }
}
