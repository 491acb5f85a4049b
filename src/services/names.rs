//! Name Mapping Engine: asks the model for an original -> localized name
//! table, checks it against the candidate lists and applies it to text.

use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::error::{StoryError, StoryErrorKind};
use crate::core::io::Storage;
use crate::core::language::{Language, NameCandidates};
use crate::services::llm::{Assistant, Stage};
use crate::services::prompts;
use crate::utils::text::strip_code_blocks;

/// One persisted substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameMapping {
    #[serde(rename = "nome_original")]
    pub original: String,
    #[serde(rename = "novo_nome")]
    pub localized: String,
    #[serde(rename = "sexo_inferido", default)]
    pub gender: String,
}

/// Substitution table of one (summary, language) pair, in model order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameMap {
    entries: Vec<NameMapping>,
}

impl NameMap {
    /// Keeps the entries that honor the table invariants: a localized name
    /// taken from `candidates` and different from the original, one entry
    /// per original name (the first one wins).
    pub fn from_entries(entries: Vec<NameMapping>, candidates: &NameCandidates) -> Self {
        let mut kept: Vec<NameMapping> = Vec::with_capacity(entries.len());
        for entry in entries {
            let original = entry.original.trim();
            let localized = entry.localized.trim();
            if original.is_empty() || localized.is_empty() {
                continue;
            }
            if original == localized {
                warn!("Mapping '{}' -> '{}' keeps the original name, dropped", original, localized);
                continue;
            }
            if !candidates.contains(localized) {
                warn!("'{}' is not a candidate name, mapping for '{}' dropped", localized, original);
                continue;
            }
            if let Some(existing) = kept.iter().find(|m| m.original == original) {
                if existing.localized != localized {
                    warn!(
                        "'{}' mapped twice ('{}' and '{}'), keeping '{}'",
                        original, existing.localized, localized, existing.localized
                    );
                }
                continue;
            }
            kept.push(NameMapping {
                original: original.to_string(),
                localized: localized.to_string(),
                gender: entry.gender.trim().to_string(),
            });
        }
        Self { entries: kept }
    }

    pub fn entries(&self) -> &[NameMapping] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Literal find-and-replace of every entry, in table order. An original
    /// that is a substring of a longer original (`Ana` / `Anabela`) rewrites
    /// part of it when it comes first.
    pub fn apply(&self, text: &str) -> String {
        self.entries.iter().fold(text.to_string(), |acc, m| {
            if acc.contains(&m.original) {
                acc.replace(&m.original, &m.localized)
            } else {
                acc
            }
        })
    }

    /// Writes the table as a JSON array of records.
    pub async fn persist(&self, storage: &dyn Storage, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.entries)?;
        storage.write_string(path, &content).await
    }
}

#[derive(Deserialize)]
struct MappingResponse {
    #[serde(default)]
    mapeamento_nomes: Option<Vec<RawMapping>>,
}

#[derive(Deserialize)]
struct RawMapping {
    nome_original: Option<String>,
    novo_nome: Option<String>,
    #[serde(default)]
    sexo_inferido: Option<String>,
}

/// Parses the model answer. A missing or empty list is a valid, empty table;
/// records without both names are skipped.
pub fn parse_name_map_response(raw: &str, language: Language) -> Result<Vec<NameMapping>, StoryError> {
    let clean = strip_code_blocks(raw);
    let parsed: MappingResponse = serde_json::from_str(&clean).map_err(|e| {
        StoryError::new(StoryErrorKind::NameMappingParse {
            language: language.display_name().to_string(),
            detail: format!("{} (answer: {})", e, clean),
        })
    })?;

    Ok(parsed
        .mapeamento_nomes
        .unwrap_or_default()
        .into_iter()
        .filter_map(|m| match (m.nome_original, m.novo_nome) {
            (Some(original), Some(localized)) => Some(NameMapping {
                original,
                localized,
                gender: m.sexo_inferido.unwrap_or_default(),
            }),
            _ => None,
        })
        .collect())
}

pub struct NameMappingEngine<'a> {
    assistant: &'a Assistant,
}

impl<'a> NameMappingEngine<'a> {
    pub fn new(assistant: &'a Assistant) -> Self {
        Self { assistant }
    }

    pub async fn build_map(
        &self,
        text: &str,
        candidates: &NameCandidates,
        language: Language,
    ) -> Result<NameMap> {
        info!("Mapping character names for {}", language);
        let prompt = prompts::name_mapping(text, candidates, language);
        let answer = self
            .assistant
            .ask(Stage::NameMapping, prompt.system, &prompt.user)
            .await?;
        let entries = parse_name_map_response(&answer, language)?;
        let map = NameMap::from_entries(entries, candidates);
        if map.is_empty() {
            info!("No character names to replace for {}", language);
        }
        for m in map.entries() {
            if text.contains(&m.original) {
                info!("  '{}' -> '{}'", m.original, m.localized);
            } else {
                warn!("  '{}' was mapped but does not occur in the text", m.original);
            }
        }
        Ok(map)
    }
}
