use log::{info, warn};
use std::time::Duration;

use crate::core::language::Language;
use crate::core::state::{Story, CTA_SEPARATOR};
use crate::services::llm::{Assistant, Stage};
use crate::services::names::NameMap;
use crate::services::prompts;
use crate::utils::pacing::pause;
use crate::utils::text::preview;

/// Story rendered in a target language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedStory {
    pub title: Option<String>,
    pub chapters: Vec<String>,
    pub cta: String,
}

impl TranslatedStory {
    /// Same layout as the base-language artifact.
    pub fn render(&self) -> String {
        let body = format!(
            "{}{}{}",
            self.chapters.join("\n\n"),
            CTA_SEPARATOR,
            self.cta
        );
        match &self.title {
            Some(title) if !title.is_empty() => format!("{}\n\n{}", title, body),
            _ => body,
        }
    }
}

pub struct Translator<'a> {
    assistant: &'a Assistant,
    unit_delay: Duration,
}

impl<'a> Translator<'a> {
    pub fn new(assistant: &'a Assistant, unit_delay: Duration) -> Self {
        Self {
            assistant,
            unit_delay,
        }
    }

    /// Translates one unit. Blank input stays blank; a failed call yields the
    /// original text so the story never loses a unit.
    pub async fn translate_unit(&self, text: &str, language: Language, label: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }
        let prompt = prompts::translation(text, language);
        match self
            .assistant
            .ask(Stage::Translation, prompt.system, &prompt.user)
            .await
        {
            Ok(translated) => translated,
            Err(e) => {
                warn!(
                    "Translation of {} to {} failed, keeping the original ({}): {:#}",
                    label,
                    language,
                    preview(text, 50),
                    e
                );
                text.to_string()
            }
        }
    }

    /// Applies `names` to every unit, then translates title, chapters and CTA
    /// one at a time.
    pub async fn translate_story(
        &self,
        story: &Story,
        names: &NameMap,
        language: Language,
    ) -> TranslatedStory {
        info!("Translating {} chapters to {}", story.chapters.len(), language);

        let title = match &story.title {
            Some(title) => {
                let translated = self
                    .translate_unit(&names.apply(title), language, "title")
                    .await;
                pause(self.unit_delay).await;
                Some(translated)
            }
            None => None,
        };

        let mut chapters = Vec::with_capacity(story.chapters.len());
        for (i, chapter) in story.chapters.iter().enumerate() {
            let label = format!("chapter {}", i + 1);
            chapters.push(
                self.translate_unit(&names.apply(chapter), language, &label)
                    .await,
            );
            info!("  chapter {}/{} translated", i + 1, story.chapters.len());
            pause(self.unit_delay).await;
        }

        let cta = self
            .translate_unit(&names.apply(&story.cta), language, "CTA")
            .await;

        TranslatedStory {
            title,
            chapters,
            cta,
        }
    }
}
