use anyhow::Result;
use log::{info, warn};

use crate::services::llm::{Assistant, Stage};
use crate::services::prompts;

pub const MAX_PRINCIPAL_CHARACTERS: usize = 2;

/// Splits a comma separated answer into at most two names.
pub fn parse_character_names(answer: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in answer
        .split(|c| c == ',' || c == '\n')
        .map(|n| n.trim().trim_matches(|c: char| c == '.' || c == '*' || c == '"'))
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    if names.len() > MAX_PRINCIPAL_CHARACTERS {
        warn!(
            "{} characters identified ({}), keeping the first {}",
            names.len(),
            names.join(", "),
            MAX_PRINCIPAL_CHARACTERS
        );
        names.truncate(MAX_PRINCIPAL_CHARACTERS);
    }
    names
}

/// LLM side of the character stage: who the principal characters are, what
/// they look like and how to picture them.
pub struct CharacterStudio<'a> {
    assistant: &'a Assistant,
}

impl<'a> CharacterStudio<'a> {
    pub fn new(assistant: &'a Assistant) -> Self {
        Self { assistant }
    }

    pub async fn identify(&self, story_text: &str) -> Result<Vec<String>> {
        let prompt = prompts::principal_characters(story_text);
        let answer = self
            .assistant
            .ask(Stage::CharacterIdentification, prompt.system, &prompt.user)
            .await?;
        let names = parse_character_names(&answer);
        if names.is_empty() {
            warn!("No principal character could be identified (answer: {})", answer);
        } else {
            info!("Principal characters: {}", names.join(", "));
        }
        Ok(names)
    }

    pub async fn describe(&self, name: &str, story_text: &str) -> Result<String> {
        let prompt = prompts::character_description(name, story_text);
        self.assistant
            .ask(Stage::CharacterDescription, prompt.system, &prompt.user)
            .await
    }

    /// Full image prompt for `name`, optionally anchored on a reference image.
    pub async fn image_prompt(
        &self,
        name: &str,
        description: &str,
        cref: Option<&str>,
    ) -> Result<String> {
        let prompt = prompts::character_image(name, description);
        let visual = self
            .assistant
            .ask(Stage::ImagePrompt, prompt.system, &prompt.user)
            .await?;
        Ok(prompts::compose_image_prompt(&visual, cref))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm::tests::{instant_assistant, ScriptedLlm};
    use std::sync::Arc;

    #[test]
    fn test_parse_character_names() {
        assert_eq!(parse_character_names("Maria, João"), vec!["Maria", "João"]);
        assert_eq!(parse_character_names("Maria, João, Pedro"), vec!["Maria", "João"]);
        assert_eq!(parse_character_names(" Maria. "), vec!["Maria"]);
        assert_eq!(parse_character_names("Maria, Maria, Ana"), vec!["Maria", "Ana"]);
        assert!(parse_character_names(" , ").is_empty());
    }

    #[tokio::test]
    async fn test_image_prompt_wraps_visual_sentence() -> Result<()> {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(
            "A woman in her 60s with silver hair".to_string(),
        )]));
        let calls = llm.calls.clone();
        let assistant = instant_assistant(llm, 1);
        let studio = CharacterStudio::new(&assistant);

        let prompt = studio
            .image_prompt("Maria", "Maria tem 60 anos.", Some("https://cdn/ref.png"))
            .await?;
        assert!(prompt.contains("A woman in her 60s with silver hair."));
        assert!(prompt.ends_with("--cref https://cdn/ref.png --ar 16:9 --v 6.1 --style raw"));

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].0, Stage::ImagePrompt);
        assert!(calls[0].1.contains("Maria tem 60 anos."));
        Ok(())
    }
}
