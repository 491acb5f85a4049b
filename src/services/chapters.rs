//! Chapter Pipeline Driver: plans chapter titles, writes every chapter with
//! the previous one as context, then closes the story with a call-to-action.
//!
//! ```text
//! PlanningTitles -> GeneratingChapters(1..N) -> GeneratingCta -> Persisted
//!        \_______________________\_____________________________-> Abandoned
//! ```

use anyhow::Result;
use log::{error, info, warn};
use std::time::Duration;

use crate::core::error::{StoryError, StoryErrorKind};
use crate::core::io::Storage;
use crate::core::layout::SummaryLayout;
use crate::core::state::{ChapterPlan, Story, Summary};
use crate::services::llm::{Assistant, Stage};
use crate::services::prompts;
use crate::utils::pacing::pause;
use crate::utils::text::{preview, tail_chars};

pub const NOMINAL_CHAPTERS: usize = 11;
pub const MIN_CHAPTER_CHARS: usize = 150;
pub const MIN_CTA_CHARS: usize = 10;
pub const CTA_CONTEXT_CHARS: usize = 1000;

pub const DEFAULT_CTA: &str = "Gostou desta história emocionante? Sua opinião é muito valiosa para nós! \
Deixe um comentário abaixo, compartilhe com seus amigos e familiares, e não se esqueça de se inscrever \
no canal para não perder nenhuma de nossas futuras narrativas. Sua interação nos inspira a continuar criando!";

/// Lines shorter than this are not taken as titles by the fallback parser.
const MIN_FALLBACK_TITLE_CHARS: usize = 6;

/// Extracts chapter titles from a planning answer. Lines shaped like
/// `N. Title` win; otherwise every reasonably long line is a title.
pub fn parse_titles(response: &str) -> Vec<String> {
    let numbered: Vec<String> = response
        .lines()
        .filter_map(|line| numbered_title(line.trim()))
        .collect();
    if !numbered.is_empty() {
        return numbered;
    }

    response
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().count() >= MIN_FALLBACK_TITLE_CHARS)
        .map(str::to_string)
        .collect()
}

fn numbered_title(line: &str) -> Option<String> {
    // Markdown emphasis or headings around the number: `**1. Title**`, `## 1. Title`.
    let line = line.trim_start_matches(|c: char| c == '*' || c == '#' || c.is_whitespace());
    let (number, rest) = line.split_once(". ")?;
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let title = rest.trim().trim_matches('*').trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// Applies the nominal chapter count: extra titles are dropped, a short
/// plan is accepted. `None` when nothing was recovered.
pub fn plan_from_titles(mut titles: Vec<String>) -> Option<ChapterPlan> {
    if titles.is_empty() {
        return None;
    }
    if titles.len() > NOMINAL_CHAPTERS {
        warn!(
            "{} titles generated, keeping the first {}",
            titles.len(),
            NOMINAL_CHAPTERS
        );
        titles.truncate(NOMINAL_CHAPTERS);
    } else if titles.len() < NOMINAL_CHAPTERS {
        warn!(
            "Only {} titles generated instead of {}; the story will be shorter",
            titles.len(),
            NOMINAL_CHAPTERS
        );
    }
    Some(ChapterPlan::new(titles))
}

/// Rejects degenerate chapter answers.
pub fn validate_chapter(answer: &str) -> Result<String, String> {
    let text = answer.trim();
    if text.eq_ignore_ascii_case("ok") {
        return Err("the model only acknowledged the request".to_string());
    }
    let len = text.chars().count();
    if len < MIN_CHAPTER_CHARS {
        return Err(format!(
            "answer too short ({} chars, minimum {})",
            len, MIN_CHAPTER_CHARS
        ));
    }
    Ok(text.to_string())
}

pub fn cta_or_default(answer: Option<&str>) -> String {
    match answer.map(str::trim) {
        Some(cta) if cta.chars().count() >= MIN_CTA_CHARS => cta.to_string(),
        other => {
            warn!(
                "CTA missing or too short ({:?}); using the default CTA",
                other.unwrap_or_default()
            );
            DEFAULT_CTA.to_string()
        }
    }
}

#[derive(Debug)]
pub enum PipelineState {
    PlanningTitles,
    GeneratingChapters {
        plan: ChapterPlan,
        chapters: Vec<String>,
    },
    GeneratingCta {
        plan: ChapterPlan,
        chapters: Vec<String>,
    },
    Persisted(Story),
    Abandoned(StoryError),
}

pub struct ChapterPipeline<'a> {
    assistant: &'a Assistant,
    storage: &'a dyn Storage,
    chapter_delay: Duration,
}

impl<'a> ChapterPipeline<'a> {
    pub fn new(assistant: &'a Assistant, storage: &'a dyn Storage, chapter_delay: Duration) -> Self {
        Self {
            assistant,
            storage,
            chapter_delay,
        }
    }

    /// Drives the state machine to a terminal state. An abandoned story is
    /// returned as its `StoryError`; storage failures propagate as is.
    pub async fn run(&self, summary: &Summary, layout: &SummaryLayout) -> Result<Story> {
        let mut state = PipelineState::PlanningTitles;
        loop {
            state = match state {
                PipelineState::Persisted(story) => return Ok(story),
                PipelineState::Abandoned(e) => return Err(e.into()),
                pending => self.step(summary, layout, pending).await?,
            };
        }
    }

    /// One transition.
    pub async fn step(
        &self,
        summary: &Summary,
        layout: &SummaryLayout,
        state: PipelineState,
    ) -> Result<PipelineState> {
        match state {
            PipelineState::PlanningTitles => self.plan(summary, layout).await,
            PipelineState::GeneratingChapters { plan, chapters } => {
                self.next_chapter(summary, layout, plan, chapters).await
            }
            PipelineState::GeneratingCta { plan, chapters } => {
                self.close(summary, layout, plan, chapters).await
            }
            terminal => Ok(terminal),
        }
    }

    async fn plan(&self, summary: &Summary, layout: &SummaryLayout) -> Result<PipelineState> {
        info!("Planning {} chapter titles for '{}'", NOMINAL_CHAPTERS, summary.name);
        let prompt = prompts::chapter_titles(summary.premise(), NOMINAL_CHAPTERS);
        let (response, titles) = match self.assistant.ask(Stage::Titles, prompt.system, &prompt.user).await {
            Ok(answer) => {
                let titles = parse_titles(&answer);
                (answer, titles)
            }
            Err(e) => {
                error!("Title planning for '{}' failed: {:#}", summary.name, e);
                (format!("<sem resposta: {:#}>", e), Vec::new())
            }
        };

        let Some(plan) = plan_from_titles(titles) else {
            let diagnostic = format!(
                "Resumo do usuário:\n{}\n\nResposta da API (títulos):\n{}",
                summary.premise(),
                response
            );
            let path = layout.titles_error_file();
            self.storage.write_string(&path, &diagnostic).await?;
            error!("No titles recovered for '{}'; details in {:?}", summary.name, path);
            return Ok(PipelineState::Abandoned(StoryError::new(
                StoryErrorKind::TitleGenerationFailed(summary.name.clone()),
            )));
        };

        for (i, title) in plan.titles().iter().enumerate() {
            info!("  {}. {}", i + 1, title);
        }
        let listing = format!(
            "Resumo da História:\n{}\n\nTítulos Gerados:\n{}\n",
            summary.premise(),
            plan.numbered()
        );
        self.storage.write_string(&layout.titles_file(), &listing).await?;

        Ok(PipelineState::GeneratingChapters {
            plan,
            chapters: Vec::new(),
        })
    }

    async fn next_chapter(
        &self,
        summary: &Summary,
        layout: &SummaryLayout,
        plan: ChapterPlan,
        mut chapters: Vec<String>,
    ) -> Result<PipelineState> {
        let index = chapters.len() + 1;
        let Some(title) = plan.titles().get(index - 1).cloned() else {
            return Ok(PipelineState::GeneratingCta { plan, chapters });
        };
        info!("Writing chapter {}/{}: '{}'", index, plan.len(), title);

        let previous = chapters.last().map(String::as_str).unwrap_or_default();
        let numbered = plan.numbered();
        let prompt = prompts::chapter(summary.premise(), &numbered, previous, index, &title);

        let (answer, verdict) = match self.assistant.ask(Stage::Chapter, prompt.system, &prompt.user).await {
            Ok(answer) => {
                let verdict = validate_chapter(&answer);
                (answer, verdict)
            }
            Err(e) => (String::new(), Err(format!("{:#}", e))),
        };

        let text = match verdict {
            Ok(text) => text,
            Err(reason) => {
                error!(
                    "Chapter {} of '{}' rejected ({}): {}",
                    index,
                    summary.name,
                    reason,
                    preview(&answer, 200)
                );
                let diagnostic = format!(
                    "Resumo: {}\nLista de Títulos:\n{}\nContexto Anterior:\n{}\n\n\
                     Título da Parte Atual: {}\n\nResposta da API (Conteúdo da Parte):\n{}",
                    summary.premise(),
                    numbered,
                    previous,
                    title,
                    answer
                );
                self.storage
                    .write_string(&layout.chapter_error_file(index), &diagnostic)
                    .await?;
                return Ok(PipelineState::Abandoned(StoryError::new(
                    StoryErrorKind::ChapterGenerationFailed {
                        index,
                        title,
                        reason,
                    },
                )));
            }
        };

        info!("Chapter {} written ({} chars)", index, text.chars().count());
        chapters.push(text);

        if chapters.len() < plan.len() {
            pause(self.chapter_delay).await;
            Ok(PipelineState::GeneratingChapters { plan, chapters })
        } else {
            Ok(PipelineState::GeneratingCta { plan, chapters })
        }
    }

    async fn close(
        &self,
        summary: &Summary,
        layout: &SummaryLayout,
        plan: ChapterPlan,
        chapters: Vec<String>,
    ) -> Result<PipelineState> {
        info!("Writing the call-to-action for '{}'", summary.name);
        let body = chapters.join("\n\n");
        let prompt = prompts::call_to_action(tail_chars(&body, CTA_CONTEXT_CHARS));
        let answer = match self.assistant.ask(Stage::Cta, prompt.system, &prompt.user).await {
            Ok(answer) => Some(answer),
            Err(e) => {
                warn!("CTA generation failed: {:#}", e);
                None
            }
        };

        let story = Story {
            title: summary.title.clone(),
            plan,
            chapters,
            cta: cta_or_default(answer.as_deref()),
        };
        let path = layout.story_file();
        self.storage.write_string(&path, &story.render()).await?;
        info!("Story saved to {:?}", path);
        Ok(PipelineState::Persisted(story))
    }
}
