use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use rand::seq::IndexedRandom;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::config::Config;
use crate::core::error::{story_error_kind, StoryErrorKind};
use crate::core::io::Storage;
use crate::core::language::{Language, NameCandidates};
use crate::core::layout::SummaryLayout;
use crate::core::state::{CharacterReference, Story, Summary};
use crate::services::chapters::ChapterPipeline;
use crate::services::characters::CharacterStudio;
use crate::services::fetcher::ImageTarget;
use crate::services::images::{DeliveryMode, ImageApi, TaskClient, TaskOutcome};
use crate::services::llm::{Assistant, LlmClient};
use crate::services::names::NameMappingEngine;
use crate::services::translate::Translator;
use crate::utils::pacing::pause;

pub const IMAGE_PROMPTS_PER_CHARACTER: usize = 5;

/// Outcome counters of one batch run. The run itself succeeds whenever the
/// loop completes, so this is the only per-item signal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub summaries_seen: usize,
    pub stories_persisted: usize,
    pub abandoned: Vec<String>,
    /// Story saved, but a translation or the character stage stopped early.
    pub incomplete: Vec<String>,
    pub translations_written: usize,
    pub images_saved: usize,
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} summaries, {} stories, {} translations, {} images",
            self.summaries_seen, self.stories_persisted, self.translations_written, self.images_saved
        )?;
        if !self.abandoned.is_empty() {
            write!(f, " (abandoned: {})", self.abandoned.join(", "))?;
        }
        if !self.incomplete.is_empty() {
            write!(f, " (incomplete: {})", self.incomplete.join(", "))?;
        }
        Ok(())
    }
}

struct QueuedImage {
    character: String,
    prompt: String,
    target: PathBuf,
}

pub struct WorkflowManager {
    config: Config,
    languages: Vec<Language>,
    assistant: Assistant,
    image_api: Arc<dyn ImageApi>,
    storage: Arc<dyn Storage>,
}

impl WorkflowManager {
    pub fn new(
        config: Config,
        llm: Arc<dyn LlmClient>,
        image_api: Arc<dyn ImageApi>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self> {
        let languages = config.selected_languages()?;
        let assistant = Assistant::from_config(llm, &config);
        Ok(Self {
            config,
            languages,
            assistant,
            image_api,
            storage,
        })
    }

    /// Processes every `.txt` summary of the input folder, one at a time.
    pub async fn run(&self) -> Result<BatchReport> {
        let input = Path::new(&self.config.input_folder);
        let entries = self
            .storage
            .list(input)
            .await
            .with_context(|| format!("Input folder {:?} is not readable", input))?;
        let mut summaries: Vec<PathBuf> = entries
            .into_iter()
            .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
            .collect();
        summaries.sort();

        let mut report = BatchReport::default();
        if summaries.is_empty() {
            warn!("No .txt summaries found in {:?}", input);
            return Ok(report);
        }

        if self.languages.is_empty() {
            info!("No target language selected; only the base story is generated");
        }

        let total = summaries.len();
        for (i, path) in summaries.iter().enumerate() {
            report.summaries_seen += 1;
            let base = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            println!("[{}/{}] Processing summary: {}", i + 1, total, base);

            if let Err(e) = self.process_summary(path, &base, &mut report).await {
                match story_error_kind(&e) {
                    Some(StoryErrorKind::TitleGenerationFailed(_))
                    | Some(StoryErrorKind::ChapterGenerationFailed { .. }) => {
                        error!("Story for '{}' abandoned: {}", base, e);
                    }
                    _ => error!("Summary '{}' failed: {:#}", base, e),
                }
                report.abandoned.push(base);
            }

            if i + 1 < total {
                pause(self.config.pacing.summary_delay()).await;
            }
        }

        println!("Batch finished: {}", report);
        Ok(report)
    }

    /// Errors are returned only while the story itself is not yet saved.
    /// Anything failing afterwards is logged and marks the summary incomplete.
    async fn process_summary(&self, path: &Path, base: &str, report: &mut BatchReport) -> Result<()> {
        let content = self.storage.read_string(path).await?;
        let Some(summary) = Summary::parse(base, &content) else {
            warn!("Summary {:?} is empty, skipped", path);
            return Ok(());
        };

        let layout = SummaryLayout::new(Path::new(&self.config.output_folder), base);
        let pipeline = ChapterPipeline::new(
            &self.assistant,
            self.storage.as_ref(),
            self.config.pacing.chapter_delay(),
        );
        let story = pipeline.run(&summary, &layout).await?;
        report.stories_persisted += 1;
        println!("Story '{}' written ({} chapters)", base, story.chapters.len());

        let mut complete = true;
        for &language in &self.languages {
            match self.translate_into(&story, &layout, language).await {
                Ok(true) => report.translations_written += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Translation of '{}' to {} skipped: {:#}", base, language, e);
                    complete = false;
                }
            }
        }

        if let Err(e) = self.illustrate(&story, &layout, report).await {
            warn!("Character stage of '{}' stopped: {:#}", base, e);
            complete = false;
        }

        if complete {
            println!("Summary '{}' done", base);
        } else {
            report.incomplete.push(base.to_string());
        }
        Ok(())
    }

    /// `Ok(false)` when the language has no usable name list.
    async fn translate_into(&self, story: &Story, layout: &SummaryLayout, language: Language) -> Result<bool> {
        let names_folder = Path::new(&self.config.names_folder);
        let candidates = match NameCandidates::load(self.storage.as_ref(), names_folder, language).await? {
            Some(candidates) if !candidates.is_empty() => candidates,
            _ => {
                warn!("No candidate names for {}, language skipped", language);
                return Ok(false);
            }
        };

        let engine = NameMappingEngine::new(&self.assistant);
        let map = engine
            .build_map(&story.analysis_text(), &candidates, language)
            .await?;
        map.persist(self.storage.as_ref(), &layout.name_map_file(language))
            .await?;

        let translator = Translator::new(&self.assistant, self.config.pacing.translation_delay());
        let translated = translator.translate_story(story, &map, language).await;
        let path = layout.translated_story_file(language);
        self.storage.write_string(&path, &translated.render()).await?;
        info!("Translation to {} saved to {:?}", language, path);
        Ok(true)
    }

    /// Character stage. Saved images are counted into `report` as they land.
    async fn illustrate(&self, story: &Story, layout: &SummaryLayout, report: &mut BatchReport) -> Result<()> {
        let studio = CharacterStudio::new(&self.assistant);
        let text = story.analysis_text();
        let names = match studio.identify(&text).await {
            Ok(names) => names,
            Err(e) => {
                warn!("Character identification failed, no images for this summary: {:#}", e);
                return Ok(());
            }
        };

        let tasks = TaskClient::new(self.image_api.as_ref(), &self.config.image, self.storage.as_ref());
        let mut queue = Vec::new();
        for name in names {
            let description = match studio.describe(&name, &text).await {
                Ok(description) => description,
                Err(e) => {
                    warn!("No description for {}, character skipped: {:#}", name, e);
                    continue;
                }
            };
            let reference = self
                .reference_for(&studio, &tasks, layout, &name, description)
                .await?;

            for n in 1..=IMAGE_PROMPTS_PER_CHARACTER {
                let prompt = match studio
                    .image_prompt(&reference.name, &reference.description, reference.reference_url.as_deref())
                    .await
                {
                    Ok(prompt) => prompt,
                    Err(e) => {
                        warn!("Image prompt {} for {} failed: {:#}", n, reference.name, e);
                        continue;
                    }
                };
                self.storage
                    .write_string(&layout.image_prompt_file(&reference.name, n), &prompt)
                    .await?;
                queue.push(QueuedImage {
                    character: reference.name.clone(),
                    prompt,
                    target: layout.image_file(&reference.name, n),
                });
            }
        }

        self.generate_images(&tasks, queue, report).await
    }

    /// Authors and submits the throwaway reference prompt; one of its URLs
    /// becomes the character's `--cref`.
    async fn reference_for(
        &self,
        studio: &CharacterStudio<'_>,
        tasks: &TaskClient<'_>,
        layout: &SummaryLayout,
        name: &str,
        description: String,
    ) -> Result<CharacterReference> {
        let mut reference = CharacterReference {
            name: name.to_string(),
            description,
            reference_url: None,
        };
        let prompt = match studio.image_prompt(name, &reference.description, None).await {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("Reference prompt for {} failed: {:#}", name, e);
                return Ok(reference);
            }
        };
        self.storage
            .write_string(&layout.reference_prompt_file(name), &prompt)
            .await?;

        match tasks.submit_and_await(&prompt, DeliveryMode::UrlsOnly).await {
            Ok(TaskOutcome::Urls(urls)) => {
                reference.reference_url = urls.choose(&mut rand::rng()).cloned();
                if let Some(url) = &reference.reference_url {
                    info!("Reference image for {}: {}", name, url);
                }
            }
            Ok(TaskOutcome::Saved(_)) => {}
            Err(e) => warn!("No reference image for {}: {}", name, e),
        }
        pause(self.config.pacing.image_delay()).await;
        Ok(reference)
    }

    async fn generate_images(
        &self,
        tasks: &TaskClient<'_>,
        queue: Vec<QueuedImage>,
        report: &mut BatchReport,
    ) -> Result<()> {
        if queue.is_empty() {
            return Ok(());
        }
        println!("Generating {} character images...", queue.len());

        let pb = ProgressBar::new(queue.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                .progress_chars("#>-"),
        );

        let total = queue.len();
        for (i, item) in queue.into_iter().enumerate() {
            let target = ImageTarget::from_path(&item.target);
            match tasks
                .submit_and_await(&item.prompt, DeliveryMode::Download(target))
                .await
            {
                Ok(TaskOutcome::Saved(images)) => report.images_saved += images.len(),
                Ok(TaskOutcome::Urls(_)) => {}
                Err(e) if e.is_configuration() => {
                    warn!("Image generation disabled: {}", e);
                    break;
                }
                Err(e) => error!("Image for {} skipped: {}", item.character, e),
            }
            pb.inc(1);
            if i + 1 < total {
                pause(self.config.pacing.image_delay()).await;
            }
        }
        pb.finish_with_message("Images complete");
        Ok(())
    }
}
