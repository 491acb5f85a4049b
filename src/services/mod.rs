pub mod chapters;
pub mod characters;
pub mod fetcher;
pub mod images;
pub mod llm;
pub mod names;
pub mod prompts;
pub mod setup;
pub mod translate;
pub mod workflow;
