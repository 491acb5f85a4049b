use log::warn;
use serde::{Deserialize, Serialize};

/// Separator between the story body and the closing call-to-action.
pub const CTA_SEPARATOR: &str = "\n\n---\n";

/// One input file: an optional title line plus a free-text premise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// File stem, used as the base of every output name.
    pub name: String,
    pub title: Option<String>,
    pub body: String,
}

impl Summary {
    /// The first non-empty line is the title, the rest is the body.
    /// Returns `None` for files without any content.
    pub fn parse(name: &str, content: &str) -> Option<Self> {
        let lines: Vec<&str> = content.lines().map(str::trim).collect();
        let first = lines.iter().position(|l| !l.is_empty())?;

        let title = lines[first].to_string();
        let body = lines[first + 1..].join("\n").trim().to_string();
        if body.is_empty() {
            warn!(
                "Summary '{}' has a title ('{}') but no body; the title is used as premise",
                name, title
            );
        }

        Some(Self {
            name: name.to_string(),
            title: Some(title),
            body,
        })
    }

    /// Text handed to the planner.
    pub fn premise(&self) -> &str {
        if self.body.is_empty() {
            self.title.as_deref().unwrap_or_default()
        } else {
            &self.body
        }
    }
}

/// Ordered chapter titles of one story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterPlan {
    titles: Vec<String>,
}

impl ChapterPlan {
    /// Callers guarantee a non-empty list; see `chapters::parse_titles`.
    pub(crate) fn new(titles: Vec<String>) -> Self {
        debug_assert!(!titles.is_empty());
        Self { titles }
    }

    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    /// `1. First\n2. Second...`
    pub fn numbered(&self) -> String {
        self.titles
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{}. {}", i + 1, t))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A fully generated story: every chapter of the plan plus the closing CTA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Story {
    pub title: Option<String>,
    pub plan: ChapterPlan,
    pub chapters: Vec<String>,
    pub cta: String,
}

impl Story {
    /// Chapters joined by blank lines.
    pub fn body(&self) -> String {
        self.chapters.join("\n\n")
    }

    /// Body plus CTA, without the title. Input of name mapping and
    /// character analysis.
    pub fn analysis_text(&self) -> String {
        format!("{}{}{}", self.body(), CTA_SEPARATOR, self.cta)
    }

    /// Persisted artifact layout.
    pub fn render(&self) -> String {
        match &self.title {
            Some(title) if !title.is_empty() => format!("{}\n\n{}", title, self.analysis_text()),
            _ => self.analysis_text(),
        }
    }
}

/// A principal character and the reference image chosen for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterReference {
    pub name: String,
    pub description: String,
    pub reference_url: Option<String>,
}
