//! System prompt construction from organizational context documents.
//!
//! The prompt is laid out in a fixed order, blocks separated by a blank line:
//!
//! 1. **Preamble**: the assistant's role (replaceable via config)
//! 2. **Sections**: one `### {title}` block per context document, in the
//!    configured order (Objectives, Priorities, Outlook, Methodology)
//! 3. **Closing instruction**: the required output format, always last
//!
//! Each document is optional. Missing or blank files are silently skipped;
//! unreadable files are logged and skipped.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use decentra_config::ContextConfig;
use decentra_core::PromptMessage;
use tracing::{debug, error, warn};

/// The assistant's role description.
pub const PREAMBLE: &str = concat!(
    "You are a personal executive assistant for the user.\n\n",
    "When summarising content (e-mails, tweets, and other messages), surface insights ",
    "that align with the user's objectives, priorities, outlook, and methodology, ",
    "as described below.",
);

/// The output-format instruction closing every system prompt.
pub const CLOSING_INSTRUCTION: &str = concat!(
    "Provide the summary as a concise, actionable, and chronologically ordered Markdown ",
    "bullet list. Highlight key decisions, deadlines, and open questions. Use rich ",
    "formatting where helpful (e.g. `code` spans for dates, *italics* for emphasis).",
);

/// A named context document.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSection {
    /// File name relative to the context directory
    pub file: String,
    /// Heading shown in the prompt
    pub title: String,
}

impl ContextSection {
    pub fn new(file: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            title: title.into(),
        }
    }
}

/// The four default sections, in prompt order.
pub fn default_sections() -> Vec<ContextSection> {
    vec![
        ContextSection::new("objectives.yaml", "Objectives"),
        ContextSection::new("priorities.yaml", "Priorities"),
        ContextSection::new("the_future.yaml", "Outlook"),
        ContextSection::new("features_of_success.yaml", "Methodology"),
    ]
}

/// Builds the system prompt.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    dir: PathBuf,
    sections: Vec<ContextSection>,
    preamble_override: Option<String>,
}

impl ContextAssembler {
    /// Read the default sections from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sections: default_sections(),
            preamble_override: None,
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self {
            dir: config.resolved_dir(),
            sections: config
                .sections
                .iter()
                .map(|s| ContextSection::new(&s.file, &s.title))
                .collect(),
            preamble_override: config.system_prompt_override.clone(),
        }
    }

    pub fn with_sections(mut self, sections: Vec<ContextSection>) -> Self {
        self.sections = sections;
        self
    }

    /// Replace the built-in role preamble.
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble_override = Some(preamble.into());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Assemble the system prompt.
    pub fn assemble(&self) -> String {
        let preamble = self.preamble_override.as_deref().unwrap_or(PREAMBLE);
        let mut parts: Vec<String> = vec![preamble.to_string()];

        match self.load_sections() {
            Ok(sections) => parts.extend(sections),
            Err(e) => {
                error!(
                    dir = %self.dir.display(),
                    error = %e,
                    "Context directory unusable, assembling prompt without context"
                );
            }
        }

        parts.push(CLOSING_INSTRUCTION.to_string());
        parts.join("\n\n")
    }

    /// The system message for a verb invocation.
    pub fn system_message(&self) -> PromptMessage {
        PromptMessage::system(self.assemble())
    }

    /// Rendered `### {title}\n{text}` blocks for every readable, non-blank document.
    fn load_sections(&self) -> std::io::Result<Vec<String>> {
        if !self.dir.exists() {
            debug!(dir = %self.dir.display(), "No context directory, skipping sections");
            return Ok(Vec::new());
        }

        // Fails when the path is a file or not readable
        std::fs::read_dir(&self.dir)?;

        let mut rendered = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            let path = self.dir.join(&section.file);
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    let text = content.trim();
                    if text.is_empty() {
                        debug!(file = %path.display(), "Skipping blank context file");
                        continue;
                    }
                    debug!(file = %path.display(), "Loaded context file");
                    rendered.push(format!("### {}\n{}", section.title, text));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Failed to read context file");
                }
            }
        }

        Ok(rendered)
    }
}
