//! # Task Types
//!
//! A task is one unit of natural-language work. Each kind carries its own
//! typed input and output so that providers handle every kind exhaustively
//! instead of dispatching on strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kinds of work the orchestrator understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    LanguageDetection,
    Summarization,
    Rewrite,
    Translation,
    VocabularyAnalysis,
}

impl TaskKind {
    pub const ALL: [TaskKind; 5] = [
        TaskKind::LanguageDetection,
        TaskKind::Summarization,
        TaskKind::Rewrite,
        TaskKind::Translation,
        TaskKind::VocabularyAnalysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::LanguageDetection => "language_detection",
            TaskKind::Summarization => "summarization",
            TaskKind::Rewrite => "rewrite",
            TaskKind::Translation => "translation",
            TaskKind::VocabularyAnalysis => "vocabulary_analysis",
        }
    }

    /// Whether a long input of this kind can be split into sentence chunks
    /// and the per-chunk outputs concatenated
    pub fn is_chunkable(&self) -> bool {
        matches!(
            self,
            TaskKind::Summarization | TaskKind::Rewrite | TaskKind::Translation
        )
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writing style requested from a rewrite provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteStyle {
    Simpler,
    Formal,
    Casual,
    Shorter,
}

impl RewriteStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewriteStyle::Simpler => "simpler",
            RewriteStyle::Formal => "formal",
            RewriteStyle::Casual => "casual",
            RewriteStyle::Shorter => "shorter",
        }
    }
}

/// Typed task payload, one variant per [`TaskKind`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskInput {
    LanguageDetection {
        text: String,
    },
    Summarization {
        text: String,
        max_sentences: Option<u32>,
    },
    Rewrite {
        text: String,
        style: RewriteStyle,
    },
    Translation {
        text: String,
        source_language: Option<String>,
        target_language: String,
    },
    VocabularyAnalysis {
        text: String,
        learner_language: Option<String>,
    },
}

impl TaskInput {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskInput::LanguageDetection { .. } => TaskKind::LanguageDetection,
            TaskInput::Summarization { .. } => TaskKind::Summarization,
            TaskInput::Rewrite { .. } => TaskKind::Rewrite,
            TaskInput::Translation { .. } => TaskKind::Translation,
            TaskInput::VocabularyAnalysis { .. } => TaskKind::VocabularyAnalysis,
        }
    }

    /// Source text the task operates on
    pub fn text(&self) -> &str {
        match self {
            TaskInput::LanguageDetection { text }
            | TaskInput::Summarization { text, .. }
            | TaskInput::Rewrite { text, .. }
            | TaskInput::Translation { text, .. }
            | TaskInput::VocabularyAnalysis { text, .. } => text,
        }
    }

    /// Same task parameters applied to different text
    pub fn with_text(&self, text: impl Into<String>) -> TaskInput {
        let text = text.into();
        match self {
            TaskInput::LanguageDetection { .. } => TaskInput::LanguageDetection { text },
            TaskInput::Summarization { max_sentences, .. } => TaskInput::Summarization {
                text,
                max_sentences: *max_sentences,
            },
            TaskInput::Rewrite { style, .. } => TaskInput::Rewrite {
                text,
                style: *style,
            },
            TaskInput::Translation {
                source_language,
                target_language,
                ..
            } => TaskInput::Translation {
                text,
                source_language: source_language.clone(),
                target_language: target_language.clone(),
            },
            TaskInput::VocabularyAnalysis {
                learner_language, ..
            } => TaskInput::VocabularyAnalysis {
                text,
                learner_language: learner_language.clone(),
            },
        }
    }

    /// Parameter component of the cache key; two inputs with the same text
    /// and kind but different parameters must not share a cache entry
    pub fn cache_parameter(&self) -> String {
        match self {
            TaskInput::LanguageDetection { .. } => "default".to_string(),
            TaskInput::Summarization { max_sentences, .. } => match max_sentences {
                Some(n) => format!("max_sentences={n}"),
                None => "default".to_string(),
            },
            TaskInput::Rewrite { style, .. } => style.as_str().to_string(),
            TaskInput::Translation {
                source_language,
                target_language,
                ..
            } => format!(
                "{}->{}",
                source_language.as_deref().unwrap_or("auto"),
                target_language
            ),
            TaskInput::VocabularyAnalysis {
                learner_language, ..
            } => learner_language
                .clone()
                .unwrap_or_else(|| "default".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedLanguage {
    /// BCP-47 language tag
    pub language: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub word: String,
    pub lemma: Option<String>,
    pub difficulty: Option<String>,
    pub definition: Option<String>,
}

/// Typed task result, one variant per [`TaskKind`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOutput {
    LanguageDetection(DetectedLanguage),
    Summarization {
        summary: String,
    },
    Rewrite {
        text: String,
    },
    Translation {
        text: String,
        detected_source_language: Option<String>,
    },
    VocabularyAnalysis {
        entries: Vec<VocabularyEntry>,
    },
}

impl TaskOutput {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskOutput::LanguageDetection(_) => TaskKind::LanguageDetection,
            TaskOutput::Summarization { .. } => TaskKind::Summarization,
            TaskOutput::Rewrite { .. } => TaskKind::Rewrite,
            TaskOutput::Translation { .. } => TaskKind::Translation,
            TaskOutput::VocabularyAnalysis { .. } => TaskKind::VocabularyAnalysis,
        }
    }

    /// Primary text of a text-producing output
    pub fn text(&self) -> Option<&str> {
        match self {
            TaskOutput::Summarization { summary } => Some(summary),
            TaskOutput::Rewrite { text } | TaskOutput::Translation { text, .. } => Some(text),
            TaskOutput::LanguageDetection(_) | TaskOutput::VocabularyAnalysis { .. } => None,
        }
    }
}

/// One immutable unit of work submitted by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub input: TaskInput,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(input: TaskInput) -> Self {
        Self {
            id: Uuid::new_v4(),
            input,
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.input.kind()
    }
}

/// Plain text handed to the orchestrator by the content collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentSource {
    pub text: String,
    /// Language declared by the document or detected upstream
    pub declared_language: Option<String>,
}

impl ContentSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            declared_language: None,
        }
    }

    pub fn with_declared_language(mut self, language: impl Into<String>) -> Self {
        self.declared_language = Some(language.into());
        self
    }
}
