//! Turning a language-model reply into a recipe draft.
//!
//! Replies are asked to carry a JSON object with `name`, `ingredients` and
//! `instructions`. Models wrap it in prose or code fences often enough that
//! the object is searched for rather than expected verbatim.

use serde::Deserialize;
use thiserror::Error;

pub const MAX_NAME_CHARS: usize = 80;
pub const MAX_INSTRUCTIONS_CHARS: usize = 4000;

/// A recipe ready to be saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeDraft {
    pub name: String,
    pub ingredients: String,
    pub instructions: String,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("reply contains no JSON object")]
    NoJsonObject,

    #[error("reply JSON is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("recipe field {0} is empty")]
    EmptyField(&'static str),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrList {
    Text(String),
    List(Vec<String>),
}

impl TextOrList {
    fn join(self, separator: &str) -> String {
        match self {
            TextOrList::Text(text) => text.trim().to_string(),
            TextOrList::List(items) => items
                .iter()
                .map(|item| item.trim())
                .filter(|item| !item.is_empty())
                .collect::<Vec<_>>()
                .join(separator),
        }
    }
}

#[derive(Deserialize)]
struct RawDraft {
    name: String,
    ingredients: TextOrList,
    instructions: TextOrList,
}

/// Extracts the recipe JSON object from a reply.
pub fn parse_recipe_reply(reply: &str) -> Result<RecipeDraft, ParseError> {
    let start = reply.find('{').ok_or(ParseError::NoJsonObject)?;
    let end = reply.rfind('}').ok_or(ParseError::NoJsonObject)?;
    if end < start {
        return Err(ParseError::NoJsonObject);
    }

    let raw: RawDraft = serde_json::from_str(&reply[start..=end])?;
    let draft = RecipeDraft {
        name: raw.name.trim().to_string(),
        ingredients: raw.ingredients.join(", "),
        instructions: raw.instructions.join("\n"),
    };

    if draft.name.is_empty() {
        return Err(ParseError::EmptyField("name"));
    }
    if draft.instructions.is_empty() {
        return Err(ParseError::EmptyField("instructions"));
    }
    Ok(draft)
}

/// Draft derived from free text: the first non-blank line names the recipe
/// and the whole reply becomes the instructions.
pub fn fallback_draft(reply: &str) -> RecipeDraft {
    let text = reply.trim();
    let first_line = text
        .lines()
        .map(|line| line.trim().trim_start_matches('#').trim())
        .find(|line| !line.is_empty())
        .unwrap_or("Untitled recipe");

    RecipeDraft {
        name: truncate_chars(first_line, MAX_NAME_CHARS),
        ingredients: String::new(),
        instructions: truncate_chars(text, MAX_INSTRUCTIONS_CHARS),
    }
}

/// Parses the reply, falling back to [`fallback_draft`] with a warning.
pub fn draft_from_reply(reply: &str) -> RecipeDraft {
    match parse_recipe_reply(reply) {
        Ok(draft) => draft,
        Err(e) => {
            tracing::warn!(error = %e, "reply is not a structured recipe, saving truncated text");
            fallback_draft(reply)
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
