use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::languages::repo::Language;

use super::repo::Snippet;

/// Raw create/edit input. Every field defaults so a partial submission
/// still deserializes and comes back with validation errors instead of a 400.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnippetPayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Language slug, resolved against the registry before validation.
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub public: bool,
}

/// Per-field validation messages, serialized as `{"field": ["message", ...]}`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: &str) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A payload that passed validation, with the language resolved.
#[derive(Debug)]
pub struct ValidSnippet {
    pub name: String,
    pub description: String,
    pub body: String,
    pub language: Language,
    pub public: bool,
}

impl SnippetPayload {
    /// Checks the payload against the resolved language. Name and body must be
    /// non-blank; the body itself is stored exactly as submitted.
    pub fn validate(&self, language: Option<&Language>) -> Result<ValidSnippet, FieldErrors> {
        let mut errors = FieldErrors::default();

        let name = self.name.trim();
        if name.is_empty() {
            errors.add("name", "This field is required.");
        }
        if self.body.trim().is_empty() {
            errors.add("body", "This field is required.");
        }
        if self.language.trim().is_empty() {
            errors.add("language", "This field is required.");
        } else if language.is_none() {
            errors.add("language", "Select a valid language.");
        }

        match language {
            Some(language) if errors.is_empty() => Ok(ValidSnippet {
                name: name.to_string(),
                description: self.description.trim().to_string(),
                body: self.body.clone(),
                language: language.clone(),
                public: self.public,
            }),
            _ => Err(errors),
        }
    }
}

impl From<&Snippet> for SnippetPayload {
    fn from(snippet: &Snippet) -> Self {
        Self {
            name: snippet.name.clone(),
            description: snippet.description.clone(),
            language: snippet.language.slug.clone(),
            body: snippet.body.clone(),
            public: snippet.public,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageOption {
    pub name: String,
    pub slug: String,
}

impl From<&Language> for LanguageOption {
    fn from(language: &Language) -> Self {
        Self {
            name: language.name.clone(),
            slug: language.slug.clone(),
        }
    }
}

/// Form view-model returned by `GET /snippets/new`, the edit form, and any
/// rejected submission: the submitted values, the errors, and the choices.
#[derive(Debug, Serialize)]
pub struct SnippetForm {
    pub action: &'static str,
    pub values: SnippetPayload,
    pub errors: FieldErrors,
    pub languages: Vec<LanguageOption>,
}

impl SnippetForm {
    pub fn create(values: SnippetPayload, errors: FieldErrors, languages: Vec<LanguageOption>) -> Self {
        Self {
            action: "create",
            values,
            errors,
            languages,
        }
    }

    pub fn edit(values: SnippetPayload, errors: FieldErrors, languages: Vec<LanguageOption>) -> Self {
        Self {
            action: "edit",
            values,
            errors,
            languages,
        }
    }
}

/// List entry for the feed and the per-user/per-language listings.
/// Deliberately body-free; listings stay light.
#[derive(Debug, Serialize)]
pub struct SnippetListItem {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub owner: String,
    pub language: LanguageOption,
    pub public: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Snippet> for SnippetListItem {
    fn from(snippet: Snippet) -> Self {
        Self {
            id: snippet.id,
            name: snippet.name,
            description: snippet.description,
            owner: snippet.owner.username,
            language: LanguageOption::from(&snippet.language),
            public: snippet.public,
            created_at: snippet.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SnippetDetail {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub owner: String,
    pub language: LanguageOption,
    pub public: bool,
    pub body: String,
    /// Line-numbered HTML rendering of the body.
    pub highlighted: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl SnippetDetail {
    pub fn new(snippet: Snippet, highlighted: String) -> Self {
        Self {
            id: snippet.id,
            name: snippet.name,
            description: snippet.description,
            owner: snippet.owner.username,
            language: LanguageOption::from(&snippet.language),
            public: snippet.public,
            body: snippet.body,
            highlighted,
            created_at: snippet.created_at,
            updated_at: snippet.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rust() -> Language {
        Language {
            id: Uuid::new_v4(),
            name: "Rust".into(),
            slug: "rust".into(),
            lexer: "Rust".into(),
        }
    }

    #[test]
    fn empty_payload_fails_every_required_field() {
        let payload = SnippetPayload::default();
        let errors = payload.validate(None).expect_err("must fail");

        let value = serde_json::to_value(&errors).expect("serialize");
        assert_eq!(value["name"][0], "This field is required.");
        assert_eq!(value["body"][0], "This field is required.");
        assert_eq!(value["language"][0], "This field is required.");
    }

    #[test]
    fn unresolved_language_is_the_only_complaint() {
        let payload = SnippetPayload {
            name: "hello".into(),
            language: "klingon".into(),
            body: "print hi".into(),
            ..Default::default()
        };
        let errors = payload.validate(None).expect_err("must fail");

        let value = serde_json::to_value(&errors).expect("serialize");
        assert_eq!(value["language"][0], "Select a valid language.");
        assert!(value.get("name").is_none());
        assert!(value.get("body").is_none());
    }

    #[test]
    fn valid_payload_trims_name_but_keeps_body_exact() {
        let language = rust();
        let payload = SnippetPayload {
            name: "  hello  ".into(),
            description: " greets the world ".into(),
            language: "rust".into(),
            body: "fn main() {}\n".into(),
            public: true,
        };

        let valid = payload.validate(Some(&language)).expect("valid");
        assert_eq!(valid.name, "hello");
        assert_eq!(valid.description, "greets the world");
        assert_eq!(valid.body, "fn main() {}\n");
        assert_eq!(valid.language.slug, "rust");
        assert!(valid.public);
    }

    #[test]
    fn blank_body_is_rejected_even_when_whitespace() {
        let language = rust();
        let payload = SnippetPayload {
            name: "hello".into(),
            language: "rust".into(),
            body: "   \n\t".into(),
            ..Default::default()
        };

        let errors = payload.validate(Some(&language)).expect_err("must fail");
        let value = serde_json::to_value(&errors).expect("serialize");
        assert_eq!(value["body"][0], "This field is required.");
    }

    #[test]
    fn payload_prefills_from_a_snippet() {
        use crate::snippets::repo::{Snippet, SnippetOwner};
        let now = OffsetDateTime::now_utc();
        let snippet = Snippet {
            id: Uuid::new_v4(),
            owner: SnippetOwner {
                id: Uuid::new_v4(),
                username: "ada".into(),
            },
            language: rust(),
            name: "hello".into(),
            description: "greets".into(),
            body: "fn main() {}".into(),
            public: false,
            created_at: now,
            updated_at: now,
        };

        let payload = SnippetPayload::from(&snippet);
        assert_eq!(payload.name, "hello");
        assert_eq!(payload.language, "rust");
        assert!(!payload.public);
    }
}
