use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::point::RecordId;

/// Payload keys stamped and maintained by the repository.
///
/// Callers cannot set them through `RecordPayload.extra`: they are stripped
/// from every inbound payload before a write.
pub const RESERVED_KEYS: [&str; 3] = ["ownerId", "timestamp", "views"];

/// The closed set of caller roles driving the visibility rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "superAdmin")]
    SuperAdmin,
    #[serde(rename = "Admin")]
    Admin,
    #[serde(rename = "User")]
    User,
}

impl Role {
    /// Privileged roles see every owner's records and may mutate any of them
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }
}

/// The authenticated caller, as established by the upstream boundary layer
/// (session token or api key, out of scope here)
#[derive(Debug, Clone, Copy)]
pub struct AccessContext {
    pub owner_id: i64,
    pub role: Role,
}

impl AccessContext {
    pub fn new(owner_id: i64, role: Role) -> Self {
        Self { owner_id, role }
    }
}

/// The payload text a collection's embeddings are computed from.
///
/// Most collections embed a single field; `Skills` composes its text from the
/// title and the names in the `skills` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticField {
    Content,
    Title,
    Description,
    Message,
    Code,
    Skills,
}

impl SemanticField {
    pub fn name(&self) -> &'static str {
        match self {
            SemanticField::Content => "content",
            SemanticField::Title => "title",
            SemanticField::Description => "description",
            SemanticField::Message => "message",
            SemanticField::Code => "code",
            SemanticField::Skills => "skills",
        }
    }

    /// The semantic text of a payload, if present and non-empty after trimming
    pub fn extract<'a>(&self, payload: &'a RecordPayload) -> Option<Cow<'a, str>> {
        let value = match self {
            SemanticField::Content => payload.content.as_deref(),
            SemanticField::Title => payload.title.as_deref(),
            SemanticField::Description => payload.description.as_deref(),
            SemanticField::Message => payload.message.as_deref(),
            SemanticField::Code => payload.code.as_deref(),
            SemanticField::Skills => return skills_text(payload).map(Cow::Owned),
        };
        value
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(Cow::Borrowed)
    }
}

/// `"{title}: {name, name, ...}"` over the payload's `skills` list
fn skills_text(payload: &RecordPayload) -> Option<String> {
    let title = payload
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())?;
    let names: Vec<&str> = payload
        .extra
        .get("skills")?
        .as_array()?
        .iter()
        .filter_map(|skill| skill.get("name").and_then(Value::as_str))
        .collect();
    if names.is_empty() {
        return None;
    }
    Some(format!("{}: {}", title, names.join(", ")))
}

/// A domain record's caller-writable fields.
///
/// The recognized fields cover what every resource type shares; anything else
/// a caller sends is routed into the `extra` map instead of landing at the
/// payload's top level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RecordPayload {
    /// Removes repository-maintained keys a caller tried to smuggle in
    pub fn strip_reserved(&mut self) {
        for key in RESERVED_KEYS {
            self.extra.remove(key);
        }
    }

    /// Shallow merge: fields present in `partial` override, absent fields are
    /// preserved. `extra` merges per key.
    pub fn merged_with(&self, partial: &RecordPayload) -> RecordPayload {
        let mut extra = self.extra.clone();
        for (key, value) in &partial.extra {
            extra.insert(key.clone(), value.clone());
        }

        RecordPayload {
            category: partial.category.clone().or_else(|| self.category.clone()),
            title: partial.title.clone().or_else(|| self.title.clone()),
            content: partial.content.clone().or_else(|| self.content.clone()),
            description: partial
                .description
                .clone()
                .or_else(|| self.description.clone()),
            message: partial.message.clone().or_else(|| self.message.clone()),
            code: partial.code.clone().or_else(|| self.code.clone()),
            tags: partial.tags.clone().or_else(|| self.tags.clone()),
            extra,
        }
    }
}

/// What repository reads return: the caller-writable payload plus the
/// repository-maintained fields
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(rename = "ownerId", skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<i64>,
    #[serde(rename = "timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views: Option<Vec<DateTime<Utc>>>,
    #[serde(flatten)]
    pub payload: RecordPayload,
}
