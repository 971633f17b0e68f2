use crate::errors::PrimingError;
use crate::frontmatter::{json_kind, split_frontmatter};
use crate::normalize::normalize_block;
use crate::record::ReplayRecord;
use crate::scanner::scan_blocks;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub const SCRIPT_KIND: &str = "priming_script";
pub const SCRIPT_FORMAT_VERSION: u64 = 1;

/// Where an exported script's records came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDialog {
    pub dialog_id: String,
    pub course: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptDocument {
    pub title: Option<String>,
    /// Team-shared allow-list; `None` or empty applies to every agent.
    pub applicable_member_ids: Option<BTreeSet<String>>,
    pub owner_agent_id: Option<String>,
    pub generated_at: Option<String>,
    pub source_dialog: Option<SourceDialog>,
    /// Never empty; order is replay order.
    pub records: Vec<ReplayRecord>,
}

impl ScriptDocument {
    pub fn new(records: Vec<ReplayRecord>) -> Self {
        Self {
            title: None,
            applicable_member_ids: None,
            owner_agent_id: None,
            generated_at: None,
            source_dialog: None,
            records,
        }
    }

    pub fn allows_member(&self, agent_id: &str) -> bool {
        match &self.applicable_member_ids {
            Some(ids) if !ids.is_empty() => ids.contains(agent_id),
            _ => true,
        }
    }

    /// Document-level frontmatter in rendering order.
    pub fn header_map(&self) -> Map<String, Value> {
        let mut meta = Map::new();
        meta.insert("kind".to_string(), Value::from(SCRIPT_KIND));
        meta.insert("version".to_string(), Value::from(SCRIPT_FORMAT_VERSION));
        if let Some(title) = &self.title {
            meta.insert("title".to_string(), Value::from(title.clone()));
        }
        if let Some(ids) = &self.applicable_member_ids {
            meta.insert(
                "applicableMemberIds".to_string(),
                Value::from(ids.iter().cloned().collect::<Vec<_>>()),
            );
        }
        if let Some(owner) = &self.owner_agent_id {
            meta.insert("ownerAgentId".to_string(), Value::from(owner.clone()));
        }
        if let Some(generated_at) = &self.generated_at {
            meta.insert("generatedAt".to_string(), Value::from(generated_at.clone()));
        }
        if let Some(source) = &self.source_dialog {
            let mut value = Map::new();
            value.insert("dialogId".to_string(), Value::from(source.dialog_id.clone()));
            value.insert("course".to_string(), Value::from(source.course));
            meta.insert("sourceDialog".to_string(), Value::Object(value));
        }
        meta
    }
}

/// Parses and validates a whole priming script.
pub fn parse_script_document(raw: &str) -> Result<ScriptDocument, PrimingError> {
    let split = split_frontmatter(raw)?;
    let meta = &split.meta;

    let blocks = scan_blocks(&split.body)?;
    let records = blocks
        .iter()
        .map(normalize_block)
        .collect::<Result<Vec<_>, _>>()?;

    check_header(meta)?;
    Ok(ScriptDocument {
        title: optional_string(meta, "title")?,
        applicable_member_ids: member_ids(meta)?,
        owner_agent_id: optional_string(meta, "ownerAgentId")?,
        generated_at: optional_string(meta, "generatedAt")?,
        source_dialog: source_dialog(meta)?,
        records,
    })
}

fn check_header(meta: &Map<String, Value>) -> Result<(), PrimingError> {
    if let Some(kind) = meta.get("kind").filter(|v| !v.is_null()) {
        if kind.as_str() != Some(SCRIPT_KIND) {
            return Err(PrimingError::Validation(format!(
                "script.kind must be {SCRIPT_KIND}"
            )));
        }
    }
    if let Some(version) = meta.get("version").filter(|v| !v.is_null()) {
        if version.as_u64() != Some(SCRIPT_FORMAT_VERSION) {
            return Err(PrimingError::Validation(format!(
                "script.version {version} is not supported (expected {SCRIPT_FORMAT_VERSION})"
            )));
        }
    }
    Ok(())
}

fn optional_string(meta: &Map<String, Value>, key: &str) -> Result<Option<String>, PrimingError> {
    match meta.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(other) => Err(PrimingError::Validation(format!(
            "script.{key} must be a string, got {}",
            json_kind(other)
        ))),
    }
}

/// Accepts a list of strings or a single string.
fn member_ids(meta: &Map<String, Value>) -> Result<Option<BTreeSet<String>>, PrimingError> {
    let invalid = || {
        PrimingError::Validation("script.applicableMemberIds must be a list of strings".to_string())
    };
    match meta.get("applicableMemberIds") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(BTreeSet::from([id.trim().to_string()]))),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(|s| s.trim().to_string()).ok_or_else(invalid))
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Some),
        Some(_) => Err(invalid()),
    }
}

fn source_dialog(meta: &Map<String, Value>) -> Result<Option<SourceDialog>, PrimingError> {
    match meta.get("sourceDialog") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
            PrimingError::Validation(format!("script.sourceDialog is invalid: {e}"))
        }),
    }
}
