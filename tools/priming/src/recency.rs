use crate::errors::PrimingError;
use crate::logging::append_run_log;
use crate::runtime::{Clock, FileSystem};
use crate::script_ref::{is_valid_segment, ScriptRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

pub const RECENT_USAGE_VERSION: u32 = 1;
pub const DEFAULT_RECENT_CAPACITY: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentUsageRecord {
    pub script_ref: String,
    pub last_used_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecentUsageFile {
    version: u32,
    entries: Vec<RecentUsageRecord>,
}

/// One JSON file per agent, most-recent-first, capped at `capacity`.
///
/// Read-modify-write without cross-process exclusion: concurrent updates for
/// the same agent may lose an entry.
pub struct RecentUsageStore {
    dir: PathBuf,
    capacity: usize,
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
}

impl RecentUsageStore {
    pub fn new(
        dir: impl Into<PathBuf>,
        capacity: usize,
        fs: Arc<dyn FileSystem>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dir: dir.into(),
            capacity,
            fs,
            clock,
        }
    }

    pub fn path_for(&self, agent_id: &str) -> Result<PathBuf, PrimingError> {
        if !is_valid_segment(agent_id) || agent_id == "." || agent_id == ".." {
            return Err(PrimingError::Path(format!(
                "agent id `{agent_id}` must match [A-Za-z0-9._-]+"
            )));
        }
        Ok(self.dir.join(format!("{agent_id}.json")))
    }

    pub fn load(&self, agent_id: &str) -> Result<Vec<RecentUsageRecord>, PrimingError> {
        let path = self.path_for(agent_id)?;
        if !self.fs.exists(&path) {
            return Ok(Vec::new());
        }
        let raw = self.fs.read_to_string(&path)?;
        let file: RecentUsageFile = serde_json::from_str(&raw).map_err(|e| {
            PrimingError::Parse(format!("recent usage file {}: {e}", path.display()))
        })?;
        if file.version != RECENT_USAGE_VERSION {
            return Err(PrimingError::Parse(format!(
                "recent usage file {}: unsupported version {}",
                path.display(),
                file.version
            )));
        }
        let mut entries = Vec::with_capacity(file.entries.len());
        for entry in file.entries {
            if let Ok(script_ref) = ScriptRef::parse(&entry.script_ref) {
                insert_usage(
                    &mut entries,
                    &script_ref,
                    entry.last_used_at,
                    self.capacity,
                );
            }
        }
        Ok(entries)
    }

    /// Marks `refs` as used now and rewrites the agent's file.
    pub fn record_usage(
        &self,
        agent_id: &str,
        refs: &[ScriptRef],
    ) -> Result<Vec<RecentUsageRecord>, PrimingError> {
        let path = self.path_for(agent_id)?;
        let mut entries = self.load(agent_id)?;
        let now = self.clock.now_utc();
        for script_ref in refs {
            insert_usage(&mut entries, script_ref, now, self.capacity);
        }
        let rendered = serde_json::to_string_pretty(&RecentUsageFile {
            version: RECENT_USAGE_VERSION,
            entries: entries.clone(),
        })
        .map_err(|e| PrimingError::Io(e.to_string()))?;
        self.fs.write_atomic(&path, &rendered)?;
        append_run_log(
            "debug",
            "recency.updated",
            json!({
                "agent_id": agent_id,
                "recorded": refs.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "entry_count": entries.len(),
            }),
        );
        Ok(entries)
    }
}

/// Refreshes or adds `script_ref`, then re-sorts and prunes to `capacity`.
pub fn insert_usage(
    entries: &mut Vec<RecentUsageRecord>,
    script_ref: &ScriptRef,
    at: DateTime<Utc>,
    capacity: usize,
) {
    let key = script_ref.to_string();
    match entries.iter_mut().find(|entry| entry.script_ref == key) {
        Some(existing) => existing.last_used_at = existing.last_used_at.max(at),
        None => entries.push(RecentUsageRecord {
            script_ref: key,
            last_used_at: at,
        }),
    }
    entries.sort_by(|a, b| {
        b.last_used_at
            .cmp(&a.last_used_at)
            .then_with(|| a.script_ref.cmp(&b.script_ref))
    });
    entries.truncate(capacity);
}
