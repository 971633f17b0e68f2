//! Discovers, filters, and loads priming scripts under a script root.

use crate::document::{parse_script_document, ScriptDocument};
use crate::errors::PrimingError;
use crate::logging::append_run_log;
use crate::recency::RecentUsageStore;
use crate::runtime::FileSystem;
use crate::script_ref::{ScriptRef, ScriptScope};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Scope, slug, and owner come from the path; title and `updated_at` from
/// the parsed document and the file's mtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptSummary {
    #[serde(rename = "ref")]
    pub script_ref: String,
    pub scope: ScriptScope,
    pub slug: String,
    pub title: Option<String>,
    pub path: PathBuf,
    pub updated_at: DateTime<Utc>,
    pub owner_agent_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoadedScript {
    pub script_ref: ScriptRef,
    pub summary: ScriptSummary,
    pub document: ScriptDocument,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptListing {
    pub recent: Vec<ScriptSummary>,
    pub individual: Vec<ScriptSummary>,
    pub team_shared: Vec<ScriptSummary>,
    pub warnings: Vec<String>,
}

pub struct ScriptCatalog {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    recency: RecentUsageStore,
    default_search_limit: usize,
}

impl ScriptCatalog {
    pub fn new(
        root: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
        recency: RecentUsageStore,
        default_search_limit: usize,
    ) -> Self {
        Self {
            root: root.into(),
            fs,
            recency,
            default_search_limit,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn recency(&self) -> &RecentUsageStore {
        &self.recency
    }

    pub fn file_system(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    pub fn resolve(&self, raw: &str) -> Result<(ScriptRef, PathBuf), PrimingError> {
        let script_ref = ScriptRef::parse(raw)?;
        let path = script_ref.resolve(&self.root)?;
        Ok((script_ref, path))
    }

    /// Reads and parses a script without checking who may use it.
    pub fn read_script(&self, script_ref: &ScriptRef) -> Result<LoadedScript, PrimingError> {
        let path = script_ref.resolve(&self.root)?;
        if !self.fs.exists(&path) {
            return Err(PrimingError::ScriptNotFound(script_ref.to_string()));
        }
        let raw = self.fs.read_to_string(&path)?;
        let document =
            parse_script_document(&raw).map_err(|e| e.in_script(&script_ref.to_string()))?;
        let updated_at = DateTime::<Utc>::from(self.fs.modified(&path)?);
        Ok(LoadedScript {
            summary: summarize(script_ref, &document, path, updated_at),
            script_ref: script_ref.clone(),
            document,
        })
    }

    /// Resolves, reads, and checks applicability for `agent_id`.
    pub fn load_script(&self, raw_ref: &str, agent_id: &str) -> Result<LoadedScript, PrimingError> {
        let (script_ref, _) = self.resolve(raw_ref)?;
        let loaded = self.read_script(&script_ref)?;
        if !is_applicable(&loaded.script_ref, &loaded.document, agent_id) {
            return Err(PrimingError::ScriptNotApplicable {
                script_ref: script_ref.to_string(),
                agent_id: agent_id.to_string(),
            });
        }
        Ok(loaded)
    }

    /// Every parseable script under the root, plus a warning per skipped file.
    pub fn discover(&self) -> Result<(Vec<LoadedScript>, Vec<String>), PrimingError> {
        let mut scripts = Vec::new();
        let mut skipped = Vec::new();
        for path in self.fs.list_files(&self.root)? {
            let Some(script_ref) = ScriptRef::from_path(&self.root, &path) else {
                continue;
            };
            match self.read_script(&script_ref) {
                Ok(loaded) => scripts.push(loaded),
                Err(error) => {
                    append_run_log(
                        "warn",
                        "catalog.discover.skipped",
                        json!({
                            "path": path.display().to_string(),
                            "error": error.to_string(),
                        }),
                    );
                    skipped.push(format!("{script_ref}: {error}"));
                }
            }
        }
        append_run_log(
            "debug",
            "catalog.discover.completed",
            json!({
                "root": self.root.display().to_string(),
                "script_count": scripts.len(),
                "skipped_count": skipped.len(),
            }),
        );
        Ok((scripts, skipped))
    }

    pub fn list_applicable_scripts(&self, agent_id: &str) -> Result<ScriptListing, PrimingError> {
        let (scripts, skipped) = self.discover()?;
        let mut listing = ScriptListing {
            warnings: skipped,
            ..ScriptListing::default()
        };
        for loaded in scripts
            .into_iter()
            .filter(|loaded| is_applicable(&loaded.script_ref, &loaded.document, agent_id))
        {
            match loaded.summary.scope {
                ScriptScope::Individual => listing.individual.push(loaded.summary),
                ScriptScope::TeamShared => listing.team_shared.push(loaded.summary),
            }
        }
        rank(&mut listing.individual);
        rank(&mut listing.team_shared);

        let (recent, warnings) = self.recent_scripts(agent_id);
        listing.recent = recent;
        listing.warnings.extend(warnings);
        Ok(listing)
    }

    /// Rebuilds the recency list, silently dropping scripts that are gone or
    /// no longer applicable and reporting every other failure as a warning.
    pub fn recent_scripts(&self, agent_id: &str) -> (Vec<ScriptSummary>, Vec<String>) {
        let entries = match self.recency.load(agent_id) {
            Ok(entries) => entries,
            Err(error) => return (Vec::new(), vec![format!("recent usage: {error}")]),
        };
        let mut recent = Vec::new();
        let mut warnings = Vec::new();
        for entry in entries {
            match self.load_script(&entry.script_ref, agent_id) {
                Ok(loaded) => recent.push(loaded.summary),
                Err(error) if error.is_skippable_load_failure() => {}
                Err(error) => {
                    append_run_log(
                        "warn",
                        "catalog.recent.warning",
                        json!({
                            "agent_id": agent_id,
                            "script_ref": entry.script_ref,
                            "error": error.to_string(),
                        }),
                    );
                    warnings.push(format!("{}: {error}", entry.script_ref));
                }
            }
        }
        (recent, warnings)
    }

    /// Case-insensitive substring search over slug, ref, and title.
    pub fn search_scripts(
        &self,
        agent_id: &str,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ScriptSummary>, PrimingError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let (scripts, _) = self.discover()?;
        let mut hits = scripts
            .into_iter()
            .filter(|loaded| is_applicable(&loaded.script_ref, &loaded.document, agent_id))
            .map(|loaded| loaded.summary)
            .filter(|summary| matches_query(summary, &needle))
            .collect::<Vec<_>>();
        rank(&mut hits);
        hits.truncate(limit.unwrap_or(self.default_search_limit));
        Ok(hits)
    }
}

pub fn is_applicable(script_ref: &ScriptRef, document: &ScriptDocument, agent_id: &str) -> bool {
    match script_ref.scope() {
        ScriptScope::Individual => script_ref.applies_to_owner(agent_id),
        ScriptScope::TeamShared => document.allows_member(agent_id),
    }
}

pub fn summarize(
    script_ref: &ScriptRef,
    document: &ScriptDocument,
    path: PathBuf,
    updated_at: DateTime<Utc>,
) -> ScriptSummary {
    ScriptSummary {
        script_ref: script_ref.to_string(),
        scope: script_ref.scope(),
        slug: script_ref.slug(),
        title: document.title.clone(),
        path,
        updated_at,
        owner_agent_id: script_ref.owner_agent_id().map(str::to_string),
    }
}

fn matches_query(summary: &ScriptSummary, needle: &str) -> bool {
    summary.slug.to_lowercase().contains(needle)
        || summary.script_ref.to_lowercase().contains(needle)
        || summary
            .title
            .as_deref()
            .is_some_and(|title| title.to_lowercase().contains(needle))
}

/// Most recently updated first, then ref ascending.
pub fn rank(summaries: &mut [ScriptSummary]) {
    summaries.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.script_ref.cmp(&b.script_ref))
    });
}
