//! Saves one course of a dialog as an individual priming script.

use crate::catalog::{ScriptCatalog, ScriptSummary};
use crate::dialog::{find_dialog, DialogEventStore};
use crate::document::{ScriptDocument, SourceDialog};
use crate::errors::PrimingError;
use crate::logging::append_run_log;
use crate::record::ReplayRecord;
use crate::runtime::Clock;
use crate::script_ref::ScriptRef;
use crate::serialize::serialize_document;
use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOutcome {
    pub summary: ScriptSummary,
    pub message_count: usize,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ExportRequest<'a> {
    pub dialog_id: &'a str,
    pub course: u32,
    pub slug: &'a str,
    pub overwrite: bool,
}

/// Writes `individual/<owner>/<slug>.md` from the course's persisted records.
/// The owner is the agent that owns the dialog.
pub fn save_course_as_script(
    catalog: &ScriptCatalog,
    store: &dyn DialogEventStore,
    clock: &dyn Clock,
    request: &ExportRequest<'_>,
) -> Result<ExportOutcome, PrimingError> {
    if request.course == 0 {
        return Err(PrimingError::Validation(
            "course numbers start at 1".to_string(),
        ));
    }
    let (status, metadata) = find_dialog(store, request.dialog_id)?;
    let script_ref = ScriptRef::individual(&metadata.agent_id, request.slug)?;
    let path = script_ref.resolve(catalog.root())?;
    let fs = catalog.file_system();
    if fs.exists(&path) && !request.overwrite {
        return Err(PrimingError::ScriptExists(script_ref.to_string()));
    }

    let records = store
        .read_course_events(request.dialog_id, request.course, status)?
        .into_iter()
        .map(|event| ReplayRecord::parsed(event.body))
        .collect::<Vec<_>>();
    if records.is_empty() {
        return Err(PrimingError::Validation(format!(
            "course {} of dialog {} has no records to export",
            request.course, request.dialog_id
        )));
    }
    let message_count = records.len();

    let mut document = ScriptDocument::new(records);
    document.title = Some(format!(
        "{} course {}",
        request.dialog_id, request.course
    ));
    document.owner_agent_id = Some(metadata.agent_id.clone());
    document.generated_at = Some(
        clock
            .now_utc()
            .to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    document.source_dialog = Some(SourceDialog {
        dialog_id: request.dialog_id.to_string(),
        course: request.course,
    });

    let rendered = serialize_document(&document)?;
    fs.write_atomic(&path, &rendered)?;
    let summary = catalog.read_script(&script_ref)?.summary;

    append_run_log(
        "info",
        "export.completed",
        json!({
            "dialog_id": request.dialog_id,
            "course": request.course,
            "status": status.as_str(),
            "script_ref": script_ref.to_string(),
            "message_count": message_count,
            "overwrite": request.overwrite,
        }),
    );
    Ok(ExportOutcome {
        summary,
        message_count,
        path,
    })
}
