//! Replays priming scripts into a live dialog.

use crate::catalog::{LoadedScript, ScriptCatalog};
use crate::dialog::{ChatMessage, DialogEventStore, LiveDialog};
use crate::errors::PrimingError;
use crate::logging::append_run_log;
use crate::record::PRIMING_SOURCE_TAG;
use crate::remap::SeqRemapper;
use crate::runtime::Clock;
use crate::script_ref::ScriptRef;
use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub applied_refs: Vec<String>,
    pub appended_message_count: usize,
    pub persisted_record_count: usize,
    /// Problems that did not undo the replay, such as a failed recency update.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Loads every script in `refs` up front, then persists their records in
/// order with remapped sequence numbers.
///
/// Any load failure aborts before the first append. A store failure aborts
/// the rest of the batch; records persisted before it stay persisted, the
/// dialog's high-water mark covers them, and the recency list is left
/// unchanged. Once every record is persisted, a recency failure is reported
/// in `warnings` instead of failing the call.
pub fn apply_scripts(
    catalog: &ScriptCatalog,
    store: &dyn DialogEventStore,
    clock: &dyn Clock,
    dialog: &mut dyn LiveDialog,
    agent_id: &str,
    refs: &[String],
) -> Result<ApplyOutcome, PrimingError> {
    if refs.is_empty() {
        return Err(PrimingError::Validation(
            "apply requires at least one script ref".to_string(),
        ));
    }
    append_run_log(
        "info",
        "apply.started",
        json!({
            "dialog_id": dialog.dialog_id(),
            "agent_id": agent_id,
            "refs": refs,
            "max_genseq": dialog.max_genseq(),
        }),
    );

    let scripts = match load_all(catalog, agent_id, refs) {
        Ok(scripts) => scripts,
        Err(error) => {
            log_abort(dialog.dialog_id(), "load", 0, &error);
            return Err(error);
        }
    };

    let mut remapper = SeqRemapper::after(dialog.max_genseq());
    let mut outcome = ApplyOutcome {
        applied_refs: Vec::with_capacity(scripts.len()),
        appended_message_count: 0,
        persisted_record_count: 0,
        warnings: Vec::new(),
    };
    for script in &scripts {
        for mut record in remapper.remap_script(&script.document.records) {
            record.ts = clock
                .now_utc()
                .to_rfc3339_opts(SecondsFormat::Millis, true);
            record.source_tag = Some(PRIMING_SOURCE_TAG.to_string());
            if let Err(error) = store.append_event(dialog.dialog_id(), &record, dialog.status()) {
                log_abort(
                    dialog.dialog_id(),
                    "persist",
                    outcome.applied_refs.len(),
                    &error,
                );
                return Err(error);
            }
            outcome.persisted_record_count += 1;
            if let Some(genseq) = record.body.sequence_number() {
                dialog.advance_genseq(genseq);
            }
            if let Some(message) = ChatMessage::project(&record) {
                dialog.push_message(message);
                outcome.appended_message_count += 1;
            }
        }
        outcome.applied_refs.push(script.script_ref.to_string());
        append_run_log(
            "debug",
            "apply.script.persisted",
            json!({
                "dialog_id": dialog.dialog_id(),
                "script_ref": script.script_ref.to_string(),
                "record_count": script.document.records.len(),
            }),
        );
    }

    let applied = scripts
        .iter()
        .map(|script| script.script_ref.clone())
        .collect::<Vec<ScriptRef>>();
    if let Err(error) = catalog.recency().record_usage(agent_id, &applied) {
        append_run_log(
            "warn",
            "recency.warning",
            json!({
                "agent_id": agent_id,
                "error": error.to_string(),
            }),
        );
        outcome
            .warnings
            .push(format!("recent usage not updated: {error}"));
    }

    append_run_log(
        "info",
        "apply.completed",
        json!({
            "dialog_id": dialog.dialog_id(),
            "applied_refs": outcome.applied_refs,
            "persisted_record_count": outcome.persisted_record_count,
            "appended_message_count": outcome.appended_message_count,
            "max_genseq": dialog.max_genseq(),
        }),
    );
    Ok(outcome)
}

fn load_all(
    catalog: &ScriptCatalog,
    agent_id: &str,
    refs: &[String],
) -> Result<Vec<LoadedScript>, PrimingError> {
    refs.iter()
        .map(|raw| catalog.load_script(raw, agent_id))
        .collect()
}

fn log_abort(dialog_id: &str, phase: &str, persisted_scripts: usize, error: &PrimingError) {
    append_run_log(
        "error",
        "apply.aborted",
        json!({
            "dialog_id": dialog_id,
            "phase": phase,
            "persisted_scripts": persisted_scripts,
            "error": error.to_string(),
        }),
    );
}
