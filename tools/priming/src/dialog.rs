//! Dialog collaborators consumed by replay and export.
//!
//! `DialogEventStore` is the durable append-only event log; `LiveDialog` is
//! the in-process dialog that receives transient chat messages. Both have
//! in-memory implementations here for tests; `dialog_store` carries the
//! file-backed store used by the CLI.

use crate::errors::PrimingError;
use crate::record::{RecordBody, ReplayRecord, WebSearchPhase};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogStatus {
    Running,
    Completed,
    Archived,
}

impl DialogStatus {
    /// Order in which statuses are searched when only a dialog id is known.
    pub const SEARCH_ORDER: [DialogStatus; 3] = [Self::Running, Self::Completed, Self::Archived];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogMetadata {
    pub dialog_id: String,
    pub agent_id: String,
    #[serde(default = "first_course")]
    pub current_course: u32,
}

fn first_course() -> u32 {
    1
}

pub trait DialogEventStore: Send + Sync {
    /// Appends one event to the dialog's current course.
    fn append_event(
        &self,
        dialog_id: &str,
        event: &ReplayRecord,
        status: DialogStatus,
    ) -> Result<(), PrimingError>;

    fn read_course_events(
        &self,
        dialog_id: &str,
        course: u32,
        status: DialogStatus,
    ) -> Result<Vec<ReplayRecord>, PrimingError>;

    fn load_dialog_metadata(
        &self,
        dialog_id: &str,
        status: DialogStatus,
    ) -> Result<Option<DialogMetadata>, PrimingError>;
}

/// Looks a dialog up under each status in [`DialogStatus::SEARCH_ORDER`].
pub fn find_dialog(
    store: &dyn DialogEventStore,
    dialog_id: &str,
) -> Result<(DialogStatus, DialogMetadata), PrimingError> {
    for status in DialogStatus::SEARCH_ORDER {
        if let Some(metadata) = store.load_dialog_metadata(dialog_id, status)? {
            return Ok((status, metadata));
        }
    }
    Err(PrimingError::DialogNotFound(dialog_id.to_string()))
}

pub fn max_sequence_number(events: &[ReplayRecord]) -> u64 {
    events
        .iter()
        .filter_map(|event| event.body.sequence_number())
        .max()
        .unwrap_or(0)
}

/// Transient message shown in a live dialog for a conversational record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatMessage {
    Thinking {
        genseq: u64,
        content: String,
    },
    Saying {
        genseq: u64,
        content: String,
    },
    Prompting {
        genseq: u64,
        msg_id: String,
        content: String,
    },
    FuncCall {
        genseq: u64,
        id: String,
        name: String,
        arguments: Map<String, Value>,
    },
    FuncResult {
        genseq: u64,
        id: String,
        name: String,
        content: String,
    },
    Tellask {
        genseq: u64,
        mention_list: Vec<String>,
        content: String,
        sub_dialog_id: String,
    },
    TeammateReply {
        calling_genseq: Option<u64>,
        call_id: String,
        responder_id: Option<String>,
        content: String,
    },
    WebSearch {
        genseq: u64,
        phase: WebSearchPhase,
        item_id: Option<String>,
    },
}

impl ChatMessage {
    /// `None` for structural and UI-only records.
    pub fn project(record: &ReplayRecord) -> Option<Self> {
        match &record.body {
            RecordBody::AgentThought(r) => Some(Self::Thinking {
                genseq: r.genseq,
                content: r.content.clone(),
            }),
            RecordBody::AgentWords(r) => Some(Self::Saying {
                genseq: r.genseq,
                content: r.content.clone(),
            }),
            RecordBody::HumanText(r) => Some(Self::Prompting {
                genseq: r.genseq,
                msg_id: r.msg_id.clone(),
                content: r.content.clone(),
            }),
            RecordBody::FuncCall(r) => Some(Self::FuncCall {
                genseq: r.genseq,
                id: r.id.clone(),
                name: r.name.clone(),
                arguments: r.arguments.clone(),
            }),
            RecordBody::FuncResult(r) => Some(Self::FuncResult {
                genseq: r.genseq,
                id: r.id.clone(),
                name: r.name.clone(),
                content: r.content.clone(),
            }),
            RecordBody::QuestForSup(r) => Some(Self::Tellask {
                genseq: r.genseq,
                mention_list: r.mention_list.clone(),
                content: r.tellask_content.clone(),
                sub_dialog_id: r.sub_dialog_id.clone(),
            }),
            RecordBody::TeammateCallResult(r) => Some(Self::TeammateReply {
                calling_genseq: r.calling_genseq,
                call_id: r.call_id.clone(),
                responder_id: r.responder_id.clone(),
                content: r.result.clone(),
            }),
            RecordBody::TeammateResponse(r) => Some(Self::TeammateReply {
                calling_genseq: r.calling_genseq,
                call_id: r.call_id.clone(),
                responder_id: Some(r.responder_id.clone()),
                content: r.response.clone(),
            }),
            RecordBody::WebSearchCall(r) => Some(Self::WebSearch {
                genseq: r.genseq,
                phase: r.phase,
                item_id: r.item_id.clone(),
            }),
            RecordBody::UiOnlyMarkdown(_)
            | RecordBody::TeammateCallAnchor(_)
            | RecordBody::GenStart(_)
            | RecordBody::GenFinish(_) => None,
        }
    }
}

pub trait LiveDialog {
    fn dialog_id(&self) -> &str;
    fn status(&self) -> DialogStatus;
    fn max_genseq(&self) -> u64;
    fn push_message(&mut self, message: ChatMessage);
    /// Raises the dialog's sequence high-water mark; never lowers it.
    fn advance_genseq(&mut self, genseq: u64);
}

#[derive(Debug, Clone)]
pub struct InMemoryDialog {
    dialog_id: String,
    status: DialogStatus,
    genseq: u64,
    messages: Vec<ChatMessage>,
}

impl InMemoryDialog {
    pub fn new(dialog_id: impl Into<String>, status: DialogStatus, genseq: u64) -> Self {
        Self {
            dialog_id: dialog_id.into(),
            status,
            genseq,
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}

impl LiveDialog for InMemoryDialog {
    fn dialog_id(&self) -> &str {
        &self.dialog_id
    }

    fn status(&self) -> DialogStatus {
        self.status
    }

    fn max_genseq(&self) -> u64 {
        self.genseq
    }

    fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    fn advance_genseq(&mut self, genseq: u64) {
        self.genseq = self.genseq.max(genseq);
    }
}

#[derive(Debug, Clone, Default)]
struct StoredDialog {
    metadata: Option<DialogMetadata>,
    courses: BTreeMap<u32, Vec<ReplayRecord>>,
}

/// In-memory event store. `fail_after(n)` lets the next `n` appends succeed
/// and fails every one after that.
#[derive(Clone, Default)]
pub struct InMemoryDialogStore {
    dialogs: Arc<Mutex<BTreeMap<(DialogStatus, String), StoredDialog>>>,
    appends_left: Arc<Mutex<Option<usize>>>,
}

impl InMemoryDialogStore {
    pub fn insert_dialog(&self, status: DialogStatus, metadata: DialogMetadata) {
        let mut dialogs = self.dialogs.lock().expect("dialogs lock");
        let entry = dialogs
            .entry((status, metadata.dialog_id.clone()))
            .or_default();
        entry.metadata = Some(metadata);
    }

    pub fn insert_events(
        &self,
        status: DialogStatus,
        dialog_id: &str,
        course: u32,
        events: Vec<ReplayRecord>,
    ) {
        let mut dialogs = self.dialogs.lock().expect("dialogs lock");
        dialogs
            .entry((status, dialog_id.to_string()))
            .or_default()
            .courses
            .entry(course)
            .or_default()
            .extend(events);
    }

    pub fn fail_after(&self, appends: usize) {
        *self.appends_left.lock().expect("fail lock") = Some(appends);
    }

    pub fn events(&self, status: DialogStatus, dialog_id: &str, course: u32) -> Vec<ReplayRecord> {
        self.dialogs
            .lock()
            .expect("dialogs lock")
            .get(&(status, dialog_id.to_string()))
            .and_then(|dialog| dialog.courses.get(&course).cloned())
            .unwrap_or_default()
    }
}

impl DialogEventStore for InMemoryDialogStore {
    fn append_event(
        &self,
        dialog_id: &str,
        event: &ReplayRecord,
        status: DialogStatus,
    ) -> Result<(), PrimingError> {
        if let Some(left) = self.appends_left.lock().expect("fail lock").as_mut() {
            if *left == 0 {
                return Err(PrimingError::Store(format!(
                    "append to {dialog_id} rejected"
                )));
            }
            *left -= 1;
        }
        let mut dialogs = self.dialogs.lock().expect("dialogs lock");
        let dialog = dialogs
            .get_mut(&(status, dialog_id.to_string()))
            .ok_or_else(|| PrimingError::DialogNotFound(dialog_id.to_string()))?;
        let course = dialog
            .metadata
            .as_ref()
            .map(|metadata| metadata.current_course)
            .unwrap_or(1);
        dialog.courses.entry(course).or_default().push(event.clone());
        Ok(())
    }

    fn read_course_events(
        &self,
        dialog_id: &str,
        course: u32,
        status: DialogStatus,
    ) -> Result<Vec<ReplayRecord>, PrimingError> {
        Ok(self.events(status, dialog_id, course))
    }

    fn load_dialog_metadata(
        &self,
        dialog_id: &str,
        status: DialogStatus,
    ) -> Result<Option<DialogMetadata>, PrimingError> {
        Ok(self
            .dialogs
            .lock()
            .expect("dialogs lock")
            .get(&(status, dialog_id.to_string()))
            .and_then(|dialog| dialog.metadata.clone()))
    }
}
