//! File-backed dialog event store.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<status>/<dialogId>/dialog.json       metadata
//! <root>/<status>/<dialogId>/course-001.jsonl  one persisted record per line
//! ```

use crate::dialog::{
    find_dialog, max_sequence_number, ChatMessage, DialogEventStore, DialogMetadata,
    DialogStatus, LiveDialog,
};
use crate::errors::PrimingError;
use crate::record::ReplayRecord;
use crate::runtime::FileSystem;
use crate::script_ref::is_valid_segment;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const METADATA_FILE: &str = "dialog.json";

pub struct FsDialogStore {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    write_lock: Mutex<()>,
}

impl FsDialogStore {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: root.into(),
            fs,
            write_lock: Mutex::new(()),
        }
    }

    fn dialog_dir(&self, dialog_id: &str, status: DialogStatus) -> Result<PathBuf, PrimingError> {
        if !is_valid_segment(dialog_id) || dialog_id == "." || dialog_id == ".." {
            return Err(PrimingError::Path(format!(
                "dialog id `{dialog_id}` must match [A-Za-z0-9._-]+"
            )));
        }
        Ok(self.root.join(status.as_str()).join(dialog_id))
    }

    pub fn course_path(
        &self,
        dialog_id: &str,
        course: u32,
        status: DialogStatus,
    ) -> Result<PathBuf, PrimingError> {
        Ok(self
            .dialog_dir(dialog_id, status)?
            .join(format!("course-{course:03}.jsonl")))
    }

    /// Writes (or replaces) a dialog's metadata file.
    pub fn create_dialog(
        &self,
        metadata: &DialogMetadata,
        status: DialogStatus,
    ) -> Result<(), PrimingError> {
        let path = self
            .dialog_dir(&metadata.dialog_id, status)?
            .join(METADATA_FILE);
        let rendered =
            serde_json::to_string_pretty(metadata).map_err(|e| PrimingError::Io(e.to_string()))?;
        self.fs.write_atomic(&path, &rendered)
    }

    /// Opens a dialog for replay, with its high-water mark taken from every
    /// persisted course.
    pub fn open_live(&self, dialog_id: &str) -> Result<StoredLiveDialog, PrimingError> {
        let (status, metadata) = find_dialog(self, dialog_id)?;
        let mut genseq = 0;
        for course in 1..=metadata.current_course {
            let events = self.read_course_events(dialog_id, course, status)?;
            genseq = genseq.max(max_sequence_number(&events));
        }
        Ok(StoredLiveDialog {
            dialog_id: dialog_id.to_string(),
            status,
            genseq,
            messages: Vec::new(),
        })
    }

    fn read_lines(&self, path: &Path) -> Result<Vec<ReplayRecord>, PrimingError> {
        let raw = self.fs.read_to_string(path)?;
        raw.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|e| {
                    PrimingError::Store(format!("{}:{}: {e}", path.display(), index + 1))
                })
            })
            .collect()
    }
}

impl DialogEventStore for FsDialogStore {
    fn append_event(
        &self,
        dialog_id: &str,
        event: &ReplayRecord,
        status: DialogStatus,
    ) -> Result<(), PrimingError> {
        let metadata = self
            .load_dialog_metadata(dialog_id, status)?
            .ok_or_else(|| PrimingError::DialogNotFound(dialog_id.to_string()))?;
        let path = self.course_path(dialog_id, metadata.current_course, status)?;
        let line = serde_json::to_string(event).map_err(|e| PrimingError::Store(e.to_string()))?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| PrimingError::Store("dialog store lock poisoned".to_string()))?;
        self.fs
            .append_line(&path, &line)
            .map_err(|e| PrimingError::Store(e.to_string()))
    }

    fn read_course_events(
        &self,
        dialog_id: &str,
        course: u32,
        status: DialogStatus,
    ) -> Result<Vec<ReplayRecord>, PrimingError> {
        let path = self.course_path(dialog_id, course, status)?;
        if !self.fs.exists(&path) {
            return Ok(Vec::new());
        }
        self.read_lines(&path)
    }

    fn load_dialog_metadata(
        &self,
        dialog_id: &str,
        status: DialogStatus,
    ) -> Result<Option<DialogMetadata>, PrimingError> {
        let path = self.dialog_dir(dialog_id, status)?.join(METADATA_FILE);
        if !self.fs.exists(&path) {
            return Ok(None);
        }
        let raw = self.fs.read_to_string(&path)?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| PrimingError::Store(format!("{}: {e}", path.display())))
    }
}

/// A stored dialog opened for replay. Chat messages are kept in memory only.
#[derive(Debug)]
pub struct StoredLiveDialog {
    dialog_id: String,
    status: DialogStatus,
    genseq: u64,
    messages: Vec<ChatMessage>,
}

impl StoredLiveDialog {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}

impl LiveDialog for StoredLiveDialog {
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
