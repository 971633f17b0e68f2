use crate::errors::PrimingError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;

    fn now_utc(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.now())
    }
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, PrimingError>;
    /// Replaces the whole file or leaves the previous contents untouched.
    fn write_atomic(&self, path: &Path, contents: &str) -> Result<(), PrimingError>;
    /// Appends `line` plus a newline, creating the file if needed.
    fn append_line(&self, path: &Path, line: &str) -> Result<(), PrimingError>;
    fn exists(&self, path: &Path) -> bool;
    /// Every regular file below `dir`, recursively. A missing `dir` yields no files.
    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>, PrimingError>;
    fn modified(&self, path: &Path) -> Result<SystemTime, PrimingError>;
}

pub trait Terminal: Send + Sync {
    fn write_line(&self, line: &str) -> Result<(), PrimingError>;
}

pub struct ProductionClock;

impl Clock for ProductionClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, PrimingError> {
        std::fs::read_to_string(path).map_err(|e| PrimingError::Io(e.to_string()))
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> Result<(), PrimingError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PrimingError::Io(e.to_string()))?;
        }
        let tmp = temp_path_for(path);
        std::fs::write(&tmp, contents.as_bytes()).map_err(|e| PrimingError::Io(e.to_string()))?;
        if let Err(error) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(PrimingError::Io(error.to_string()));
        }
        Ok(())
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<(), PrimingError> {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| PrimingError::Io(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| PrimingError::Io(e.to_string()))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>, PrimingError> {
        let mut out = Vec::new();
        if dir.is_dir() {
            collect_files(dir, &mut out)?;
        }
        out.sort();
        Ok(out)
    }

    fn modified(&self, path: &Path) -> Result<SystemTime, PrimingError> {
        std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map_err(|e| PrimingError::Io(e.to_string()))
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), PrimingError> {
    let entries = std::fs::read_dir(dir).map_err(|e| PrimingError::Io(e.to_string()))?;
    for entry in entries {
        let path = entry.map_err(|e| PrimingError::Io(e.to_string()))?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn write_line(&self, line: &str) -> Result<(), PrimingError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| PrimingError::Io(e.to_string()))
    }
}

pub struct ProductionRuntime {
    pub clock: Arc<dyn Clock>,
    pub file_system: Arc<dyn FileSystem>,
    pub terminal: Arc<dyn Terminal>,
}

impl ProductionRuntime {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(ProductionClock),
            file_system: Arc::new(ProductionFileSystem),
            terminal: Arc::new(ProductionTerminal),
        }
    }
}

impl Default for ProductionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct FakeClock {
    now: Arc<Mutex<SystemTime>>,
}

impl FakeClock {
    pub fn new(now: SystemTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now += by;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().expect("clock lock")
    }
}

#[derive(Debug, Clone)]
struct FakeFile {
    contents: String,
    modified: SystemTime,
}

/// In-memory file system. Writes are stamped with the time set via `set_write_time`.
#[derive(Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<BTreeMap<PathBuf, FakeFile>>>,
    write_time: Arc<Mutex<SystemTime>>,
}

impl Default for FakeFileSystem {
    fn default() -> Self {
        Self {
            files: Arc::new(Mutex::new(BTreeMap::new())),
            write_time: Arc::new(Mutex::new(SystemTime::UNIX_EPOCH)),
        }
    }
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.insert(path, contents, SystemTime::UNIX_EPOCH);
        fs
    }

    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<String>, modified: SystemTime) {
        self.files.lock().expect("files lock").insert(
            path.into(),
            FakeFile {
                contents: contents.into(),
                modified,
            },
        );
    }

    pub fn set_write_time(&self, time: SystemTime) {
        *self.write_time.lock().expect("write time lock") = time;
    }

    pub fn contents(&self, path: &Path) -> Option<String> {
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .map(|file| file.contents.clone())
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, PrimingError> {
        self.contents(path)
            .ok_or_else(|| PrimingError::Io(format!("missing file {}", path.display())))
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> Result<(), PrimingError> {
        let modified = *self.write_time.lock().expect("write time lock");
        self.insert(path, contents, modified);
        Ok(())
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<(), PrimingError> {
        let modified = *self.write_time.lock().expect("write time lock");
        let mut files = self.files.lock().expect("files lock");
        let file = files.entry(path.to_path_buf()).or_insert_with(|| FakeFile {
            contents: String::new(),
            modified,
        });
        file.contents.push_str(line);
        file.contents.push('\n');
        file.modified = modified;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().expect("files lock").contains_key(path)
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>, PrimingError> {
        Ok(self
            .files
            .lock()
            .expect("files lock")
            .keys()
            .filter(|path| path.starts_with(dir))
            .cloned()
            .collect())
    }

    fn modified(&self, path: &Path) -> Result<SystemTime, PrimingError> {
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .map(|file| file.modified)
            .ok_or_else(|| PrimingError::Io(format!("missing file {}", path.display())))
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    writes: Arc<Mutex<Vec<String>>>,
}

impl FakeTerminal {
    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().expect("writes lock").clone()
    }
}

impl Terminal for FakeTerminal {
    fn write_line(&self, line: &str) -> Result<(), PrimingError> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(line.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, FakeClock, FakeFileSystem, FileSystem, ProductionFileSystem};
    use std::path::Path;
    use std::time::{Duration, SystemTime};

    #[test]
    fn production_write_atomic_replaces_file_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("script.md");
        let fs = ProductionFileSystem;
        fs.write_atomic(&path, "first").expect("first write");
        fs.write_atomic(&path, "second").expect("second write");

        assert_eq!(fs.read_to_string(&path).expect("read"), "second");
        let files = fs.list_files(dir.path()).expect("list");
        assert_eq!(files, vec![path]);
    }

    #[test]
    fn production_list_files_of_missing_dir_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let files = ProductionFileSystem
            .list_files(&dir.path().join("absent"))
            .expect("list");
        assert!(files.is_empty());
    }

    #[test]
    fn fake_file_system_stamps_writes_and_filters_listing_by_prefix() {
        let fs = FakeFileSystem::default();
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(42);
        fs.set_write_time(stamp);
        fs.write_atomic(Path::new("/root/a/one.md"), "1").expect("write");
        fs.write_atomic(Path::new("/other/two.md"), "2").expect("write");

        assert_eq!(
            fs.list_files(Path::new("/root")).expect("list"),
            vec![Path::new("/root/a/one.md").to_path_buf()]
        );
        assert_eq!(fs.modified(Path::new("/root/a/one.md")).expect("mtime"), stamp);
    }

    #[test]
    fn append_line_grows_the_file_on_both_implementations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.jsonl");
        let fake = FakeFileSystem::default();
        let systems: [&dyn FileSystem; 2] = [&ProductionFileSystem, &fake];
        for fs in systems {
            fs.append_line(&path, "one").expect("append");
            fs.append_line(&path, "two").expect("append");
            assert_eq!(fs.read_to_string(&path).expect("read"), "one\ntwo\n");
        }
    }

    #[test]
    fn fake_clock_advances() {
        let clock = FakeClock::default();
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now_utc().timestamp(), 5);
    }
}
