use crate::catalog::DEFAULT_SEARCH_LIMIT;
use crate::errors::PrimingError;
use crate::logging::{DEFAULT_DISK_BUDGET_BYTES, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::recency::DEFAULT_RECENT_CAPACITY;
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "priming.toml";

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub scripts_root: Option<PathBuf>,
    pub dialogs_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrimingConfig {
    pub scripts: ScriptsConfig,
    pub recency: RecencyConfig,
    pub search: SearchConfig,
    pub dialogs: DialogsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScriptsConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecencyConfig {
    pub dir: PathBuf,
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchConfig {
    pub default_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DialogsConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

impl Default for PrimingConfig {
    fn default() -> Self {
        Self {
            scripts: ScriptsConfig {
                root: PathBuf::from(".priming/scripts"),
            },
            recency: RecencyConfig {
                dir: PathBuf::from(".priming/recent"),
                capacity: DEFAULT_RECENT_CAPACITY,
            },
            search: SearchConfig {
                default_limit: DEFAULT_SEARCH_LIMIT,
            },
            dialogs: DialogsConfig {
                root: PathBuf::from(".priming/dialogs"),
            },
            logging: LoggingConfig {
                path: PathBuf::from(".priming/logs/run.jsonl"),
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
                budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialPrimingConfig {
    scripts: Option<PartialScriptsConfig>,
    recency: Option<PartialRecencyConfig>,
    search: Option<PartialSearchConfig>,
    dialogs: Option<PartialDialogsConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialScriptsConfig {
    root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialRecencyConfig {
    dir: Option<PathBuf>,
    capacity: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialSearchConfig {
    default_limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialDialogsConfig {
    root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
    budget_bytes: Option<u64>,
}

/// Loads defaults, merges the config file and CLI overrides over them, then
/// resolves every relative path against the working directory.
pub fn load_config(
    overrides: &CliOverrides,
    process_cwd: &Path,
    fs: &dyn FileSystem,
) -> Result<PrimingConfig, PrimingError> {
    let working_dir = match &overrides.working_dir {
        Some(path) => absolutize_path(process_cwd, path),
        None => process_cwd.to_path_buf(),
    };
    let mut cfg = PrimingConfig::default();

    let config_path = match &overrides.config_path {
        Some(path) => Some(absolutize_path(process_cwd, path)),
        None => Some(working_dir.join(DEFAULT_CONFIG_FILE)).filter(|path| fs.exists(path)),
    };
    if let Some(path) = config_path {
        let file_contents = fs.read_to_string(&path)?;
        let partial: PartialPrimingConfig = toml::from_str(&file_contents)
            .map_err(|e| PrimingError::ConfigParse(format!("{}: {e}", path.display())))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;
    resolve_paths(&mut cfg, &working_dir);
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut PrimingConfig, partial: PartialPrimingConfig) {
    if let Some(root) = partial.scripts.and_then(|scripts| scripts.root) {
        cfg.scripts.root = root;
    }

    if let Some(recency) = partial.recency {
        if let Some(dir) = recency.dir {
            cfg.recency.dir = dir;
        }
        if let Some(capacity) = recency.capacity {
            cfg.recency.capacity = capacity;
        }
    }

    if let Some(limit) = partial.search.and_then(|search| search.default_limit) {
        cfg.search.default_limit = limit;
    }

    if let Some(root) = partial.dialogs.and_then(|dialogs| dialogs.root) {
        cfg.dialogs.root = root;
    }

    if let Some(logging) = partial.logging {
        if let Some(path) = logging.path {
            cfg.logging.path = path;
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
        if let Some(value) = logging.budget_bytes {
            cfg.logging.budget_bytes = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut PrimingConfig, overrides: &CliOverrides) {
    if let Some(root) = &overrides.scripts_root {
        cfg.scripts.root = root.clone();
    }
    if let Some(root) = &overrides.dialogs_root {
        cfg.dialogs.root = root.clone();
    }
}

fn resolve_paths(cfg: &mut PrimingConfig, working_dir: &Path) {
    cfg.scripts.root = absolutize_path(working_dir, &cfg.scripts.root);
    cfg.recency.dir = absolutize_path(working_dir, &cfg.recency.dir);
    cfg.dialogs.root = absolutize_path(working_dir, &cfg.dialogs.root);
    cfg.logging.path = absolutize_path(working_dir, &cfg.logging.path);
}

fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

fn validate_config(cfg: &PrimingConfig) -> Result<(), PrimingError> {
    if cfg.recency.capacity == 0 {
        return Err(PrimingError::InvalidConfig(
            "recency.capacity must be greater than zero".to_string(),
        ));
    }
    if cfg.search.default_limit == 0 {
        return Err(PrimingError::InvalidConfig(
            "search.default_limit must be greater than zero".to_string(),
        ));
    }
    for (key, path) in [
        ("scripts.root", &cfg.scripts.root),
        ("recency.dir", &cfg.recency.dir),
        ("dialogs.root", &cfg.dialogs.root),
        ("logging.path", &cfg.logging.path),
    ] {
        if path.as_os_str().is_empty() {
            return Err(PrimingError::InvalidConfig(format!("{key} must not be empty")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{load_config, CliOverrides, PrimingConfig};
    use crate::errors::PrimingError;
    use crate::runtime::FakeFileSystem;
    use std::path::{Path, PathBuf};

    #[test]
    fn defaults_resolve_under_the_working_dir() {
        let cfg = load_config(
            &CliOverrides::default(),
            Path::new("/work"),
            &FakeFileSystem::default(),
        )
        .expect("config");
        assert_eq!(cfg.scripts.root, Path::new("/work/.priming/scripts"));
        assert_eq!(cfg.recency.capacity, 20);
        assert_eq!(cfg.search.default_limit, 50);
        assert_eq!(cfg.logging.path, Path::new("/work/.priming/logs/run.jsonl"));
    }

    #[test]
    fn file_values_merge_over_defaults_and_cli_wins() {
        let fs = FakeFileSystem::with_file(
            "/work/priming.toml",
            "[scripts]\nroot = \"/srv/scripts\"\n[recency]\ncapacity = 5\n[dialogs]\nroot = \"state/dialogs\"\n",
        );
        let cfg = load_config(&CliOverrides::default(), Path::new("/work"), &fs).expect("config");
        assert_eq!(cfg.scripts.root, Path::new("/srv/scripts"));
        assert_eq!(cfg.recency.capacity, 5);
        assert_eq!(cfg.recency.dir, Path::new("/work/.priming/recent"));
        assert_eq!(cfg.dialogs.root, Path::new("/work/state/dialogs"));

        let overrides = CliOverrides {
            scripts_root: Some(PathBuf::from("mine")),
            working_dir: Some(PathBuf::from("/work")),
            ..CliOverrides::default()
        };
        let cfg = load_config(&overrides, Path::new("/elsewhere"), &fs).expect("config");
        assert_eq!(cfg.scripts.root, Path::new("/work/mine"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let fs = FakeFileSystem::with_file("/cfg.toml", "[search]\ndefault_limit = 0\n");
        let overrides = CliOverrides {
            config_path: Some(PathBuf::from("/cfg.toml")),
            ..CliOverrides::default()
        };
        assert!(matches!(
            load_config(&overrides, Path::new("/work"), &fs),
            Err(PrimingError::InvalidConfig(_))
        ));

        let fs = FakeFileSystem::with_file("/cfg.toml", "[search\n");
        assert!(matches!(
            load_config(&overrides, Path::new("/work"), &fs),
            Err(PrimingError::ConfigParse(_))
        ));
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let rendered = toml::to_string(&PrimingConfig::default()).expect("render");
        assert!(rendered.contains("[recency]"));
        let parsed: PrimingConfig = toml::from_str(&rendered).expect("parse");
        assert_eq!(parsed, PrimingConfig::default());
    }
}
