//! Script references: `individual/<agentId>/<slug…>` or `team_shared/<slug…>`.
//!
//! A ref is the root-relative path of a script with the `.md` suffix
//! removed. Normalization rejects anything that could resolve outside the
//! script root before any file-system access happens.

use crate::errors::PrimingError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const INDIVIDUAL_DIR: &str = "individual";
pub const TEAM_SHARED_DIR: &str = "team_shared";
pub const SCRIPT_EXTENSION: &str = "md";
const SCRIPT_SUFFIX: &str = ".md";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptScope {
    Individual,
    TeamShared,
}

impl ScriptScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Individual => INDIVIDUAL_DIR,
            Self::TeamShared => TEAM_SHARED_DIR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScriptRef {
    Individual { agent_id: String, slug: Vec<String> },
    TeamShared { slug: Vec<String> },
}

impl ScriptRef {
    /// Normalizes and validates `raw`. Idempotent on its own output.
    pub fn parse(raw: &str) -> Result<Self, PrimingError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PrimingError::Path("script ref is empty".to_string()));
        }
        if trimmed.contains('\0') {
            return Err(PrimingError::Path(format!(
                "{}: contains a NUL byte",
                trimmed.escape_debug()
            )));
        }
        if trimmed.contains(':') {
            return Err(PrimingError::Path(format!(
                "{trimmed}: drive letters and ':' are not allowed"
            )));
        }
        let unified = trimmed.replace('\\', "/");
        if unified.starts_with('/') {
            return Err(PrimingError::Path(format!("{trimmed}: must be relative")));
        }

        let mut segments = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(PrimingError::Path(format!(
                        "{trimmed}: '..' segments are not allowed"
                    )))
                }
                _ => {
                    if !is_valid_segment(segment) {
                        return Err(PrimingError::Path(format!(
                            "{trimmed}: segment `{segment}` must match [A-Za-z0-9._-]+"
                        )));
                    }
                    segments.push(segment.to_string());
                }
            }
        }
        if let Some(last) = segments.last_mut() {
            if let Some(stem) = last.strip_suffix(SCRIPT_SUFFIX) {
                *last = stem.to_string();
            }
        }
        match segments.last() {
            Some(last) if last.is_empty() || last == "." => {
                return Err(PrimingError::Path(format!("{trimmed}: missing script name")));
            }
            // A second suffix would be stripped again on re-parse.
            Some(last) if last.ends_with(SCRIPT_SUFFIX) => {
                return Err(PrimingError::Path(format!(
                    "{trimmed}: script name `{last}` must not end in {SCRIPT_SUFFIX}"
                )));
            }
            _ => {}
        }
        Self::from_segments(trimmed, segments)
    }

    fn from_segments(raw: &str, mut segments: Vec<String>) -> Result<Self, PrimingError> {
        if segments.is_empty() {
            return Err(PrimingError::Path(format!("{raw}: missing scope")));
        }
        let scope = segments.remove(0);
        match scope.as_str() {
            INDIVIDUAL_DIR => {
                if segments.len() < 2 {
                    return Err(PrimingError::Path(format!(
                        "{raw}: expected individual/<agentId>/<slug>"
                    )));
                }
                let agent_id = segments.remove(0);
                Ok(Self::Individual {
                    agent_id,
                    slug: segments,
                })
            }
            TEAM_SHARED_DIR => {
                if segments.is_empty() {
                    return Err(PrimingError::Path(format!(
                        "{raw}: expected team_shared/<slug>"
                    )));
                }
                Ok(Self::TeamShared { slug: segments })
            }
            other => Err(PrimingError::Path(format!(
                "{raw}: scope `{other}` must be {INDIVIDUAL_DIR} or {TEAM_SHARED_DIR}"
            ))),
        }
    }

    pub fn individual(agent_id: &str, slug: &str) -> Result<Self, PrimingError> {
        Self::parse(&format!("{INDIVIDUAL_DIR}/{agent_id}/{slug}"))
    }

    pub fn scope(&self) -> ScriptScope {
        match self {
            Self::Individual { .. } => ScriptScope::Individual,
            Self::TeamShared { .. } => ScriptScope::TeamShared,
        }
    }

    pub fn owner_agent_id(&self) -> Option<&str> {
        match self {
            Self::Individual { agent_id, .. } => Some(agent_id),
            Self::TeamShared { .. } => None,
        }
    }

    /// Slug segments joined with `/`.
    pub fn slug(&self) -> String {
        match self {
            Self::Individual { slug, .. } | Self::TeamShared { slug } => slug.join("/"),
        }
    }

    pub fn applies_to_owner(&self, agent_id: &str) -> bool {
        match self {
            Self::Individual { agent_id: owner, .. } => owner == agent_id,
            Self::TeamShared { .. } => true,
        }
    }

    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::from(self.scope().as_str());
        let slug = match self {
            Self::Individual { agent_id, slug } => {
                path.push(agent_id);
                slug
            }
            Self::TeamShared { slug } => slug,
        };
        if let Some((last, parents)) = slug.split_last() {
            for segment in parents {
                path.push(segment);
            }
            // `set_extension` would eat dotted slugs such as `v1.2`.
            path.push(format!("{last}.{SCRIPT_EXTENSION}"));
        }
        path
    }

    /// Absolute location under `root`; fails if it would leave `root`.
    pub fn resolve(&self, root: &Path) -> Result<PathBuf, PrimingError> {
        let path = root.join(self.relative_path());
        if !path.starts_with(root) {
            return Err(PrimingError::Path(format!("{self}: escapes the script root")));
        }
        Ok(path)
    }

    /// Rebuilds a ref from a file found under `root`. `None` for files that
    /// are not `.md` scripts in a valid scope layout, or whose name would not
    /// resolve back to the same file.
    pub fn from_path(root: &Path, path: &Path) -> Option<Self> {
        let relative = path.strip_prefix(root).ok()?;
        if relative.extension().and_then(|ext| ext.to_str()) != Some(SCRIPT_EXTENSION) {
            return None;
        }
        let segments = relative
            .components()
            .map(|component| component.as_os_str().to_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()?;
        Self::parse(&segments.join("/")).ok()
    }
}

impl fmt::Display for ScriptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Individual { agent_id, slug } => {
                write!(f, "{INDIVIDUAL_DIR}/{agent_id}/{}", slug.join("/"))
            }
            Self::TeamShared { slug } => write!(f, "{TEAM_SHARED_DIR}/{}", slug.join("/")),
        }
    }
}

pub fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

#[cfg(test)]
mod tests {
    use super::{ScriptRef, ScriptScope};
    use std::path::Path;

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            "team_shared/onboarding",
            " individual/alice//reviews/./weekly.md ",
            "team_shared\\ops\\deploy",
        ] {
            let once = ScriptRef::parse(raw).expect("valid").to_string();
            let twice = ScriptRef::parse(&once).expect("valid").to_string();
            assert_eq!(once, twice);
        }
        assert_eq!(
            ScriptRef::parse(" individual/alice//reviews/./weekly.md ")
                .expect("valid")
                .to_string(),
            "individual/alice/reviews/weekly"
        );
    }

    #[test]
    fn traversal_absolute_and_drive_refs_fail() {
        for raw in ["../x", "/x", "x:y", "team_shared/../secrets", "C:\\scripts\\x"] {
            assert!(ScriptRef::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn segments_must_use_the_safe_alphabet() {
        let err = ScriptRef::parse("team_shared/hello world").expect_err("must fail");
        assert!(err.to_string().contains("[A-Za-z0-9._-]+"));
        assert!(ScriptRef::parse("team_shared/a\0b").is_err());
    }

    #[test]
    fn scope_shapes_are_enforced() {
        assert!(ScriptRef::parse("individual/alice").is_err());
        assert!(ScriptRef::parse("team_shared").is_err());
        assert!(ScriptRef::parse("private/alice/x").is_err());

        let individual = ScriptRef::parse("individual/alice/a/b").expect("valid");
        assert_eq!(individual.scope(), ScriptScope::Individual);
        assert_eq!(individual.owner_agent_id(), Some("alice"));
        assert_eq!(individual.slug(), "a/b");
        assert!(individual.applies_to_owner("alice"));
        assert!(!individual.applies_to_owner("bob"));
    }

    #[test]
    fn resolves_under_root_and_back() {
        let root = Path::new("/scripts");
        let script = ScriptRef::parse("team_shared/ops/deploy").expect("valid");
        let path = script.resolve(root).expect("resolve");
        assert_eq!(path, Path::new("/scripts/team_shared/ops/deploy.md"));
        assert_eq!(ScriptRef::from_path(root, &path), Some(script));
        assert_eq!(
            ScriptRef::from_path(root, Path::new("/scripts/team_shared/notes.txt")),
            None
        );

        assert_eq!(
            ScriptRef::from_path(root, Path::new("/scripts/team_shared/x.md.md")),
            None
        );

        let dotted = ScriptRef::parse("individual/alice/release-v1.2").expect("valid");
        let path = dotted.resolve(root).expect("resolve");
        assert_eq!(path, Path::new("/scripts/individual/alice/release-v1.2.md"));
        assert_eq!(ScriptRef::from_path(root, &path), Some(dotted));
    }

    #[test]
    fn a_doubled_script_suffix_is_rejected_rather_than_stripped_twice() {
        for raw in ["team_shared/x.md.md", "individual/alice/notes.md.md", "team_shared/.md"] {
            assert!(ScriptRef::parse(raw).is_err(), "{raw} should be rejected");
        }
        let once = ScriptRef::parse("team_shared/x.md").expect("valid");
        assert_eq!(once.to_string(), "team_shared/x");
        assert_eq!(ScriptRef::parse(&once.to_string()).expect("valid"), once);
    }
}
