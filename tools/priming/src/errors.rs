use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrimingError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid script ref: {0}")]
    Path(String),
    #[error("priming script not found: {0}")]
    ScriptNotFound(String),
    #[error("priming script {script_ref} is not applicable to agent {agent_id}")]
    ScriptNotApplicable { script_ref: String, agent_id: String },
    #[error("priming script already exists: {0}")]
    ScriptExists(String),
    #[error("dialog not found: {0}")]
    DialogNotFound(String),
    #[error("dialog store error: {0}")]
    Store(String),
}

impl PrimingError {
    /// Load failures that a recency-derived listing drops silently.
    pub fn is_skippable_load_failure(&self) -> bool {
        matches!(
            self,
            Self::ScriptNotFound(_) | Self::ScriptNotApplicable { .. }
        )
    }

    /// Prefixes parse and validation messages with the script they came from.
    pub fn in_script(self, script: &str) -> Self {
        match self {
            Self::Parse(message) => Self::Parse(format!("{script}: {message}")),
            Self::Validation(message) => Self::Validation(format!("{script}: {message}")),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PrimingError;

    #[test]
    fn only_missing_or_inapplicable_scripts_are_skippable() {
        assert!(PrimingError::ScriptNotFound("team_shared/a".to_string()).is_skippable_load_failure());
        assert!(PrimingError::ScriptNotApplicable {
            script_ref: "individual/alice/a".to_string(),
            agent_id: "bob".to_string(),
        }
        .is_skippable_load_failure());
        assert!(!PrimingError::Parse("bad".to_string()).is_skippable_load_failure());
        assert!(!PrimingError::Io("disk".to_string()).is_skippable_load_failure());
    }

    #[test]
    fn in_script_prefixes_parse_and_validation_messages_only() {
        let err = PrimingError::Validation("record(func_call_record).id is required".to_string())
            .in_script("team_shared/demo");
        assert_eq!(
            err.to_string(),
            "validation error: team_shared/demo: record(func_call_record).id is required"
        );
        let err = PrimingError::Io("boom".to_string()).in_script("team_shared/demo");
        assert_eq!(err.to_string(), "io error: boom");
    }
}
