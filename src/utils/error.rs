use thiserror::Error;

#[derive(Error, Debug)]
pub enum EntrypointError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cannot read configuration file {path}: {source}")]
    ConfigFileError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration file error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to launch '{program}': {source}")]
    SpawnError {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Usage error: {message}")]
    UsageError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Usage,
    Process,
    System,
}

impl EntrypointError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EntrypointError::TomlError(_)
            | EntrypointError::ConfigFileError { .. }
            | EntrypointError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            EntrypointError::UsageError { .. } => ErrorCategory::Usage,
            EntrypointError::SpawnError { .. } => ErrorCategory::Process,
            EntrypointError::IoError(_) => ErrorCategory::System,
        }
    }

    /// Process exit code for an error raised by the entrypoint itself.
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Usage => 2,
            ErrorCategory::Configuration => 78,
            ErrorCategory::Process => 127,
            ErrorCategory::System => 1,
        }
    }

    pub fn invalid(field: &str, value: &str, reason: impl Into<String>) -> Self {
        EntrypointError::InvalidConfigValueError {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EntrypointError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_follow_category() {
        let usage = EntrypointError::UsageError {
            message: "runscript needs a script".to_string(),
        };
        assert_eq!(usage.exit_code(), 2);

        let config = EntrypointError::invalid("DBPORT", "abc", "not a port");
        assert_eq!(config.category(), ErrorCategory::Configuration);
        assert_eq!(config.exit_code(), 78);

        let spawn = EntrypointError::SpawnError {
            program: "nope".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(spawn.exit_code(), 127);
        assert!(spawn.to_string().contains("nope"));

        let unreadable = EntrypointError::ConfigFileError {
            path: "/etc/entrypoint.toml".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(unreadable.category(), ErrorCategory::Configuration);
        assert_eq!(unreadable.exit_code(), 78);
    }
}
