use crate::config::env::{substitute_known, EnvSource, ProcessEnv};
use crate::utils::error::{EntrypointError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ADMIN: &str = "django-admin.py";
pub const DEFAULT_UWSGI: &str = "uwsgi";
pub const DEFAULT_DATA_DIRECTORY: &str = "/data";
pub const DEFAULT_WAIT_INTERVAL_SECONDS: u64 = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub entrypoint: EntrypointSection,
    /// Replaces built-in fallbacks by variable name.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntrypointSection {
    pub admin: Option<String>,
    pub uwsgi: Option<String>,
    pub data_directory: Option<String>,
    pub wait_interval_seconds: Option<u64>,
}

impl FileConfig {
    /// No path means built-in settings only.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| EntrypointError::ConfigFileError {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_toml_str(&content)
    }

    /// `${VAR}` references to the process environment are substituted before
    /// parsing. Unknown ones are kept so `[defaults]` templates can refer to
    /// variables resolved later.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::from_toml_str_with(content, &ProcessEnv)
    }

    pub fn from_toml_str_with<E: EnvSource>(content: &str, env: &E) -> Result<Self> {
        let processed = substitute_known(content, |name| env.var(name));
        Ok(toml::from_str(&processed)?)
    }

    pub fn admin(&self) -> &str {
        self.entrypoint.admin.as_deref().unwrap_or(DEFAULT_ADMIN)
    }

    pub fn uwsgi(&self) -> &str {
        self.entrypoint.uwsgi.as_deref().unwrap_or(DEFAULT_UWSGI)
    }

    pub fn data_directory(&self) -> PathBuf {
        PathBuf::from(
            self.entrypoint
                .data_directory
                .as_deref()
                .unwrap_or(DEFAULT_DATA_DIRECTORY),
        )
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_secs(
            self.entrypoint
                .wait_interval_seconds
                .unwrap_or(DEFAULT_WAIT_INTERVAL_SECONDS),
        )
    }
}

impl Validate for FileConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("entrypoint.admin", self.admin())?;
        validation::validate_non_empty_string("entrypoint.uwsgi", self.uwsgi())?;
        validation::validate_path(
            "entrypoint.data_directory",
            &self.data_directory().to_string_lossy(),
        )?;
        validation::validate_range(
            "entrypoint.wait_interval_seconds",
            self.wait_interval().as_secs(),
            1,
            3600,
        )?;

        for key in self.defaults.keys() {
            if key.is_empty() || key.contains('=') {
                return Err(EntrypointError::invalid("defaults", key, "Not a valid variable name"));
            }
        }
        Ok(())
    }
}
