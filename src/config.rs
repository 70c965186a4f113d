use std::path::{Path, PathBuf};

use crate::archive::NormalizeOptions;
use crate::error::ImportError;

pub const CREDENTIALS_ENV_VAR: &str = "GMAIL_CREDENTIALS_PATH";
pub const DEFAULT_NUM_RETRIES: u32 = 10;

/// Run-wide settings, built once at startup and passed to every component.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory holding one sub-directory per user
    pub root_dir: PathBuf,
    /// Service account key used to impersonate each user
    pub credentials_path: PathBuf,
    /// Messages with a lower index in each archive are not imported
    pub from_message: usize,
    pub fix_msgid: bool,
    pub replace_quoted_printable: bool,
    pub num_retries: u32,
    pub log_file: Option<PathBuf>,
}

impl RunConfig {
    pub fn new(root_dir: impl Into<PathBuf>, credentials_path: impl Into<PathBuf>) -> Self {
        RunConfig {
            root_dir: root_dir.into(),
            credentials_path: credentials_path.into(),
            from_message: 0,
            fix_msgid: false,
            replace_quoted_printable: false,
            num_retries: DEFAULT_NUM_RETRIES,
            log_file: None,
        }
    }

    /// Resolve the credentials path from the command line, falling back to the environment.
    pub fn credentials_from(cli_value: Option<PathBuf>) -> Result<PathBuf, ImportError> {
        if let Some(path) = cli_value {
            return Ok(path);
        }

        match std::env::var(CREDENTIALS_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Ok(PathBuf::from(path)),
            _ => Err(ImportError::Config(format!(
                "no service account credentials given\n\
                 \n\
                 💡 Solutions :\n\
                 1. Pass the key file on the command line: --json /path/to/credentials.json\n\
                 2. Or set {} in the environment or in a .env file",
                CREDENTIALS_ENV_VAR
            ))),
        }
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        check_dir(&self.root_dir)?;

        if !self.credentials_path.is_file() {
            return Err(ImportError::Config(format!(
                "credentials file {} does not exist",
                self.credentials_path.display()
            )));
        }

        if let Some(log_file) = &self.log_file {
            if log_file.is_dir() {
                return Err(ImportError::Config(format!(
                    "log destination {} is a directory",
                    log_file.display()
                )));
            }
        }

        Ok(())
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            fix_msgid: self.fix_msgid,
            replace_quoted_printable: self.replace_quoted_printable,
        }
    }
}

fn check_dir(path: &Path) -> Result<(), ImportError> {
    if !path.exists() {
        return Err(ImportError::Config(format!(
            "directory {} does not exist",
            path.display()
        )));
    }
    if !path.is_dir() {
        return Err(ImportError::Config(format!(
            "{} is not a directory",
            path.display()
        )));
    }
    Ok(())
}
