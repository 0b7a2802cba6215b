//! Purpose: Runtime settings for loading components and cleaning up objects.
//! Exports: `RuntimeConfig`, `CleanerKind`, env variable names.
//! Role: Explicit inputs to `Component::load`; nothing reads the environment implicitly.
//! Invariants: Unknown or malformed values are usage errors, never silently defaulted.
use crate::core::error::{Error, ErrorKind};
use std::path::PathBuf;

pub const CLEANER_ENV: &str = "UNIWIRE_CLEANER";
pub const LIBRARY_OVERRIDE_ENV_PREFIX: &str = "UNIWIRE_LIBRARY_OVERRIDE_";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CleanerKind {
    /// Cleanup runs on a dedicated background thread.
    #[default]
    Thread,
    /// Cleanup runs on whichever thread drops the last wrapper.
    Inline,
}

impl CleanerKind {
    pub fn parse(value: &str) -> Result<Self, Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "thread" => Ok(CleanerKind::Thread),
            "inline" => Ok(CleanerKind::Inline),
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown cleaner {other:?}"))
                .with_hint("Use `thread` or `inline`.")),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RuntimeConfig {
    pub library_override: Option<PathBuf>,
    pub cleaner: CleanerKind,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library_override(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_override = Some(path.into());
        self
    }

    pub fn with_cleaner(mut self, cleaner: CleanerKind) -> Self {
        self.cleaner = cleaner;
        self
    }

    pub fn from_env(namespace: &str) -> Result<Self, Error> {
        Self::from_lookup(namespace, |key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup (the process env in production).
    pub fn from_lookup<F>(namespace: &str, lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();
        if let Some(value) = lookup(CLEANER_ENV) {
            config.cleaner = CleanerKind::parse(&value)?;
        }
        if let Some(path) = lookup(&library_override_key(namespace)) {
            if path.trim().is_empty() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("{} is empty", library_override_key(namespace))));
            }
            config.library_override = Some(PathBuf::from(path));
        }
        Ok(config)
    }
}

pub fn library_override_key(namespace: &str) -> String {
    format!("{LIBRARY_OVERRIDE_ENV_PREFIX}{}", namespace.to_ascii_uppercase())
}
