//! Invocation requests and module sources.

use crate::timeout::EffectiveTimeout;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Unique id correlating one dispatch with its response.
///
/// A fresh id is used for every attempt, so a late reply from an abandoned
/// attempt can never fulfil a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(Uuid);

impl InvocationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where the runtime finds the module to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ModuleSource {
    /// Inline source text. With a cache key the runtime keeps the compiled
    /// module for later `Cache` lookups.
    #[serde(rename_all = "camelCase")]
    String {
        source: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_key: Option<String>,
    },
    /// A module file on disk, resolved by the runtime.
    File { path: PathBuf },
    /// A module previously cached by key.
    Cache { key: String },
}

impl ModuleSource {
    pub fn string(source: impl Into<String>) -> Self {
        ModuleSource::String {
            source: source.into(),
            cache_key: None,
        }
    }

    pub fn string_cached(source: impl Into<String>, cache_key: impl Into<String>) -> Self {
        ModuleSource::String {
            source: source.into(),
            cache_key: Some(cache_key.into()),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        ModuleSource::File { path: path.into() }
    }

    pub fn cache(key: impl Into<String>) -> Self {
        ModuleSource::Cache { key: key.into() }
    }

    /// Cache key this source reads from or writes to, if any.
    pub fn cache_key(&self) -> Option<&str> {
        match self {
            ModuleSource::String { cache_key, .. } => cache_key.as_deref(),
            ModuleSource::File { .. } => None,
            ModuleSource::Cache { key } => Some(key),
        }
    }
}

impl fmt::Display for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleSource::String { source, .. } => match self.cache_key() {
                Some(key) => write!(f, "string:{}", key),
                None => write!(f, "string({} bytes)", source.len()),
            },
            ModuleSource::File { path } => write!(f, "file:{}", path.display()),
            ModuleSource::Cache { key } => write!(f, "cache:{}", key),
        }
    }
}

/// One dispatch of an invocation.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub id: InvocationId,
    pub module_source: ModuleSource,
    pub export: Option<String>,
    pub args: Vec<Value>,
    pub timeout: EffectiveTimeout,
    /// 1 for the first dispatch.
    pub attempt: u32,
}

impl InvocationRequest {
    pub fn new(
        module_source: ModuleSource,
        export: Option<String>,
        args: Vec<Value>,
        timeout: EffectiveTimeout,
    ) -> Self {
        Self {
            id: InvocationId::new(),
            module_source,
            export,
            args,
            timeout,
            attempt: 1,
        }
    }

    /// The same call under a fresh id for the given attempt number.
    pub fn next_attempt(&self, attempt: u32) -> Self {
        Self {
            id: InvocationId::new(),
            attempt,
            ..self.clone()
        }
    }
}
