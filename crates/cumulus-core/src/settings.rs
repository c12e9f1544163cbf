//! Dynamic settings
//!
//! Settings are hot values: they may change between two calls, so callers
//! re-read them on every use instead of caching.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Read-only access to the dynamic settings store.
///
/// Only [`SettingsProvider::get`] must be implemented; the typed accessors are
/// derived from it and fall back to the supplied default when the key is
/// missing or its value cannot be parsed.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    /// Raw value of a setting, `None` when it is not defined.
    async fn get(&self, key: &str) -> Option<String>;

    async fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).await.unwrap_or_else(|| default.to_string())
    }

    async fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .await
            .and_then(|value| value.trim().parse::<i64>().ok())
            .unwrap_or(default)
    }

    /// Boolean coercion of a setting; missing keys are false.
    async fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .await
            .map(|value| is_true_val(&value))
            .unwrap_or(false)
    }
}

/// Whether a raw setting value means "enabled".
pub fn is_true_val(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// In-process settings store.
///
/// Used when no settings table is available and in tests. Values can be
/// changed at runtime through [`MemorySettings::set`].
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: RwLock::new(values),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
    }
}

#[async_trait]
impl SettingsProvider for MemorySettings {
    async fn get(&self, key: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }
}
