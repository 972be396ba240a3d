use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

use super::clock::Clock;
use super::domain::ApplicationId;

/// String-keyed cache with per-entry TTL. Never consulted for gating decisions.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError>;
    fn delete(&self, key: &str) -> Result<(), CacheError>;
    /// Delete every key matching a glob pattern where `*` matches any run of characters.
    fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

pub mod keys {
    use super::ApplicationId;

    pub const APPLICATION_LIST_PATTERN: &str = "applications:list:*";
    pub const STATUS_SUMMARY: &str = "applications:stats";

    pub fn application(id: &ApplicationId) -> String {
        format!("application:{id}")
    }

    pub fn application_list(fingerprint: &str) -> String {
        format!("applications:list:{fingerprint}")
    }

    pub fn certificate_verification(number: &str, code: Option<&str>) -> String {
        format!("certificate:verify:{number}:{}", code.unwrap_or("-"))
    }

    pub fn certificate_verification_pattern(number: &str) -> String {
        format!("certificate:verify:{number}:*")
    }
}

/// TTLs (seconds) for each cached view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTtls {
    pub application: u64,
    pub list: u64,
    pub stats: u64,
    pub verification_stable: u64,
    pub verification_mutable: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            application: 1_800,
            list: 300,
            stats: 300,
            verification_stable: 3_600,
            verification_mutable: 300,
        }
    }
}

/// Minimal glob matcher supporting `*` only.
pub fn glob_matches(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let mut rest = key;
    for (index, part) in parts.iter().enumerate() {
        if index == 0 {
            match rest.strip_prefix(part) {
                Some(tail) => rest = tail,
                None => return false,
            }
        } else if index == parts.len() - 1 {
            return rest.ends_with(part);
        } else if let Some(position) = rest.find(part) {
            rest = &rest[position + part.len()..];
        } else {
            return false;
        }
    }
    true
}

const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 3_600;

struct CacheEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Process-local cache that honours TTLs against the injected clock.
pub struct InMemoryCache {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, CacheEntry>>, CacheError> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Unavailable("cache mutex poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        matches!(self.get(key), Ok(Some(_)))
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError> {
        let ttl = ttl_secs.min(MAX_TTL_SECS) as i64;
        let expires_at = self.clock.now() + Duration::seconds(ttl);
        self.lock()?
            .insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|key, _| !glob_matches(pattern, key));
        Ok(before - entries.len())
    }
}

/// Cache that stores nothing; every read misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl Cache for NoopCache {
    fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: String, _ttl_secs: u64) -> Result<(), CacheError> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    fn delete_pattern(&self, _pattern: &str) -> Result<usize, CacheError> {
        Ok(0)
    }
}
