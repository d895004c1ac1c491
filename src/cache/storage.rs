//! In-memory entry store with LRU ordering
//!
//! Entries live in a recency-ordered map: the front is the least recently
//! used entry, hits and inserts move an entry to the back. Eviction pops
//! from the front until the entry and byte budgets admit the new entry.

use chrono::{DateTime, Utc};
use linked_hash_map::LinkedHashMap;
use serde::Serialize;
use std::sync::Arc;

use crate::cache::crypto::SealedPayload;
use crate::classify::SensitivityLevel;
use crate::consent::ConsentCategory;

/// Stored value, plaintext JSON or ciphertext
#[derive(Clone)]
pub enum StoredPayload {
    Plain(Arc<Vec<u8>>),
    Sealed(SealedPayload),
}

impl StoredPayload {
    pub fn stored_len(&self) -> usize {
        match self {
            StoredPayload::Plain(bytes) => bytes.len(),
            StoredPayload::Sealed(sealed) => sealed.stored_len(),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, StoredPayload::Sealed(_))
    }
}

/// A cached value and its policy metadata
#[derive(Clone)]
pub struct CacheEntry {
    pub key: String,
    pub payload: StoredPayload,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub hit_count: u64,
    pub sensitivity_level: SensitivityLevel,
    pub consent_required: bool,
    pub consent_category: Option<ConsentCategory>,
    /// User the data belongs to, when known
    pub owner: Option<String>,
    /// Producing domain, used for bulk invalidation
    pub source_category: String,
    pub operation: String,
    pub size_bytes: usize,
    /// Distinguishes successive writes to the same key
    pub generation: u64,
}

impl CacheEntry {
    pub fn encrypted(&self) -> bool {
        self.payload.is_encrypted()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| now >= expires)
    }

    pub fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            key: self.key.clone(),
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at,
            expires_at: self.expires_at,
            hit_count: self.hit_count,
            encrypted: self.encrypted(),
            key_id: match &self.payload {
                StoredPayload::Sealed(sealed) => Some(sealed.key_id),
                StoredPayload::Plain(_) => None,
            },
            sensitivity_level: self.sensitivity_level,
            consent_required: self.consent_required,
            consent_category: self.consent_category,
            owner: self.owner.clone(),
            source_category: self.source_category.clone(),
            operation: self.operation.clone(),
            size_bytes: self.size_bytes,
        }
    }
}

/// Entry description without the payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryMetadata {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub hit_count: u64,
    pub encrypted: bool,
    pub key_id: Option<u32>,
    pub sensitivity_level: SensitivityLevel,
    pub consent_required: bool,
    pub consent_category: Option<ConsentCategory>,
    pub owner: Option<String>,
    pub source_category: String,
    pub operation: String,
    pub size_bytes: usize,
}

/// Result of [`CacheStorage::put`]
#[derive(Debug, PartialEq, Eq)]
pub enum PutOutcome {
    /// Stored after evicting these keys (least recently used first)
    Stored { evicted: Vec<String> },
    /// The entry alone exceeds the byte budget
    TooLarge,
}

/// Recency-ordered entry map with entry and byte budgets
pub struct CacheStorage {
    entries: LinkedHashMap<String, CacheEntry>,
    total_bytes: usize,
    encrypted_entries: usize,
    max_entries: usize,
    max_bytes: usize,
    next_generation: u64,
}

impl CacheStorage {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            entries: LinkedHashMap::new(),
            total_bytes: 0,
            encrypted_entries: 0,
            max_entries: max_entries.max(1),
            max_bytes,
            next_generation: 1,
        }
    }

    /// Look at an entry without changing its recency
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Record a hit: move to most recently used and bump counters
    pub fn touch(&mut self, key: &str, now: DateTime<Utc>) -> Option<&CacheEntry> {
        let entry = self.entries.get_refresh(key)?;
        entry.hit_count += 1;
        entry.last_accessed_at = now;
        Some(&*entry)
    }

    /// Insert an entry, evicting least recently used entries to make room.
    ///
    /// Any previous entry under the same key is replaced, even when the new
    /// entry is rejected as too large.
    pub fn put(&mut self, mut entry: CacheEntry) -> PutOutcome {
        self.remove(&entry.key);

        if entry.size_bytes > self.max_bytes {
            return PutOutcome::TooLarge;
        }

        let mut evicted = Vec::new();
        while self.entries.len() >= self.max_entries
            || self.total_bytes + entry.size_bytes > self.max_bytes
        {
            match self.pop_lru() {
                Some(victim) => evicted.push(victim.key),
                None => break,
            }
        }

        entry.generation = self.next_generation;
        self.next_generation += 1;
        self.account_insert(&entry);
        self.entries.insert(entry.key.clone(), entry);

        PutOutcome::Stored { evicted }
    }

    /// Delete a specific entry by key
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.account_remove(&entry);
        Some(entry)
    }

    /// Delete an entry only if it is still the write identified by `generation`
    pub fn remove_if_generation(&mut self, key: &str, generation: u64) -> bool {
        if self.entries.get(key).is_some_and(|e| e.generation == generation) {
            self.remove(key);
            true
        } else {
            false
        }
    }

    /// Delete every entry matching `pred`, returning how many were removed
    pub fn remove_where<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&CacheEntry) -> bool,
    {
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|&(_, e)| pred(e))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &doomed {
            self.remove(key);
        }
        doomed.len()
    }

    /// Delete entries whose expiry has passed
    pub fn remove_expired(&mut self, now: DateTime<Utc>) -> usize {
        self.remove_where(|e| e.is_expired(now))
    }

    /// Clear all cache entries
    pub fn clear_all(&mut self) -> ClearStats {
        let entries_removed = self.entries.len();
        self.entries.clear();
        self.total_bytes = 0;
        self.encrypted_entries = 0;
        ClearStats { entries_removed }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys from least to most recently used
    #[cfg(test)]
    pub fn keys_lru(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Get storage statistics
    pub fn stats(&self, now: DateTime<Utc>) -> StorageStats {
        let expired_entries = self.entries.values().filter(|e| e.is_expired(now)).count();
        StorageStats {
            total_entries: self.entries.len(),
            expired_entries,
            encrypted_entries: self.encrypted_entries,
            total_size_bytes: self.total_bytes,
            max_entries: self.max_entries,
            max_bytes: self.max_bytes,
            oldest_entry: self.entries.values().map(|e| e.created_at).min(),
            newest_entry: self.entries.values().map(|e| e.created_at).max(),
        }
    }

    #[cfg(test)]
    pub(crate) fn peek_mut(&mut self, key: &str) -> Option<&mut CacheEntry> {
        self.entries.get_mut(key)
    }

    fn pop_lru(&mut self) -> Option<CacheEntry> {
        let (_, entry) = self.entries.pop_front()?;
        self.account_remove(&entry);
        Some(entry)
    }

    fn account_insert(&mut self, entry: &CacheEntry) {
        self.total_bytes += entry.size_bytes;
        if entry.encrypted() {
            self.encrypted_entries += 1;
        }
    }

    fn account_remove(&mut self, entry: &CacheEntry) {
        self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes);
        if entry.encrypted() {
            self.encrypted_entries = self.encrypted_entries.saturating_sub(1);
        }
    }
}

/// Statistics about cache clear operation
#[derive(Debug)]
pub struct ClearStats {
    pub entries_removed: usize,
}

/// Statistics about cache state
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub encrypted_entries: usize,
    pub total_size_bytes: usize,
    pub max_entries: usize,
    pub max_bytes: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}
