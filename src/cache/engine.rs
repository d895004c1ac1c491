//! Cache engine: classification-aware get/set with consent gating
//!
//! The engine is constructed explicitly and handed to collaborators by
//! reference or `Arc`; there is no global instance. Reads never fail: expired
//! entries, consent blocks and undecryptable entries are all misses.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cache::crypto::Cipher;
use crate::cache::flight::{self, FlightRegistry, Role};
use crate::cache::invalidation::{self, ALL_TAG, InvalidationTable};
use crate::cache::storage::{CacheEntry, CacheStorage, EntryMetadata, PutOutcome, StoredPayload};
use crate::cache::CacheSettings;
use crate::classify::{Classification, Classifier, ClassifyContext, SensitivityLevel};
use crate::clock::{Clock, SystemClock, add_duration};
use crate::config::Config;
use crate::consent::{ConsentCategory, ConsentLedger, RevokeOptions};
use crate::error::{CacheError, Error, Result};

/// Who is reading
#[derive(Debug, Clone, Default)]
pub struct AccessContext {
    pub user_id: Option<String>,
}

impl AccessContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }
}

/// How a value was produced, and for whom
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub domain: String,
    pub operation: String,
    /// Takes precedence over the classifier's TTL (clamped for sensitive data)
    pub ttl_override: Option<Duration>,
    /// Owner of the data; required when the value is consent-gated
    pub user_id: Option<String>,
}

impl SetOptions {
    pub fn new(domain: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl_override = Some(ttl);
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Bulk removal filter; both fields must match when given
#[derive(Debug, Clone, Default)]
pub struct ClearFilter {
    /// Regex over the key, or a literal substring if it is not a valid regex
    pub pattern: Option<String>,
    pub domain: Option<String>,
}

/// Context of a domain event
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    pub domain: String,
}

impl EventContext {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub consent_blocks: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub decrypt_failures: u64,
    pub policy_refusals: u64,
    pub sets: u64,
    pub dedup_joins: u64,
    pub producer_runs: u64,
    pub entries: usize,
    /// Entries past their TTL that no read or sweep has removed yet
    pub expired_entries: usize,
    pub encrypted_entries: usize,
    pub total_bytes: usize,
    pub max_entries: usize,
    pub max_bytes: usize,
    pub in_flight: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    consent_blocks: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    decrypt_failures: AtomicU64,
    policy_refusals: AtomicU64,
    sets: AtomicU64,
    dedup_joins: AtomicU64,
    producer_runs: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

enum KeyPattern {
    Regex(Regex),
    Substring(String),
}

impl KeyPattern {
    fn parse(pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(re) => KeyPattern::Regex(re),
            Err(_) => KeyPattern::Substring(pattern.to_string()),
        }
    }

    fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Regex(re) => re.is_match(key),
            KeyPattern::Substring(s) => key.contains(s.as_str()),
        }
    }
}

/// Security-aware cache engine
pub struct CacheEngine {
    store: Mutex<CacheStorage>,
    flights: FlightRegistry,
    classifier: Classifier,
    ledger: Arc<ConsentLedger>,
    cipher: Cipher,
    invalidation: InvalidationTable,
    settings: CacheSettings,
    clock: Arc<dyn Clock>,
    counters: Counters,
    shutdown_tx: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CacheEngine {
    /// Create an engine using the wall clock
    pub fn new(settings: CacheSettings, classifier: Classifier, ledger: Arc<ConsentLedger>) -> Self {
        Self::with_clock(settings, classifier, ledger, Arc::new(SystemClock))
    }

    /// Create an engine with an explicit time source
    pub fn with_clock(
        settings: CacheSettings,
        classifier: Classifier,
        ledger: Arc<ConsentLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cipher = match settings.secret.as_deref() {
            Some(secret) if !secret.is_empty() => Cipher::from_secret(secret),
            _ => {
                log::debug!("No cache secret configured, using a random per-process key");
                Cipher::random()
            }
        };
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            store: Mutex::new(CacheStorage::new(settings.max_entries, settings.max_bytes)),
            flights: FlightRegistry::new(),
            classifier,
            ledger,
            cipher,
            invalidation: InvalidationTable::default(),
            settings,
            clock,
            counters: Counters::default(),
            shutdown_tx,
            sweeper: Mutex::new(None),
        }
    }

    /// Build an engine and its consent ledger from configuration
    pub fn from_config(config: &Config) -> Self {
        let ledger = Arc::new(ConsentLedger::new(config.consent.clone()));
        Self::new(
            config.cache.clone(),
            Classifier::new(config.classifier.clone()),
            ledger,
        )
        .with_invalidation(InvalidationTable::with_rules(&config.invalidation.rules))
    }

    /// Replace the invalidation table
    pub fn with_invalidation(mut self, table: InvalidationTable) -> Self {
        self.invalidation = table;
        self
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn ledger(&self) -> &Arc<ConsentLedger> {
        &self.ledger
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Pre-flight policy check without touching the cache
    pub fn classify(&self, value: &Value, domain: &str, operation: &str) -> Classification {
        self.classifier
            .classify(value, &ClassifyContext::new(domain, operation))
    }

    /// Read a value. Never fails: anything unusable is a miss.
    pub fn get(&self, key: &str, ctx: &AccessContext) -> Option<Value> {
        self.lookup(key, ctx, true)
    }

    /// Read an entry. Hit, miss and consent-block counters are only updated
    /// when `record` is set; expirations and decrypt failures always are.
    fn lookup(&self, key: &str, ctx: &AccessContext, record: bool) -> Option<Value> {
        let now = self.clock.now();
        let bump = |counter: &AtomicU64| {
            if record {
                Counters::bump(counter);
            }
        };

        let (payload, generation) = {
            let mut store = self.lock_store();
            let Some(entry) = store.peek(key) else {
                bump(&self.counters.misses);
                log::debug!("Cache miss: {}", key);
                return None;
            };

            if entry.is_expired(now) {
                store.remove(key);
                Counters::bump(&self.counters.expirations);
                bump(&self.counters.misses);
                log::debug!("Cache miss (expired): {}", key);
                return None;
            }

            if entry.consent_required && !self.consent_allows(entry, ctx) {
                bump(&self.counters.consent_blocks);
                log::debug!("Cache consent block: {}", key);
                return None;
            }

            let entry = store.touch(key, now)?;
            (entry.payload.clone(), entry.generation)
        };

        match self.decode(key, &payload) {
            Ok(value) => {
                bump(&self.counters.hits);
                log::debug!("Cache hit: {}", key);
                Some(value)
            }
            Err(e) => {
                log::warn!("Dropping unreadable cache entry {}: {}", key, e);
                self.lock_store().remove_if_generation(key, generation);
                Counters::bump(&self.counters.decrypt_failures);
                bump(&self.counters.misses);
                None
            }
        }
    }

    /// Typed read; a value that does not deserialize into `T` is a miss.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str, ctx: &AccessContext) -> Option<T> {
        self.get(key, ctx)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Store a value if policy allows. Returns whether it was stored.
    pub fn set(&self, key: &str, value: &Value, options: &SetOptions) -> Result<bool> {
        self.validate_key(key)?;

        let classification = self.classifier.classify(
            value,
            &ClassifyContext::new(&options.domain, &options.operation),
        );

        if !classification.cacheable {
            Counters::bump(&self.counters.policy_refusals);
            if self.lock_store().remove(key).is_some() {
                log::debug!("Dropped previous value of {} after policy refusal", key);
            }
            log::debug!("Not caching {}: {}", key, classification.reason);
            return Ok(false);
        }

        if classification.requires_consent && options.user_id.is_none() {
            return Err(CacheError::MissingUserId(key.to_string()).into());
        }

        let ttl = self.effective_ttl(&classification, options.ttl_override);
        let bytes = serde_json::to_vec(value)?;
        let payload = if classification.requires_encryption {
            StoredPayload::Sealed(self.cipher.seal(key, &bytes)?)
        } else {
            StoredPayload::Plain(Arc::new(bytes))
        };

        let now = self.clock.now();
        let entry = CacheEntry {
            key: key.to_string(),
            size_bytes: payload.stored_len(),
            payload,
            created_at: now,
            last_accessed_at: now,
            expires_at: Some(add_duration(now, ttl)),
            hit_count: 0,
            sensitivity_level: classification.level,
            consent_required: classification.requires_consent,
            consent_category: classification.consent_category,
            owner: options.user_id.clone(),
            source_category: options.domain.clone(),
            operation: options.operation.clone(),
            generation: 0,
        };

        match self.lock_store().put(entry) {
            PutOutcome::Stored { evicted } => {
                if !evicted.is_empty() {
                    Counters::add(&self.counters.evictions, evicted.len());
                    log::debug!("Evicted {} entries to store {}", evicted.len(), key);
                }
                Counters::bump(&self.counters.sets);
                log::debug!(
                    "Cached {} ({}, ttl {}s): {}",
                    key,
                    classification.level,
                    ttl.as_secs(),
                    classification.reason
                );
                Ok(true)
            }
            PutOutcome::TooLarge => {
                log::warn!(
                    "Not caching {}: entry exceeds the {} byte budget",
                    key,
                    self.settings.max_bytes
                );
                Ok(false)
            }
        }
    }

    /// Typed write through serde
    pub fn set_as<T: Serialize>(&self, key: &str, value: &T, options: &SetOptions) -> Result<bool> {
        let value = serde_json::to_value(value)?;
        self.set(key, &value, options)
    }

    /// Delete a specific entry
    pub fn delete(&self, key: &str) -> bool {
        self.lock_store().remove(key).is_some()
    }

    /// Bulk removal; an empty filter clears everything.
    pub fn clear(&self, filter: &ClearFilter) -> usize {
        let mut store = self.lock_store();
        if filter.pattern.is_none() && filter.domain.is_none() {
            return store.clear_all().entries_removed;
        }

        let pattern = filter.pattern.as_deref().map(KeyPattern::parse);
        let removed = store.remove_where(|e| {
            filter
                .domain
                .as_deref()
                .is_none_or(|d| e.source_category.eq_ignore_ascii_case(d))
                && pattern.as_ref().is_none_or(|p| p.matches(&e.key))
        });
        log::debug!("Cleared {} entries", removed);
        removed
    }

    /// Fetch through the cache with single-flight deduplication.
    ///
    /// A fresh cached value is returned directly. Otherwise at most one
    /// `produce` runs per key at a time; concurrent callers for the same key
    /// wait for it and share its value or error. The produced value is
    /// stored via [`CacheEngine::set`]; a refused or failed store does not
    /// fail the fetch.
    pub async fn deduplicate<F, Fut>(
        &self,
        key: &str,
        ctx: &AccessContext,
        options: &SetOptions,
        produce: F,
    ) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Value>>,
    {
        self.validate_key(key)?;

        if let Some(value) = self.get(key, ctx) {
            return Ok(value);
        }

        let guard = match self.flights.join_or_lead(key) {
            Role::Follower(rx) => {
                Counters::bump(&self.counters.dedup_joins);
                log::debug!("Joining in-flight fetch for {}", key);
                return flight::wait(key, rx).await;
            }
            Role::Leader(guard) => guard,
        };

        // A previous leader may have stored the value since our miss
        if let Some(value) = self.lookup(key, ctx, false) {
            guard.complete(Ok(value.clone()));
            return Ok(value);
        }

        Counters::bump(&self.counters.producer_runs);
        let outcome = produce().await.map_err(Arc::new);

        if let Ok(value) = &outcome
            && let Err(e) = self.set(key, value, options)
        {
            log::warn!("Produced value for {} was not cached: {}", key, e);
        }

        guard.complete(outcome.clone());
        outcome.map_err(Error::Producer)
    }

    /// Apply a domain event from the invalidation table. Returns entries removed.
    pub fn invalidate_by_domain_event(&self, event: &str, ctx: &EventContext) -> usize {
        let Some(tags) = self.invalidation.tags_for(&ctx.domain, event) else {
            log::debug!("No invalidation rule for {}/{}", ctx.domain, event);
            return 0;
        };

        let clear_domain = tags.iter().any(|t| t == ALL_TAG);
        let removed = self.lock_store().remove_where(|e| {
            e.source_category.eq_ignore_ascii_case(&ctx.domain)
                && (clear_domain || invalidation::matches_tags(&e.key, &e.operation, &tags))
        });

        log::info!(
            "Event {}/{} invalidated {} entries",
            ctx.domain,
            event,
            removed
        );
        removed
    }

    /// Revoke consent and purge the user's cached data in those categories.
    /// Returns the number of entries purged.
    pub fn revoke_consent(
        &self,
        user_id: &str,
        categories: &[ConsentCategory],
        options: &RevokeOptions,
    ) -> Result<usize> {
        self.ledger.revoke(user_id, categories, options)?;
        let purged = self.lock_store().remove_where(|e| {
            e.owner.as_deref() == Some(user_id)
                && e.consent_category.is_some_and(|c| categories.contains(&c))
        });
        if purged > 0 {
            log::info!("Purged {} cached entries after consent revocation", purged);
        }
        Ok(purged)
    }

    /// Right to erasure: drop the user's consent data and every cached entry
    /// they own. Returns the number of entries purged.
    pub fn erase_user(&self, user_id: &str) -> usize {
        self.ledger.erase(user_id);
        self.lock_store()
            .remove_where(|e| e.owner.as_deref() == Some(user_id))
    }

    /// Remove expired entries now
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let removed = self.lock_store().remove_expired(now);
        if removed > 0 {
            Counters::add(&self.counters.expirations, removed);
            log::debug!("Expiry sweep removed {} entries", removed);
        }
        removed
    }

    /// Start the background expiry sweep on the current tokio runtime.
    ///
    /// Returns false if a sweeper is already running or no runtime is
    /// available. The task stops on [`CacheEngine::shutdown`] or when the
    /// engine is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> bool {
        let mut slot = self.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() || *self.shutdown_tx.borrow() {
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("No tokio runtime available, expiry sweeper not started");
            return false;
        };

        let engine = Arc::downgrade(self);
        let period = self.settings.sweep_interval();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately
            ticker.tick().await;

            log::info!("Expiry sweeper started (every {}s)", period.as_secs());
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let Some(engine) = engine.upgrade() else {
                            break;
                        };
                        engine.sweep_expired();
                    }
                }
            }
            log::info!("Expiry sweeper stopped");
        });

        *slot = Some(handle);
        true
    }

    /// Stop the background sweeper and wait for it to finish
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            log::warn!("Expiry sweeper ended abnormally: {}", e);
        }
    }

    /// Switch new writes to a fresh encryption key; existing entries keep
    /// their key and stay readable. Returns the new key id.
    pub fn rotate_key(&self, secret: Option<&str>) -> u32 {
        self.cipher.rotate(secret)
    }

    /// Metadata of a live entry, without its payload
    pub fn inspect(&self, key: &str) -> Option<EntryMetadata> {
        self.lock_store().peek(key).map(CacheEntry::metadata)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock_store().contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock_store().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_store().is_empty()
    }

    /// Snapshot of counters and usage
    pub fn stats(&self) -> CacheStats {
        let storage = self.lock_store().stats(self.clock.now());
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let hits = load(&self.counters.hits);
        let misses = load(&self.counters.misses);
        let consent_blocks = load(&self.counters.consent_blocks);
        let lookups = hits + misses + consent_blocks;

        CacheStats {
            hits,
            misses,
            consent_blocks,
            evictions: load(&self.counters.evictions),
            expirations: load(&self.counters.expirations),
            decrypt_failures: load(&self.counters.decrypt_failures),
            policy_refusals: load(&self.counters.policy_refusals),
            sets: load(&self.counters.sets),
            dedup_joins: load(&self.counters.dedup_joins),
            producer_runs: load(&self.counters.producer_runs),
            entries: storage.total_entries,
            expired_entries: storage.expired_entries,
            encrypted_entries: storage.encrypted_entries,
            total_bytes: storage.total_size_bytes,
            max_entries: storage.max_entries,
            max_bytes: storage.max_bytes,
            in_flight: self.flights.in_flight(),
            oldest_entry: storage.oldest_entry,
            newest_entry: storage.newest_entry,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    fn lock_store(&self) -> MutexGuard<'_, CacheStorage> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn validate_key(&self, key: &str) -> Result<()> {
        if key.trim().is_empty() {
            return Err(CacheError::InvalidKey("key must not be empty".to_string()).into());
        }
        if key.len() > self.settings.max_key_len {
            return Err(CacheError::InvalidKey(format!(
                "key is {} bytes, limit is {}",
                key.len(),
                self.settings.max_key_len
            ))
            .into());
        }
        if key.chars().any(char::is_control) {
            return Err(
                CacheError::InvalidKey("key must not contain control characters".to_string())
                    .into(),
            );
        }
        Ok(())
    }

    fn effective_ttl(&self, classification: &Classification, ttl_override: Option<Duration>) -> Duration {
        match ttl_override {
            Some(ttl) if classification.level == SensitivityLevel::Sensitive => {
                ttl.min(self.classifier.sensitive_ceiling())
            }
            Some(ttl) => ttl,
            None if classification.ttl_seconds > 0 => classification.ttl(),
            None => self.settings.default_ttl(),
        }
    }

    fn consent_allows(&self, entry: &CacheEntry, ctx: &AccessContext) -> bool {
        let Some(user) = ctx.user_id.as_deref() else {
            return false;
        };
        if entry.owner.as_deref().is_some_and(|owner| owner != user) {
            return false;
        }
        match entry.consent_category {
            Some(category) => {
                self.ledger
                    .has_consent(user, category, Some(&entry.source_category))
            }
            None => false,
        }
    }

    fn decode(&self, key: &str, payload: &StoredPayload) -> Result<Value> {
        let bytes = match payload {
            StoredPayload::Plain(bytes) => return Ok(serde_json::from_slice(bytes)?),
            StoredPayload::Sealed(sealed) => self.cipher.open(key, sealed)?,
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[cfg(test)]
    fn with_store<R>(&self, f: impl FnOnce(&mut CacheStorage) -> R) -> R {
        f(&mut self.lock_store())
    }
}

impl Drop for CacheEngine {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::storage::StoredPayload;
    use crate::clock::ManualClock;
    use crate::consent::{ConsentSettings, GrantOptions};
    use serde_json::json;

    struct Fixture {
        engine: CacheEngine,
        clock: Arc<ManualClock>,
    }

    fn fixture(settings: CacheSettings) -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let shared: Arc<dyn Clock> = clock.clone();
        let ledger = Arc::new(ConsentLedger::with_clock(
            ConsentSettings::default(),
            shared.clone(),
        ));
        let engine = CacheEngine::with_clock(settings, Classifier::default(), ledger, shared);
        Fixture { engine, clock }
    }

    fn default_fixture() -> Fixture {
        fixture(CacheSettings::default())
    }

    fn balance() -> Value {
        json!({"accountId": "acc-1", "balance": 1520.75, "currency": "EUR"})
    }

    fn banking(user: &str) -> SetOptions {
        SetOptions::new("banking", "getBalance").user(user)
    }

    fn grant_financial(engine: &CacheEngine, user: &str) {
        engine
            .ledger()
            .grant(
                user,
                &[ConsentCategory::CacheFinancialData],
                &GrantOptions::default(),
            )
            .unwrap();
    }

    #[test]
    fn test_public_round_trip() {
        let f = default_fixture();
        let value = json!({"products": ["lamp", "desk"]});

        assert!(f.engine.set("catalog:list", &value, &SetOptions::new("catalog", "list")).unwrap());

        assert_eq!(f.engine.get("catalog:list", &AccessContext::anonymous()), Some(value));
        let meta = f.engine.inspect("catalog:list").unwrap();
        assert!(!meta.encrypted);
        assert_eq!(meta.sensitivity_level, SensitivityLevel::Public);
        assert_eq!(meta.hit_count, 1);
    }

    #[test]
    fn test_miss_is_counted() {
        let f = default_fixture();
        assert_eq!(f.engine.get("nothing", &AccessContext::anonymous()), None);
        assert_eq!(f.engine.stats().misses, 1);
    }

    #[test]
    fn test_secret_is_never_stored() {
        let f = default_fixture();
        let value = json!({"user": "ada", "password": "hunter2"});

        let stored = f.engine.set("login", &value, &SetOptions::new("accounts", "login")).unwrap();

        assert!(!stored);
        assert!(!f.engine.contains("login"));
        assert_eq!(f.engine.stats().policy_refusals, 1);
    }

    #[test]
    fn test_refused_set_drops_previous_value() {
        let f = default_fixture();
        let opts = SetOptions::new("accounts", "profile");
        f.engine.set("k", &json!({"plan": "free"}), &opts).unwrap();

        let stored = f.engine.set("k", &json!({"api_key": "abc"}), &opts).unwrap();

        assert!(!stored);
        assert!(!f.engine.contains("k"));
    }

    #[test]
    fn test_sensitive_requires_user() {
        let f = default_fixture();
        let err = f
            .engine
            .set("bal", &balance(), &SetOptions::new("banking", "getBalance"))
            .unwrap_err();

        assert!(matches!(err, Error::Cache(CacheError::MissingUserId(_))));
    }

    #[test]
    fn test_sensitive_entry_is_encrypted() {
        let f = default_fixture();
        f.engine.set("bal", &balance(), &banking("u1")).unwrap();

        let meta = f.engine.inspect("bal").unwrap();
        assert!(meta.encrypted);
        assert_eq!(meta.key_id, Some(1));
        assert_eq!(meta.consent_category, Some(ConsentCategory::CacheFinancialData));
        assert_eq!(f.engine.stats().encrypted_entries, 1);
    }

    #[test]
    fn test_consent_gates_reads() {
        let f = default_fixture();
        f.engine.set("bal", &balance(), &banking("u1")).unwrap();

        assert_eq!(f.engine.get("bal", &AccessContext::user("u1")), None);
        assert_eq!(f.engine.get("bal", &AccessContext::anonymous()), None);

        grant_financial(&f.engine, "u1");
        assert_eq!(f.engine.get("bal", &AccessContext::user("u1")), Some(balance()));

        grant_financial(&f.engine, "u2");
        assert_eq!(f.engine.get("bal", &AccessContext::user("u2")), None);

        let stats = f.engine.stats();
        assert_eq!(stats.consent_blocks, 3);
        assert_eq!(stats.hits, 1);
        assert!(f.engine.contains("bal"));
    }

    #[test]
    fn test_consent_scope_limits_domain() {
        let f = default_fixture();
        f.engine.set("bal", &balance(), &banking("u1")).unwrap();
        f.engine
            .ledger()
            .grant(
                "u1",
                &[ConsentCategory::CacheFinancialData],
                &GrantOptions {
                    scopes: vec!["trading".to_string()],
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(f.engine.get("bal", &AccessContext::user("u1")), None);
    }

    #[test]
    fn test_tampered_ciphertext_is_a_miss() {
        let f = default_fixture();
        f.engine.set("bal", &balance(), &banking("u1")).unwrap();
        grant_financial(&f.engine, "u1");

        f.engine.with_store(|store| {
            let entry = store.peek_mut("bal").unwrap();
            if let StoredPayload::Sealed(sealed) = &mut entry.payload {
                let mut bytes = (*sealed.ciphertext).clone();
                bytes[0] ^= 0x01;
                sealed.ciphertext = Arc::new(bytes);
            }
        });

        assert_eq!(f.engine.get("bal", &AccessContext::user("u1")), None);
        assert!(!f.engine.contains("bal"));
        let stats = f.engine.stats();
        assert_eq!(stats.decrypt_failures, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_entries_expire() {
        let f = default_fixture();
        let opts = SetOptions::new("catalog", "list");
        f.engine.set("k", &json!({"n": 1}), &opts).unwrap();

        f.clock.advance(Duration::from_secs(3599));
        assert!(f.engine.get("k", &AccessContext::anonymous()).is_some());

        f.clock.advance(Duration::from_secs(1));
        assert!(f.engine.get("k", &AccessContext::anonymous()).is_none());
        assert!(!f.engine.contains("k"));
        assert_eq!(f.engine.stats().expirations, 1);
    }

    #[test]
    fn test_sensitive_ttl_override_is_clamped() {
        let f = default_fixture();
        let opts = banking("u1").ttl(Duration::from_secs(3600));
        f.engine.set("bal", &balance(), &opts).unwrap();

        let meta = f.engine.inspect("bal").unwrap();
        let ttl = meta.expires_at.unwrap() - meta.created_at;
        assert_eq!(ttl.num_seconds(), 300);
    }

    #[test]
    fn test_public_ttl_override_is_honored() {
        let f = default_fixture();
        let opts = SetOptions::new("catalog", "list").ttl(Duration::from_secs(5));
        f.engine.set("k", &json!({"n": 1}), &opts).unwrap();

        f.clock.advance(Duration::from_secs(5));
        assert!(f.engine.get("k", &AccessContext::anonymous()).is_none());
    }

    #[test]
    fn test_weather_ttl_is_capped() {
        let f = default_fixture();
        f.engine
            .set("w", &json!({"temp": 21}), &SetOptions::new("weather", "current"))
            .unwrap();

        let meta = f.engine.inspect("w").unwrap();
        let ttl = meta.expires_at.unwrap() - meta.created_at;
        assert_eq!(ttl.num_seconds(), 900);
    }

    #[test]
    fn test_lru_eviction() {
        let f = fixture(CacheSettings {
            max_entries: 2,
            ..Default::default()
        });
        let opts = SetOptions::new("catalog", "list");
        f.engine.set("a", &json!(1), &opts).unwrap();
        f.engine.set("b", &json!(2), &opts).unwrap();
        f.engine.get("a", &AccessContext::anonymous());
        f.engine.set("c", &json!(3), &opts).unwrap();

        assert!(f.engine.contains("a"));
        assert!(!f.engine.contains("b"));
        assert!(f.engine.contains("c"));
        assert_eq!(f.engine.len(), 2);
        assert_eq!(f.engine.stats().evictions, 1);
    }

    #[test]
    fn test_invalid_keys() {
        let f = default_fixture();
        let opts = SetOptions::new("catalog", "list");

        for key in ["", "   ", "bad\nkey"] {
            assert!(matches!(
                f.engine.set(key, &json!(1), &opts),
                Err(Error::Cache(CacheError::InvalidKey(_)))
            ));
        }
        let long = "k".repeat(513);
        assert!(f.engine.set(&long, &json!(1), &opts).is_err());
    }

    #[test]
    fn test_clear_by_pattern_and_domain() {
        let f = default_fixture();
        f.engine.set("catalog:list", &json!(1), &SetOptions::new("catalog", "list")).unwrap();
        f.engine.set("catalog:item:7", &json!(2), &SetOptions::new("catalog", "item")).unwrap();
        f.engine.set("news:top", &json!(3), &SetOptions::new("news", "top")).unwrap();

        let removed = f.engine.clear(&ClearFilter {
            pattern: Some("^catalog:item".to_string()),
            domain: None,
        });
        assert_eq!(removed, 1);

        let removed = f.engine.clear(&ClearFilter {
            pattern: None,
            domain: Some("NEWS".to_string()),
        });
        assert_eq!(removed, 1);
        assert_eq!(f.engine.len(), 1);

        assert_eq!(f.engine.clear(&ClearFilter::default()), 1);
        assert!(f.engine.is_empty());
    }

    #[test]
    fn test_invalid_regex_falls_back_to_substring() {
        let f = default_fixture();
        let opts = SetOptions::new("catalog", "list");
        f.engine.set("list(1)", &json!(1), &opts).unwrap();
        f.engine.set("list-2", &json!(2), &opts).unwrap();

        let removed = f.engine.clear(&ClearFilter {
            pattern: Some("(1".to_string()),
            domain: None,
        });

        assert_eq!(removed, 1);
        assert!(f.engine.contains("list-2"));
    }

    #[test]
    fn test_domain_event_invalidation() {
        let f = default_fixture();
        f.engine.set("getBalance:u1", &balance(), &banking("u1")).unwrap();
        f.engine
            .set(
                "listTransactions:u1",
                &json!({"transactions": []}),
                &SetOptions::new("banking", "listTransactions").user("u1"),
            )
            .unwrap();
        f.engine
            .set(
                "getProfile:u1",
                &json!({"nickname": "ada"}),
                &SetOptions::new("banking", "getProfile").user("u1"),
            )
            .unwrap();
        f.engine
            .set("forecast", &json!({"temp": 20}), &SetOptions::new("weather", "forecast"))
            .unwrap();

        let removed = f
            .engine
            .invalidate_by_domain_event("transaction_created", &EventContext::new("banking"));
        assert_eq!(removed, 2);
        assert!(f.engine.contains("getProfile:u1"));

        let removed = f
            .engine
            .invalidate_by_domain_event("token_refreshed", &EventContext::new("banking"));
        assert_eq!(removed, 1);
        assert!(f.engine.contains("forecast"));

        assert_eq!(
            f.engine
                .invalidate_by_domain_event("unheard_of", &EventContext::new("banking")),
            0
        );
    }

    #[test]
    fn test_revoke_consent_purges_entries() {
        let f = default_fixture();
        grant_financial(&f.engine, "u1");
        f.engine.set("bal:u1", &balance(), &banking("u1")).unwrap();
        f.engine.set("bal:u2", &balance(), &banking("u2")).unwrap();

        let purged = f
            .engine
            .revoke_consent(
                "u1",
                &[ConsentCategory::CacheFinancialData],
                &RevokeOptions::default(),
            )
            .unwrap();

        assert_eq!(purged, 1);
        assert!(!f.engine.contains("bal:u1"));
        assert!(f.engine.contains("bal:u2"));
        assert!(!f.engine.ledger().has_consent("u1", ConsentCategory::CacheFinancialData, None));
    }

    #[test]
    fn test_erase_user() {
        let f = default_fixture();
        grant_financial(&f.engine, "u1");
        f.engine.set("bal:u1", &balance(), &banking("u1")).unwrap();
        f.engine
            .set("prefs:u1", &json!({"theme": "dark"}), &SetOptions::new("ui", "prefs").user("u1"))
            .unwrap();

        assert_eq!(f.engine.erase_user("u1"), 2);
        assert!(f.engine.is_empty());
        assert_eq!(f.engine.ledger().user_count(), 0);
    }

    #[test]
    fn test_sweep_expired() {
        let f = default_fixture();
        let opts = SetOptions::new("catalog", "list");
        let start = f.clock.now();
        f.engine.set("short", &json!(1), &opts.clone().ttl(Duration::from_secs(10))).unwrap();
        f.engine.set("long", &json!(2), &opts).unwrap();

        f.clock.advance(Duration::from_secs(11));

        let before = f.engine.stats();
        assert_eq!(before.entries, 2);
        assert_eq!(before.expired_entries, 1);
        assert_eq!(before.oldest_entry, Some(start));
        assert_eq!(before.newest_entry, Some(start));

        assert_eq!(f.engine.sweep_expired(), 1);
        assert!(f.engine.contains("long"));

        let after = f.engine.stats();
        assert_eq!(after.expirations, 1);
        assert_eq!(after.expired_entries, 0);
    }

    #[test]
    fn test_key_rotation_keeps_old_entries_readable() {
        let f = default_fixture();
        grant_financial(&f.engine, "u1");
        f.engine.set("old", &balance(), &banking("u1")).unwrap();

        assert_eq!(f.engine.rotate_key(None), 2);
        f.engine.set("new", &balance(), &banking("u1")).unwrap();

        let ctx = AccessContext::user("u1");
        assert_eq!(f.engine.get("old", &ctx), Some(balance()));
        assert_eq!(f.engine.get("new", &ctx), Some(balance()));
        assert_eq!(f.engine.inspect("new").unwrap().key_id, Some(2));
    }

    #[test]
    fn test_typed_access() {
        #[derive(Debug, PartialEq, Serialize, serde::Deserialize)]
        struct Forecast {
            city: String,
            temp: i32,
        }

        let f = default_fixture();
        let forecast = Forecast {
            city: "Oslo".to_string(),
            temp: 4,
        };
        f.engine
            .set_as("oslo", &forecast, &SetOptions::new("weather", "forecast"))
            .unwrap();

        let ctx = AccessContext::anonymous();
        assert_eq!(f.engine.get_as::<Forecast>("oslo", &ctx), Some(forecast));
        assert_eq!(f.engine.get_as::<Vec<u8>>("oslo", &ctx), None);
    }

    #[test]
    fn test_hit_rate() {
        let f = default_fixture();
        let opts = SetOptions::new("catalog", "list");
        f.engine.set("k", &json!(1), &opts).unwrap();
        let ctx = AccessContext::anonymous();
        f.engine.get("k", &ctx);
        f.engine.get("k", &ctx);
        f.engine.get("k", &ctx);
        f.engine.get("missing", &ctx);

        assert!((f.engine.stats().hit_rate - 0.75).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_deduplicate_caches_produced_value() {
        let f = default_fixture();
        let ctx = AccessContext::anonymous();
        let opts = SetOptions::new("catalog", "list");

        let value = f
            .engine
            .deduplicate("k", &ctx, &opts, || async { Ok(json!({"n": 1})) })
            .await
            .unwrap();
        assert_eq!(value, json!({"n": 1}));

        let again = f
            .engine
            .deduplicate("k", &ctx, &opts, || async { Ok(json!({"n": 2})) })
            .await
            .unwrap();
        assert_eq!(again, json!({"n": 1}));

        let stats = f.engine.stats();
        assert_eq!(stats.producer_runs, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_deduplicate_failure_is_not_cached() {
        let f = default_fixture();
        let ctx = AccessContext::anonymous();
        let opts = SetOptions::new("catalog", "list");

        let err = f
            .engine
            .deduplicate("k", &ctx, &opts, || async { Err(anyhow::anyhow!("upstream down")) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Producer(_)));
        assert!(!f.engine.contains("k"));

        let value = f
            .engine
            .deduplicate("k", &ctx, &opts, || async { Ok(json!(7)) })
            .await
            .unwrap();
        assert_eq!(value, json!(7));
    }

    #[tokio::test]
    async fn test_deduplicate_returns_uncacheable_value() {
        let f = default_fixture();
        let ctx = AccessContext::anonymous();
        let opts = SetOptions::new("auth", "login");

        let value = f
            .engine
            .deduplicate("login", &ctx, &opts, || async { Ok(json!({"ok": true})) })
            .await
            .unwrap();

        assert_eq!(value, json!({"ok": true}));
        assert!(!f.engine.contains("login"));
    }
}
