//! In-memory `KeyValueStore` for tests, with call counters and fault injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::error::{StoreError, StoreResult};
use crate::remote::KeyValueStore;

#[derive(Default)]
struct State {
    values: HashMap<String, (String, Option<Instant>)>,
    subscribers: HashMap<String, Vec<mpsc::Sender<String>>>,
}

/// Shared handle; clones observe the same data and counters.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    failing: Arc<AtomicBool>,
    gets: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with a connection error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `get`/`mget` calls seen.
    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of write calls seen.
    pub fn write_calls(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Writes a raw value, bypassing counters.
    pub fn insert_raw(&self, key: &str, value: &str) {
        let mut state = self.state.lock().unwrap();
        state.values.insert(key.to_string(), (value.to_string(), None));
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.values.get(key).map(|(v, _)| v.clone())
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Connection("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    fn live(state: &State, key: &str) -> Option<String> {
        state.values.get(key).and_then(|(value, expires)| match expires {
            Some(at) if Instant::now() >= *at => None,
            _ => Some(value.clone()),
        })
    }

    /// Glob match with `*`, `?` and backslash escapes, as the store's SCAN does.
    fn matches(pattern: &str, key: &str) -> bool {
        let pattern: Vec<char> = pattern.chars().collect();
        let key: Vec<char> = key.chars().collect();
        Self::glob(&pattern, &key)
    }

    fn glob(pattern: &[char], key: &[char]) -> bool {
        match pattern.first() {
            None => key.is_empty(),
            Some('*') => (0..=key.len()).any(|i| Self::glob(&pattern[1..], &key[i..])),
            Some('?') => !key.is_empty() && Self::glob(&pattern[1..], &key[1..]),
            Some('\\') if pattern.len() > 1 => {
                key.first() == Some(&pattern[1]) && Self::glob(&pattern[2..], &key[1..])
            }
            Some(c) => key.first() == Some(c) && Self::glob(&pattern[1..], &key[1..]),
        }
    }
}

impl KeyValueStore for InMemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.check()
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(Self::live(&state, key))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state.values.insert(key.to_string(), (value.to_string(), None));
        Ok(())
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state
            .values
            .insert(key.to_string(), (value.to_string(), Some(Instant::now() + ttl)));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let mut state = self.state.lock().unwrap();
        Ok(keys
            .iter()
            .filter(|key| state.values.remove(key.as_str()).is_some())
            .count() as u64)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(Self::live(&state, key).is_some())
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .values
            .keys()
            .filter(|key| Self::matches(pattern, key))
            .cloned()
            .collect())
    }

    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(keys.iter().map(|key| Self::live(&state, key)).collect())
    }

    async fn pipeline_set(&self, entries: &[(String, String, Duration)]) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let mut state = self.state.lock().unwrap();
        for (key, value, ttl) in entries {
            state
                .values
                .insert(key.clone(), (value.clone(), Some(Instant::now() + *ttl)));
        }
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let current = Self::live(&state, key)
            .map(|raw| {
                raw.parse::<i64>()
                    .map_err(|e| StoreError::Command(e.to_string()))
            })
            .transpose()?
            .unwrap_or(0);
        let next = current + delta;
        state.values.insert(key.to_string(), (next.to_string(), None));
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        match state.values.get_mut(key) {
            Some((_, expires)) => {
                *expires = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn publish(&self, channel: &str, message: &str) -> StoreResult<u64> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let subscribers = state.subscribers.entry(channel.to_string()).or_default();
        subscribers.retain(|tx| !tx.is_closed());
        let mut delivered = 0;
        for tx in subscribers.iter() {
            if tx.try_send(message.to_string()).is_ok() {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<mpsc::Receiver<String>> {
        self.check()?;
        let (tx, rx) = mpsc::channel(64);
        let mut state = self.state.lock().unwrap();
        state
            .subscribers
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}
