//! In-memory implementation of [`KvStore`].
//!
//! Stores everything in a Mutex'd map with per-key TTL bookkeeping. Useful
//! for development and for tests, where spinning up Redis is unwanted.

use super::{glob_match, KvStore};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

enum Slot {
    Str(String),
    List(Vec<String>),
    // Vec of pairs keeps field insertion order, which makes registry
    // load order deterministic in tests.
    Hash(Vec<(String, String)>),
}

struct Entry {
    slot: Slot,
    expires_at: Option<SystemTime>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) => SystemTime::now() > exp,
            None => false,
        }
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    data: Mutex<HashMap<String, Entry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ttl_to_expiry(ttl_seconds: i64) -> Option<SystemTime> {
        Some(SystemTime::now() + Duration::from_secs(ttl_seconds.max(0) as u64))
    }

    /// Drop the key if its TTL has lapsed. Called with the lock held so
    /// reads after expiry behave like Redis.
    fn evict_if_expired(data: &mut HashMap<String, Entry>, key: &str) {
        if data.get(key).is_some_and(Entry::is_expired) {
            data.remove(key);
        }
    }
}

impl KvStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut data = self.data.lock().unwrap();
        Self::evict_if_expired(&mut data, key);
        match data.get(key) {
            Some(Entry {
                slot: Slot::Str(v), ..
            }) => Ok(Some(v.clone())),
            _ => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        data.insert(
            key.to_string(),
            Entry {
                slot: Slot::Str(value.to_string()),
                expires_at: None,
            },
        );
        Ok(())
    }

    fn set_ex(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        data.insert(
            key.to_string(),
            Entry {
                slot: Slot::Str(value.to_string()),
                expires_at: Self::ttl_to_expiry(ttl_seconds),
            },
        );
        Ok(())
    }

    fn del(&self, key: &str) -> Result<()> {
        self.data.lock().unwrap().remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let mut data = self.data.lock().unwrap();
        Self::evict_if_expired(&mut data, key);
        Ok(data.contains_key(key))
    }

    fn expire(&self, key: &str, ttl_seconds: i64) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        Self::evict_if_expired(&mut data, key);
        if let Some(entry) = data.get_mut(key) {
            entry.expires_at = Self::ttl_to_expiry(ttl_seconds);
        }
        Ok(())
    }

    fn lpush(&self, key: &str, value: &str) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        Self::evict_if_expired(&mut data, key);
        let entry = data.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::List(Vec::new()),
            expires_at: None,
        });
        if let Slot::List(list) = &mut entry.slot {
            list.insert(0, value.to_string());
        }
        Ok(())
    }

    fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        Self::evict_if_expired(&mut data, key);
        if let Some(Entry {
            slot: Slot::List(list),
            ..
        }) = data.get_mut(key)
        {
            let start = start.max(0) as usize;
            let stop = stop.max(0) as usize;
            if start >= list.len() {
                list.clear();
            } else {
                let end = (stop + 1).min(list.len());
                *list = list[start..end].to_vec();
            }
        }
        Ok(())
    }

    fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let mut data = self.data.lock().unwrap();
        Self::evict_if_expired(&mut data, key);
        match data.get(key) {
            Some(Entry {
                slot: Slot::List(list),
                ..
            }) => {
                let start = start.max(0) as usize;
                let stop = stop.max(0) as usize;
                if start >= list.len() {
                    Ok(Vec::new())
                } else {
                    let end = (stop + 1).min(list.len());
                    Ok(list[start..end].to_vec())
                }
            }
            _ => Ok(Vec::new()),
        }
    }

    fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        Self::evict_if_expired(&mut data, key);
        let entry = data.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::Hash(Vec::new()),
            expires_at: None,
        });
        if let Slot::Hash(fields) = &mut entry.slot {
            match fields.iter_mut().find(|(f, _)| f == field) {
                Some((_, v)) => *v = value.to_string(),
                None => fields.push((field.to_string(), value.to_string())),
            }
        }
        Ok(())
    }

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut data = self.data.lock().unwrap();
        Self::evict_if_expired(&mut data, key);
        match data.get(key) {
            Some(Entry {
                slot: Slot::Hash(fields),
                ..
            }) => Ok(fields
                .iter()
                .find(|(f, _)| f == field)
                .map(|(_, v)| v.clone())),
            _ => Ok(None),
        }
    }

    fn hdel(&self, key: &str, field: &str) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        if let Some(Entry {
            slot: Slot::Hash(fields),
            ..
        }) = data.get_mut(key)
        {
            fields.retain(|(f, _)| f != field);
        }
        Ok(())
    }

    fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>> {
        let mut data = self.data.lock().unwrap();
        Self::evict_if_expired(&mut data, key);
        match data.get(key) {
            Some(Entry {
                slot: Slot::Hash(fields),
                ..
            }) => Ok(fields.clone()),
            _ => Ok(Vec::new()),
        }
    }

    fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        Ok(self.hget(key, field)?.is_some())
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let data = self.data.lock().unwrap();
        Ok(data
            .iter()
            .filter(|(k, e)| !e.is_expired() && glob_match(pattern, k))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_del() {
        let store = InMemoryStore::new();
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));
        assert!(store.exists("k").unwrap());
        store.del("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        assert!(!store.exists("k").unwrap());
    }

    #[test]
    fn test_set_ex_expires() {
        let store = InMemoryStore::new();
        store.set_ex("k", "v", 0).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_list_push_trim_range() {
        let store = InMemoryStore::new();
        for i in 0..8 {
            store.lpush("l", &i.to_string()).unwrap();
            store.ltrim("l", 0, 4).unwrap();
        }
        let items = store.lrange("l", 0, 4).unwrap();
        assert_eq!(items, vec!["7", "6", "5", "4", "3"]);
    }

    #[test]
    fn test_lrange_out_of_bounds() {
        let store = InMemoryStore::new();
        store.lpush("l", "a").unwrap();
        assert_eq!(store.lrange("l", 0, 100).unwrap(), vec!["a"]);
        assert!(store.lrange("l", 5, 10).unwrap().is_empty());
        assert!(store.lrange("missing", 0, 4).unwrap().is_empty());
    }

    #[test]
    fn test_hash_ops() {
        let store = InMemoryStore::new();
        store.hset("h", "f1", "v1").unwrap();
        store.hset("h", "f2", "v2").unwrap();
        store.hset("h", "f1", "v1b").unwrap();
        assert_eq!(store.hget("h", "f1").unwrap(), Some("v1b".to_string()));
        assert!(store.hexists("h", "f2").unwrap());
        assert_eq!(
            store.hgetall("h").unwrap(),
            vec![
                ("f1".to_string(), "v1b".to_string()),
                ("f2".to_string(), "v2".to_string())
            ]
        );
        store.hdel("h", "f1").unwrap();
        assert!(!store.hexists("h", "f1").unwrap());
    }

    #[test]
    fn test_keys_glob() {
        let store = InMemoryStore::new();
        store.set("stub:a:b:post", "1").unwrap();
        store.set("stub:a:c:get", "2").unwrap();
        store.set("history:a:b:post", "3").unwrap();
        let mut found = store.keys("stub:a:*").unwrap();
        found.sort();
        assert_eq!(found, vec!["stub:a:b:post", "stub:a:c:get"]);
    }

    #[test]
    fn test_expire_refresh() {
        let store = InMemoryStore::new();
        store.lpush("l", "a").unwrap();
        store.expire("l", 3600).unwrap();
        assert_eq!(store.lrange("l", 0, 4).unwrap(), vec!["a"]);
    }
}
