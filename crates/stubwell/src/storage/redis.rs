//! Redis implementation of [`KvStore`] using a synchronous blocking client
//! with r2d2 connection pooling.
//!
//! # Compatibility
//!
//! - Redis 6.x, 7.x: fully supported
//! - Valkey: likely compatible but not officially supported

use super::KvStore;
use anyhow::{Context, Result};
use redis::{Commands, Connection};
use std::sync::Mutex;

/// Simple connection manager for Redis
struct RedisConnectionManager {
    client: redis::Client,
}

impl RedisConnectionManager {
    fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

impl r2d2::ManageConnection for RedisConnectionManager {
    type Connection = Mutex<Connection>;
    type Error = redis::RedisError;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let conn = self.client.get_connection()?;
        Ok(Mutex::new(conn))
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        redis::cmd("PING").query(conn.get_mut().unwrap())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

pub struct RedisStore {
    pool: r2d2::Pool<RedisConnectionManager>,
}

impl RedisStore {
    /// Create a new Redis store and verify the connection with PING.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g. "redis://localhost:6379")
    /// * `pool_size` - Connection pool size
    pub fn new(url: &str, pool_size: usize) -> Result<Self> {
        let client = redis::Client::open(url).context("Failed to parse Redis URL")?;

        let manager = RedisConnectionManager::new(client);

        let pool = r2d2::Pool::builder()
            .max_size(pool_size as u32)
            .connection_timeout(std::time::Duration::from_secs(5))
            .build(manager)
            .context("Failed to create Redis connection pool")?;

        // Test connection with PING
        {
            let conn = pool.get().context("Failed to get connection from pool")?;
            let _: String = redis::cmd("PING")
                .query(&mut *conn.lock().unwrap())
                .context("Failed to PING Redis")?;
        }

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<RedisConnectionManager>> {
        self.pool
            .get()
            .context("Failed to get Redis connection from pool")
    }
}

impl KvStore for RedisStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value: Option<String> = conn.lock().unwrap().get(key).context("Redis GET failed")?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        let _: () = conn
            .lock()
            .unwrap()
            .set(key, value)
            .context("Redis SET failed")?;
        Ok(())
    }

    fn set_ex(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<()> {
        let conn = self.conn()?;
        let _: () = redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_seconds)
            .arg(value)
            .query(&mut *conn.lock().unwrap())
            .context("Redis SETEX failed")?;
        Ok(())
    }

    fn del(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;
        let _: () = conn.lock().unwrap().del(key).context("Redis DEL failed")?;
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn
            .lock()
            .unwrap()
            .exists(key)
            .context("Redis EXISTS failed")?;
        Ok(count > 0)
    }

    fn expire(&self, key: &str, ttl_seconds: i64) -> Result<()> {
        let conn = self.conn()?;
        let _: () = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_seconds)
            .query(&mut *conn.lock().unwrap())
            .context("Redis EXPIRE failed")?;
        Ok(())
    }

    fn lpush(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        let _: () = conn
            .lock()
            .unwrap()
            .lpush(key, value)
            .context("Redis LPUSH failed")?;
        Ok(())
    }

    fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        let conn = self.conn()?;
        let _: () = redis::cmd("LTRIM")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query(&mut *conn.lock().unwrap())
            .context("Redis LTRIM failed")?;
        Ok(())
    }

    fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let items: Vec<String> = conn
            .lock()
            .unwrap()
            .lrange(key, start as isize, stop as isize)
            .context("Redis LRANGE failed")?;
        Ok(items)
    }

    fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        let _: () = conn
            .lock()
            .unwrap()
            .hset(key, field, value)
            .context("Redis HSET failed")?;
        Ok(())
    }

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value: Option<String> = conn
            .lock()
            .unwrap()
            .hget(key, field)
            .context("Redis HGET failed")?;
        Ok(value)
    }

    fn hdel(&self, key: &str, field: &str) -> Result<()> {
        let conn = self.conn()?;
        let _: () = conn
            .lock()
            .unwrap()
            .hdel(key, field)
            .context("Redis HDEL failed")?;
        Ok(())
    }

    fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>> {
        let conn = self.conn()?;
        let pairs: Vec<(String, String)> = redis::cmd("HGETALL")
            .arg(key)
            .query(&mut *conn.lock().unwrap())
            .context("Redis HGETALL failed")?;
        Ok(pairs)
    }

    fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        let conn = self.conn()?;
        let exists: bool = conn
            .lock()
            .unwrap()
            .hexists(key, field)
            .context("Redis HEXISTS failed")?;
        Ok(exists)
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let found: Vec<String> = conn
            .lock()
            .unwrap()
            .keys(pattern)
            .context("Redis KEYS failed")?;
        Ok(found)
    }

    fn ping(&self) -> Result<()> {
        let conn = self.conn()?;
        let _: String = redis::cmd("PING")
            .query(&mut *conn.lock().unwrap())
            .context("Failed to PING Redis")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Helper to check if Redis is available
    fn redis_available() -> bool {
        match redis::Client::open("redis://localhost:6379") {
            Ok(client) => client.get_connection().is_ok(),
            Err(_) => false,
        }
    }

    #[test]
    #[ignore] // Only run when Redis is available
    fn test_redis_get_set() {
        if !redis_available() {
            eprintln!("Skipping test: Redis not available");
            return;
        }

        let store = RedisStore::new("redis://localhost:6379", 5).unwrap();
        store.set("stubwell:test:k", "v").unwrap();
        assert_eq!(
            store.get("stubwell:test:k").unwrap(),
            Some("v".to_string())
        );
        store.del("stubwell:test:k").unwrap();
        assert_eq!(store.get("stubwell:test:k").unwrap(), None);
    }

    #[test]
    #[ignore] // Only run when Redis is available
    fn test_redis_list_bounded() {
        if !redis_available() {
            eprintln!("Skipping test: Redis not available");
            return;
        }

        let store = RedisStore::new("redis://localhost:6379", 5).unwrap();
        store.del("stubwell:test:l").unwrap();
        for i in 0..8 {
            store.lpush("stubwell:test:l", &i.to_string()).unwrap();
            store.ltrim("stubwell:test:l", 0, 4).unwrap();
        }
        let items = store.lrange("stubwell:test:l", 0, 4).unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(items[0], "7");
        store.del("stubwell:test:l").unwrap();
    }

    #[test]
    #[ignore] // Only run when Redis is available
    fn test_redis_hash_fields() {
        if !redis_available() {
            eprintln!("Skipping test: Redis not available");
            return;
        }

        let store = RedisStore::new("redis://localhost:6379", 5).unwrap();
        store.del("stubwell:test:h").unwrap();
        store.hset("stubwell:test:h", "f", "v").unwrap();
        assert!(store.hexists("stubwell:test:h", "f").unwrap());
        assert_eq!(
            store.hget("stubwell:test:h", "f").unwrap(),
            Some("v".to_string())
        );
        store.hdel("stubwell:test:h", "f").unwrap();
        assert!(!store.hexists("stubwell:test:h", "f").unwrap());
        store.del("stubwell:test:h").unwrap();
    }
}
