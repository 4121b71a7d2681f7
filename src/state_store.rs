//! Ephemeral key/value store with TTL, atomic incr/decr, and get-and-delete.
//!
//! Grounded in `original_source/app/state_store.py`: an in-memory backend
//! with a lazy TTL sweep on access, and an optional external (Redis-shaped)
//! coordinator that the store permanently falls back away from on any
//! failure, logging the degradation exactly once. Callers only ever see
//! the `StateStore` facade, never the backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct InMemoryBackend {
    map: Mutex<HashMap<String, Entry>>,
}

impl InMemoryBackend {
    fn sweep(map: &mut HashMap<String, Entry>, now: Instant) {
        map.retain(|_, e| e.expires_at.map(|t| t > now).unwrap_or(true));
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let mut map = self.map.lock().unwrap();
        let now = Instant::now();
        Self::sweep(&mut map, now);
        map.insert(
            key.to_string(),
            Entry { value: value.to_string(), expires_at: ttl.map(|d| now + d) },
        );
    }

    fn get(&self, key: &str) -> Option<String> {
        let mut map = self.map.lock().unwrap();
        let now = Instant::now();
        Self::sweep(&mut map, now);
        map.get(key).map(|e| e.value.clone())
    }

    fn get_and_delete(&self, key: &str) -> Option<String> {
        let mut map = self.map.lock().unwrap();
        let now = Instant::now();
        Self::sweep(&mut map, now);
        map.remove(key).map(|e| e.value)
    }

    fn delete(&self, key: &str) {
        let mut map = self.map.lock().unwrap();
        map.remove(key);
    }

    fn incr(&self, key: &str, ttl_on_create: Option<Duration>) -> i64 {
        let mut map = self.map.lock().unwrap();
        let now = Instant::now();
        Self::sweep(&mut map, now);
        let entry = map.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: ttl_on_create.map(|d| now + d),
        });
        let n: i64 = entry.value.parse().unwrap_or(0) + 1;
        entry.value = n.to_string();
        n
    }

    fn decr(&self, key: &str) -> i64 {
        let mut map = self.map.lock().unwrap();
        let now = Instant::now();
        Self::sweep(&mut map, now);
        let n = match map.get(key) {
            Some(e) => (e.value.parse::<i64>().unwrap_or(0) - 1).max(0),
            None => 0,
        };
        if n == 0 {
            map.remove(key);
        } else if let Some(e) = map.get_mut(key) {
            e.value = n.to_string();
        }
        n
    }
}

/// Ephemeral KV facade. `set/get/get_and_delete/delete/incr/decr`, namespaced
/// `im:*` keys, backed by memory or (optionally) a Redis-shaped coordinator.
/// `Clone` is cheap (an `Arc` bump) so the maintenance loop and the AV scan
/// worker can hold their own handle alongside Rocket's managed instance.
#[derive(Clone)]
pub struct StateStore {
    memory: Arc<InMemoryBackend>,
    redis: Option<redis::Client>,
    degraded: Arc<AtomicBool>,
    namespace: String,
}

impl StateStore {
    pub fn new_in_memory(namespace: &str) -> Self {
        Self {
            memory: Arc::new(InMemoryBackend::default()),
            redis: None,
            degraded: Arc::new(AtomicBool::new(false)),
            namespace: namespace.to_string(),
        }
    }

    pub fn new(namespace: &str, redis_url: Option<&str>) -> Self {
        let redis = redis_url.and_then(|url| match redis::Client::open(url) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "redis client init failed, starting in degraded (memory) mode");
                None
            }
        });
        Self {
            memory: Arc::new(InMemoryBackend::default()),
            redis,
            degraded: Arc::new(AtomicBool::new(false)),
            namespace: namespace.to_string(),
        }
    }

    fn k(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn redis_enabled(&self) -> bool {
        self.redis.is_some() && !self.degraded.load(Ordering::Relaxed)
    }

    fn degrade(&self, reason: &str) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            tracing::warn!(reason, "StateStore coordinator failed, degrading to in-memory backend for the remainder of the process");
        }
    }

    async fn redis_conn(&self) -> Option<redis::aio::MultiplexedConnection> {
        let client = self.redis.as_ref()?;
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                self.degrade(&e.to_string());
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let k = self.k(key);
        if self.redis_enabled() {
            if let Some(mut conn) = self.redis_conn().await {
                use redis::AsyncCommands;
                let result: redis::RedisResult<()> = match ttl {
                    Some(d) => conn.set_ex(&k, value, d.as_secs().max(1)).await,
                    None => conn.set(&k, value).await,
                };
                if let Err(e) = result {
                    self.degrade(&e.to_string());
                } else {
                    return;
                }
            }
        }
        self.memory.set(&k, value, ttl);
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let k = self.k(key);
        if self.redis_enabled() {
            if let Some(mut conn) = self.redis_conn().await {
                use redis::AsyncCommands;
                match conn.get::<_, Option<String>>(&k).await {
                    Ok(v) => return v,
                    Err(e) => self.degrade(&e.to_string()),
                }
            }
        }
        self.memory.get(&k)
    }

    pub async fn get_and_delete(&self, key: &str) -> Option<String> {
        let k = self.k(key);
        if self.redis_enabled() {
            if let Some(mut conn) = self.redis_conn().await {
                use redis::AsyncCommands;
                match conn.get_del::<_, Option<String>>(&k).await {
                    Ok(v) => return v,
                    Err(e) => self.degrade(&e.to_string()),
                }
            }
        }
        self.memory.get_and_delete(&k)
    }

    pub async fn delete(&self, key: &str) {
        let k = self.k(key);
        if self.redis_enabled() {
            if let Some(mut conn) = self.redis_conn().await {
                use redis::AsyncCommands;
                let _: redis::RedisResult<()> = conn.del(&k).await;
                return;
            }
        }
        self.memory.delete(&k);
    }

    pub async fn incr(&self, key: &str, ttl_on_create: Option<Duration>) -> i64 {
        let k = self.k(key);
        if self.redis_enabled() {
            if let Some(mut conn) = self.redis_conn().await {
                use redis::AsyncCommands;
                let result: redis::RedisResult<i64> = conn.incr(&k, 1).await;
                match result {
                    Ok(n) => {
                        if n == 1 {
                            if let Some(d) = ttl_on_create {
                                let _: redis::RedisResult<()> = conn.expire(&k, d.as_secs() as i64).await;
                            }
                        }
                        return n;
                    }
                    Err(e) => self.degrade(&e.to_string()),
                }
            }
        }
        self.memory.incr(&k, ttl_on_create)
    }

    pub async fn decr(&self, key: &str) -> i64 {
        let k = self.k(key);
        if self.redis_enabled() {
            if let Some(mut conn) = self.redis_conn().await {
                use redis::AsyncCommands;
                let result: redis::RedisResult<i64> = conn.decr(&k, 1).await;
                match result {
                    Ok(n) if n <= 0 => {
                        let _: redis::RedisResult<()> = conn.del(&k).await;
                        return 0;
                    }
                    Ok(n) => return n,
                    Err(e) => self.degrade(&e.to_string()),
                }
            }
        }
        self.memory.decr(&k)
    }

    pub async fn set_json<T: serde::Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        if let Ok(s) = serde_json::to_string(value) {
            self.set(key, &s, ttl).await;
        }
    }

    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).await.and_then(|s| serde_json::from_str(&s).ok())
    }

    pub async fn get_and_delete_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_and_delete(key).await.and_then(|s| serde_json::from_str(&s).ok())
    }
}
