//! 翻译缓存
//!
//! 两级缓存：进程内 LRU + 可选的持久化 JSON 存储。
//! 键为（小写去空白的原文、截断后的上下文、目标语言）的组合哈希

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::config::constants;

/// 缓存条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub translated: String,
    /// 插入时刻（epoch 秒）
    pub inserted_at: u64,
}

/// 持久化文件中的一条记录
#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    key: String,
    #[serde(flatten)]
    entry: CacheEntry,
}

/// 缓存统计
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
    identity_rejections: AtomicU64,
}

/// 缓存统计快照
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub identity_rejections: u64,
    pub hit_rate: f64,
}

impl CacheStats {
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStatsSnapshot {
            hits,
            misses,
            insertions: self.insertions.load(Ordering::Relaxed),
            identity_rejections: self.identity_rejections.load(Ordering::Relaxed),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}

/// 翻译缓存
pub struct TranslationCache {
    memory: Mutex<LruCache<String, CacheEntry>>,
    store_path: Option<PathBuf>,
    ttl: Duration,
    stats: CacheStats,
}

impl TranslationCache {
    /// 创建缓存并尽力加载持久化存储；存储缺失或损坏时从空缓存启动
    pub fn new(capacity: usize, ttl: Duration, store_path: Option<PathBuf>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        let cache = Self {
            memory: Mutex::new(LruCache::new(capacity)),
            store_path,
            ttl,
            stats: CacheStats::default(),
        };

        cache.load_store();
        cache
    }

    /// 查询缓存
    ///
    /// 命中值若与规范化原文相同，视为失败的历史翻译，按未命中处理并剔除。
    pub fn get(&self, original: &str, context: &str, target_lang: &str) -> Option<String> {
        let normalized = normalize_text(original);
        let key = cache_key(&normalized, context, target_lang);

        let mut memory = self.memory.lock().unwrap();
        if let Some(entry) = memory.get(&key) {
            if self.is_expired(entry) {
                memory.pop(&key);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }

            if normalize_text(&entry.translated) == normalized {
                memory.pop(&key);
                self.stats.identity_rejections.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }

            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.translated.clone());
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// 写入缓存
    ///
    /// 译文与规范化原文相同时放弃写入，避免缓存失败的往返结果。
    pub fn put(&self, original: &str, context: &str, target_lang: &str, translated: &str) {
        let normalized = normalize_text(original);
        if normalize_text(translated) == normalized {
            self.stats.identity_rejections.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let key = cache_key(&normalized, context, target_lang);
        let entry = CacheEntry {
            translated: translated.to_string(),
            inserted_at: epoch_secs(),
        };

        self.memory.lock().unwrap().put(key, entry);
        self.stats.insertions.fetch_add(1, Ordering::Relaxed);

        self.flush_store();
    }

    pub fn len(&self) -> usize {
        self.memory.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.memory.lock().unwrap().clear();
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        if self.ttl.is_zero() {
            return false;
        }
        epoch_secs().saturating_sub(entry.inserted_at) > self.ttl.as_secs()
    }

    /// 从持久化存储加载；任何错误都只记日志，不影响初始化
    fn load_store(&self) {
        let path = match &self.store_path {
            Some(path) => path,
            None => return,
        };

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
            Err(err) => {
                tracing::warn!("读取缓存存储失败: {}", err);
                return;
            }
        };

        let entries: Vec<PersistedEntry> = match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!("缓存存储已损坏，忽略: {}", err);
                return;
            }
        };

        let mut memory = self.memory.lock().unwrap();
        let mut loaded = 0;
        for persisted in entries {
            if !self.is_expired(&persisted.entry) {
                memory.put(persisted.key, persisted.entry);
                loaded += 1;
            }
        }

        tracing::info!("从持久化存储加载 {} 条缓存", loaded);
    }

    /// 尽力写回持久化存储
    fn flush_store(&self) {
        let path = match &self.store_path {
            Some(path) => path,
            None => return,
        };

        let entries: Vec<PersistedEntry> = {
            let memory = self.memory.lock().unwrap();
            memory
                .iter()
                .map(|(key, entry)| PersistedEntry {
                    key: key.clone(),
                    entry: entry.clone(),
                })
                .collect()
        };

        let json = match serde_json::to_string(&entries) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!("序列化缓存失败: {}", err);
                return;
            }
        };

        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        if let Err(err) = std::fs::write(path, json) {
            tracing::warn!("写入缓存存储失败: {}", err);
        }
    }
}

/// 规范化原文：trim + 小写
fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// 当前 epoch 秒
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// 生成组合缓存键
fn cache_key(normalized_text: &str, context: &str, target_lang: &str) -> String {
    let truncated_context: String = context
        .chars()
        .take(constants::CONTEXT_KEY_TRUNCATION)
        .collect();

    let mut hasher = blake3::Hasher::new();
    hasher.update(target_lang.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(truncated_context.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(normalized_text.as_bytes());
    hasher.finalize().to_hex()[..32].to_string()
}
