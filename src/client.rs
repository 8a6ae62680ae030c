//! 翻译客户端
//!
//! 对远程翻译服务的统一封装：缓存短路、问题内容熔断、
//! 限时调用、响应校验、单次简化重试与原文兜底。
//! 所有失败路径都以字符串收敛，绝不向调用方抛错

use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use serde::{Deserialize, Serialize};

use crate::cache::TranslationCache;
use crate::config::constants;
use crate::error::{EngineError, EngineResult};

/// 翻译请求
#[derive(Debug, Clone, Serialize)]
pub struct TranslateRequest {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// 翻译响应
#[derive(Debug, Clone, Deserialize)]
pub struct TranslateResponse {
    #[serde(alias = "data")]
    pub translated_text: String,
    #[serde(default)]
    pub quality: Option<f32>,
}

/// 远程翻译服务协作者
#[async_trait(?Send)]
pub trait TranslationBackend {
    async fn translate(&self, request: &TranslateRequest) -> EngineResult<TranslateResponse>;
}

/// 基于 HTTP 的翻译服务后端
pub struct HttpBackend {
    http: reqwest::Client,
    api_url: String,
}

/// 服务端响应的外层包装
#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    code: Option<i64>,
    #[serde(alias = "translated_text")]
    data: String,
    #[serde(default)]
    quality: Option<f32>,
}

impl HttpBackend {
    pub fn new(api_url: &str, timeout: Duration) -> EngineResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Config(format!("构建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            http,
            api_url: api_url.to_string(),
        })
    }
}

#[async_trait(?Send)]
impl TranslationBackend for HttpBackend {
    async fn translate(&self, request: &TranslateRequest) -> EngineResult<TranslateResponse> {
        let response = self.http.post(&self.api_url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Network(format!("服务返回状态 {}", status)));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| EngineError::InvalidResponse(e.to_string()))?;

        if let Some(code) = wire.code {
            if code != 200 {
                return Err(EngineError::InvalidResponse(format!("服务返回 code {}", code)));
            }
        }

        Ok(TranslateResponse {
            translated_text: wire.data,
            quality: wire.quality,
        })
    }
}

/// 翻译结果来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationSource {
    /// 缓存命中
    Cache,
    /// 远程服务返回
    Network,
    /// 熔断短路，返回原文
    CircuitOpen,
    /// 调用失败，返回原文
    Failed,
}

impl TranslationSource {
    pub fn is_success(&self) -> bool {
        matches!(self, TranslationSource::Cache | TranslationSource::Network)
    }
}

/// 翻译结果
#[derive(Debug, Clone)]
pub struct Translation {
    pub text: String,
    pub source: TranslationSource,
}

/// 翻译客户端
pub struct TranslationClient {
    backend: Rc<dyn TranslationBackend>,
    cache: Rc<TranslationCache>,
    /// 会话内失败内容指纹（熔断器）
    problematic: DashSet<String>,
    source_lang: String,
    call_timeout: Duration,
    retry_delay: Duration,
}

impl TranslationClient {
    pub fn new(
        backend: Rc<dyn TranslationBackend>,
        cache: Rc<TranslationCache>,
        source_lang: &str,
        call_timeout: Duration,
        retry_delay: Duration,
    ) -> Self {
        Self {
            backend,
            cache,
            problematic: DashSet::new(),
            source_lang: source_lang.to_string(),
            call_timeout,
            retry_delay,
        }
    }

    /// 翻译一段文本
    ///
    /// `attempt` 为该内容此前的失败次数：首轮（0）被熔断集合短路，
    /// 重试轮次放行，让有限的重试周期有机会再碰网络。
    /// 失败时返回原文；页面上永远显示某种文本，翻译失败不致命。
    pub async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        context: &str,
        attempt: u8,
    ) -> Translation {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Translation {
                text: text.to_string(),
                source: TranslationSource::Failed,
            };
        }

        // 1. 缓存短路
        if let Some(cached) = self.cache.get(trimmed, context, target_lang) {
            return Translation {
                text: cached,
                source: TranslationSource::Cache,
            };
        }

        // 2. 熔断：近期反复失败的内容首轮直接跳过，重试轮次放行
        let fingerprint = fingerprint(trimmed, context);
        if attempt == 0 && self.problematic.contains(&fingerprint) {
            tracing::debug!("熔断短路: {}", &fingerprint);
            return Translation {
                text: text.to_string(),
                source: TranslationSource::CircuitOpen,
            };
        }

        // 3. 首次尝试，带上下文
        match self.attempt(trimmed, target_lang, Some(context)).await {
            Ok(translated) => {
                self.cache.put(trimmed, context, target_lang, &translated);
                self.problematic.remove(&fingerprint);
                return Translation {
                    text: translated,
                    source: TranslationSource::Network,
                };
            }
            Err(err) => {
                tracing::warn!("翻译失败（第1次）: {}", err);
            }
        }

        self.problematic.insert(fingerprint.clone());

        // 4. 固定延迟后用简化请求重试一次（省略上下文）
        tokio::time::sleep(self.retry_delay).await;

        match self.attempt(trimmed, target_lang, None).await {
            Ok(translated) => {
                self.cache.put(trimmed, context, target_lang, &translated);
                self.problematic.remove(&fingerprint);
                Translation {
                    text: translated,
                    source: TranslationSource::Network,
                }
            }
            Err(err) => {
                tracing::warn!("翻译失败（第2次），回退原文: {}", err);
                Translation {
                    text: text.to_string(),
                    source: TranslationSource::Failed,
                }
            }
        }
    }

    /// 单次限时调用 + 响应校验
    async fn attempt(
        &self,
        text: &str,
        target_lang: &str,
        context: Option<&str>,
    ) -> EngineResult<String> {
        let request = TranslateRequest {
            text: text.to_string(),
            source_lang: self.source_lang.clone(),
            target_lang: target_lang.to_string(),
            context: context.map(str::to_string),
        };

        let response = tokio::time::timeout(self.call_timeout, self.backend.translate(&request))
            .await
            .map_err(|_| EngineError::Timeout)??;

        let translated = response.translated_text.trim();
        if translated.is_empty() {
            return Err(EngineError::InvalidResponse("译文为空".to_string()));
        }
        if translated == text {
            return Err(EngineError::InvalidResponse(
                "译文与原文相同".to_string(),
            ));
        }

        Ok(translated.to_string())
    }

    /// 清空熔断集合（语言切换时调用）
    pub fn reset_problematic(&self) {
        self.problematic.clear();
    }

    pub fn problematic_count(&self) -> usize {
        self.problematic.len()
    }
}

/// 问题内容指纹：文本前缀 + 截断上下文
fn fingerprint(text: &str, context: &str) -> String {
    let text_prefix: String = text.chars().take(constants::PROBLEM_FINGERPRINT_LEN).collect();
    let context_prefix: String = context.chars().take(32).collect();
    format!("{}\x1f{}", text_prefix, context_prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::time::Duration;

    struct MapBackend {
        map: HashMap<String, String>,
        calls: Cell<usize>,
    }

    impl MapBackend {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                map: pairs
                    .iter()
                    .map(|&(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                calls: Cell::new(0),
            }
        }
    }

    #[async_trait(?Send)]
    impl TranslationBackend for MapBackend {
        async fn translate(&self, request: &TranslateRequest) -> EngineResult<TranslateResponse> {
            self.calls.set(self.calls.get() + 1);
            match self.map.get(&request.text) {
                Some(translated) => Ok(TranslateResponse {
                    translated_text: translated.clone(),
                    quality: None,
                }),
                None => Err(EngineError::Network("no mapping".to_string())),
            }
        }
    }

    fn client(backend: Rc<MapBackend>) -> TranslationClient {
        let cache = Rc::new(TranslationCache::new(100, Duration::from_secs(3600), None));
        TranslationClient::new(
            backend,
            cache,
            "en",
            Duration::from_secs(1),
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn test_success_then_cache_hit() {
        let backend = Rc::new(MapBackend::new(&[("Welcome", "Bienvenue")]));
        let client = client(backend.clone());

        let first = client.translate("Welcome", "fr", "main heading", 0).await;
        assert_eq!(first.text, "Bienvenue");
        assert_eq!(first.source, TranslationSource::Network);
        assert_eq!(backend.calls.get(), 1);

        let second = client.translate("Welcome", "fr", "main heading", 0).await;
        assert_eq!(second.text, "Bienvenue");
        assert_eq!(second.source, TranslationSource::Cache, "Second call must hit the cache");
        assert_eq!(backend.calls.get(), 1, "No second network call");
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_original() {
        let backend = Rc::new(MapBackend::new(&[]));
        let client = client(backend.clone());

        let result = client.translate("Untranslatable", "fr", "paragraph", 0).await;
        assert_eq!(result.text, "Untranslatable", "Failure resolves to the original text");
        assert_eq!(result.source, TranslationSource::Failed);
        assert_eq!(backend.calls.get(), 2, "Exactly one retry after the first failure");
    }

    #[tokio::test]
    async fn test_circuit_breaker_short_circuits() {
        let backend = Rc::new(MapBackend::new(&[]));
        let client = client(backend.clone());

        let _ = client.translate("Untranslatable", "fr", "paragraph", 0).await;
        assert_eq!(client.problematic_count(), 1);

        let second = client.translate("Untranslatable", "fr", "paragraph", 0).await;
        assert_eq!(second.source, TranslationSource::CircuitOpen);
        assert_eq!(backend.calls.get(), 2, "Circuit breaker prevents further network calls");

        client.reset_problematic();
        let third = client.translate("Untranslatable", "fr", "paragraph", 0).await;
        assert_eq!(third.source, TranslationSource::Failed);
        assert_eq!(backend.calls.get(), 4, "Reset re-enables network attempts");
    }

    #[tokio::test]
    async fn test_retry_cycle_bypasses_circuit() {
        let backend = Rc::new(MapBackend::new(&[]));
        let client = client(backend.clone());

        let _ = client.translate("Untranslatable", "fr", "paragraph", 0).await;
        assert_eq!(backend.calls.get(), 2);

        // 同一单元的重试轮次不被熔断集合挡住
        let retry = client.translate("Untranslatable", "fr", "paragraph", 1).await;
        assert_eq!(retry.source, TranslationSource::Failed, "Retry cycles reach the network again");
        assert_eq!(backend.calls.get(), 4);

        // 新发现的相同内容（首轮）仍被短路
        let fresh = client.translate("Untranslatable", "fr", "paragraph", 0).await;
        assert_eq!(fresh.source, TranslationSource::CircuitOpen);
        assert_eq!(backend.calls.get(), 4);
    }

    #[tokio::test]
    async fn test_unchanged_response_is_rejected() {
        // 服务原样返回输入：视为无效响应
        let backend = Rc::new(MapBackend::new(&[("Same", "Same")]));
        let client = client(backend.clone());

        let result = client.translate("Same", "fr", "paragraph", 0).await;
        assert_eq!(result.source, TranslationSource::Failed);
        assert_eq!(result.text, "Same");
    }

    #[tokio::test]
    async fn test_success_clears_problematic_entry() {
        let backend = Rc::new(MapBackend::new(&[]));
        let cache = Rc::new(TranslationCache::new(100, Duration::from_secs(3600), None));
        let client = TranslationClient::new(
            backend,
            cache.clone(),
            "en",
            Duration::from_secs(1),
            Duration::from_millis(1),
        );

        let _ = client.translate("Flaky", "fr", "paragraph", 0).await;
        assert_eq!(client.problematic_count(), 1);

        // 换一个能成功的后端，同一客户端状态
        let good_backend = Rc::new(MapBackend::new(&[("Flaky", "Instable")]));
        let client2 = TranslationClient::new(
            good_backend,
            cache,
            "en",
            Duration::from_secs(1),
            Duration::from_millis(1),
        );
        client2.problematic.insert(fingerprint("Flaky", "paragraph"));

        // 熔断命中，首轮短路
        let short = client2.translate("Flaky", "fr", "paragraph", 0).await;
        assert_eq!(short.source, TranslationSource::CircuitOpen);

        client2.reset_problematic();
        let ok = client2.translate("Flaky", "fr", "paragraph", 0).await;
        assert_eq!(ok.source, TranslationSource::Network);
        assert_eq!(client2.problematic_count(), 0, "Success clears the fingerprint");
    }
}
