//! 引擎配置
//!
//! 常量定义与分层配置加载：默认值 → 配置文件 → 环境变量

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// 引擎常量定义
pub mod constants {
    use std::time::Duration;

    /// 已翻译标记属性（幂等写入与还原的唯一依据）
    pub const MARKER_ATTR: &str = "data-autolingua-translated";

    /// 显式退出翻译的属性标记
    pub const OPT_OUT_ATTRS: &[&str] = &["data-no-translate"];

    /// 显式退出翻译的 class 关键字
    pub const OPT_OUT_CLASS: &str = "notranslate";

    /// 跳过的非文本元素
    pub const SKIP_ELEMENTS: &[&str] = &[
        "script", "style", "code", "pre", "noscript", "meta", "link", "head", "svg", "math",
        "canvas", "video", "audio", "embed", "object", "iframe", "template", "textarea",
    ];

    /// 可翻译的元素属性
    pub const TRANSLATABLE_ATTRS: &[&str] = &[
        "title",
        "alt",
        "placeholder",
        "aria-label",
        "aria-description",
        "data-tooltip",
        "data-title",
    ];

    /// 最小可翻译文本长度（trim 之后）
    pub const MIN_TEXT_LENGTH: usize = 2;

    /// 优先级基准分与上限
    pub const BASE_PRIORITY: i32 = 50;
    pub const MAX_PRIORITY: i32 = 200;

    /// 上下文分析的祖先遍历深度上限
    pub const MAX_ANCESTOR_DEPTH: usize = 5;

    /// 缓存键中上下文的截断长度
    pub const CONTEXT_KEY_TRUNCATION: usize = 64;

    /// 问题内容指纹的文本前缀长度
    pub const PROBLEM_FINGERPRINT_LEN: usize = 48;

    /// 批次调度默认参数
    pub const DEFAULT_BATCH_SIZE: usize = 5;
    pub const DEFAULT_INTRA_BATCH_STAGGER: Duration = Duration::from_millis(80);
    pub const DEFAULT_INTER_BATCH_DELAY: Duration = Duration::from_millis(500);

    /// 变更观察的去抖窗口与自写入保护窗口
    pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);
    pub const SELF_MUTATION_GUARD: Duration = Duration::from_millis(200);

    /// 远程调用超时与重试延迟
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(8);
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

    /// 单个内容单元的最大重试次数（超过即从队列丢弃）
    pub const MAX_UNIT_RETRIES: u8 = 2;

    /// 缓存默认容量与持久化条目有效期
    pub const DEFAULT_CACHE_CAPACITY: usize = 2000;
    pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

    /// 默认翻译服务地址
    pub const DEFAULT_API_URL: &str = "http://localhost:1188/translate";

    /// 配置文件查找路径
    pub const CONFIG_PATHS: &[&str] = &[
        "autolingua.toml",
        "autolingua.json",
        "~/.config/autolingua/config.toml",
    ];
}

/// 引擎配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    // 语言配置
    pub source_lang: String,
    pub api_url: String,

    // 扫描配置
    pub include_hidden: bool,
    pub prioritize_visible: bool,

    // 批次与节奏配置
    pub batch_size: usize,
    pub intra_batch_stagger_ms: u64,
    pub inter_batch_delay_ms: u64,

    // 观察配置
    pub debounce_ms: u64,
    pub self_write_guard_ms: u64,

    // 网络配置
    pub call_timeout_secs: u64,
    pub retry_delay_ms: u64,

    // 缓存配置
    pub cache_enabled: bool,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    pub cache_path: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            source_lang: "en".to_string(),
            api_url: constants::DEFAULT_API_URL.to_string(),

            include_hidden: false,
            prioritize_visible: true,

            batch_size: constants::DEFAULT_BATCH_SIZE,
            intra_batch_stagger_ms: constants::DEFAULT_INTRA_BATCH_STAGGER.as_millis() as u64,
            inter_batch_delay_ms: constants::DEFAULT_INTER_BATCH_DELAY.as_millis() as u64,

            debounce_ms: constants::DEFAULT_DEBOUNCE.as_millis() as u64,
            self_write_guard_ms: constants::SELF_MUTATION_GUARD.as_millis() as u64,

            call_timeout_secs: constants::DEFAULT_CALL_TIMEOUT.as_secs(),
            retry_delay_ms: constants::DEFAULT_RETRY_DELAY.as_millis() as u64,

            cache_enabled: true,
            cache_capacity: constants::DEFAULT_CACHE_CAPACITY,
            cache_ttl_secs: constants::DEFAULT_CACHE_TTL.as_secs(),
            cache_path: None,
        }
    }
}

impl EngineConfig {
    /// 创建指定源语言的默认配置
    pub fn with_source_lang(source_lang: &str) -> Self {
        Self {
            source_lang: source_lang.to_string(),
            ..Self::default()
        }
    }

    /// 验证配置
    pub fn validate(&self) -> EngineResult<()> {
        if self.source_lang.trim().is_empty() {
            return Err(EngineError::Config("源语言不能为空".to_string()));
        }

        if self.batch_size == 0 {
            return Err(EngineError::Config("批次大小不能为0".to_string()));
        }

        if self.call_timeout_secs == 0 {
            return Err(EngineError::Config("请求超时必须大于0".to_string()));
        }

        if self.cache_enabled && self.cache_capacity == 0 {
            return Err(EngineError::Config(
                "启用缓存时缓存容量不能为0".to_string(),
            ));
        }

        Ok(())
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("AUTOLINGUA_API_URL") {
            tracing::info!("环境变量覆盖 API URL: {}", url);
            self.api_url = url;
        }

        if let Ok(lang) = std::env::var("AUTOLINGUA_SOURCE_LANG") {
            self.source_lang = lang;
        }

        if let Ok(size) = std::env::var("AUTOLINGUA_BATCH_SIZE") {
            if let Ok(size) = size.parse() {
                self.batch_size = size;
            }
        }

        if let Ok(ms) = std::env::var("AUTOLINGUA_DEBOUNCE_MS") {
            if let Ok(ms) = ms.parse() {
                self.debounce_ms = ms;
            }
        }

        if let Ok(enabled) = std::env::var("AUTOLINGUA_CACHE_ENABLED") {
            self.cache_enabled = enabled == "1" || enabled.eq_ignore_ascii_case("true");
        }

        if let Ok(path) = std::env::var("AUTOLINGUA_CACHE_PATH") {
            self.cache_path = Some(path);
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn intra_batch_stagger(&self) -> Duration {
        Duration::from_millis(self.intra_batch_stagger_ms)
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn self_write_guard(&self) -> Duration {
        Duration::from_millis(self.self_write_guard_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// 配置管理器
pub struct ConfigManager {
    config: EngineConfig,
}

impl ConfigManager {
    /// 创建新的配置管理器（文件 + 环境变量 + 验证）
    pub fn new() -> EngineResult<Self> {
        let mut config = Self::load_config()?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 获取配置
    pub fn get_config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn into_config(self) -> EngineConfig {
        self.config
    }

    /// 从文件加载配置
    fn load_config() -> EngineResult<EngineConfig> {
        Self::load_dotenv();

        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(&expanded_path);
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok(EngineConfig::default())
    }

    /// 从指定文件加载配置
    fn load_from_file(path: &str) -> EngineResult<EngineConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("读取配置文件失败: {}", e)))?;

        if path.ends_with(".toml") {
            toml::from_str(&content)
                .map_err(|e| EngineError::Config(format!("解析TOML配置失败: {}", e)))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| EngineError::Config(format!("解析JSON配置失败: {}", e)))
        }
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env.development", ".env.production", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() {
                if dotenv::from_filename(env_file).is_ok() {
                    tracing::info!("已加载环境变量文件: {}", env_file);
                    break;
                }
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config(path: &str) -> EngineResult<()> {
        let config = EngineConfig::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("序列化配置失败: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| EngineError::Config(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}
