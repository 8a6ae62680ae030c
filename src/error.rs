//! 翻译引擎错误类型
//!
//! 统一的错误分类，供重试策略和诊断统计使用

use thiserror::Error;

/// 引擎错误
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("翻译请求超时")]
    Timeout,

    #[error("翻译服务响应无效: {0}")]
    InvalidResponse(String),

    #[error("DOM 扫描失败: {0}")]
    Scan(String),

    #[error("DOM 写入失败: {0}")]
    Mutation(String),

    #[error("缓存操作失败: {0}")]
    Cache(String),

    #[error("序列化失败: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 引擎结果类型
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// 判断错误是否可重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Network(_) | EngineError::Timeout | EngineError::InvalidResponse(_)
        )
    }

    /// 获取错误严重程度 (1-5, 5最严重)
    pub fn severity(&self) -> u8 {
        match self {
            EngineError::Config(_) => 5,
            EngineError::Internal(_) => 5,
            EngineError::Scan(_) => 4,
            EngineError::Serialization(_) => 3,
            EngineError::Network(_) => 2,
            EngineError::Timeout => 2,
            EngineError::InvalidResponse(_) => 2,
            EngineError::Mutation(_) => 2,
            EngineError::Cache(_) => 1,
        }
    }

    /// 获取错误分类名称
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::Config(_) => "config",
            EngineError::Network(_) | EngineError::Timeout | EngineError::InvalidResponse(_) => {
                "translation"
            }
            EngineError::Scan(_) | EngineError::Mutation(_) => "dom",
            EngineError::Cache(_) | EngineError::Serialization(_) => "storage",
            EngineError::Internal(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EngineError::Timeout
        } else {
            EngineError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(EngineError::Timeout.is_retryable());
        assert!(EngineError::Network("connection refused".into()).is_retryable());
        assert!(!EngineError::Config("bad batch size".into()).is_retryable());
        assert!(!EngineError::Mutation("stale node".into()).is_retryable());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(
            EngineError::Config("x".into()).severity()
                > EngineError::Network("x".into()).severity()
        );
        assert_eq!(EngineError::Cache("x".into()).severity(), 1);
    }

    #[test]
    fn test_category_names() {
        assert_eq!(EngineError::Timeout.category(), "translation");
        assert_eq!(EngineError::Scan("x".into()).category(), "dom");
        assert_eq!(EngineError::Cache("x".into()).category(), "storage");
    }
}
