//! autolingua —— 页面内自治 DOM 翻译引擎
//!
//! 扫描动态变化的 HTML 文档，识别可翻译的文本节点与属性，
//! 推导语义上下文，按优先级分批调用远程翻译服务，
//! 原地改写 DOM 并保持结构，缓存结果，随页面变更持续自我重放。
//!
//! 核心流水线：
//! 语言/路由变更 → [`engine::EngineController`] 武装 →
//! [`scanner::ContentScanner`]（[`exclusion::ExclusionPolicy`] + [`context::ContextAnalyzer`]）
//! 产出内容单元队列 → [`scheduler::PriorityScheduler`] 分批 →
//! [`cache::TranslationCache`] 短路 → [`client::TranslationClient`] 解析其余 →
//! [`mutator::DomMutator`] 写回并打标 → [`observer::ObservationLoop`] 反馈新内容。
//!
//! 并发模型为单线程协作式：rcdom 句柄基于 `Rc`，所有 future 均为 `!Send`，
//! 需运行在 current-thread 的异步运行时上。

pub mod cache;
pub mod client;
pub mod config;
pub mod context;
pub mod dom;
pub mod engine;
pub mod error;
pub mod exclusion;
pub mod mutator;
pub mod observer;
pub mod scanner;
pub mod scheduler;
pub mod stats;
pub mod unit;
pub mod viewport;

pub use cache::TranslationCache;
pub use client::{
    HttpBackend, TranslateRequest, TranslateResponse, Translation, TranslationBackend,
    TranslationClient, TranslationSource,
};
pub use config::{ConfigManager, EngineConfig};
pub use context::ContextAnalyzer;
pub use engine::{
    AccessPolicy, AdminAccess, CompletionSource, Diagnostics, EngineController, EngineEvent,
    EnginePhase, PublicAccess,
};
pub use error::{EngineError, EngineResult};
pub use exclusion::ExclusionPolicy;
pub use mutator::DomMutator;
pub use observer::{MutationKind, MutationRecord, ObservationLoop, SelfWriteGuard};
pub use scanner::{ContentScanner, ScanOptions};
pub use scheduler::PriorityScheduler;
pub use stats::{EngineStats, EngineStatsSnapshot, HealthLevel};
pub use unit::{ContentUnit, UnitKind};
pub use viewport::{DocumentFlowGeometry, FixedGeometry, GeometryProvider, Rect};

use std::rc::Rc;

use markup5ever_rcdom::Handle;

/// 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 便捷函数：对文档执行一次完整翻译轮次并返回引擎
///
/// 引擎保持武装状态，可继续接收导航、变更与语言事件。
pub async fn translate_document(
    root: Handle,
    config: EngineConfig,
    backend: Rc<dyn TranslationBackend>,
    target_lang: &str,
) -> EngineResult<EngineController> {
    let engine = EngineController::new(root, config, backend)?;
    engine.set_language(target_lang).await;
    Ok(engine)
}
