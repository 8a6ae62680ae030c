//! 引擎控制器
//!
//! 编排扫描、调度、翻译与写回的状态机：
//! Idle → Scanning → Translating → Watching，回到源语言时整体还原。
//! 单线程协作式模型，所有并发都是同一事件循环上的交错任务

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use futures::future::join_all;
use markup5ever_rcdom::Handle;
use tokio::sync::{broadcast, mpsc};

use crate::cache::{CacheStatsSnapshot, TranslationCache};
use crate::client::{TranslationBackend, TranslationClient, TranslationSource};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::observer::{MutationRecord, ObservationLoop, SelfWriteGuard};
use crate::scanner::{ContentScanner, ScanOptions};
use crate::scheduler::PriorityScheduler;
use crate::stats::{EngineStats, EngineStatsSnapshot};
use crate::unit::ContentUnit;
use crate::viewport::GeometryProvider;

/// 引擎阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    /// 源语言生效，引擎未运行
    Idle,
    /// 扫描进行中
    Scanning,
    /// 队列排空进行中
    Translating,
    /// 空闲但观察已武装
    Watching,
}

/// 引擎状态（仅由控制器及其调用的流水线阶段修改）
struct EngineState {
    phase: EnginePhase,
    is_active: bool,
    is_processing: bool,
    total_units: usize,
    processed_units: usize,
    error_count: usize,
    target_lang: Option<String>,
    queue: VecDeque<ContentUnit>,
    /// 排空进行中收到的重扫/导航信号，留到本轮结束后消费
    rescan_pending: bool,
}

impl EngineState {
    fn new() -> Self {
        Self {
            phase: EnginePhase::Idle,
            is_active: false,
            is_processing: false,
            total_units: 0,
            processed_units: 0,
            error_count: 0,
            target_lang: None,
            queue: VecDeque::new(),
            rescan_pending: false,
        }
    }
}

/// 一轮翻译的主要来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSource {
    Cache,
    Network,
    Mixed,
}

/// 引擎对外事件
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// 一轮翻译完成
    TranslationComplete {
        target_lang: String,
        source: CompletionSource,
    },
    /// 已还原到源语言
    Reverted,
}

/// 权限协作者：仅用于门控诊断输出，不影响翻译正确性
pub trait AccessPolicy {
    fn is_privileged(&self) -> bool;
}

/// 普通访客
pub struct PublicAccess;

impl AccessPolicy for PublicAccess {
    fn is_privileged(&self) -> bool {
        false
    }
}

/// 管理员
pub struct AdminAccess;

impl AccessPolicy for AdminAccess {
    fn is_privileged(&self) -> bool {
        true
    }
}

/// 特权诊断报告
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub phase: EnginePhase,
    pub target_lang: Option<String>,
    pub total_units: usize,
    pub processed_units: usize,
    pub error_count: usize,
    pub queued_units: usize,
    pub problematic_count: usize,
    pub stats: EngineStatsSnapshot,
    pub cache: CacheStatsSnapshot,
}

/// 引擎控制器
pub struct EngineController {
    root: Handle,
    config: EngineConfig,
    scanner: ContentScanner,
    scheduler: PriorityScheduler,
    cache: Rc<TranslationCache>,
    client: TranslationClient,
    mutator: crate::mutator::DomMutator,
    guard: Rc<SelfWriteGuard>,
    access: Rc<dyn AccessPolicy>,
    state: RefCell<EngineState>,
    stats: EngineStats,
    events: broadcast::Sender<EngineEvent>,
}

impl EngineController {
    /// 创建引擎
    pub fn new(
        root: Handle,
        config: EngineConfig,
        backend: Rc<dyn TranslationBackend>,
    ) -> EngineResult<Self> {
        Self::with_collaborators(root, config, backend, None, Rc::new(PublicAccess))
    }

    /// 创建引擎并注入几何与权限协作者
    pub fn with_collaborators(
        root: Handle,
        config: EngineConfig,
        backend: Rc<dyn TranslationBackend>,
        geometry: Option<Rc<dyn GeometryProvider>>,
        access: Rc<dyn AccessPolicy>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let cache = Rc::new(TranslationCache::new(
            if config.cache_enabled {
                config.cache_capacity
            } else {
                1
            },
            config.cache_ttl(),
            config.cache_path.as_ref().map(std::path::PathBuf::from),
        ));

        let client = TranslationClient::new(
            backend,
            cache.clone(),
            &config.source_lang,
            config.call_timeout(),
            config.retry_delay(),
        );

        let scanner = ContentScanner::new(
            ScanOptions {
                include_hidden: config.include_hidden,
                prioritize_visible: config.prioritize_visible,
            },
            geometry,
        );

        let scheduler = PriorityScheduler::from_config(&config);
        let guard = Rc::new(SelfWriteGuard::new(config.self_write_guard()));
        let (events, _) = broadcast::channel(16);

        Ok(Self {
            root,
            config,
            scanner,
            scheduler,
            cache,
            client,
            mutator: crate::mutator::DomMutator::new(),
            guard,
            access,
            state: RefCell::new(EngineState::new()),
            stats: EngineStats::default(),
            events,
        })
    }

    /// 订阅引擎事件
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn phase(&self) -> EnginePhase {
        self.state.borrow().phase
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().is_active
    }

    pub fn target_lang(&self) -> Option<String> {
        self.state.borrow().target_lang.clone()
    }

    pub fn error_count(&self) -> usize {
        self.state.borrow().error_count
    }

    pub fn processed_units(&self) -> usize {
        self.state.borrow().processed_units
    }

    /// 自写入保护（宿主为写入器同步变更记录时可参照）
    pub fn self_write_guard(&self) -> Rc<SelfWriteGuard> {
        self.guard.clone()
    }

    /// 目标语言变更入口
    pub async fn set_language(&self, lang: &str) {
        if lang == self.config.source_lang {
            self.revert();
            return;
        }

        let previous = self.target_lang();
        if previous.as_deref() == Some(lang) && self.is_active() {
            return;
        }

        // 非源语言之间切换：先还原旧译文，丢弃在途队列，清空熔断集合
        if previous.is_some() {
            self.mutator.restore_all();
            self.client.reset_problematic();
        }

        {
            let mut state = self.state.borrow_mut();
            state.is_active = true;
            state.target_lang = Some(lang.to_string());
            state.queue.clear();
        }

        tracing::info!("目标语言切换: {}", lang);
        self.run_pass().await;
    }

    /// 路由/导航变更：非源语言生效时对新视图重新走完整流水线
    pub async fn notify_navigation(&self) {
        if self.is_active() {
            tracing::debug!("导航变更，触发重扫");
            self.run_pass().await;
        }
    }

    /// 观察触发的重扫；返回引擎是否仍在运行
    pub async fn rescan(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.stats.record_rescan();
        self.run_pass().await;
        self.is_active()
    }

    /// 驱动变更观察循环，直到通道关闭或引擎停用
    pub async fn watch(&self, rx: mpsc::UnboundedReceiver<MutationRecord>) {
        let observation = ObservationLoop::new(rx, self.config.debounce(), self.guard.clone());
        let engine = self;
        observation
            .run(move || {
                let engine = engine;
                async move { engine.rescan().await }
            })
            .await;
    }

    /// 回到源语言 / 宿主视图卸载：还原、清队列、解除观察
    pub fn revert(&self) {
        let restored = self.mutator.restore_all();
        self.client.reset_problematic();

        {
            let mut state = self.state.borrow_mut();
            state.is_active = false;
            state.is_processing = false;
            state.phase = EnginePhase::Idle;
            state.target_lang = None;
            state.queue.clear();
            state.total_units = 0;
            state.processed_units = 0;
            state.rescan_pending = false;
        }

        tracing::info!("回到源语言，还原 {} 个元素", restored);
        let _ = self.events.send(EngineEvent::Reverted);
    }

    /// 特权诊断；普通访客得到 None
    pub fn diagnostics(&self) -> Option<Diagnostics> {
        if !self.access.is_privileged() {
            return None;
        }

        let state = self.state.borrow();
        Some(Diagnostics {
            phase: state.phase,
            target_lang: state.target_lang.clone(),
            total_units: state.total_units,
            processed_units: state.processed_units,
            error_count: state.error_count,
            queued_units: state.queue.len(),
            problematic_count: self.client.problematic_count(),
            stats: self.stats.snapshot(),
            cache: self.cache.stats(),
        })
    }

    /// 一轮完整流水线：扫描 → 批次翻译 → 写回
    ///
    /// `is_processing` 防止两轮排空并发运行；排空中途到达的触发
    /// 不丢弃而是挂起，本轮结束后消费。语言中途变更时丢弃在途结果
    /// 并对新语言重新开始。
    async fn run_pass(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.is_processing || !state.is_active {
                if state.is_processing {
                    state.rescan_pending = true;
                }
                return;
            }
            state.is_processing = true;
        }

        loop {
            let lang = match self.target_lang() {
                Some(lang) => lang,
                None => break,
            };
            self.state.borrow_mut().rescan_pending = false;

            self.drive_single_pass(&lang).await;

            // 语言变了或有挂起的触发则再来一轮，否则退出
            let rerun = {
                let state = self.state.borrow();
                state.is_active
                    && (state.target_lang.as_deref() != Some(lang.as_str())
                        || state.rescan_pending)
            };
            if !rerun {
                break;
            }
        }

        self.state.borrow_mut().is_processing = false;
    }

    async fn drive_single_pass(&self, lang: &str) {
        self.state.borrow_mut().phase = EnginePhase::Scanning;

        let units = match self.scanner.scan(&self.root) {
            Ok(units) => units,
            Err(err) => {
                // 灾难性扫描失败：中止本轮，回到 Watching
                tracing::error!("扫描失败: {}", err);
                self.stats.record_scan_failure();
                let mut state = self.state.borrow_mut();
                state.error_count += 1;
                state.phase = EnginePhase::Watching;
                return;
            }
        };

        self.stats.record_pass();
        self.stats.record_discovered(units.len() as u64);

        {
            let mut state = self.state.borrow_mut();
            state.total_units = units.len();
            state.processed_units = 0;
            state.queue = units.into();
            state.phase = EnginePhase::Translating;
        }

        let mut cache_results = 0usize;
        let mut network_results = 0usize;

        loop {
            let batch = {
                let mut state = self.state.borrow_mut();
                let queue = &mut state.queue;
                self.scheduler.next_batch(queue)
            };
            if batch.is_empty() {
                break;
            }

            // 批内按优先级顺序错峰启动，允许乱序完成；批与批之间严格串行
            let translations = join_all(batch.into_iter().enumerate().map(|(i, unit)| {
                let delay = self.scheduler.stagger_delay(i);
                let lang = lang.to_string();
                async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let translation = self
                        .client
                        .translate(&unit.original_text, &lang, &unit.context, unit.retry_count)
                        .await;
                    (unit, translation)
                }
            }))
            .await;

            for (mut unit, translation) in translations {
                // 语言切换或停用会使在途结果失效
                if !self.pass_still_valid(lang) {
                    tracing::debug!("轮次失效，丢弃在途结果");
                    return;
                }

                match translation.source {
                    TranslationSource::Cache | TranslationSource::Network => {
                        if translation.source == TranslationSource::Cache {
                            cache_results += 1;
                        } else {
                            network_results += 1;
                        }

                        if self.mutator.apply(&unit, &translation.text) {
                            self.guard.mark();
                        }
                        self.stats.record_translated();
                        self.state.borrow_mut().processed_units += 1;
                    }
                    TranslationSource::CircuitOpen | TranslationSource::Failed => {
                        self.stats.record_failed();
                        unit.record_failure();
                        if !unit.exhausted() {
                            self.state.borrow_mut().queue.push_back(unit);
                        } else {
                            self.state.borrow_mut().processed_units += 1;
                        }
                    }
                }
            }

            let queue_empty = self.state.borrow().queue.is_empty();
            if !queue_empty {
                self.scheduler.pace_between_batches().await;
            }

            if !self.pass_still_valid(lang) {
                return;
            }
        }

        self.state.borrow_mut().phase = EnginePhase::Watching;

        let source = match (cache_results, network_results) {
            (0, _) => CompletionSource::Network,
            (_, 0) => CompletionSource::Cache,
            _ => CompletionSource::Mixed,
        };
        let _ = self.events.send(EngineEvent::TranslationComplete {
            target_lang: lang.to_string(),
            source,
        });
        tracing::info!(
            "翻译轮次完成: lang={} cache={} network={}",
            lang,
            cache_results,
            network_results
        );
    }

    fn pass_still_valid(&self, lang: &str) -> bool {
        let state = self.state.borrow();
        state.is_active && state.target_lang.as_deref() == Some(lang)
    }
}
