//! 变更观察
//!
//! 接收宿主推送的 DOM 变更记录，过滤自身写入，去抖合并后触发重扫。
//! 通道关闭或回调要求停止时循环退出

use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::config::constants;

/// 变更类型
#[derive(Debug, Clone)]
pub enum MutationKind {
    /// 新增节点，携带其文本预览
    NodesAdded { text_preview: String },
    /// 属性变更
    AttributeChanged { attr: String },
    /// 文本内容变更
    TextChanged,
}

/// 一条变更记录
#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub at: Instant,
}

impl MutationRecord {
    pub fn nodes_added(text_preview: &str) -> Self {
        Self {
            kind: MutationKind::NodesAdded {
                text_preview: text_preview.to_string(),
            },
            at: Instant::now(),
        }
    }

    pub fn attribute_changed(attr: &str) -> Self {
        Self {
            kind: MutationKind::AttributeChanged {
                attr: attr.to_string(),
            },
            at: Instant::now(),
        }
    }

    pub fn text_changed() -> Self {
        Self {
            kind: MutationKind::TextChanged,
            at: Instant::now(),
        }
    }
}

/// 自写入保护窗口
///
/// 写入器每次落笔后打点；窗口内的变更记录视为引擎自己的写入，
/// 以切断 观察→写入→观察 的反馈环
pub struct SelfWriteGuard {
    window: Duration,
    last_write: Cell<Option<Instant>>,
}

impl SelfWriteGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_write: Cell::new(None),
        }
    }

    /// 记录一次引擎写入
    pub fn mark(&self) {
        self.last_write.set(Some(Instant::now()));
    }

    /// 判断某时刻的变更是否落在保护窗口内
    pub fn covers(&self, at: Instant) -> bool {
        match self.last_write.get() {
            Some(write) => at >= write && at.duration_since(write) <= self.window,
            None => false,
        }
    }
}

impl Default for SelfWriteGuard {
    fn default() -> Self {
        Self::new(constants::SELF_MUTATION_GUARD)
    }
}

/// 变更观察循环
pub struct ObservationLoop {
    rx: mpsc::UnboundedReceiver<MutationRecord>,
    debounce: Duration,
    guard: Rc<SelfWriteGuard>,
}

impl ObservationLoop {
    pub fn new(
        rx: mpsc::UnboundedReceiver<MutationRecord>,
        debounce: Duration,
        guard: Rc<SelfWriteGuard>,
    ) -> Self {
        Self { rx, debounce, guard }
    }

    /// 驱动观察循环
    ///
    /// 每次去抖窗口结束后调用 `on_rescan`；回调返回 false 表示引擎已停用，循环终止。
    pub async fn run<F, Fut>(mut self, mut on_rescan: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        loop {
            let record = match self.rx.recv().await {
                Some(record) => record,
                // 发送端关闭即拆除
                None => break,
            };

            if !self.qualifies(&record) {
                continue;
            }

            // 去抖：等待窗口期，把这段时间的后续变更并入同一次重扫
            tokio::time::sleep(self.debounce).await;
            while self.rx.try_recv().is_ok() {}

            tracing::debug!("变更去抖结束，触发重扫");
            if !on_rescan().await {
                break;
            }
        }
    }

    /// 判断一条记录是否值得触发重扫
    fn qualifies(&self, record: &MutationRecord) -> bool {
        // 标记属性的写入永远是引擎自己的
        if let MutationKind::AttributeChanged { attr } = &record.kind {
            if attr == constants::MARKER_ATTR {
                return false;
            }
        }

        if self.guard.covers(record.at) {
            return false;
        }

        match &record.kind {
            MutationKind::NodesAdded { text_preview } => !text_preview.trim().is_empty(),
            MutationKind::AttributeChanged { attr } => {
                constants::TRANSLATABLE_ATTRS.contains(&attr.as_str())
            }
            MutationKind::TextChanged => true,
        }
    }
}
