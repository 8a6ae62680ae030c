//! 优先级调度器
//!
//! 把排序后的内容单元切成固定大小的批次，并以刻意的节奏驱动，
//! 作为对远程翻译服务限流的背压机制

use std::collections::VecDeque;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::unit::ContentUnit;

/// 优先级调度器
#[derive(Debug, Clone)]
pub struct PriorityScheduler {
    /// 单批单元数
    batch_size: usize,
    /// 批内逐项错峰间隔
    intra_batch_stagger: Duration,
    /// 批间休眠
    inter_batch_delay: Duration,
}

impl PriorityScheduler {
    pub fn new(
        batch_size: usize,
        intra_batch_stagger: Duration,
        inter_batch_delay: Duration,
    ) -> Self {
        Self {
            batch_size: batch_size.max(1),
            intra_batch_stagger,
            inter_batch_delay,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.batch_size,
            config.intra_batch_stagger(),
            config.inter_batch_delay(),
        )
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 从队列头部取出下一批；超出重试上限的单元直接丢弃
    pub fn next_batch(&self, queue: &mut VecDeque<ContentUnit>) -> Vec<ContentUnit> {
        let mut batch = Vec::with_capacity(self.batch_size);

        while batch.len() < self.batch_size {
            match queue.pop_front() {
                Some(unit) if unit.exhausted() => {
                    tracing::debug!("丢弃超出重试上限的单元: {}", unit.id);
                }
                Some(unit) => batch.push(unit),
                None => break,
            }
        }

        batch
    }

    /// 批内第 index 项的启动延迟
    pub fn stagger_delay(&self, index: usize) -> Duration {
        self.intra_batch_stagger * index as u32
    }

    /// 批间休眠
    pub async fn pace_between_batches(&self) {
        if !self.inter_batch_delay.is_zero() {
            tokio::time::sleep(self.inter_batch_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{find_nodes, html_to_dom};
    use crate::unit::UnitKind;

    fn make_units(count: usize) -> VecDeque<ContentUnit> {
        let dom = html_to_dom(b"<html><body><p>Sample text</p></body></html>", "utf-8");
        let p = find_nodes(&dom.document, "p").remove(0);

        (0..count)
            .map(|i| {
                ContentUnit::new(
                    p.clone(),
                    UnitKind::Text,
                    format!("Sample text {}", i),
                    "paragraph".into(),
                    50,
                    true,
                )
            })
            .collect()
    }

    #[test]
    fn test_batches_respect_size() {
        let scheduler = PriorityScheduler::new(3, Duration::ZERO, Duration::ZERO);
        let mut queue = make_units(7);

        assert_eq!(scheduler.next_batch(&mut queue).len(), 3);
        assert_eq!(scheduler.next_batch(&mut queue).len(), 3);
        assert_eq!(scheduler.next_batch(&mut queue).len(), 1);
        assert!(scheduler.next_batch(&mut queue).is_empty());
    }

    #[test]
    fn test_exhausted_units_are_dropped() {
        let scheduler = PriorityScheduler::new(10, Duration::ZERO, Duration::ZERO);
        let mut queue = make_units(3);
        for _ in 0..3 {
            queue[1].record_failure();
        }

        let batch = scheduler.next_batch(&mut queue);
        assert_eq!(batch.len(), 2, "Exhausted unit is silently dropped");
    }

    #[test]
    fn test_stagger_grows_linearly() {
        let scheduler =
            PriorityScheduler::new(5, Duration::from_millis(80), Duration::from_millis(500));

        assert_eq!(scheduler.stagger_delay(0), Duration::ZERO);
        assert_eq!(scheduler.stagger_delay(2), Duration::from_millis(160));
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let scheduler = PriorityScheduler::new(0, Duration::ZERO, Duration::ZERO);
        assert_eq!(scheduler.batch_size(), 1);
    }
}
