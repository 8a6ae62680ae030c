//! 引擎统计
//!
//! 原子计数器与快照视图，供特权诊断接口使用

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// 健康等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Unhealthy,
}

/// 引擎统计计数器
#[derive(Debug, Default)]
pub struct EngineStats {
    passes: AtomicU64,
    units_discovered: AtomicU64,
    units_translated: AtomicU64,
    units_failed: AtomicU64,
    scan_failures: AtomicU64,
    rescans: AtomicU64,
}

/// 统计快照
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatsSnapshot {
    pub passes: u64,
    pub units_discovered: u64,
    pub units_translated: u64,
    pub units_failed: u64,
    pub scan_failures: u64,
    pub rescans: u64,
    pub success_rate: f64,
    pub health: HealthLevel,
}

impl EngineStats {
    pub fn record_pass(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discovered(&self, count: u64) {
        self.units_discovered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_translated(&self) {
        self.units_translated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.units_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_failure(&self) {
        self.scan_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rescan(&self) {
        self.rescans.fetch_add(1, Ordering::Relaxed);
    }

    pub fn scan_failure_count(&self) -> u64 {
        self.scan_failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> EngineStatsSnapshot {
        let translated = self.units_translated.load(Ordering::Relaxed);
        let failed = self.units_failed.load(Ordering::Relaxed);
        let attempted = translated + failed;
        let success_rate = if attempted == 0 {
            1.0
        } else {
            translated as f64 / attempted as f64
        };

        let health = if self.scan_failures.load(Ordering::Relaxed) > 3 || success_rate < 0.5 {
            HealthLevel::Unhealthy
        } else if success_rate < 0.8 {
            HealthLevel::Degraded
        } else {
            HealthLevel::Healthy
        };

        EngineStatsSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            units_discovered: self.units_discovered.load(Ordering::Relaxed),
            units_translated: translated,
            units_failed: failed,
            scan_failures: self.scan_failures.load(Ordering::Relaxed),
            rescans: self.rescans.load(Ordering::Relaxed),
            success_rate,
            health,
        }
    }
}
