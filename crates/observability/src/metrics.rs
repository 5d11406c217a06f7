//! 告警引擎指标收集模块
//!
//! Prometheus 指标 (通过 `metrics` 宏) + 会话内存聚合。

use std::collections::HashMap;

use contracts::{AlertOutcome, Rejection, TriggerSource};
use metrics::{counter, gauge, histogram};

/// 缓存查询结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    /// 命中且未过期
    Hit,
    /// 未命中或过期，重新获取成功
    Fetched,
    /// 获取失败，回退到过期数据
    Stale,
    /// 获取失败且无任何缓存
    Failed,
}

impl CacheLookup {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheLookup::Hit => "hit",
            CacheLookup::Fetched => "fetched",
            CacheLookup::Stale => "stale",
            CacheLookup::Failed => "failed",
        }
    }
}

/// 记录触发事件 (manual / sensor)
pub fn record_trigger(source: TriggerSource) {
    counter!(
        "sos_engine_triggers_total",
        "source" => source.as_str()
    )
    .increment(1);
}

/// 记录一次计入的有效晃动
pub fn record_shake_counted(shake_count: u32) {
    counter!("sos_engine_shakes_counted_total").increment(1);
    gauge!("sos_engine_shake_count_current").set(shake_count as f64);
}

/// 记录倒计时开始
pub fn record_countdown_started(seconds: u32) {
    counter!("sos_engine_countdowns_started_total").increment(1);
    gauge!("sos_engine_countdown_seconds").set(seconds as f64);
}

/// 记录用户取消
pub fn record_cancellation(remaining_seconds: u32) {
    counter!("sos_engine_cancellations_total").increment(1);
    histogram!("sos_engine_cancel_remaining_seconds").record(remaining_seconds as f64);
}

/// 记录预检拒绝
pub fn record_rejection(rejection: &Rejection) {
    counter!(
        "sos_engine_rejections_total",
        "reason" => rejection.as_str()
    )
    .increment(1);
}

/// 记录告警最终结果
pub fn record_outcome(outcome: &AlertOutcome) {
    match outcome {
        AlertOutcome::Rejected(rejection) => record_rejection(rejection),
        AlertOutcome::Delivered {
            sent_to, errors, ..
        } => {
            counter!("sos_engine_dispatches_total", "status" => "delivered").increment(1);
            counter!("sos_engine_contacts_reached_total").increment(*sent_to as u64);
            if !errors.is_empty() {
                counter!("sos_engine_dispatch_partial_errors_total")
                    .increment(errors.len() as u64);
            }
        }
        AlertOutcome::Failed { .. } => {
            counter!("sos_engine_dispatches_total", "status" => "failed").increment(1);
        }
    }
}

/// 记录位置解析结果与耗时
pub fn record_location_resolved(fallback: bool, latency_ms: f64) {
    if fallback {
        counter!("sos_engine_location_fallbacks_total").increment(1);
    }
    histogram!("sos_engine_location_latency_ms").record(latency_ms);
}

/// 记录缓存查询
pub fn record_cache_lookup(cache: &str, lookup: CacheLookup) {
    counter!(
        "sos_engine_cache_lookups_total",
        "cache" => cache.to_string(),
        "result" => lookup.as_str()
    )
    .increment(1);
}

/// 记录报告提交 (fire-and-forget)
pub fn record_report_submitted(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "sos_engine_reports_submitted_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 会话指标聚合器
///
/// 在内存中聚合一次 CLI 会话的告警生命周期，便于输出摘要。
#[derive(Debug, Clone, Default)]
pub struct AlertMetricsAggregator {
    /// 各触发来源次数
    pub triggers: HashMap<&'static str, u64>,

    /// 开始的倒计时数
    pub countdowns_started: u64,

    /// 倒计时 tick 数
    pub countdown_ticks: u64,

    /// 取消次数
    pub cancellations: u64,

    /// 成功送达次数
    pub delivered: u64,

    /// 失败次数
    pub failed: u64,

    /// 各拒绝原因次数
    pub rejections: HashMap<&'static str, u64>,

    /// 送达的联系人总数
    pub contacts_reached: u64,

    /// 部分失败错误数
    pub dispatch_errors: u64,

    /// 倒计时开始到结果的耗时统计 (毫秒)
    pub dispatch_latency_ms: RunningStats,
}

impl AlertMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_trigger(&mut self, source: TriggerSource) {
        *self.triggers.entry(source.as_str()).or_insert(0) += 1;
    }

    pub fn record_countdown_started(&mut self) {
        self.countdowns_started += 1;
    }

    pub fn record_tick(&mut self) {
        self.countdown_ticks += 1;
    }

    pub fn record_cancellation(&mut self) {
        self.cancellations += 1;
    }

    /// 更新聚合统计
    ///
    /// `latency_ms` 仅对已派发的结果有意义，拒绝时忽略。
    pub fn record_outcome(&mut self, outcome: &AlertOutcome, latency_ms: Option<f64>) {
        match outcome {
            AlertOutcome::Rejected(rejection) => {
                *self.rejections.entry(rejection.as_str()).or_insert(0) += 1;
                return;
            }
            AlertOutcome::Delivered {
                sent_to, errors, ..
            } => {
                self.delivered += 1;
                self.contacts_reached += *sent_to as u64;
                self.dispatch_errors += errors.len() as u64;
            }
            AlertOutcome::Failed { .. } => {
                self.failed += 1;
            }
        }
        if let Some(latency) = latency_ms {
            self.dispatch_latency_ms.push(latency);
        }
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let dispatched = self.delivered + self.failed;
        MetricsSummary {
            total_triggers: self.triggers.values().sum(),
            countdowns_started: self.countdowns_started,
            cancellations: self.cancellations,
            delivered: self.delivered,
            failed: self.failed,
            rejected: self.rejections.values().sum(),
            contacts_reached: self.contacts_reached,
            delivery_rate: if dispatched > 0 {
                self.delivered as f64 / dispatched as f64 * 100.0
            } else {
                0.0
            },
            dispatch_latency_ms: StatsSummary::from(&self.dispatch_latency_ms),
            rejection_counts: self
                .rejections
                .iter()
                .map(|(reason, count)| (reason.to_string(), *count))
                .collect(),
        }
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_triggers: u64,
    pub countdowns_started: u64,
    pub cancellations: u64,
    pub delivered: u64,
    pub failed: u64,
    pub rejected: u64,
    pub contacts_reached: u64,
    pub delivery_rate: f64,
    pub dispatch_latency_ms: StatsSummary,
    pub rejection_counts: HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Alert Metrics Summary ===")?;
        writeln!(f, "Triggers: {}", self.total_triggers)?;
        writeln!(f, "Countdowns started: {}", self.countdowns_started)?;
        writeln!(f, "Cancelled: {}", self.cancellations)?;
        writeln!(
            f,
            "Delivered: {} ({:.2}%)",
            self.delivered, self.delivery_rate
        )?;
        writeln!(f, "Failed: {}", self.failed)?;
        writeln!(f, "Rejected: {}", self.rejected)?;
        writeln!(f, "Contacts reached: {}", self.contacts_reached)?;
        writeln!(f, "Dispatch latency (ms): {}", self.dispatch_latency_ms)?;

        if !self.rejection_counts.is_empty() {
            writeln!(f, "Rejections:")?;
            for (reason, count) in &self.rejection_counts {
                writeln!(f, "  {}: {}", reason, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}
