//! Fan-out 指标收集模块
//!
//! Prometheus 计数器 + 投递延迟在线统计。
//! 未安装 recorder 时，所有 `record_*` 调用均为空操作。

use metrics::{counter, histogram};

/// 记录一次成功出队
pub fn record_item_dequeued(key: &str) {
    counter!("fanout_items_dequeued_total", "key" => key.to_string()).increment(1);
}

/// 记录一次超时空轮询
pub fn record_dequeue_empty(key: &str) {
    counter!("fanout_dequeue_empty_total", "key" => key.to_string()).increment(1);
}

/// 记录投递结果
pub fn record_item_delivered(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "fanout_items_delivered_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 记录未送达的条目
///
/// `reason`: `overflow` / `closed` / `shutdown`
pub fn record_item_dropped(sink_name: &str, reason: &'static str, count: u64) {
    if count == 0 {
        return;
    }
    counter!(
        "fanout_items_dropped_total",
        "sink" => sink_name.to_string(),
        "reason" => reason
    )
    .increment(count);
}

/// 记录队列重连退避
pub fn record_queue_retry(attempt: u32, delay_ms: u64) {
    counter!("fanout_queue_retries_total").increment(1);
    histogram!("fanout_queue_retry_delay_ms").record(delay_ms as f64);
    tracing::trace!(attempt, delay_ms, "queue retry recorded");
}

/// 记录投递耗时
pub fn record_delivery_latency_ms(sink_name: &str, latency_ms: f64) {
    histogram!("fanout_delivery_latency_ms", "sink" => sink_name.to_string()).record(latency_ms);
}

/// 记录 worker 退出
///
/// `role`: `source` / `sink`；`status`: `clean` / `failed` / `panicked`
pub fn record_worker_stopped(role: &'static str, status: &'static str) {
    counter!(
        "fanout_workers_stopped_total",
        "role" => role,
        "status" => status
    )
    .increment(1);
}

/// 统计摘要
#[derive(Debug, Clone, Default, PartialEq)]
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
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
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
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
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

    pub fn summary(&self) -> StatsSummary {
        StatsSummary::from(self)
    }
}
