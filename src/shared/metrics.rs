//! Prometheus Metrics Module
//!
//! 订单请求生命周期与撮合的核心指标
//!
//! ## 指标类型
//! - **Counter**: 请求数、限流次数、完成回调、成交、过期、丢弃的行情、发布的事件
//! - **Histogram**: 每轮派发批量大小
//!
//! ## 使用示例
//! ```rust,ignore
//! use order_engine::shared::metrics::METRICS;
//!
//! METRICS.requests_total.with_label_values(&["new"]).inc();
//! ```

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, CounterVec, Encoder, Histogram, TextEncoder,
};

lazy_static! {
    /// 全局Metrics实例
    pub static ref METRICS: Metrics = Metrics::new();
}

pub struct Metrics {
    /// 提交的请求 (按类型: new/amend/cancel/mass_cancel)
    pub requests_total: CounterVec,

    /// 因容量不足被限流的次数 (按 tracker 索引)
    pub throttled_total: CounterVec,

    /// 终态回调次数 (complete/reject/timeout/timeout_after_throttled/fail)
    pub completions_total: CounterVec,

    /// 每轮派发给 line handler 的请求数
    pub dispatch_batch_size: Histogram,

    /// 撮合成交次数 (按方向)
    pub fills_total: CounterVec,

    /// 撮合过期次数 (按方向)
    pub expiries_total: CounterVec,

    /// 因格式错误被丢弃的行情更新 (按原因)
    pub market_data_dropped_total: CounterVec,

    /// 发布的更新事件 (按事件类型)
    pub update_events_total: CounterVec,
}

impl Metrics {
    fn new() -> Self {
        Self {
            requests_total: register_counter_vec!(
                "order_engine_requests_total",
                "Order requests submitted to the executor",
                &["request_type"]
            )
            .expect("requests_total registers once"),

            throttled_total: register_counter_vec!(
                "order_engine_throttled_total",
                "Admission attempts refused for lack of throttle capacity",
                &["tracker"]
            )
            .expect("throttled_total registers once"),

            completions_total: register_counter_vec!(
                "order_engine_completions_total",
                "Terminal completion callbacks delivered",
                &["completion"]
            )
            .expect("completions_total registers once"),

            dispatch_batch_size: register_histogram!(
                "order_engine_dispatch_batch_size",
                "Requests forwarded to the line handler per executor cycle",
                vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0]
            )
            .expect("dispatch_batch_size registers once"),

            fills_total: register_counter_vec!(
                "order_engine_fills_total",
                "Fills produced by the matching engine",
                &["side"]
            )
            .expect("fills_total registers once"),

            expiries_total: register_counter_vec!(
                "order_engine_expiries_total",
                "Own orders expired by the matching engine",
                &["side"]
            )
            .expect("expiries_total registers once"),

            market_data_dropped_total: register_counter_vec!(
                "order_engine_market_data_dropped_total",
                "Malformed market data updates dropped",
                &["reason"]
            )
            .expect("market_data_dropped_total registers once"),

            update_events_total: register_counter_vec!(
                "order_engine_update_events_total",
                "Update events published to subscribers",
                &["event"]
            )
            .expect("update_events_total registers once"),
        }
    }

    /// 导出Prometheus格式的指标
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!(error = %e, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
