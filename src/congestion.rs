//! Defines the pluggable congestion control interface.
//! 定义了可插拔的拥塞控制接口。
//!
//! The enclosing transport owns the connection and calls into the controller
//! with a serialized sequence of events; the controller mutates the window in
//! the [`Connection`] view it is handed and writes pacing ratios to a
//! [`PacingSink`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

pub mod flexis;

/// The pacing ratio, in percent, that leaves the theoretical rate untouched.
pub const NEUTRAL_PACING_RATIO: u32 = 100;

/// The transport-owned state the controller reads and writes on each event.
///
/// 控制器在每个事件中读取和写入的传输层状态。
#[derive(Debug, Clone)]
pub struct Connection {
    /// The time at which the current event is processed.
    /// 处理当前事件的时间。
    pub now: Instant,
    /// The congestion window, in packets.
    /// 拥塞窗口（以包为单位）。
    pub cwnd: u32,
    /// The upper bound the congestion window may never exceed.
    /// 拥塞窗口的上限。
    pub cwnd_clamp: u32,
    /// The congestion window before the transport's last reduction.
    /// 传输层上一次减小前的拥塞窗口。
    pub prior_cwnd: u32,
    /// The largest number of packets in flight during the last window.
    /// 上一个窗口内的最大在途包数量。
    pub max_packets_out: u32,
    /// The smoothed RTT, zero while unknown.
    /// 平滑RTT，未知时为零。
    pub srtt: Duration,
    /// The next sequence number to be sent.
    /// 下一个要发送的序列号。
    pub snd_nxt: u32,
}

impl Connection {
    /// Creates a view with the given window and no history.
    pub fn new(now: Instant, cwnd: u32) -> Self {
        Self {
            now,
            cwnd,
            cwnd_clamp: u32::MAX,
            prior_cwnd: 0,
            max_packets_out: 0,
            srtt: Duration::ZERO,
            snd_nxt: 0,
        }
    }

    /// Whether the sender is actually using its window rather than being
    /// held back by the application.
    ///
    /// 发送方是否真正用满了窗口，而不是受应用数据量限制。
    pub fn is_cwnd_limited(&self) -> bool {
        u64::from(self.cwnd) < 2 * u64::from(self.max_packets_out)
    }
}

/// Window events signalled by the transport.
///
/// 传输层发出的窗口事件。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    /// The window is restarted after an idle period.
    /// 空闲后重启窗口。
    Restart,
    /// The transport finished a window reduction.
    /// 传输层完成了一次窗口减小。
    DecreaseCompleted,
    /// The transport declared a loss.
    /// 传输层判定发生丢包。
    Loss,
    /// Any other event.
    /// 其他事件。
    Other,
}

/// The destination for pacing ratios computed by the controller.
///
/// 控制器计算出的步调比例的接收端。
pub trait PacingSink: Send + Sync + 'static {
    /// Sets the pacing ratio, in percent of the theoretical rate.
    /// 设置步调比例（理论速率的百分比）。
    fn set_pacing_ratio(&self, ratio: u32);
}

/// A shared, last-writer-wins pacing ratio.
///
/// 一个共享的、以最后写入为准的步调比例。
#[derive(Debug, Clone)]
pub struct PacingRatio {
    ratio: Arc<AtomicU32>,
}

impl PacingRatio {
    pub fn new() -> Self {
        Self {
            ratio: Arc::new(AtomicU32::new(NEUTRAL_PACING_RATIO)),
        }
    }

    /// Returns the last written ratio.
    pub fn get(&self) -> u32 {
        self.ratio.load(Ordering::Relaxed)
    }
}

impl Default for PacingRatio {
    fn default() -> Self {
        Self::new()
    }
}

impl PacingSink for PacingRatio {
    fn set_pacing_ratio(&self, ratio: u32) {
        self.ratio.store(ratio, Ordering::Relaxed);
    }
}

/// A trait for congestion control algorithms.
///
/// 拥塞控制算法的 trait。
pub trait CongestionControl: Send + Sync + 'static {
    /// Returns the slow start threshold to use after a reduction.
    ///
    /// 返回减小之后使用的慢启动阈值。
    fn slow_start_threshold(&self, conn: &Connection) -> u32;

    /// Returns the window to restore when the transport undoes a reduction.
    ///
    /// 返回传输层撤销减小时要恢复的窗口。
    fn rollback_cwnd(&self, conn: &Connection) -> u32;

    /// Called when the transport signals a window event.
    ///
    /// 当传输层发出窗口事件时调用。
    fn on_window_event(&mut self, conn: &mut Connection, event: WindowEvent);

    /// Called for each acknowledgment while in congestion avoidance.
    ///
    /// 在拥塞避免阶段每收到一个确认时调用。
    fn on_congestion_avoidance(&mut self, conn: &mut Connection, ack_seq: u32, bytes_acked: u32);

    /// Called when a new RTT sample is taken.
    ///
    /// 当获得新的RTT样本时调用。
    fn on_ack_sampled(&mut self, rtt: Duration);

    /// Releases all state held for the connection.
    ///
    /// 释放为该连接持有的所有状态。
    fn on_release(&mut self);

    /// The algorithm name.
    fn algorithm_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cwnd_limited() {
        let mut conn = Connection::new(Instant::now(), 10);
        conn.max_packets_out = 5;
        assert!(!conn.is_cwnd_limited());

        conn.max_packets_out = 6;
        assert!(conn.is_cwnd_limited());
    }

    #[test]
    fn test_pacing_ratio_last_writer_wins() {
        let ratio = PacingRatio::new();
        let sink = ratio.clone();
        assert_eq!(ratio.get(), NEUTRAL_PACING_RATIO);

        sink.set_pacing_ratio(120);
        sink.set_pacing_ratio(105);
        assert_eq!(ratio.get(), 105);
    }
}
