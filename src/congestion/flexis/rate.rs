//! 速率控制器 - 基于速率的窗口增长与乘性减小
//! Rate Controller - rate-based window growth and multiplicative decrease
//!
//! 职责：
//! - 维护增长周期（epoch）的状态
//! - 按三次加线性速率曲线计算目标窗口
//! - 计算下一个RTT的步调比例
//! - 乘性减小窗口

use crate::config::Config;
use crate::congestion::{Connection, NEUTRAL_PACING_RATIO};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// The smallest window the controller ever leaves behind.
pub const MIN_CWND: u32 = 2;

const USEC_PER_SEC: u128 = 1_000_000;

/// Per-connection epoch bookkeeping.
///
/// 每个连接的增长周期状态。
#[derive(Debug, Clone)]
pub struct EpochState {
    /// Start of the current increase epoch.
    /// 当前增长周期的开始时间。
    pub t0: Option<Instant>,
    /// The rate, in packets per second, at the start of the epoch.
    /// 增长周期开始时的速率（包/秒）。
    pub r0: u64,
    /// The smallest RTT seen since the last reset.
    /// 上次重置以来观测到的最小RTT。
    pub min_rtt: Option<Duration>,
    /// When the sender stopped being window-limited.
    /// 发送方不再受窗口限制的时间。
    pub unlimited_since: Option<Instant>,
    /// `snd_nxt` when the window was last decreased; acknowledgments up to
    /// it belong to packets sent before the decrease.
    /// 上次减小窗口时的 `snd_nxt`。
    pub guard: Option<u32>,
    /// The latest RTT sample.
    /// 最近一次RTT样本。
    pub last_rtt: Option<Duration>,
    /// The last window this controller set.
    /// 本控制器最后设置的窗口。
    pub undo_cwnd: u32,
}

impl EpochState {
    pub fn new(cwnd: u32) -> Self {
        Self {
            t0: None,
            r0: 0,
            min_rtt: None,
            unlimited_since: None,
            guard: None,
            last_rtt: None,
            undo_cwnd: cwnd,
        }
    }

    pub fn update_min_rtt(&mut self, rtt: Duration) {
        if self.min_rtt.is_none_or(|min| rtt < min) {
            self.min_rtt = Some(rtt);
        }
    }

    /// Clears everything tied to the current epoch. `r0` is kept as the
    /// fallback baseline of the next epoch.
    pub fn clear_epoch(&mut self) {
        self.t0 = None;
        self.min_rtt = None;
        self.unlimited_since = None;
        self.guard = None;
    }

    /// The epoch minimum RTT if known, else the smoothed RTT.
    fn rtt_estimate(&self, conn: &Connection) -> Option<Duration> {
        self.min_rtt
            .filter(|rtt| rtt.as_micros() > 0)
            .or(Some(conn.srtt).filter(|rtt| rtt.as_micros() > 0))
    }
}

/// `r(t) = (t / alpha)^3 + t / beta + r0`, with `t` in whole milliseconds.
///
/// 速率曲线 `r(t) = (t / alpha)^3 + t / beta + r0`，`t` 以毫秒计。
#[derive(Debug, Clone, Copy)]
pub struct RateCurve {
    alpha: u64,
    beta: u64,
}

impl RateCurve {
    /// Returns `None` if either divisor is zero.
    pub fn new(alpha: u32, beta: u32) -> Option<Self> {
        (alpha > 0 && beta > 0).then_some(Self {
            alpha: u64::from(alpha),
            beta: u64::from(beta),
        })
    }

    /// The rate, in packets per second, `elapsed` into an epoch started at `r0`.
    pub fn rate(&self, elapsed: Duration, r0: u64) -> u64 {
        let t = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        (t / self.alpha)
            .saturating_pow(3)
            .saturating_add(t / self.beta)
            .saturating_add(r0)
    }
}

/// `r2 * 100 / r1`, rounded up. `r1` must not be zero.
pub fn pacing_ratio(r1: u64, r2: u64) -> u32 {
    let scaled = u128::from(r2) * 100;
    let r1 = u128::from(r1);
    let ratio = scaled.div_ceil(r1);
    u32::try_from(ratio).unwrap_or(u32::MAX)
}

/// `max(cwnd / 2, MIN_CWND)`.
pub fn slow_start_threshold(cwnd: u32) -> u32 {
    (cwnd / 2).max(MIN_CWND)
}

/// Converts epoch time into windows and pacing ratios.
///
/// 将增长周期时间转换为窗口大小和步调比例。
#[derive(Debug, Clone, Copy)]
pub struct RateController {
    curve: Option<RateCurve>,
    gamma: u32,
}

impl RateController {
    pub fn new(config: &Config) -> Self {
        Self {
            curve: RateCurve::new(config.alpha, config.beta),
            gamma: config.gamma,
        }
    }

    /// Starts an increase epoch at `conn.now`, anchoring the curve at the
    /// rate the current window achieves over the best known RTT.
    ///
    /// 在 `conn.now` 开始一个增长周期。
    pub fn start_epoch(&self, epoch: &mut EpochState, conn: &Connection) {
        let cwnd = u128::from(conn.cwnd);
        epoch.r0 = match epoch.rtt_estimate(conn) {
            Some(rtt) => u64::try_from(cwnd * USEC_PER_SEC / rtt.as_micros()).unwrap_or(u64::MAX),
            None => epoch.r0 / 2,
        };
        epoch.t0 = Some(conn.now);
        debug!(cwnd = conn.cwnd, r0 = epoch.r0, "Increase epoch started");
    }

    /// Grows the window along the rate curve.
    ///
    /// Returns the pacing ratio to publish, if any. While the sender is not
    /// window-limited the window is left alone and the time spent that way is
    /// later cut out of the epoch, so the curve resumes where it stopped.
    ///
    /// 沿速率曲线增大窗口，返回需要发布的步调比例。
    pub fn increase_cwnd(&self, epoch: &mut EpochState, conn: &mut Connection) -> Option<u32> {
        let t0 = epoch.t0?;

        if !conn.is_cwnd_limited() {
            epoch.unlimited_since.get_or_insert(conn.now);
            return Some(NEUTRAL_PACING_RATIO);
        }

        let curve = self.curve?;
        if conn.srtt.is_zero() {
            return None;
        }

        let t0 = match epoch.unlimited_since.take() {
            Some(since) => {
                let shifted = t0 + conn.now.saturating_duration_since(since);
                epoch.t0 = Some(shifted);
                shifted
            }
            None => t0,
        };

        let t1 = conn.now.checked_duration_since(t0)?;
        let r1 = curve.rate(t1, epoch.r0);
        if r1 == 0 {
            return None;
        }

        let rtt = epoch.rtt_estimate(conn)?;
        let target = u128::from(r1) * rtt.as_micros() / USEC_PER_SEC;
        let target = u32::try_from(target).unwrap_or(u32::MAX).min(conn.cwnd_clamp);
        conn.cwnd = conn.cwnd.max(target);
        epoch.undo_cwnd = conn.cwnd;

        // The rate one RTT ahead, so pacing anticipates the next target.
        let r2 = curve.rate(t1 + rtt, epoch.r0);
        let ratio = pacing_ratio(r1, r2);
        trace!(
            elapsed_ms = t1.as_millis(),
            r1,
            r2,
            cwnd = conn.cwnd,
            pacing_ratio = ratio,
            "Window increased along the rate curve"
        );
        Some(ratio)
    }

    /// Multiplicative decrease: `min(cwnd, max(cwnd * gamma / 100, MIN_CWND))`.
    ///
    /// 乘性减小窗口。
    pub fn decrease_cwnd(&self, epoch: &mut EpochState, conn: &mut Connection) {
        let reduced = u64::from(conn.cwnd) * u64::from(self.gamma) / 100;
        let reduced = u32::try_from(reduced).unwrap_or(u32::MAX).max(MIN_CWND);
        let old_cwnd = conn.cwnd;
        conn.cwnd = conn.cwnd.min(reduced);
        epoch.undo_cwnd = conn.cwnd;
        debug!(old_cwnd, new_cwnd = conn.cwnd, gamma = self.gamma, "Window decreased");
    }
}
