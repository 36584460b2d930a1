//! An implementation of FlexiS, a delay-trend-based congestion control algorithm.
//!
//! 一个基于时延趋势的拥塞控制算法 FlexiS 的实现。
//!
//! RTT samples of packets sent within the same millisecond are compressed into
//! their median and appended to an observation window. Every new point adds
//! its slopes towards all older points to a sorted store, and once the window
//! spans `tau` the median of all slopes (a Theil-Sen estimate) is compared to
//! `theta`. A rising trend cuts the window multiplicatively; otherwise the
//! window follows a cubic-plus-linear rate curve and the oldest point is
//! evicted.

use crate::config::{Config, SharedConfig};
use crate::congestion::{
    CongestionControl, Connection, NEUTRAL_PACING_RATIO, PacingRatio, PacingSink, WindowEvent,
};
use crate::error::Result;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

pub mod rate;
pub mod rtt_bin;
pub mod slopes;
pub mod sorted;
pub mod trend;
pub mod window;

use rate::{EpochState, RateController};
use rtt_bin::RttBin;
use slopes::SlopeStore;
use trend::{TrendEstimator, Verdict};
use window::ObservationWindow;

/// The state of the controller.
///
/// 控制器的状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexisState {
    /// No RTT sample yet, or the connection was released.
    /// 尚无RTT样本，或连接已释放。
    Idle,
    /// Collecting samples and evaluating trends.
    /// 正在收集样本并评估趋势。
    Accumulating,
    /// The window was cut; waiting for packets sent afterwards to be acknowledged.
    /// 窗口已减小，等待减小之后发送的数据包被确认。
    DecreasePending,
}

/// The FlexiS congestion controller of one connection.
///
/// 单个连接的 FlexiS 拥塞控制器。
#[derive(Debug)]
pub struct Flexis<P: PacingSink = PacingRatio> {
    config: SharedConfig,
    pacing: P,
    /// Zero of the millisecond clock used for RTT bins.
    origin: Instant,
    /// `None` once released.
    vars: Option<EpochState>,
    bin: RttBin,
    window: ObservationWindow,
    slopes: SlopeStore,
    /// The ratio to publish when the current event completes.
    pending_pacing: Option<u32>,
}

impl<P: PacingSink> Flexis<P> {
    /// Initializes the controller for a new connection and sets pacing to neutral.
    ///
    /// 为新连接初始化控制器，并将步调比例设为中性。
    pub fn new(config: impl Into<SharedConfig>, pacing: P, conn: &Connection) -> Self {
        pacing.set_pacing_ratio(NEUTRAL_PACING_RATIO);
        Self {
            config: config.into(),
            pacing,
            origin: conn.now,
            vars: Some(EpochState::new(conn.cwnd)),
            bin: RttBin::new(),
            window: ObservationWindow::new(),
            slopes: SlopeStore::new(),
            pending_pacing: None,
        }
    }

    pub fn state(&self) -> FlexisState {
        match &self.vars {
            Some(vars) if vars.guard.is_some() => FlexisState::DecreasePending,
            Some(vars) if vars.last_rtt.is_some() => FlexisState::Accumulating,
            _ => FlexisState::Idle,
        }
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// 获取统计信息
    /// Get statistics
    pub fn statistics(&self) -> FlexisStats {
        let vars = self.vars.as_ref();
        FlexisStats {
            state: self.state(),
            bin_samples: self.bin.len(),
            window_points: self.window.len(),
            window_duration_ms: self.window.duration(),
            slopes: self.slopes.len(),
            epoch_started: vars.is_some_and(|vars| vars.t0.is_some()),
            r0: vars.map_or(0, |vars| vars.r0),
            epoch_min_rtt: vars.and_then(|vars| vars.min_rtt),
            guard: vars.and_then(|vars| vars.guard),
            undo_cwnd: vars.map(|vars| vars.undo_cwnd),
        }
    }

    /// Drops all trend data and the current epoch, and sets pacing to neutral.
    ///
    /// 丢弃所有趋势数据和当前增长周期，并将步调比例设为中性。
    fn reset_trend_state(&mut self) {
        if let Some(vars) = self.vars.as_mut() {
            clear_trend(&mut self.bin, &mut self.window, &mut self.slopes, vars);
            self.pending_pacing = Some(NEUTRAL_PACING_RATIO);
            debug!("Trend state reset");
        }
    }

    fn flush_pacing(&mut self) {
        if let Some(ratio) = self.pending_pacing.take().filter(|&ratio| ratio > 0) {
            self.pacing.set_pacing_ratio(ratio);
        }
    }

    /// The millisecond, relative to the connection start, at which the
    /// packet behind the latest RTT sample was sent.
    fn send_time_ms(&self, now: Instant, rtt: Duration) -> Option<u64> {
        let send_time = now.checked_sub(rtt)?;
        let elapsed = send_time
            .checked_duration_since(self.origin)
            .filter(|elapsed| !elapsed.is_zero())?;
        Some(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
    }

    fn handle_ack(&mut self, conn: &mut Connection, ack_seq: u32, config: &Config) {
        let Some(rtt) = self.vars.as_ref().and_then(|vars| vars.last_rtt) else {
            return;
        };
        let Some(send_time_ms) = self.send_time_ms(conn.now, rtt) else {
            trace!(rtt_us = rtt.as_micros(), "Sample sent before the connection started");
            return;
        };
        if self.bin.send_time_ms().is_some_and(|open| send_time_ms < open) {
            trace!(send_time_ms, "Stale RTT sample ignored");
            return;
        }

        if let Some(guard) = self.vars.as_ref().and_then(|vars| vars.guard) {
            if !seq_after(ack_seq, guard) {
                // Sent before the decrease took effect.
                return;
            }
            self.reset_trend_state();
        }

        let Self {
            vars: Some(vars),
            bin,
            window,
            slopes,
            pending_pacing,
            ..
        } = self
        else {
            return;
        };
        let rate = RateController::new(config);
        let rtt_us = u32::try_from(rtt.as_micros()).unwrap_or(u32::MAX);

        vars.update_min_rtt(rtt);

        let mut reasoning = false;
        if bin.send_time_ms() != Some(send_time_ms) {
            if let Some(closed_ms) = bin.send_time_ms() {
                match close_bin(bin, window, slopes, closed_ms) {
                    Ok(generated) => reasoning = generated > 0,
                    Err(err) => trace!(closed_ms, %err, "No reasoning this round"),
                }
                bin.reset();
            }
        }
        if let Err(err) = bin.add(send_time_ms, rtt_us) {
            trace!(send_time_ms, %err, "RTT sample dropped");
        }

        let duration_ms = window.duration();
        if reasoning && duration_ms >= config.tau_ms() {
            let estimator = TrendEstimator::new(config.sigma, config.theta);
            match estimator.evaluate(slopes) {
                Ok(Verdict::Congested { slope }) => {
                    let guard = conn.snd_nxt;
                    rate.decrease_cwnd(vars, conn);
                    clear_trend(bin, window, slopes, vars);
                    vars.guard = Some(guard);
                    *pending_pacing = Some(NEUTRAL_PACING_RATIO);
                    debug!(
                        slope,
                        theta = config.theta,
                        guard,
                        cwnd = conn.cwnd,
                        "Rising delay trend, window decreased"
                    );
                    return;
                }
                Ok(verdict) => {
                    trace!(?verdict, duration_ms, slopes = slopes.len(), "No congestion");
                    if vars.t0.is_none() {
                        rate.start_epoch(vars, conn);
                    }
                    if let Err(err) = window.dequeue_oldest(slopes) {
                        trace!(%err, "Nothing to evict");
                    }
                }
                Err(err) => trace!(%err, "Trend evaluation skipped"),
            }
        }

        if let Some(ratio) = rate.increase_cwnd(vars, conn) {
            *pending_pacing = Some(ratio);
        }
    }
}

impl<P: PacingSink> CongestionControl for Flexis<P> {
    fn slow_start_threshold(&self, conn: &Connection) -> u32 {
        rate::slow_start_threshold(conn.cwnd)
    }

    fn rollback_cwnd(&self, conn: &Connection) -> u32 {
        match &self.vars {
            Some(vars) => vars.undo_cwnd,
            None => conn.cwnd.max(conn.prior_cwnd),
        }
    }

    fn on_window_event(&mut self, conn: &mut Connection, event: WindowEvent) {
        let Some(vars) = self.vars.as_ref() else {
            return;
        };
        match event {
            WindowEvent::DecreaseCompleted if vars.guard.is_some() => {
                // The transport cut the window on top of our own decrease.
                conn.cwnd = vars.undo_cwnd;
                self.reset_trend_state();
            }
            WindowEvent::Loss => self.reset_trend_state(),
            _ => {}
        }
        self.flush_pacing();
    }

    fn on_congestion_avoidance(&mut self, conn: &mut Connection, ack_seq: u32, _bytes_acked: u32) {
        let config = self.config.load();
        self.handle_ack(conn, ack_seq, &config);
        self.flush_pacing();
    }

    fn on_ack_sampled(&mut self, rtt: Duration) {
        if let Some(vars) = self.vars.as_mut() {
            vars.last_rtt = Some(rtt);
        }
    }

    fn on_release(&mut self) {
        self.bin.reset();
        self.window.clear();
        self.slopes.clear();
        if self.vars.take().is_some() {
            debug!("FlexiS state released");
        }
    }

    fn algorithm_name(&self) -> &'static str {
        "flexis"
    }
}

/// Closes the bin of `closed_ms`: its median becomes a new observation point
/// and the point's slopes are generated.
fn close_bin(
    bin: &RttBin,
    window: &mut ObservationWindow,
    slopes: &mut SlopeStore,
    closed_ms: u64,
) -> Result<usize> {
    let median = bin.median()?;
    let point = window.enqueue(closed_ms, median)?;
    trace!(send_time_ms = closed_ms, median_rtt_us = median, samples = bin.len(), "RTT bin closed");
    window.generate_slopes(point, slopes)
}

fn clear_trend(
    bin: &mut RttBin,
    window: &mut ObservationWindow,
    slopes: &mut SlopeStore,
    vars: &mut EpochState,
) {
    bin.reset();
    window.clear();
    slopes.clear();
    vars.clear_epoch();
}

/// Serial-number comparison: whether `a` comes after `b`.
fn seq_after(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

/// FlexiS拥塞控制统计信息
/// FlexiS congestion control statistics
#[derive(Debug, Clone)]
pub struct FlexisStats {
    pub state: FlexisState,
    pub bin_samples: usize,
    pub window_points: usize,
    pub window_duration_ms: u64,
    pub slopes: usize,
    pub epoch_started: bool,
    pub r0: u64,
    pub epoch_min_rtt: Option<Duration>,
    pub guard: Option<u32>,
    pub undo_cwnd: Option<u32>,
}

impl fmt::Display for FlexisStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FlexiS[state:{:?}, bin:{}, window:{}pts/{}ms, slopes:{}, epoch:{}, r0:{}pkt/s, min_rtt:{}, guard:{}]",
            self.state,
            self.bin_samples,
            self.window_points,
            self.window_duration_ms,
            self.slopes,
            self.epoch_started,
            self.r0,
            self.epoch_min_rtt
                .map_or_else(|| "-".to_string(), |rtt| format!("{:.1}ms", rtt.as_secs_f64() * 1000.0)),
            self.guard.map_or_else(|| "-".to_string(), |guard| guard.to_string()),
        )
    }
}
