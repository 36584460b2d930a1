//! 定义了拥塞控制算法的可配置参数。
//! Defines the tunable parameters of the congestion control algorithm.

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;

/// A structure containing all tunable parameters of the FlexiS controller.
///
/// 包含 FlexiS 控制器所有可调参数的结构体。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The minimum number of slopes needed before the trend is trusted.
    /// 信任趋势之前所需的最少斜率数量。
    pub sigma: u32,
    /// The divisor of the cubic term of the rate curve, in milliseconds.
    /// A value of zero disables window growth.
    /// 速率曲线三次项的除数（毫秒）。为零时禁止窗口增长。
    pub alpha: u32,
    /// The divisor of the linear term of the rate curve, in milliseconds.
    /// A value of zero disables window growth.
    /// 速率曲线线性项的除数（毫秒）。为零时禁止窗口增长。
    pub beta: u32,
    /// The multiplicative decrease factor, as a percentage.
    /// 乘性减小因子（百分比）。
    pub gamma: u32,
    /// The minimum duration of the observation window before a trend is evaluated.
    /// 评估趋势之前观测窗口的最短持续时间。
    pub tau: Duration,
    /// The slope threshold, magnified 1000 times, at or above which
    /// congestion is considered to be building up.
    /// 斜率阈值（放大1000倍），达到或超过该值即认为拥塞正在形成。
    pub theta: i32,
}

impl Config {
    /// `tau` in whole milliseconds, the unit of the observation window.
    pub(crate) fn tau_ms(&self) -> u64 {
        self.tau.as_millis().try_into().unwrap_or(u64::MAX)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sigma: 3,
            alpha: 100,
            beta: 10,
            gamma: 85,
            tau: Duration::from_millis(60),
            theta: 30,
        }
    }
}

/// A process-wide, hot-swappable handle to a [`Config`].
///
/// Every connection holds a clone and loads one snapshot per event, so a
/// [`SharedConfig::store`] is observed by all connections on their next event.
///
/// 一个进程级、可热替换的配置句柄。每个连接持有一个克隆，并在每个事件开始时加载一次快照。
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<ArcSwap<Config>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Returns the current snapshot.
    /// 返回当前快照。
    pub fn load(&self) -> Arc<Config> {
        self.inner.load_full()
    }

    /// Replaces the configuration for all holders of this handle.
    /// 为此句柄的所有持有者替换配置。
    pub fn store(&self, config: Config) {
        self.inner.store(Arc::new(config));
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl From<Config> for SharedConfig {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}
