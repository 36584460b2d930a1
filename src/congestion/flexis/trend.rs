//! Theil-Sen style trend detection over the slope store.
//! 基于斜率存储的泰尔-森趋势检测。

use super::slopes::SlopeStore;
use crate::error::Result;

/// The outcome of one trend evaluation.
///
/// 一次趋势评估的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Fewer than `sigma` slopes; not enough confidence to cut the window.
    /// 斜率数量少于 `sigma`，置信度不足。
    Inconclusive { slopes: usize },
    /// The median slope stayed below `theta`.
    /// 中位斜率低于 `theta`。
    Clear { slope: i32 },
    /// The median slope reached `theta`: queues are building up.
    /// 中位斜率达到 `theta`：队列正在积累。
    Congested { slope: i32 },
}

impl Verdict {
    pub fn is_congested(&self) -> bool {
        matches!(self, Verdict::Congested { .. })
    }
}

/// Decides whether RTTs are trending upwards.
#[derive(Debug, Clone, Copy)]
pub struct TrendEstimator {
    /// Minimum number of slopes for a conclusive verdict.
    pub sigma: u32,
    /// Slope threshold, magnified 1000 times.
    pub theta: i32,
}

impl TrendEstimator {
    pub fn new(sigma: u32, theta: i32) -> Self {
        Self { sigma, theta }
    }

    /// Evaluates the median of every slope in `store` against `theta`.
    ///
    /// 将 `store` 中所有斜率的中位数与 `theta` 比较。
    pub fn evaluate(&self, store: &SlopeStore) -> Result<Verdict> {
        let slopes = store.len();
        if slopes < self.sigma as usize {
            return Ok(Verdict::Inconclusive { slopes });
        }
        let slope = store.median(1, slopes)?;
        if slope >= self.theta {
            Ok(Verdict::Congested { slope })
        } else {
            Ok(Verdict::Clear { slope })
        }
    }
}
