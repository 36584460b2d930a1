#![deny(clippy::expect_used, clippy::unwrap_used)]

//! A delay-trend-based TCP congestion control engine (FlexiS).
//! 一个基于时延趋势的 TCP 拥塞控制引擎（FlexiS）。
//!
//! RTT samples are compressed per millisecond, pairwise slopes of the
//! resulting points are kept sorted, and the median slope decides whether
//! the window grows along a cubic-plus-linear rate curve or is cut.

pub mod config;
pub mod error;

pub mod congestion;

pub use config::{Config, SharedConfig};
pub use congestion::flexis::{Flexis, FlexisState, FlexisStats};
pub use congestion::{CongestionControl, Connection, PacingRatio, PacingSink, WindowEvent};
pub use error::{Error, Result};
