//! Compression of same-millisecond RTT samples.
//! 同一毫秒内RTT样本的压缩。

use super::sorted::SortedList;
use crate::error::Result;

/// The RTT samples, in microseconds, of packets sent in one millisecond.
///
/// 在同一毫秒内发送的数据包的RTT样本（微秒）。
#[derive(Debug, Default)]
pub struct RttBin {
    samples: SortedList<u32>,
    send_time_ms: Option<u64>,
}

impl RttBin {
    pub fn new() -> Self {
        Self::default()
    }

    /// The millisecond the bin currently collects, if any sample was added.
    pub fn send_time_ms(&self) -> Option<u64> {
        self.send_time_ms
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Adds a sample. The first sample after a reset opens the bin for
    /// `send_time_ms`; the caller resets before moving to another millisecond.
    pub fn add(&mut self, send_time_ms: u64, rtt_us: u32) -> Result<()> {
        debug_assert!(self.send_time_ms.is_none_or(|ms| ms == send_time_ms));
        self.samples.insert(rtt_us)?;
        self.send_time_ms.get_or_insert(send_time_ms);
        Ok(())
    }

    /// The median of the collected samples.
    pub fn median(&self) -> Result<u32> {
        self.samples.median(1, self.samples.len())
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.send_time_ms = None;
    }

    #[cfg(test)]
    fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.samples.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_empty_bin_has_no_median() {
        let bin = RttBin::new();
        assert_eq!(bin.median(), Err(Error::EmptyCollection));
        assert_eq!(bin.send_time_ms(), None);
    }

    #[test]
    fn test_samples_are_kept_sorted() {
        let mut bin = RttBin::new();
        for rtt in [12_000, 10_000, 11_500, 10_000] {
            bin.add(7, rtt).unwrap();
        }
        assert_eq!(bin.iter().collect::<Vec<_>>(), vec![10_000, 10_000, 11_500, 12_000]);
        assert_eq!(bin.send_time_ms(), Some(7));
    }

    #[test]
    fn test_median_odd_and_even() {
        let mut bin = RttBin::new();
        bin.add(1, 300).unwrap();
        assert_eq!(bin.median().unwrap(), 300);
        bin.add(1, 100).unwrap();
        assert_eq!(bin.median().unwrap(), 200);
        bin.add(1, 200).unwrap();
        assert_eq!(bin.median().unwrap(), 200);
    }

    #[test]
    fn test_reset_reopens_for_a_new_millisecond() {
        let mut bin = RttBin::new();
        bin.add(3, 100).unwrap();
        bin.reset();
        assert!(bin.is_empty());
        assert_eq!(bin.send_time_ms(), None);

        bin.add(4, 900).unwrap();
        assert_eq!(bin.send_time_ms(), Some(4));
        assert_eq!(bin.median().unwrap(), 900);
    }
}
