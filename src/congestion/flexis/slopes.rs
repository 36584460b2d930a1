//! 斜率存储 - 观测点两两之间的斜率
//! Slope Store - pairwise slopes between observation points
//!
//! 职责：
//! - 保持所有斜率全局升序
//! - 以单次线性遍历合并新批次
//! - 通过扇出句柄快速删除
//! - 提供泰尔-森中位数所需的秩查询

use super::sorted::{Handle, SortedList};
use crate::error::{Error, Result};

/// A reference to one slope in a [`SlopeStore`].
pub type SlopeHandle = Handle;

/// The slope, magnified 1000 times, of the line from `older` to `newer`.
///
/// Both points are `(send_time_ms, rtt_us)`. Microseconds over milliseconds
/// already carry the factor of 1000, so the integer quotient is returned as
/// is. Returns `None` unless `newer` was sent strictly later.
///
/// 从 `older` 到 `newer` 的连线斜率（放大1000倍）。
pub fn slope_between(older: (u64, u32), newer: (u64, u32)) -> Option<i32> {
    let elapsed_ms = newer.0.checked_sub(older.0).filter(|&ms| ms > 0)?;
    let rise_us = i64::from(newer.1) - i64::from(older.1);
    let slope = rise_us / i64::try_from(elapsed_ms).unwrap_or(i64::MAX);
    Some(slope.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
}

/// Slopes generated for one new point, kept ascending until merged.
///
/// Each slope remembers the older point (its `owner`) that will hold its
/// fanout reference.
/// 为一个新观测点生成的斜率批次，合并前保持升序。
#[derive(Debug)]
pub struct SlopeBatch<O> {
    entries: Vec<(i32, O)>,
}

impl<O> SlopeBatch<O> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts a slope after every batch entry not greater than it.
    pub fn insert(&mut self, slope: i32, owner: O) -> Result<()> {
        self.entries
            .try_reserve(1)
            .map_err(|_| Error::AllocationFailure)?;
        let at = self.entries.partition_point(|&(existing, _)| existing <= slope);
        self.entries.insert(at, (slope, owner));
        Ok(())
    }
}

impl<O> Default for SlopeBatch<O> {
    fn default() -> Self {
        Self::new()
    }
}

/// The ascending store of all live slopes.
///
/// 所有有效斜率的升序存储。
#[derive(Debug, Default)]
pub struct SlopeStore {
    slopes: SortedList<i32>,
}

impl SlopeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slopes.is_empty()
    }

    /// Merges a batch and returns each slope's handle paired with its owner,
    /// in ascending slope order. On failure the store is left unchanged.
    ///
    /// 合并一个批次，返回每个斜率的句柄及其所属观测点。失败时存储保持不变。
    pub fn merge<O: Copy>(&mut self, batch: SlopeBatch<O>) -> Result<Vec<(O, SlopeHandle)>> {
        let owners: Vec<O> = batch.entries.iter().map(|&(_, owner)| owner).collect();
        let handles = self
            .slopes
            .merge_sorted(batch.entries.into_iter().map(|(slope, _)| slope))?;
        Ok(owners.into_iter().zip(handles).collect())
    }

    /// Removes one slope through its fanout reference.
    pub fn remove(&mut self, handle: SlopeHandle) -> Result<i32> {
        self.slopes.remove(handle)
    }

    /// The median of the slopes ranked `start..=end` (1-indexed).
    pub fn median(&self, start: usize, end: usize) -> Result<i32> {
        self.slopes.median(start, end)
    }

    pub fn clear(&mut self) {
        self.slopes.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.slopes.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_slope_between() {
        // 1000us over 10ms is a slope of 0.1, magnified to 100.
        assert_eq!(slope_between((0, 10_000), (10, 11_000)), Some(100));
        assert_eq!(slope_between((0, 11_000), (10, 10_000)), Some(-100));
        assert_eq!(slope_between((0, 10_000), (7, 10_000)), Some(0));
        // Integer division truncates toward zero.
        assert_eq!(slope_between((0, 0), (3, 10)), Some(3));
        assert_eq!(slope_between((0, 10), (3, 0)), Some(-3));
    }

    #[test]
    fn test_slope_requires_later_point() {
        assert_eq!(slope_between((5, 100), (5, 200)), None);
        assert_eq!(slope_between((6, 100), (5, 200)), None);
    }

    #[test]
    fn test_batch_is_ascending_and_stable() {
        let mut batch = SlopeBatch::new();
        batch.insert(5, 'a').unwrap();
        batch.insert(-1, 'b').unwrap();
        batch.insert(5, 'c').unwrap();
        batch.insert(0, 'd').unwrap();
        assert_eq!(batch.entries, vec![(-1, 'b'), (0, 'd'), (5, 'a'), (5, 'c')]);
    }

    #[test]
    fn test_merge_returns_owner_handles() {
        let mut store = SlopeStore::new();
        let mut batch = SlopeBatch::new();
        batch.insert(30, 0usize).unwrap();
        batch.insert(10, 1usize).unwrap();
        let refs = store.merge(batch).unwrap();
        assert_eq!(store.iter().collect::<Vec<_>>(), vec![10, 30]);

        let mut batch = SlopeBatch::new();
        batch.insert(20, 2usize).unwrap();
        batch.insert(40, 2usize).unwrap();
        let more = store.merge(batch).unwrap();
        assert_eq!(store.iter().collect::<Vec<_>>(), vec![10, 20, 30, 40]);
        assert_eq!(store.len(), 4);

        // Removing owner 2's slopes leaves exactly the first batch.
        for (owner, handle) in more {
            assert_eq!(owner, 2);
            store.remove(handle).unwrap();
        }
        assert_eq!(store.iter().collect::<Vec<_>>(), vec![10, 30]);

        let owners: Vec<usize> = refs.iter().map(|&(owner, _)| owner).collect();
        assert_eq!(owners, vec![1, 0]);
    }

    #[test]
    fn test_median_over_whole_store() {
        let mut store = SlopeStore::new();
        assert_eq!(store.median(1, 0), Err(Error::EmptyCollection));

        let mut batch = SlopeBatch::new();
        for slope in [4, -2, 8, 6] {
            batch.insert(slope, ()).unwrap();
        }
        store.merge(batch).unwrap();
        // -2, 4, 6, 8
        assert_eq!(store.median(1, store.len()).unwrap(), 5);
        assert!(matches!(store.median(1, 5), Err(Error::OutOfRange { .. })));
    }
}
