//! 观测窗口 - 按发送时间排列的中位RTT数据点
//! Observation Window - median RTT points ordered by send time
//!
//! 职责：
//! - 按时间顺序追加观测点
//! - 为新观测点生成与旧观测点之间的斜率
//! - 先进先出淘汰，并通过扇出引用删除对应斜率

use super::slopes::{SlopeBatch, SlopeHandle, SlopeStore, slope_between};
use crate::error::{Error, Result};
use std::collections::VecDeque;
use tracing::trace;

const MAX_POINTS: usize = u32::MAX as usize;

/// A handle to a point of an [`ObservationWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointId(u64);

/// One window entry: the median RTT of the packets sent in one millisecond.
///
/// The fanout holds the slopes this point generated as the older end of a
/// pair, so they can be removed when the point is evicted.
/// 一个窗口条目：同一毫秒内发送的数据包的中位RTT。
#[derive(Debug)]
pub struct ObservationPoint {
    id: PointId,
    send_time_ms: u64,
    rtt_us: u32,
    fanout: Vec<SlopeHandle>,
}

impl ObservationPoint {
    pub fn send_time_ms(&self) -> u64 {
        self.send_time_ms
    }

    pub fn rtt_us(&self) -> u32 {
        self.rtt_us
    }

    /// The number of live slopes this point is the older end of.
    pub fn fanout_len(&self) -> usize {
        self.fanout.len()
    }
}

/// The time-ordered window of observation points.
///
/// 按时间排序的观测窗口。
#[derive(Debug, Default)]
pub struct ObservationWindow {
    points: VecDeque<ObservationPoint>,
    next_id: u64,
}

impl ObservationWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObservationPoint> {
        self.points.iter()
    }

    pub fn oldest(&self) -> Option<&ObservationPoint> {
        self.points.front()
    }

    /// Appends a point. Send times must be strictly increasing.
    ///
    /// 追加一个观测点，发送时间必须严格递增。
    pub fn enqueue(&mut self, send_time_ms: u64, rtt_us: u32) -> Result<PointId> {
        debug_assert!(
            self.points
                .back()
                .is_none_or(|newest| newest.send_time_ms < send_time_ms),
            "observation points must be strictly increasing in send time"
        );
        if self.points.len() >= MAX_POINTS {
            return Err(Error::AllocationFailure);
        }
        self.points
            .try_reserve(1)
            .map_err(|_| Error::AllocationFailure)?;

        let id = PointId(self.next_id);
        self.next_id += 1;
        self.points.push_back(ObservationPoint {
            id,
            send_time_ms,
            rtt_us,
            fanout: Vec::new(),
        });
        Ok(id)
    }

    /// Computes the slopes between `id` and every older point, merges them
    /// into `store` and records each one in its older point's fanout.
    ///
    /// Returns the number of slopes generated. A point without any older
    /// point yields [`Error::EmptyCollection`]. Nothing is recorded on failure.
    ///
    /// 计算 `id` 与所有更早观测点之间的斜率，合并进 `store`，并记录到较早观测点的扇出中。
    pub fn generate_slopes(&mut self, id: PointId, store: &mut SlopeStore) -> Result<usize> {
        let index = self.index_of(id)?;
        let newest = &self.points[index];
        let newest = (newest.send_time_ms, newest.rtt_us);

        let mut batch = SlopeBatch::new();
        for (owner, point) in self.points.iter_mut().take(index).enumerate() {
            if let Some(slope) = slope_between((point.send_time_ms, point.rtt_us), newest) {
                point
                    .fanout
                    .try_reserve(1)
                    .map_err(|_| Error::AllocationFailure)?;
                batch.insert(slope, owner)?;
            }
        }
        if batch.is_empty() {
            return Err(Error::EmptyCollection);
        }

        let generated = batch.len();
        for (owner, handle) in store.merge(batch)? {
            self.points[owner].fanout.push(handle);
        }
        trace!(
            send_time_ms = newest.0,
            generated,
            total = store.len(),
            "Slopes generated"
        );
        Ok(generated)
    }

    /// Evicts the oldest point together with every slope in its fanout.
    /// Returns the number of slopes removed.
    ///
    /// 淘汰最早的观测点及其扇出中的所有斜率。
    pub fn dequeue_oldest(&mut self, store: &mut SlopeStore) -> Result<usize> {
        let oldest = self.points.pop_front().ok_or(Error::EmptyCollection)?;
        let mut removed = 0;
        for handle in oldest.fanout {
            if store.remove(handle).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// `newest - oldest + 1` in milliseconds, or 0 when empty.
    pub fn duration(&self) -> u64 {
        match (self.points.front(), self.points.back()) {
            (Some(oldest), Some(newest)) => newest.send_time_ms - oldest.send_time_ms + 1,
            _ => 0,
        }
    }

    /// Drops every point. The caller clears the slope store alongside.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    fn index_of(&self, id: PointId) -> Result<usize> {
        let oldest = self.points.front().ok_or(Error::EmptyCollection)?;
        let index = id
            .0
            .checked_sub(oldest.id.0)
            .and_then(|offset| usize::try_from(offset).ok())
            .filter(|&index| index < self.points.len())
            .ok_or(Error::NullReference)?;
        debug_assert_eq!(self.points[index].id, id);
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a window with slopes from `(send_time_ms, rtt_us)` points.
    fn build(points: &[(u64, u32)]) -> (ObservationWindow, SlopeStore) {
        let mut window = ObservationWindow::new();
        let mut store = SlopeStore::new();
        for &(send_time_ms, rtt_us) in points {
            let id = window.enqueue(send_time_ms, rtt_us).unwrap();
            let _ = window.generate_slopes(id, &mut store);
        }
        (window, store)
    }

    #[test]
    fn test_duration() {
        let mut window = ObservationWindow::new();
        assert_eq!(window.duration(), 0);
        window.enqueue(10, 100).unwrap();
        assert_eq!(window.duration(), 1);
        window.enqueue(14, 100).unwrap();
        assert_eq!(window.duration(), 5);
    }

    #[test]
    fn test_first_point_generates_nothing() {
        let mut window = ObservationWindow::new();
        let mut store = SlopeStore::new();
        let id = window.enqueue(0, 100).unwrap();
        assert_eq!(window.generate_slopes(id, &mut store), Err(Error::EmptyCollection));
        assert!(store.is_empty());
    }

    #[test]
    fn test_pairwise_slopes_and_fanout() {
        let (window, store) = build(&[(0, 1000), (1, 1100), (2, 1300), (4, 1300)]);

        // n points produce n(n-1)/2 slopes.
        assert_eq!(store.len(), 6);
        let slopes: Vec<i32> = store.iter().collect();
        assert!(slopes.windows(2).all(|pair| pair[0] <= pair[1]));
        // 0->1: 100, 0->2: 150, 0->4: 75, 1->2: 200, 1->4: 66, 2->4: 0
        assert_eq!(slopes, vec![0, 66, 75, 100, 150, 200]);

        // Fanout is owned by the older end of each pair.
        let fanouts: Vec<usize> = window.iter().map(|point| point.fanout_len()).collect();
        assert_eq!(fanouts, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_eviction_removes_exactly_the_fanout() {
        let (mut window, mut store) = build(&[(0, 1000), (1, 1100), (2, 1300), (4, 1300)]);

        let before = store.len();
        let fanout = window.oldest().unwrap().fanout_len();
        assert_eq!(window.dequeue_oldest(&mut store).unwrap(), fanout);
        assert_eq!(store.len(), before - fanout);
        // Only slopes between the remaining points are left: 1->2, 1->4, 2->4.
        assert_eq!(store.iter().collect::<Vec<_>>(), vec![0, 66, 200]);
        assert_eq!(window.duration(), 4);
    }

    #[test]
    fn test_eviction_of_empty_window() {
        let mut window = ObservationWindow::new();
        let mut store = SlopeStore::new();
        assert_eq!(window.dequeue_oldest(&mut store), Err(Error::EmptyCollection));
    }

    #[test]
    fn test_evicted_point_handle_is_rejected() {
        let mut window = ObservationWindow::new();
        let mut store = SlopeStore::new();
        let first = window.enqueue(0, 100).unwrap();
        window.enqueue(1, 200).unwrap();
        window.dequeue_oldest(&mut store).unwrap();
        assert_eq!(window.generate_slopes(first, &mut store), Err(Error::NullReference));
    }

    #[test]
    fn test_draining_window_empties_store() {
        let points: Vec<(u64, u32)> = (0..20).map(|ms| (ms, 1000 + (ms as u32 * 37) % 500)).collect();
        let (mut window, mut store) = build(&points);
        assert_eq!(store.len(), 20 * 19 / 2);

        while !window.is_empty() {
            let expected = store.len() - window.oldest().unwrap().fanout_len();
            window.dequeue_oldest(&mut store).unwrap();
            assert_eq!(store.len(), expected);
            let slopes: Vec<i32> = store.iter().collect();
            assert!(slopes.windows(2).all(|pair| pair[0] <= pair[1]));
        }
        assert!(store.is_empty());
    }
}
