//! 有序链表 - 基于slab的稳定句柄
//! Sorted list backed by a slab, with stable handles
//!
//! 职责：
//! - 按比较器保持升序
//! - 通过句柄进行 O(1) 删除
//! - 以单个游标线性合并有序批次
//! - 按秩求中位数

use crate::error::{Error, Result};
use slab::Slab;
use std::cmp::Ordering;
use std::fmt;

/// The largest number of entries a list accepts before reporting exhaustion.
const MAX_ENTRIES: usize = u32::MAX as usize;

/// A stable reference to an entry of a [`SortedList`].
///
/// A handle stays valid until its entry is removed or the list is cleared.
/// 有序链表条目的稳定引用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(usize);

/// Values that have a median of two.
pub trait Midpoint: Copy {
    /// The truncated mean of `a` and `b`.
    fn midpoint(a: Self, b: Self) -> Self;
}

impl Midpoint for u32 {
    fn midpoint(a: Self, b: Self) -> Self {
        ((u64::from(a) + u64::from(b)) / 2) as u32
    }
}

impl Midpoint for i32 {
    fn midpoint(a: Self, b: Self) -> Self {
        ((i64::from(a) + i64::from(b)) / 2) as i32
    }
}

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<usize>,
    next: Option<usize>,
}

/// The comparator used by [`SortedList::new`].
pub type OrdComparator<T> = fn(&T, &T) -> Ordering;

/// An ascending list ordered by a comparator.
///
/// Equal values keep their insertion order.
/// 按比较器升序排列的链表，相等的值保持插入顺序。
pub struct SortedList<T, C = OrdComparator<T>> {
    nodes: Slab<Node<T>>,
    head: Option<usize>,
    tail: Option<usize>,
    max_entries: usize,
    cmp: C,
}

impl<T: Ord> SortedList<T, OrdComparator<T>> {
    pub fn new() -> Self {
        Self::with_comparator(T::cmp)
    }
}

impl<T: Ord> Default for SortedList<T, OrdComparator<T>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C> SortedList<T, C>
where
    C: Fn(&T, &T) -> Ordering,
{
    pub fn with_comparator(cmp: C) -> Self {
        Self {
            nodes: Slab::new(),
            head: None,
            tail: None,
            max_entries: MAX_ENTRIES,
            cmp,
        }
    }

    #[cfg(test)]
    fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the value behind `handle`, if it is still live.
    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.nodes.get(handle.0).map(|node| &node.value)
    }

    /// Iterates the values in ascending order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            nodes: &self.nodes,
            cursor: self.head,
        }
    }

    /// Inserts `value` after every entry not greater than it.
    ///
    /// 插入 `value`，位于所有不大于它的条目之后。
    pub fn insert(&mut self, value: T) -> Result<Handle> {
        let mut cursor = self.head;
        while let Some(key) = cursor {
            if (self.cmp)(&value, &self.nodes[key].value) == Ordering::Less {
                break;
            }
            cursor = self.nodes[key].next;
        }
        self.link_before(cursor, value).map(Handle)
    }

    /// Merges an ascending sequence into the list.
    ///
    /// The walk keeps one cursor into the list that only ever moves forward,
    /// so the whole merge costs `O(len + batch)`. Handles are returned in
    /// batch order. If storage runs out midway, the entries merged so far
    /// are rolled back.
    ///
    /// 将升序序列合并进链表。游标只向前移动，总代价为 `O(len + batch)`。
    pub fn merge_sorted<I>(&mut self, batch: I) -> Result<Vec<Handle>>
    where
        I: IntoIterator<Item = T>,
    {
        let batch = batch.into_iter();
        let mut handles = Vec::new();
        handles
            .try_reserve(batch.size_hint().0)
            .map_err(|_| Error::AllocationFailure)?;

        let mut cursor = self.head;
        for value in batch {
            while let Some(key) = cursor {
                if (self.cmp)(&value, &self.nodes[key].value) == Ordering::Less {
                    break;
                }
                cursor = self.nodes[key].next;
            }
            // Room for the handle first, so every linked entry is tracked.
            let linked = handles
                .try_reserve(1)
                .map_err(|_| Error::AllocationFailure)
                .and_then(|()| self.link_before(cursor, value));
            match linked {
                Ok(key) => handles.push(Handle(key)),
                Err(err) => {
                    for handle in handles {
                        let _ = self.remove(handle);
                    }
                    return Err(err);
                }
            }
        }
        Ok(handles)
    }

    /// Removes the entry behind `handle` in `O(1)`.
    ///
    /// 以 `O(1)` 删除句柄指向的条目。
    pub fn remove(&mut self, handle: Handle) -> Result<T> {
        if self.nodes.is_empty() {
            return Err(Error::EmptyCollection);
        }
        let node = self.nodes.try_remove(handle.0).ok_or(Error::NullReference)?;
        match node.prev {
            Some(prev) => self.nodes[prev].next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.nodes[next].prev = node.prev,
            None => self.tail = node.prev,
        }
        Ok(node.value)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.head = None;
        self.tail = None;
    }

    /// Links `value` in front of `before`, or at the tail when `before` is `None`.
    fn link_before(&mut self, before: Option<usize>, value: T) -> Result<usize> {
        if self.nodes.len() >= self.max_entries {
            return Err(Error::AllocationFailure);
        }
        let prev = match before {
            Some(next) => self.nodes[next].prev,
            None => self.tail,
        };
        let key = self.nodes.insert(Node {
            value,
            prev,
            next: before,
        });
        match prev {
            Some(prev) => self.nodes[prev].next = Some(key),
            None => self.head = Some(key),
        }
        match before {
            Some(next) => self.nodes[next].prev = Some(key),
            None => self.tail = Some(key),
        }
        Ok(key)
    }
}

impl<T, C> SortedList<T, C>
where
    T: Midpoint,
    C: Fn(&T, &T) -> Ordering,
{
    /// Returns the median of the entries ranked `start..=end` (1-indexed).
    ///
    /// An odd-sized range yields its middle entry, an even-sized one the
    /// truncated mean of its two middle entries.
    ///
    /// 返回秩 `start..=end`（从1开始）之间条目的中位数。
    pub fn median(&self, start: usize, end: usize) -> Result<T> {
        if self.is_empty() {
            return Err(Error::EmptyCollection);
        }
        if start < 1 || end > self.len() || start > end {
            return Err(Error::OutOfRange {
                start,
                end,
                len: self.len(),
            });
        }

        let mid = (start + end) / 2;
        let mut values = self.iter().skip(mid - 1);
        let lower = *values.next().ok_or(Error::EmptyCollection)?;
        if (start + end) % 2 == 0 {
            return Ok(lower);
        }
        let upper = *values.next().ok_or(Error::EmptyCollection)?;
        Ok(T::midpoint(lower, upper))
    }
}

impl<T: fmt::Debug, C> fmt::Debug for SortedList<T, C>
where
    C: Fn(&T, &T) -> Ordering,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Ascending iterator over a [`SortedList`].
pub struct Iter<'a, T> {
    nodes: &'a Slab<Node<T>>,
    cursor: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.nodes.get(self.cursor?)?;
        self.cursor = node.next;
        Some(&node.value)
    }
}
