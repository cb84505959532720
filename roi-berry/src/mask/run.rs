//! 行程与体素索引.

use std::cmp::Ordering;
use std::iter::FusedIterator;
use std::ops::Range;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::{AffineTransform, Idx3d, LineKey};

/// 掩膜的一个行程: 固定 `(height_index, depth_index)` 的扫描线上,
/// 沿 width 方向连续的一段体素, 共享同一个强度.
///
/// 覆盖的体素为 `(x, height_index, depth_index)`, 其中
/// `x ∈ [width_start, width_start + width_length)`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaskRun {
    /// 起始 width 索引.
    pub width_start: u32,

    /// 行程长度. 掩膜中的行程总有 `width_length > 0`.
    pub width_length: u32,

    /// 所在扫描线的 height 索引.
    pub height_index: u32,

    /// 所在扫描线的 depth 索引.
    pub depth_index: u32,

    /// 行程内每个体素的强度.
    pub intensity: f32,
}

impl MaskRun {
    /// 以 width 范围 `width_range` (左闭右开)、扫描线位置和强度构建行程.
    ///
    /// 当 `width_range` 为空 (含 `end < start`) 时得到零长度行程,
    /// 它在掩膜构造时会被当作空行程丢弃.
    #[inline]
    pub fn new(width_range: Range<u32>, height_index: u32, depth_index: u32, intensity: f32) -> Self {
        Self {
            width_start: width_range.start,
            width_length: width_range.end.saturating_sub(width_range.start),
            height_index,
            depth_index,
            intensity,
        }
    }

    /// 行程是否为空 (长度为零).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width_length == 0
    }

    /// 行程覆盖的第一个 width 索引. 空行程返回 `None`.
    #[inline]
    pub fn first_width_index(&self) -> Option<u32> {
        (!self.is_empty()).then_some(self.width_start)
    }

    /// 行程覆盖的最后一个 width 索引 (闭区间). 空行程或越界时返回 `None`.
    #[inline]
    pub fn last_width_index(&self) -> Option<u32> {
        if self.is_empty() {
            return None;
        }
        u32::try_from(self.width_end() - 1).ok()
    }

    /// 行程的 width 范围, 左闭右开. 以 `u64` 表示以免右端点溢出.
    #[inline]
    pub fn width_range(&self) -> Range<u64> {
        self.width_start as u64..self.width_end()
    }

    /// 右端点 (不含).
    #[inline]
    pub(crate) fn width_end(&self) -> u64 {
        self.width_start as u64 + self.width_length as u64
    }

    /// 所在扫描线, 按 `(depth, height)` 排列.
    #[inline]
    pub(crate) fn line(&self) -> LineKey {
        (self.depth_index, self.height_index)
    }

    /// 是否与 `other` 处于同一条扫描线.
    #[inline]
    pub fn same_line(&self, other: &MaskRun) -> bool {
        self.line() == other.line()
    }

    /// 在同一条扫描线上、以同样的强度, 截取 `[start, end)` 部分.
    ///
    /// 调用者需保证 `start < end` 且范围可由 `u32` 起点和长度表示.
    #[inline]
    pub(crate) fn with_width(&self, start: u64, end: u64) -> Self {
        debug_assert!(start < end);
        Self {
            width_start: start as u32,
            width_length: (end - start) as u32,
            ..*self
        }
    }

    /// 行程的全序比较. 依次比较 `depth_index`, `height_index`, `width_start`.
    ///
    /// 强度和长度不参与比较, 因此该顺序可用于排序, 也是所有归并算法的统一规则.
    #[inline]
    pub fn compare(&self, other: &MaskRun) -> Ordering {
        (self.depth_index, self.height_index, self.width_start).cmp(&(
            other.depth_index,
            other.height_index,
            other.width_start,
        ))
    }

    /// 两个行程是否重叠 (同一扫描线且 width 范围相交).
    pub fn overlaps(&self, other: &MaskRun) -> bool {
        if !self.same_line(other) || self.is_empty() || other.is_empty() {
            return false;
        }
        (self.width_start as u64) < other.width_end() && (other.width_start as u64) < self.width_end()
    }

    /// 两个行程是否首尾相接 (同一扫描线, 一方的最后索引 + 1 等于另一方的第一个索引).
    pub fn abuts(&self, other: &MaskRun) -> bool {
        if !self.same_line(other) || self.is_empty() || other.is_empty() {
            return false;
        }
        self.width_end() == other.width_start as u64 || other.width_end() == self.width_start as u64
    }

    /// 行程包含的体素个数.
    #[inline]
    pub fn index_count(&self) -> u64 {
        self.width_length as u64
    }

    /// 按 x 升序惰性迭代行程内所有体素索引.
    #[inline]
    pub fn indexes(&self) -> IndexesInRun {
        IndexesInRun::new(self)
    }
}

/// 单个体素的坐标. 不携带强度 (强度属于掩膜).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaskIndex {
    /// width 方向索引.
    pub x: u32,

    /// height 方向索引.
    pub y: u32,

    /// depth 方向索引.
    pub z: u32,
}

impl MaskIndex {
    /// 直接创建.
    #[inline]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// 该索引是否落在 `run` 内.
    #[inline]
    pub fn in_run(&self, run: &MaskRun) -> bool {
        self.y == run.height_index && self.z == run.depth_index && run.width_range().contains(&(self.x as u64))
    }

    /// 以仿射变换 `transform` 变换该索引 (视为齐次坐标 `(x, y, z, 1)`).
    #[inline]
    pub fn apply_transform(&self, transform: &AffineTransform) -> Point3<f64> {
        transform.apply(&self.to_point())
    }

    /// 转换为实数点 `(x, y, z)`.
    #[inline]
    pub fn to_point(&self) -> Point3<f64> {
        Point3::new(self.x as f64, self.y as f64, self.z as f64)
    }

    /// 转换为 `ndarray` 体数据的下标 `(z, h, w)`.
    #[inline]
    pub const fn to_idx3d(&self) -> Idx3d {
        (self.z as usize, self.y as usize, self.x as usize)
    }
}

/// 与行程的顺序一致: 依次比较 `z`, `y`, `x`.
impl Ord for MaskIndex {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        (self.z, self.y, self.x).cmp(&(other.z, other.y, other.x))
    }
}

impl PartialOrd for MaskIndex {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<MaskIndex> for Idx3d {
    #[inline]
    fn from(value: MaskIndex) -> Self {
        value.to_idx3d()
    }
}

/// 行程内体素索引的惰性迭代器.
///
/// 迭代器可以 `clone`, 因而可以重复迭代同一行程.
#[derive(Debug, Clone)]
pub struct IndexesInRun {
    cur: u64,
    end: u64,
    y: u32,
    z: u32,
}

impl IndexesInRun {
    #[inline]
    fn new(run: &MaskRun) -> Self {
        let range = run.width_range();
        Self {
            cur: range.start,
            end: range.end,
            y: run.height_index,
            z: run.depth_index,
        }
    }
}

impl Iterator for IndexesInRun {
    type Item = MaskIndex;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur >= self.end {
            return None;
        }
        let x = self.cur as u32;
        self.cur += 1;
        Some(MaskIndex::new(x, self.y, self.z))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.end - self.cur) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for IndexesInRun {}

impl FusedIterator for IndexesInRun {}
