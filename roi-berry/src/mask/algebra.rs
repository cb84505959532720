//! 按扫描线归并的集合运算.
//!
//! 两个掩膜的扫描线按 `(depth, height)` 归并 (`merge_join_by`), 只有双方都有行程的扫描线
//! 才需要逐行程地计算. 重叠部分的强度一律以第一个操作数为准.

use std::ops::{BitAnd, BitOr, Sub};

use itertools::{EitherOrBoth, Itertools};

use super::line::Lines;
use super::{MaskRun, RoiMask, RunBuilder};

/// 一对扫描线. 至少一方非空.
type LinePair<'a> = EitherOrBoth<&'a [MaskRun], &'a [MaskRun]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetOp {
    Union,
    Intersection,
    Difference,
}

/// `a - b`, 结果追加到 `out`. 两侧均为同一扫描线上的有序、互不重叠行程.
fn subtract_line(a: &[MaskRun], b: &[MaskRun], out: &mut Vec<MaskRun>) {
    let mut j = 0;
    for run in a {
        let (start, end) = (run.width_start as u64, run.width_end());
        while j < b.len() && b[j].width_end() <= start {
            j += 1;
        }

        let mut pos = start;
        let mut k = j;
        while k < b.len() && (b[k].width_start as u64) < end && pos < end {
            let cut = b[k].width_start as u64;
            if cut > pos {
                out.push(run.with_width(pos, cut));
            }
            pos = pos.max(b[k].width_end());
            k += 1;
        }
        if pos < end {
            out.push(run.with_width(pos, end));
        }
    }
}

/// `a ∩ b`, 强度取自 `a`.
fn intersect_line(a: &[MaskRun], b: &[MaskRun], out: &mut Vec<MaskRun>) {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let (ra, rb) = (&a[i], &b[j]);
        let lo = ra.width_start.max(rb.width_start) as u64;
        let hi = ra.width_end().min(rb.width_end());
        if lo < hi {
            out.push(ra.with_width(lo, hi));
        }
        if ra.width_end() <= rb.width_end() {
            i += 1;
        } else {
            j += 1;
        }
    }
}

/// `a ∪ b`: `a` 的全部行程, 加上 `b` 中 `a` 未覆盖的部分.
fn union_line(a: &[MaskRun], b: &[MaskRun], out: &mut Vec<MaskRun>) {
    let mut extra = Vec::with_capacity(b.len());
    subtract_line(b, a, &mut extra);
    out.extend(
        a.iter()
            .copied()
            .merge_by(extra, |x, y| x.width_start <= y.width_start),
    );
}

fn line_intersects(a: &[MaskRun], b: &[MaskRun]) -> bool {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let (ra, rb) = (&a[i], &b[j]);
        if ra.overlaps(rb) {
            return true;
        }
        if ra.width_end() <= rb.width_end() {
            i += 1;
        } else {
            j += 1;
        }
    }
    false
}

/// 对一对扫描线施加运算, 结果按顺序追加到 `out`.
fn apply_line(op: SetOp, pair: &LinePair, out: &mut Vec<MaskRun>) {
    match (op, pair) {
        (SetOp::Union, EitherOrBoth::Left(a) | EitherOrBoth::Right(a)) => out.extend_from_slice(a),
        (SetOp::Union, EitherOrBoth::Both(a, b)) => union_line(a, b, out),
        (SetOp::Intersection, EitherOrBoth::Both(a, b)) => intersect_line(a, b, out),
        (SetOp::Difference, EitherOrBoth::Left(a)) => out.extend_from_slice(a),
        (SetOp::Difference, EitherOrBoth::Both(a, b)) => subtract_line(a, b, out),
        _ => {}
    }
}

fn run_pairs_serial(op: SetOp, pairs: &[LinePair]) -> Vec<MaskRun> {
    let mut out = Vec::new();
    for pair in pairs {
        apply_line(op, pair, &mut out);
    }
    out
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
        use crate::consts::PARALLEL_LINE_THRESHOLD;

        /// 扫描线对足够多时借助 `rayon` 并行计算, 结果仍按扫描线顺序拼接.
        fn run_pairs(op: SetOp, pairs: &[LinePair]) -> Vec<MaskRun> {
            if pairs.len() <= PARALLEL_LINE_THRESHOLD {
                return run_pairs_serial(op, pairs);
            }
            log::debug!("{:?} over {} line pairs in parallel", op, pairs.len());
            let chunks: Vec<Vec<MaskRun>> = pairs
                .par_iter()
                .map(|pair| {
                    let mut out = Vec::new();
                    apply_line(op, pair, &mut out);
                    out
                })
                .collect();
            chunks.concat()
        }
    } else {
        #[inline]
        fn run_pairs(op: SetOp, pairs: &[LinePair]) -> Vec<MaskRun> {
            run_pairs_serial(op, pairs)
        }
    }
}

/// 按扫描线归并两个掩膜的行程.
fn line_pairs<'a>(a: &'a RoiMask, b: &'a RoiMask) -> impl Iterator<Item = LinePair<'a>> {
    Lines::new(a.runs())
        .merge_join_by(Lines::new(b.runs()), |(ka, _), (kb, _)| ka.cmp(kb))
        .map(|pair| pair.map_any(|(_, a)| a, |(_, b)| b))
}

impl RoiMask {
    fn combine(&self, other: &RoiMask, op: SetOp) -> RoiMask {
        let pairs: Vec<LinePair> = line_pairs(self, other).collect();
        let runs = run_pairs(op, &pairs);

        // 相邻片段可能首尾相接且强度相同 (例如与多个相接的行程求交), 需要再合并一次.
        let mut builder = RunBuilder::with_capacity(runs.len());
        builder.extend_runs(&runs);
        builder.finish()
    }

    /// 并集. 重叠部分保留 `self` 的强度, `other` 只贡献 `self` 未覆盖的体素.
    pub fn union(&self, other: &RoiMask) -> RoiMask {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        self.combine(other, SetOp::Union)
    }

    /// 交集, 强度取自 `self`.
    pub fn intersection(&self, other: &RoiMask) -> RoiMask {
        if self.is_empty() || other.is_empty() {
            return RoiMask::new();
        }
        self.combine(other, SetOp::Intersection)
    }

    /// 差集 `self - other`, 保留 `self` 的强度.
    pub fn subtract(&self, other: &RoiMask) -> RoiMask {
        if self.is_empty() || other.is_empty() {
            return self.clone();
        }
        self.combine(other, SetOp::Difference)
    }

    /// 两个掩膜是否至少有一个共同体素. 找到第一个重叠即返回, 不构建交集.
    pub fn intersects(&self, other: &RoiMask) -> bool {
        line_pairs(self, other).any(|pair| match pair {
            EitherOrBoth::Both(a, b) => line_intersects(a, b),
            _ => false,
        })
    }
}

impl BitOr for &RoiMask {
    type Output = RoiMask;

    #[inline]
    fn bitor(self, rhs: Self) -> RoiMask {
        self.union(rhs)
    }
}

impl BitAnd for &RoiMask {
    type Output = RoiMask;

    #[inline]
    fn bitand(self, rhs: Self) -> RoiMask {
        self.intersection(rhs)
    }
}

impl Sub for &RoiMask {
    type Output = RoiMask;

    #[inline]
    fn sub(self, rhs: Self) -> RoiMask {
        self.subtract(rhs)
    }
}
