//! 基于行程的几何查询: 包含判定、外接范围、质心、裁剪, 以及凸包和形状生成.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::mask::RunBuilder;
use crate::{MaskError, MaskIndex, MaskResult, MaskRun, RoiMask};

mod hull;
mod shape;

pub use hull::MaskHull;

/// 掩膜的外接范围 (轴对齐包围盒). 上下界均为闭区间.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaskExtent {
    /// 各轴最小索引.
    pub min: MaskIndex,

    /// 各轴最大索引.
    pub max: MaskIndex,
}

impl MaskExtent {
    /// width 方向的体素个数.
    #[inline]
    pub fn width(&self) -> u64 {
        (self.max.x - self.min.x) as u64 + 1
    }

    /// height 方向的体素个数.
    #[inline]
    pub fn height(&self) -> u64 {
        (self.max.y - self.min.y) as u64 + 1
    }

    /// depth 方向的体素个数.
    #[inline]
    pub fn depth(&self) -> u64 {
        (self.max.z - self.min.z) as u64 + 1
    }

    /// 索引是否落在范围内.
    #[inline]
    pub fn contains(&self, index: MaskIndex) -> bool {
        (self.min.x..=self.max.x).contains(&index.x)
            && (self.min.y..=self.max.y).contains(&index.y)
            && (self.min.z..=self.max.z).contains(&index.z)
    }

    /// 包围盒的 8 个角点.
    pub fn corners(&self) -> [MaskIndex; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            MaskIndex::new(lo.x, lo.y, lo.z),
            MaskIndex::new(hi.x, lo.y, lo.z),
            MaskIndex::new(lo.x, hi.y, lo.z),
            MaskIndex::new(hi.x, hi.y, lo.z),
            MaskIndex::new(lo.x, lo.y, hi.z),
            MaskIndex::new(hi.x, lo.y, hi.z),
            MaskIndex::new(lo.x, hi.y, hi.z),
            MaskIndex::new(hi.x, hi.y, hi.z),
        ]
    }
}

impl RoiMask {
    /// 查找覆盖 `index` 的行程. 二分查找, `O(log n)`.
    pub(crate) fn run_at(&self, index: MaskIndex) -> Option<&MaskRun> {
        let runs = self.runs();
        let key = (index.z, index.y, index.x);
        let pos = runs.partition_point(|r| (r.depth_index, r.height_index, r.width_start) <= key);
        let run = runs.get(pos.checked_sub(1)?)?;
        index.in_run(run).then_some(run)
    }

    /// 掩膜是否包含 `index`.
    #[inline]
    pub fn contains_index(&self, index: MaskIndex) -> bool {
        self.run_at(index).is_some()
    }

    /// `index` 处的强度. 不在掩膜内时返回 `None`.
    #[inline]
    pub fn intensity_at(&self, index: MaskIndex) -> Option<f32> {
        self.run_at(index).map(|r| r.intensity)
    }

    /// 外接范围.
    ///
    /// # 错误
    ///
    /// 空掩膜返回 [`MaskError::UndefinedResult`].
    pub fn extent(&self) -> MaskResult<MaskExtent> {
        let runs = self.runs();
        let (first, last) = match (runs.first(), runs.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => return Err(MaskError::UndefinedResult("extent of an empty mask")),
        };

        let (mut min_x, mut max_x) = (u32::MAX, 0);
        let (mut min_y, mut max_y) = (u32::MAX, 0);
        for run in runs {
            min_x = min_x.min(run.width_start);
            // 规范形式下的行程总是非空的.
            max_x = max_x.max(run.last_width_index().unwrap_or(run.width_start));
            min_y = min_y.min(run.height_index);
            max_y = max_y.max(run.height_index);
        }
        Ok(MaskExtent {
            min: MaskIndex::new(min_x, min_y, first.depth_index),
            max: MaskIndex::new(max_x, max_y, last.depth_index),
        })
    }

    /// 以强度为权重的质心. width 方向按等差数列逐行程求和, 不展开体素.
    ///
    /// # 错误
    ///
    /// 空掩膜, 或强度总和为零时返回 [`MaskError::UndefinedResult`].
    pub fn center_of_mass(&self) -> MaskResult<Point3<f64>> {
        let (mut sx, mut sy, mut sz, mut total) = (0.0_f64, 0.0_f64, 0.0_f64, 0.0_f64);
        for run in self.runs() {
            let n = run.width_length as f64;
            let w = run.intensity as f64 * n;
            let start = run.width_start as f64;
            sx += run.intensity as f64 * (n * start + n * (n - 1.0) / 2.0);
            sy += w * run.height_index as f64;
            sz += w * run.depth_index as f64;
            total += w;
        }
        if total == 0.0 {
            return Err(MaskError::UndefinedResult(
                "center of mass with zero total intensity",
            ));
        }
        Ok(Point3::new(sx / total, sy / total, sz / total))
    }

    /// 裁剪到 `[0, width) × [0, height) × [0, depth)` 内.
    pub fn cropped(&self, width: u32, height: u32, depth: u32) -> RoiMask {
        let mut builder = RunBuilder::with_capacity(self.run_count());
        for run in self.runs() {
            if run.depth_index >= depth {
                break;
            }
            if run.height_index >= height || run.width_start >= width {
                continue;
            }
            let end = run.width_end().min(width as u64);
            builder.push_run(run.with_width(run.width_start as u64, end));
        }
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::float_eq;

    #[test]
    fn test_cube_extent() {
        let m = RoiMask::with_cube(3);
        assert_eq!(m.index_count(), 27);
        assert!(m.runs().iter().all(|r| r.intensity == 1.0));
        let e = m.extent().unwrap();
        assert_eq!(e.min, MaskIndex::new(0, 0, 0));
        assert_eq!(e.max, MaskIndex::new(2, 2, 2));
        assert_eq!((e.width(), e.height(), e.depth()), (3, 3, 3));
        assert!(e.corners().iter().all(|c| m.contains_index(*c)));
    }

    #[test]
    fn test_extent_of_scattered_runs() {
        let m = RoiMask::from_runs(vec![
            MaskRun::new(5..7, 9, 2, 1.0),
            MaskRun::new(1..3, 4, 2, 1.0),
            MaskRun::new(10..11, 0, 6, 1.0),
        ])
        .unwrap();
        let e = m.extent().unwrap();
        assert_eq!(e.min, MaskIndex::new(1, 0, 2));
        assert_eq!(e.max, MaskIndex::new(10, 9, 6));
        assert!(e.contains(MaskIndex::new(4, 4, 4)));
        assert!(!e.contains(MaskIndex::new(11, 4, 4)));
    }

    #[test]
    fn test_empty_queries() {
        let m = RoiMask::new();
        assert!(matches!(m.extent(), Err(MaskError::UndefinedResult(_))));
        assert!(matches!(
            m.center_of_mass(),
            Err(MaskError::UndefinedResult(_))
        ));
        assert!(!m.contains_index(MaskIndex::new(0, 0, 0)));
    }

    #[test]
    fn test_containment_consistency() {
        let m = &RoiMask::with_sphere(7) - &RoiMask::with_box(3, 7, 2);
        let e = m.extent().unwrap();
        let indexes = m.indexes();
        for z in 0..=e.max.z + 1 {
            for y in 0..=e.max.y + 1 {
                for x in 0..=e.max.x + 1 {
                    let i = MaskIndex::new(x, y, z);
                    assert_eq!(m.contains_index(i), indexes.binary_search(&i).is_ok());
                }
            }
        }
    }

    #[test]
    fn test_intensity_at() {
        let m = RoiMask::from_runs(vec![
            MaskRun::new(0..2, 0, 0, 1.5),
            MaskRun::new(2..4, 0, 0, -2.0),
        ])
        .unwrap();
        assert_eq!(m.intensity_at(MaskIndex::new(1, 0, 0)), Some(1.5));
        assert_eq!(m.intensity_at(MaskIndex::new(2, 0, 0)), Some(-2.0));
        assert_eq!(m.intensity_at(MaskIndex::new(4, 0, 0)), None);
        assert_eq!(m.intensity_at(MaskIndex::new(0, 1, 0)), None);
    }

    #[test]
    fn test_center_of_mass() {
        let c = RoiMask::with_cube(2).center_of_mass().unwrap();
        assert!(float_eq(c.x, 0.5) && float_eq(c.y, 0.5) && float_eq(c.z, 0.5));

        let m = RoiMask::from_runs(vec![
            MaskRun::new(0..1, 0, 0, 3.0),
            MaskRun::new(4..5, 0, 0, 1.0),
        ])
        .unwrap();
        let c = m.center_of_mass().unwrap();
        assert!(float_eq(c.x, 1.0));

        let zero = RoiMask::from_runs(vec![
            MaskRun::new(0..1, 0, 0, 1.0),
            MaskRun::new(1..2, 0, 0, -1.0),
        ])
        .unwrap();
        assert!(matches!(
            zero.center_of_mass(),
            Err(MaskError::UndefinedResult(_))
        ));
    }

    #[test]
    fn test_crop() {
        let m = RoiMask::with_cube(5);
        let c = m.cropped(2, 3, 4);
        assert_eq!(c.index_count(), 2 * 3 * 4);
        assert_eq!(c.cropped(2, 3, 4), c);
        assert_eq!(m.cropped(10, 10, 10), m);
        assert!(m.cropped(0, 5, 5).is_empty());
        let s = RoiMask::with_sphere(9);
        assert_eq!(s.cropped(6, 5, 7).cropped(6, 5, 7), s.cropped(6, 5, 7));
    }
}
