//! 掩膜与稠密体数据的互转, 以及基于体数据的谓词过滤.

use std::ops::{Index, IndexMut};

use log::debug;
use ndarray::{s, Array3, ArrayViewMut2, Axis};

use crate::mask::line::depth_ranges;
use crate::mask::RunBuilder;
use crate::{AffineTransform, Idx3d, MaskIndex, MaskRun, RoiMask};

mod nifti;

pub use self::nifti::VolumeError;

/// 只读的稠密体数据.
///
/// 实现者提供尺寸、逐体素强度, 以及把世界坐标映射到其索引坐标的仿射变换.
pub trait VolumeData {
    /// 体数据尺寸, 按 `(width, height, depth)` 排列.
    fn dim(&self) -> (usize, usize, usize);

    /// `index` 处的强度. 越界时返回 `None`.
    fn intensity_at(&self, index: MaskIndex) -> Option<f32>;

    /// 世界坐标到索引坐标的仿射变换.
    fn volume_transform(&self) -> &AffineTransform;

    /// 索引是否在体数据范围内.
    #[inline]
    fn check(&self, index: MaskIndex) -> bool {
        let (w, h, d) = self.dim();
        (index.x as usize) < w && (index.y as usize) < h && (index.z as usize) < d
    }
}

/// 可写的稠密体数据.
pub trait VolumeDataMut: VolumeData {
    /// 设置 `index` 处的强度. 越界时不做任何事并返回 `false`.
    fn set_intensity_at(&mut self, index: MaskIndex, intensity: f32) -> bool;
}

/// `f32` 稠密体数据. 数据以 `(z, h, w)` 即 [`Idx3d`] 的顺序存放.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct FloatVolume {
    data: Array3<f32>,
    transform: AffineTransform,
}

impl FloatVolume {
    /// 由 `(z, h, w)` 排列的数据和仿射变换构建.
    #[inline]
    pub fn new(data: Array3<f32>, transform: AffineTransform) -> Self {
        Self { data, transform }
    }

    /// 全零体数据, 尺寸按 `(width, height, depth)` 给出.
    #[inline]
    pub fn zeros(width: usize, height: usize, depth: usize, transform: AffineTransform) -> Self {
        Self::new(Array3::zeros((depth, height, width)), transform)
    }

    /// 获取数据部分.
    #[inline]
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// 获取可变数据部分.
    #[inline]
    pub fn data_mut(&mut self) -> &mut Array3<f32> {
        &mut self.data
    }

    /// 拆分为数据和仿射变换.
    #[inline]
    pub fn into_raw(self) -> (Array3<f32>, AffineTransform) {
        (self.data, self.transform)
    }
}

impl Index<Idx3d> for FloatVolume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for FloatVolume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl VolumeData for FloatVolume {
    #[inline]
    fn dim(&self) -> (usize, usize, usize) {
        let (d, h, w) = self.data.dim();
        (w, h, d)
    }

    #[inline]
    fn intensity_at(&self, index: MaskIndex) -> Option<f32> {
        self.data.get(index.to_idx3d()).copied()
    }

    #[inline]
    fn volume_transform(&self) -> &AffineTransform {
        &self.transform
    }
}

impl VolumeDataMut for FloatVolume {
    #[inline]
    fn set_intensity_at(&mut self, index: MaskIndex, intensity: f32) -> bool {
        match self.data.get_mut(index.to_idx3d()) {
            Some(v) => {
                *v = intensity;
                true
            }
            None => false,
        }
    }
}

/// 过滤谓词看到的单个体素.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelSample {
    /// 体素索引.
    pub index: MaskIndex,

    /// 掩膜在该体素的强度.
    pub mask_intensity: f32,

    /// 体数据在该体素的强度.
    pub data_intensity: f32,
}

/// 将同一 depth 切片上的行程写入切片. 超出切片的部分被裁掉.
fn fill_slice(mut slice: ArrayViewMut2<f32>, runs: &[MaskRun]) {
    let (h, w) = slice.dim();
    for run in runs {
        let y = run.height_index as usize;
        if y >= h {
            break;
        }
        let start = run.width_start as usize;
        if start >= w {
            continue;
        }
        let end = (run.width_end() as usize).min(w);
        slice.slice_mut(s![y, start..end]).fill(run.intensity);
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};

        /// 借助 `rayon`, 并行地将各 depth 切片的行程写入体数据.
        fn scatter(data: &mut Array3<f32>, runs: &[MaskRun]) {
            let ranges = depth_ranges(runs);
            data.axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .for_each(|(z, slice)| {
                    if let Ok(i) = ranges.binary_search_by(|r| (r.0 as usize).cmp(&z)) {
                        let (_, start, end) = ranges[i];
                        fill_slice(slice, &runs[start..end]);
                    }
                });
        }
    } else {
        fn scatter(data: &mut Array3<f32>, runs: &[MaskRun]) {
            let depth = data.dim().0;
            for (z, start, end) in depth_ranges(runs) {
                if z as usize >= depth {
                    break;
                }
                fill_slice(data.index_axis_mut(Axis(0), z as usize), &runs[start..end]);
            }
        }
    }
}

impl RoiMask {
    /// 展开为稠密体数据. 尺寸为各轴最大索引 + 1, 空掩膜得到零尺寸体数据.
    /// 掩膜外的体素为 0, `transform` 原样保留.
    pub fn to_volume(&self, transform: AffineTransform) -> FloatVolume {
        match self.extent() {
            Ok(e) => self.to_volume_with_dim(
                e.max.x as usize + 1,
                e.max.y as usize + 1,
                e.max.z as usize + 1,
                transform,
            ),
            Err(_) => FloatVolume::zeros(0, 0, 0, transform),
        }
    }

    /// 展开为指定尺寸的稠密体数据. 超出范围的行程被裁掉.
    pub fn to_volume_with_dim(
        &self,
        width: usize,
        height: usize,
        depth: usize,
        transform: AffineTransform,
    ) -> FloatVolume {
        debug!(
            "to_volume: {} runs into {}x{}x{}",
            self.run_count(),
            width,
            height,
            depth
        );
        let mut volume = FloatVolume::zeros(width, height, depth, transform);
        scatter(&mut volume.data, self.runs());
        volume
    }

    /// 将掩膜的强度写入已有的体数据, 返回实际写入的体素个数. 范围外的体素被跳过.
    pub fn paint_into<V: VolumeDataMut>(&self, volume: &mut V) -> u64 {
        let (w, h, d) = volume.dim();
        let mut count = 0;
        for run in self.runs() {
            if run.depth_index as usize >= d {
                break;
            }
            if run.height_index as usize >= h {
                continue;
            }
            for index in run.indexes().take_while(|i| (i.x as usize) < w) {
                if volume.set_intensity_at(index, run.intensity) {
                    count += 1;
                }
            }
        }
        count
    }

    /// 由体数据构建掩膜. 沿 width 方向, 强度相同且非零的连续体素构成一个行程;
    /// 强度为 NaN 的体素被视为不在掩膜内.
    ///
    /// 同时返回体数据自身的仿射变换.
    pub fn from_volume<V: VolumeData>(volume: &V) -> (RoiMask, AffineTransform) {
        let (w, h, d) = volume.dim();
        let clamp = |n: usize| u32::try_from(n).unwrap_or(u32::MAX);
        let mut builder = RunBuilder::new();
        for z in 0..clamp(d) {
            for y in 0..clamp(h) {
                for x in 0..clamp(w) {
                    let index = MaskIndex::new(x, y, z);
                    match volume.intensity_at(index) {
                        Some(v) if v != 0.0 && !v.is_nan() => builder.push_voxel(index, v),
                        _ => {}
                    }
                }
            }
        }
        (builder.finish(), *volume.volume_transform())
    }

    /// 以 `predicate` 过滤掩膜中的体素. `predicate` 同时看到掩膜强度和体数据强度.
    ///
    /// 体数据范围外的体素不会交给 `predicate`, 直接被丢弃. 保留的体素沿用掩膜强度.
    pub fn filtered<V, F>(&self, volume: &V, mut predicate: F) -> RoiMask
    where
        V: VolumeData,
        F: FnMut(&VoxelSample) -> bool,
    {
        let (w, h, d) = volume.dim();
        let mut builder = RunBuilder::new();
        for run in self.runs() {
            if run.depth_index as usize >= d {
                break;
            }
            if run.height_index as usize >= h {
                continue;
            }
            for index in run.indexes().take_while(|i| (i.x as usize) < w) {
                let Some(data_intensity) = volume.intensity_at(index) else {
                    continue;
                };
                let sample = VoxelSample {
                    index,
                    mask_intensity: run.intensity,
                    data_intensity,
                };
                if predicate(&sample) {
                    builder.push_voxel(index, run.intensity);
                }
            }
        }
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::init_logger;

    fn gradient_volume(w: usize, h: usize, d: usize) -> FloatVolume {
        let data = Array3::from_shape_fn((d, h, w), |(z, y, x)| (x + 10 * y + 100 * z) as f32);
        FloatVolume::new(data, AffineTransform::identity())
    }

    #[test]
    fn test_float_volume_access() {
        let mut v = FloatVolume::zeros(4, 3, 2, AffineTransform::translation(1.0, 0.0, 0.0));
        assert_eq!(v.dim(), (4, 3, 2));
        assert_eq!(v.data().dim(), (2, 3, 4));
        assert!(v.set_intensity_at(MaskIndex::new(3, 2, 1), 5.0));
        assert!(!v.set_intensity_at(MaskIndex::new(4, 0, 0), 5.0));
        assert_eq!(v[(1, 2, 3)], 5.0);
        assert_eq!(v.intensity_at(MaskIndex::new(3, 2, 1)), Some(5.0));
        assert_eq!(v.intensity_at(MaskIndex::new(0, 3, 0)), None);
        assert!(v.check(MaskIndex::new(0, 0, 1)));
        assert!(!v.check(MaskIndex::new(0, 0, 2)));
        v[(0, 0, 0)] = 2.0;
        v.data_mut()[(0, 0, 1)] = 3.0;
        let (data, t) = v.into_raw();
        assert_eq!(data[(0, 0, 1)], 3.0);
        assert_eq!(t, AffineTransform::translation(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_volume_round_trip() {
        init_logger();
        let m = &RoiMask::with_sphere(6)
            | &RoiMask::from_runs(vec![MaskRun::new(1..3, 2, 7, 4.0)]).unwrap();
        let t = AffineTransform::scaling(0.5, 0.5, 2.0);
        let v = m.to_volume(t);
        assert_eq!(v.dim(), (6, 6, 8));
        assert_eq!(v[(7, 2, 1)], 4.0);
        assert_eq!(v[(7, 0, 0)], 0.0);
        let (back, t2) = RoiMask::from_volume(&v);
        assert_eq!(back, m);
        assert_eq!(t2, t);
    }

    #[test]
    fn test_empty_to_volume() {
        let v = RoiMask::new().to_volume(AffineTransform::identity());
        assert_eq!(v.dim(), (0, 0, 0));
        assert!(RoiMask::from_volume(&v).0.is_empty());
    }

    #[test]
    fn test_to_volume_with_dim_crops() {
        let m = RoiMask::with_cube(4);
        let v = m.to_volume_with_dim(2, 3, 5, AffineTransform::identity());
        assert_eq!(v.data().sum(), 2.0 * 3.0 * 4.0);
        let (back, _) = RoiMask::from_volume(&v);
        assert_eq!(back, m.cropped(2, 3, 5));
    }

    #[test]
    fn test_from_volume_splits_intensity() {
        let mut v = FloatVolume::zeros(5, 1, 1, AffineTransform::identity());
        for (x, value) in [1.0, 1.0, 2.0, 0.0, f32::NAN].into_iter().enumerate() {
            v[(0, 0, x)] = value;
        }
        let (m, _) = RoiMask::from_volume(&v);
        assert_eq!(
            m.runs(),
            &[MaskRun::new(0..2, 0, 0, 1.0), MaskRun::new(2..3, 0, 0, 2.0)]
        );
    }

    #[test]
    fn test_paint_into() {
        let m = RoiMask::with_cube(3);
        let mut v = FloatVolume::zeros(2, 2, 2, AffineTransform::identity());
        assert_eq!(m.paint_into(&mut v), 8);
        assert_eq!(v.data().sum(), 8.0);
    }

    #[test]
    fn test_filter() {
        let m = RoiMask::with_cube(4);
        let v = gradient_volume(4, 4, 4);
        let f = m.filtered(&v, |s| s.data_intensity >= 100.0 && s.index.x < 2);
        assert_eq!(f, RoiMask::with_box(2, 4, 3).translated(0, 0, 1).unwrap());

        let all = m.filtered(&v, |s| s.mask_intensity == 1.0);
        assert_eq!(all, m);
        assert!(m.filtered(&v, |_| false).is_empty());
    }

    #[test]
    fn test_filter_drops_outside() {
        let m = RoiMask::with_cube(4);
        let v = gradient_volume(2, 4, 3);
        let mut seen = 0;
        let f = m.filtered(&v, |_| {
            seen += 1;
            true
        });
        assert_eq!(seen, 2 * 4 * 3);
        assert_eq!(f, m.cropped(2, 4, 3));
    }

    #[test]
    fn test_volume_transform_with_resample() {
        // 体数据变换约定: 世界坐标 -> 索引坐标.
        let m = RoiMask::with_cube(2);
        let fine = FloatVolume::zeros(1, 1, 1, AffineTransform::scaling(2.0, 2.0, 2.0));
        let coarse = FloatVolume::zeros(1, 1, 1, AffineTransform::identity());
        let r = m
            .resample(
                coarse.volume_transform(),
                fine.volume_transform(),
                &crate::ResampleSpec::nearest(),
            )
            .unwrap();
        assert_eq!(r, RoiMask::with_cube(3));
    }
}
