use log::debug;
use nalgebra::Point3;
use ordered_float::NotNan;

use crate::consts::SNAP_EPSILON;
use crate::mask::RunBuilder;
use crate::{AffineTransform, MaskError, MaskIndex, MaskResult, RoiMask};

/// 重采样时的插值方式.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum InterpolationMode {
    /// 最近邻. 目标体素取离其源坐标最近的源体素的强度;
    /// 该源体素在掩膜内时目标体素即在结果内, 与强度无关.
    #[default]
    Nearest,

    /// 三线性插值. 源坐标周围 8 个体素中不在掩膜内的按强度 0 计.
    Linear,
}

/// 重采样参数.
///
/// 该参数是只读的. 若要修改, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ResampleSpec {
    interpolation: InterpolationMode,
    inclusion_threshold: f32,
}

impl Default for ResampleSpec {
    #[inline]
    fn default() -> Self {
        Self::nearest()
    }
}

impl ResampleSpec {
    /// 构建重采样参数.
    ///
    /// 线性插值时, 插值结果的绝对值严格大于 `inclusion_threshold` 的体素才会进入结果.
    /// 最近邻插值不使用该阈值. `inclusion_threshold` 必须是非负的有限值, 否则返回 `None`.
    pub fn new(interpolation: InterpolationMode, inclusion_threshold: f32) -> Option<ResampleSpec> {
        if inclusion_threshold.is_finite() && inclusion_threshold >= 0.0 {
            Some(Self {
                interpolation,
                inclusion_threshold,
            })
        } else {
            None
        }
    }

    /// 最近邻插值.
    #[inline]
    pub const fn nearest() -> ResampleSpec {
        Self {
            interpolation: InterpolationMode::Nearest,
            inclusion_threshold: 0.0,
        }
    }

    /// 三线性插值, 阈值为 0.
    #[inline]
    pub const fn linear() -> ResampleSpec {
        Self {
            interpolation: InterpolationMode::Linear,
            inclusion_threshold: 0.0,
        }
    }

    /// 插值方式.
    #[inline]
    pub fn interpolation(&self) -> InterpolationMode {
        self.interpolation
    }

    /// 纳入阈值.
    #[inline]
    pub fn inclusion_threshold(&self) -> f32 {
        self.inclusion_threshold
    }
}

/// 将与整数足够接近的坐标吸附到该整数上.
#[inline]
fn snap(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < SNAP_EPSILON {
        r
    } else {
        v
    }
}

/// 非负且可由 `u32` 表示的整数坐标.
#[inline]
fn to_index(v: f64) -> Option<u32> {
    (0.0..=u32::MAX as f64).contains(&v).then_some(v as u32)
}

impl RoiMask {
    fn sample_nearest(&self, p: &Point3<f64>) -> Option<f32> {
        let index = MaskIndex::new(
            to_index(p.x.round())?,
            to_index(p.y.round())?,
            to_index(p.z.round())?,
        );
        self.intensity_at(index)
    }

    fn sample_linear(&self, p: &Point3<f64>) -> f32 {
        let base = [p.x.floor(), p.y.floor(), p.z.floor()];
        let frac = [p.x - base[0], p.y - base[1], p.z - base[2]];
        let mut value = 0.0_f64;
        for corner in 0..8_u8 {
            let mut weight = 1.0;
            let mut coord = [0_u32; 3];
            let mut valid = true;
            for k in 0..3 {
                let upper = corner >> k & 1 == 1;
                weight *= if upper { frac[k] } else { 1.0 - frac[k] };
                match to_index(base[k] + upper as u8 as f64) {
                    Some(c) => coord[k] = c,
                    None => valid = false,
                }
            }
            if !valid || weight == 0.0 {
                continue;
            }
            let index = MaskIndex::new(coord[0], coord[1], coord[2]);
            if let Some(v) = self.intensity_at(index) {
                value += weight * v as f64;
            }
        }
        value as f32
    }

    /// 将掩膜从 `from` 所描述的体数据重采样到 `to` 所描述的体数据.
    ///
    /// 两个变换均把世界坐标映射到各自的索引坐标. 源索引到目标索引的映射为 `to ∘ from⁻¹`.
    /// 对目标包围盒 (源外接范围的角点经映射后的包围盒, 并截断到非负坐标) 内的每个体素,
    /// 用 `from ∘ to⁻¹` 求出源坐标后按 `spec` 插值. 映射前角点向外扩展半个体素 (最近邻)
    /// 或一个体素 (线性插值), 即所有可能取到掩膜内源体素的目标体素都被访问.
    ///
    /// # 错误
    ///
    /// 任一变换不可逆, 或映射后的坐标为 NaN 时返回 [`MaskError::DegenerateTransform`].
    pub fn resample(
        &self,
        from: &AffineTransform,
        to: &AffineTransform,
        spec: &ResampleSpec,
    ) -> MaskResult<RoiMask> {
        let source_to_target = from.try_inverse()?.then(to);
        let target_to_source = to.try_inverse()?.then(from);
        if self.is_empty() {
            return Ok(RoiMask::new());
        }

        let extent = self.extent()?;
        let widen = match spec.interpolation {
            InterpolationMode::Nearest => 0.5,
            InterpolationMode::Linear => 1.0,
        };
        let (lo, hi) = (extent.min.to_point(), extent.max.to_point());
        let corners = (0..8)
            .map(|i| {
                let pick = |k: usize, a: f64, b: f64| {
                    if i >> k & 1 == 1 {
                        b + widen
                    } else {
                        a - widen
                    }
                };
                let c = Point3::new(pick(0, lo.x, hi.x), pick(1, lo.y, hi.y), pick(2, lo.z, hi.z));
                let t = source_to_target.apply(&c);
                Ok([
                    NotNan::new(t.x).map_err(|_| MaskError::DegenerateTransform)?,
                    NotNan::new(t.y).map_err(|_| MaskError::DegenerateTransform)?,
                    NotNan::new(t.z).map_err(|_| MaskError::DegenerateTransform)?,
                ])
            })
            .collect::<MaskResult<Vec<[NotNan<f64>; 3]>>>()?;

        let mut bounds = [(0_u32, 0_u32); 3];
        for (k, bound) in bounds.iter_mut().enumerate() {
            // `corners` 恰有 8 个元素.
            let min = corners.iter().map(|c| c[k]).min().map_or(0.0, |v| v.into_inner());
            let max = corners.iter().map(|c| c[k]).max().map_or(0.0, |v| v.into_inner());
            let max = snap(max).ceil();
            if max < 0.0 {
                return Ok(RoiMask::new());
            }
            let min = snap(min).floor().max(0.0);
            *bound = (min as u32, max.min(u32::MAX as f64) as u32);
        }
        debug!("resample: target box {:?}, {:?}", bounds, spec);

        let [(x0, x1), (y0, y1), (z0, z1)] = bounds;
        let mut builder = RunBuilder::new();
        for z in z0..=z1 {
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let target = MaskIndex::new(x, y, z);
                    let p = target.apply_transform(&target_to_source);
                    let p = Point3::new(snap(p.x), snap(p.y), snap(p.z));
                    let value = match spec.interpolation {
                        InterpolationMode::Nearest => self.sample_nearest(&p),
                        InterpolationMode::Linear => Some(self.sample_linear(&p))
                            .filter(|v| v.abs() > spec.inclusion_threshold),
                    };
                    if let Some(v) = value {
                        builder.push_voxel(target, v);
                    }
                }
            }
        }
        Ok(builder.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MaskRun;

    fn sample_mask() -> RoiMask {
        RoiMask::from_runs(vec![
            MaskRun::new(1..4, 2, 0, 2.0),
            MaskRun::new(4..6, 2, 0, 3.0),
            MaskRun::new(0..2, 0, 1, 1.0),
            MaskRun::new(3..5, 3, 3, 0.5),
        ])
        .unwrap()
    }

    #[test]
    fn test_resample_spec_validation() {
        assert!(ResampleSpec::new(InterpolationMode::Linear, 0.25).is_some());
        assert!(ResampleSpec::new(InterpolationMode::Linear, -1.0).is_none());
        assert!(ResampleSpec::new(InterpolationMode::Nearest, f32::NAN).is_none());
        assert_eq!(ResampleSpec::default(), ResampleSpec::nearest());
    }

    #[test]
    fn test_identity() {
        let m = sample_mask();
        let id = AffineTransform::identity();
        assert_eq!(m.resample(&id, &id, &ResampleSpec::nearest()).unwrap(), m);
        assert_eq!(m.resample(&id, &id, &ResampleSpec::linear()).unwrap(), m);

        // 两侧相同的非平凡变换等价于恒等变换.
        let t = AffineTransform::scaling(0.7, 1.3, 2.0).then(&AffineTransform::translation(3.0, -1.0, 0.25));
        assert_eq!(m.resample(&t, &t, &ResampleSpec::nearest()).unwrap(), m);
    }

    #[test]
    fn test_translation() {
        let m = sample_mask();
        let id = AffineTransform::identity();
        let to = AffineTransform::translation(2.0, 3.0, 4.0);
        let expected = m.translated(2, 3, 4).unwrap();
        assert_eq!(m.resample(&id, &to, &ResampleSpec::nearest()).unwrap(), expected);
        assert_eq!(m.resample(&id, &to, &ResampleSpec::linear()).unwrap(), expected);
    }

    #[test]
    fn test_upsample_nearest() {
        let m = RoiMask::with_cube(2);
        let id = AffineTransform::identity();
        let r = m
            .resample(&id, &AffineTransform::scaling(2.0, 2.0, 2.0), &ResampleSpec::nearest())
            .unwrap();
        assert_eq!(r, RoiMask::with_cube(3));
    }

    #[test]
    fn test_upsample_nearest_odd_factor() {
        let m = RoiMask::with_box(2, 1, 1).translated(5, 0, 0).unwrap();
        let id = AffineTransform::identity();
        let to = AffineTransform::scaling(3.0, 1.0, 1.0);
        let r = m.resample(&id, &to, &ResampleSpec::nearest()).unwrap();

        // 逐个体素按 "反投影后取整, 判断是否在源掩膜内" 求出的期望结果.
        let inverse = to.try_inverse().unwrap();
        let expected: Vec<u32> = (0..40)
            .filter(|&x| {
                let p = inverse.apply(&Point3::new(x as f64, 0.0, 0.0));
                m.contains_index(MaskIndex::new(p.x.round() as u32, 0, 0))
            })
            .collect();
        assert_eq!(expected, vec![14, 15, 16, 17, 18, 19]);
        assert_eq!(r.runs(), &[MaskRun::new(14..20, 0, 0, 1.0)]);
    }

    #[test]
    fn test_nearest_keeps_zero_intensity() {
        let m = RoiMask::from_runs(vec![
            MaskRun::new(0..2, 0, 0, 0.0),
            MaskRun::new(2..3, 0, 0, 1.0),
        ])
        .unwrap();
        let id = AffineTransform::identity();
        assert_eq!(m.resample(&id, &id, &ResampleSpec::nearest()).unwrap(), m);

        // 最近邻不受纳入阈值影响.
        let strict = ResampleSpec::new(InterpolationMode::Nearest, 5.0).unwrap();
        assert_eq!(m.resample(&id, &id, &strict).unwrap(), m);

        // 线性插值仍按阈值取舍.
        let r = m.resample(&id, &id, &ResampleSpec::linear()).unwrap();
        assert_eq!(r.runs(), &[MaskRun::new(2..3, 0, 0, 1.0)]);
    }

    #[test]
    fn test_downsample_linear() {
        let m = RoiMask::with_cube(4);
        let id = AffineTransform::identity();
        let r = m
            .resample(&id, &AffineTransform::scaling(0.5, 0.5, 0.5), &ResampleSpec::linear())
            .unwrap();
        assert_eq!(r, RoiMask::with_cube(2));
    }

    #[test]
    fn test_linear_threshold() {
        let m = RoiMask::from_indices([MaskIndex::new(2, 2, 2)]).unwrap();
        let id = AffineTransform::identity();
        let to = AffineTransform::translation(0.5, 0.0, 0.0);

        let r = m.resample(&id, &to, &ResampleSpec::linear()).unwrap();
        assert_eq!(r.runs(), &[MaskRun::new(2..4, 2, 2, 0.5)]);

        let strict = ResampleSpec::new(InterpolationMode::Linear, 0.5).unwrap();
        assert!(m.resample(&id, &to, &strict).unwrap().is_empty());
    }

    #[test]
    fn test_degenerate_transform() {
        let m = sample_mask();
        let id = AffineTransform::identity();
        let flat = AffineTransform::scaling(1.0, 0.0, 1.0);
        assert_eq!(
            m.resample(&flat, &id, &ResampleSpec::nearest()),
            Err(MaskError::DegenerateTransform)
        );
        assert_eq!(
            m.resample(&id, &flat, &ResampleSpec::linear()),
            Err(MaskError::DegenerateTransform)
        );
        assert_eq!(
            RoiMask::new().resample(&id, &flat, &ResampleSpec::nearest()),
            Err(MaskError::DegenerateTransform)
        );
    }

    #[test]
    fn test_empty_and_clipped() {
        let id = AffineTransform::identity();
        assert!(RoiMask::new()
            .resample(&id, &id, &ResampleSpec::linear())
            .unwrap()
            .is_empty());

        let m = RoiMask::with_cube(3);
        let away = AffineTransform::translation(-10.0, 0.0, 0.0);
        assert!(m.resample(&id, &away, &ResampleSpec::nearest()).unwrap().is_empty());

        let half = AffineTransform::translation(-1.0, 0.0, 0.0);
        assert_eq!(
            m.resample(&id, &half, &ResampleSpec::nearest()).unwrap(),
            RoiMask::with_box(2, 3, 3)
        );
    }
}
