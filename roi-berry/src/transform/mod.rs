//! 仿射变换与平移.
//!
//! 约定: 体数据的仿射变换把世界坐标 (病人坐标系) 映射到该体数据的索引坐标.
//! 重采样见 [`ResampleSpec`] 和 [`RoiMask::resample`].

use nalgebra::{Matrix4, Point3, Vector3};
use num::ToPrimitive;

use crate::mask::RunBuilder;
use crate::{MaskError, MaskResult, MaskRun, RoiMask};

mod resample;

pub use resample::{InterpolationMode, ResampleSpec};

/// 三维仿射变换. 内部为 4×4 齐次矩阵, 采用列向量约定: `p' = M · [x, y, z, 1]ᵀ`.
///
/// 矩阵的最后一行总是 `[0, 0, 0, 1]`, 元素总是有限值.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct AffineTransform {
    matrix: Matrix4<f64>,
}

impl Default for AffineTransform {
    #[inline]
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    /// 恒等变换.
    #[inline]
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// 由齐次矩阵构建.
    ///
    /// # 错误
    ///
    /// 矩阵含非有限值, 或最后一行不为 `[0, 0, 0, 1]` 时返回 [`MaskError::DegenerateTransform`].
    pub fn from_matrix(matrix: Matrix4<f64>) -> MaskResult<Self> {
        if !matrix.iter().all(|v| v.is_finite()) {
            return Err(MaskError::DegenerateTransform);
        }
        let last_row = [matrix[(3, 0)], matrix[(3, 1)], matrix[(3, 2)], matrix[(3, 3)]];
        if last_row != [0.0, 0.0, 0.0, 1.0] {
            return Err(MaskError::DegenerateTransform);
        }
        Ok(Self { matrix })
    }

    /// 平移变换.
    #[inline]
    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            matrix: Matrix4::new_translation(&Vector3::new(x, y, z)),
        }
    }

    /// 沿坐标轴的缩放变换.
    #[inline]
    pub fn scaling(x: f64, y: f64, z: f64) -> Self {
        Self {
            matrix: Matrix4::new_nonuniform_scaling(&Vector3::new(x, y, z)),
        }
    }

    /// 变换一个点.
    #[inline]
    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        self.matrix.transform_point(p)
    }

    /// 复合变换: 先做 `self`, 再做 `next`.
    #[inline]
    pub fn then(&self, next: &AffineTransform) -> AffineTransform {
        Self {
            matrix: next.matrix * self.matrix,
        }
    }

    /// 逆变换.
    ///
    /// # 错误
    ///
    /// 不可逆时返回 [`MaskError::DegenerateTransform`].
    pub fn try_inverse(&self) -> MaskResult<AffineTransform> {
        let inv = self
            .matrix
            .try_inverse()
            .ok_or(MaskError::DegenerateTransform)?;
        Self::from_matrix(inv)
    }

    /// 行列式. 小于零表示变换改变定向.
    #[inline]
    pub fn determinant(&self) -> f64 {
        self.matrix.determinant()
    }

    /// 齐次矩阵.
    #[inline]
    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }
}

impl RoiMask {
    /// 整体平移 `(dx, dy, dz)`.
    ///
    /// # 错误
    ///
    /// 任一体素的坐标超出 `u32` 范围时返回 [`MaskError::OutOfDomain`].
    pub fn translated(&self, dx: i64, dy: i64, dz: i64) -> MaskResult<RoiMask> {
        let shift = |v: i64, d: i64| v.checked_add(d).and_then(|v| v.to_u32());
        let runs = self
            .runs()
            .iter()
            .map(|run| {
                let start = shift(run.width_start as i64, dx);
                let last = shift(run.width_end() as i64 - 1, dx);
                let y = shift(run.height_index as i64, dy);
                let z = shift(run.depth_index as i64, dz);
                match (start, last, y, z) {
                    (Some(start), Some(_), Some(y), Some(z)) => Ok(MaskRun {
                        width_start: start,
                        height_index: y,
                        depth_index: z,
                        ..*run
                    }),
                    _ => Err(MaskError::OutOfDomain),
                }
            })
            .collect::<MaskResult<Vec<_>>>()?;
        // 平移保持行程顺序与相邻关系.
        Ok(RoiMask::from_canonical(runs))
    }

    /// 整体平移 `(dx, dy, dz)`, 落在 `u32` 范围之外的体素被丢弃.
    pub fn translated_cropped(&self, dx: i64, dy: i64, dz: i64) -> RoiMask {
        const HI: i128 = u32::MAX as i128;
        let mut builder = RunBuilder::with_capacity(self.run_count());
        for run in self.runs() {
            let y = run.height_index as i128 + dy as i128;
            let z = run.depth_index as i128 + dz as i128;
            if !(0..=HI).contains(&y) || !(0..=HI).contains(&z) {
                continue;
            }
            let start = (run.width_start as i128 + dx as i128).max(0);
            let end = (run.width_end() as i128 + dx as i128).min(HI + 1);
            if start >= end {
                continue;
            }
            builder.push_run(MaskRun {
                width_start: start as u32,
                width_length: (end - start) as u32,
                height_index: y as u32,
                depth_index: z as u32,
                intensity: run.intensity,
            });
        }
        builder.finish()
    }
}
