//! 形状掩膜生成. 所有形状都以 `(0, 0, 0)` 为原点, 强度为 [`DEFAULT_FILL_INTENSITY`].
//!
//! 每种形状在任意扫描线上的截面都是一段连续区间, 因此每条相交扫描线恰好生成一个行程.

use crate::consts::DEFAULT_FILL_INTENSITY;
use crate::mask::RunBuilder;
use crate::{MaskRun, RoiMask};

/// 判定区间端点时的容差. 防止 `(w - 1) / 2 ± w / 2` 这类恰好落在整数上的端点因舍入而丢失.
const EDGE_EPS: f64 = 1e-9;

impl RoiMask {
    /// `width × height × depth` 的长方体. 任一边长为零时得到空掩膜.
    pub fn with_box(width: u32, height: u32, depth: u32) -> RoiMask {
        if width == 0 || height == 0 || depth == 0 {
            return RoiMask::new();
        }
        let mut builder = RunBuilder::with_capacity(height as usize * depth as usize);
        for z in 0..depth {
            for y in 0..height {
                builder.push_run(MaskRun::new(0..width, y, z, DEFAULT_FILL_INTENSITY));
            }
        }
        builder.finish()
    }

    /// 边长为 `size` 的立方体.
    #[inline]
    pub fn with_cube(size: u32) -> RoiMask {
        Self::with_box(size, size, size)
    }

    /// 内切于 `width × height × depth` 包围盒的椭球体.
    ///
    /// 中心为 `((w-1)/2, (h-1)/2, (d-1)/2)`, 半轴长为 `w/2, h/2, d/2`;
    /// 体素中心到中心的归一化距离平方不超过 1 时被包含.
    pub fn with_ellipsoid(width: u32, height: u32, depth: u32) -> RoiMask {
        if width == 0 || height == 0 || depth == 0 {
            return RoiMask::new();
        }
        let center = [
            (width as f64 - 1.0) / 2.0,
            (height as f64 - 1.0) / 2.0,
            (depth as f64 - 1.0) / 2.0,
        ];
        let semi = [width as f64 / 2.0, height as f64 / 2.0, depth as f64 / 2.0];

        let mut builder = RunBuilder::new();
        for z in 0..depth {
            let dz = (z as f64 - center[2]) / semi[2];
            for y in 0..height {
                let dy = (y as f64 - center[1]) / semi[1];
                let rest = 1.0 - dy * dy - dz * dz;
                if rest < -EDGE_EPS {
                    continue;
                }
                let half = semi[0] * rest.max(0.0).sqrt();
                let lo = (center[0] - half - EDGE_EPS).ceil().max(0.0);
                let hi = (center[0] + half + EDGE_EPS).floor().min(width as f64 - 1.0);
                if lo > hi {
                    continue;
                }
                builder.push_run(MaskRun::new(
                    lo as u32..hi as u32 + 1,
                    y,
                    z,
                    DEFAULT_FILL_INTENSITY,
                ));
            }
        }
        builder.finish()
    }

    /// 直径为 `diameter` 的球体.
    #[inline]
    pub fn with_sphere(diameter: u32) -> RoiMask {
        Self::with_ellipsoid(diameter, diameter, diameter)
    }
}
