#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 以行程编码 (run-length) 的形式表示和处理大尺寸的三维 ROI 掩膜,
//! 而不需要逐体素地展开.
//!
//! 一个掩膜 ([`RoiMask`]) 描述体素网格上的一个 (可能非常大, 也可能非常稀疏的)
//! 子集, 子集内每个体素携带一个 `f32` 强度值. 掩膜在内部 **只** 保存一组有序、
//! 互不重叠的行程 ([`MaskRun`]), 因此内存占用与行程个数成正比, 而不是与体素个数成正比.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 坐标约定
//!
//! 1. 掩膜索引 ([`MaskIndex`]) 按 `(x, y, z)` 即 `(width, height, depth)` 给出.
//! 2. 稠密体数据 ([`FloatVolume`]) 以 `(z, h, w)`
//!   即 [`Idx3d`] 的顺序存放在 `ndarray::Array3<f32>` 中.
//! 3. 体数据的仿射变换 ([`AffineTransform`]) 将世界坐标 (病人坐标系)
//!   映射到该体数据的索引坐标.
//!
//! # 功能一览
//!
//! ### 行程与索引基础类型 ✅
//!
//! 比较、重叠、相邻判定, 以及行程内索引的惰性迭代.
//!
//! 实现位于 `roi-berry/src/mask/run.rs`.
//!
//! ### 行程存储与二进制编解码 ✅
//!
//! 从行程、索引、字节流构建掩膜; 排序输入走快速路径, 但仍然做单趟校验.
//!
//! 实现位于 `roi-berry/src/mask`.
//!
//! ### 集合运算 ✅
//!
//! 按扫描线 (相同 `(depth, height)` 的行程) 归并的并、交、差运算.
//! 重叠区域的强度以 **第一个操作数** 为准.
//!
//! 实现位于 `roi-berry/src/mask/algebra.rs`.
//!
//! ### 几何查询 ✅
//!
//! 包含判定、外接范围、质心、凸包, 以及球/立方体/长方体/椭球体的生成.
//!
//! 实现位于 `roi-berry/src/geometry`.
//!
//! ### 平移与重采样 ✅
//!
//! 最近邻和三线性插值两种模式.
//!
//! 实现位于 `roi-berry/src/transform`.
//!
//! ### 与稠密体数据互转, 谓词过滤 ✅
//!
//! 实现位于 `roi-berry/src/volume`.

/// 三维索引, 按 `(z, h, w)` 排列, 与 `ndarray` 体数据的下标一致.
pub type Idx3d = (usize, usize, usize);

/// 扫描线键, 按 `(depth, height)` 排列.
type LineKey = (u32, u32);

pub mod consts;

mod error;

pub use error::{MaskError, MaskResult};

/// 掩膜行程存储与集合运算.
pub mod mask;

pub use mask::{IndexesInRun, MaskIndex, MaskRun, RoiMask};

/// 基于行程的几何查询.
pub mod geometry;

pub use geometry::{MaskExtent, MaskHull};

/// 仿射变换与重采样.
pub mod transform;

pub use transform::{AffineTransform, InterpolationMode, ResampleSpec};

/// 稠密体数据桥接.
pub mod volume;

pub use volume::{FloatVolume, VolumeData, VolumeDataMut, VolumeError, VoxelSample};

pub mod prelude;

#[cfg(test)]
pub(crate) mod test_util;
