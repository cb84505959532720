use std::path::Path;

use ::nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use nalgebra::Matrix4;
use ndarray::{Array3, ArrayD};

use super::FloatVolume;
use crate::{AffineTransform, Idx3d, MaskError, MaskResult};

/// 读取体数据文件时的错误.
#[derive(thiserror::Error, Debug)]
pub enum VolumeError {
    /// nii 文件读取或解析失败.
    #[error(transparent)]
    Nifti(#[from] ::nifti::NiftiError),

    /// 体数据形状与 header 不符.
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    /// header 中的仿射变换退化.
    #[error(transparent)]
    Mask(#[from] MaskError),
}

/// 将 (W, H, z) 转换成 (z, H, W).
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    let [_, w, h, z, ..] = h.dim;
    (z as usize, h as usize, w as usize)
}

/// 由 header 求出世界坐标到索引坐标的仿射变换.
///
/// `sform_code > 0` 时使用 `srow_{x,y,z}` 给出的索引到世界坐标的矩阵, 否则只按 `pixdim` 缩放.
pub(crate) fn header_transform(h: &NiftiHeader) -> MaskResult<AffineTransform> {
    let to_world = if h.sform_code > 0 {
        let (x, y, z) = (h.srow_x, h.srow_y, h.srow_z);
        #[rustfmt::skip]
        let m = Matrix4::new(
            x[0] as f64, x[1] as f64, x[2] as f64, x[3] as f64,
            y[0] as f64, y[1] as f64, y[2] as f64, y[3] as f64,
            z[0] as f64, z[1] as f64, z[2] as f64, z[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        );
        AffineTransform::from_matrix(m)?
    } else {
        let [_, w, h, z, ..] = h.pixdim;
        AffineTransform::scaling(w as f64, h as f64, z as f64)
    };
    to_world.try_inverse()
}

/// [W, H, z] 排列的 nifti 数据 -> [z, H, W].
fn into_zhw(shape: Idx3d, data: ArrayD<f32>) -> Result<Array3<f32>, ndarray::ShapeError> {
    // hint: 原第一维向下增长, 原第二维向右增长.
    let data = data.permuted_axes([2, 1, 0].as_slice());

    // The nature of nifti data field layout.
    debug_assert!(data.is_standard_layout());

    Array3::<f32>::from_shape_vec(shape, data.into_raw_vec())
}

impl FloatVolume {
    /// 打开 nii 文件格式的体数据. `path` 为 nii 文件的本地路径.
    ///
    /// 强度统一转换为 `f32`; 仿射变换由 header 的 sform (或 pixdim) 求得.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VolumeError> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = obj.header().clone();
        let transform = header_transform(&header)?;
        let data = into_zhw(
            get_shape_from_header(&header),
            obj.into_volume().into_ndarray::<f32>()?,
        )?;
        Ok(Self::new(data, transform))
    }
}
