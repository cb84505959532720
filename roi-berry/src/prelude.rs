//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;

pub use crate::mask::{MaskIndex, MaskRun, RoiMask};

pub use crate::geometry::{MaskExtent, MaskHull};

pub use crate::transform::{AffineTransform, InterpolationMode, ResampleSpec};

pub use crate::volume::{FloatVolume, VolumeData, VolumeDataMut, VoxelSample};

pub use crate::consts::DEFAULT_FILL_INTENSITY;

pub use crate::{MaskError, MaskResult};
