//! 通用常量.

/// 生成形状掩膜 (以及不带强度信息的索引) 时使用的默认强度.
pub const DEFAULT_FILL_INTENSITY: f32 = 1.0;

/// 单个行程记录序列化后的字节数.
///
/// 布局 (小端序): `width_start: u32`, `width_length: u32`,
/// `height_index: u32`, `depth_index: u32`, `intensity: f32`.
pub const RUN_RECORD_SIZE: usize = 20;

/// 单个索引记录序列化后的字节数.
///
/// 布局 (小端序): `x: u32`, `y: u32`, `z: u32`.
pub const INDEX_RECORD_SIZE: usize = 12;

/// 集合运算中, 扫描线对个数超过该值时才会启用 `rayon` 并行.
pub const PARALLEL_LINE_THRESHOLD: usize = 1024;

/// 重采样时, 与整数距离小于该值的源坐标会被吸附到该整数上.
///
/// 仿射变换与其逆的乘积通常不是精确的单位阵.
pub const SNAP_EPSILON: f64 = 1e-6;
