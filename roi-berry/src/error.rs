//! 运行时错误.

/// 掩膜构建、变换或查询的运行时错误.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MaskError {
    /// 输入数据不合法.
    ///
    /// 例如字节流长度不是记录大小的整数倍, 或要求有序的构造函数收到了乱序/重叠的行程.
    #[error("malformed mask input: {0}")]
    MalformedInput(String),

    /// 操作 (如平移) 会产生无法用 `u32` 表示的坐标.
    #[error("coordinate out of the unsigned voxel domain")]
    OutOfDomain,

    /// 仿射变换不可逆, 或不是仿射的 (最后一行不为 `[0, 0, 0, 1]`), 或含有非有限值.
    #[error("degenerate affine transform")]
    DegenerateTransform,

    /// 查询结果在数学上没有定义, 如空掩膜的外接范围, 或总强度为零时的质心.
    #[error("undefined result: {0}")]
    UndefinedResult(&'static str),
}

/// 掩膜操作的运行时结果.
pub type MaskResult<T> = Result<T, MaskError>;
