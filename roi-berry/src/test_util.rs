//! 单元测试公用工具.

/// 以 `Debug` 级别初始化日志. 重复调用是安全的.
pub(crate) fn init_logger() {
    let _ = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Debug)
        .init();
}

pub(crate) fn float_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-8
}
