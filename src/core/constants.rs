// src/core/constants.rs

//! 共享物理/时间常量

/// 一分钟 [s]
pub const ONE_MINUTE: f64 = 60.0;
/// 一小时 [s]
pub const ONE_HOUR: f64 = 3600.0;
/// 一天 [s]
pub const ONE_DAY: f64 = 86400.0;

/// 重力加速度 [cm/s2]（浮力公式使用CGS单位）
pub const GRAVITY_CGS: f64 = 980.0;

/// 海水分子粘度 [g/cm/s]
pub const MOLECULAR_VISCOSITY: f64 = 0.01;

/// 摄氏温度到开尔文的偏移
pub const CELSIUS_TO_KELVIN: f64 = 273.0;

/// 垂向网格索引的上边界收缩量：采样时 z 被限制在
/// [0, nz - 1 - Z_EPS]，避免最顶层插值模板越界
pub const Z_EPS: f64 = 1.0e-5;
