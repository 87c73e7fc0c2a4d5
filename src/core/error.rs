// src/core/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 三层错误模型：
//! 1. 设置错误（缺参数、缺变量、配置文件问题）——运行开始前致命
//! 2. 粒子级运行时状况（出域、搁浅、致死温盐、饥饿）——不是错误，
//!    以 `MortalityCause` 状态转移表达，不中断运行
//! 3. 数据集边界（请求时间超出时间序列覆盖范围）——整个运行致命

use std::path::PathBuf;
use thiserror::Error;

/// 统一结果类型
pub type LdResult<T> = Result<T, LdError>;

/// LarvaDrift 错误类型
#[derive(Error, Debug)]
pub enum LdError {
    // ============================================================
    // IO相关错误
    // ============================================================
    #[error("IO错误: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("文件不存在: {path}")]
    FileNotFound { path: PathBuf },

    #[error("文件解析错误: {file} 第{line}行: {message}")]
    ParseError {
        file: PathBuf,
        line: usize,
        message: String,
    },

    // ============================================================
    // 配置相关错误（设置期致命）
    // ============================================================
    #[error("配置错误: {message}")]
    Config { message: String },

    #[error("缺少必需的配置项: {block}/{key}")]
    MissingParameter { block: String, key: String },

    #[error("配置值无效: {block}/{key}={value}, 原因: {reason}")]
    InvalidParameter {
        block: String,
        key: String,
        value: String,
        reason: String,
    },

    // ============================================================
    // 数据集相关错误
    // ============================================================
    #[error("数据集缺少必需变量: {name}")]
    MissingVariable { name: String },

    #[error("时间超出数据覆盖范围: 请求时间={requested}s, 数据范围=[{start}s, {end}s]")]
    TimeOutOfRange {
        requested: f64,
        start: f64,
        end: f64,
    },

    /// 网格坐标落在计算域外。平流/采样调用方将其转化为粒子出域死亡，
    /// 与致命的数据读取错误严格区分。
    #[error("网格坐标超出计算域: ({x:.3}, {y:.3})")]
    OutOfDomain { x: f64, y: f64 },

    #[error("数据加载失败 ({source_name}): {message}")]
    DataLoad { source_name: String, message: String },

    // ============================================================
    // 数值计算错误
    // ============================================================
    #[error("数值计算失败: {message}")]
    Numerical { message: String },

    #[error("数组大小不匹配: {name} 期望{expected}, 实际{actual}")]
    SizeMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    // ============================================================
    // 工作流错误
    // ============================================================
    #[error("工作流错误: {0}")]
    Workflow(String),

    #[error("序列化错误: {message}")]
    Serialization { message: String },
}

// ============================================================
// 便捷构造方法
// ============================================================

impl LdError {
    /// 从IO错误创建
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            source: None,
        }
    }

    /// 文件不存在
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// 解析错误
    pub fn parse(file: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::ParseError {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    /// 配置错误
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// 缺少参数
    pub fn missing_parameter(block: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingParameter {
            block: block.into(),
            key: key.into(),
        }
    }

    /// 参数值无效
    pub fn invalid_parameter(
        block: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            block: block.into(),
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// 缺少数据集变量
    pub fn missing_variable(name: impl Into<String>) -> Self {
        Self::MissingVariable { name: name.into() }
    }

    /// 坐标出域
    pub fn out_of_domain(x: f64, y: f64) -> Self {
        Self::OutOfDomain { x, y }
    }

    /// 数据加载失败
    pub fn data_load(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataLoad {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// 数组大小不匹配
    pub fn size_mismatch(name: &'static str, expected: usize, actual: usize) -> Self {
        Self::SizeMismatch {
            name,
            expected,
            actual,
        }
    }

    /// 是否为出域错误（调用方据此决定杀死粒子而非中止运行）
    pub fn is_out_of_domain(&self) -> bool {
        matches!(self, Self::OutOfDomain { .. })
    }
}

// ============================================================
// 验证辅助函数
// ============================================================

impl LdError {
    /// 检查数组大小是否匹配
    #[inline]
    pub fn check_size(name: &'static str, expected: usize, actual: usize) -> LdResult<()> {
        if expected != actual {
            Err(Self::size_mismatch(name, expected, actual))
        } else {
            Ok(())
        }
    }

    /// 检查值是否有限
    #[inline]
    pub fn check_finite(field: &'static str, value: f64) -> LdResult<()> {
        if !value.is_finite() {
            Err(Self::Numerical {
                message: format!("{} 非有限数值: {}", field, value),
            })
        } else {
            Ok(())
        }
    }
}

// ============================================================
// 标准库错误转换
// ============================================================

impl From<std::io::Error> for LdError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for LdError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// 验证条件，失败时返回错误
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}
