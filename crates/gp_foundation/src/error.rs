// crates/gp_foundation/src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `GravError` 枚举和 `GravResult` 类型别名，用于整个项目的错误处理。
//!
//! # 设计原则
//!
//! 1. **层次化**: 基础层只定义核心错误，存储格式相关错误在 gp_io 中定义，
//!    跨层传播时包装为 [`GravError::Store`]
//! 2. **易用性**: 提供便捷的构造方法
//! 3. **可追溯**: 支持错误链
//!
//! # 示例
//!
//! ```
//! use gp_foundation::error::{GravError, GravResult};
//!
//! fn read_config() -> GravResult<()> {
//!     Err(GravError::invalid_config("parallelized", "spark", "不在允许的取值集合中"))
//! }
//! ```

use thiserror::Error;

/// 统一结果类型
pub type GravResult<T> = Result<T, GravError>;

/// GraviPrism 错误类型
///
/// 核心错误类型，用于整个项目。存储格式相关的错误应在 `gp_io` 中扩展。
#[derive(Error, Debug)]
pub enum GravError {
    /// 算子未绑定观测系统
    ///
    /// 在绑定观测点之前访问灵敏度矩阵（或任何依赖它的运算）时触发。
    #[error("算子尚未绑定观测点: 请先调用 bind_receivers 再访问灵敏度矩阵")]
    NotPaired,

    /// 配置值无效
    #[error("配置值无效: {key}={value}, 原因: {reason}")]
    InvalidConfig {
        /// 配置键名
        key: String,
        /// 配置值
        value: String,
        /// 无效原因说明
        reason: String,
    },

    /// 索引越界
    #[error("索引越界: {index_type} 索引 {index} 超出范围 0..{len}")]
    IndexOutOfBounds {
        /// 索引类别描述
        index_type: &'static str,
        /// 访问的索引
        index: usize,
        /// 上界（长度）
        len: usize,
    },

    /// 数组大小不匹配
    #[error("数组大小不匹配: {name} 期望{expected}, 实际{actual}")]
    SizeMismatch {
        /// 数据名称
        name: &'static str,
        /// 期望大小
        expected: usize,
        /// 实际大小
        actual: usize,
    },

    /// 无效输入
    #[error("无效的输入数据: {message}")]
    InvalidInput {
        /// 说明无效原因
        message: String,
    },

    /// IO 错误
    #[error("IO错误: {message}")]
    Io {
        /// 描述性错误信息
        message: String,
        #[source]
        /// 可选的底层 IO 错误
        source: Option<std::io::Error>,
    },

    /// 存储层错误
    ///
    /// gp_io 的格式/校验错误跨越存储端口时包装为此变体。
    #[error("存储错误: {message}")]
    Store {
        /// 存储层错误描述
        message: String,
    },

    /// 内部错误
    #[error("内部错误: {message}")]
    Internal {
        /// 内部错误描述
        message: String,
    },
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl GravError {
    /// 配置值无效
    pub fn invalid_config(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// 索引越界
    pub fn index_out_of_bounds(index_type: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds {
            index_type,
            index,
            len,
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

    /// 无效输入
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// 从IO错误创建
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            source: None,
        }
    }

    /// 存储层错误
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// 内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

// ========================================================================
// 验证辅助方法
// ========================================================================

impl GravError {
    /// 检查索引是否在范围内
    #[inline]
    pub fn check_index(index_type: &'static str, index: usize, len: usize) -> GravResult<()> {
        if index >= len {
            Err(Self::index_out_of_bounds(index_type, index, len))
        } else {
            Ok(())
        }
    }

    /// 检查数组大小是否匹配
    #[inline]
    pub fn check_size(name: &'static str, expected: usize, actual: usize) -> GravResult<()> {
        if expected != actual {
            Err(Self::size_mismatch(name, expected, actual))
        } else {
            Ok(())
        }
    }
}

// ========================================================================
// 标准库错误转换
// ========================================================================

impl From<std::io::Error> for GravError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

// ========================================================================
// 测试
// ========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_paired_display() {
        let err = GravError::NotPaired;
        assert!(err.to_string().contains("bind_receivers"));
    }

    #[test]
    fn test_invalid_config_names_value() {
        let err = GravError::invalid_config("parallelized", "spark", "允许: task-graph, worker-pool, none");
        let msg = err.to_string();
        assert!(msg.contains("spark"));
        assert!(msg.contains("task-graph"));
    }

    #[test]
    fn test_index_out_of_bounds() {
        let err = GravError::index_out_of_bounds("ActiveCell", 10, 5);
        assert!(err.to_string().contains("ActiveCell"));
        assert!(err.to_string().contains("10"));
        assert!(err.to_string().contains("5"));
    }

    #[test]
    fn test_check_index() {
        assert!(GravError::check_index("Cell", 5, 10).is_ok());
        assert!(GravError::check_index("Cell", 10, 10).is_err());
    }

    #[test]
    fn test_check_size() {
        assert!(GravError::check_size("model", 10, 10).is_ok());
        assert!(GravError::check_size("model", 10, 5).is_err());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: GravError = io_err.into();
        assert!(matches!(err, GravError::Io { .. }));
    }

    #[test]
    fn test_ensure_macro() {
        fn check(value: i32) -> GravResult<()> {
            crate::ensure!(value > 0, GravError::invalid_input("value must be positive"));
            Ok(())
        }

        assert!(check(1).is_ok());
        assert!(check(-1).is_err());
    }

    #[test]
    fn test_require_macro() {
        fn get_value(opt: Option<i32>) -> GravResult<i32> {
            let v = crate::require!(opt, GravError::invalid_input("missing value"));
            Ok(v)
        }

        assert_eq!(get_value(Some(42)).unwrap(), 42);
        assert!(get_value(None).is_err());
    }
}
