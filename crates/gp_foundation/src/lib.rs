// crates/gp_foundation/src/lib.rs

//! GraviPrism Foundation Layer
//!
//! 零逻辑基础层，提供整个项目的基础抽象。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型
//!
//! # 层级架构
//!
//! ```text
//! Layer 3: gp_io         ─> 灵敏度矩阵持久化
//! Layer 2: gp_forward    ─> 重力正演核心
//! Layer 1: gp_foundation ─> 错误类型、验证工具 (本层)
//! ```
//!
//! # 设计原则
//!
//! 1. **最小依赖**: 仅依赖 thiserror
//! 2. **层次化**: 基础层只定义核心错误，正演相关扩展在 gp_forward 中
//! 3. **易用性**: 提供便捷的构造方法和 `ensure!`/`require!` 宏

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;

pub use error::{GravError, GravResult};

/// 断言条件成立，否则返回给定错误
///
/// # 示例
///
/// ```
/// use gp_foundation::{ensure, GravError, GravResult};
///
/// fn check(n: usize) -> GravResult<()> {
///     ensure!(n > 0, GravError::invalid_input("单元数必须大于零"));
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err);
        }
    };
}

/// 解包 `Option`，为 `None` 时返回给定错误
#[macro_export]
macro_rules! require {
    ($opt:expr, $err:expr) => {
        match $opt {
            Some(v) => v,
            None => return Err($err),
        }
    };
}

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::error::{GravError, GravResult};
    pub use crate::{ensure, require};
}
