// crates/gp_forward/src/lib.rs

//! 重力正演核心模块
//!
//! 提供积分形式的位场（重力）正演建模功能，包括：
//! - 几何适配层 (geometry) - 活动单元投影与棱柱角点坐标
//! - 核心类型定义 (types) - 场分量、并行后端、正演配置
//! - 行核函数 (kernel) - 单观测点对全部活动单元的解析响应
//! - 分块规划 (chunking) - 受内存预算约束的矩阵分块
//! - 灵敏度矩阵 (matrix) - 行主序稠密矩阵及其分块视图
//! - 装配引擎 (engine) - 并行策略调度、进度回调
//! - 存储端口 (storage) - 灵敏度矩阵持久化接口
//! - 线性算子门面 (operator) - fields/Jvec/Jtvec/JtJ 对角线
//!
//! # 数据流
//!
//! ```text
//! geometry ─> kernel ─> chunking ─> engine ─> (storage) ─> operator
//! ```
//!
//! # Trait 抽象
//!
//! - [`SensitivityStorage`]: 矩阵持久化端口（文件实现见 gp_io）
//! - [`ModelMapping`]: 模型映射及其导数（反演驱动侧注入）
//! - [`ProgressSink`]: 串行装配的十分位进度回调

pub mod chunking;
pub mod engine;
pub mod geometry;
pub mod kernel;
pub mod matrix;
pub mod operator;
pub mod storage;
pub mod types;

// 重导出常用类型
pub use chunking::ChunkPlan;
pub use engine::{Assembler, AssemblyMetrics, LogProgress, NullProgress, ProgressSink};
pub use geometry::{ActiveCells, CellGeometry};
pub use kernel::RowKernel;
pub use matrix::{MatrixBlock, SensitivityMatrix};
pub use operator::{GravityOperator, IdentityMapping, ModelMapping};
pub use storage::SensitivityStorage;
pub use types::{
    FieldComponent, ForwardConfig, ForwardConfigBuilder, ParallelBackend, EQUIV_SOURCE_EXTENSION,
    KERNEL_EPS, NEWTON_G_MGAL,
};
