// crates/gp_forward/src/engine/mod.rs

//! 装配引擎
//!
//! 驱动行核函数在全部观测点上求值，按并行后端堆叠为灵敏度矩阵：
//! - [`assembler`]: 三种执行策略（任务图 / 线程池 / 串行）与前向流式归约
//! - [`progress`]: 串行路径的十分位进度回调

pub mod assembler;
pub mod progress;

pub use assembler::{Assembler, AssemblyMetrics};
pub use progress::{LogProgress, NullProgress, ProgressSink};
