// crates/gp_io/src/lib.rs

//! GraviPrism IO 层
//!
//! 实现 gp_forward 的存储端口 [`gp_forward::SensitivityStorage`]：
//! 将装配好的灵敏度矩阵按分块二进制格式持久化到磁盘，
//! 后续运行以相同路径命中缓存，跳过重算。
//!
//! # 模块概览
//!
//! - [`store`]: 文件存储实现（魔数 + 版本 + 分块载荷 + CRC32，
//!   临时文件写入后原子重命名）

pub mod store;

pub use store::{FileSensitivityStore, StoreError, StoreResult};
