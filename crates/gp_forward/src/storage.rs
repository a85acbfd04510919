// crates/gp_forward/src/storage.rs

//! 存储端口
//!
//! 灵敏度矩阵持久化的最小接口。具体机制（文件分块数组、内存映射块、
//! KV blob 存储）可替换而不触及装配引擎；文件实现见 gp_io。
//!
//! # 缓存语义
//!
//! 这是按路径键控的存在性缓存：存在即命中，跳过重建。不做内容哈希，
//! 不做过期检测——对不同问题使用不同路径是调用方的责任。

use gp_foundation::GravResult;

use crate::matrix::SensitivityMatrix;

/// 灵敏度矩阵持久化端口
pub trait SensitivityStorage: Send {
    /// 该位置是否已存在有效存储（缓存命中判据）
    fn exists(&self) -> bool;

    /// 加载已持久化的矩阵
    fn load(&self) -> GravResult<SensitivityMatrix>;

    /// 持久化矩阵
    ///
    /// 实现必须保证原子性：中断的写入不得在最终路径留下部分文件，
    /// 否则后续运行会把截断的存储误判为缓存命中。
    fn store(&self, matrix: &SensitivityMatrix) -> GravResult<()>;
}
