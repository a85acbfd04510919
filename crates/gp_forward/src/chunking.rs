// crates/gp_forward/src/chunking.rs

//! 分块规划
//!
//! 在给定内存预算下为灵敏度矩阵确定行/列分块尺寸。
//!
//! # 算法
//!
//! 初始分块数取工作线程数，行块 = ceil(nD/nChunks)，
//! 列块 = ceil(nC/nChunks)；估算每工作线程内存
//! `rowChunk × colChunk × 8 × nWorkers`，超预算则分块数加倍重算。
//! 加倍使块尺寸严格缩小，下界为 1，因此必然终止。
//!
//! # 稳健性
//!
//! 预算不可达不是错误：规划器退化到最小块尺寸而不是失败。
//! 规划结果是硬约束——任何组件一次物化的块都不得超过规划的块形状。

use serde::{Deserialize, Serialize};

/// 矩阵元素字节数（f64）
const ELEMENT_BYTES: usize = 8;

/// 分块方案
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPlan {
    /// 每个维度的分块数
    pub n_chunks: usize,
    /// 行块尺寸（>= 1）
    pub row_chunk: usize,
    /// 列块尺寸（>= 1）
    pub col_chunk: usize,
}

impl ChunkPlan {
    /// 在内存预算下求解分块方案
    ///
    /// # 参数
    ///
    /// - `n_rows`: 观测点数 nD
    /// - `n_cols`: 活动单元数 nC
    /// - `n_workers`: 工作线程数
    /// - `max_ram_gb`: 内存预算上限 [GB]
    pub fn resolve(n_rows: usize, n_cols: usize, n_workers: usize, max_ram_gb: f64) -> Self {
        let n_workers = n_workers.max(1);
        let budget_bytes = max_ram_gb * 1e9;

        let mut n_chunks = n_workers;
        let mut row_chunk = n_rows.div_ceil(n_chunks).max(1);
        let mut col_chunk = n_cols.div_ceil(n_chunks).max(1);

        while Self::worker_bytes(row_chunk, col_chunk, n_workers) as f64 > budget_bytes
            && (row_chunk > 1 || col_chunk > 1)
        {
            n_chunks *= 2;
            row_chunk = n_rows.div_ceil(n_chunks).max(1);
            col_chunk = n_cols.div_ceil(n_chunks).max(1);
        }

        log::debug!(
            "分块方案: n_chunks={}, 块形状={}x{}, 估算内存={:.3} GB (预算 {:.3} GB)",
            n_chunks,
            row_chunk,
            col_chunk,
            Self::worker_bytes(row_chunk, col_chunk, n_workers) as f64 * 1e-9,
            max_ram_gb
        );

        Self {
            n_chunks,
            row_chunk,
            col_chunk,
        }
    }

    /// 单块字节数
    #[inline]
    pub fn chunk_bytes(&self) -> usize {
        self.row_chunk * self.col_chunk * ELEMENT_BYTES
    }

    /// 估算所有工作线程同时各持一块的内存占用
    #[inline]
    pub fn estimated_worker_bytes(&self, n_workers: usize) -> usize {
        Self::worker_bytes(self.row_chunk, self.col_chunk, n_workers)
    }

    #[inline]
    fn worker_bytes(row_chunk: usize, col_chunk: usize, n_workers: usize) -> usize {
        row_chunk * col_chunk * ELEMENT_BYTES * n_workers
    }
}

// ============================================================
// 测试
// ============================================================
