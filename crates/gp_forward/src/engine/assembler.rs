// crates/gp_forward/src/engine/assembler.rs

//! 并行装配器
//!
//! 对每个观测点调用一次行核函数，按观测点顺序堆叠为灵敏度矩阵。
//!
//! # 执行策略
//!
//! - `TaskGraph`: 每行作为独立工作单元交给 rayon 任务调度，
//!   索引化并行迭代保证收集顺序与观测点顺序一致
//! - `WorkerPool`: 显式规模的 rayon 线程池，结果按提交顺序收集
//! - `Sequential`: 逐行计算，经 [`ProgressSink`] 按十分位上报进度
//!
//! 行核函数是纯函数、堆叠顺序由观测点索引固定，三种策略对相同输入
//! 产生逐位一致的矩阵。唯一的同步点是最终堆叠，它是纯归约而非竞态。
//!
//! # 资源约束
//!
//! 工作线程之间只共享只读的几何与观测点数组。前向流式模式每个
//! 观测点只保留当前被归约的标量，从不物化整行之外的数据。

use glam::DVec3;
use gp_foundation::{GravError, GravResult};
use rayon::prelude::*;
use std::time::{Duration, Instant};

use crate::chunking::ChunkPlan;
use crate::engine::progress::{DecileTracker, ProgressSink};
use crate::kernel::RowKernel;
use crate::matrix::SensitivityMatrix;
use crate::types::ParallelBackend;

// ============================================================
// 装配指标
// ============================================================

/// 装配指标
///
/// `rows_computed` 在缓存命中（从存储加载）时保持为 0，
/// 是"未重新调用行核函数"的可观测判据。
#[derive(Debug, Clone, Copy, Default)]
pub struct AssemblyMetrics {
    /// 实际经行核函数计算的行数
    pub rows_computed: usize,
    /// 装配总耗时
    pub elapsed: Duration,
}

impl AssemblyMetrics {
    /// 记录一次装配
    fn record(&mut self, n_rows: usize, elapsed: Duration) {
        self.rows_computed += n_rows;
        self.elapsed += elapsed;
    }
}

// ============================================================
// 装配器
// ============================================================

/// 并行装配器
pub struct Assembler {
    kernel: RowKernel,
    receivers: Vec<DVec3>,
    plan: ChunkPlan,
    backend: ParallelBackend,
    n_workers: usize,
    metrics: AssemblyMetrics,
}

impl Assembler {
    /// 创建装配器
    pub fn new(
        kernel: RowKernel,
        receivers: Vec<DVec3>,
        plan: ChunkPlan,
        backend: ParallelBackend,
        n_workers: usize,
    ) -> Self {
        Self {
            kernel,
            receivers,
            plan,
            backend,
            n_workers: n_workers.max(1),
            metrics: AssemblyMetrics::default(),
        }
    }

    /// 观测点数量（行数）
    #[inline]
    pub fn n_receivers(&self) -> usize {
        self.receivers.len()
    }

    /// 装配指标
    #[inline]
    pub fn metrics(&self) -> &AssemblyMetrics {
        &self.metrics
    }

    /// 装配完整灵敏度矩阵
    ///
    /// 阻塞直至全部行完成；不支持中途取消。
    pub fn assemble(&mut self, sink: &mut dyn ProgressSink) -> GravResult<SensitivityMatrix> {
        let start = Instant::now();
        let n_cols = self.kernel.n_cells();

        let rows = match self.backend {
            ParallelBackend::TaskGraph => self.rows_task_graph(),
            ParallelBackend::WorkerPool => self.rows_worker_pool()?,
            ParallelBackend::Sequential => self.rows_sequential(sink),
        };

        let matrix = SensitivityMatrix::from_rows(rows, n_cols, self.plan);
        self.metrics.record(matrix.n_rows(), start.elapsed());

        log::debug!(
            "装配完成: {}x{}, 后端={}, 耗时={:.3}s",
            matrix.n_rows(),
            matrix.n_cols(),
            self.backend.name(),
            self.metrics.elapsed.as_secs_f64()
        );

        Ok(matrix)
    }

    /// 前向流式模式：逐观测点计算标量响应，不物化矩阵
    pub fn forward_only(
        &mut self,
        model: &[f64],
        sink: &mut dyn ProgressSink,
    ) -> GravResult<Vec<f64>> {
        GravError::check_size("model", self.kernel.n_cells(), model.len())?;
        let start = Instant::now();

        let fields = match self.backend {
            ParallelBackend::TaskGraph => self
                .receivers
                .par_iter()
                .map(|&rx| self.kernel.forward_dot(rx, model))
                .collect(),
            ParallelBackend::WorkerPool => {
                let pool = self.build_pool()?;
                pool.install(|| {
                    self.receivers
                        .par_iter()
                        .map(|&rx| self.kernel.forward_dot(rx, model))
                        .collect()
                })
            }
            ParallelBackend::Sequential => {
                let total = self.receivers.len();
                let mut tracker = DecileTracker::new();
                let mut fields = Vec::with_capacity(total);
                for (i, &rx) in self.receivers.iter().enumerate() {
                    fields.push(self.kernel.forward_dot(rx, model));
                    tracker.advance(i, total, sink);
                }
                fields
            }
        };

        self.metrics.record(self.receivers.len(), start.elapsed());
        Ok(fields)
    }

    // =========================================================================
    // 执行策略
    // =========================================================================

    /// 任务图并行：每行一个独立任务，索引化迭代保证行序
    fn rows_task_graph(&self) -> Vec<Vec<f64>> {
        self.receivers
            .par_iter()
            .map(|&rx| self.kernel.compute_row(rx))
            .collect()
    }

    /// 线程池并行：显式规模的池内执行，结果按提交顺序收集
    fn rows_worker_pool(&self) -> GravResult<Vec<Vec<f64>>> {
        let pool = self.build_pool()?;
        Ok(pool.install(|| {
            self.receivers
                .par_iter()
                .map(|&rx| self.kernel.compute_row(rx))
                .collect()
        }))
    }

    /// 串行：逐行计算并按十分位上报进度
    fn rows_sequential(&self, sink: &mut dyn ProgressSink) -> Vec<Vec<f64>> {
        let total = self.receivers.len();
        let mut tracker = DecileTracker::new();
        let mut rows = Vec::with_capacity(total);

        for (i, &rx) in self.receivers.iter().enumerate() {
            rows.push(self.kernel.compute_row(rx));
            tracker.advance(i, total, sink);
        }

        rows
    }

    fn build_pool(&self) -> GravResult<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.n_workers)
            .build()
            .map_err(|e| GravError::internal(format!("线程池创建失败: {e}")))
    }
}

// ============================================================
// 测试
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::progress::NullProgress;
    use crate::geometry::{ActiveCells, CellGeometry};
    use crate::types::FieldComponent;
    use std::sync::Arc;

    fn test_kernel() -> RowKernel {
        let active = ActiveCells::all(8);
        let geom = Arc::new(
            CellGeometry::from_tensor(
                &[0.0, 10.0, 20.0],
                &[0.0, 10.0, 20.0],
                &[-20.0, -10.0, 0.0],
                &active,
            )
            .unwrap(),
        );
        RowKernel::new(geom, FieldComponent::Z)
    }

    fn test_receivers() -> Vec<DVec3> {
        (0..6)
            .map(|i| DVec3::new(i as f64 * 3.0, 5.0, 2.0))
            .collect()
    }

    fn assembler(backend: ParallelBackend) -> Assembler {
        let plan = ChunkPlan::resolve(6, 8, 2, 8.0);
        Assembler::new(test_kernel(), test_receivers(), plan, backend, 2)
    }

    #[test]
    fn test_backends_bit_identical() {
        let mut sink = NullProgress;
        let g_task = assembler(ParallelBackend::TaskGraph)
            .assemble(&mut sink)
            .unwrap();
        let g_pool = assembler(ParallelBackend::WorkerPool)
            .assemble(&mut sink)
            .unwrap();
        let g_seq = assembler(ParallelBackend::Sequential)
            .assemble(&mut sink)
            .unwrap();

        // 行核函数是纯函数且行序固定: 逐位一致
        assert_eq!(g_task.as_slice(), g_pool.as_slice());
        assert_eq!(g_task.as_slice(), g_seq.as_slice());
    }

    #[test]
    fn test_row_order_matches_receivers() {
        let mut sink = NullProgress;
        let kernel = test_kernel();
        let receivers = test_receivers();
        let g = assembler(ParallelBackend::TaskGraph)
            .assemble(&mut sink)
            .unwrap();

        for (i, &rx) in receivers.iter().enumerate() {
            assert_eq!(g.row(i), kernel.compute_row(rx).as_slice());
        }
    }

    #[test]
    fn test_sequential_reports_progress() {
        struct Recorder(Vec<u8>);
        impl ProgressSink for Recorder {
            fn on_progress(&mut self, decile: u8) {
                self.0.push(decile);
            }
        }

        let mut rec = Recorder(Vec::new());
        assembler(ParallelBackend::Sequential)
            .assemble(&mut rec)
            .unwrap();

        assert!(!rec.0.is_empty());
        assert!(rec.0.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_metrics_count_rows() {
        let mut sink = NullProgress;
        let mut asm = assembler(ParallelBackend::TaskGraph);
        asm.assemble(&mut sink).unwrap();
        assert_eq!(asm.metrics().rows_computed, 6);
    }

    #[test]
    fn test_forward_only_matches_matrix_product() {
        let mut sink = NullProgress;
        let model = vec![1.0, -0.5, 2.0, 0.0, 0.3, 1.5, -1.0, 0.7];

        let g = assembler(ParallelBackend::TaskGraph)
            .assemble(&mut sink)
            .unwrap();
        let via_matrix = g.mul_vec(&model);

        for backend in [
            ParallelBackend::TaskGraph,
            ParallelBackend::WorkerPool,
            ParallelBackend::Sequential,
        ] {
            let streamed = assembler(backend).forward_only(&model, &mut sink).unwrap();
            for (a, b) in streamed.iter().zip(via_matrix.iter()) {
                assert!((a - b).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_forward_only_size_mismatch() {
        let mut sink = NullProgress;
        let err = assembler(ParallelBackend::TaskGraph)
            .forward_only(&[1.0, 2.0], &mut sink)
            .unwrap_err();
        assert!(matches!(err, GravError::SizeMismatch { .. }));
    }
}
