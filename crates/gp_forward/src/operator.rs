// crates/gp_forward/src/operator.rs

//! 线性算子门面
//!
//! 向反演驱动暴露正演算子的标准契约：
//! - [`fields`](GravityOperator::fields): `G·m`（前向流式模式下逐观测点归约，不物化 G）
//! - [`jvec`](GravityOperator::jvec): `G·(dMap·v)`
//! - [`jtvec`](GravityOperator::jtvec): `dMapᵗ·(Gᵗ·v)`
//! - [`get_j`](GravityOperator::get_j): 稠密 `G·dMap`
//! - [`jtj_diag`](GravityOperator::jtj_diag): 高斯-牛顿曲率对角近似
//!
//! # 状态机
//!
//! 灵敏度矩阵为显式记忆化状态：
//!
//! ```text
//! Unbuilt ─(存储命中)─> Ready(loaded)
//! Unbuilt ─> Building ─(可选持久化)─> Ready(assembled)
//! ```
//!
//! 构建入口唯一（[`sensitivity`](GravityOperator::sensitivity)），
//! 到达 `Ready` 后对实例生命周期终态，不暴露失效路径。
//! 任何访问前必须先绑定观测点，否则返回 [`GravError::NotPaired`]。

use glam::DVec3;
use gp_foundation::{ensure, require, GravError, GravResult};
use std::sync::Arc;

use crate::chunking::ChunkPlan;
use crate::engine::assembler::{Assembler, AssemblyMetrics};
use crate::engine::progress::LogProgress;
use crate::geometry::CellGeometry;
use crate::kernel::RowKernel;
use crate::matrix::SensitivityMatrix;
use crate::storage::SensitivityStorage;
use crate::types::ForwardConfig;

// ============================================================
// 模型映射
// ============================================================

/// 模型映射及其导数
///
/// 反演驱动侧注入：把反演参数向量映射为逐活动单元的密度，
/// 并提供映射导数 `D = dMap/dm` 的矩阵自由作用。
pub trait ModelMapping: Send + Sync {
    /// 反演参数个数
    fn n_params(&self) -> usize;

    /// 映射为密度向量（长度 = 活动单元数）
    fn map(&self, m: &[f64]) -> GravResult<Vec<f64>>;

    /// 导数作用 `D·v`（参数空间 → 单元空间）
    fn deriv_mul(&self, m: &[f64], v: &[f64]) -> GravResult<Vec<f64>>;

    /// 转置导数作用 `Dᵗ·v`（单元空间 → 参数空间）
    fn deriv_transpose_mul(&self, m: &[f64], v: &[f64]) -> GravResult<Vec<f64>>;

    /// `diag(Dᵗ·diag(w)·D)`，`w` 按活动单元索引
    ///
    /// JtJ 对角线的映射侧项。实现方按自身稀疏结构计算。
    fn weighted_squared_column_sums(&self, m: &[f64], weights: &[f64]) -> GravResult<Vec<f64>>;
}

/// 恒等映射：参数即逐单元密度
#[derive(Debug, Clone)]
pub struct IdentityMapping {
    n: usize,
}

impl IdentityMapping {
    /// 创建 `n` 个活动单元的恒等映射
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl ModelMapping for IdentityMapping {
    fn n_params(&self) -> usize {
        self.n
    }

    fn map(&self, m: &[f64]) -> GravResult<Vec<f64>> {
        GravError::check_size("model", self.n, m.len())?;
        Ok(m.to_vec())
    }

    fn deriv_mul(&self, _m: &[f64], v: &[f64]) -> GravResult<Vec<f64>> {
        GravError::check_size("v", self.n, v.len())?;
        Ok(v.to_vec())
    }

    fn deriv_transpose_mul(&self, _m: &[f64], v: &[f64]) -> GravResult<Vec<f64>> {
        GravError::check_size("v", self.n, v.len())?;
        Ok(v.to_vec())
    }

    fn weighted_squared_column_sums(&self, _m: &[f64], weights: &[f64]) -> GravResult<Vec<f64>> {
        GravError::check_size("weights", self.n, weights.len())?;
        Ok(weights.to_vec())
    }
}

// ============================================================
// 灵敏度矩阵状态
// ============================================================

/// 灵敏度矩阵的记忆化状态
#[derive(Debug, Default)]
enum SensitivityState {
    /// 尚未构建
    #[default]
    Unbuilt,
    /// 构建中（捕获重入）
    Building,
    /// 已构建，对实例生命周期终态
    Ready(Arc<SensitivityMatrix>),
}

// ============================================================
// 重力正演算子
// ============================================================

/// 积分形式重力正演算子
pub struct GravityOperator<M: ModelMapping> {
    geometry: Arc<CellGeometry>,
    config: ForwardConfig,
    mapping: M,
    storage: Option<Box<dyn SensitivityStorage>>,
    receivers: Option<Vec<DVec3>>,
    state: SensitivityState,
    gtg_diag: Option<Vec<f64>>,
    metrics: AssemblyMetrics,
}

impl<M: ModelMapping> GravityOperator<M> {
    /// 创建算子
    ///
    /// 等效源层模式在此处施加到几何上（单元 z 下界下延）。
    pub fn new(geometry: CellGeometry, config: ForwardConfig, mapping: M) -> Self {
        let geometry = if config.equivalent_source_layer {
            geometry.with_equivalent_source_layer()
        } else {
            geometry
        };

        Self {
            geometry: Arc::new(geometry),
            config,
            mapping,
            storage: None,
            receivers: None,
            state: SensitivityState::Unbuilt,
            gtg_diag: None,
            metrics: AssemblyMetrics::default(),
        }
    }

    /// 挂接存储端口（文件实现见 gp_io）
    pub fn with_storage(mut self, storage: Box<dyn SensitivityStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// 绑定观测点
    ///
    /// 观测点顺序定义灵敏度矩阵的行序。矩阵构建后不允许重新绑定。
    pub fn bind_receivers(&mut self, receivers: Vec<DVec3>) -> GravResult<()> {
        ensure!(
            matches!(self.state, SensitivityState::Unbuilt),
            GravError::internal("灵敏度矩阵已构建，不允许重新绑定观测点")
        );
        self.receivers = Some(receivers);
        Ok(())
    }

    /// 活动单元几何
    #[inline]
    pub fn geometry(&self) -> &Arc<CellGeometry> {
        &self.geometry
    }

    /// 装配指标（存储命中时 `rows_computed` 为 0）
    #[inline]
    pub fn metrics(&self) -> &AssemblyMetrics {
        &self.metrics
    }

    // =========================================================================
    // 灵敏度矩阵（记忆化构建入口）
    // =========================================================================

    /// 灵敏度矩阵 `G`
    ///
    /// 首次访问时构建并缓存；存储命中时直接加载，跳过行核函数。
    /// 阻塞直至装配（或加载）完成，无部分可用性。
    pub fn sensitivity(&mut self) -> GravResult<Arc<SensitivityMatrix>> {
        ensure!(self.receivers.is_some(), GravError::NotPaired);

        match &self.state {
            SensitivityState::Ready(g) => return Ok(g.clone()),
            SensitivityState::Building => {
                return Err(GravError::internal("灵敏度矩阵构建重入"));
            }
            SensitivityState::Unbuilt => {}
        }

        self.state = SensitivityState::Building;
        match self.build_sensitivity() {
            Ok(g) => {
                self.state = SensitivityState::Ready(g.clone());
                Ok(g)
            }
            Err(e) => {
                self.state = SensitivityState::Unbuilt;
                Err(e)
            }
        }
    }

    fn build_sensitivity(&mut self) -> GravResult<Arc<SensitivityMatrix>> {
        let receivers = self.receivers.clone().unwrap_or_default();

        // 存在性缓存: 命中即加载，跳过重建
        if let Some(storage) = &self.storage {
            if storage.exists() {
                log::info!("灵敏度矩阵存储命中，从磁盘加载");
                let g = storage.load()?;
                GravError::check_size("store.n_rows", receivers.len(), g.n_rows())?;
                GravError::check_size("store.n_cols", self.geometry.n_cells(), g.n_cols())?;
                return Ok(Arc::new(g));
            }
        }

        let n_workers = self.config.resolve_workers();
        let plan = ChunkPlan::resolve(
            receivers.len(),
            self.geometry.n_cells(),
            n_workers,
            self.config.max_ram_gb,
        );

        let kernel = RowKernel::new(self.geometry.clone(), self.config.component);
        let mut assembler =
            Assembler::new(kernel, receivers, plan, self.config.backend, n_workers);

        let mut sink = LogProgress;
        let g = assembler.assemble(&mut sink)?;
        self.metrics = *assembler.metrics();

        // 存储仅在完整装配成功后写入（原子性由实现保证）
        if self.config.store_sensitivity {
            if let Some(storage) = &self.storage {
                storage.store(&g)?;
                log::info!("灵敏度矩阵已持久化");
            }
        }

        Ok(Arc::new(g))
    }

    // =========================================================================
    // 算子契约
    // =========================================================================

    /// 模型响应 `d = G·map(m)`
    ///
    /// 前向流式模式下逐观测点计算标量响应，从不物化 `G`。
    pub fn fields(&mut self, m: &[f64]) -> GravResult<Vec<f64>> {
        let density = self.mapping.map(m)?;
        GravError::check_size("density", self.geometry.n_cells(), density.len())?;

        if self.config.forward_only {
            let receivers = require!(self.receivers.as_ref(), GravError::NotPaired).clone();
            let n_workers = self.config.resolve_workers();
            let plan = ChunkPlan::resolve(
                receivers.len(),
                self.geometry.n_cells(),
                n_workers,
                self.config.max_ram_gb,
            );
            let kernel = RowKernel::new(self.geometry.clone(), self.config.component);
            let mut assembler =
                Assembler::new(kernel, receivers, plan, self.config.backend, n_workers);
            let mut sink = LogProgress;
            let fields = assembler.forward_only(&density, &mut sink)?;
            self.metrics = *assembler.metrics();
            Ok(fields)
        } else {
            let g = self.sensitivity()?;
            Ok(g.mul_vec(&density))
        }
    }

    /// 雅可比-向量积 `J·v = G·(D·v)`
    pub fn jvec(&mut self, m: &[f64], v: &[f64]) -> GravResult<Vec<f64>> {
        let dv = self.mapping.deriv_mul(m, v)?;
        GravError::check_size("deriv_mul", self.geometry.n_cells(), dv.len())?;
        let g = self.sensitivity()?;
        Ok(g.mul_vec(&dv))
    }

    /// 转置雅可比-向量积 `Jᵗ·v = Dᵗ·(Gᵗ·v)`
    pub fn jtvec(&mut self, m: &[f64], v: &[f64]) -> GravResult<Vec<f64>> {
        let g = self.sensitivity()?;
        GravError::check_size("v", g.n_rows(), v.len())?;
        let gtv = g.mul_transpose_vec(v);
        self.mapping.deriv_transpose_mul(m, &gtv)
    }

    /// 稠密雅可比 `J = G·D`
    ///
    /// 第 `i` 行为 `Dᵗ·gᵢ`。恒等映射下等于 `G` 本身。
    pub fn get_j(&mut self, m: &[f64]) -> GravResult<SensitivityMatrix> {
        let g = self.sensitivity()?;
        let n_params = self.mapping.n_params();

        let mut rows = Vec::with_capacity(g.n_rows());
        for i in 0..g.n_rows() {
            rows.push(self.mapping.deriv_transpose_mul(m, g.row(i))?);
        }

        let plan = ChunkPlan::resolve(
            g.n_rows(),
            n_params,
            self.config.resolve_workers(),
            self.config.max_ram_gb,
        );
        Ok(SensitivityMatrix::from_rows(rows, n_params, plan))
    }

    /// JtJ 对角近似 `diag(Dᵗ·diag(colSumSquares(G))·D)`
    ///
    /// 列平方和项只依赖 `G`，不依赖 `m`，跨调用缓存。
    /// `weights` 仅做尺寸校验，不参与返回值：对角线始终基于未加权的
    /// 列平方和。
    pub fn jtj_diag(&mut self, m: &[f64], weights: Option<&[f64]>) -> GravResult<Vec<f64>> {
        if let Some(w) = weights {
            let g = self.sensitivity()?;
            GravError::check_size("weights", g.n_rows(), w.len())?;
        }

        if self.gtg_diag.is_none() {
            let g = self.sensitivity()?;
            self.gtg_diag = Some(g.col_sum_squares());
        }
        let gtg = self.gtg_diag.clone().unwrap_or_default();

        self.mapping.weighted_squared_column_sums(m, &gtg)
    }
}

// ============================================================
// 测试
// ============================================================
