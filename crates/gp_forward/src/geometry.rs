// crates/gp_forward/src/geometry.rs

//! 几何适配层
//!
//! 将外部网格的单元角点表示与活动单元掩码转换为行核函数所需的
//! 扁平角点数组：每个坐标轴一个 `[lo, hi]` 对，仅保留活动单元，
//! 顺序与活动单元索引列表一致。
//!
//! # 设计原则
//!
//! 1. **纯变换**: 无副作用，构建后不可变
//! 2. **顺序保持**: 活动单元顺序定义灵敏度矩阵的列序
//! 3. **尽早失败**: 活动单元选择器引用网格外索引时在构建期报错
//!
//! # 单元排序约定
//!
//! 张量网格路径下单元按 x 最快、y 次之、z 最慢排列
//! （索引 = ix + nx·(iy + ny·iz)）。

use glam::DVec3;
use gp_foundation::{ensure, GravError, GravResult};

use crate::types::EQUIV_SOURCE_EXTENSION;

// ============================================================
// 活动单元投影
// ============================================================

/// 活动单元投影器
///
/// 从全网格单元索引到活动单元索引的稀疏映射。每次装配构建一次，
/// 之后不可变。仅用于把几何与模型向量限制到活动单元。
#[derive(Debug, Clone)]
pub struct ActiveCells {
    /// 活动单元的全网格索引（顺序即列序）
    indices: Vec<usize>,
    /// 全网格单元总数
    n_full: usize,
}

impl ActiveCells {
    /// 从布尔掩码构建（true = 活动）
    pub fn from_mask(mask: &[bool]) -> Self {
        let indices = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &active)| active.then_some(i))
            .collect();
        Self {
            indices,
            n_full: mask.len(),
        }
    }

    /// 从显式索引列表构建
    ///
    /// 列表顺序保持不变。引用 `0..n_full` 之外的索引时返回
    /// [`GravError::IndexOutOfBounds`]。
    pub fn from_indices(indices: Vec<usize>, n_full: usize) -> GravResult<Self> {
        for &idx in &indices {
            GravError::check_index("ActiveCell", idx, n_full)?;
        }
        Ok(Self { indices, n_full })
    }

    /// 全部单元均为活动
    pub fn all(n_full: usize) -> Self {
        Self {
            indices: (0..n_full).collect(),
            n_full,
        }
    }

    /// 活动单元数量
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// 是否没有活动单元
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// 全网格单元总数
    #[inline]
    pub fn n_full(&self) -> usize {
        self.n_full
    }

    /// 活动单元的全网格索引
    #[inline]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

// ============================================================
// 单元几何
// ============================================================

/// 活动单元棱柱几何
///
/// 每个活动单元三对标量 `(lo, hi)`，定义一个轴对齐棱柱。
/// 不变量：每轴 `lo <= hi`；退化单元（零体积）允许存在，响应为零。
#[derive(Debug, Clone, PartialEq)]
pub struct CellGeometry {
    /// x 轴下/上角点坐标，按活动单元排列
    pub x: Vec<[f64; 2]>,
    /// y 轴下/上角点坐标
    pub y: Vec<[f64; 2]>,
    /// z 轴下/上角点坐标
    pub z: Vec<[f64; 2]>,
}

impl CellGeometry {
    /// 从张量网格的节点坐标向量构建
    ///
    /// `xn`/`yn`/`zn` 是各轴的节点位置（长度 = 单元数 + 1），
    /// 单元按 x 最快排列。活动单元选择器引用的全网格单元数
    /// 必须等于 `(xn-1)·(yn-1)·(zn-1)`。
    pub fn from_tensor(
        xn: &[f64],
        yn: &[f64],
        zn: &[f64],
        active: &ActiveCells,
    ) -> GravResult<Self> {
        ensure!(
            xn.len() >= 2 && yn.len() >= 2 && zn.len() >= 2,
            GravError::invalid_input("张量网格每轴至少需要 2 个节点")
        );

        let (nx, ny, nz) = (xn.len() - 1, yn.len() - 1, zn.len() - 1);
        GravError::check_size("active.n_full", nx * ny * nz, active.n_full())?;

        let n = active.len();
        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        let mut z = Vec::with_capacity(n);

        for &cell in active.indices() {
            let ix = cell % nx;
            let iy = (cell / nx) % ny;
            let iz = cell / (nx * ny);
            x.push([xn[ix], xn[ix + 1]]);
            y.push([yn[iy], yn[iy + 1]]);
            z.push([zn[iz], zn[iz + 1]]);
        }

        Ok(Self { x, y, z })
    }

    /// 从逐单元角点对构建（树网格等非结构化路径）
    ///
    /// `lo`/`hi` 为全网格每单元的下/上角点，长度必须一致
    /// 且等于活动单元选择器的全网格单元数。
    pub fn from_corners(lo: &[DVec3], hi: &[DVec3], active: &ActiveCells) -> GravResult<Self> {
        GravError::check_size("corners.hi", lo.len(), hi.len())?;
        GravError::check_size("active.n_full", lo.len(), active.n_full())?;

        let n = active.len();
        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        let mut z = Vec::with_capacity(n);

        for &cell in active.indices() {
            x.push([lo[cell].x, hi[cell].x]);
            y.push([lo[cell].y, hi[cell].y]);
            z.push([lo[cell].z, hi[cell].z]);
        }

        Ok(Self { x, y, z })
    }

    /// 活动单元数量
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.x.len()
    }

    /// 等效源层模式：每个单元的 z 下界下延固定距离，近似半无限板
    pub fn with_equivalent_source_layer(mut self) -> Self {
        for pair in &mut self.z {
            pair[0] -= EQUIV_SOURCE_EXTENSION;
        }
        self
    }
}

// ============================================================
// 测试
// ============================================================
