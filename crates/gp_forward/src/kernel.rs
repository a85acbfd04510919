// crates/gp_forward/src/kernel.rs

//! 行核函数
//!
//! 对单个观测点计算全部活动单元的解析重力响应（灵敏度矩阵的一行）。
//!
//! # 闭式解
//!
//! 轴对齐棱柱的位场响应是其八个角点上对数与反正切项的带符号和，
//! 角点 `(a, b, c) ∈ {0,1}³` 的符号为 `(-1)^(a+b+c)`。三个场分量
//! 共享同一结构，按坐标轴轮换。每个对数自变量与反正切分母内加入
//! [`KERNEL_EPS`]，观测点恰好落在单元边界上时局部恢复，不报错。
//!
//! # 确定性
//!
//! 一行是观测点与几何的纯函数，与其他行、分块方式、执行顺序无关。
//! 这是并行装配逐位一致性的基础。

use glam::DVec3;
use std::sync::Arc;

use crate::geometry::CellGeometry;
use crate::types::{FieldComponent, KERNEL_EPS, NEWTON_G_MGAL};

/// 行核函数
///
/// 持有活动单元几何的共享引用，可在工作线程间只读共享。
#[derive(Debug, Clone)]
pub struct RowKernel {
    geometry: Arc<CellGeometry>,
    component: FieldComponent,
}

impl RowKernel {
    /// 创建核函数
    pub fn new(geometry: Arc<CellGeometry>, component: FieldComponent) -> Self {
        Self {
            geometry,
            component,
        }
    }

    /// 活动单元数量（行长度）
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.geometry.n_cells()
    }

    /// 单元几何
    #[inline]
    pub fn geometry(&self) -> &Arc<CellGeometry> {
        &self.geometry
    }

    /// 场分量
    #[inline]
    pub fn component(&self) -> FieldComponent {
        self.component
    }

    /// 计算观测点 `rx` 的完整行（长度 = 活动单元数）
    pub fn compute_row(&self, rx: DVec3) -> Vec<f64> {
        (0..self.n_cells())
            .map(|cell| self.cell_response(cell, rx))
            .collect()
    }

    /// 前向流式模式：行与模型向量的点积，不存储行本身
    ///
    /// 累加次序与 `compute_row` 后接点积一致，两条路径数值相同。
    pub fn forward_dot(&self, rx: DVec3, model: &[f64]) -> f64 {
        debug_assert_eq!(model.len(), self.n_cells());
        (0..self.n_cells())
            .map(|cell| self.cell_response(cell, rx) * model[cell])
            .sum()
    }

    /// 单个棱柱单元对观测点的解析响应
    ///
    /// 位移约定沿用闭式解的推导：`dx = x_n − x0`，`dy = y_n − y0`，
    /// `dz = z0 − z_n`，角点累加和取负后乘以工作单位制引力常数。
    fn cell_response(&self, cell: usize, rx: DVec3) -> f64 {
        let g = &self.geometry;
        let dx = [g.x[cell][0] - rx.x, g.x[cell][1] - rx.x];
        let dy = [g.y[cell][0] - rx.y, g.y[cell][1] - rx.y];
        let dz = [rx.z - g.z[cell][0], rx.z - g.z[cell][1]];

        let mut sum = 0.0;
        for a in 0..2 {
            for b in 0..2 {
                for c in 0..2 {
                    let sign = if (a + b + c) % 2 == 0 { 1.0 } else { -1.0 };
                    let r = (dx[a] * dx[a] + dy[b] * dy[b] + dz[c] * dz[c]).sqrt();

                    let term = match self.component {
                        FieldComponent::X => {
                            dy[b] * (dz[c] + r + KERNEL_EPS).ln()
                                + dz[c] * (dy[b] + r + KERNEL_EPS).ln()
                                - dx[a] * (dy[b] * dz[c] / (dx[a] * r + KERNEL_EPS)).atan()
                        }
                        FieldComponent::Y => {
                            dx[a] * (dz[c] + r + KERNEL_EPS).ln()
                                + dz[c] * (dx[a] + r + KERNEL_EPS).ln()
                                - dy[b] * (dx[a] * dz[c] / (dy[b] * r + KERNEL_EPS)).atan()
                        }
                        FieldComponent::Z => {
                            dx[a] * (dy[b] + r + KERNEL_EPS).ln()
                                + dy[b] * (dx[a] + r + KERNEL_EPS).ln()
                                - dz[c] * (dx[a] * dy[b] / (dz[c] * r + KERNEL_EPS)).atan()
                        }
                    };

                    sum += sign * term;
                }
            }
        }

        -NEWTON_G_MGAL * sum
    }
}

// ============================================================
// 测试
// ============================================================
