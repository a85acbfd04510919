// crates/gp_forward/src/matrix.rs

//! 灵敏度矩阵
//!
//! 概念上稠密的 (观测点 × 活动单元) 矩阵 `G`。内存中按行主序存储，
//! 同时携带装配时的分块方案；[`SensitivityMatrix::blocks`] 按行主序
//! 块次序产出不超过规划块形状的子块，供存储层逐块写出。
//!
//! # 运算
//!
//! - [`mul_vec`](SensitivityMatrix::mul_vec): `G·x`（rayon 按行并行）
//! - [`mul_transpose_vec`](SensitivityMatrix::mul_transpose_vec): `Gᵗ·v`
//! - [`col_sum_squares`](SensitivityMatrix::col_sum_squares): 列平方和
//!   （JtJ 对角线的基础项）

use rayon::prelude::*;
use std::ops::Range;

use crate::chunking::ChunkPlan;

/// 灵敏度矩阵（行主序稠密 + 分块元数据）
#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityMatrix {
    data: Vec<f64>,
    n_rows: usize,
    n_cols: usize,
    chunks: ChunkPlan,
}

/// 矩阵子块
///
/// `values` 为块内数据的行主序拷贝，行/列范围指回原矩阵。
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixBlock {
    /// 行范围
    pub rows: Range<usize>,
    /// 列范围
    pub cols: Range<usize>,
    /// 块内数据（行主序）
    pub values: Vec<f64>,
}

impl SensitivityMatrix {
    /// 从有序行集合堆叠
    ///
    /// 行顺序即观测点顺序，调用方保证每行长度一致。
    pub fn from_rows(rows: Vec<Vec<f64>>, n_cols: usize, chunks: ChunkPlan) -> Self {
        let n_rows = rows.len();
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for row in rows {
            debug_assert_eq!(row.len(), n_cols);
            data.extend_from_slice(&row);
        }
        Self {
            data,
            n_rows,
            n_cols,
            chunks,
        }
    }

    /// 行数（观测点数）
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// 列数（活动单元数）
    #[inline]
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// 装配时的分块方案
    #[inline]
    pub fn chunks(&self) -> ChunkPlan {
        self.chunks
    }

    /// 第 `i` 行切片
    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n_cols..(i + 1) * self.n_cols]
    }

    /// 行主序扁平数据
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// 矩阵-向量乘法 `y = G·x`（按行并行）
    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.n_cols);
        self.data
            .par_chunks(self.n_cols.max(1))
            .map(|row| row.iter().zip(x.iter()).map(|(&g, &xi)| g * xi).sum())
            .collect()
    }

    /// 转置矩阵-向量乘法 `y = Gᵗ·v`（按列并行）
    pub fn mul_transpose_vec(&self, v: &[f64]) -> Vec<f64> {
        debug_assert_eq!(v.len(), self.n_rows);
        (0..self.n_cols)
            .into_par_iter()
            .map(|j| {
                (0..self.n_rows)
                    .map(|i| self.data[i * self.n_cols + j] * v[i])
                    .sum()
            })
            .collect()
    }

    /// 列平方和 `sum_i G_ij²`
    pub fn col_sum_squares(&self) -> Vec<f64> {
        (0..self.n_cols)
            .into_par_iter()
            .map(|j| {
                (0..self.n_rows)
                    .map(|i| {
                        let g = self.data[i * self.n_cols + j];
                        g * g
                    })
                    .sum()
            })
            .collect()
    }

    /// 按行主序块次序产出子块
    ///
    /// 每个块的形状不超过分块方案规定的 `row_chunk × col_chunk`。
    pub fn blocks(&self) -> impl Iterator<Item = MatrixBlock> + '_ {
        let row_chunk = self.chunks.row_chunk.max(1);
        let col_chunk = self.chunks.col_chunk.max(1);
        let n_row_blocks = self.n_rows.div_ceil(row_chunk);
        let n_col_blocks = self.n_cols.div_ceil(col_chunk);

        (0..n_row_blocks).flat_map(move |bi| {
            (0..n_col_blocks).map(move |bj| {
                let rows = bi * row_chunk..((bi + 1) * row_chunk).min(self.n_rows);
                let cols = bj * col_chunk..((bj + 1) * col_chunk).min(self.n_cols);

                let mut values = Vec::with_capacity(rows.len() * cols.len());
                for i in rows.clone() {
                    values.extend_from_slice(&self.row(i)[cols.clone()]);
                }

                MatrixBlock {
                    rows,
                    cols,
                    values,
                }
            })
        })
    }

    /// 将子块写回矩阵（存储层加载路径）
    pub fn place_block(&mut self, block: &MatrixBlock) {
        for (bi, i) in block.rows.clone().enumerate() {
            let src = &block.values[bi * block.cols.len()..(bi + 1) * block.cols.len()];
            let dst_start = i * self.n_cols + block.cols.start;
            self.data[dst_start..dst_start + block.cols.len()].copy_from_slice(src);
        }
    }

    /// 全零矩阵（存储层加载前的占位）
    pub fn zeros(n_rows: usize, n_cols: usize, chunks: ChunkPlan) -> Self {
        Self {
            data: vec![0.0; n_rows * n_cols],
            n_rows,
            n_cols,
            chunks,
        }
    }
}

// ============================================================
// 测试
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(row_chunk: usize, col_chunk: usize) -> ChunkPlan {
        ChunkPlan {
            n_chunks: 1,
            row_chunk,
            col_chunk,
        }
    }

    fn sample() -> SensitivityMatrix {
        // [[1, 2, 3], [4, 5, 6]]
        SensitivityMatrix::from_rows(
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
            3,
            plan(2, 3),
        )
    }

    #[test]
    fn test_mul_vec() {
        let m = sample();
        let y = m.mul_vec(&[1.0, 0.0, -1.0]);
        assert_eq!(y, vec![-2.0, -2.0]);
    }

    #[test]
    fn test_mul_transpose_vec() {
        let m = sample();
        let y = m.mul_transpose_vec(&[1.0, -1.0]);
        assert_eq!(y, vec![-3.0, -3.0, -3.0]);
    }

    #[test]
    fn test_col_sum_squares() {
        let m = sample();
        let s = m.col_sum_squares();
        assert_eq!(s, vec![17.0, 29.0, 45.0]);
    }

    #[test]
    fn test_blocks_cover_matrix_within_chunk_shape() {
        let m = SensitivityMatrix::from_rows(
            (0..5)
                .map(|i| (0..7).map(|j| (i * 7 + j) as f64).collect())
                .collect(),
            7,
            plan(2, 3),
        );

        let mut covered = vec![false; 5 * 7];
        for block in m.blocks() {
            assert!(block.rows.len() <= 2);
            assert!(block.cols.len() <= 3);
            assert_eq!(block.values.len(), block.rows.len() * block.cols.len());

            for (bi, i) in block.rows.clone().enumerate() {
                for (bj, j) in block.cols.clone().enumerate() {
                    let v = block.values[bi * block.cols.len() + bj];
                    assert_eq!(v, (i * 7 + j) as f64);
                    covered[i * 7 + j] = true;
                }
            }
        }
        assert!(covered.iter().all(|&c| c));
    }

    #[test]
    fn test_place_block_roundtrip() {
        let m = SensitivityMatrix::from_rows(
            (0..4)
                .map(|i| (0..4).map(|j| (i * 4 + j) as f64).collect())
                .collect(),
            4,
            plan(3, 2),
        );

        let mut rebuilt = SensitivityMatrix::zeros(4, 4, m.chunks());
        for block in m.blocks() {
            rebuilt.place_block(&block);
        }
        assert_eq!(rebuilt, m);
    }

    #[test]
    fn test_row_access() {
        let m = sample();
        assert_eq!(m.row(1), &[4.0, 5.0, 6.0]);
    }
}
