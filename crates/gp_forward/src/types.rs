// crates/gp_forward/src/types.rs

//! 核心类型定义
//!
//! 提供正演建模的基础类型：
//! - 物理常数（工作单位制下的万有引力常数）
//! - [`FieldComponent`]: 请求的场分量
//! - [`ParallelBackend`]: 并行执行后端（封闭枚举，而非运行时字符串分发）
//! - [`ForwardConfig`]: 正演配置及其构建器
//!
//! # 单位约定
//!
//! 密度使用 g/cc，响应使用 mGal。两者合并为一个固定的换算系数
//! [`NEWTON_G_MGAL`]，在行核函数中一次性乘入。

use gp_foundation::{GravError, GravResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================
// 物理常数
// ============================================================

/// 万有引力常数 [m³/(kg·s²)]
pub const G_SI: f64 = 6.674_30e-11;

/// 工作单位制下的引力常数
///
/// 密度 g/cc (1e-3) 与响应 mGal (1e-5) 的换算合并为 1e8 因子。
pub const NEWTON_G_MGAL: f64 = G_SI * 1.0e8;

/// 核函数奇异性正则化偏移
///
/// 观测点恰好落在单元面/棱/角点上时，对数与反正切项出现精确零奇异。
/// 在每个分母内加入该偏移以局部恢复，不作为错误上报。
pub const KERNEL_EPS: f64 = 1e-8;

/// 等效源层的底面下延距离 [m]
///
/// 等效源模式下将每个单元的 z 下界向下延伸该距离，近似半无限板。
pub const EQUIV_SOURCE_EXTENSION: f64 = 1000.0;

// ============================================================
// 场分量
// ============================================================

/// 请求的重力场分量
///
/// 闭式解按坐标轴轮换，三个分量共享同一套角点求和结构。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldComponent {
    /// x 方向分量
    X,
    /// y 方向分量
    Y,
    /// z 方向分量（垂直分量，最常用）
    #[default]
    Z,
}

impl FieldComponent {
    /// 允许的标识符集合（配置表面用）
    pub const ALLOWED: &'static [&'static str] = &["x", "y", "z"];

    /// 从配置字符串解析
    pub fn parse(name: &str) -> GravResult<Self> {
        match name {
            "x" => Ok(Self::X),
            "y" => Ok(Self::Y),
            "z" => Ok(Self::Z),
            other => Err(GravError::invalid_config(
                "component",
                other,
                format!("允许的取值: {:?}", Self::ALLOWED),
            )),
        }
    }
}

// ============================================================
// 并行后端
// ============================================================

/// 并行执行后端
///
/// # 策略说明
///
/// - `TaskGraph`: 每个观测点的行作为独立工作单元调度（rayon 任务窃取），
///   结果按观测点顺序收集
/// - `WorkerPool`: 固定规模的工作线程池，结果按提交顺序收集
/// - `Sequential`: 逐行串行计算，按十分位上报进度
///
/// 行核函数是纯函数且堆叠顺序由观测点索引固定，三种后端对相同输入
/// 产生逐位一致的输出。后端选择只是性能/资源旋钮，不影响正确性。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParallelBackend {
    /// 任务图并行
    #[default]
    TaskGraph,
    /// 工作线程池并行
    WorkerPool,
    /// 串行执行（带进度上报）
    Sequential,
}

impl ParallelBackend {
    /// 允许的标识符集合（配置表面用）
    pub const ALLOWED: &'static [&'static str] = &["task-graph", "worker-pool", "none"];

    /// 从配置字符串解析
    ///
    /// 无法识别的标识符返回 [`GravError::InvalidConfig`]，
    /// 错误信息中包含非法值与允许的取值集合。
    pub fn parse(name: &str) -> GravResult<Self> {
        match name {
            "task-graph" => Ok(Self::TaskGraph),
            "worker-pool" => Ok(Self::WorkerPool),
            "none" => Ok(Self::Sequential),
            other => Err(GravError::invalid_config(
                "parallelized",
                other,
                format!("允许的取值: {:?}", Self::ALLOWED),
            )),
        }
    }

    /// 配置标识符
    pub fn name(&self) -> &'static str {
        match self {
            Self::TaskGraph => "task-graph",
            Self::WorkerPool => "worker-pool",
            Self::Sequential => "none",
        }
    }
}

// ============================================================
// 正演配置
// ============================================================

/// 正演配置
///
/// 所有字段均有默认值，通常通过 [`ForwardConfig::builder`] 构造。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardConfig {
    /// 并行后端
    pub backend: ParallelBackend,
    /// 工作线程数（None 表示使用主机可用并行度）
    pub n_workers: Option<usize>,
    /// 内存预算上限 [GB]
    pub max_ram_gb: f64,
    /// 灵敏度矩阵持久化路径
    pub store_path: Option<PathBuf>,
    /// 是否在装配成功后持久化
    pub store_sensitivity: bool,
    /// 前向流式模式：不物化灵敏度矩阵，逐观测点归约
    pub forward_only: bool,
    /// 等效源层模式：单元 z 下界下延，近似半无限板
    pub equivalent_source_layer: bool,
    /// 请求的场分量
    pub component: FieldComponent,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            backend: ParallelBackend::default(),
            n_workers: None,
            max_ram_gb: 8.0,
            store_path: None,
            store_sensitivity: true,
            forward_only: false,
            equivalent_source_layer: false,
            component: FieldComponent::Z,
        }
    }
}

impl ForwardConfig {
    /// 创建构建器
    pub fn builder() -> ForwardConfigBuilder {
        ForwardConfigBuilder::default()
    }

    /// 实际工作线程数（未指定时取主机可用并行度，下限 1）
    pub fn resolve_workers(&self) -> usize {
        self.n_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// 配置构建器
#[derive(Default)]
pub struct ForwardConfigBuilder {
    config: ForwardConfig,
}

impl ForwardConfigBuilder {
    /// 设置并行后端
    pub fn backend(mut self, backend: ParallelBackend) -> Self {
        self.config.backend = backend;
        self
    }

    /// 从配置字符串设置并行后端
    pub fn backend_name(mut self, name: &str) -> GravResult<Self> {
        self.config.backend = ParallelBackend::parse(name)?;
        Ok(self)
    }

    /// 设置工作线程数
    pub fn n_workers(mut self, n: usize) -> Self {
        self.config.n_workers = Some(n);
        self
    }

    /// 设置内存预算 [GB]
    pub fn max_ram_gb(mut self, gb: f64) -> Self {
        self.config.max_ram_gb = gb;
        self
    }

    /// 设置持久化路径
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.store_path = Some(path.into());
        self
    }

    /// 设置是否持久化
    pub fn store_sensitivity(mut self, enable: bool) -> Self {
        self.config.store_sensitivity = enable;
        self
    }

    /// 设置前向流式模式
    pub fn forward_only(mut self, enable: bool) -> Self {
        self.config.forward_only = enable;
        self
    }

    /// 设置等效源层模式
    pub fn equivalent_source_layer(mut self, enable: bool) -> Self {
        self.config.equivalent_source_layer = enable;
        self
    }

    /// 设置场分量
    pub fn component(mut self, component: FieldComponent) -> Self {
        self.config.component = component;
        self
    }

    /// 构建配置
    pub fn build(self) -> ForwardConfig {
        self.config
    }
}

// ============================================================
// 测试
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!(
            ParallelBackend::parse("task-graph").unwrap(),
            ParallelBackend::TaskGraph
        );
        assert_eq!(
            ParallelBackend::parse("worker-pool").unwrap(),
            ParallelBackend::WorkerPool
        );
        assert_eq!(
            ParallelBackend::parse("none").unwrap(),
            ParallelBackend::Sequential
        );
    }

    #[test]
    fn test_backend_parse_invalid_names_value_and_allowed() {
        let err = ParallelBackend::parse("spark").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("spark"));
        assert!(msg.contains("task-graph"));
        assert!(msg.contains("worker-pool"));
        assert!(msg.contains("none"));
    }

    #[test]
    fn test_component_parse() {
        assert_eq!(FieldComponent::parse("z").unwrap(), FieldComponent::Z);
        assert!(FieldComponent::parse("w").is_err());
    }

    #[test]
    fn test_config_default() {
        let config = ForwardConfig::default();
        assert_eq!(config.backend, ParallelBackend::TaskGraph);
        assert!((config.max_ram_gb - 8.0).abs() < 1e-12);
        assert!(config.store_sensitivity);
        assert!(!config.forward_only);
        assert_eq!(config.component, FieldComponent::Z);
    }

    #[test]
    fn test_config_builder() {
        let config = ForwardConfig::builder()
            .backend(ParallelBackend::Sequential)
            .n_workers(2)
            .max_ram_gb(0.5)
            .forward_only(true)
            .component(FieldComponent::X)
            .build();

        assert_eq!(config.backend, ParallelBackend::Sequential);
        assert_eq!(config.n_workers, Some(2));
        assert!((config.max_ram_gb - 0.5).abs() < 1e-12);
        assert!(config.forward_only);
        assert_eq!(config.component, FieldComponent::X);
    }

    #[test]
    fn test_resolve_workers() {
        let config = ForwardConfig::builder().n_workers(3).build();
        assert_eq!(config.resolve_workers(), 3);

        let config = ForwardConfig::default();
        assert!(config.resolve_workers() >= 1);
    }

    #[test]
    fn test_newton_g_scale() {
        // 6.6743e-11 * 1e8 = 6.6743e-3
        assert!((NEWTON_G_MGAL - 6.674_30e-3).abs() < 1e-12);
    }
}
