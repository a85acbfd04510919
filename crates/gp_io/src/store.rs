// crates/gp_io/src/store.rs

//! 灵敏度矩阵文件存储
//!
//! 按路径键控的存在性缓存：路径上存在有效文件即命中，直接加载。
//!
//! # 文件格式 (v1)
//!
//! ```text
//! [魔数: 4 bytes] "GPSM"
//! [版本: u32]
//! [行数: u64]
//! [列数: u64]
//! [分块数: u64]
//! [行块尺寸: u64]
//! [列块尺寸: u64]
//! [块载荷: 按行主序块次序，每块 rows×cols 个 f64]
//! [CRC32: u32]
//! ```
//!
//! # 原子性
//!
//! 写入先落到 `<path>.tmp`，完整刷盘后原子重命名到最终路径。
//! 中断的写入不会在最终路径留下文件，后续运行不可能把截断的
//! 存储误判为缓存命中；残留的 `.tmp` 会在下次写入时被覆盖。

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use gp_foundation::{GravError, GravResult};
use gp_forward::chunking::ChunkPlan;
use gp_forward::matrix::SensitivityMatrix;
use gp_forward::storage::SensitivityStorage;

// ============================================================
// 错误类型
// ============================================================

/// 存储错误
#[derive(Debug)]
pub enum StoreError {
    /// IO 错误
    Io(std::io::Error),
    /// 格式错误
    Format(String),
    /// 版本不兼容
    Version {
        /// 文件中的版本号
        file: u32,
        /// 当前支持的版本号
        current: u32,
    },
    /// 校验和错误
    Checksum {
        /// 文件尾部记录的校验和
        expected: u32,
        /// 重新计算得到的校验和
        found: u32,
    },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "IO 错误: {}", e),
            StoreError::Format(msg) => write!(f, "格式错误: {}", msg),
            StoreError::Version { file, current } => {
                write!(f, "版本不兼容: 文件版本 {}, 当前版本 {}", file, current)
            }
            StoreError::Checksum { expected, found } => {
                write!(f, "校验和错误: 期望 {:08x}, 实际 {:08x}", expected, found)
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<StoreError> for GravError {
    fn from(e: StoreError) -> Self {
        GravError::store(e.to_string())
    }
}

/// 存储操作结果
pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================
// 常量
// ============================================================

/// 存储文件格式版本
const STORE_VERSION: u32 = 1;

/// 存储文件魔数
const STORE_MAGIC: &[u8; 4] = b"GPSM";

/// 最大支持的文件版本
const MAX_SUPPORTED_VERSION: u32 = 1;

/// 头部长度: 魔数 + 版本 + 5 个 u64
const HEADER_LEN: usize = 4 + 4 + 5 * 8;

// ============================================================
// 文件存储
// ============================================================

/// 灵敏度矩阵文件存储
#[derive(Debug, Clone)]
pub struct FileSensitivityStore {
    path: PathBuf,
}

impl FileSensitivityStore {
    /// 以给定路径创建
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 存储路径
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 保存矩阵（临时文件 + 原子重命名）
    pub fn save(&self, matrix: &SensitivityMatrix) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let chunks = matrix.chunks();
        let mut data = Vec::with_capacity(HEADER_LEN + matrix.as_slice().len() * 8);

        data.extend_from_slice(STORE_MAGIC);
        data.extend_from_slice(&STORE_VERSION.to_le_bytes());
        data.extend_from_slice(&(matrix.n_rows() as u64).to_le_bytes());
        data.extend_from_slice(&(matrix.n_cols() as u64).to_le_bytes());
        data.extend_from_slice(&(chunks.n_chunks as u64).to_le_bytes());
        data.extend_from_slice(&(chunks.row_chunk as u64).to_le_bytes());
        data.extend_from_slice(&(chunks.col_chunk as u64).to_le_bytes());

        // 块载荷按行主序块次序写出，每块不超过规划的块形状
        for block in matrix.blocks() {
            for &v in &block.values {
                data.extend_from_slice(&v.to_le_bytes());
            }
        }

        let temp_path = self.path.with_extension("tmp");
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&data)?;

            let crc = compute_crc32(&data);
            writer.write_all(&crc.to_le_bytes())?;
            writer.flush()?;
        }

        // 原子重命名: 只有完整文件才会出现在最终路径
        std::fs::rename(&temp_path, &self.path)?;

        log::info!(
            "灵敏度矩阵已写入 {} ({}x{}, 块 {}x{})",
            self.path.display(),
            matrix.n_rows(),
            matrix.n_cols(),
            chunks.row_chunk,
            chunks.col_chunk
        );

        Ok(())
    }

    /// 从文件加载矩阵
    pub fn load_matrix(&self) -> StoreResult<SensitivityMatrix> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let mut all_data = Vec::new();
        reader.read_to_end(&mut all_data)?;

        if all_data.len() < HEADER_LEN + 4 {
            return Err(StoreError::Format("文件太小".into()));
        }

        // 分离并验证 CRC
        let crc_offset = all_data.len() - 4;
        let data = &all_data[..crc_offset];
        let stored_crc = u32::from_le_bytes(all_data[crc_offset..].try_into().unwrap());
        let computed_crc = compute_crc32(data);
        if stored_crc != computed_crc {
            return Err(StoreError::Checksum {
                expected: stored_crc,
                found: computed_crc,
            });
        }

        let mut offset = 0;

        if &data[offset..offset + 4] != STORE_MAGIC {
            return Err(StoreError::Format("无效的存储文件魔数".into()));
        }
        offset += 4;

        let version = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap());
        offset += 4;
        if version > MAX_SUPPORTED_VERSION {
            return Err(StoreError::Version {
                file: version,
                current: STORE_VERSION,
            });
        }

        let mut read_u64 = |offset: &mut usize| -> u64 {
            let v = u64::from_le_bytes(data[*offset..*offset + 8].try_into().unwrap());
            *offset += 8;
            v
        };

        let n_rows = read_u64(&mut offset) as usize;
        let n_cols = read_u64(&mut offset) as usize;
        let n_chunks = read_u64(&mut offset) as usize;
        let row_chunk = read_u64(&mut offset) as usize;
        let col_chunk = read_u64(&mut offset) as usize;

        let expected_payload = n_rows * n_cols * 8;
        if data.len() - offset != expected_payload {
            return Err(StoreError::Format(format!(
                "载荷长度不符: 期望 {} 字节, 实际 {} 字节",
                expected_payload,
                data.len() - offset
            )));
        }

        let chunks = ChunkPlan {
            n_chunks: n_chunks.max(1),
            row_chunk: row_chunk.max(1),
            col_chunk: col_chunk.max(1),
        };

        // 按与写出一致的行主序块次序读回
        let mut matrix = SensitivityMatrix::zeros(n_rows, n_cols, chunks);
        let n_row_blocks = n_rows.div_ceil(chunks.row_chunk);
        let n_col_blocks = n_cols.div_ceil(chunks.col_chunk);
        for bi in 0..n_row_blocks {
            for bj in 0..n_col_blocks {
                let rows = bi * chunks.row_chunk..((bi + 1) * chunks.row_chunk).min(n_rows);
                let cols = bj * chunks.col_chunk..((bj + 1) * chunks.col_chunk).min(n_cols);

                let n = rows.len() * cols.len();
                let mut values = Vec::with_capacity(n);
                for _ in 0..n {
                    values.push(f64::from_le_bytes(
                        data[offset..offset + 8].try_into().unwrap(),
                    ));
                    offset += 8;
                }

                matrix.place_block(&gp_forward::matrix::MatrixBlock { rows, cols, values });
            }
        }

        log::info!(
            "灵敏度矩阵已从 {} 加载 ({}x{})",
            self.path.display(),
            n_rows,
            n_cols
        );

        Ok(matrix)
    }
}

impl SensitivityStorage for FileSensitivityStore {
    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn load(&self) -> GravResult<SensitivityMatrix> {
        self.load_matrix().map_err(GravError::from)
    }

    fn store(&self, matrix: &SensitivityMatrix) -> GravResult<()> {
        self.save(matrix).map_err(GravError::from)
    }
}

// ============================================================
// CRC32
// ============================================================

/// CRC32 查找表（编译期计算，IEEE 多项式）
const CRC32_TABLE: [u32; 256] = generate_crc32_table();

const fn generate_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = 0xEDB88320 ^ (crc >> 1);
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

fn compute_crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFFFFFFu32;
    for &byte in data {
        let index = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = CRC32_TABLE[index] ^ (crc >> 8);
    }
    !crc
}

// ============================================================
// 测试
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_matrix() -> SensitivityMatrix {
        let chunks = ChunkPlan {
            n_chunks: 2,
            row_chunk: 2,
            col_chunk: 3,
        };
        SensitivityMatrix::from_rows(
            (0..5)
                .map(|i| (0..7).map(|j| (i * 7 + j) as f64 * 0.5).collect())
                .collect(),
            7,
            chunks,
        )
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSensitivityStore::new(dir.path().join("sensitivity.gpsm"));

        let matrix = sample_matrix();
        assert!(!store.exists());
        store.save(&matrix).unwrap();
        assert!(store.exists());

        let loaded = store.load_matrix().unwrap();
        assert_eq!(loaded, matrix);
    }

    #[test]
    fn test_no_tmp_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensitivity.gpsm");
        let store = FileSensitivityStore::new(&path);

        store.save(&sample_matrix()).unwrap();
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_corrupted_file_rejected_by_crc() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensitivity.gpsm");
        let store = FileSensitivityStore::new(&path);
        store.save(&sample_matrix()).unwrap();

        // 翻转载荷中间一个字节
        let mut bytes = std::fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let err = store.load_matrix().unwrap_err();
        assert!(matches!(err, StoreError::Checksum { .. }));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensitivity.gpsm");
        let store = FileSensitivityStore::new(&path);
        store.save(&sample_matrix()).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] = b'X';
        // 魔数参与 CRC: 同步更新尾部校验和，使其命中格式检查
        let crc_offset = bytes.len() - 4;
        let crc = compute_crc32(&bytes[..crc_offset]);
        bytes[crc_offset..].copy_from_slice(&crc.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        let err = store.load_matrix().unwrap_err();
        assert!(matches!(err, StoreError::Format(_)));
    }

    #[test]
    fn test_future_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensitivity.gpsm");
        let store = FileSensitivityStore::new(&path);
        store.save(&sample_matrix()).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        let crc_offset = bytes.len() - 4;
        let crc = compute_crc32(&bytes[..crc_offset]);
        bytes[crc_offset..].copy_from_slice(&crc.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        let err = store.load_matrix().unwrap_err();
        assert!(matches!(err, StoreError::Version { file: 99, .. }));
    }

    #[test]
    fn test_truncated_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensitivity.gpsm");
        let store = FileSensitivityStore::new(&path);
        store.save(&sample_matrix()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(store.load_matrix().is_err());
    }

    #[test]
    fn test_crc32_known_value() {
        // IEEE CRC32("123456789") = 0xCBF43926
        assert_eq!(compute_crc32(b"123456789"), 0xCBF43926);
    }
}
