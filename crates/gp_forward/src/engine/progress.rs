// crates/gp_forward/src/engine/progress.rs

//! 进度回调
//!
//! 串行装配路径按十分位（10% 边界）上报粗粒度进度。上报契约：
//! 单调不减，同一十分位至多上报一次。进度状态由回调侧持有，
//! 装配器不携带可变计数器。

/// 十分位进度回调
pub trait ProgressSink {
    /// 跨越新的十分位边界时调用一次
    ///
    /// `decile` 取值 0..=9，对应已完成 decile*10 %。
    fn on_progress(&mut self, decile: u8);
}

/// 通过 `log::info!` 上报进度的默认实现
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_progress(&mut self, decile: u8) {
        log::info!("装配进度: {} %", decile as usize * 10);
    }
}

/// 丢弃进度信号（测试与并行路径用）
#[derive(Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn on_progress(&mut self, _decile: u8) {}
}

/// 十分位跟踪器
///
/// 封装"上一次上报的十分位"状态，保证单调且不重复。
#[derive(Debug)]
pub(crate) struct DecileTracker {
    last: i8,
}

impl DecileTracker {
    pub fn new() -> Self {
        Self { last: -1 }
    }

    /// 根据已完成计数推进，必要时触发回调
    pub fn advance(&mut self, done: usize, total: usize, sink: &mut dyn ProgressSink) {
        if total == 0 {
            return;
        }
        let decile = (done * 10 / total).min(9) as i8;
        if decile > self.last {
            self.last = decile;
            sink.on_progress(decile as u8);
        }
    }
}

// ============================================================
// 测试
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        seen: Vec<u8>,
    }

    impl ProgressSink for Recorder {
        fn on_progress(&mut self, decile: u8) {
            self.seen.push(decile);
        }
    }

    #[test]
    fn test_each_decile_reported_once() {
        let mut tracker = DecileTracker::new();
        let mut rec = Recorder { seen: Vec::new() };

        let total = 20;
        for i in 0..total {
            tracker.advance(i, total, &mut rec);
        }

        assert_eq!(rec.seen, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_monotonic_no_duplicates_small_total() {
        // 行数少于十分位数: 跳过部分十分位，仍然单调不重复
        let mut tracker = DecileTracker::new();
        let mut rec = Recorder { seen: Vec::new() };

        let total = 3;
        for i in 0..total {
            tracker.advance(i, total, &mut rec);
        }

        assert!(rec.seen.windows(2).all(|w| w[0] < w[1]));
        let mut dedup = rec.seen.clone();
        dedup.dedup();
        assert_eq!(dedup, rec.seen);
    }

    #[test]
    fn test_zero_total_reports_nothing() {
        let mut tracker = DecileTracker::new();
        let mut rec = Recorder { seen: Vec::new() };
        tracker.advance(0, 0, &mut rec);
        assert!(rec.seen.is_empty());
    }
}
