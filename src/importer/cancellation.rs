// ==========================================
// 档案目录树导入系统 - 运行取消标志
// ==========================================
// 检查点: 每个层级节点处理之间 + 嵌套集重算之前
// 取消后树处于"未重算"状态，不会被破坏
// ==========================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 可跨线程共享的取消标志（克隆共享同一状态）
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// 复位（同一个标志复用于下一次运行）
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}
