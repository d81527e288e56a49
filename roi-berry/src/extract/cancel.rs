//! 协作式取消.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 整批任务的取消令牌.
///
/// 可廉价克隆, 所有克隆共享同一状态. 一旦取消就不能恢复.
/// 批处理在病例之间检查该令牌, 正在计算的病例会先完成.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// 初始化一个未取消的令牌.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消.
    #[inline]
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// 是否已请求取消.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::CancelToken;

    #[test]
    fn test_clones_share_state() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
        std::thread::spawn(move || assert!(b.is_cancelled()))
            .join()
            .unwrap();
    }
}
