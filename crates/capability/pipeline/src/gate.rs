use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, MutexGuard};

struct GateInner {
    epoch: AtomicU64,
    open: AtomicBool,
    in_flight: Mutex<()>,
}

/// 停止闸门。
///
/// 每次从关闭到打开分配新的纪元；写入任务在持有 in-flight 锁的情况下
/// 检查纪元，`close()` 先翻转标志再等待 in-flight 锁，因此返回后不会再有写入。
#[derive(Clone)]
pub struct ReadingGate {
    inner: Arc<GateInner>,
}

impl ReadingGate {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(GateInner {
                epoch: AtomicU64::new(0),
                open: AtomicBool::new(false),
                in_flight: Mutex::new(()),
            }),
        }
    }

    /// 打开闸门并返回当前纪元；已打开时沿用原纪元。
    pub fn open(&self) -> u64 {
        if self.inner.open.load(Ordering::Acquire) {
            return self.inner.epoch.load(Ordering::Acquire);
        }
        let epoch = self.inner.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.open.store(true, Ordering::Release);
        epoch
    }

    /// 关闭闸门，等待正在进行的写入结束。
    pub async fn close(&self) {
        self.inner.open.store(false, Ordering::Release);
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        drop(self.inner.in_flight.lock().await);
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    pub fn current_epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::Acquire)
    }

    pub fn accepts(&self, epoch: u64) -> bool {
        self.is_open() && self.current_epoch() == epoch
    }

    pub(crate) async fn in_flight(&self) -> MutexGuard<'_, ()> {
        self.inner.in_flight.lock().await
    }
}

impl Default for ReadingGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_invalidates_epoch() {
        let gate = ReadingGate::new();
        let epoch = gate.open();
        assert!(gate.accepts(epoch));
        assert_eq!(gate.open(), epoch);

        gate.close().await;
        assert!(!gate.accepts(epoch));

        let next = gate.open();
        assert_ne!(next, epoch);
        assert!(gate.accepts(next));
        assert!(!gate.accepts(epoch));
    }
}
