//! 完成信号（二值、单许可的会合点）
//!
//! 测试序列线程在 `AwaitingCompletion` 状态调用 [`CompletionSignal::wait_timeout`]，
//! 传输层的 SRQ 通知上下文是 [`CompletionSignal::signal`] 的唯一调用者。
//!
//! # 语义
//!
//! - 许可最多一个：等待前的第二次 `signal()` 被吸收，不会累积
//! - `wait` 消费许可
//! - 布防时调用 `take_stale()` 清除遗留许可，过期通知不会满足下一次等待

use calbench_bus::{ServiceRequest, ServiceRequestHandler};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// 完成信号
#[derive(Debug, Default)]
pub struct CompletionSignal {
    permit: Mutex<bool>,
    cvar: Condvar,
}

impl CompletionSignal {
    /// 创建新的完成信号（初始无许可）
    pub fn new() -> Self {
        Self::default()
    }

    /// 投递许可
    ///
    /// 返回 `false` 表示已有未消费的许可，本次信号被吸收。
    pub fn signal(&self) -> bool {
        let mut permit = self.permit.lock();
        if *permit {
            return false;
        }
        *permit = true;
        drop(permit);
        self.cvar.notify_one();
        true
    }

    /// 阻塞直到出现许可并消费它
    pub fn wait(&self) {
        let mut permit = self.permit.lock();
        while !*permit {
            self.cvar.wait(&mut permit);
        }
        *permit = false;
    }

    /// 带超时的等待
    ///
    /// 返回 `true` 表示消费了许可，`false` 表示超时。
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut permit = self.permit.lock();
        while !*permit {
            if self.cvar.wait_until(&mut permit, deadline).timed_out() {
                break;
            }
        }
        // 超时与信号同时到达时以许可为准
        std::mem::take(&mut *permit)
    }

    /// 清除遗留许可（不阻塞）
    ///
    /// 返回 `true` 表示确实清除了一个过期许可。
    pub fn take_stale(&self) -> bool {
        std::mem::take(&mut *self.permit.lock())
    }

    /// 是否有未消费的许可
    pub fn is_signalled(&self) -> bool {
        *self.permit.lock()
    }
}

/// 构造注册到总线上的 SRQ 回调
///
/// 每次通知：记录状态字节 → 先丢弃挂起事件（重新布防中断）→ 再投递许可。
/// 丢弃失败只记录 `error!`，许可照常投递。
pub fn completion_handler(signal: Arc<CompletionSignal>) -> ServiceRequestHandler {
    Arc::new(move |request: &ServiceRequest<'_>| {
        debug!("Service request: status {}", request.status());

        if let Err(e) = request.discard_pending_events() {
            error!("Failed to discard pending service-request events: {}", e);
        }

        if !signal.signal() {
            warn!("Completion signal already pending; notification absorbed");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use calbench_bus::{BusError, EventQueue, StatusByte};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_signal_then_wait() {
        let signal = CompletionSignal::new();
        assert!(signal.signal());
        signal.wait();
        assert!(!signal.is_signalled());
    }

    #[test]
    fn test_two_signals_release_one_wait() {
        let signal = CompletionSignal::new();
        assert!(signal.signal());
        assert!(!signal.signal());

        assert!(signal.wait_timeout(Duration::from_millis(10)));
        assert!(!signal.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn test_wait_timeout_expires() {
        let signal = CompletionSignal::new();
        let start = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_signal_from_other_thread() {
        let signal = Arc::new(CompletionSignal::new());
        let remote = signal.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.signal()
        });

        assert!(signal.wait_timeout(Duration::from_secs(2)));
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_take_stale() {
        let signal = CompletionSignal::new();
        assert!(!signal.take_stale());
        signal.signal();
        assert!(signal.take_stale());
        assert!(!signal.wait_timeout(Duration::from_millis(5)));
    }

    /// 记录丢弃时许可是否已投递
    struct OrderQueue {
        signal: Arc<CompletionSignal>,
        signalled_before_discard: AtomicBool,
        discards: AtomicUsize,
        fail: bool,
    }

    impl EventQueue for OrderQueue {
        fn discard_pending_events(&self) -> Result<(), BusError> {
            self.discards.fetch_add(1, Ordering::SeqCst);
            if self.signal.is_signalled() {
                self.signalled_before_discard.store(true, Ordering::SeqCst);
            }
            if self.fail {
                Err(BusError::Device("discard failed".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_handler_discards_before_signalling() {
        let signal = Arc::new(CompletionSignal::new());
        let queue = OrderQueue {
            signal: signal.clone(),
            signalled_before_discard: AtomicBool::new(false),
            discards: AtomicUsize::new(0),
            fail: false,
        };

        let handler = completion_handler(signal.clone());
        handler(&ServiceRequest::new(StatusByte(0x41), &queue));

        assert_eq!(queue.discards.load(Ordering::SeqCst), 1);
        assert!(!queue.signalled_before_discard.load(Ordering::SeqCst));
        assert!(signal.is_signalled());
    }

    #[test]
    fn test_handler_signals_even_if_discard_fails() {
        let signal = Arc::new(CompletionSignal::new());
        let queue = OrderQueue {
            signal: signal.clone(),
            signalled_before_discard: AtomicBool::new(false),
            discards: AtomicUsize::new(0),
            fail: true,
        };

        let handler = completion_handler(signal.clone());
        handler(&ServiceRequest::new(StatusByte(0x41), &queue));

        assert!(signal.wait_timeout(Duration::from_millis(10)));
    }
}
