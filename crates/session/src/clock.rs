//! 폴링 대기 루프의 sleep 전략
//!
//! 대기 루프는 `std::thread::sleep`을 직접 호출하지 않고 [`Clock`]을 거칩니다.
//! 테스트는 [`ManualClock`]으로 교체해 실제 시간 지연 없이 상태 기계를 돌립니다.
//!
//! 대기 예산은 sleep 합계로만 소모됩니다. 따라서 실제 자식 프로세스를 띄운
//! 세션에 [`ManualClock`]을 넣으면 예산이 즉시 소진됩니다. [`ManualClock`]은
//! 스크립트된 [`OutputSource`](crate::wait::OutputSource)와 함께 쓰는 용도입니다.
//! teardown의 SIGTERM 유예 시간은 항상 실제 시간으로 잽니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// 폴링 사이에 현재 스레드를 멈춥니다.
pub trait Clock: Send + Sync {
    /// `duration`만큼 대기합니다.
    fn sleep(&self, duration: Duration);
}

/// 실제 시간으로 대기
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// 대기하지 않고 요청된 sleep만 기록합니다.
///
/// clone은 카운터를 공유하므로 테스트는 한 핸들을 쥐고 다른 핸들을 넘길 수 있습니다.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    slept_nanos: Arc<AtomicU64>,
    sleeps: Arc<AtomicUsize>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 지금까지 누적된 가상 대기 시간
    pub fn slept(&self) -> Duration {
        Duration::from_nanos(self.slept_nanos.load(Ordering::SeqCst))
    }

    /// 지금까지의 `sleep` 호출 횟수
    pub fn sleeps(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn sleep(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.slept_nanos.fetch_add(nanos, Ordering::SeqCst);
        self.sleeps.fetch_add(1, Ordering::SeqCst);
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}
