use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// A single pending deadline. Arming it again replaces the previous one.
#[derive(Debug, Default)]
pub struct PendingTimer {
    deadline: Option<Instant>,
}

impl PendingTimer {
    pub fn arm(&mut self, after: Duration) {
        self.deadline = Some(Instant::now() + after);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves when the deadline passes; never resolves while disarmed.
    /// Safe to drop early, the deadline stays armed.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

/// Trailing-edge debounce: a burst of `schedule` calls fires once, `delay`
/// after the last call
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    timer: PendingTimer,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            timer: PendingTimer::default(),
        }
    }

    pub fn schedule(&mut self) {
        self.timer.arm(self.delay);
    }

    pub fn cancel(&mut self) {
        self.timer.cancel();
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_pending()
    }

    pub async fn fired(&mut self) {
        self.timer.fired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_fires_once_after_last_schedule() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        let start = Instant::now();

        debouncer.schedule();
        tokio::time::sleep(Duration::from_millis(50)).await;
        debouncer.schedule();

        debouncer.fired().await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(150));
        assert!(elapsed < Duration::from_millis(160));
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_disarms() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        debouncer.schedule();
        debouncer.cancel();

        let fired = tokio::time::timeout(Duration::from_secs(1), debouncer.fired()).await;
        assert!(fired.is_err());
    }

    #[test]
    fn test_disarmed_timer_never_fires() {
        let mut timer = PendingTimer::default();
        let mut fired = tokio_test::task::spawn(timer.fired());

        tokio_test::assert_pending!(fired.poll());
        tokio_test::assert_pending!(fired.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_wait_keeps_deadline() {
        let mut timer = PendingTimer::default();
        timer.arm(Duration::from_millis(100));

        let early = tokio::time::timeout(Duration::from_millis(10), timer.fired()).await;
        assert!(early.is_err());
        assert!(timer.is_pending());

        timer.fired().await;
        assert!(!timer.is_pending());
    }
}
