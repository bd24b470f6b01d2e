use std::time::Duration;

use tokio::time::Instant;

/// 整个确认过程的墙钟上限，与轮数上限相互独立。
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.0
    }

    pub fn instant(&self) -> Instant {
        self.0
    }
}

/// 未设置截止时间时永不完成。
pub(crate) async fn reached(deadline: Option<Deadline>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.instant()).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expires_after_timeout() {
        let deadline = Deadline::after(Duration::from_secs(5));
        assert!(!deadline.expired());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(deadline.expired());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_deadline_never_fires() {
        let outcome =
            tokio::time::timeout(Duration::from_secs(3600), reached(None)).await;
        assert!(outcome.is_err());
    }
}
