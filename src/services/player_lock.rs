use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

// 超过该数量时清理无人持有的锁
const PRUNE_THRESHOLD: usize = 256;

/// 按玩家划分的异步互斥锁。
///
/// 同一玩家的提交串行执行，不同玩家互不阻塞。
#[derive(Clone, Default)]
pub struct PlayerLocks {
    inner: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
}

impl PlayerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, player_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(player_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn same_player_is_serialized() {
        let locks = PlayerLocks::new();
        let guard = locks.acquire(7).await;
        assert!(timeout(Duration::from_millis(50), locks.acquire(7)).await.is_err());
        drop(guard);
        assert!(timeout(Duration::from_millis(50), locks.acquire(7)).await.is_ok());
    }

    #[tokio::test]
    async fn different_players_do_not_block() {
        let locks = PlayerLocks::new();
        let _first = locks.acquire(1).await;
        assert!(timeout(Duration::from_millis(50), locks.acquire(2)).await.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn idle_locks_are_pruned() {
        let locks = PlayerLocks::new();
        for player_id in 0..=PRUNE_THRESHOLD as i64 {
            drop(locks.acquire(player_id).await);
        }
        let _held = locks.acquire(-1).await;
        drop(locks.acquire(-2).await);
        assert!(locks.len() <= 2);
    }
}
