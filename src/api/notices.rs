//! Per-session transient notices
//!
//! Notices are queued by mutation handlers and drained by the next rendered
//! page of the same session.

use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }
}

/// Sessions whose notices are kept before the least recently used is evicted
pub const MAX_SESSIONS: usize = 4096;

/// Notices kept per session, oldest dropped first
pub const MAX_NOTICES_PER_SESSION: usize = 32;

/// Notice queues keyed by session id, least recently used session evicted first
#[derive(Clone)]
pub struct NoticeBoard {
    queues: Arc<Mutex<LruCache<String, Vec<Notice>>>>,
}

impl std::fmt::Debug for NoticeBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoticeBoard").finish_non_exhaustive()
    }
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::with_capacity(MAX_SESSIONS)
    }
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(sessions: usize) -> Self {
        let capacity = NonZeroUsize::new(sessions).unwrap_or(NonZeroUsize::MIN);
        Self {
            queues: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub async fn push(&self, session: &str, notice: Notice) {
        debug!("Queueing {:?} notice for session {}", notice.level, session);
        let mut queues = self.queues.lock().await;
        match queues.get_mut(session) {
            Some(queue) => {
                if queue.len() >= MAX_NOTICES_PER_SESSION {
                    queue.remove(0);
                }
                queue.push(notice);
            }
            None => {
                if let Some((evicted, _)) = queues.push(session.to_string(), vec![notice]) {
                    if evicted != session {
                        debug!("Dropped undelivered notices of session {}", evicted);
                    }
                }
            }
        }
    }

    /// Remove and return every queued notice of a session
    pub async fn drain(&self, session: &str) -> Vec<Notice> {
        let mut queues = self.queues.lock().await;
        queues.pop(session).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notices_are_per_session() {
        let board = NoticeBoard::new();
        board.push("a", Notice::success("saved")).await;
        board.push("a", Notice::info("check")).await;
        board.push("b", Notice::warning("oops")).await;

        let drained = board.drain("a").await;
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0], Notice::success("saved"));
        assert_eq!(drained[1].level, NoticeLevel::Info);
        assert!(board.drain("a").await.is_empty());
        assert_eq!(board.drain("b").await, vec![Notice::warning("oops")]);
    }

    #[tokio::test]
    async fn test_abandoned_sessions_are_evicted() {
        let board = NoticeBoard::with_capacity(4);
        for i in 0..10 {
            board.push(&format!("s{}", i), Notice::success("saved")).await;
        }
        assert_eq!(board.queues.lock().await.len(), 4);

        for i in 0..6 {
            assert!(board.drain(&format!("s{}", i)).await.is_empty());
        }
        for i in 6..10 {
            assert_eq!(board.drain(&format!("s{}", i)).await.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_queue_per_session_is_capped() {
        let board = NoticeBoard::new();
        for i in 0..(MAX_NOTICES_PER_SESSION + 5) {
            board.push("a", Notice::info(format!("n{}", i))).await;
        }
        let drained = board.drain("a").await;
        assert_eq!(drained.len(), MAX_NOTICES_PER_SESSION);
        assert_eq!(drained[0], Notice::info("n5"));
    }
}
