//! 采集 → 推理 单槽交接通道
//!
//! 容量固定为 1。生产者 (采集节拍) 永不阻塞; 槽被占用时默认丢弃新帧,
//! 不覆盖推理线程可能马上要取走的那一帧。

use crate::detection::Frame;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 槽已满时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffPolicy {
    /// 丢弃新帧, 保留槽内未取走的帧
    #[default]
    DropNewest,
    /// 取出槽内旧帧, 放入新帧
    ReplaceOldest,
}

/// 单槽交接通道 (可克隆, 生产端与消费端共享同一个槽)
#[derive(Clone)]
pub struct HandoffChannel {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
    policy: HandoffPolicy,
    dropped: Arc<AtomicU64>,
}

impl HandoffChannel {
    pub fn new(policy: HandoffPolicy) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(1);
        Self {
            tx,
            rx,
            policy,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 放入一帧, 从不阻塞。
    ///
    /// `DropNewest` 下槽被占用时返回 false, 槽内的帧保持不变。
    pub fn try_put(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(frame)) => match self.policy {
                HandoffPolicy::DropNewest => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    false
                }
                HandoffPolicy::ReplaceOldest => {
                    if self.rx.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    // 与消费端竞争失败时新帧同样被丢弃
                    match self.tx.try_send(frame) {
                        Ok(()) => true,
                        Err(_) => {
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                            false
                        }
                    }
                }
            },
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// 取出一帧, 最多阻塞 `timeout`; 超时返回 None, 不视为错误
    pub fn try_take(&self, timeout: Duration) -> Option<Frame> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn policy(&self) -> HandoffPolicy {
        self.policy
    }

    /// 累计丢弃的帧数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for HandoffChannel {
    fn default() -> Self {
        Self::new(HandoffPolicy::DropNewest)
    }
}
