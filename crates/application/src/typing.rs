//! 输入状态协调器
//!
//! 维护每个 (会话, 用户) 键的短暂输入状态：开始输入后若3秒内没有
//! 新信号，自动广播一条隐式停止事件。每个键同一时刻至多存在一个
//! 待触发的定时器，建立新定时器会原子地替换旧定时器。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// 输入状态自动过期时长
const TYPING_EXPIRY: Duration = Duration::from_secs(3);

/// 输入状态信号（短暂事件，不持久化）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingSignal {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub is_typing: bool,
}

/// 某个键当前的过期定时器
///
/// 代数（generation）用于识别定时器身份：定时器触发后必须确认
/// 自己仍是该键的当前定时器，才允许发布隐式停止事件，否则说明
/// 它已被替换，直接退出。这使"取消旧定时器并安装新定时器"成为
/// 一个逻辑上的原子步骤。
struct TimerSlot {
    generation: u64,
    handle: JoinHandle<()>,
}

/// 输入状态协调器
pub struct TypingCoordinator {
    expiry: Duration,
    sender: broadcast::Sender<TypingSignal>,
    timers: Arc<Mutex<HashMap<(Uuid, Uuid), TimerSlot>>>,
    next_generation: AtomicU64,
}

impl TypingCoordinator {
    pub fn new(capacity: usize) -> Self {
        Self::with_expiry(capacity, TYPING_EXPIRY)
    }

    /// 自定义过期时长的构造函数（测试中用于缩短等待）
    pub fn with_expiry(capacity: usize, expiry: Duration) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            expiry,
            sender,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// 处理一次输入状态信号
    ///
    /// 取消该键现有的过期定时器，广播信号；若 `is_typing` 为真，
    /// 再安装一个新的3秒过期定时器。
    pub fn signal(&self, conversation_id: Uuid, user_id: Uuid, is_typing: bool) {
        let key = (conversation_id, user_id);
        self.cancel_timer(&key);

        self.publish(TypingSignal {
            conversation_id,
            user_id,
            is_typing,
        });

        if is_typing {
            self.arm_timer(key);
        }
    }

    /// 显式停止某个键的输入状态
    ///
    /// 用户在会话中成功发送消息时由编排器调用。
    pub fn stop(&self, conversation_id: Uuid, user_id: Uuid) {
        let key = (conversation_id, user_id);
        self.cancel_timer(&key);

        self.publish(TypingSignal {
            conversation_id,
            user_id,
            is_typing: false,
        });
    }

    /// 订阅某个会话的输入状态信号流
    ///
    /// 订阅者只收到订阅之后发布的信号，直到主动取消。
    pub fn subscribe(&self, conversation_id: Uuid) -> TypingStream {
        TypingStream {
            receiver: self.sender.subscribe(),
            conversation_id,
        }
    }

    fn cancel_timer(&self, key: &(Uuid, Uuid)) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = timers.remove(key) {
            slot.handle.abort();
        }
    }

    fn arm_timer(&self, key: (Uuid, Uuid)) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let sender = self.sender.clone();
        let expiry = self.expiry;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(expiry).await;

            // 触发后确认自己仍是该键的当前定时器
            {
                let mut timers = timers.lock().unwrap_or_else(PoisonError::into_inner);
                match timers.get(&key) {
                    Some(slot) if slot.generation == generation => {
                        timers.remove(&key);
                    }
                    _ => return,
                }
            }

            let signal = TypingSignal {
                conversation_id: key.0,
                user_id: key.1,
                is_typing: false,
            };
            if sender.receiver_count() > 0 {
                if let Err(err) = sender.send(signal) {
                    tracing::debug!(error = %err, "输入状态过期信号广播失败");
                }
            }
        });

        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        timers.insert(key, TimerSlot { generation, handle });
    }

    /// 广播信号。没有订阅者时直接丢弃，发送失败只记录日志。
    fn publish(&self, signal: TypingSignal) {
        if self.sender.receiver_count() == 0 {
            return;
        }
        if let Err(err) = self.sender.send(signal) {
            tracing::debug!(error = %err, "输入状态信号广播失败");
        }
    }
}

/// 按会话过滤的输入状态信号流
pub struct TypingStream {
    receiver: broadcast::Receiver<TypingSignal>,
    conversation_id: Uuid,
}

impl TypingStream {
    /// 接收下一条属于订阅会话的信号
    ///
    /// 订阅者消费过慢时会跳过最旧的信号继续接收；通道关闭返回None。
    pub async fn recv(&mut self) -> Option<TypingSignal> {
        loop {
            match self.receiver.recv().await {
                Ok(signal) if signal.conversation_id == self.conversation_id => {
                    return Some(signal)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "输入状态订阅者消费过慢，跳过旧信号");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
