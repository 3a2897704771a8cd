//! 发送限流器
//!
//! 按发送者维护滑动窗口，防止消息洪水。策略为固定常量：
//! 两次发送间隔至少1秒，且任意60秒内最多20条。
//! 超限是面向调用方的"请放慢"信号，调用方不得自动重试。

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use uuid::Uuid;

/// 两次发送之间的最小间隔
const MIN_SEND_INTERVAL: Duration = Duration::from_secs(1);
/// 滑动窗口时长
const WINDOW_DURATION: Duration = Duration::from_secs(60);
/// 窗口内允许的最大发送数
const MAX_SENDS_PER_WINDOW: usize = 20;

/// 单个发送者的滑动窗口
#[derive(Debug, Default)]
struct SendWindow {
    /// 窗口内的发送时间，按时间先后排列
    timestamps: VecDeque<Instant>,
}

impl SendWindow {
    /// 清除窗口之外的过期记录，约束内存占用
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(first) = self.timestamps.front() {
            if now.duration_since(*first) > window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// 消息发送限流器
///
/// 所有可变状态集中在单个长生命周期实例内部，按键互斥访问。
pub struct SendRateLimiter {
    min_interval: Duration,
    window: Duration,
    max_per_window: usize,
    windows: Mutex<HashMap<Uuid, SendWindow>>,
}

impl SendRateLimiter {
    pub fn new() -> Self {
        Self::with_policy(MIN_SEND_INTERVAL, WINDOW_DURATION, MAX_SENDS_PER_WINDOW)
    }

    /// 自定义策略的构造函数（测试专用，用于缩短时间窗口；
    /// 生产路径一律使用 `new` 的固定策略）
    pub fn with_policy(min_interval: Duration, window: Duration, max_per_window: usize) -> Self {
        Self {
            min_interval,
            window,
            max_per_window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// 检查发送者当前是否允许发送
    ///
    /// 检查过程中同时清理过期记录。不修改计数：只有消息被持久化
    /// 接受之后才通过 `record_sent` 记账。
    pub fn can_send(&self, sender_id: Uuid) -> bool {
        let now = Instant::now();
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(window) = windows.get_mut(&sender_id) else {
            return true;
        };

        window.prune(now, self.window);

        if window.is_empty() {
            // 整个窗口已过期，顺手移除条目防止map无限增长
            windows.remove(&sender_id);
            return true;
        }

        if let Some(last) = window.timestamps.back() {
            if now.duration_since(*last) < self.min_interval {
                return false;
            }
        }

        window.timestamps.len() < self.max_per_window
    }

    /// 记录一次已被接受的发送
    ///
    /// 只能在消息持久化成功之后调用，绝不可预先记账。
    pub fn record_sent(&self, sender_id: Uuid) {
        let now = Instant::now();
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let window = windows.entry(sender_id).or_default();
        window.prune(now, self.window);
        window.timestamps.push_back(now);
    }
}

impl Default for SendRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
