//! 进程内事件总线
//!
//! 领域写入提交之后，类型化的事件对象经由这里分发给注册的处理器。
//! 每个处理器独立隔离故障：单个处理器失败只记录日志，既不影响其他
//! 处理器，也绝不让已经成功提交的原始操作事后失败。

use std::sync::Arc;

use async_trait::async_trait;
use domain::DomainEvent;

use crate::error::ApplicationError;

/// 领域事件处理器
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理器名称（用于日志定位）
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &DomainEvent) -> Result<(), ApplicationError>;
}

/// 事件发布器
///
/// 处理器按注册顺序依次调用。
#[derive(Clone, Default)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// 注册一个事件处理器，返回新的发布器实例
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// 发布事件给所有处理器
    ///
    /// 必须在触发事件的写入已持久化之后调用。处理器错误在这里被
    /// 吞掉并记录，永不向调用方传播。
    pub async fn publish(&self, event: DomainEvent) {
        for handler in self.handlers.iter() {
            if let Err(err) = handler.handle(&event).await {
                tracing::error!(
                    handler = handler.name(),
                    event = event.event_type(),
                    error = %err,
                    "事件处理器执行失败"
                );
            }
        }
    }
}
