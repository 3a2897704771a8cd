//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，以及实时通信核心：
//! 访问策略、发送限流、输入状态协调、广播中枢与事件总线。

pub mod access_policy;
pub mod clock;
pub mod error;
pub mod event_bus;
pub mod hub;
pub mod memory;
pub mod rate_limiter;
pub mod services;
pub mod typing;

pub use access_policy::AccessPolicy;
pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use event_bus::{EventHandler, EventPublisher};
pub use hub::{
    ConversationStream, MessageHub, MessagePublished, MessageStream, NotificationHub,
    NotificationStream,
};
pub use rate_limiter::SendRateLimiter;
pub use services::{
    AttachmentUpload, MessagingService, MessagingServiceDependencies, NotificationFanout,
    SearchMessagesRequest, SendMessageRequest,
};
pub use typing::{TypingCoordinator, TypingSignal, TypingStream};
