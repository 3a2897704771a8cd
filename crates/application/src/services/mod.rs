//! 用例服务

pub mod messaging_service;
pub mod notification_fanout;

pub use messaging_service::{
    AttachmentUpload, MessagingService, MessagingServiceDependencies, SearchMessagesRequest,
    SendMessageRequest,
};
pub use notification_fanout::NotificationFanout;
