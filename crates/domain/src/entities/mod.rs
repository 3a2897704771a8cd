//! 核心实体定义

pub mod assignment;
pub mod conversation;
pub mod message;
pub mod notification;
pub mod user;

pub use assignment::{AssignmentStatus, DoctorAssignment};
pub use conversation::Conversation;
pub use message::{Message, MessageAttachment};
pub use notification::{
    Notification, NotificationReference, NotificationType, ReferenceKind,
};
pub use user::{User, UserRole};
