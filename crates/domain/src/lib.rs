//! 家庭医生协作平台核心领域模型
//!
//! 包含用户、会话、消息、通知等核心实体，以及相关的业务规则。

pub mod entities;
pub mod errors;
pub mod events;
pub mod repositories;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use events::*;
pub use repositories::*;
