//! 用户Repository接口定义

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::user::User;
use crate::errors::DomainResult;

/// 用户Repository接口
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 创建用户
    async fn create(&self, user: &User) -> DomainResult<User>;

    /// 根据ID查找用户
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<User>>;

    /// 查找家庭的户主
    async fn find_family_head(&self, family_id: Uuid) -> DomainResult<Option<User>>;

    /// 检查用户是否存在
    async fn exists(&self, id: Uuid) -> DomainResult<bool>;
}
