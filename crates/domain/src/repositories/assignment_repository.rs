//! 签约Repository接口定义

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::assignment::DoctorAssignment;
use crate::errors::DomainResult;

/// 签约Repository接口
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// 创建签约记录
    async fn create(&self, assignment: &DoctorAssignment) -> DomainResult<DoctorAssignment>;

    /// 根据 (医生, 家庭) 组合查找签约记录
    async fn find_by_pair(
        &self,
        doctor_id: Uuid,
        family_id: Uuid,
    ) -> DomainResult<Option<DoctorAssignment>>;

    /// 检查医生与家庭之间是否存在有效签约
    async fn has_active(&self, doctor_id: Uuid, family_id: Uuid) -> DomainResult<bool>;
}
