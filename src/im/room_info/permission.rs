//! 权限判断

use crate::im::room_info::dao::PermissionDao;
use crate::im::room_info::error::RoomInfoResult;
use crate::im::room_info::models::{CapabilityMap, Permission};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::debug;

/// 权限判断接口，每次进入页面调用一次，不订阅变更
#[async_trait]
pub trait PermissionEvaluator: Send + Sync {
    async fn has_permission(
        &self,
        permissions: &[Permission],
        rid: &str,
    ) -> RoomInfoResult<CapabilityMap>;
}

/// 基于本地权限表的判断：当前用户的全局角色或其在房间中的角色，
/// 只要有一个出现在权限的角色列表里即授予。
pub struct LocalPermissionEvaluator {
    dao: PermissionDao,
    user_roles: Vec<String>,
}

impl LocalPermissionEvaluator {
    pub fn new(dao: PermissionDao, user_roles: Vec<String>) -> Self {
        Self { dao, user_roles }
    }
}

#[async_trait]
impl PermissionEvaluator for LocalPermissionEvaluator {
    async fn has_permission(
        &self,
        permissions: &[Permission],
        rid: &str,
    ) -> RoomInfoResult<CapabilityMap> {
        let mut roles: HashSet<String> = self.user_roles.iter().cloned().collect();
        roles.extend(self.dao.get_subscription_roles(rid).await?);

        let mut result = CapabilityMap::new(rid);
        for permission in permissions {
            let allowed = self.dao.get_permission_roles(permission.as_str()).await?;
            let granted = allowed.iter().any(|role| roles.contains(role));
            debug!(
                "[Permission] 房间 {} 权限 {}: {}",
                rid,
                permission.as_str(),
                granted
            );
            result.set(*permission, granted);
        }
        Ok(result)
    }
}
