//! 角色描述查询与缓存

use crate::im::room_info::dao::RoleDao;
use anyhow::Result;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// 角色描述数据源
#[async_trait]
pub trait RoleDescriptionSource: Send + Sync {
    /// 查询角色描述，角色不存在时返回 Ok(None)
    async fn role_description(&self, role_id: &str) -> Result<Option<String>>;
}

#[async_trait]
impl RoleDescriptionSource for RoleDao {
    async fn role_description(&self, role_id: &str) -> Result<Option<String>> {
        self.get_role_description(role_id).await
    }
}

/// 进程内共享的角色描述缓存
///
/// 角色视为静态数据，缓存不失效；重复写入同一个值无副作用。未命中不缓存。
pub struct RoleDescriptionCache {
    source: Arc<dyn RoleDescriptionSource>,
    cache: RwLock<HashMap<String, String>>,
}

impl RoleDescriptionCache {
    pub fn new(source: Arc<dyn RoleDescriptionSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// 查询单个角色描述，失败返回 None
    pub async fn describe(&self, role_id: &str) -> Option<String> {
        if let Some(description) = self.cache.read().await.get(role_id) {
            return Some(description.clone());
        }

        match self.source.role_description(role_id).await {
            Ok(Some(description)) => {
                self.cache
                    .write()
                    .await
                    .insert(role_id.to_string(), description.clone());
                Some(description)
            }
            Ok(None) => {
                debug!("[Roles] 角色 {} 没有描述", role_id);
                None
            }
            Err(e) => {
                warn!("[Roles] 查询角色 {} 描述失败: {:?}", role_id, e);
                None
            }
        }
    }

    /// 并行查询一组角色描述，结果顺序与输入一致
    pub async fn parse_roles(&self, roles: &[String]) -> Vec<Option<String>> {
        join_all(roles.iter().map(|role| self.describe(role))).await
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRoles {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RoleDescriptionSource for FakeRoles {
        async fn role_description(&self, role_id: &str) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match role_id {
                "A" => Ok(Some("descA".to_string())),
                "B" => Err(anyhow::anyhow!("数据库不可用")),
                "C" => Ok(Some("descC".to_string())),
                _ => Ok(None),
            }
        }
    }

    #[tokio::test]
    async fn failed_lookup_keeps_position() {
        let cache = RoleDescriptionCache::new(Arc::new(FakeRoles {
            calls: AtomicUsize::new(0),
        }));
        let roles = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        assert_eq!(
            cache.parse_roles(&roles).await,
            vec![Some("descA".to_string()), None, Some("descC".to_string())]
        );
    }

    #[tokio::test]
    async fn hits_are_cached_and_misses_are_not() {
        let source = Arc::new(FakeRoles {
            calls: AtomicUsize::new(0),
        });
        let cache = RoleDescriptionCache::new(source.clone());

        assert_eq!(cache.describe("A").await.as_deref(), Some("descA"));
        assert_eq!(cache.describe("A").await.as_deref(), Some("descA"));
        assert_eq!(cache.describe("missing").await, None);
        assert_eq!(cache.describe("missing").await, None);

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.cached_len().await, 1);
    }

    #[tokio::test]
    async fn reads_descriptions_from_local_roles_table() {
        let pool = crate::im::db::memory_pool().await;
        let dao = RoleDao::new(pool);
        dao.upsert_role("admin", Some("Administrator")).await.unwrap();

        let cache = RoleDescriptionCache::new(Arc::new(dao));
        let parsed = cache
            .parse_roles(&["admin".to_string(), "ghost".to_string()])
            .await;
        assert_eq!(parsed, vec![Some("Administrator".to_string()), None]);
    }
}
