//! SQLite 数据库工具：统一创建连接池并初始化房间信息相关的表结构

use crate::im::room_info::dao::{PermissionDao, RoleDao, RoomDao};
use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

/// 创建 SQLite 连接池并初始化所有表
pub async fn create_sqlite_pool_with_schema(db_url: &str) -> Result<Pool<Sqlite>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context(format!("连接SQLite数据库失败: {}", db_url))?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// 初始化房间、角色、权限表
pub async fn init_schema(pool: &Pool<Sqlite>) -> Result<()> {
    RoomDao::init_db_with_connection(pool).await?;
    RoleDao::init_db_with_connection(pool).await?;
    PermissionDao::init_db_with_connection(pool).await?;
    Ok(())
}

/// 测试用的内存数据库（单连接，保证所有查询看到同一个库）
#[cfg(test)]
pub async fn memory_pool() -> Pool<Sqlite> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("创建内存数据库失败");
    init_schema(&pool).await.expect("初始化表结构失败");
    pool
}
