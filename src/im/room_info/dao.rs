//! 房间信息数据访问层（DAO）
//!
//! 负责房间、角色、权限相关的本地数据库操作（基于 sqlx）。

use crate::im::room_info::models::{Room, RoomKind, VisitorRef};
use anyhow::{anyhow, Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};

/// 房间 DAO
#[derive(Clone)]
pub struct RoomDao {
    db: Pool<Sqlite>,
}

impl RoomDao {
    /// 创建新的房间 DAO
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// 使用共享连接初始化房间表结构（静态方法）
    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        info!("[RoomDAO/DB] 初始化房间数据库表结构");

        let sql = r#"
            CREATE TABLE IF NOT EXISTS local_rooms (
                rid TEXT PRIMARY KEY,
                t TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                fname TEXT,
                prid TEXT,
                uids TEXT NOT NULL DEFAULT '[]',
                visitor TEXT,
                topic TEXT,
                description TEXT,
                announcement TEXT,
                broadcast INTEGER NOT NULL DEFAULT 0
            )
        "#;
        sqlx::query(sql)
            .execute(db)
            .await
            .context("创建房间表失败")?;
        Ok(())
    }

    fn row_to_room(row: &SqliteRow) -> Result<Room> {
        let rid: String = row.try_get("rid").context("读取 rid 失败")?;
        let t: String = row.try_get("t").context("读取房间类型失败")?;
        let t = RoomKind::from_code(&t).ok_or_else(|| anyhow!("未知的房间类型: {}", t))?;
        let uids: String = row.try_get("uids").context("读取 uids 失败")?;
        let visitor: Option<String> = row.try_get("visitor").context("读取 visitor 失败")?;
        let visitor = match visitor {
            Some(json) => Some(
                serde_json::from_str::<VisitorRef>(&json).context("解析 visitor JSON 失败")?,
            ),
            None => None,
        };
        let broadcast: i64 = row.try_get("broadcast").context("读取 broadcast 失败")?;

        Ok(Room {
            rid,
            t,
            name: row.try_get("name").context("读取 name 失败")?,
            fname: row.try_get("fname").context("读取 fname 失败")?,
            prid: row.try_get("prid").context("读取 prid 失败")?,
            uids: serde_json::from_str(&uids).context("解析 uids JSON 失败")?,
            visitor,
            topic: row.try_get("topic").context("读取 topic 失败")?,
            description: row.try_get("description").context("读取 description 失败")?,
            announcement: row
                .try_get("announcement")
                .context("读取 announcement 失败")?,
            broadcast: broadcast != 0,
        })
    }

    /// 按房间 ID 查询本地房间
    pub async fn get_room(&self, rid: &str) -> Result<Option<Room>> {
        let row = sqlx::query(
            r#"
            SELECT rid, t, name, fname, prid, uids, visitor, topic, description, announcement, broadcast
            FROM local_rooms
            WHERE rid = ?
            "#,
        )
        .bind(rid)
        .fetch_optional(&self.db)
        .await
        .context("查询房间失败")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_room(&row)?)),
            None => {
                debug!("[RoomDAO] 本地不存在房间: {}", rid);
                Ok(None)
            }
        }
    }

    /// 插入或更新房间
    pub async fn upsert_room(&self, room: &Room) -> Result<()> {
        let sql = r#"
            INSERT INTO local_rooms (
                rid, t, name, fname, prid, uids, visitor, topic, description, announcement, broadcast
            ) VALUES (
                ?,?,?,?,?,?,?,?,?,?,?
            )
            ON CONFLICT(rid) DO UPDATE SET
                t = excluded.t,
                name = excluded.name,
                fname = excluded.fname,
                prid = excluded.prid,
                uids = excluded.uids,
                visitor = excluded.visitor,
                topic = excluded.topic,
                description = excluded.description,
                announcement = excluded.announcement,
                broadcast = excluded.broadcast
        "#;

        let uids = serde_json::to_string(&room.uids).context("序列化 uids 失败")?;
        let visitor = match &room.visitor {
            Some(v) => Some(serde_json::to_string(v).context("序列化 visitor 失败")?),
            None => None,
        };

        sqlx::query(sql)
            .bind(&room.rid)
            .bind(room.t.code())
            .bind(&room.name)
            .bind(&room.fname)
            .bind(&room.prid)
            .bind(uids)
            .bind(visitor)
            .bind(&room.topic)
            .bind(&room.description)
            .bind(&room.announcement)
            .bind(if room.broadcast { 1 } else { 0 })
            .execute(&self.db)
            .await
            .context("插入或更新房间失败")?;
        Ok(())
    }
}

/// 角色 DAO
#[derive(Clone)]
pub struct RoleDao {
    db: Pool<Sqlite>,
}

impl RoleDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_roles (
                id TEXT PRIMARY KEY,
                description TEXT
            )
            "#,
        )
        .execute(db)
        .await
        .context("创建角色表失败")?;
        Ok(())
    }

    /// 查询角色描述，角色不存在或没有描述时返回 None
    pub async fn get_role_description(&self, id: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT description FROM local_roles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("查询角色失败")?;

        match row {
            Some(row) => Ok(row
                .try_get::<Option<String>, _>("description")
                .context("读取角色描述失败")?),
            None => Ok(None),
        }
    }

    pub async fn upsert_role(&self, id: &str, description: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_roles (id, description) VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET description = excluded.description
            "#,
        )
        .bind(id)
        .bind(description)
        .execute(&self.db)
        .await
        .context("插入或更新角色失败")?;
        Ok(())
    }
}

/// 权限 DAO（权限对应的角色列表，以及当前用户在各房间订阅中的角色）
#[derive(Clone)]
pub struct PermissionDao {
    db: Pool<Sqlite>,
}

impl PermissionDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_permissions (
                id TEXT PRIMARY KEY,
                roles TEXT NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(db)
        .await
        .context("创建权限表失败")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_subscriptions (
                rid TEXT PRIMARY KEY,
                roles TEXT NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(db)
        .await
        .context("创建订阅表失败")?;
        Ok(())
    }

    async fn get_roles(&self, sql: &str, key: &str) -> Result<Vec<String>> {
        let row = sqlx::query(sql)
            .bind(key)
            .fetch_optional(&self.db)
            .await
            .context("查询角色列表失败")?;

        match row {
            Some(row) => {
                let roles: String = row.try_get("roles").context("读取角色列表失败")?;
                Ok(serde_json::from_str(&roles).context("解析角色列表 JSON 失败")?)
            }
            None => Ok(Vec::new()),
        }
    }

    /// 拥有某权限的角色列表
    pub async fn get_permission_roles(&self, permission: &str) -> Result<Vec<String>> {
        self.get_roles("SELECT roles FROM local_permissions WHERE id = ?", permission)
            .await
    }

    /// 当前用户在某房间订阅中的角色
    pub async fn get_subscription_roles(&self, rid: &str) -> Result<Vec<String>> {
        self.get_roles("SELECT roles FROM local_subscriptions WHERE rid = ?", rid)
            .await
    }

    pub async fn upsert_permission(&self, permission: &str, roles: &[String]) -> Result<()> {
        let roles = serde_json::to_string(roles).context("序列化角色列表失败")?;
        sqlx::query(
            r#"
            INSERT INTO local_permissions (id, roles) VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET roles = excluded.roles
            "#,
        )
        .bind(permission)
        .bind(roles)
        .execute(&self.db)
        .await
        .context("插入或更新权限失败")?;
        Ok(())
    }

    pub async fn upsert_subscription_roles(&self, rid: &str, roles: &[String]) -> Result<()> {
        let roles = serde_json::to_string(roles).context("序列化角色列表失败")?;
        sqlx::query(
            r#"
            INSERT INTO local_subscriptions (rid, roles) VALUES (?, ?)
            ON CONFLICT(rid) DO UPDATE SET roles = excluded.roles
            "#,
        )
        .bind(rid)
        .bind(roles)
        .execute(&self.db)
        .await
        .context("插入或更新订阅角色失败")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::db::memory_pool;

    #[tokio::test]
    async fn room_round_trips_through_sqlite() -> Result<()> {
        let dao = RoomDao::new(memory_pool().await);
        let mut room = Room::placeholder("lc1", RoomKind::Livechat);
        room.name = "guest".to_string();
        room.visitor = Some(VisitorRef {
            id: "v1".to_string(),
            username: "guest-1".to_string(),
            token: "tok".to_string(),
            status: Some("online".to_string()),
        });
        dao.upsert_room(&room).await?;

        assert_eq!(dao.get_room("lc1").await?, Some(room.clone()));

        room.name = "renamed".to_string();
        dao.upsert_room(&room).await?;
        assert_eq!(dao.get_room("lc1").await?.map(|r| r.name), Some("renamed".to_string()));

        assert_eq!(dao.get_room("missing").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn missing_role_or_description_is_none() -> Result<()> {
        let dao = RoleDao::new(memory_pool().await);
        dao.upsert_role("admin", Some("Administrator")).await?;
        dao.upsert_role("bot", None).await?;

        assert_eq!(
            dao.get_role_description("admin").await?.as_deref(),
            Some("Administrator")
        );
        assert_eq!(dao.get_role_description("bot").await?, None);
        assert_eq!(dao.get_role_description("nobody").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn permission_and_subscription_roles() -> Result<()> {
        let dao = PermissionDao::new(memory_pool().await);
        dao.upsert_permission("edit-room", &["admin".to_string(), "owner".to_string()])
            .await?;
        dao.upsert_subscription_roles("r1", &["owner".to_string()])
            .await?;

        assert_eq!(dao.get_permission_roles("edit-room").await?.len(), 2);
        assert!(dao.get_permission_roles("unknown").await?.is_empty());
        assert_eq!(dao.get_subscription_roles("r1").await?, vec!["owner"]);
        assert!(dao.get_subscription_roles("r2").await?.is_empty());
        Ok(())
    }
}
