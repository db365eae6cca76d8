//! 房间信息本地模型定义

use crate::im::room_info::observer::LiveRoom;
use crate::im::room_info::types::deserialize_vec_or_null;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 房间类型（对应服务器的 `t` 字段）
///
/// `Discussion` 不会出现在服务器数据里，带 `prid` 的房间通过 [`Room::effective_kind`] 得到它。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomKind {
    #[serde(rename = "d")]
    Direct,
    #[serde(rename = "c")]
    Channel,
    #[serde(rename = "p")]
    PrivateGroup,
    #[serde(rename = "l")]
    Livechat,
    #[serde(rename = "discussion")]
    Discussion,
}

impl RoomKind {
    /// 服务器使用的类型代码
    pub fn code(&self) -> &'static str {
        match self {
            RoomKind::Direct => "d",
            RoomKind::Channel => "c",
            RoomKind::PrivateGroup => "p",
            RoomKind::Livechat => "l",
            RoomKind::Discussion => "discussion",
        }
    }

    /// 解析类型代码，未知代码返回 None
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "d" => Some(RoomKind::Direct),
            "c" => Some(RoomKind::Channel),
            "p" => Some(RoomKind::PrivateGroup),
            "l" => Some(RoomKind::Livechat),
            "discussion" => Some(RoomKind::Discussion),
            _ => None,
        }
    }
}

/// 全渠道（livechat）房间上的访客引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorRef {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// 房间快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// 房间 ID（首次私聊时可能为空，直到服务器创建会话）
    #[serde(rename = "rid", alias = "_id", default)]
    pub rid: String,
    pub t: RoomKind,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fname: Option<String>,
    /// 父房间 ID，存在时表示讨论组
    #[serde(default)]
    pub prid: Option<String>,
    /// 参与者 ID 列表（私聊）
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub uids: Vec<String>,
    #[serde(default)]
    pub visitor: Option<VisitorRef>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub announcement: Option<String>,
    #[serde(default)]
    pub broadcast: bool,
}

impl Room {
    /// 只含 ID 和类型的占位房间（来自导航参数）
    pub fn placeholder(rid: impl Into<String>, t: RoomKind) -> Self {
        Self {
            rid: rid.into(),
            t,
            name: String::new(),
            fname: None,
            prid: None,
            uids: Vec::new(),
            visitor: None,
            topic: None,
            description: None,
            announcement: None,
            broadcast: false,
        }
    }

    /// 是否已有可路由的房间 ID
    pub fn is_routable(&self) -> bool {
        !self.rid.is_empty()
    }

    pub fn is_discussion(&self) -> bool {
        self.prid.is_some()
    }

    /// 实际展示的房间类型
    pub fn effective_kind(&self) -> RoomKind {
        if self.is_discussion() {
            RoomKind::Discussion
        } else {
            self.t
        }
    }

    /// 私聊对方的用户 ID：参与者列表去掉自己，否则从房间 ID 中去掉自己的 ID
    pub fn direct_counterpart_id(&self, own_user_id: &str) -> Option<String> {
        if let Some(uid) = self.uids.iter().find(|uid| uid.as_str() != own_user_id) {
            return Some(uid.clone());
        }
        if self.rid.is_empty() || !self.rid.contains(own_user_id) {
            return None;
        }
        let other = self.rid.replacen(own_user_id, "", 1);
        if other.is_empty() {
            None
        } else {
            Some(other)
        }
    }
}

/// 访客设备信息（从 user agent 解析一次）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub os: String,
    pub browser: String,
}

/// 房间对方：私聊中的用户或全渠道中的访客
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomUser {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "statusText", default)]
    pub status_text: Option<String>,
    /// 角色 ID 列表（仅用户）
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub roles: Vec<String>,
    /// 与 `roles` 一一对应的角色描述，查询失败的位置为 None
    #[serde(rename = "parsedRoles", default)]
    pub parsed_roles: Vec<Option<String>>,
    #[serde(rename = "userAgent", default)]
    pub user_agent: Option<String>,
    /// 设备信息（仅访客）
    #[serde(default)]
    pub device: Option<DeviceDescriptor>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(rename = "lastLogin", default)]
    pub last_login: Option<DateTime<Utc>>,
}

impl RoomUser {
    /// 只有 ID 和用户名的最小用户
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            username: username.into(),
            status: None,
            status_text: None,
            roles: Vec::new(),
            parsed_roles: Vec::new(),
            user_agent: None,
            device: None,
            email: None,
            phone: None,
            ip: None,
            host: None,
            last_login: None,
        }
    }
}

/// 权限名称（封闭枚举，避免字符串拼写错误）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "edit-room")]
    EditRoom,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::EditRoom => "edit-room",
        }
    }
}

/// 某个房间上的权限结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityMap {
    pub rid: String,
    grants: HashMap<Permission, bool>,
}

impl CapabilityMap {
    pub fn new(rid: impl Into<String>) -> Self {
        Self {
            rid: rid.into(),
            grants: HashMap::new(),
        }
    }

    pub fn with(mut self, permission: Permission, granted: bool) -> Self {
        self.grants.insert(permission, granted);
        self
    }

    pub fn set(&mut self, permission: Permission, granted: bool) {
        self.grants.insert(permission, granted);
    }

    /// 未出现在结果中的权限视为未授予
    pub fn is_granted(&self, permission: Permission) -> bool {
        self.grants.get(&permission).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

/// 房间信息配置
#[derive(Clone, Debug)]
pub struct RoomInfoConfig {
    /// 当前登录用户 ID
    pub user_id: String,
    /// 认证 token
    pub token: String,
    /// REST API 基础地址
    pub api_base_url: String,
    /// 本地 SQLite 数据库 URL
    pub db_path: String,
    /// 私聊标题是否显示真实姓名
    pub use_real_name: bool,
    /// 当前用户的全局角色（用于本地权限判断）
    pub user_roles: Vec<String>,
}

impl RoomInfoConfig {
    /// 创建默认配置
    pub fn new(user_id: String, token: String) -> Self {
        Self {
            user_id,
            token,
            api_base_url: "http://localhost:3000".to_string(),
            db_path: "sqlite://room_info.db?mode=rwc".to_string(),
            use_real_name: false,
            user_roles: vec!["user".to_string()],
        }
    }
}

/// 打开房间信息页时的导航参数
#[derive(Debug, Clone)]
pub struct RoomInfoParams {
    /// 房间 ID，首次私聊时为空
    pub rid: String,
    pub kind: RoomKind,
    /// 本地库中的房间句柄（支持变更推送）
    pub room: Option<LiveRoom>,
    /// 预先加载的对方用户
    pub room_user: Option<RoomUser>,
    /// 导航时已知的参与者 ID
    pub uids: Vec<String>,
    /// 是否显示关闭按钮而不是返回按钮
    pub show_close_modal: bool,
}

impl RoomInfoParams {
    pub fn new(rid: impl Into<String>, kind: RoomKind) -> Self {
        Self {
            rid: rid.into(),
            kind,
            room: None,
            room_user: None,
            uids: Vec::new(),
            show_close_modal: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discussion_is_derived_from_parent_reference() {
        let mut room = Room::placeholder("r1", RoomKind::Channel);
        assert_eq!(room.effective_kind(), RoomKind::Channel);
        room.prid = Some("parent".to_string());
        assert_eq!(room.effective_kind(), RoomKind::Discussion);
    }

    #[test]
    fn direct_counterpart_prefers_participant_list() {
        let mut room = Room::placeholder("", RoomKind::Direct);
        room.uids = vec!["me".to_string(), "alice".to_string()];
        assert_eq!(room.direct_counterpart_id("me").as_deref(), Some("alice"));
    }

    #[test]
    fn direct_counterpart_falls_back_to_room_id() {
        let room = Room::placeholder("aliceme", RoomKind::Direct);
        assert_eq!(room.direct_counterpart_id("me").as_deref(), Some("alice"));

        let unrelated = Room::placeholder("xyz", RoomKind::Direct);
        assert_eq!(unrelated.direct_counterpart_id("me"), None);
        assert_eq!(Room::placeholder("", RoomKind::Direct).direct_counterpart_id("me"), None);
    }

    #[test]
    fn room_deserializes_from_server_shape() {
        let json = r#"{"_id":"GENERAL","t":"c","name":"general","uids":null,"prid":null}"#;
        let room: Room = serde_json::from_str(json).unwrap();
        assert_eq!(room.rid, "GENERAL");
        assert_eq!(room.t, RoomKind::Channel);
        assert!(room.uids.is_empty());
        assert!(!room.is_discussion());
    }

    #[test]
    fn missing_capability_is_denied() {
        let caps = CapabilityMap::new("r1");
        assert!(!caps.is_granted(Permission::EditRoom));
        let caps = caps.with(Permission::EditRoom, true);
        assert!(caps.is_granted(Permission::EditRoom));
        assert_eq!(Permission::EditRoom.as_str(), "edit-room");
    }
}
