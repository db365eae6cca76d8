//! 房间信息 API DTO（请求和响应结构体）

use crate::im::room_info::models::{Room, RoomKind, RoomUser};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// 反序列化数组字段，处理 null 值
pub(crate) fn deserialize_vec_or_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// `rooms.info` 响应
#[derive(Debug, Clone, Deserialize)]
pub struct RoomInfoResp {
    pub room: Room,
}

/// `users.info` 响应
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfoResp {
    pub user: RoomUser,
}

/// `livechat/visitors.info` 响应
#[derive(Debug, Clone, Deserialize)]
pub struct VisitorInfoResp {
    pub visitor: VisitorInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisitorEmail {
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisitorPhone {
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
}

/// 服务器返回的访客信息
#[derive(Debug, Clone, Deserialize)]
pub struct VisitorInfo {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "visitorEmails", default, deserialize_with = "deserialize_vec_or_null")]
    pub visitor_emails: Vec<VisitorEmail>,
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub phone: Vec<VisitorPhone>,
    #[serde(rename = "userAgent", default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(rename = "lastLogin", default)]
    pub last_login: Option<DateTime<Utc>>,
}

impl From<VisitorInfo> for RoomUser {
    fn from(v: VisitorInfo) -> Self {
        let mut user = RoomUser::new(v.id, v.username);
        user.name = v.name;
        user.status = v.status;
        user.email = v.visitor_emails.into_iter().next().map(|e| e.address);
        user.phone = v.phone.into_iter().next().map(|p| p.phone_number);
        user.user_agent = v.user_agent.filter(|ua| !ua.is_empty());
        user.ip = v.ip;
        user.host = v.host;
        user.last_login = v.last_login;
        user
    }
}

/// `im.create` 请求
#[derive(Debug, Clone, Serialize)]
pub struct CreateDirectMessageReq {
    pub username: String,
}

/// `im.create` 响应
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDirectMessageResp {
    pub room: DirectRoom,
}

/// 服务器新建（或已存在）的私聊房间
#[derive(Debug, Clone, Deserialize)]
pub struct DirectRoom {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub rid: Option<String>,
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub uids: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub usernames: Vec<String>,
}

impl DirectRoom {
    /// 服务器可能只返回 `_id` 或 `rid` 其中之一
    pub fn room_id(&self) -> Option<&str> {
        self.rid
            .as_deref()
            .filter(|rid| !rid.is_empty())
            .or(Some(self.id.as_str()).filter(|id| !id.is_empty()))
    }

    pub fn into_room(self) -> Option<Room> {
        let rid = self.room_id()?.to_string();
        let mut room = Room::placeholder(rid, RoomKind::Direct);
        room.uids = self.uids;
        Some(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visitor_takes_first_email_and_phone() {
        let json = r#"{
            "_id": "v1",
            "username": "guest-1",
            "visitorEmails": [{"address": "a@example.com"}, {"address": "b@example.com"}],
            "phone": [{"phoneNumber": "+100"}],
            "userAgent": "",
            "lastLogin": "2024-03-01T10:00:00.000Z"
        }"#;
        let visitor: VisitorInfo = serde_json::from_str(json).unwrap();
        let user = RoomUser::from(visitor);
        assert_eq!(user.email.as_deref(), Some("a@example.com"));
        assert_eq!(user.phone.as_deref(), Some("+100"));
        assert_eq!(user.user_agent, None);
        assert!(user.last_login.is_some());
    }

    #[test]
    fn direct_room_accepts_either_identifier() {
        let with_rid: DirectRoom =
            serde_json::from_str(r#"{"_id":"","rid":"abc","usernames":null}"#).unwrap();
        assert_eq!(with_rid.room_id(), Some("abc"));

        let with_id: DirectRoom = serde_json::from_str(r#"{"_id":"xyz"}"#).unwrap();
        assert_eq!(with_id.into_room().map(|r| r.rid), Some("xyz".to_string()));

        let empty: DirectRoom = serde_json::from_str(r#"{}"#).unwrap();
        assert!(empty.into_room().is_none());
    }
}
