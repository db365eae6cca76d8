//! 房间信息 HTTP API 客户端
//!
//! 负责所有房间信息相关的 HTTP 请求；不做重试，也不合并结果。

use crate::im::room_info::error::{RoomInfoError, RoomInfoResult};
use crate::im::room_info::models::{Room, RoomUser};
use crate::im::room_info::types::{
    CreateDirectMessageReq, CreateDirectMessageResp, RoomInfoResp, UserInfoResp, VisitorInfoResp,
};
use crate::im::types::handle_rest_response;
use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

/// 远程刷新接口
#[async_trait]
pub trait RoomInfoRemote: Send + Sync {
    /// 获取房间（仅在没有本地实时句柄时使用）
    async fn fetch_room(&self, rid: &str) -> RoomInfoResult<Room>;

    /// 获取私聊对方用户
    async fn fetch_room_user(&self, user_id: &str) -> RoomInfoResult<RoomUser>;

    /// 获取全渠道访客
    async fn fetch_visitor(&self, visitor_id: &str) -> RoomInfoResult<RoomUser>;

    /// 按用户名获取或创建私聊房间
    async fn create_direct_message(&self, username: &str) -> RoomInfoResult<Room>;
}

/// 房间信息 HTTP API 客户端
pub struct RoomInfoApi {
    client: reqwest::Client,
    api_base_url: String,
    user_id: String,
}

impl RoomInfoApi {
    /// 创建新的房间信息 API 客户端
    ///
    /// `client` 应该已经在外部配置好认证头
    pub fn new(client: reqwest::Client, api_base_url: String, user_id: String) -> Self {
        Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            user_id,
        }
    }

    /// 创建带认证头的 HTTP 客户端（`X-User-Id` / `X-Auth-Token` 通过 default_headers 自动添加）
    pub fn build_http_client(user_id: &str, token: &str) -> anyhow::Result<reqwest::Client> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::HeaderName::from_static("x-user-id"),
            reqwest::header::HeaderValue::from_str(user_id).context("无效的 user id")?,
        );
        headers.insert(
            reqwest::header::HeaderName::from_static("x-auth-token"),
            reqwest::header::HeaderValue::from_str(token).context("无效的 token")?,
        );
        reqwest::ClientBuilder::new()
            .default_headers(headers)
            .build()
            .context("创建 HTTP 客户端失败")
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.api_base_url, path)
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        operation_name: &str,
    ) -> RoomInfoResult<T> {
        let operation_id = Uuid::new_v4().to_string();
        let url = self.url(path);

        info!("[RoomInfoAPI] 📡 请求{}", operation_name);
        debug!("[RoomInfoAPI]   请求URL: {}, 参数: {:?}", url, query);
        debug!(
            "[RoomInfoAPI]   用户ID: {}, 操作ID: {}",
            self.user_id, operation_id
        );

        let response = self
            .client
            .get(&url)
            .header("operationID", &operation_id)
            .query(query)
            .send()
            .await
            .map_err(|e| RoomInfoError::Transient(format!("请求失败: {}", e)))?;

        handle_rest_response(response, operation_name).await
    }
}

#[async_trait]
impl RoomInfoRemote for RoomInfoApi {
    async fn fetch_room(&self, rid: &str) -> RoomInfoResult<Room> {
        let resp: RoomInfoResp = self
            .get("rooms.info", &[("roomId", rid)], "房间信息")
            .await?;
        if !resp.room.is_routable() {
            return Err(RoomInfoError::Malformed("房间信息缺少 _id".to_string()));
        }
        Ok(resp.room)
    }

    async fn fetch_room_user(&self, user_id: &str) -> RoomInfoResult<RoomUser> {
        let resp: UserInfoResp = self
            .get("users.info", &[("userId", user_id)], "用户信息")
            .await?;
        if resp.user.id.is_empty() {
            return Err(RoomInfoError::Malformed("用户信息缺少 _id".to_string()));
        }
        Ok(resp.user)
    }

    async fn fetch_visitor(&self, visitor_id: &str) -> RoomInfoResult<RoomUser> {
        let resp: VisitorInfoResp = self
            .get(
                "livechat/visitors.info",
                &[("visitorId", visitor_id)],
                "访客信息",
            )
            .await?;
        if resp.visitor.id.is_empty() {
            return Err(RoomInfoError::Malformed("访客信息缺少 _id".to_string()));
        }
        Ok(resp.visitor.into())
    }

    async fn create_direct_message(&self, username: &str) -> RoomInfoResult<Room> {
        let operation_id = Uuid::new_v4().to_string();
        let url = self.url("im.create");

        info!("[RoomInfoAPI] 📡 请求创建私聊: {}", username);
        debug!(
            "[RoomInfoAPI]   请求URL: {}, 用户ID: {}, 操作ID: {}",
            url, self.user_id, operation_id
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&CreateDirectMessageReq {
                username: username.to_string(),
            })
            .send()
            .await
            .map_err(|e| RoomInfoError::Transient(format!("请求失败: {}", e)))?;

        let resp: CreateDirectMessageResp = handle_rest_response(response, "创建私聊").await?;
        let room = resp
            .room
            .into_room()
            .ok_or_else(|| RoomInfoError::Malformed("私聊房间缺少 ID".to_string()))?;
        info!("[RoomInfoAPI] ✅ 私聊房间: {}", room.rid);
        Ok(room)
    }
}
