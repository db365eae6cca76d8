//! 房间信息页面的导航回调接口

use crate::im::room_info::models::{Room, RoomKind, RoomUser};
use async_trait::async_trait;

/// 打开房间时的导航方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationMode {
    /// 主从布局（平板）下在详情区打开
    MasterDetail,
    /// 房间已经在导航栈中，直接返回过去
    Navigate,
    /// 压入新页面
    Push,
}

/// 宿主提供的导航上下文
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GoRoomContext {
    pub is_master_detail: bool,
    /// 目标房间是否已经在导航栈中
    pub room_already_open: bool,
}

impl GoRoomContext {
    pub fn mode(&self) -> NavigationMode {
        if self.is_master_detail {
            NavigationMode::MasterDetail
        } else if self.room_already_open {
            NavigationMode::Navigate
        } else {
            NavigationMode::Push
        }
    }
}

/// 打开房间请求
#[derive(Debug, Clone, PartialEq)]
pub struct GoRoomRequest {
    pub rid: String,
    /// 房间标题
    pub name: String,
    pub kind: RoomKind,
    /// 私聊对方用户 ID
    pub room_user_id: Option<String>,
    pub mode: NavigationMode,
}

/// 编辑页面
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    LivechatEdit,
    RoomInfoEdit,
}

/// 编辑房间请求
#[derive(Debug, Clone, PartialEq)]
pub struct EditRoomRequest {
    pub target: EditTarget,
    pub rid: String,
    pub room: Room,
    pub room_user: Option<RoomUser>,
}

/// 房间信息监听器回调接口
#[async_trait]
pub trait RoomInfoListener: Send + Sync {
    /// 请求打开房间
    async fn on_go_room(&self, request: GoRoomRequest);

    /// 请求打开编辑页面
    async fn on_edit_room(&self, request: EditRoomRequest);

    /// 请求发起视频通话
    async fn on_video_call(&self, rid: String);
}

/// 默认空实现（无操作）
pub struct EmptyRoomInfoListener;

#[async_trait]
impl RoomInfoListener for EmptyRoomInfoListener {
    async fn on_go_room(&self, _request: GoRoomRequest) {
        // 默认不做任何处理
    }

    async fn on_edit_room(&self, _request: EditRoomRequest) {
        // 默认不做任何处理
    }

    async fn on_video_call(&self, _rid: String) {
        // 默认不做任何处理
    }
}
