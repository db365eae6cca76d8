//! 房间信息模块
//!
//! 房间信息页面的状态同步：本地库变更推送、远程刷新、权限判断和导航回调

pub mod api;
pub mod dao;
pub mod error;
pub mod header;
pub mod listener;
pub mod models;
pub mod observer;
pub mod permission;
pub mod roles;
pub mod service;
pub mod store;
pub mod types;
pub mod user_agent;

// 重新导出主要类型和函数
pub use api::{RoomInfoApi, RoomInfoRemote};
pub use dao::{PermissionDao, RoleDao, RoomDao};
pub use error::{RoomInfoError, RoomInfoResult};
pub use header::{derive_header_config, room_title, HeaderConfig, HeaderLeft, HeaderTitle};
pub use listener::{
    EditRoomRequest, EditTarget, EmptyRoomInfoListener, GoRoomContext, GoRoomRequest,
    NavigationMode, RoomInfoListener,
};
pub use models::{
    CapabilityMap, DeviceDescriptor, Permission, Room, RoomInfoConfig, RoomInfoParams, RoomKind,
    RoomUser, VisitorRef,
};
pub use observer::{LiveRoom, LocalRoomStore, RoomObserver, RoomSubscription};
pub use permission::{LocalPermissionEvaluator, PermissionEvaluator};
pub use roles::{RoleDescriptionCache, RoleDescriptionSource};
pub use service::{FocusEvent, RoomInfoController};
pub use store::{LoadPhase, RoomInfoState, RoomInfoStore, SnapshotSource, SnapshotVersion};
pub use user_agent::parse_user_agent;
