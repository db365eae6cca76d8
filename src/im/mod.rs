pub mod db;
pub mod room_info;
pub mod types;

// 重新导出房间信息相关类型
pub use room_info::{
    RoomInfoConfig, RoomInfoController, RoomInfoError, RoomInfoListener, RoomInfoParams,
    RoomInfoState,
};
