pub mod im;

// 重新导出常用类型和函数，方便外部使用
pub use im::{
    db::create_sqlite_pool_with_schema,
    room_info::{
        derive_header_config, FocusEvent, LiveRoom, LoadPhase, LocalRoomStore, RoomKind,
        RoomUser,
    },
    RoomInfoConfig, RoomInfoController, RoomInfoError, RoomInfoListener, RoomInfoParams,
    RoomInfoState,
};
