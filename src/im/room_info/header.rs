//! 页面头部配置与房间标题（纯函数，只依赖状态快照）

use crate::im::room_info::listener::EditTarget;
use crate::im::room_info::models::{Room, RoomKind};
use crate::im::room_info::store::RoomInfoState;

/// 头部左侧按钮
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLeft {
    Back,
    CloseModal,
}

/// 头部标题
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderTitle {
    UserInfo,
    RoomInfo,
}

impl HeaderTitle {
    /// 多语言 key
    pub fn i18n_key(&self) -> &'static str {
        match self {
            HeaderTitle::UserInfo => "User_Info",
            HeaderTitle::RoomInfo => "Room_Info",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderConfig {
    pub left: HeaderLeft,
    pub title: HeaderTitle,
    /// 编辑按钮，None 表示不显示
    pub edit: Option<EditTarget>,
}

/// 根据当前状态计算头部配置
pub fn derive_header_config(state: &RoomInfoState) -> HeaderConfig {
    let left = if state.show_close_modal {
        HeaderLeft::CloseModal
    } else {
        HeaderLeft::Back
    };
    let title = if state.room.t == RoomKind::Direct {
        HeaderTitle::UserInfo
    } else {
        HeaderTitle::RoomInfo
    };
    let edit = state.show_edit.then(|| edit_target(&state.room));
    HeaderConfig { left, title, edit }
}

/// 编辑按钮打开的页面
pub fn edit_target(room: &Room) -> EditTarget {
    if room.t == RoomKind::Livechat {
        EditTarget::LivechatEdit
    } else {
        EditTarget::RoomInfoEdit
    }
}

/// 房间标题：讨论组或开启真实姓名时优先 fname
pub fn room_title(room: &Room, use_real_name: bool) -> String {
    if room.effective_kind() == RoomKind::Discussion || use_real_name {
        if let Some(fname) = room.fname.as_deref().filter(|f| !f.is_empty()) {
            return fname.to_string();
        }
    }
    room.name.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::room_info::models::{CapabilityMap, Permission};
    use crate::im::room_info::store::{RoomInfoStore, SnapshotSource};

    fn state_for(room: Room, granted: bool, close_modal: bool) -> RoomInfoState {
        let store = RoomInfoStore::new(room.clone());
        store.reset(room.clone(), None, close_modal);
        let v = store.next_version(SnapshotSource::Permission);
        store.apply_capabilities(
            CapabilityMap::new(room.rid.clone()).with(Permission::EditRoom, granted),
            v,
        );
        store.snapshot()
    }

    #[test]
    fn direct_room_shows_user_info_title() {
        let config = derive_header_config(&state_for(
            Room::placeholder("dm", RoomKind::Direct),
            false,
            false,
        ));
        assert_eq!(config.title, HeaderTitle::UserInfo);
        assert_eq!(config.title.i18n_key(), "User_Info");
        assert_eq!(config.left, HeaderLeft::Back);
        assert_eq!(config.edit, None);
    }

    #[test]
    fn close_modal_and_edit_targets() {
        let config = derive_header_config(&state_for(
            Room::placeholder("l1", RoomKind::Livechat),
            true,
            true,
        ));
        assert_eq!(config.left, HeaderLeft::CloseModal);
        assert_eq!(config.title, HeaderTitle::RoomInfo);
        assert_eq!(config.edit, Some(EditTarget::LivechatEdit));

        let config = derive_header_config(&state_for(
            Room::placeholder("c1", RoomKind::Channel),
            true,
            false,
        ));
        assert_eq!(config.edit, Some(EditTarget::RoomInfoEdit));
    }

    #[test]
    fn discussion_never_shows_edit() {
        let mut room = Room::placeholder("c1", RoomKind::Channel);
        room.prid = Some("parent".to_string());
        let config = derive_header_config(&state_for(room, true, false));
        assert_eq!(config.edit, None);
    }

    #[test]
    fn title_prefers_fname_for_discussions_and_real_names() {
        let mut room = Room::placeholder("dm", RoomKind::Direct);
        room.name = "alice".to_string();
        room.fname = Some("Alice Liddell".to_string());
        assert_eq!(room_title(&room, false), "alice");
        assert_eq!(room_title(&room, true), "Alice Liddell");

        room.prid = Some("parent".to_string());
        assert_eq!(room_title(&room, false), "Alice Liddell");

        room.fname = Some(String::new());
        assert_eq!(room_title(&room, true), "alice");
    }
}
