//! 房间信息状态存储
//!
//! 每个控制器持有一个实例，只有该控制器写入。每个字段组（房间、对方用户、权限）
//! 记录最后一次接受的快照版本，版本不大于当前版本的快照会被丢弃。
//! 版本来自存储自己的逻辑时钟：远程请求在发起时取号，观察者推送在到达时取号。

use crate::im::room_info::models::{CapabilityMap, Permission, Room, RoomUser};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

/// 快照来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Navigation,
    Observer,
    Fetch,
    Resolve,
    Permission,
}

/// 快照的逻辑版本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotVersion {
    pub seq: u64,
    pub source: SnapshotSource,
}

/// 加载阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    Loading,
    Ready,
}

/// 展示层读取的完整状态
#[derive(Debug, Clone)]
pub struct RoomInfoState {
    pub phase: LoadPhase,
    pub room: Room,
    pub room_user: Option<RoomUser>,
    pub capabilities: CapabilityMap,
    /// 是否显示编辑按钮
    pub show_edit: bool,
    pub show_close_modal: bool,
}

impl RoomInfoState {
    fn new(room: Room) -> Self {
        let capabilities = CapabilityMap::new(room.rid.clone());
        Self {
            phase: LoadPhase::Idle,
            room,
            room_user: None,
            capabilities,
            show_edit: false,
            show_close_modal: false,
        }
    }

    /// 编辑权限已授予且不是讨论组
    fn recompute_show_edit(&mut self) {
        self.show_edit =
            self.capabilities.is_granted(Permission::EditRoom) && self.room.prid.is_none();
    }
}

struct Inner {
    state: RoomInfoState,
    room_version: u64,
    room_user_version: u64,
    capabilities_version: u64,
}

/// 房间信息状态存储
pub struct RoomInfoStore {
    clock: AtomicU64,
    inner: Mutex<Inner>,
    tx: watch::Sender<RoomInfoState>,
}

impl RoomInfoStore {
    pub fn new(room: Room) -> Self {
        let state = RoomInfoState::new(room);
        let (tx, _) = watch::channel(state.clone());
        Self {
            clock: AtomicU64::new(0),
            inner: Mutex::new(Inner {
                state,
                room_version: 0,
                room_user_version: 0,
                capabilities_version: 0,
            }),
            tx,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, state: &RoomInfoState) {
        self.tx.send_replace(state.clone());
    }

    /// 取一个新的版本号
    pub fn next_version(&self, source: SnapshotSource) -> SnapshotVersion {
        SnapshotVersion {
            seq: self.clock.fetch_add(1, Ordering::SeqCst) + 1,
            source,
        }
    }

    /// 订阅状态变更
    pub fn subscribe(&self) -> watch::Receiver<RoomInfoState> {
        self.tx.subscribe()
    }

    /// 当前的房间、对方用户和权限
    pub fn current(&self) -> (Room, Option<RoomUser>, CapabilityMap) {
        let inner = self.lock();
        (
            inner.state.room.clone(),
            inner.state.room_user.clone(),
            inner.state.capabilities.clone(),
        )
    }

    pub fn snapshot(&self) -> RoomInfoState {
        self.lock().state.clone()
    }

    /// 用导航参数重置状态，进入 Loading
    pub fn reset(&self, room: Room, room_user: Option<RoomUser>, show_close_modal: bool) {
        let seeded = self.next_version(SnapshotSource::Navigation).seq;
        let mut inner = self.lock();
        let mut state = RoomInfoState::new(room);
        state.room_user = room_user;
        state.show_close_modal = show_close_modal;
        state.phase = LoadPhase::Loading;
        inner.state = state;
        inner.room_version = seeded;
        inner.room_user_version = seeded;
        inner.capabilities_version = seeded;
        self.publish(&inner.state);
    }

    /// 没有新快照也进入 Ready（加载失败时保留占位数据）
    pub fn mark_ready(&self) {
        let mut inner = self.lock();
        if inner.state.phase == LoadPhase::Loading {
            inner.state.phase = LoadPhase::Ready;
            self.publish(&inner.state);
        }
    }

    pub fn mark_idle(&self) {
        let mut inner = self.lock();
        if inner.state.phase != LoadPhase::Idle {
            inner.state.phase = LoadPhase::Idle;
            self.publish(&inner.state);
        }
    }

    /// 应用房间快照，返回是否被接受
    pub fn apply_room_snapshot(&self, mut room: Room, version: SnapshotVersion) -> bool {
        let mut inner = self.lock();
        if version.seq <= inner.room_version {
            debug!(
                "[RoomStore] 丢弃过期房间快照: {:?}, 当前版本: {}",
                version, inner.room_version
            );
            return false;
        }
        let current = &inner.state.room;
        if current.is_routable() && room.rid != current.rid {
            warn!(
                "[RoomStore] 房间 ID 不一致，忽略快照: 当前 {}, 收到 {}",
                current.rid, room.rid
            );
            return false;
        }
        if room.t != current.t {
            warn!(
                "[RoomStore] 房间类型不可变，保留 {:?}（收到 {:?}）",
                current.t, room.t
            );
            room.t = current.t;
        }

        inner.room_version = version.seq;
        inner.state.room = room;
        inner.state.phase = LoadPhase::Ready;
        inner.state.recompute_show_edit();
        self.publish(&inner.state);
        true
    }

    /// 首次私聊时把服务器创建的房间 ID 合并进当前房间
    pub fn apply_routable_id(&self, rid: String, version: SnapshotVersion) -> bool {
        let mut inner = self.lock();
        if version.seq <= inner.room_version {
            debug!("[RoomStore] 丢弃过期房间 ID: {:?}", version);
            return false;
        }
        if inner.state.room.is_routable() {
            if inner.state.room.rid != rid {
                warn!(
                    "[RoomStore] 房间已有 ID {}，忽略 {}",
                    inner.state.room.rid, rid
                );
            }
            return false;
        }

        inner.room_version = version.seq;
        inner.state.room.rid = rid;
        inner.state.phase = LoadPhase::Ready;
        self.publish(&inner.state);
        true
    }

    /// 应用对方用户快照
    pub fn apply_room_user_snapshot(&self, room_user: RoomUser, version: SnapshotVersion) -> bool {
        let mut inner = self.lock();
        if version.seq <= inner.room_user_version {
            debug!(
                "[RoomStore] 丢弃过期用户快照: {:?}, 当前版本: {}",
                version, inner.room_user_version
            );
            return false;
        }
        inner.room_user_version = version.seq;
        inner.state.room_user = Some(room_user);
        inner.state.phase = LoadPhase::Ready;
        self.publish(&inner.state);
        true
    }

    /// 应用权限结果并重新计算编辑按钮
    pub fn apply_capabilities(&self, capabilities: CapabilityMap, version: SnapshotVersion) -> bool {
        let mut inner = self.lock();
        if version.seq <= inner.capabilities_version {
            debug!("[RoomStore] 丢弃过期权限结果: {:?}", version);
            return false;
        }
        if inner.state.room.is_routable() && capabilities.rid != inner.state.room.rid {
            warn!(
                "[RoomStore] 权限结果属于其他房间 {}，忽略",
                capabilities.rid
            );
            return false;
        }
        inner.capabilities_version = version.seq;
        inner.state.capabilities = capabilities;
        inner.state.phase = LoadPhase::Ready;
        inner.state.recompute_show_edit();
        self.publish(&inner.state);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::room_info::models::RoomKind;

    fn named(rid: &str, name: &str) -> Room {
        let mut room = Room::placeholder(rid, RoomKind::Channel);
        room.name = name.to_string();
        room
    }

    #[test]
    fn observer_emission_wins_over_older_fetch() {
        let store = RoomInfoStore::new(Room::placeholder("r1", RoomKind::Channel));
        store.reset(Room::placeholder("r1", RoomKind::Channel), None, false);

        // 请求先发起，观察者推送后到
        let fetch = store.next_version(SnapshotSource::Fetch);
        let observed = store.next_version(SnapshotSource::Observer);

        assert!(store.apply_room_snapshot(named("r1", "live"), observed));
        assert!(!store.apply_room_snapshot(named("r1", "stale"), fetch));
        assert_eq!(store.current().0.name, "live");
    }

    #[test]
    fn older_room_user_never_overwrites_newer() {
        let store = RoomInfoStore::new(Room::placeholder("r1", RoomKind::Livechat));
        store.reset(Room::placeholder("r1", RoomKind::Livechat), None, false);

        let first = store.next_version(SnapshotSource::Fetch);
        let second = store.next_version(SnapshotSource::Fetch);
        assert!(store.apply_room_user_snapshot(RoomUser::new("v1", "new"), second));
        assert!(!store.apply_room_user_snapshot(RoomUser::new("v1", "old"), first));
        assert_eq!(store.current().1.map(|u| u.username), Some("new".to_string()));
    }

    #[test]
    fn identifier_and_kind_are_immutable() {
        let store = RoomInfoStore::new(Room::placeholder("r1", RoomKind::Channel));
        store.reset(Room::placeholder("r1", RoomKind::Channel), None, false);

        let v = store.next_version(SnapshotSource::Fetch);
        assert!(!store.apply_room_snapshot(named("other", "x"), v));

        let mut wrong_kind = named("r1", "y");
        wrong_kind.t = RoomKind::PrivateGroup;
        let v = store.next_version(SnapshotSource::Fetch);
        assert!(store.apply_room_snapshot(wrong_kind, v));
        assert_eq!(store.current().0.t, RoomKind::Channel);
    }

    #[test]
    fn routable_id_is_merged_once() {
        let store = RoomInfoStore::new(Room::placeholder("", RoomKind::Direct));
        store.reset(Room::placeholder("", RoomKind::Direct), None, false);

        let v = store.next_version(SnapshotSource::Resolve);
        assert!(store.apply_routable_id("dm1".to_string(), v));
        let v = store.next_version(SnapshotSource::Resolve);
        assert!(!store.apply_routable_id("dm2".to_string(), v));
        assert_eq!(store.current().0.rid, "dm1");
    }

    #[test]
    fn edit_affordance_requires_permission_and_no_parent() {
        let store = RoomInfoStore::new(Room::placeholder("r1", RoomKind::Channel));
        store.reset(Room::placeholder("r1", RoomKind::Channel), None, false);

        let v = store.next_version(SnapshotSource::Permission);
        store.apply_capabilities(CapabilityMap::new("r1").with(Permission::EditRoom, true), v);
        assert!(store.snapshot().show_edit);

        // 房间变成讨论组后重新计算
        let mut discussion = named("r1", "d");
        discussion.prid = Some("parent".to_string());
        let v = store.next_version(SnapshotSource::Observer);
        store.apply_room_snapshot(discussion, v);
        assert!(!store.snapshot().show_edit);
    }

    #[test]
    fn phases_follow_lifecycle() {
        let store = RoomInfoStore::new(Room::placeholder("r1", RoomKind::Channel));
        let rx = store.subscribe();
        assert_eq!(rx.borrow().phase, LoadPhase::Idle);

        store.reset(Room::placeholder("r1", RoomKind::Channel), None, true);
        assert_eq!(rx.borrow().phase, LoadPhase::Loading);
        assert!(rx.borrow().show_close_modal);

        store.mark_ready();
        assert_eq!(rx.borrow().phase, LoadPhase::Ready);

        store.mark_idle();
        assert_eq!(rx.borrow().phase, LoadPhase::Idle);
    }
}
