//! 本地房间存储与变更观察
//!
//! `LocalRoomStore` 把房间写入 SQLite，并通过 `watch` 通道把每次写入推送给持有
//! `LiveRoom` 句柄的页面。`RoomObserver` 把句柄变成一个惰性的、无限的、可取消的快照流。

use crate::im::room_info::dao::RoomDao;
use crate::im::room_info::models::Room;
use anyhow::Result;
use futures_util::{Stream, StreamExt};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 本地库中某个房间的实时句柄
#[derive(Debug, Clone)]
pub struct LiveRoom {
    rid: String,
    rx: watch::Receiver<Room>,
}

impl LiveRoom {
    pub fn rid(&self) -> &str {
        &self.rid
    }

    /// 句柄当前持有的房间
    pub fn current(&self) -> Room {
        self.rx.borrow().clone()
    }
}

/// 本地房间存储（持久化 + 变更推送）
pub struct LocalRoomStore {
    dao: RoomDao,
    channels: Mutex<HashMap<String, watch::Sender<Room>>>,
    /// 串行化写入，保证推送顺序与写入顺序一致
    write_lock: tokio::sync::Mutex<()>,
}

impl LocalRoomStore {
    pub fn new(dao: RoomDao) -> Self {
        Self {
            dao,
            channels: Mutex::new(HashMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn channels(&self) -> std::sync::MutexGuard<'_, HashMap<String, watch::Sender<Room>>> {
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 获取房间的实时句柄，本地不存在该房间时返回 None
    pub async fn live_room(&self, rid: &str) -> Result<Option<LiveRoom>> {
        let _guard = self.write_lock.lock().await;

        if let Some(tx) = self.channels().get(rid) {
            return Ok(Some(LiveRoom {
                rid: rid.to_string(),
                rx: tx.subscribe(),
            }));
        }

        let Some(room) = self.dao.get_room(rid).await? else {
            return Ok(None);
        };
        let (tx, rx) = watch::channel(room);
        self.channels().insert(rid.to_string(), tx);
        debug!("[RoomStore] 创建房间实时句柄: {}", rid);
        Ok(Some(LiveRoom {
            rid: rid.to_string(),
            rx,
        }))
    }

    /// 写入房间并推送给所有实时句柄
    pub async fn upsert_room(&self, room: &Room) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.dao.upsert_room(room).await?;

        let mut channels = self.channels();
        if let Some(tx) = channels.get(&room.rid) {
            if tx.receiver_count() == 0 {
                channels.remove(&room.rid);
                debug!("[RoomStore] 房间 {} 已无订阅者，移除推送通道", room.rid);
            } else {
                tx.send_replace(room.clone());
                debug!(
                    "[RoomStore] 推送房间变更: {}, 订阅者数: {}",
                    room.rid,
                    tx.receiver_count()
                );
            }
        }
        Ok(())
    }
}

/// 房间变更观察器
pub struct RoomObserver;

impl RoomObserver {
    /// 观察一个实时句柄
    ///
    /// 第一个元素是句柄当前的房间（立即就绪），之后每次变更产生一个快照。
    /// 流在存储端关闭前不会结束。
    pub fn observe(live: &LiveRoom) -> impl Stream<Item = Room> + Send + 'static {
        let rx = live.rx.clone();
        futures_util::stream::unfold((rx, true), |(mut rx, first)| async move {
            if first {
                let room = rx.borrow_and_update().clone();
                return Some((room, (rx, false)));
            }
            match rx.changed().await {
                Ok(()) => {
                    let room = rx.borrow_and_update().clone();
                    Some((room, (rx, false)))
                }
                Err(_) => None,
            }
        })
    }

    /// 在后台消费变更流，每个快照交给 `on_change`，直到 `parent` 或订阅本身被取消
    pub fn spawn<S, F>(changes: S, parent: &CancellationToken, mut on_change: F) -> RoomSubscription
    where
        S: Stream<Item = Room> + Send + 'static,
        F: FnMut(Room) + Send + 'static,
    {
        let token = parent.child_token();
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            let mut changes = std::pin::pin!(changes);
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    next = changes.next() => match next {
                        Some(room) => on_change(room),
                        None => break,
                    },
                }
            }
            debug!("[RoomObserver] 房间订阅结束");
        });

        RoomSubscription {
            token,
            handle: Some(handle),
        }
    }
}

/// 一个正在运行的房间订阅
pub struct RoomSubscription {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RoomSubscription {
    /// 取消订阅（可重复调用）
    pub fn unsubscribe(&mut self) {
        if !self.token.is_cancelled() {
            info!("[RoomObserver] 取消房间订阅");
        }
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 取消探针：返回的 token 在订阅取消后变为已取消
    pub fn probe(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for RoomSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::db::memory_pool;
    use crate::im::room_info::models::RoomKind;
    use futures_util::FutureExt;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    async fn store_with(room: &Room) -> LocalRoomStore {
        let store = LocalRoomStore::new(RoomDao::new(memory_pool().await));
        store.upsert_room(room).await.unwrap();
        store
    }

    #[tokio::test]
    async fn unknown_room_has_no_live_handle() {
        let store = LocalRoomStore::new(RoomDao::new(memory_pool().await));
        assert!(store.live_room("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn first_emission_is_current_value_then_changes_in_order() {
        let mut room = Room::placeholder("r1", RoomKind::Channel);
        room.name = "v0".to_string();
        let store = store_with(&room).await;
        let live = store.live_room("r1").await.unwrap().unwrap();

        let mut changes = Box::pin(RoomObserver::observe(&live));
        let first = changes.next().now_or_never().flatten().unwrap();
        assert_eq!(first.name, "v0");

        room.name = "v1".to_string();
        store.upsert_room(&room).await.unwrap();
        assert_eq!(changes.next().await.unwrap().name, "v1");

        room.name = "v2".to_string();
        store.upsert_room(&room).await.unwrap();
        assert_eq!(changes.next().await.unwrap().name, "v2");
    }

    #[tokio::test]
    async fn spawned_subscription_forwards_until_unsubscribed() {
        let mut room = Room::placeholder("r1", RoomKind::Channel);
        let store = Arc::new(store_with(&room).await);
        let live = store.live_room("r1").await.unwrap().unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let parent = CancellationToken::new();
        let mut sub = RoomObserver::spawn(RoomObserver::observe(&live), &parent, move |r| {
            let _ = tx.send(r.name);
        });
        assert_eq!(rx.recv().await.as_deref(), Some(""));

        room.name = "changed".to_string();
        store.upsert_room(&room).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("changed"));

        let probe = sub.probe();
        sub.unsubscribe();
        sub.unsubscribe();
        assert!(probe.is_cancelled());
        assert!(!parent.is_cancelled());
        // 任务结束后发送端被丢弃
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn parent_cancellation_stops_subscription() {
        let room = Room::placeholder("r1", RoomKind::Channel);
        let store = store_with(&room).await;
        let live = store.live_room("r1").await.unwrap().unwrap();

        let parent = CancellationToken::new();
        let sub = RoomObserver::spawn(RoomObserver::observe(&live), &parent, |_| {});
        parent.cancel();
        assert!(sub.is_cancelled());
    }
}
