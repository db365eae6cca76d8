//! 房间信息页面控制器
//!
//! 每个打开的房间信息页面对应一个 `RoomInfoController`。`attach` 开启一个新的附加周期
//! （epoch），周期内的所有后台任务都绑定到该周期的 `CancellationToken`，所有写入都经过
//! 周期检查：`detach` 之后到达的结果不会被应用。

use crate::im::db::create_sqlite_pool_with_schema;
use crate::im::room_info::api::{RoomInfoApi, RoomInfoRemote};
use crate::im::room_info::dao::{PermissionDao, RoleDao, RoomDao};
use crate::im::room_info::header::{derive_header_config, edit_target, room_title, HeaderConfig};
use crate::im::room_info::listener::{
    EditRoomRequest, EmptyRoomInfoListener, GoRoomContext, GoRoomRequest, RoomInfoListener,
};
use crate::im::room_info::models::{
    CapabilityMap, Permission, Room, RoomInfoConfig, RoomInfoParams, RoomKind, RoomUser,
};
use crate::im::room_info::observer::{LiveRoom, LocalRoomStore, RoomObserver, RoomSubscription};
use crate::im::room_info::permission::{LocalPermissionEvaluator, PermissionEvaluator};
use crate::im::room_info::roles::RoleDescriptionCache;
use crate::im::room_info::store::{RoomInfoState, RoomInfoStore, SnapshotSource, SnapshotVersion};
use crate::im::room_info::user_agent::parse_user_agent;
use anyhow::Result;
use futures_util::{FutureExt, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 页面焦点事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusEvent {
    Focused,
    Blurred,
}

/// 一个附加周期内的共享上下文
#[derive(Clone)]
struct EpochContext {
    token: CancellationToken,
    /// 与 detach 互斥，保证检查周期和写入是原子的
    gate: Arc<Mutex<()>>,
    store: Arc<RoomInfoStore>,
    remote: Arc<dyn RoomInfoRemote>,
    permissions: Arc<dyn PermissionEvaluator>,
    roles: Arc<RoleDescriptionCache>,
    own_user_id: String,
    /// 本周期是否已经发起过权限判断
    permissions_claimed: Arc<AtomicBool>,
}

impl EpochContext {
    /// 周期仍然有效时才写入状态
    fn apply<F>(&self, what: &str, write: F) -> bool
    where
        F: FnOnce(&RoomInfoStore) -> bool,
    {
        let _gate = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        if self.token.is_cancelled() {
            debug!("[RoomInfo] 页面已关闭，丢弃{}", what);
            return false;
        }
        write(&self.store)
    }

    /// 每个周期只判断一次权限，返回是否由调用方负责这一次
    fn claim_permission_check(&self) -> bool {
        !self.permissions_claimed.swap(true, Ordering::SeqCst)
    }

    fn mark_ready(&self) {
        self.apply("加载状态", |store| {
            store.mark_ready();
            true
        });
    }

    fn apply_observed(&self, room: Room) -> bool {
        let version = self.store.next_version(SnapshotSource::Observer);
        debug!("[RoomInfo] 收到房间变更: {}, 版本: {}", room.rid, version.seq);
        self.apply("房间变更", |store| store.apply_room_snapshot(room, version))
    }

    /// 没有本地句柄时从服务器加载房间
    async fn load_room(&self, rid: String) {
        let version = self.store.next_version(SnapshotSource::Fetch);
        match self.remote.fetch_room(&rid).await {
            Ok(room) => {
                info!("[RoomInfo] ✅ 房间加载完成: {}", rid);
                self.apply("房间信息", |store| store.apply_room_snapshot(room, version));
            }
            Err(e) => {
                warn!("[RoomInfo] 加载房间 {} 失败（{}）: {}", rid, e.kind(), e);
                self.mark_ready();
            }
        }
    }

    /// 加载私聊对方，再在需要时创建私聊房间
    async fn resolve_counterpart(&self, preloaded: Option<RoomUser>) {
        if let Some(user) = preloaded {
            debug!("[RoomInfo] 使用导航传入的对方用户: {}", user.id);
            self.resolve_room_id(&user.username).await;
            return;
        }

        let (room, _, _) = self.store.current();
        let Some(user_id) = room.direct_counterpart_id(&self.own_user_id) else {
            warn!("[RoomInfo] 无法确定私聊对方，房间: {:?}", room.rid);
            self.mark_ready();
            return;
        };

        let version = self.store.next_version(SnapshotSource::Fetch);
        match self.remote.fetch_room_user(&user_id).await {
            Ok(user) => {
                let username = user.username.clone();
                tokio::join!(
                    self.apply_counterpart(user, version),
                    self.resolve_room_id(&username)
                );
            }
            Err(e) => {
                warn!("[RoomInfo] 加载用户 {} 失败（{}）: {}", user_id, e.kind(), e);
                self.mark_ready();
            }
        }
    }

    async fn apply_counterpart(&self, mut user: RoomUser, version: SnapshotVersion) {
        user.parsed_roles = self.roles.parse_roles(&user.roles).await;
        debug!(
            "[RoomInfo] 对方用户 {} 角色: {:?} -> {:?}",
            user.id, user.roles, user.parsed_roles
        );
        self.apply("对方用户", |store| store.apply_room_user_snapshot(user, version));
    }

    /// 首次私聊：房间还没有 ID 时按用户名创建
    async fn resolve_room_id(&self, username: &str) {
        if self.store.current().0.is_routable() {
            return;
        }
        if username.is_empty() {
            warn!("[RoomInfo] 对方用户名为空，无法创建私聊");
            self.mark_ready();
            return;
        }

        let version = self.store.next_version(SnapshotSource::Resolve);
        match self.remote.create_direct_message(username).await {
            Ok(room) => {
                let rid = room.rid;
                if self.apply("私聊房间 ID", |store| store.apply_routable_id(rid.clone(), version)) {
                    info!("[RoomInfo] ✅ 私聊房间已创建: {}", rid);
                }
                // 观察者可能已经先给出了房间 ID，以当前房间为准
                let current = self.store.current().0;
                if current.is_routable() && self.claim_permission_check() {
                    self.evaluate_permissions(current.rid).await;
                }
            }
            Err(e) => {
                warn!("[RoomInfo] 创建与 {} 的私聊失败（{}）: {}", username, e.kind(), e);
                self.mark_ready();
            }
        }
    }

    /// 权限判断失败时按未授予处理
    async fn evaluate_permissions(&self, rid: String) {
        let version = self.store.next_version(SnapshotSource::Permission);
        let capabilities = match self
            .permissions
            .has_permission(&[Permission::EditRoom], &rid)
            .await
        {
            Ok(capabilities) => capabilities,
            Err(e) => {
                warn!("[RoomInfo] 房间 {} 权限判断失败（{}）: {}", rid, e.kind(), e);
                CapabilityMap::new(rid).with(Permission::EditRoom, false)
            }
        };
        self.apply("权限结果", |store| store.apply_capabilities(capabilities, version));
    }

    /// 加载全渠道访客（每次页面获得焦点都会重新加载）
    async fn load_visitor(&self) {
        let Some(visitor_id) = self.store.current().0.visitor.map(|v| v.id) else {
            debug!("[RoomInfo] 房间还没有访客信息，跳过");
            self.mark_ready();
            return;
        };

        let version = self.store.next_version(SnapshotSource::Fetch);
        match self.remote.fetch_visitor(&visitor_id).await {
            Ok(mut visitor) => {
                if visitor.device.is_none() {
                    visitor.device = visitor.user_agent.as_deref().and_then(parse_user_agent);
                }
                self.apply("访客信息", |store| {
                    store.apply_room_user_snapshot(visitor, version)
                });
            }
            Err(e) => {
                warn!("[RoomInfo] 加载访客 {} 失败（{}）: {}", visitor_id, e.kind(), e);
                self.mark_ready();
            }
        }
    }

    async fn watch_focus(&self, mut focus: broadcast::Receiver<FocusEvent>) {
        loop {
            match focus.recv().await {
                Ok(FocusEvent::Focused) => {
                    debug!("[RoomInfo] 页面重新获得焦点，刷新访客");
                    self.load_visitor().await;
                }
                Ok(FocusEvent::Blurred) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("[RoomInfo] 焦点事件积压，跳过 {} 个", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// 开始观察本地句柄：当前值同步应用，后续变更在后台应用
    fn start_observer(&self, live: &LiveRoom) -> RoomSubscription {
        let mut changes = Box::pin(RoomObserver::observe(live));
        if let Some(Some(room)) = changes.next().now_or_never() {
            self.apply_observed(room);
        }
        let ctx = self.clone();
        info!("[RoomInfo] 开始观察房间: {}", live.rid());
        RoomObserver::spawn(changes, &self.token, move |room| {
            ctx.apply_observed(room);
        })
    }

    /// 启动一个绑定到本周期的后台任务
    fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = task => {}
            }
        })
    }
}

struct Session {
    ctx: EpochContext,
    subscription: Option<RoomSubscription>,
    tasks: Vec<JoinHandle<()>>,
}

/// 房间信息页面控制器
pub struct RoomInfoController {
    own_user_id: String,
    use_real_name: bool,
    remote: Arc<dyn RoomInfoRemote>,
    permissions: Arc<dyn PermissionEvaluator>,
    roles: Arc<RoleDescriptionCache>,
    listener: Arc<dyn RoomInfoListener>,
    local_rooms: Option<Arc<LocalRoomStore>>,
    store: Arc<RoomInfoStore>,
    gate: Arc<Mutex<()>>,
    session: Mutex<Option<Session>>,
}

impl RoomInfoController {
    /// 创建控制器（使用默认空监听器）
    pub fn new(
        config: &RoomInfoConfig,
        remote: Arc<dyn RoomInfoRemote>,
        permissions: Arc<dyn PermissionEvaluator>,
        roles: Arc<RoleDescriptionCache>,
    ) -> Self {
        Self::with_listener(
            config,
            remote,
            permissions,
            roles,
            Arc::new(EmptyRoomInfoListener),
        )
    }

    /// 创建控制器（带自定义监听器）
    pub fn with_listener(
        config: &RoomInfoConfig,
        remote: Arc<dyn RoomInfoRemote>,
        permissions: Arc<dyn PermissionEvaluator>,
        roles: Arc<RoleDescriptionCache>,
        listener: Arc<dyn RoomInfoListener>,
    ) -> Self {
        Self {
            own_user_id: config.user_id.clone(),
            use_real_name: config.use_real_name,
            remote,
            permissions,
            roles,
            listener,
            local_rooms: None,
            store: Arc::new(RoomInfoStore::new(Room::placeholder("", RoomKind::Channel))),
            gate: Arc::new(Mutex::new(())),
            session: Mutex::new(None),
        }
    }

    /// 按配置创建完整的控制器：SQLite 本地库 + HTTP 客户端
    pub async fn from_config(
        config: RoomInfoConfig,
        listener: Arc<dyn RoomInfoListener>,
    ) -> Result<Self> {
        info!(
            "[RoomInfo] 创建房间信息控制器，用户ID: {}, SQLite数据库: {}",
            config.user_id, config.db_path
        );
        let db = create_sqlite_pool_with_schema(&config.db_path).await?;

        let http_client = RoomInfoApi::build_http_client(&config.user_id, &config.token)?;
        let remote = Arc::new(RoomInfoApi::new(
            http_client,
            config.api_base_url.clone(),
            config.user_id.clone(),
        ));
        let permissions = Arc::new(LocalPermissionEvaluator::new(
            PermissionDao::new(db.clone()),
            config.user_roles.clone(),
        ));
        let roles = Arc::new(RoleDescriptionCache::new(Arc::new(RoleDao::new(db.clone()))));

        let mut controller = Self::with_listener(&config, remote, permissions, roles, listener);
        controller.local_rooms = Some(Arc::new(LocalRoomStore::new(RoomDao::new(db))));
        Ok(controller)
    }

    /// 使用外部的本地房间存储
    pub fn with_local_rooms(mut self, local_rooms: Arc<LocalRoomStore>) -> Self {
        self.local_rooms = Some(local_rooms);
        self
    }

    pub fn local_rooms(&self) -> Option<Arc<LocalRoomStore>> {
        self.local_rooms.clone()
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 打开页面
    ///
    /// 必须在 tokio 运行时中调用。已经附加时会先关闭上一个周期。
    /// `focus` 为 None 时不监听重新获得焦点。
    pub fn attach(&self, params: RoomInfoParams, focus: Option<broadcast::Receiver<FocusEvent>>) {
        self.detach();

        let rid = params.rid.clone();
        let kind = params.kind;
        info!(
            "[RoomInfo] 打开房间信息页: {:?}, 类型: {:?}, 本地句柄: {}",
            rid,
            kind,
            params.room.is_some()
        );

        let live = params.room.filter(|live| {
            let matches = rid.is_empty() || live.rid() == rid;
            if !matches {
                warn!("[RoomInfo] 本地句柄 {} 与房间 {} 不一致，忽略", live.rid(), rid);
            }
            matches
        });

        let mut placeholder = Room::placeholder(rid.clone(), kind);
        placeholder.uids = params.uids;
        self.store
            .reset(placeholder, params.room_user.clone(), params.show_close_modal);

        let ctx = EpochContext {
            token: CancellationToken::new(),
            gate: self.gate.clone(),
            store: self.store.clone(),
            remote: self.remote.clone(),
            permissions: self.permissions.clone(),
            roles: self.roles.clone(),
            own_user_id: self.own_user_id.clone(),
            permissions_claimed: Arc::new(AtomicBool::new(false)),
        };
        let mut tasks = Vec::new();
        // 有本地句柄时以句柄的房间 ID 为准
        let effective_rid = live
            .as_ref()
            .map(|live| live.rid().to_string())
            .unwrap_or_else(|| rid.clone());

        let subscription = match &live {
            Some(live) => Some(ctx.start_observer(live)),
            None => {
                if !rid.is_empty() {
                    let task_ctx = ctx.clone();
                    let room_rid = rid.clone();
                    tasks.push(ctx.spawn(async move {
                        task_ctx.load_room(room_rid).await;
                        // 访客 ID 来自房间本身
                        if kind == RoomKind::Livechat {
                            task_ctx.load_visitor().await;
                        }
                    }));
                }
                None
            }
        };

        if kind == RoomKind::Direct {
            let task_ctx = ctx.clone();
            let preloaded = params.room_user;
            tasks.push(ctx.spawn(async move { task_ctx.resolve_counterpart(preloaded).await }));
        }

        if !effective_rid.is_empty() && ctx.claim_permission_check() {
            let task_ctx = ctx.clone();
            let permission_rid = effective_rid.clone();
            tasks.push(ctx.spawn(async move { task_ctx.evaluate_permissions(permission_rid).await }));
        }

        if kind == RoomKind::Livechat {
            if live.is_some() {
                let task_ctx = ctx.clone();
                tasks.push(ctx.spawn(async move { task_ctx.load_visitor().await }));
            }
            if let Some(focus) = focus {
                let task_ctx = ctx.clone();
                tasks.push(ctx.spawn(async move { task_ctx.watch_focus(focus).await }));
            }
        }

        if effective_rid.is_empty() && kind != RoomKind::Direct {
            warn!("[RoomInfo] 房间没有 ID，保留占位数据");
            ctx.mark_ready();
        }

        *self.lock_session() = Some(Session {
            ctx,
            subscription,
            tasks,
        });
    }

    /// 在附加周期中途拿到本地句柄（例如首次私聊的房间已写入本地库）
    ///
    /// 之后房间只由观察者更新，仍在进行的请求结果会因为版本较旧而被丢弃。
    pub fn adopt_live_room(&self, live: LiveRoom) -> bool {
        let mut session = self.lock_session();
        let Some(session) = session.as_mut() else {
            warn!("[RoomInfo] 页面未打开，忽略本地句柄: {}", live.rid());
            return false;
        };
        if session.subscription.as_ref().is_some_and(|s| !s.is_cancelled()) {
            debug!("[RoomInfo] 已经在观察房间，忽略本地句柄: {}", live.rid());
            return false;
        }
        let (room, _, _) = self.store.current();
        if room.is_routable() && room.rid != live.rid() {
            warn!(
                "[RoomInfo] 本地句柄 {} 与当前房间 {} 不一致，忽略",
                live.rid(),
                room.rid
            );
            return false;
        }
        session.subscription = Some(session.ctx.start_observer(&live));

        // 首次私聊时权限判断要等到房间 ID 出现
        if !live.rid().is_empty() && session.ctx.claim_permission_check() {
            let task_ctx = session.ctx.clone();
            let permission_rid = live.rid().to_string();
            let task = session
                .ctx
                .spawn(async move { task_ctx.evaluate_permissions(permission_rid).await });
            session.tasks.push(task);
        }
        true
    }

    /// 关闭页面（可重复调用，未打开时也安全）
    pub fn detach(&self) {
        let Some(mut session) = self.lock_session().take() else {
            return;
        };
        {
            let _gate = self.gate.lock().unwrap_or_else(|e| e.into_inner());
            session.ctx.token.cancel();
            self.store.mark_idle();
        }
        if let Some(mut subscription) = session.subscription.take() {
            subscription.unsubscribe();
        }
        for task in session.tasks.drain(..) {
            task.abort();
        }
        info!("[RoomInfo] 房间信息页已关闭: {:?}", self.store.current().0.rid);
    }

    pub fn is_attached(&self) -> bool {
        self.lock_session().is_some()
    }

    /// 是否正在观察本地句柄
    pub fn is_observing(&self) -> bool {
        self.lock_session()
            .as_ref()
            .and_then(|s| s.subscription.as_ref())
            .is_some_and(|s| !s.is_cancelled())
    }

    /// 观察者取消探针（未观察时为 None）
    pub fn observer_probe(&self) -> Option<CancellationToken> {
        self.lock_session()
            .as_ref()
            .and_then(|s| s.subscription.as_ref())
            .map(|s| s.probe())
    }

    pub fn subscribe(&self) -> watch::Receiver<RoomInfoState> {
        self.store.subscribe()
    }

    pub fn current(&self) -> RoomInfoState {
        self.store.snapshot()
    }

    pub fn header_config(&self) -> HeaderConfig {
        derive_header_config(&self.store.snapshot())
    }

    pub fn title(&self) -> String {
        room_title(&self.store.snapshot().room, self.use_real_name)
    }

    /// 打开房间，房间没有 ID 时不做任何事
    pub async fn go_room(&self, context: GoRoomContext) -> bool {
        let state = self.store.snapshot();
        let room = &state.room;
        if !room.is_routable() {
            debug!("[RoomInfo] 房间还没有 ID，无法打开");
            return false;
        }

        let room_user_id = if room.t == RoomKind::Direct {
            state
                .room_user
                .as_ref()
                .map(|u| u.id.clone())
                .or_else(|| room.direct_counterpart_id(&self.own_user_id))
        } else {
            None
        };
        let request = GoRoomRequest {
            rid: room.rid.clone(),
            name: room_title(room, self.use_real_name),
            kind: room.t,
            room_user_id,
            mode: context.mode(),
        };
        info!("[RoomInfo] 打开房间: {} ({:?})", request.rid, request.mode);
        self.listener.on_go_room(request).await;
        true
    }

    /// 打开编辑页面（仅在显示编辑按钮时）
    pub async fn edit_room(&self) -> bool {
        let state = self.store.snapshot();
        if !state.show_edit {
            debug!("[RoomInfo] 没有编辑权限，忽略编辑请求");
            return false;
        }
        let request = EditRoomRequest {
            target: edit_target(&state.room),
            rid: state.room.rid.clone(),
            room: state.room,
            room_user: state.room_user,
        };
        self.listener.on_edit_room(request).await;
        true
    }

    /// 发起视频通话
    pub async fn video_call(&self) -> bool {
        let room = self.store.current().0;
        if !room.is_routable() {
            debug!("[RoomInfo] 房间还没有 ID，无法发起通话");
            return false;
        }
        self.listener.on_video_call(room.rid).await;
        true
    }
}

impl Drop for RoomInfoController {
    fn drop(&mut self) {
        self.detach();
    }
}
