//! 房间信息 CLI（测试版）
//!
//! 非交互式 CLI，打开一个房间的信息页，打印每次状态变更和头部配置，到时后关闭页面

use anyhow::{Context, Result};
use clap::Parser;
use room_info_sdk_rust::im::room_info::{
    EditRoomRequest, FocusEvent, GoRoomRequest, LoadPhase, RoomInfoListener, RoomKind,
};
use room_info_sdk_rust::{RoomInfoConfig, RoomInfoController, RoomInfoParams};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

/// 房间信息 CLI
#[derive(Parser, Debug)]
#[command(name = "room-info-cli")]
#[command(about = "房间信息 CLI - 用于测试房间信息同步", long_about = None)]
struct Args {
    /// 服务器地址
    #[arg(long, default_value = "http://localhost:3000")]
    server: String,

    /// 当前用户 ID
    #[arg(long)]
    user_id: String,

    /// 认证 token
    #[arg(long)]
    token: String,

    /// 房间 ID（首次私聊时留空）
    #[arg(long, default_value = "")]
    rid: String,

    /// 房间类型：d / c / p / l
    #[arg(long, default_value = "c")]
    kind: String,

    /// 私聊参与者 ID（可重复）
    #[arg(long)]
    uid: Vec<String>,

    /// 本地 SQLite 数据库
    #[arg(long, default_value = "sqlite://room_info.db?mode=rwc")]
    db: String,

    /// 运行时长（秒），0 表示持续运行直到 Ctrl+C
    #[arg(short, long, default_value = "10")]
    duration: u64,

    /// 模拟页面重新获得焦点的间隔（秒），0 表示不模拟
    #[arg(long, default_value = "0")]
    refocus: u64,

    /// 私聊标题显示真实姓名
    #[arg(long)]
    real_name: bool,

    /// 日志级别（默认: info,room_info_sdk_rust=debug）
    #[arg(long, default_value = "info,room_info_sdk_rust=debug")]
    log_level: String,
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .context("无法创建日志文件 debug.log")?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 文件不需要颜色
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: debug.log");
    Ok(())
}

/// 输出所有导航请求
struct CliRoomInfoListener;

#[async_trait::async_trait]
impl RoomInfoListener for CliRoomInfoListener {
    async fn on_go_room(&self, request: GoRoomRequest) {
        info!("[CLI/RoomInfo] 🚪 打开房间: {:?}", request);
    }

    async fn on_edit_room(&self, request: EditRoomRequest) {
        info!(
            "[CLI/RoomInfo] ✏️ 编辑房间: {} ({:?})",
            request.rid, request.target
        );
    }

    async fn on_video_call(&self, rid: String) {
        info!("[CLI/RoomInfo] 📹 视频通话: {}", rid);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level)?;

    let kind = RoomKind::from_code(&args.kind)
        .with_context(|| format!("未知的房间类型: {}", args.kind))?;

    info!("[CLI] 🚀 房间信息 CLI（测试模式）");
    info!("[CLI] 👤 用户ID: {}, 服务器: {}", args.user_id, args.server);
    info!("[CLI] 🏠 房间: {:?}, 类型: {:?}", args.rid, kind);

    let mut config = RoomInfoConfig::new(args.user_id.clone(), args.token.clone());
    config.api_base_url = args.server.clone();
    config.db_path = args.db.clone();
    config.use_real_name = args.real_name;

    let controller =
        RoomInfoController::from_config(config, Arc::new(CliRoomInfoListener)).await?;

    let mut params = RoomInfoParams::new(args.rid.clone(), kind);
    params.uids = args.uid.clone();
    if let Some(local_rooms) = controller.local_rooms() {
        if !args.rid.is_empty() {
            match local_rooms.live_room(&args.rid).await {
                Ok(live) => params.room = live,
                Err(e) => warn!("[CLI] 读取本地房间失败: {:?}", e),
            }
        }
    }
    info!("[CLI] 📦 本地句柄: {}", params.room.is_some());

    // 打印每次状态变更
    let mut states = controller.subscribe();
    let printer = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            info!(
                "[CLI] 🔄 状态: {:?} | 房间: {} ({}) | 对方: {} | 可编辑: {}",
                state.phase,
                state.room.rid,
                state.room.name,
                state
                    .room_user
                    .as_ref()
                    .map(|u| u.username.as_str())
                    .unwrap_or("-"),
                state.show_edit
            );
            if state.phase == LoadPhase::Idle {
                break;
            }
        }
    });

    let (focus_tx, focus_rx) = broadcast::channel(4);
    controller.attach(params, Some(focus_rx));

    if args.refocus > 0 {
        let interval = Duration::from_secs(args.refocus);
        tokio::spawn(async move {
            loop {
                sleep(interval).await;
                if focus_tx.send(FocusEvent::Focused).is_err() {
                    break;
                }
            }
        });
    }

    if args.duration > 0 {
        info!("[CLI] ⏰ {} 秒后关闭页面", args.duration);
        sleep(Duration::from_secs(args.duration)).await;
    } else {
        info!("[CLI] ⏰ 持续运行中，按 Ctrl+C 退出");
        tokio::signal::ctrl_c().await.context("监听 Ctrl+C 失败")?;
    }

    info!("[CLI] 🧭 头部配置: {:?}", controller.header_config());
    info!("[CLI] 🏷️ 标题: {}", controller.title());
    controller.detach();
    let _ = printer.await;

    info!("[CLI] 👋 程序退出");
    Ok(())
}
