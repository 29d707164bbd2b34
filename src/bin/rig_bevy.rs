use anyhow::Result;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use bevy::app::{App, AppExit, ScheduleRunnerPlugin, Update};
use bevy::ecs::prelude::*;

use rig_retarget::config::Config;
use rig_retarget::control::Command;
use rig_retarget::pose::{LandmarkSource, ReplaySource};
#[cfg(feature = "viewer")]
use rig_retarget::render::MinifbRenderer;
use rig_retarget::rig::{
    spawn_asset_load, AssetEvent, AssetLoader, JsonMeshLoader, RigEngine, TickStatus,
};

const CONFIG_PATH: &str = "config.toml";

// --- Bevy Resources ---

#[derive(Resource)]
struct Engine(RigEngine);

#[derive(Resource)]
struct Source {
    replay: ReplaySource,
    /// 記録を再生し終えたらループを終える
    ends_loop: bool,
}

#[derive(Resource)]
struct AssetRx(Mutex<mpsc::Receiver<AssetEvent>>);

#[derive(Resource)]
struct ControlRx(Mutex<mpsc::Receiver<Command>>);

#[derive(Resource)]
struct RestSignal(Arc<AtomicBool>);

#[derive(Resource)]
struct Clock {
    start: Instant,
}

#[derive(Resource)]
struct FpsCounter {
    frame_count: u32,
    tracked_count: u32,
    last_status: TickStatus,
    timer: Instant,
}

#[cfg(feature = "viewer")]
struct DebugView {
    renderer: MinifbRenderer,
}

/// stderr とログファイルの両方へ書く
struct TeeWriter {
    file: BufWriter<fs::File>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

fn init_logging() -> Result<String> {
    fs::create_dir_all("logs")?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = format!("logs/rig_{}.log", ts);
    let file = fs::File::create(&path)?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(TeeWriter {
            file: BufWriter::new(file),
        })))
        .init();
    Ok(path)
}

fn main() -> Result<()> {
    let log_path = init_logging()?;
    log::info!("Log: {}", log_path);

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path);

    log::info!("Rig Bevy - landmark retargeting");
    log::info!("Target FPS: {}", config.tracking.target_fps);
    log::info!("Strategy: {}", config.tracking.strategy);
    log::info!("Render mode: {}", config.tracking.render_mode);

    // ランドマークソース: [replay].path がなければ待機のみ
    let source = match config.replay.path.as_deref() {
        Some(path) => {
            let replay = ReplaySource::load(path)?;
            log::info!("Replay: {} ({} frames)", path, replay.len());
            Source {
                replay,
                ends_loop: true,
            }
        }
        None => {
            log::warn!("No landmark source configured ([replay].path); rendering idle state");
            Source {
                replay: ReplaySource::parse("")?,
                ends_loop: false,
            }
        }
    };

    // アセット読み込みスレッド
    let (asset_tx, asset_rx) = mpsc::channel::<AssetEvent>();
    let loader: Arc<dyn AssetLoader> = Arc::new(JsonMeshLoader);
    for profile in &config.assets {
        log::info!("Loading {} asset: {}", profile.slot, profile.id);
        spawn_asset_load(loader.clone(), profile.clone(), asset_tx.clone());
    }
    drop(asset_tx);

    // レスト切り替え: SIGUSR1シグナルまたはコンソール入力 "rest"
    let rest_flag = Arc::new(AtomicBool::new(false));
    if let Err(e) = signal_hook::flag::register(signal_hook::consts::SIGUSR1, rest_flag.clone())
    {
        log::warn!("Failed to register SIGUSR1 handler: {}", e);
    }

    let (control_tx, control_rx) = mpsc::channel::<Command>();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(cmd) => {
                    if control_tx.send(cmd).is_err() {
                        break;
                    }
                }
                Err(e) => log::warn!("{:#}", e),
            }
        }
    });

    log::info!("");
    log::info!("操作: rest / smoothing <v> / scale|position|rotation <x> <y> <z> / mirror <on|off>");
    log::info!("      strategy <unconstrained|pole|anatomical> / mode <none|asset|asset-alt>");
    log::info!("      rig|markers|preview|inspect <on|off> / next / prev / map <start> <end>");
    log::info!("      axis <auto|+x|..|-z> / note <text> / dump / quit");
    log::info!("");

    let frame_duration = Duration::from_secs_f64(1.0 / config.tracking.target_fps.max(1) as f64);

    let mut app = App::new();
    app.add_plugins(ScheduleRunnerPlugin::run_loop(frame_duration))
        .insert_resource(Engine(RigEngine::new(&config)))
        .insert_resource(source)
        .insert_resource(AssetRx(Mutex::new(asset_rx)))
        .insert_resource(ControlRx(Mutex::new(control_rx)))
        .insert_resource(RestSignal(rest_flag))
        .insert_resource(Clock {
            start: Instant::now(),
        })
        .insert_resource(FpsCounter {
            frame_count: 0,
            tracked_count: 0,
            last_status: TickStatus::Idle,
            timer: Instant::now(),
        });

    add_systems(&mut app, &config);

    // ソースは AppExit と同じフレームで close_source_system が解放する
    app.run();
    log::info!("Shutting down...");
    Ok(())
}

/// フレームごとのシステムを登録（デバッグビューは任意）
#[cfg(feature = "viewer")]
fn add_systems(app: &mut App, config: &Config) {
    let debug_view = if config.debug.view {
        match MinifbRenderer::new("rig_bevy debug", 640, 480) {
            Ok(renderer) => {
                log::info!("Debug view: 640x480");
                Some(DebugView { renderer })
            }
            Err(e) => {
                log::warn!("Debug view failed: {}", e);
                None
            }
        }
    } else {
        None
    };

    match debug_view {
        Some(dv) => {
            app.insert_non_send_resource(dv).add_systems(
                Update,
                (
                    poll_assets_system,
                    apply_controls_system,
                    tick_engine_system,
                    debug_view_system,
                    fps_system,
                    close_source_system,
                )
                    .chain(),
            );
        }
        None => {
            app.add_systems(
                Update,
                (
                    poll_assets_system,
                    apply_controls_system,
                    tick_engine_system,
                    fps_system,
                    close_source_system,
                )
                    .chain(),
            );
        }
    }
}

#[cfg(not(feature = "viewer"))]
fn add_systems(app: &mut App, config: &Config) {
    if config.debug.view {
        log::warn!("Debug view requested but the viewer feature is disabled");
    }
    app.add_systems(
        Update,
        (
            poll_assets_system,
            apply_controls_system,
            tick_engine_system,
            fps_system,
            close_source_system,
        )
            .chain(),
    );
}

// --- Systems ---

fn poll_assets_system(mut engine: ResMut<Engine>, rx: Res<AssetRx>) {
    let Ok(rx) = rx.0.lock() else {
        return;
    };
    while let Ok(event) = rx.try_recv() {
        engine.0.handle_asset_event(event);
    }
}

fn apply_controls_system(
    mut engine: ResMut<Engine>,
    rx: Res<ControlRx>,
    signal: Res<RestSignal>,
    mut exit: EventWriter<AppExit>,
) {
    if signal.0.swap(false, Ordering::AcqRel) {
        let resting = engine.0.toggle_rest();
        log::info!("SIGUSR1: rest pose {}", if resting { "on" } else { "off" });
    }

    let Ok(rx) = rx.0.lock() else {
        return;
    };
    while let Ok(cmd) = rx.try_recv() {
        if cmd == Command::Quit {
            exit.send(AppExit::Success);
            return;
        }
        match cmd.apply(&mut engine.0) {
            Ok(Some(message)) => log::info!("{}", message),
            Ok(None) => log::info!("{:?}", cmd),
            Err(e) => log::warn!("{:#}", e),
        }
    }
}

fn tick_engine_system(
    mut engine: ResMut<Engine>,
    mut source: ResMut<Source>,
    clock: Res<Clock>,
    mut fps: ResMut<FpsCounter>,
    mut exit: EventWriter<AppExit>,
) {
    let now_ms = clock.start.elapsed().as_secs_f64() * 1000.0;
    let status = engine.0.tick(&mut source.replay, now_ms).status;
    fps.frame_count += 1;
    if status == TickStatus::Tracked {
        fps.tracked_count += 1;
    }
    fps.last_status = status;

    if source.ends_loop && source.replay.is_finished() {
        log::info!("Replay finished");
        exit.send(AppExit::Success);
    }
}

#[cfg(feature = "viewer")]
fn debug_view_system(
    mut dv: NonSendMut<DebugView>,
    engine: Res<Engine>,
    mut exit: EventWriter<AppExit>,
) {
    if !dv.renderer.is_open() {
        exit.send(AppExit::Success);
        return;
    }
    dv.renderer.clear();
    dv.renderer.draw_output(engine.0.output());
    if let Err(e) = dv.renderer.update() {
        log::warn!("Debug view update failed: {}", e);
    }
}

fn fps_system(mut fps: ResMut<FpsCounter>, engine: Res<Engine>) {
    let elapsed = fps.timer.elapsed().as_secs_f32();
    if elapsed < 1.0 {
        return;
    }
    let joints = engine.0.joints().visible_count();
    let mode = engine.0.render_mode();
    let strategy = engine.0.strategy();
    log::info!(
        "FPS: {:.1} | tracked: {:.1}/s | joints: {} | mode: {} | strategy: {} | {:?}{}",
        fps.frame_count as f32 / elapsed,
        fps.tracked_count as f32 / elapsed,
        joints,
        mode,
        strategy,
        fps.last_status,
        if engine.0.is_resting() { " (rest)" } else { "" },
    );
    fps.frame_count = 0;
    fps.tracked_count = 0;
    fps.timer = Instant::now();
}

/// 同じフレームで終了要求が出ていればソースを解放する（チェーンの最後）
fn close_source_system(mut exits: EventReader<AppExit>, mut source: ResMut<Source>) {
    if exits.read().next().is_some() {
        source.replay.close();
        log::info!("Landmark source closed");
    }
}
