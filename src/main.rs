use anyhow::{Context, Result};
use std::io::{self, Write};

use rig_retarget::config::Config;
use rig_retarget::pose::{LandmarkSource, ReplaySource};
use rig_retarget::rig::asset::load_asset;
use rig_retarget::rig::{AssetEvent, JsonMeshLoader, RigEngine};

const CONFIG_PATH: &str = "config.toml";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let replay_arg = args.next();
    let config_path = args.next().unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path);

    let replay_path = replay_arg
        .or_else(|| config.replay.path.clone())
        .context("Usage: rig_retarget <replay.jsonl> [config.toml]")?;
    let mut source = ReplaySource::load(&replay_path)?;
    log::info!("Replay: {} ({} frames)", replay_path, source.len());

    let mut engine = RigEngine::new(&config);

    // ヘッドレスでは同期的に読み込む
    let loader = JsonMeshLoader;
    for profile in &config.assets {
        let event = match load_asset(&loader, profile) {
            Ok(asset) => AssetEvent::Loaded(asset),
            Err(e) => AssetEvent::Failed {
                slot: profile.slot,
                error: format!("{:#}", e),
            },
        };
        engine.handle_asset_event(event);
    }

    // 仮想クロックで target_fps ごとに tick
    let step_ms = 1000.0 / config.tracking.target_fps.max(1) as f64;
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let mut now_ms = 0.0;
    let mut emitted = 0usize;

    while !source.is_finished() {
        let output = engine.tick(&mut source, now_ms);
        if !output.status.is_render_only() {
            serde_json::to_writer(&mut out, output)?;
            writeln!(out)?;
            emitted += 1;
        }
        now_ms += step_ms;
    }
    out.flush()?;
    source.close();

    log::info!("Done: {} frames written", emitted);
    Ok(())
}
