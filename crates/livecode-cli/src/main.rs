mod cli;
mod config;
mod logging;

use crate::cli::{Args, Command};
use crate::config::{load_config, load_manifest, resolve_dir};
use crate::logging::init_tracing;
use anyhow::Context;
use clap::Parser;
use livecode::record::spawn_record;
use livecode::cache::SKETCH_KEY_PREFIX;
use livecode::{
    CodeRun, DirCache, ExceptionDetails, Executor, FileRecorder, LiveCode, RenderCache, Sketch,
};
use protocol::config::LivecodeConfig;
use protocol::RuntimeVariant;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Serialize)]
struct ExecReport<'a> {
    #[serde(flatten)]
    result: &'a livecode::ExecutionResult,
    exception: Option<ExceptionDetails>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _file_guard = init_tracing(&args.log_dir, args.command.name(), args.log_to_stderr)?;

    let config = load_config(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;

    match args.command {
        Command::Endpoint => {
            let client = build_client(&config, &args.config)?;
            println!("{}", client.endpoint());
        }
        Command::Exec {
            file,
            sketch,
            context,
        } => {
            let code = read_code(&file)?;
            let client = build_client(&config, &args.config)?;
            let recorder = Arc::new(FileRecorder::new(resolve_dir(
                &args.config,
                config.record_dir(),
            )));
            let result = client.execute(&code, variant(sketch)).await?;
            let run = CodeRun::new(&code, &result, context.into_context());
            let record = spawn_record(recorder, run);
            let details = result.exception_details();
            let report = ExecReport {
                result: &result,
                exception: (!details.is_empty()).then_some(details),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            if record.await.is_err() {
                tracing::warn!("run recorder task aborted");
            }
            if let Some(err) = result.failure() {
                return Err(err.into());
            }
        }
        Command::Render { file, sketch, out } => {
            let code = read_code(&file)?;
            let client = build_client(&config, &args.config)?;
            let store = Arc::new(DirCache::new(resolve_dir(&args.config, config.cache_dir())));
            let cache = RenderCache::new(store, Arc::new(client));
            let svg = cache.render(&code, variant(sketch)).await;
            match out {
                Some(path) => std::fs::write(&path, svg)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => print!("{svg}"),
            }
        }
        Command::Png {
            file,
            name,
            mode,
            sketch,
            out,
        } => {
            let code = read_code(&file)?;
            let client = build_client(&config, &args.config)?;
            let cache_dir = resolve_dir(&args.config, config.cache_dir());
            let store = Arc::new(DirCache::new(&cache_dir));
            let cache = RenderCache::new(store, Arc::new(client)).with_prefix(SKETCH_KEY_PREFIX);
            let mut preview = Sketch::new(name, code);
            if sketch {
                preview.runtime = "sketch".to_string();
            }
            let png = preview.to_png(mode, &cache, &cache_dir).await?;
            match out {
                Some(path) => std::fs::write(&path, &png)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => println!("{}", cache_dir.join(preview.png_file_name(mode)).display()),
            }
        }
    }
    Ok(())
}

fn build_client(config: &LivecodeConfig, config_path: &Path) -> anyhow::Result<LiveCode> {
    let timeout = Duration::from_millis(config.timeout_ms());
    let files = load_manifest(config, config_path)?;
    let client = LiveCode::from_base_url(&config.livecode_url, timeout)?
        .with_files(files)
        .with_command(config.command());
    tracing::info!(
        endpoint = %client.endpoint(),
        timeout_ms = config.timeout_ms(),
        "livecode client ready"
    );
    Ok(client)
}

fn read_code(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn variant(sketch: bool) -> RuntimeVariant {
    if sketch {
        RuntimeVariant::Sketch
    } else {
        RuntimeVariant::Standard
    }
}
