// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The `ticosd` supervisor binary. Grounded on `ticosd.c`'s `ticosd_main`: parse
//! flags, load config, handle the fast-path exit flags, load identity, check for
//! an existing instance, disable self-coredumping, install signal handlers, open
//! the queue, build the upload client and plugin table, optionally daemonize, spawn
//! the IPC thread, and run the drain loop until a terminate signal arrives.

mod cli;
mod daemonize;
mod drain;
mod identity;
mod ipc_thread;
mod pidfile;
mod settings;
mod signals;

use clap::Parser;
use cli::Cli;
use pidfile::PidFile;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ticosd_common::config::JsonFileConfig;
use ticosd_common::paths::{peek_data_dir, DEFAULT_IPC_SOCKET_PATH, DEFAULT_PID_FILE};
use ticosd_common::ConfigView;
use ticosd_plugins::{AttributesPlugin, CoredumpPlugin, PluginRegistry, RebootPlugin};
use ticosd_queue::FileQueue;
use ticosd_upload::UploadClient;

const DEFAULT_REFRESH_INTERVAL_SECONDS: i64 = 60;
const DEFAULT_QUEUE_SIZE_KIB: i64 = 256;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        settings::print_version();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let data_dir = peek_data_dir(&cli.config_file);
    std::fs::create_dir_all(&data_dir)?;
    let config = JsonFileConfig::load(&cli.config_file, &data_dir)?;

    if cli.enable_data_collection && cli.disable_data_collection {
        anyhow::bail!("--enable-data-collection and --disable-data-collection are mutually exclusive");
    }
    if cli.enable_data_collection || cli.disable_data_collection {
        config.set_runtime_bool("enable_data_collection", cli.enable_data_collection)?;
        println!("enable_data_collection={}", cli.enable_data_collection);
        return Ok(());
    }

    if cli.enable_dev_mode && cli.disable_dev_mode {
        anyhow::bail!("--enable-dev-mode and --disable-dev-mode are mutually exclusive");
    }
    if cli.enable_dev_mode || cli.disable_dev_mode {
        config.set_runtime_bool("dev_mode", cli.enable_dev_mode)?;
        println!("dev_mode={}", cli.enable_dev_mode);
        return Ok(());
    }

    let (device, software) = identity::load(&config)?;

    if cli.show_settings {
        settings::print_settings(&cli.config_file, &device, &software, &config);
        return Ok(());
    }

    let pid_file = Path::new(DEFAULT_PID_FILE);
    if !cli.daemonize && pid_file.exists() {
        anyhow::bail!("ticosd already running (pidfile {} exists)", pid_file.display());
    }

    daemonize::disable_self_coredump();
    signals::install()?;

    let enable_data_collection = config.get_bool(None, "enable_data_collection").unwrap_or(false);
    let queue_size_bytes = config
        .get_int(None, "queue_size_kib")
        .unwrap_or(DEFAULT_QUEUE_SIZE_KIB)
        .max(0) as u64
        * 1024;
    let mut queue = FileQueue::open(&data_dir, queue_size_bytes)?;
    if !enable_data_collection {
        queue.reset()?;
    }
    let queue = Arc::new(Mutex::new(queue));

    let base_url = config
        .get_string(None, "base_url")
        .ok_or_else(|| anyhow::anyhow!("missing required config key: base_url"))?;
    let project_key = config
        .get_string(None, "project_key")
        .ok_or_else(|| anyhow::anyhow!("missing required config key: project_key"))?;
    let client = UploadClient::builder()
        .base_url(base_url)
        .project_key(project_key)
        .timeout(Duration::from_secs(30))
        .build()?;

    if config.get_bool(None, "dev_mode").unwrap_or(false) {
        tracing::info!("dev mode enabled: rate limiting disabled, settings may be more verbose");
    }

    let config: Arc<dyn ConfigView> = Arc::new(config);
    let mut registry = PluginRegistry::new();
    registry.register(Box::new(AttributesPlugin::new(queue.clone(), config.clone())));
    registry.register(Box::new(RebootPlugin::init(
        &queue,
        &config,
        &device,
        &software,
        &data_dir,
    )));
    registry.register(Box::new(CoredumpPlugin::new(queue.clone(), config.clone(), &data_dir)));
    let registry = Arc::new(registry);

    let mut pidfile_guard = None;
    if cli.daemonize {
        daemonize::daemonize()?;
        pidfile_guard = Some(PidFile::create(pid_file)?);
    }

    let socket_path = Path::new(DEFAULT_IPC_SOCKET_PATH);
    let ipc_handle = ipc_thread::spawn(socket_path, registry.clone())?;

    let refresh_interval = Duration::from_secs(
        config
            .get_int(None, "refresh_interval_seconds")
            .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECONDS)
            .max(1) as u64,
    );
    drain::run(&queue, &client, &device, &software, refresh_interval);

    if let Err(e) = ipc_handle.join() {
        tracing::error!(?e, "IPC thread panicked");
    }
    match Arc::try_unwrap(registry) {
        Ok(registry) => registry.shutdown(),
        Err(_) => tracing::warn!("plugin registry still referenced elsewhere, skipping shutdown"),
    }

    if let Some(guard) = pidfile_guard.take() {
        guard.remove();
    }

    Ok(())
}
