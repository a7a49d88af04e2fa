use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::config::{self, Backend};
use crate::device::{DeviceFactory, SimulatedFactory};
use crate::feed::{FeedService, FileFeedService, StaticFeedService};
use crate::logging;
use crate::tracker::Tracker;
use crate::ui;
use crate::video::{MpvFactory, MpvOptions};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_file: Option<PathBuf>,
    pub feed_file: Option<PathBuf>,
}

pub fn load_config(opts: &RunOptions) -> Result<config::Config> {
    let mut cfg = config::load(config::LoadOptions {
        config_file: opts.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    if let Some(path) = opts.feed_file.clone() {
        cfg.feed.path = Some(path);
    }
    Ok(cfg)
}

pub fn run(opts: RunOptions) -> Result<()> {
    let cfg = load_config(&opts)?;
    let logging_enabled = logging::init(&cfg.log).context("init logging")?;
    if logging_enabled {
        tracing::info!(version = crate::VERSION, "starting reels-tui");
    }

    let feed_service: Box<dyn FeedService> = match cfg.feed.path.clone() {
        Some(path) => Box::new(FileFeedService::new(path)),
        None => Box::new(StaticFeedService),
    };
    let items = feed_service.load_feed().context("load feed")?;
    tracing::info!(items = items.len(), "feed loaded");

    let factory: Box<dyn DeviceFactory> = match cfg.player.backend {
        Backend::Simulated => Box::new(SimulatedFactory {
            duration: cfg.player.simulated_duration,
            progress_interval: cfg.player.progress_interval,
        }),
        Backend::Mpv => Box::new(MpvFactory::new(MpvOptions {
            mpv_path: cfg.player.mpv_path.clone(),
            extra_args: cfg.player.extra_args.clone(),
        })),
    };

    let status = match cfg.player.backend {
        Backend::Simulated => "Simulated playback. Scroll with j/k or the mouse wheel.",
        Backend::Mpv => "Playing through mpv. Scroll with j/k or the mouse wheel.",
    };

    let tracker = Tracker::new(items)?.with_preload(cfg.player.preload);
    let mut model = ui::Model::new(ui::Options {
        tracker,
        factory,
        status_message: status.to_string(),
        scroll_step: cfg.ui.scroll_step,
        snap_delay: cfg.ui.snap_delay,
        tick_rate: cfg.ui.tick_rate,
    });
    model.run()?;

    tracing::info!("reels-tui exited");
    Ok(())
}
