use std::path::Path;
use std::time::Instant;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pixcache::infrastructure::image::default_cache_dir;
use pixcache::infrastructure::{
    AppConfig, CliArgs, Command, DiskImageCache, ImageCache, StorageManager,
};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            StorageManager::with_dir(dir).load_config(Some(path))?
        }
        None => StorageManager::new()?.load_config(None)?,
    };
    config.merge_with_args(args);
    Ok(config)
}

async fn fetch(cache: &ImageCache, urls: &[String], repeat: usize) {
    for round in 0..repeat.max(1) {
        for url in urls {
            let started = Instant::now();
            match cache.resolve(url).await {
                Ok(loaded) => println!(
                    "{url}\t{}\t{}x{}\t{:?}\t(round {})",
                    loaded.source,
                    loaded.image.width(),
                    loaded.image.height(),
                    started.elapsed(),
                    round + 1
                ),
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to resolve image");
                    println!("{url}\terror\t{e}");
                }
            }
        }
    }
    info!(stats = %cache.memory_stats(), "Done");
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args).wrap_err("failed to load configuration")?;
    init_logging(&config)?;

    info!(version = pixcache::VERSION, "Starting pixcache");

    let disk_dir = config.cache.disk_dir.clone().unwrap_or_else(default_cache_dir);

    match &args.command {
        Command::Fetch { urls, repeat } => {
            let cache = ImageCache::open(&config.cache.to_image_cache_config(), Some(disk_dir))
                .await
                .wrap_err("failed to open image cache")?;
            fetch(&cache, urls, *repeat).await;
            cache.flush().await;
        }
        Command::Clear => {
            let disk = DiskImageCache::new(disk_dir, config.cache.max_disk_size).await;
            disk.clear().await.wrap_err("failed to clear disk cache")?;
            println!("Cleared {}", disk.cache_dir().display());
        }
        Command::Info => {
            let disk = DiskImageCache::new(disk_dir, config.cache.max_disk_size).await;
            println!("directory: {}", disk.cache_dir().display());
            println!("entries:   {}", disk.len());
            println!("size:      {} / {} bytes", disk.current_size(), disk.max_size());
            println!("memory:    {} images", config.cache.memory_capacity);
        }
    }

    Ok(())
}
