use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{error, info};
use simplelog::{Config, LevelFilter, WriteLogger};

use folioview::panic_handler::initialize_panic_handler;
use folioview::registry::fetch_listing;
use folioview::settings::load_settings;
use folioview::viewer::HttpPageLoader;
use folioview::{
    DocumentRegistry, HttpProber, JsonFileStore, PageCountCache, PageUrls, Settings,
    SystemClock, Viewer, ViewerConfig, ViewerEvent,
};

#[derive(Parser)]
#[command(name = "folioview", version, about = "Inspect documents served as numbered page images")]
struct Cli {
    /// Settings file (default: <config dir>/folioview/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the page image server URL
    #[arg(long)]
    server: Option<String>,

    /// Persistent state file (default: <data dir>/folioview/state.json)
    #[arg(long)]
    state: Option<PathBuf>,

    #[arg(long, default_value = "folioview.log")]
    log_file: PathBuf,

    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a document name is resolved
    Resolve { name: String },

    /// Print the page count of a document
    Discover {
        name: String,

        /// Ignore the cached count
        #[arg(long)]
        refresh: bool,
    },

    /// Fetch a document listing and show each entry
    List { url: String },

    /// Open a document headlessly and report what would be on screen
    Open {
        name: String,

        #[arg(long, default_value_t = 1)]
        page: i64,

        #[arg(long)]
        zoom: Option<f32>,

        /// Quarter turns to apply
        #[arg(long, default_value_t = 0)]
        rotate: u8,
    },
}

fn main() -> Result<()> {
    initialize_panic_handler();
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    WriteLogger::init(level, Config::default(), File::create(&cli.log_file)?)?;
    info!("Starting folioview");

    let mut settings = load_settings(cli.config.as_deref());
    if let Some(server) = &cli.server {
        settings.server_url = server.clone();
    }

    let res = run(&cli, &settings);
    if let Err(err) = &res {
        error!("Command failed: {err:?}");
    }
    info!("Shutting down folioview");
    res
}

fn open_store(cli: &Cli) -> Result<JsonFileStore> {
    let path = match &cli.state {
        Some(path) => path.clone(),
        None => JsonFileStore::default_path().context("no data directory for state file")?,
    };
    Ok(JsonFileStore::load_or_empty(&path))
}

fn run(cli: &Cli, settings: &Settings) -> Result<()> {
    let registry = DocumentRegistry::new(settings.resource_root.clone());

    match &cli.command {
        Commands::Resolve { name } => {
            let entry = registry.register(name);
            let urls = PageUrls::new(&settings.server_url, &entry, &settings.image_extension);
            println!("full name:       {}", entry.full_name);
            println!("server name:     {}", entry.server_name);
            println!("folder:          {}", entry.folder_segment.as_deref().unwrap_or("-"));
            println!("file sanitized:  {}", entry.file_sanitized);
            println!("image directory: {}", entry.image_directory);
            println!("storage key:     {}", entry.storage_key);
            println!("page 1:          {}", urls.page_url(1));
        }

        Commands::Discover { name, refresh } => {
            let entry = registry.register(name);
            let urls = PageUrls::new(&settings.server_url, &entry, &settings.image_extension);
            let probe = HttpProber::new(settings.probe_timeout());
            let cache = PageCountCache::new(Arc::new(SystemClock));
            let mut store = open_store(cli)?;

            let count = if *refresh {
                cache.refresh(&mut store, &entry, &urls, &probe, settings.max_page_scan)
            } else {
                cache.get_count(&mut store, &entry, &urls, &probe, settings.max_page_scan)
            };
            println!("{}: {count} pages", entry.full_name);
        }

        Commands::List { url } => {
            let names = fetch_listing(url, settings.probe_timeout())?;
            let mut registry = registry;
            registry.replace_all(&names);
            for entry in registry.entries() {
                println!("{}\t{}", entry.storage_key, entry.image_directory);
            }
        }

        Commands::Open {
            name,
            page,
            zoom,
            rotate,
        } => {
            let store = open_store(cli)?;
            let mut viewer = Viewer::new(
                ViewerConfig::from(settings),
                Box::new(store),
                Arc::new(HttpProber::new(settings.probe_timeout())),
                Arc::new(HttpPageLoader::new(settings.probe_timeout())),
                Arc::new(SystemClock),
            );
            viewer.set_documents([name.as_str()]);
            let wait = settings.probe_timeout() * 4 + Duration::from_secs(1);
            let mut events = viewer.wait_until_idle(wait);

            viewer.go_to_page(*page);
            if let Some(zoom) = zoom {
                viewer.set_zoom(*zoom);
            }
            for _ in 0..*rotate % 4 {
                viewer.rotate();
            }
            events.extend(viewer.wait_until_idle(wait));
            report(&viewer, &events)?;
        }
    }
    Ok(())
}

fn report(viewer: &Viewer, events: &[ViewerEvent]) -> Result<()> {
    for event in events {
        match event {
            ViewerEvent::EmptyDocument { .. } => bail!("document has no pages"),
            ViewerEvent::PageFailed { page, fault } => println!("page {page} failed: {fault}"),
            _ => {}
        }
    }

    let state = viewer.state();
    println!("page:     {} / {}", state.current_page, state.total_page_count);
    println!("zoom:     {}", state.zoom);
    println!("rotation: {}", state.rotation.degrees());
    if let Some(shown) = viewer.displayed() {
        let t = viewer.transform();
        println!(
            "image:    {}x{} at scale {:.3}, offset ({:.1}, {:.1})",
            shown.image.size.width, shown.image.size.height, t.scale, t.pan_x, t.pan_y
        );
    }
    Ok(())
}
