use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use trail_map::{
    config::AppConfig,
    dtm::Tin,
    io::{read_elevation_samples, CacheSlot, DatasetSource, DirectorySource, FileCache, HttpSource},
    measure::{format_miles, is_valid_step, TerrainMeasurer},
    pins::{HttpPinRemote, PinRemote, PinStore},
    prompt::{LinePrompt, Prompt, PromptOutcome, PromptRequest},
    render::{Renderer, SceneRenderer, TerrainSpec},
    toggles::ToggleRow,
    ClickOutcome, LngLat, MapApp, MapEvent,
};

#[derive(Parser)]
#[command(name = "trail_map_cli", version)]
struct Cli {
    /// JSON configuration file. Missing fields take their defaults.
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every overlay and print the layer panel.
    Layers {
        /// Overlay directory or base URL; defaults to the configured root.
        data: Option<String>,
        #[arg(long)]
        style: Option<String>,
    },
    /// Switch a layer on or off and print the resulting panel.
    Toggle {
        data: String,
        layer: String,
        #[arg(value_enum)]
        state: Switch,
    },
    /// Show the parcel popup for a position.
    #[command(allow_negative_numbers = true)]
    Parcel {
        data: String,
        lng: f64,
        lat: f64,
    },
    /// Terrain-aware length of a path given as `lng,lat` points.
    Measure {
        /// CSV of `lng,lat,elevation` samples.
        #[arg(long)]
        surface: Option<String>,
        /// Sampling step in metres.
        #[arg(long, value_parser = parse_step)]
        step: Option<f64>,
        #[arg(required = true, num_args = 2.., allow_hyphen_values = true)]
        points: Vec<String>,
    },
    /// Manage saved pins.
    Pins {
        /// Directory holding the pin cache.
        #[arg(long)]
        cache: String,
        /// Base URL of the remote pin store.
        #[arg(long)]
        remote: Option<String>,
        #[command(subcommand)]
        action: PinAction,
    },
}

#[derive(Subcommand)]
enum PinAction {
    List,
    #[command(allow_negative_numbers = true)]
    Add {
        lng: f64,
        lat: f64,
        /// Asked for on stdin when omitted.
        #[arg(long)]
        label: Option<String>,
    },
    Rename { id: String, label: String },
    Recolor { id: String, color: String },
    Delete { id: String },
}

fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
    match path {
        Some(path) => AppConfig::load(path).map_err(|e| e.to_string()),
        None => Ok(AppConfig::default()),
    }
}

fn dataset_source(root: &str) -> Box<dyn DatasetSource> {
    if root.starts_with("http://") || root.starts_with("https://") {
        Box::new(HttpSource::new(root))
    } else {
        Box::new(DirectorySource::new(root))
    }
}

fn parse_step(text: &str) -> Result<f64, String> {
    let step = text.parse::<f64>().map_err(|e| e.to_string())?;
    if is_valid_step(step) {
        Ok(step)
    } else {
        Err(format!("step must be a positive number of metres, got `{text}`"))
    }
}

fn parse_point(text: &str) -> Result<LngLat, String> {
    let (lng, lat) = text
        .split_once(',')
        .ok_or_else(|| format!("expected lng,lat but got `{text}`"))?;
    let lng = lng.trim().parse::<f64>().map_err(|e| format!("{text}: {e}"))?;
    let lat = lat.trim().parse::<f64>().map_err(|e| format!("{text}: {e}"))?;
    Ok(LngLat::new(lng, lat))
}

fn local_pins(config: &AppConfig) -> PinStore {
    PinStore::new(
        Arc::new(trail_map::io::MemoryCache::new()),
        &config.pins.cache_key,
        None,
        config.pins.retry_policy(),
    )
}

fn open_map(config: &AppConfig, data: &str, style: &str) -> MapApp<SceneRenderer> {
    let mut app = MapApp::new(
        config,
        SceneRenderer::new(style),
        dataset_source(data),
        local_pins(config),
    );
    let report = app.on_load();
    for skipped in &report.skipped {
        println!("Skipped {}: {}", skipped.id, skipped.error);
    }
    if let Some(bounds) = report.fitted {
        if let Some(center) = bounds.center() {
            println!("Fitted camera to {:.5}, {:.5}", center.lng, center.lat);
        }
    }
    app
}

fn print_rows(rows: &[ToggleRow]) {
    for row in rows {
        let mark = if row.checked { "x" } else { " " };
        println!("[{mark}] {} ({})", row.label, row.layer_id);
    }
}

fn run_measure(
    config: &AppConfig,
    surface: Option<&str>,
    step: Option<f64>,
    points: &[String],
) -> Result<(), String> {
    let path = points
        .iter()
        .map(|p| parse_point(p))
        .collect::<Result<Vec<_>, _>>()?;
    let mut scene = SceneRenderer::new(&config.style);
    if let Some(surface) = surface {
        let samples =
            read_elevation_samples(surface).map_err(|e| format!("Error reading {surface}: {e}"))?;
        info!("loaded {} elevation samples", samples.len());
        let tin = Tin::from_points(samples);
        let coverage = tin.bounds();
        for p in path.iter().filter(|p| !coverage.contains(**p)) {
            warn!(
                "{:.5}, {:.5} is outside the surface, elevation taken as 0",
                p.lng, p.lat
            );
        }
        scene = scene.with_surface(tin);
        scene.set_terrain(Some(TerrainSpec {
            source: config.terrain.source_id.clone(),
            exaggeration: config.terrain.exaggeration,
        }));
    }
    let mut measurer = TerrainMeasurer::new(step.unwrap_or(config.measure_step_m));
    measurer.activate(&mut scene).map_err(|e| e.to_string())?;
    for p in path {
        measurer.on_click(&mut scene, p).map_err(|e| e.to_string())?;
    }
    measurer.deactivate(&mut scene);
    println!("Distance: {}", format_miles(measurer.distance_m()));
    Ok(())
}

fn run_pins(
    config: &AppConfig,
    cache_dir: &str,
    remote: Option<&str>,
    action: PinAction,
) -> Result<(), String> {
    let cache: Arc<dyn CacheSlot> = Arc::new(FileCache::new(cache_dir));
    let remote = remote
        .or(config.pins.remote_url.as_deref())
        .map(|url| Arc::new(HttpPinRemote::new(url)) as Arc<dyn PinRemote>);
    let mut store = PinStore::new(
        cache,
        &config.pins.cache_key,
        remote,
        config.pins.retry_policy(),
    );
    let mut scene = SceneRenderer::new(&config.style);
    store.load(&mut scene).map_err(|e| e.to_string())?;
    match action {
        PinAction::List => {
            for row in store.rows() {
                println!("{}\t{}\t{}\t{}", row.id, row.label, row.color, row.coordinates);
            }
        }
        PinAction::Add { lng, lat, label } => {
            let label = match label {
                Some(label) => label,
                None => {
                    let mut prompt = LinePrompt::new(io::stdin().lock(), io::stderr());
                    let request =
                        PromptRequest::new("Pin label").with_default(&store.default_label());
                    match prompt.request(request) {
                        PromptOutcome::Confirmed(label) => label,
                        PromptOutcome::Cancelled => {
                            println!("Cancelled");
                            return Ok(());
                        }
                    }
                }
            };
            let pin = store
                .add(&mut scene, LngLat::new(lng, lat), &label)
                .map_err(|e| e.to_string())?;
            println!("Added {} {}", pin.id, pin.label);
        }
        PinAction::Rename { id, label } => {
            if store.rename(&mut scene, &id, &label).map_err(|e| e.to_string())? {
                println!("Renamed {id}");
            } else {
                println!("Label unchanged");
            }
        }
        PinAction::Recolor { id, color } => {
            store
                .recolor(&mut scene, &id, &color)
                .map_err(|e| e.to_string())?;
            println!("Recolored {id}");
        }
        PinAction::Delete { id } => {
            let pin = store.delete(&mut scene, &id).map_err(|e| e.to_string())?;
            println!("Deleted {} {}", pin.id, pin.label);
        }
    }
    store.flush();
    Ok(())
}

fn run(cli: Cli) -> Result<(), String> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Layers { data, style } => {
            let data = data.unwrap_or_else(|| config.data_root.clone());
            let style = style.unwrap_or_else(|| config.style.clone());
            let app = open_map(&config, &data, &style);
            print_rows(app.toggle_rows());
        }
        Commands::Toggle { data, layer, state } => {
            let mut app = open_map(&config, &data, &config.style);
            app.toggle(&layer, matches!(state, Switch::On))
                .map_err(|e| e.to_string())?;
            print_rows(app.toggle_rows());
        }
        Commands::Parcel { data, lng, lat } => {
            let mut app = open_map(&config, &data, &config.style);
            let mut prompt = LinePrompt::new(io::empty(), io::sink());
            match app
                .handle(MapEvent::Click(LngLat::new(lng, lat)), &mut prompt)
                .map_err(|e| e.to_string())?
            {
                ClickOutcome::Parcel(info) => {
                    for (name, value) in info.rows() {
                        println!("{name}: {value}");
                    }
                }
                _ => println!("No parcel at {lng:.5}, {lat:.5}"),
            }
        }
        Commands::Measure {
            surface,
            step,
            points,
        } => run_measure(&config, surface.as_deref(), step, &points)?,
        Commands::Pins {
            cache,
            remote,
            action,
        } => run_pins(&config, &cache, remote.as_deref(), action)?,
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
