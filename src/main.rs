use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use thumbcache::params::ParamOverrides;
use thumbcache::thumbnail::Thumbnailer;
use thumbcache::{config, output, warm};
use tracing_subscriber::EnvFilter;

/// Transform parameters given as repeated `-p key=value` flags.
#[derive(clap::Args, Clone)]
struct ParamArgs {
    /// Transform parameter, e.g. `-p w=100 -p c=top` or `-p scale=#000000`
    #[arg(short = 'p', long = "param", value_parser = parse_pair)]
    params: Vec<(String, String)>,
}

impl ParamArgs {
    fn overrides(&self) -> Result<ParamOverrides, serde_json::Error> {
        ParamOverrides::from_pairs(self.params.iter().map(|(k, v)| (k, v)))
    }
}

#[derive(Parser)]
#[command(name = "thumbcache")]
#[command(about = "On-demand image thumbnails with a parameter-keyed file cache")]
#[command(long_about = "\
On-demand image thumbnails with a parameter-keyed file cache

Each thumbnail is written once, to a path derived from its parameters, and
served from there until the source image changes:

  images/
  ├── a.jpg
  └── thumbs/
      ├── w100-h100-ccenter-q80/
      │   └── a.jpg                # crop to 100x100
      └── w200-h200-s0000.5-q80/
          └── a.png                # letterbox on a translucent background

Parameters (canonical name / alias):
  width w, height h, crop c, scale s, watermark wm, wm_position wmp,
  wm_opacity wmo, wm_text wmt, wm_text_color wmtc, wm_text_size wmts,
  wm_text_font wmtf, placeholder p, quality q

Run 'thumbcache gen-config' to generate a documented thumbcache.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// Document root (overrides the config file)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Central cache directory (overrides the config file)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Image rendered for missing sources (overrides the config file)
    #[arg(long, global = true)]
    placeholder: Option<PathBuf>,

    /// Log cache decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Return a cached thumbnail, rendering it if stale or absent
    Get {
        /// Source image, site-relative or under the document root
        source: PathBuf,
        #[command(flatten)]
        params: ParamArgs,
        /// Print the thumbnail as a base64 data URI instead
        #[arg(long)]
        data_uri: bool,
    },
    /// Print the link a request would return without rendering anything
    Path {
        source: PathBuf,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Render one parameter set for every image under a directory
    Warm {
        /// Directory to walk, site-relative or under the document root
        #[arg(default_value = "/")]
        dir: PathBuf,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Print a stock thumbcache.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let mut site_config = config::load_config(&cli.config)?;
    if let Some(root) = &cli.root {
        site_config.document_root = root.clone();
    }
    if cli.cache_dir.is_some() {
        site_config.cache_dir = cli.cache_dir.clone();
    }
    if cli.placeholder.is_some() {
        site_config.placeholder = cli.placeholder.clone();
    }
    let thumbnailer = Thumbnailer::new(&site_config);

    match &cli.command {
        Command::Get {
            source,
            params,
            data_uri,
        } => {
            let overrides = params.overrides()?;
            let link = display_source(&thumbnailer, source);
            match thumbnailer.get(source, &overrides)? {
                Some(thumbnail) if *data_uri => println!("{}", thumbnail.data_uri()?),
                Some(thumbnail) => output::print_thumbnail(&thumbnail, &link),
                None => output::print_missing(&link),
            }
        }
        Command::Path { source, params } => {
            let overrides = params.overrides()?;
            match thumbnailer.path(source, &overrides) {
                Some(link) => println!("{}", link),
                None => output::print_missing(&display_source(&thumbnailer, source)),
            }
        }
        Command::Warm { dir, params } => {
            let overrides = params.overrides()?;
            init_thread_pool(&site_config.processing);
            let layout = thumbnailer.layout().clone();
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_warm_event(&event, &layout) {
                        println!("{}", line);
                    }
                }
            });
            let stats = warm::warm(&thumbnailer, dir, &overrides, Some(tx));
            printer.join().ok();
            output::print_warm_summary(&stats);
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// Diagnostics go to stderr so stdout stays a clean list of links.
///
/// `RUST_LOG` wins; otherwise `warn`, or `debug` with `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "thumbcache=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; users can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn display_source(thumbnailer: &Thumbnailer, source: &Path) -> String {
    let layout = thumbnailer.layout();
    layout.relative_link(&layout.absolute(source))
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}
