//! Interactive sphere ray caster
//!
//! Run with:
//!   cargo run --release
//!   cargo run --release -- --max-frames 60 --screenshot out.png
//!
//! Controls:
//!   Tab      - Show the control panel
//!   Close    - Exit

use std::path::PathBuf;

use clap::Parser;
use sphere_raycast::{KernelSourceId, RendererConfig};

#[derive(Parser, Debug)]
#[command(name = "sphere-raycast", version, about = "Compute-shader sphere ray caster")]
struct Args {
    /// Window title
    #[arg(long, default_value = "uboSample")]
    title: String,

    /// Output image width in pixels
    #[arg(long, default_value_t = 960)]
    width: u32,

    /// Output image height in pixels
    #[arg(long, default_value_t = 540)]
    height: u32,

    /// Present without waiting for vertical sync
    #[arg(long)]
    no_vsync: bool,

    /// WGSL kernel to load instead of the built-in one
    #[arg(long, value_name = "PATH")]
    kernel: Option<PathBuf>,

    /// Show the control panel on start
    #[arg(long)]
    show_panel: bool,

    /// Exit after this many frames
    #[arg(long, value_name = "N")]
    max_frames: Option<u64>,

    /// Save the final image as PNG
    #[arg(long, value_name = "PNG")]
    screenshot: Option<PathBuf>,
}

impl From<Args> for RendererConfig {
    fn from(args: Args) -> Self {
        Self {
            title: args.title,
            width: args.width.max(1),
            height: args.height.max(1),
            vsync: !args.no_vsync,
            kernel: args.kernel.map_or(KernelSourceId::Embedded, KernelSourceId::File),
            show_panel: args.show_panel,
            max_frames: args.max_frames,
            screenshot: args.screenshot,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RendererConfig::from(Args::parse());
    log::info!(
        "Starting {} ({}x{}, kernel: {})",
        config.title,
        config.width,
        config.height,
        config.kernel
    );

    if let Err(err) = sphere_raycast::app::run(config) {
        log::error!("{err}");
        eprintln!("sphere-raycast: {err}");
        std::process::exit(1);
    }
}
