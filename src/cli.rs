use clap::{Parser, Subcommand, ValueEnum};
use rasterpool_lib::{ImageType, Viewport};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rasterpool")]
#[command(
    version,
    about = "Browser render pool - rasterize HTML documents and URLs to images",
    long_about = "Rasterpool\n\nModes:\n- render: rasterize a URL or local HTML file to PNG/JPEG over the shared browser pool.\n- probe: acquire (or reuse) a browser and report its control endpoint.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML) to set pool defaults; CLI flags override config"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render a URL or local HTML file to one or more images
    Render {
        #[arg(help = "Source: a URL (https://...) or a local HTML file path")]
        source: String,

        #[arg(long, short, default_value = "shot.png", help = "Output image path")]
        output: PathBuf,

        #[arg(
            long,
            help = "Viewport (WIDTHxHEIGHT or WIDTHxHEIGHT@SCALE); config default if omitted"
        )]
        viewport: Option<Viewport>,

        #[arg(long, help = "Capture the full scrollable document in one image")]
        full_page: bool,

        #[arg(
            long,
            help = "Split content taller than one segment into numbered page images"
        )]
        multi_page: bool,

        #[arg(
            long,
            value_name = "PX",
            help = "Segment height for --multi-page (config default if omitted)"
        )]
        multi_page_height: Option<u32>,

        #[arg(long, value_enum, default_value = "png", help = "Output image format")]
        image_type: ImageTypeArg,

        #[arg(long, value_name = "1-100", help = "JPEG quality (jpeg only)")]
        quality: Option<u8>,

        #[arg(
            long,
            help = "CSS selector of the element to capture (defaults to #container, then body)"
        )]
        selector: Option<String>,

        #[arg(
            long,
            help = "Stitch multi-page segments vertically into a single image"
        )]
        stitch: bool,

        #[arg(
            long,
            default_value = "30",
            help = "Navigation timeout (seconds)"
        )]
        nav_timeout: u64,

        #[arg(
            long,
            default_value = "15",
            help = "Image-load wait timeout (seconds)"
        )]
        image_wait: u64,

        #[arg(long, help = "Job name used for scheduling/logs (defaults to the output stem)")]
        name: Option<String>,
    },

    /// Acquire (or reuse) a browser and print its control endpoint
    Probe {},
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ImageTypeArg {
    Png,
    Jpeg,
}

impl From<ImageTypeArg> for ImageType {
    fn from(value: ImageTypeArg) -> Self {
        match value {
            ImageTypeArg::Png => ImageType::Png,
            ImageTypeArg::Jpeg => ImageType::Jpeg,
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}
