mod cli;
mod commands;

use std::process::ExitCode;

use cli::Commands;
use commands::{run_probe, run_render, RenderArgs};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    init_tracing(args.verbose);
    run(args).await
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "rasterpool=debug,rasterpool_lib=debug"
    } else {
        "rasterpool=warn,rasterpool_lib=warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: cli::Cli) -> ExitCode {
    let config_path = args.config.as_deref();
    match args.command {
        Commands::Render {
            source,
            output,
            viewport,
            full_page,
            multi_page,
            multi_page_height,
            image_type,
            quality,
            selector,
            stitch,
            nav_timeout,
            image_wait,
            name,
        } => {
            run_render(
                config_path,
                RenderArgs {
                    source,
                    output,
                    viewport,
                    full_page,
                    multi_page,
                    multi_page_height,
                    image_type,
                    quality,
                    selector,
                    stitch,
                    nav_timeout,
                    image_wait,
                    name,
                },
            )
            .await
        }
        Commands::Probe {} => run_probe(config_path).await,
    }
}
