use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use image::{DynamicImage, GenericImage, GenericImageView, RgbaImage};
use rasterpool_lib::{
    Config, ImageType, RenderError, RenderOutput, RenderPool, RenderRequest, RenderSource, Result,
    Viewport,
};

use crate::cli::ImageTypeArg;

pub struct RenderArgs {
    pub source: String,
    pub output: PathBuf,
    pub viewport: Option<Viewport>,
    pub full_page: bool,
    pub multi_page: bool,
    pub multi_page_height: Option<u32>,
    pub image_type: ImageTypeArg,
    pub quality: Option<u8>,
    pub selector: Option<String>,
    pub stitch: bool,
    pub nav_timeout: u64,
    pub image_wait: u64,
    pub name: Option<String>,
}

pub async fn run_render(config_path: Option<&Path>, args: RenderArgs) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let pool = match RenderPool::new(config) {
        Ok(pool) => pool,
        Err(e) => return report(&e, ExitCode::from(2)),
    };

    let name = args.name.clone().unwrap_or_else(|| {
        args.output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "render".to_string())
    });
    let request = build_request(&name, &args);

    let outcome = pool.screenshot(&request).await;
    pool.cleanup().await;

    match outcome {
        Ok(output) => match write_output(output, &args) {
            Ok(paths) => {
                for path in paths {
                    println!("{}", path.display());
                }
                ExitCode::SUCCESS
            }
            Err(e) => report(&e, ExitCode::from(1)),
        },
        Err(e) => report(&e, ExitCode::from(1)),
    }
}

pub async fn run_probe(config_path: Option<&Path>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let pool = match RenderPool::new(config) {
        Ok(pool) => pool,
        Err(e) => return report(&e, ExitCode::from(2)),
    };
    let outcome = pool.warm_up().await;
    pool.cleanup().await;
    match outcome {
        Ok(endpoint) => {
            println!("{}", endpoint);
            ExitCode::SUCCESS
        }
        Err(e) => report(&e, ExitCode::from(1)),
    }
}

fn load_config(path: Option<&Path>) -> std::result::Result<Config, ExitCode> {
    let config = Config::load(path).map_err(|e| report(&e, ExitCode::from(2)))?;
    config.validate().map_err(|e| report(&e, ExitCode::from(2)))?;
    Ok(config)
}

fn build_request(name: &str, args: &RenderArgs) -> RenderRequest {
    let source = if looks_like_url(&args.source) {
        RenderSource::Url(args.source.clone())
    } else {
        RenderSource::File(PathBuf::from(&args.source))
    };
    let mut request = RenderRequest {
        name: name.to_string(),
        source,
        viewport: args.viewport,
        multi_page: args.multi_page,
        multi_page_height: args.multi_page_height,
        image_type: args.image_type.into(),
        quality: args.quality,
        clip: None,
        full_page: args.full_page,
        content_selector: args.selector.clone(),
        navigation_timeout: Some(Duration::from_secs(args.nav_timeout)),
        image_wait: Some(Duration::from_secs(args.image_wait)),
    };
    if request.image_type == ImageType::Jpeg && request.quality.is_none() {
        request.quality = Some(90);
    }
    request
}

fn looks_like_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://") || source.starts_with("file://")
}

fn write_output(output: RenderOutput, args: &RenderArgs) -> Result<Vec<PathBuf>> {
    match output {
        RenderOutput::Single(bytes) => {
            std::fs::write(&args.output, bytes)?;
            Ok(vec![args.output.clone()])
        }
        RenderOutput::Pages(pages) if args.stitch => {
            let stitched = stitch_pages(&pages)?;
            // JPEG has no alpha channel.
            let stitched = match ImageType::from(args.image_type) {
                ImageType::Jpeg => DynamicImage::ImageRgb8(stitched.to_rgb8()),
                ImageType::Png => stitched,
            };
            stitched.save(&args.output)?;
            Ok(vec![args.output.clone()])
        }
        RenderOutput::Pages(pages) => {
            let mut written = Vec::with_capacity(pages.len());
            for (i, bytes) in pages.iter().enumerate() {
                let path = numbered_path(&args.output, i + 1);
                std::fs::write(&path, bytes)?;
                written.push(path);
            }
            Ok(written)
        }
    }
}

/// shot.png -> shot_1.png, shot_2.png, ...
fn numbered_path(base: &Path, index: usize) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string());
    let ext = base
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".to_string());
    base.with_file_name(format!("{}_{}.{}", stem, index, ext))
}

/// Stack page segments vertically into one image.
fn stitch_pages(pages: &[Vec<u8>]) -> Result<DynamicImage> {
    let decoded: Vec<DynamicImage> = pages
        .iter()
        .map(|bytes| image::load_from_memory(bytes))
        .collect::<std::result::Result<_, _>>()?;
    let width = decoded.iter().map(|img| img.width()).max().unwrap_or(1);
    let height: u32 = decoded.iter().map(|img| img.height()).sum();
    let mut canvas = RgbaImage::new(width.max(1), height.max(1));
    let mut y = 0;
    for img in &decoded {
        canvas.copy_from(&img.to_rgba8(), 0, y)?;
        y += img.height();
    }
    Ok(DynamicImage::ImageRgba8(canvas))
}

fn report(error: &RenderError, code: ExitCode) -> ExitCode {
    let payload = error.to_payload();
    eprintln!("error: {}", payload.message);
    if let Some(hint) = &payload.remediation {
        eprintln!("hint: {}", hint);
    }
    code
}
