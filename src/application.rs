use std::path::Path;
use std::path::PathBuf;
use std::io;
use std::io::BufReader;
use std::fs;
use std::fs::File;

use image::RgbImage;
use image::RgbaImage;

use super::blend;
use super::blend::BlendOptions;


pub type BlendResult<T> = Result<T, Box<dyn std::error::Error>>;

pub struct AppOptions {
    background: PathBuf,
    overlay: PathBuf,
    output: PathBuf,
    blend_options: BlendOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        AppOptions {
            background: PathBuf::from("reference.png"),
            overlay: PathBuf::from("heatmap.png"),
            output: PathBuf::from("result.png"),
            blend_options: Default::default(),
        }
    }
}

impl AppOptions {

    pub fn blend_options_mut(&mut self) -> &mut BlendOptions {
        &mut self.blend_options
    }

    pub fn set_background(&mut self, path: &str) {
        self.background = PathBuf::from(path);
    }

    pub fn set_overlay(&mut self, path: &str) {
        self.overlay = PathBuf::from(path);
    }

    pub fn set_output(&mut self, path: &str) {
        self.output = PathBuf::from(path);
    }

    pub fn ensure_output_folder(&self) -> io::Result<()> {
        match self.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
                fs::create_dir_all(parent)
            },
            _ => Ok(())
        }
    }
}

pub struct Application {
    options: AppOptions,
}

impl Application {

    pub fn new(options: AppOptions) -> Self {
        Application {
            options
        }
    }

    pub fn run(&self) -> BlendResult<()> {
        let options = &self.options;
        let mut background = load_background(&options.background)?;
        let overlay = load_overlay(&options.overlay)?;
        log::info!(
            "background {} {}x{}, overlay {} {}x{}",
            options.background.display(), background.width(), background.height(),
            options.overlay.display(), overlay.width(), overlay.height()
        );
        let blend_options = &options.blend_options;
        log::info!(
            "blend at {} scale {} opacity {} threads {}",
            blend_options.position, blend_options.scale, blend_options.opacity, blend_options.threads
        );
        if blend_options.is_plain() {
            blend::composite(&mut background, &overlay, blend_options.position, blend_options.scale, blend_options.opacity);
        } else {
            blend::composite_with(&mut background, &overlay, blend_options);
        }
        options.ensure_output_folder()?;
        background.save(&options.output).map_err(error_trans)?;
        log::info!("result written to {}", options.output.display());
        Ok(())
    }
}

pub fn load_background(path: &Path) -> BlendResult<RgbImage> {
    let image = image::open(path).map_err(error_trans)?;
    Ok(image.into_rgb8())
}

/// Decodes keeping the alpha channel; images without one come back opaque.
pub fn load_overlay(path: &Path) -> BlendResult<RgbaImage> {
    let image = image::open(path).map_err(error_trans)?;
    Ok(image.into_rgba8())
}

pub fn load_blend_options(path: &Path) -> BlendResult<BlendOptions> {
    let file = File::open(path)?;
    let options = serde_json::from_reader(BufReader::new(file))?;
    Ok(options)
}

fn error_trans(e: image::ImageError) -> Box<dyn std::error::Error> {
    use image::ImageError;

    match e {
        ImageError::IoError(err) => Box::new(err),
        ImageError::Decoding(err) => Box::new(err),
        ImageError::Encoding(err) => Box::new(err),
        ImageError::Parameter(err) => Box::new(err),
        ImageError::Limits(err) => Box::new(err),
        ImageError::Unsupported(err) => Box::new(err),
    }
}
