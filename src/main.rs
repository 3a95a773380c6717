
mod blend;
mod application;

use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

use clap::App;
use clap::Arg;
use clap::ArgMatches;

use application::AppOptions;
use application::BlendResult;


const VERSION: &'static str = env!("CARGO_PKG_VERSION");
const AUTHORS: &'static str = env!("CARGO_PKG_AUTHORS");


fn build_app() -> App<'static, 'static> {
    App::new("transparent overlay blender")
        .version(VERSION)
        .author(AUTHORS)
        .arg(
            Arg::with_name("background")
            .short("b")
            .long("background")
            .help("background image, default is \"reference.png\"")
            .takes_value(true)
        )
        .arg(
            Arg::with_name("overlay")
            .short("o")
            .long("overlay")
            .help("transparent overlay image, default is \"heatmap.png\"")
            .takes_value(true)
        )
        .arg(
            Arg::with_name("output")
            .long("output")
            .help("output image, format follows the extension; default is \"result.png\"")
            .takes_value(true)
        )
        .arg(
            Arg::with_name("config")
            .short("c")
            .long("config")
            .help("json file with blend options; flags given here override it")
            .takes_value(true)
        )
        .arg(
            Arg::with_name("pos")
            .long("pos")
            .help("overlay position on the background as \"<row>,<col>\", default is \"0,0\"")
            .allow_hyphen_values(true)
            .takes_value(true)
        )
        .arg(
            Arg::with_name("scale")
            .long("scale")
            .help("scale factor of the overlay, default is 1.0")
            .takes_value(true)
        )
        .arg(
            Arg::with_name("opacity")
            .long("opacity")
            .help("global opacity of the overlay, from 0.0 to 1.0, default is 0.35")
            .takes_value(true)
        )
        .arg(
            Arg::with_name("filter")
            .long("filter")
            .help("filter used in scale, can be \"nearest\", \"triangle\", \"gaussian\", \"catmullrom\", \"lanczos3\"; default is \"triangle\"")
            .takes_value(true)
        )
        .arg(
            Arg::with_name("threads")
            .short("t")
            .long("threads")
            .help("multi-thread: thread number, at most 16")
            .takes_value(true)
        )
}

fn build_options(args: &ArgMatches) -> BlendResult<AppOptions> {
    let mut options = AppOptions::default();
    if let Some(path) = args.value_of("config") {
        *options.blend_options_mut() = application::load_blend_options(Path::new(path))?;
    }
    if let Some(path) = args.value_of("background") {
        options.set_background(path);
    }
    if let Some(path) = args.value_of("overlay") {
        options.set_overlay(path);
    }
    if let Some(path) = args.value_of("output") {
        options.set_output(path);
    }
    let blend_options = options.blend_options_mut();
    if let Some(pos) = args.value_of("pos") {
        match blend::Position::from_str(pos) {
            Ok(pos) => blend_options.set_position(pos),
            Err(e) => log::warn!("ignored position \"{}\": bad {}", pos, e),
        }
    }
    if let Some(scale) = args.value_of("scale") {
        if !scale.parse::<f32>().map(|v| blend_options.set_scale(v)).unwrap_or(false) {
            log::warn!("ignored scale \"{}\"", scale);
        }
    }
    if let Some(opacity) = args.value_of("opacity") {
        match opacity.parse::<f64>() {
            Ok(opacity) => blend_options.set_opacity(opacity),
            Err(_) => log::warn!("ignored opacity \"{}\"", opacity),
        }
    }
    if let Some(filter) = args.value_of("filter") {
        if !blend_options.set_filter(filter) {
            log::warn!("ignored filter \"{}\"", filter);
        }
    }
    if let Some(threads) = args.value_of("threads") {
        if !threads.parse::<usize>().map(|v| blend_options.set_threads(v)).unwrap_or(false) {
            log::warn!("ignored threads \"{}\"", threads);
        }
    }
    Ok(options)
}

fn main() {

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = build_app().get_matches();
    let options = match build_options(&args) {
        Ok(options) => options,
        Err(e) => {
            log::error!("config {} error: {}", args.value_of("config").unwrap_or_default(), e);
            std::process::exit(2);
        }
    };

    let app = application::Application::new(options);
    let time = Instant::now();
    if let Err(e) = app.run() {
        log::error!("blend failed: {}", e);
        std::process::exit(1);
    }
    let time = Instant::now() - time;
    log::info!("> used {}ms", time.as_millis());
}


#[cfg(test)]
mod test {

    use image::imageops::FilterType;

    use super::build_app;
    use super::build_options;
    use crate::blend::Position;

    #[test]
    fn test_threads_flag() {
        for input in &[
            vec!["overlay_blender", "--threads", "4"],
            vec!["overlay_blender", "-t", "4"],
        ] {
            let args = build_app().get_matches_from_safe(input.iter()).unwrap();
            let mut options = build_options(&args).unwrap();
            assert_eq!(options.blend_options_mut().threads, 4);
        }
        assert!(build_app().get_matches_from_safe(&["overlay_blender", "--thread", "4"]).is_err());
    }

    #[test]
    fn test_flags_apply_and_bad_values_are_ignored() {
        let args = build_app().get_matches_from_safe(&[
            "overlay_blender",
            "--pos", "-3,7",
            "--scale", "2.5",
            "--opacity", "0.6",
            "--filter", "nearest",
        ]).unwrap();
        let mut options = build_options(&args).unwrap();
        let blend_options = options.blend_options_mut();
        assert_eq!(blend_options.position, Position::new(-3, 7));
        assert_eq!(blend_options.scale, 2.5);
        assert_eq!(blend_options.opacity, 0.6);
        assert_eq!(blend_options.filter, FilterType::Nearest);

        let args = build_app().get_matches_from_safe(&[
            "overlay_blender",
            "--pos", "3",
            "--scale", "0",
            "--opacity", "much",
            "--filter", "bicubic",
            "--threads", "99",
        ]).unwrap();
        let mut options = build_options(&args).unwrap();
        let blend_options = options.blend_options_mut();
        assert_eq!(blend_options.position, Position::new(0, 0));
        assert_eq!(blend_options.scale, 1.0);
        assert_eq!(blend_options.opacity, 0.35);
        assert_eq!(blend_options.filter, FilterType::Triangle);
        assert_eq!(blend_options.threads, 1);
    }

    #[test]
    fn test_missing_config_is_an_error() {
        let args = build_app().get_matches_from_safe(&["overlay_blender", "--config", "/nonexistent/blend.json"]).unwrap();
        assert!(build_options(&args).is_err());
    }
}
