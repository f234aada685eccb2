// This is free and unencumbered software released into the public domain.

#[cfg(not(feature = "std"))]
compile_error!("asimov-camera2-cataloger requires the 'std' feature");

use asimov_camera2_module::{
    cli,
    shared::{CameraError, CameraInfo, describe_camera, number_of_cameras, open_hal},
};
use asimov_module::SysexitsError::{self, *};
use clap::Parser;
use clientele::StandardOptions;
use serde_json::json;
use std::error::Error as StdError;

#[derive(Debug, Parser)]
struct Options {
    #[clap(flatten)]
    flags: StandardOptions,

    /// Camera backend to enumerate, e.g. `sim:`.
    #[arg(long, default_value = "sim:")]
    device: String,

    #[arg(
        value_name = "FORMAT",
        short = 'o',
        long = "output",
        value_enum,
        default_value = "text"
    )]
    output: OutputFormat,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Jsonl,
}

pub fn main() -> Result<SysexitsError, Box<dyn StdError>> {
    asimov_module::dotenv().ok();
    let args = asimov_module::args_os()?;
    let options = Options::parse_from(args);

    if options.flags.version {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(EX_OK);
    }

    if options.flags.license {
        print!("{}", include_str!("../../UNLICENSE"));
        return Ok(EX_OK);
    }

    asimov_module::init_tracing_subscriber(&options.flags).expect("failed to initialize logging");

    let exit_code = match run_cataloger(&options) {
        Ok(()) => EX_OK,
        Err(err) => cli::handle_error(&err, &options.flags),
    };

    Ok(exit_code)
}

fn run_cataloger(options: &Options) -> Result<(), CameraError> {
    cli::info_user(&options.flags, "enumerating camera devices");

    let (hal, _) = open_hal(&options.device)?;
    let count = number_of_cameras(hal.as_ref());
    if count == 0 {
        cli::warn_user(&options.flags, "no camera devices found");
        return Ok(());
    }

    let mut ids = hal.camera_ids()?;
    ids.sort();

    for id in ids {
        let Some(info) = describe_camera(hal.as_ref(), &id) else {
            cli::warn_user(&options.flags, &format!("camera {id} has no characteristics"));
            continue;
        };
        match options.output {
            OutputFormat::Text => print_text(&info, &options.flags),
            OutputFormat::Jsonl => print_jsonl(&info),
        }
    }

    Ok(())
}

fn print_text(info: &CameraInfo, flags: &StandardOptions) {
    if info.legacy {
        println!("{}: {} [{}, legacy]", info.id, info.name, info.api);
    } else {
        println!("{}: {} [{}]", info.id, info.name, info.api);
    }
    if flags.verbose >= 1 {
        for format in &info.formats {
            println!("  {format}");
        }
    }
}

fn print_jsonl(info: &CameraInfo) {
    let formats: Vec<_> = info
        .formats
        .iter()
        .map(|format| {
            json!({
                "width": format.width,
                "height": format.height,
                "fps": format.frame_rate,
                "format": format.pixel_format.to_string(),
            })
        })
        .collect();
    println!(
        "{}",
        json!({
            "id": info.id,
            "name": info.name,
            "api": info.api.to_string(),
            "legacy": info.legacy,
            "formats": formats,
        })
    );
}
