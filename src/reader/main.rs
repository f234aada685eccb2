// This is free and unencumbered software released into the public domain.

#[cfg(not(feature = "std"))]
compile_error!("asimov-camera2-reader requires the 'std' feature");

use asimov_camera2_module::{
    cli,
    shared::{
        CameraConfig, CameraError, CaptureEngine, CaptureSink, Frame, PortableSettings, open_camera,
    },
};
use asimov_module::SysexitsError::{self, *};
use bytes::Bytes;
use clap::Parser;
use clientele::StandardOptions;
use serde_json::json;
use std::{
    error::Error as StdError,
    io::{self, Write},
    path::PathBuf,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{Receiver, RecvTimeoutError, Sender, channel},
    },
    time::Duration,
};

const PHOTO_CALLBACK_ID: u64 = 1;

#[derive(Debug, Parser)]
struct Options {
    #[clap(flatten)]
    flags: StandardOptions,

    /// Camera input URL, e.g. `sim:0`.
    #[arg(long)]
    device: Option<String>,

    #[arg(short, long = "size", value_parser = parse_dimensions, default_value = "640x480")]
    size: (u32, u32),

    #[arg(short, long, value_parser = parse_frequency, default_value = "30")]
    frequency: f64,

    /// Stop after this many frames.
    #[arg(short = 'n', long)]
    frames: Option<u64>,

    /// Take one photo once the preview has started and write it here.
    #[arg(long, value_name = "PATH")]
    photo: Option<PathBuf>,

    #[arg(long)]
    zoom: Option<f64>,

    /// Display rotation in degrees clockwise.
    #[arg(long, default_value_t = 0)]
    rotation: u32,
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

    let exit_code = match run_reader(&options) {
        Ok(()) => EX_OK,
        Err(err) => cli::handle_error(&err, &options.flags),
    };

    Ok(exit_code)
}

enum ReaderEvent {
    Started,
    Error(String),
    Photo(Bytes),
}

struct ReaderSink {
    quit: Arc<AtomicBool>,
    frames: AtomicU64,
    limit: Option<u64>,
    events: Sender<ReaderEvent>,
}

impl CaptureSink for ReaderSink {
    fn on_started(&self) {
        let _ = self.events.send(ReaderEvent::Started);
    }

    fn on_error(&self, message: &str) {
        let _ = self.events.send(ReaderEvent::Error(message.into()));
    }

    fn on_frame_available(&self, frame: &Frame) {
        if self.quit.load(Ordering::SeqCst) {
            return;
        }

        let strides: Vec<_> = frame
            .planes
            .iter()
            .map(|plane| json!([plane.row_stride, plane.pixel_stride]))
            .collect();
        let line = json!({
            "width": frame.width,
            "height": frame.height,
            "rotation": frame.rotation,
            "timestamp_ns": frame.timestamp_ns,
            "format": frame.pixel_format.to_string(),
            "bytes": frame.data_len(),
            "strides": strides,
        });

        let mut out = io::stdout().lock();
        if let Err(err) = writeln!(&mut out, "{line}") {
            if err.kind() == io::ErrorKind::BrokenPipe {
                self.quit.store(true, Ordering::SeqCst);
            }
        }

        let seen = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if self.limit.is_some_and(|limit| seen >= limit) {
            self.quit.store(true, Ordering::SeqCst);
        }
    }

    fn on_photo_taken(&self, _callback_id: u64, data: Bytes) {
        let _ = self.events.send(ReaderEvent::Photo(data));
    }
}

fn run_reader(opts: &Options) -> Result<(), CameraError> {
    cli::info_user(&opts.flags, "starting camera reader");

    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit2 = Arc::clone(&quit);
        ctrlc::set_handler(move || {
            quit2.store(true, Ordering::SeqCst);
        })
        .map_err(|e| CameraError::other(format!("{e}")))?;
    }

    let (width, height) = opts.size;
    let fps = opts.frequency.round().max(1.0) as u32;
    let device = opts.device.clone().unwrap_or_else(|| "sim:0".into());
    let config = CameraConfig::new(width, height, fps)
        .with_device(device.clone())
        .with_diagnostics(opts.flags.debug || opts.flags.verbose >= 3);

    let (events_tx, events_rx) = channel();
    let sink = Arc::new(ReaderSink {
        quit: Arc::clone(&quit),
        frames: AtomicU64::new(0),
        limit: opts.frames,
        events: events_tx,
    });

    let weak = Arc::downgrade(&sink) as Weak<dyn CaptureSink>;
    let engine = open_camera(&device, config, weak)?;
    if let Some(format) = engine.capture_format() {
        cli::info_user(&opts.flags, &format!("capturing {format} from {device}"));
    }
    engine.set_device_rotation(opts.rotation);
    if let Some(zoom) = opts.zoom {
        engine.set_photo_options(&PortableSettings {
            zoom: Some(zoom),
            ..Default::default()
        });
    }

    if !engine.start_capture() {
        return Err(CameraError::other("failed to start capture"));
    }

    let result = pump_events(opts, &engine, &events_rx, &quit);
    engine.stop_capture();
    result
}

fn pump_events(
    opts: &Options,
    engine: &CaptureEngine,
    events: &Receiver<ReaderEvent>,
    quit: &AtomicBool,
) -> Result<(), CameraError> {
    let mut photo_pending = false;
    while !quit.load(Ordering::SeqCst) {
        let event = match events.recv_timeout(Duration::from_millis(50)) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        match event {
            ReaderEvent::Started => {
                cli::info_user(&opts.flags, "capture started");
                if opts.photo.is_some() && !photo_pending {
                    photo_pending = engine.take_photo(PHOTO_CALLBACK_ID);
                    if !photo_pending {
                        cli::warn_user(&opts.flags, "photo request was rejected");
                    }
                }
            },
            ReaderEvent::Error(message) => {
                cli::warn_user(&opts.flags, &message);
            },
            ReaderEvent::Photo(data) => {
                photo_pending = false;
                let Some(path) = opts.photo.as_ref() else {
                    continue;
                };
                if data.is_empty() {
                    cli::warn_user(&opts.flags, "photo capture failed");
                    continue;
                }
                if let Err(err) = std::fs::write(path, &data) {
                    cli::warn_user_with_error(&opts.flags, "writing photo failed", &err);
                } else {
                    cli::info_user(
                        &opts.flags,
                        &format!("wrote {} bytes to {}", data.len(), path.display()),
                    );
                }
            },
        }
    }
    Ok(())
}

fn parse_dimensions(s: &str) -> Result<(u32, u32), String> {
    let s = s.trim().replace('×', "x");
    let parts: Vec<&str> = s.split('x').map(|t| t.trim()).collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(format!("Invalid format '{s}'. Use WxH (e.g., 1920x1080)"));
    }

    let width: u32 = parts[0]
        .parse()
        .map_err(|_| format!("Invalid width: {}", parts[0]))?;
    let height: u32 = parts[1]
        .parse()
        .map_err(|_| format!("Invalid height: {}", parts[1]))?;

    if !(160..=7680).contains(&width) {
        return Err(format!("Width {width} is out of reasonable range (160-7680)"));
    }
    if !(120..=4320).contains(&height) {
        return Err(format!("Height {height} is out of reasonable range (120-4320)"));
    }

    Ok((width, height))
}

fn parse_frequency(s: &str) -> Result<f64, String> {
    let freq: f64 = s.parse().map_err(|_| format!("Invalid frequency: {s}"))?;

    if freq <= 0.0 {
        return Err("Frequency must be positive".to_string());
    }
    if freq > 240.0 {
        return Err(format!("Frequency {freq} Hz exceeds reasonable maximum (240 Hz)"));
    }

    Ok(freq)
}
