use anyhow::{anyhow, bail, Context, Result};
use camerakit::backend::{BackendFactory, LegacyDriver};
use camerakit::selection::{adjusted_preview_size, select_preview_size};
use camerakit::testing::{MemorySurface, RecordingHost, SimulatedLegacyDriver, SimulatedModernDriver};
use camerakit::{BackendKind, CameraKitConfig, Facing, Session, SessionState, Size};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const USAGE: &str = "Usage: camerakit-cli <command> [args]

Commands:
  info [--json]
  select-size <target WxH> <sensor deg> <display deg> <WxH>...
  capabilities [--backend legacy|modern] [--facing back|front] [--json]
  capture [--config <path>] [--backend legacy|modern] [--facing back|front]
          [--surface WxH] [--rotation deg] [--output <file>] [--timeout ms] [--native]
  write-config [path]";

fn main() -> Result<()> {
    camerakit::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "info" => cmd_info(&args),
        "select-size" => cmd_select_size(&args),
        "capabilities" => cmd_capabilities(&args),
        "capture" => cmd_capture(&args),
        "write-config" => cmd_write_config(&args),
        _ => {
            eprintln!("Unknown command: {}\n\n{}", command, USAGE);
            std::process::exit(1);
        }
    }
}

fn cmd_info(args: &[String]) -> Result<()> {
    let info = camerakit::get_info();
    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string(&info)?);
    } else {
        println!("{} {}", info.name, info.version);
        println!("{}", info.description);
        println!("native driver: {}", info.native_driver);
    }
    Ok(())
}

fn cmd_select_size(args: &[String]) -> Result<()> {
    if args.len() < 6 {
        bail!("Usage: camerakit-cli select-size <target WxH> <sensor deg> <display deg> <WxH>...");
    }
    let target: Size = args[2].parse().context("invalid target size")?;
    let sensor: u32 = args[3].parse().context("invalid sensor orientation")?;
    let display: u32 = args[4].parse().context("invalid display rotation")?;
    let candidates = args[5..]
        .iter()
        .map(|s| s.parse::<Size>())
        .collect::<Result<Vec<_>, _>>()
        .context("invalid candidate size")?;

    let selected = select_preview_size(target.width, target.height, sensor, display, &candidates)?;
    println!(
        "selected {} (layout {})",
        selected,
        adjusted_preview_size(selected, sensor, display)
    );
    Ok(())
}

/// Flags shared by the commands that run a session.
struct SessionOptions {
    config: CameraKitConfig,
    surface: Size,
    rotation: i32,
    output: PathBuf,
    timeout: Duration,
    native: bool,
    json: bool,
}

fn parse_session_options(args: &[String]) -> Result<SessionOptions> {
    let mut config_path = None;
    let mut backend = None;
    let mut facing = None;
    let mut options = SessionOptions {
        config: CameraKitConfig::default(),
        surface: Size::new(1080, 1920),
        rotation: 0,
        output: PathBuf::from("capture.jpg"),
        timeout: Duration::from_secs(5),
        native: false,
        json: false,
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => config_path = Some(PathBuf::from(option_value(args, &mut i)?)),
            "--backend" => backend = Some(option_value(args, &mut i)?.parse::<BackendKind>()?),
            "--facing" => facing = Some(parse_facing(option_value(args, &mut i)?)?),
            "--surface" => options.surface = option_value(args, &mut i)?.parse()?,
            "--rotation" => options.rotation = option_value(args, &mut i)?.parse()?,
            "--output" => options.output = PathBuf::from(option_value(args, &mut i)?),
            "--timeout" => {
                options.timeout = Duration::from_millis(option_value(args, &mut i)?.parse()?)
            }
            "--native" => options.native = true,
            "--json" => options.json = true,
            other => bail!("Unknown option: {}", other),
        }
        i += 1;
    }

    if let Some(path) = config_path {
        options.config = CameraKitConfig::load_from_file(&path)
            .with_context(|| format!("failed to load {}", path.display()))?;
    }
    if let Some(backend) = backend {
        options.config.session.backend = Some(backend);
    }
    if let Some(facing) = facing {
        options.config.camera.facing = facing;
    }
    Ok(options)
}

/// The value following the flag at `args[*i]`; advances `i` past it.
fn option_value<'a>(args: &'a [String], i: &mut usize) -> Result<&'a str> {
    let flag = &args[*i];
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} needs a value", flag))
}

fn parse_facing(value: &str) -> Result<Facing> {
    match value.to_ascii_lowercase().as_str() {
        "back" => Ok(Facing::Back),
        "front" => Ok(Facing::Front),
        other => bail!("unknown facing '{}'", other),
    }
}

fn legacy_driver(native: bool) -> Result<Arc<dyn LegacyDriver>> {
    if !native {
        return Ok(Arc::new(SimulatedLegacyDriver::phone()));
    }
    #[cfg(feature = "native")]
    {
        Ok(Arc::new(camerakit::backend::native::NokhwaDriver::new()))
    }
    #[cfg(not(feature = "native"))]
    {
        bail!("--native needs camerakit-cli built with the `native` feature")
    }
}

/// Bring a session up to an active preview on an in-memory surface.
fn start_session(options: &SessionOptions) -> Result<Session> {
    let mut kind = options.config.session.backend_kind();
    if options.native && kind != BackendKind::Legacy {
        log::info!("Webcam driver only speaks the legacy API; using legacy backend");
        kind = BackendKind::Legacy;
    }
    let factory = BackendFactory::select(
        kind,
        legacy_driver(options.native)?,
        Arc::new(SimulatedModernDriver::phone()),
    );

    let (host, _log) = RecordingHost::new();
    let mut session = Session::builder(factory, host)
        .config(options.config.clone())
        .on_error(|kind, message, fatal| {
            eprintln!("camera error ({}{}): {}", kind, if fatal { ", fatal" } else { "" }, message);
        })
        .build()?;

    session.notify_orientation_changed(options.rotation);
    session.notify_surface_created(MemorySurface::new());
    session.notify_surface_changed(options.surface.width, options.surface.height);

    let ready = session.run_until(options.timeout, |state| {
        matches!(state, SessionState::PreviewActive | SessionState::Error(_))
    });
    let state = session.state().clone();
    match state {
        SessionState::PreviewActive => Ok(session),
        SessionState::Error(e) => Err(anyhow!("session failed: {}", e)),
        other if !ready => Err(anyhow!("timed out waiting for preview (state {})", other)),
        other => Err(anyhow!("unexpected session state {}", other)),
    }
}

fn cmd_capabilities(args: &[String]) -> Result<()> {
    let options = parse_session_options(args)?;
    let session = start_session(&options)?;
    let capabilities = session
        .capabilities()
        .cloned()
        .ok_or_else(|| anyhow!("camera reported no capabilities"))?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&capabilities)?);
    } else {
        println!("backend: {}", session.backend_kind());
        println!("facing: {}", capabilities.facing());
        println!("sensor orientation: {}", capabilities.sensor_orientation());
        for size in capabilities.supported_preview_sizes() {
            println!("preview {}", size);
        }
        for size in capabilities.supported_image_sizes() {
            println!("picture {}", size);
        }
    }
    session.shutdown()?;
    Ok(())
}

fn cmd_capture(args: &[String]) -> Result<()> {
    let options = parse_session_options(args)?;
    let mut session = start_session(&options)?;
    if let Some(preview) = session.preview_size() {
        println!("preview running at {}", preview);
    }

    let mut receiver = session.capture()?;
    let deadline = std::time::Instant::now() + options.timeout;
    let image = loop {
        match receiver.try_recv() {
            Ok(result) => break result?,
            Err(tokio::sync::oneshot::error::TryRecvError::Empty) => {
                if std::time::Instant::now() >= deadline {
                    bail!("timed out waiting for capture");
                }
                session.wait_for_event(Duration::from_millis(50));
            }
            Err(tokio::sync::oneshot::error::TryRecvError::Closed) => {
                bail!("capture was dropped")
            }
        }
    };

    fs::write(&options.output, &image.data)
        .with_context(|| format!("failed to write {}", options.output.display()))?;
    println!(
        "saved {} bytes to {} ({} camera, {} backend, rotated {}, mirrored {})",
        image.data.len(),
        options.output.display(),
        image.facing,
        image.backend,
        image.rotation_degrees,
        image.mirrored
    );

    session.shutdown()?;
    Ok(())
}

fn cmd_write_config(args: &[String]) -> Result<()> {
    let path = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(CameraKitConfig::default_path);
    CameraKitConfig::default().save_to_file(&path)?;
    println!("wrote {}", path.display());
    Ok(())
}
