use anyhow::Context;
use clap::{Parser, Subcommand};
use facegate_core::capture::{FrameGrabber, V4lCamera};
use facegate_core::{Config, Gatekeeper, LoginOutcome, OnnxRecognizer};
use image::RgbImage;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

/// Frames thrown away while the sensor settles exposure
const WARMUP_FRAMES: usize = 5;

#[derive(Parser)]
#[command(name = "facegate")]
#[command(about = "Webcam face login: gallery and log maintenance", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered users
    List,
    /// Register a user from an image file, or from the camera
    Register {
        /// Name to register the face under
        name: String,
        /// Reference image; captured from the camera when omitted
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
    /// Identify the face in an image file, or in front of the camera
    Login {
        /// Face to identify; captured from the camera when omitted
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
    /// Capture a snapshot from the camera
    Snapshot {
        /// Output file path
        output: PathBuf,
    },
    /// List video capture devices
    Devices,
    /// Show configuration
    Config {
        /// Validate configuration
        #[arg(long)]
        validate: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .init();

    match cli.command {
        Commands::List => cmd_list(),
        Commands::Register { name, image } => cmd_register(name, image),
        Commands::Login { image } => cmd_login(image),
        Commands::Snapshot { output } => cmd_snapshot(output),
        Commands::Devices => cmd_devices(),
        Commands::Config { validate } => cmd_config(validate),
    }
}

/// Load `path`, or grab a frame from the configured camera.
fn acquire_image(config: &Config, path: Option<PathBuf>) -> anyhow::Result<RgbImage> {
    if let Some(path) = path {
        let image = image::open(&path)
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        return Ok(image.to_rgb8());
    }

    println!("Look at the camera...");
    let mut camera = V4lCamera::open(&config.camera)?;
    for _ in 0..WARMUP_FRAMES {
        if let Err(e) = camera.grab() {
            log::debug!("Warm-up frame dropped: {}", e);
        }
    }
    Ok(camera.grab()?)
}

fn cmd_list() -> anyhow::Result<()> {
    let config = Config::load()?;
    let gatekeeper = Gatekeeper::from_config(&config);
    let names = gatekeeper.gallery().names()?;

    if names.is_empty() {
        println!("No users registered in {}", gatekeeper.gallery().dir().display());
        return Ok(());
    }

    println!("Registered users ({}):", names.len());
    for name in names {
        println!("  {}", name);
    }
    Ok(())
}

fn cmd_register(name: String, image: Option<PathBuf>) -> anyhow::Result<()> {
    let config = Config::load()?;
    let capture = acquire_image(&config, image)?;

    let gatekeeper = Gatekeeper::from_config(&config);
    let mut recognizer = OnnxRecognizer::load(&config)?;

    let registration = gatekeeper.register(&mut recognizer, &name, &capture)?;
    println!("✓ User registered successfully!");
    println!("Reference image: {}", registration.path.display());
    Ok(())
}

fn cmd_login(image: Option<PathBuf>) -> anyhow::Result<()> {
    let config = Config::load()?;
    let face = acquire_image(&config, image)?;

    let gatekeeper = Gatekeeper::from_config(&config);
    let mut recognizer = OnnxRecognizer::load(&config)?;

    let start = Instant::now();
    let outcome = gatekeeper.login(&mut recognizer, &face, &AtomicBool::new(false))?;
    let duration = start.elapsed();

    println!();
    match outcome {
        LoginOutcome::Matched { entry, similarity } => {
            println!("✅ Welcome back, {}!", entry.name);
            println!("Similarity: {:.3} (policy: {})", similarity, config.matching.policy);
            println!("Logged to {}", gatekeeper.match_log().path().display());
        }
        LoginOutcome::UnknownUser => {
            println!("❌ Unknown user. Please register or try again.");
        }
        LoginOutcome::NoFaceDetected => {
            println!("❌ No face detected in the image.");
        }
    }
    println!("Total time: {:.2}ms", duration.as_secs_f64() * 1000.0);

    Ok(())
}

fn cmd_snapshot(output: PathBuf) -> anyhow::Result<()> {
    println!("Capturing snapshot to: {}", output.display());

    let config = Config::load()?;
    let frame = acquire_image(&config, None)?;
    frame
        .save(&output)
        .with_context(|| format!("Failed to save {}", output.display()))?;

    println!("✓ Snapshot saved: {}", output.display());
    println!("Resolution: {}x{}", frame.width(), frame.height());

    Ok(())
}

fn cmd_devices() -> anyhow::Result<()> {
    let devices = V4lCamera::list_devices()?;
    if devices.is_empty() {
        println!("No video devices found");
        return Ok(());
    }
    for device in devices {
        println!("{}", device);
    }
    Ok(())
}

fn cmd_config(validate: bool) -> anyhow::Result<()> {
    let config = Config::load()?;

    if validate {
        config.validate()?;
        println!("✓ Configuration is valid");
        return Ok(());
    }

    println!("Configuration:");
    println!();

    println!("[camera]");
    println!("  device = {:?}", config.camera.device);
    println!("  resolution = {}x{}", config.camera.width, config.camera.height);
    println!();

    println!("[detection]");
    println!("  model = {:?}", config.detection.model_path);
    println!(
        "  confidence_threshold = {}",
        config.detection.confidence_threshold
    );
    println!();

    println!("[embedding]");
    println!("  model = {:?}", config.embedding.model_path);
    println!();

    println!("[matching]");
    println!("  threshold = {}", config.matching.threshold);
    println!("  policy = {}", config.matching.policy);
    println!();

    println!("[storage]");
    println!("  gallery_dir = {:?}", config.storage.gallery_dir);
    println!("  image_extension = {:?}", config.storage.image_extension);
    println!("  log_path = {:?}", config.storage.log_path);
    println!();

    println!("[registration]");
    println!("  require_face = {}", config.registration.require_face);
    println!();

    println!("[preview]");
    println!("  refresh_ms = {}", config.preview.refresh_ms);

    Ok(())
}
