//! Pi Device Gateway binary
//!
//! Serves LED control, camera stills, an MJPEG stream and live telemetry for a
//! Raspberry Pi over HTTP and WebSocket.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use pi_device_gateway::camera::{self, CameraSession};
use pi_device_gateway::gpio::PinState;
use pi_device_gateway::metrics::{MetricSource, SystemCollector};
use pi_device_gateway::{
    start_web_server, CameraBackend, DeviceConfig, DeviceHub, ImageFormat, Resolution,
    TelemetrySample, WebConfig, DEFAULT_WEB_PORT,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "pi_device_gateway")]
#[command(about = "Raspberry Pi LED, camera and telemetry gateway")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Control a GPIO LED, capture and stream the camera, and watch host telemetry over HTTP and WebSocket")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// TOML configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Web server bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Web server port
    #[arg(short, long, default_value_t = DEFAULT_WEB_PORT)]
    port: u16,

    /// Telemetry interval in seconds
    #[arg(short, long)]
    interval: Option<f64>,

    /// GPIO chip index
    #[arg(long)]
    chip: Option<u8>,

    /// BCM number of the LED pin
    #[arg(long)]
    pin: Option<u8>,

    /// Camera resolution as WIDTHxHEIGHT
    #[arg(long)]
    resolution: Option<Resolution>,

    /// Camera backend: rpicam or test-pattern
    #[arg(long)]
    camera: Option<CameraBackend>,

    /// Default still format: png or jpeg
    #[arg(long)]
    still_format: Option<ImageFormat>,

    /// How long a still capture waits for the camera, in milliseconds
    #[arg(long)]
    capture_timeout_ms: Option<u64>,

    /// Simulate the LED pin in memory (useful for non-Pi systems)
    #[arg(long)]
    mock_gpio: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server (default)
    Serve(ServeArgs),

    /// Take one telemetry sample and exit
    Snapshot(SnapshotArgs),

    /// Capture one still image to a file and exit
    Capture(CaptureArgs),
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Directory with an index.html to serve instead of the built-in page
    #[arg(long)]
    static_dir: Option<String>,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,
}

#[derive(Args)]
struct SnapshotArgs {
    /// Output format: json or pretty
    #[arg(short, long, default_value = "pretty")]
    format: String,
}

#[derive(Args)]
struct CaptureArgs {
    /// Output file (defaults to capture.png or capture.jpg)
    output: Option<PathBuf>,

    /// Image format: png or jpeg (defaults to the configured still format)
    #[arg(short, long)]
    format: Option<ImageFormat>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    init_logging(&cli)?;

    let config = load_config(&cli)?;

    match &cli.command {
        Some(Commands::Serve(args)) => serve_command(&cli, args, config).await,
        Some(Commands::Snapshot(args)) => snapshot_command(args, config).await,
        Some(Commands::Capture(args)) => capture_command(args, config).await,
        None => serve_command(&cli, &ServeArgs::default(), config).await,
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    // RUST_LOG wins over the flags when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

/// File values first, then flag overrides, then validation.
fn load_config(cli: &Cli) -> anyhow::Result<DeviceConfig> {
    let mut config = match &cli.config {
        Some(path) => DeviceConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DeviceConfig::default(),
    };

    if cli.chip.is_some() || cli.pin.is_some() {
        let chip = cli.chip.unwrap_or(config.chip);
        let pin = cli.pin.unwrap_or(config.pin);
        config = config.with_pin(chip, pin);
    }
    if let Some(resolution) = cli.resolution {
        config = config.with_resolution(resolution);
    }
    if let Some(interval) = cli.interval {
        config = config.with_interval_seconds(interval);
    }
    if let Some(camera) = cli.camera {
        config = config.with_camera(camera);
    }
    if let Some(format) = cli.still_format {
        config = config.with_still_format(format);
    }
    if let Some(ms) = cli.capture_timeout_ms {
        config = config.with_capture_timeout(Duration::from_millis(ms));
    }

    config.validate()?;
    Ok(config)
}

async fn serve_command(cli: &Cli, args: &ServeArgs, config: DeviceConfig) -> anyhow::Result<()> {
    info!("Starting Pi device gateway...");

    let web_config = web_config(cli, args);

    info!("Web server configuration:");
    info!("  - Bind address: {}", web_config.bind_address());
    info!("  - CORS enabled: {}", web_config.enable_cors);
    info!("  - LED: GPIO{} on chip {}", config.pin, config.chip);
    info!("  - Telemetry interval: {}s", config.interval_seconds);

    let hub = DeviceHub::from_config(config, cli.mock_gpio)?;
    start_web_server(web_config, hub).await?;

    info!("Gateway stopped");
    Ok(())
}

fn web_config(cli: &Cli, args: &ServeArgs) -> WebConfig {
    WebConfig::default()
        .with_host(cli.host.as_str())
        .with_port(cli.port)
        .with_cors(!args.no_cors)
        .with_static_path(args.static_dir.clone())
}

async fn snapshot_command(args: &SnapshotArgs, config: DeviceConfig) -> anyhow::Result<()> {
    let mut collector = SystemCollector::new(&config.thermal_path, &config.disk_mount);
    let readings = tokio::task::spawn_blocking(move || collector.sample()).await?;

    // The pin is not opened here, so its level is reported as off
    let pin = PinState {
        pin: config.pin,
        level: false,
    };
    let sample = TelemetrySample::from_readings(readings, pin);

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&sample)?),
        "pretty" => print_pretty_sample(&sample),
        other => anyhow::bail!("Unsupported format: {}. Use 'json' or 'pretty'", other),
    }

    Ok(())
}

async fn capture_command(args: &CaptureArgs, config: DeviceConfig) -> anyhow::Result<()> {
    let format = args.format.unwrap_or(config.still_format);
    let session = CameraSession::new(
        camera::open_device(&config),
        config.capture_timeout(),
        config.jpeg_quality,
    );

    let captured = session.capture_still(format).await;
    session.release(config.capture_timeout()).await;
    let image = captured?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_capture_path(format));
    tokio::fs::write(&output, &image)
        .await
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "Saved {} bytes of {} to {}",
        image.len(),
        format.content_type(),
        output.display()
    );
    Ok(())
}

fn default_capture_path(format: ImageFormat) -> PathBuf {
    PathBuf::from(format!("capture.{}", format.extension()))
}

fn print_pretty_sample(sample: &TelemetrySample) {
    fn show<T: std::fmt::Display>(value: &Option<T>, unit: &str) -> String {
        match value {
            Some(v) => format!("{}{}", v, unit),
            None => "n/a".to_string(),
        }
    }

    let at = chrono::DateTime::from_timestamp_millis(sample.timestamp as i64)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_default();

    println!("Telemetry Snapshot ({})", at);
    println!("==========================================");
    println!("  CPU model:   {}", show(&sample.cpu_model, ""));
    println!("  CPU cores:   {}", show(&sample.cpu_cores, ""));
    println!(
        "  CPU usage:   {}",
        show(&sample.cpu_percent.map(|v| format!("{:.1}", v)), "%")
    );
    println!(
        "  CPU temp:    {}",
        show(&sample.cpu_temperature.map(|v| format!("{:.1}", v)), " °C")
    );
    println!(
        "  Memory:      {}",
        show(&sample.memory_percent.map(|v| format!("{:.1}", v)), "%")
    );
    println!(
        "  Disk:        {}",
        show(&sample.disk_percent.map(|v| format!("{:.1}", v)), "%")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["pi_device_gateway", "--port", "9090"]).unwrap();
        assert_eq!(cli.port, 9090);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_default_values() {
        let cli = Cli::try_parse_from(["pi_device_gateway"]).unwrap();
        assert_eq!(cli.port, DEFAULT_WEB_PORT);
        assert_eq!(cli.host, "0.0.0.0");
        assert!(!cli.mock_gpio);

        let config = load_config(&cli).unwrap();
        assert_eq!(config.pin, pi_device_gateway::DEFAULT_LED_PIN);
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "pi_device_gateway",
            "--pin",
            "27",
            "--resolution",
            "1280x720",
            "--camera",
            "test-pattern",
            "--interval",
            "0.5",
            "serve",
            "--no-cors",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.pin, 27);
        assert_eq!(config.chip, 0);
        assert_eq!(config.resolution, Resolution::new(1280, 720));
        assert_eq!(config.camera, CameraBackend::TestPattern);
        assert_eq!(config.interval_seconds, 0.5);
        assert!(matches!(cli.command, Some(Commands::Serve(ServeArgs { no_cors: true, .. }))));
    }

    #[test]
    fn test_invalid_interval_rejected() {
        let cli = Cli::try_parse_from(["pi_device_gateway", "--interval", "0"]).unwrap();
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn test_capture_subcommand() {
        let cli =
            Cli::try_parse_from(["pi_device_gateway", "capture", "out.png", "-f", "png"]).unwrap();
        match cli.command {
            Some(Commands::Capture(args)) => {
                assert_eq!(args.output, Some(PathBuf::from("out.png")));
                assert_eq!(args.format, Some(ImageFormat::Png));
            }
            _ => panic!("expected capture subcommand"),
        }
    }

    #[test]
    fn test_capture_output_defaults_to_format_extension() {
        let cli = Cli::try_parse_from(["pi_device_gateway", "capture"]).unwrap();
        match cli.command {
            Some(Commands::Capture(args)) => assert!(args.output.is_none()),
            _ => panic!("expected capture subcommand"),
        }
        assert_eq!(default_capture_path(ImageFormat::Png), PathBuf::from("capture.png"));
        assert_eq!(default_capture_path(ImageFormat::Jpeg), PathBuf::from("capture.jpg"));
    }

    #[test]
    fn test_still_flags_override_config() {
        let cli = Cli::try_parse_from([
            "pi_device_gateway",
            "--still-format",
            "png",
            "--capture-timeout-ms",
            "500",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.still_format, ImageFormat::Png);
        assert_eq!(config.capture_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_unrepresentable_intervals_rejected() {
        for interval in ["1e-12", "1e30"] {
            let cli = Cli::try_parse_from(["pi_device_gateway", "--interval", interval]).unwrap();
            assert!(load_config(&cli).is_err(), "{} should be rejected", interval);
        }
    }

    #[test]
    fn test_host_and_port_reach_web_config() {
        let cli = Cli::try_parse_from([
            "pi_device_gateway",
            "--host",
            "::",
            "--port",
            "9100",
            "serve",
            "--no-cors",
        ])
        .unwrap();
        let args = match &cli.command {
            Some(Commands::Serve(args)) => args,
            _ => panic!("expected serve subcommand"),
        };
        let config = web_config(&cli, args);
        assert_eq!(config.bind_address(), "[::]:9100");
        assert!(!config.enable_cors);
    }
}
