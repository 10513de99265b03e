use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tally_core::session::FrameSource;
use tally_hw::Camera;

#[zbus::proxy(
    interface = "org.freedesktop.Tally1",
    default_service = "org.freedesktop.Tally1",
    default_path = "/org/freedesktop/Tally1"
)]
trait Tally {
    async fn start(&self) -> zbus::Result<String>;
    async fn stop(&self) -> zbus::Result<()>;
    async fn reset(&self) -> zbus::Result<()>;
    async fn status(&self) -> zbus::Result<String>;
    async fn log(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "tally", about = "Tally attendance kiosk CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the face-detection session
    Start,
    /// Stop a running detection session
    Stop,
    /// Show kiosk status (session state, distance, today's mark)
    Status,
    /// Show the attendance log
    Log,
    /// Clear all attendance state
    Reset,
    /// Run camera diagnostics (bypasses the daemon)
    Test {
        /// V4L2 device path
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Test { device } = &cli.command {
        return camera_test(device);
    }

    let conn = zbus::Connection::session()
        .await
        .context("connecting to the session bus")?;
    let proxy = TallyProxy::new(&conn)
        .await
        .context("connecting to tallyd")?;

    match cli.command {
        Commands::Start => {
            let message = proxy.start().await?;
            println!("{message}");
        }
        Commands::Stop => {
            proxy.stop().await?;
            println!("detection stopped");
        }
        Commands::Status => {
            print_json(&proxy.status().await?)?;
        }
        Commands::Log => {
            print_json(&proxy.log().await?)?;
        }
        Commands::Reset => {
            proxy.reset().await?;
            println!("attendance state cleared");
        }
        Commands::Test { .. } => unreachable!("handled before bus connection"),
    }

    Ok(())
}

fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("parsing daemon reply")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Grab one frame directly from the camera and report what came back.
fn camera_test(device: &str) -> Result<()> {
    println!("Opening {device}...");
    let mut camera = Camera::new(device);
    camera
        .acquire()
        .with_context(|| format!("acquiring {device}"))?;

    let result = camera.grab();
    camera.release();

    let frame = result.context("capturing a frame")?;
    println!(
        "Captured {}x{} frame, mean brightness {:.1}",
        frame.width,
        frame.height,
        frame.mean_brightness()
    );
    Ok(())
}
