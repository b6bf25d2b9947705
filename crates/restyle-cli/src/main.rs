use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use restyle_core::config::GenerationConfig;
use restyle_core::session::{SessionRepository, SwipeController, SwipeSession, VariationKind};
use restyle_infrastructure::{
    GeminiClient, GeminiPromptProvider, GeminiSynthesizer, JsonSessionRepository,
    LocalImageStore, SecretStore,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "restyle")]
#[command(about = "Restyle - swipe through AI-generated variations of a portrait", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a swipe session for a portrait photo
    Run {
        /// Path to the portrait photo (JPEG or PNG)
        #[arg(long)]
        image: PathBuf,
        /// Kind of variation to generate: hairstyle or outfit
        #[arg(long, default_value = "hairstyle")]
        kind: String,
    },
    /// List previously saved sessions
    Sessions,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { image, kind } => run(image, kind).await,
        Commands::Sessions => list_sessions().await,
    }
}

fn build_controller() -> Result<Arc<SwipeController>> {
    let secrets = SecretStore::default_location()?.load()?;
    let client = GeminiClient::new(secrets.gemini_api_key);
    let config = GenerationConfig::default();
    let store = Arc::new(LocalImageStore::default_location()?);
    let prompt_provider = Arc::new(GeminiPromptProvider::new(client.clone()));
    let synthesizer = Arc::new(GeminiSynthesizer::new(client, store).with_config(&config));
    let repository = Arc::new(JsonSessionRepository::default_location()?);
    Ok(SwipeController::new(
        prompt_provider,
        synthesizer,
        repository,
        config,
    ))
}

async fn run(image: PathBuf, kind: String) -> Result<()> {
    let kind = VariationKind::from_str(&kind)
        .map_err(|_| anyhow::anyhow!("kind must be 'hairstyle' or 'outfit', got '{kind}'"))?;
    if !image.exists() {
        bail!("image not found: {}", image.display());
    }

    let controller = build_controller()?;
    controller
        .start_session(image.to_string_lossy(), None, kind)
        .await;

    println!("Analyzing your photo and generating the first variations...");
    controller
        .initialize_generation()
        .await
        .context("session initialization failed")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if controller.is_session_complete().await {
            println!("You've swiped through everything.");
            println!("[m] generate more  [s] save session  [q] quit");
        } else {
            let Some(session) = controller.current_session().await else {
                break;
            };
            if let Some(error) = &session.last_error {
                println!("Something went wrong: {error}");
                println!("[d] dismiss and continue  [q] quit");
            } else if session.current_image().is_none() {
                // The cursor caught up with generation; wait it out.
                controller.wait_for_pending_generation().await;
                let still_waiting = controller
                    .current_session()
                    .await
                    .map_or(true, |s| s.current_image().is_none());
                if still_waiting {
                    println!("Waiting for more images... press enter to check again.");
                }
            } else {
                print_current(&session);
                println!("[l] dislike  [r] like  [s] save session  [q] quit");
            }
        }

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "l" => {
                controller.swipe_left().await;
            }
            "r" => {
                controller.swipe_right().await;
            }
            "m" => {
                let liked = controller
                    .current_session()
                    .await
                    .map_or(0, |s| s.liked_count());
                if liked == 0 {
                    println!("Like at least one image before asking for more.");
                } else {
                    println!("Generating more variations based on your likes...");
                    match controller.generate_more_images().await {
                        Ok(count) => println!("Added {count} new images."),
                        Err(err) => println!("Could not generate more: {err}"),
                    }
                }
            }
            "d" => controller.dismiss_error().await,
            "s" => {
                controller.save_session().await;
                println!("Session saved.");
            }
            "q" => {
                controller.clear_session().await;
                break;
            }
            "" => {}
            other => println!("Unknown command '{other}'"),
        }
    }

    Ok(())
}

fn print_current(session: &SwipeSession) {
    if let Some(image) = session.current_image() {
        println!();
        println!(
            "Image {}/{} - {}",
            session.cursor + 1,
            session.images.len(),
            image.uri
        );
        println!("  edit: {}", image.prompt);
        println!(
            "  liked so far: {} | remaining in buffer: {}",
            session.liked_count(),
            session.remaining()
        );
    }
}

async fn list_sessions() -> Result<()> {
    let repository = JsonSessionRepository::default_location()?;
    let history = repository
        .list_all()
        .await
        .context("failed to read session history")?;
    if history.is_empty() {
        println!("No saved sessions.");
        return Ok(());
    }
    for session in history {
        println!(
            "{}  {}  {}  {} images, {} liked",
            session.created_at.format("%Y-%m-%d %H:%M"),
            session.id,
            session.variation_kind,
            session.images.len(),
            session.liked_count()
        );
    }
    Ok(())
}
