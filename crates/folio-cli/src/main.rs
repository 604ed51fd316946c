use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use folio::attachment::{Attachment, PreviewStore};
use folio::config::Config;
use folio::content::{self, Category};
use folio::logging::{init_tracing, SessionLog};
use folio::navigation::{Navigator, Section};
use folio::panels::{
    BioPanel, ImageEditPanel, StreamPanel, VideoAnalysisPanel, VideoGenerationPanel, VideoStatus,
};
use folio::state::{GenerationState, SubmitOutcome};
use folio::theme::{os_theme_hint, FilePreferences, Theme, ThemeStore};
use folio::{AiCapability, AspectRatio, GeminiClient};

#[derive(Parser)]
#[command(name = "folio", version, about = "Folio -- portfolio content and AI panels")]
struct Cli {
    /// Path to folio.toml (defaults to folio/folio.toml in the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate the About bio (falls back to the stock bio on failure)
    Bio {
        /// Prompt text (defaults to [prompts].bio)
        prompt: Option<String>,
    },
    /// Generate a short video clip
    Video {
        prompt: Option<String>,
        /// 16:9 or 9:16
        #[arg(short, long, default_value = "16:9")]
        aspect: AspectRatio,
        /// Download the finished clip to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// API key to select when none is configured
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Stream a low-latency text response as it arrives
    Stream { prompt: Option<String> },
    /// Ask questions about a local video file
    Analyze {
        file: PathBuf,
        prompt: Option<String>,
    },
    /// Edit a local image with a text instruction
    Edit {
        file: PathBuf,
        prompt: Option<String>,
        /// Where to write the edited image
        #[arg(short, long, default_value = "edited.png")]
        output: PathBuf,
    },
    /// Show or change the display theme
    Theme {
        #[command(subcommand)]
        action: Option<ThemeAction>,
    },
    /// List portfolio projects
    Projects {
        /// All, AI/ML, Cybersecurity, Web or Data
        #[arg(long, default_value = "All")]
        category: Category,
        #[arg(long)]
        json: bool,
    },
    /// List page sections
    Sections,
    /// Jump to a section by id
    Goto { id: String },
    /// Contact details and social links
    Contact,
}

#[derive(Subcommand)]
enum ThemeAction {
    Show,
    Toggle,
    Set { theme: Theme },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref());
    let _log_guard = init_tracing(&config.logging);

    match cli.command {
        Command::Bio { prompt } => {
            let prompt = prompt.unwrap_or_else(|| config.prompts.bio.clone());
            run_bio(&config, prompt).await
        }
        Command::Video { prompt, aspect, output, api_key } => {
            let prompt = prompt.unwrap_or_else(|| config.prompts.video.clone());
            run_video(&config, prompt, aspect, output, api_key).await
        }
        Command::Stream { prompt } => {
            let prompt = prompt.unwrap_or_else(|| config.prompts.stream.clone());
            run_stream(&config, prompt).await
        }
        Command::Analyze { file, prompt } => {
            let prompt = prompt.unwrap_or_else(|| config.prompts.analysis.clone());
            run_analyze(&config, file, prompt).await
        }
        Command::Edit { file, prompt, output } => {
            let prompt = prompt.unwrap_or_else(|| config.prompts.edit.clone());
            run_edit(&config, file, prompt, output).await
        }
        Command::Theme { action } => run_theme(&config, action.unwrap_or(ThemeAction::Show)),
        Command::Projects { category, json } => list_projects(category, json),
        Command::Sections => {
            for section in Section::ALL {
                println!("  #{:<18}{}", section.id(), section.label());
            }
            Ok(())
        }
        Command::Goto { id } => {
            let mut nav = Navigator::default();
            if let Some(section) = nav.select_link(&id) {
                println!("-> #{} ({})", section.id(), section.label());
            }
            Ok(())
        }
        Command::Contact => {
            show_contact();
            Ok(())
        }
    }
}

// --- Panel plumbing ---

fn capability(config: &Config) -> Result<Arc<GeminiClient>> {
    Ok(Arc::new(GeminiClient::new(&config.api)?))
}

async fn settle(outcome: SubmitOutcome) -> Result<()> {
    match outcome {
        SubmitOutcome::Rejected(message) => bail!(message),
        SubmitOutcome::Busy => bail!("A request is already running"),
        started => {
            started.wait().await;
            Ok(())
        }
    }
}

fn into_result<T>(state: GenerationState<T>) -> Result<T> {
    match state {
        GenerationState::Success(value) => Ok(value),
        GenerationState::Error(message) => bail!(message),
        GenerationState::Idle | GenerationState::Loading => {
            bail!("Request ended without a result")
        }
    }
}

fn log_exchange(session: Option<&SessionLog>, panel: &str, prompt: &str, result: &str) {
    if let Some(log) = session {
        log.log_exchange(panel, prompt, result);
    }
}

// --- AI commands ---

async fn run_bio(config: &Config, prompt: String) -> Result<()> {
    let session = SessionLog::create(&config.logging, "bio");
    let client: Arc<dyn AiCapability> = capability(config)?;
    let panel = BioPanel::new(client, prompt.as_str());

    settle(panel.submit()).await?;
    let text = panel.text();
    match panel.state().error() {
        Some(error) => eprintln!("{error}"),
        None => log_exchange(session.as_ref(), "bio", &prompt, &text),
    }
    println!("{text}");
    Ok(())
}

async fn run_video(
    config: &Config,
    prompt: String,
    aspect: AspectRatio,
    output: Option<PathBuf>,
    api_key: Option<String>,
) -> Result<()> {
    let session = SessionLog::create(&config.logging, "video");
    let gemini = capability(config)?;
    let panel = VideoGenerationPanel::new(gemini.clone(), prompt.as_str());
    panel.set_aspect_ratio(aspect);

    panel.mount().await;
    if let VideoStatus::NeedsCredential { reason } = panel.status() {
        eprintln!("{reason}");
        let key = match api_key {
            Some(key) => key,
            None => read_api_key()?,
        };
        panel.select_credential(key).await?;
    }

    eprintln!("Generating {aspect} video. This can take a few minutes...");
    settle(panel.submit()).await?;

    let handle = match panel.status() {
        VideoStatus::NeedsCredential { reason } => {
            bail!("{reason} Pass a valid key with --api-key.")
        }
        VideoStatus::Generation(state) => into_result(state)?,
    };
    println!("Video ready: {}", handle.uri);
    log_exchange(session.as_ref(), "video", &prompt, &handle.uri);

    if let Some(path) = output {
        let bytes = gemini.download_video(&handle).await?;
        std::fs::write(&path, &bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Saved {} bytes to {}", bytes.len(), path.display());
        println!("Saved to {}", path.display());
    }
    Ok(())
}

fn read_api_key() -> Result<String> {
    eprint!("Enter a Gemini API key: ");
    std::io::stderr().flush().ok();
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read API key from stdin")?;
    let key = line.trim().to_string();
    if key.is_empty() {
        bail!("No API key entered");
    }
    Ok(key)
}

async fn run_stream(config: &Config, prompt: String) -> Result<()> {
    let session = SessionLog::create(&config.logging, "stream");
    let client: Arc<dyn AiCapability> = capability(config)?;
    let panel = StreamPanel::new(client, prompt.as_str()).with_listener(Arc::new(|chunk: &str| {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(chunk.as_bytes());
        let _ = out.flush();
    }));

    settle(panel.submit()).await?;
    println!();

    let text = into_result(panel.state())?;
    log_exchange(session.as_ref(), "stream", &prompt, &text);
    Ok(())
}

async fn run_analyze(config: &Config, file: PathBuf, prompt: String) -> Result<()> {
    let video = Attachment::from_path(&file)?;
    let session = SessionLog::create(&config.logging, "analyze");
    let client: Arc<dyn AiCapability> = capability(config)?;
    let panel = VideoAnalysisPanel::new(client, PreviewStore::new(), prompt.as_str());

    panel.select_attachment(video)?;
    if let Some(description) = panel.preview_description() {
        eprintln!("Analyzing {description}");
    }
    settle(panel.submit()).await?;

    let analysis = into_result(panel.state())?;
    println!("{analysis}");
    log_exchange(session.as_ref(), "analyze", &prompt, &analysis);
    Ok(())
}

async fn run_edit(config: &Config, file: PathBuf, prompt: String, output: PathBuf) -> Result<()> {
    let image = Attachment::from_path(&file)?;
    let session = SessionLog::create(&config.logging, "edit");
    let client: Arc<dyn AiCapability> = capability(config)?;
    let panel = ImageEditPanel::new(client, PreviewStore::new(), prompt.as_str());

    panel.select_attachment(image)?;
    if let Some(description) = panel.preview_description() {
        eprintln!("Editing {description}");
    }
    settle(panel.submit()).await?;

    let edited = into_result(panel.state())?;
    std::fs::write(&output, &edited.data)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Saved {} ({}) to {}", file.display(), edited.mime_type, output.display());
    log_exchange(session.as_ref(), "edit", &prompt, &output.display().to_string());
    Ok(())
}

// --- Static commands ---

fn run_theme(config: &Config, action: ThemeAction) -> Result<()> {
    let file = config
        .preferences
        .file()
        .context("No config directory available for preferences; set [preferences].path")?;
    let mut store = ThemeStore::init(FilePreferences::new(file), os_theme_hint());

    let theme = match action {
        ThemeAction::Show => store.current(),
        ThemeAction::Toggle => store.toggle()?,
        ThemeAction::Set { theme } => store.set(theme)?,
    };
    println!("{theme}");
    Ok(())
}

#[derive(Serialize)]
struct ProjectListing {
    category: Category,
    projects: Vec<&'static content::Project>,
}

fn list_projects(category: Category, json: bool) -> Result<()> {
    let projects = content::filter_projects(category);
    if json {
        let listing = ProjectListing { category, projects };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if projects.is_empty() {
        println!("No projects in {category}.");
        return Ok(());
    }
    for project in projects {
        let categories: Vec<&str> = project.categories.iter().map(|c| c.label()).collect();
        println!("{}. {} [{}]", project.id, project.title, categories.join(", "));
        println!("   {}", project.description);
        println!("   tags: {}", project.tags.join(", "));
        if let Some(url) = project.live_url {
            println!("   live: {url}");
        }
        if let Some(url) = project.github_url {
            println!("   code: {url}");
        }
    }
    Ok(())
}

fn show_contact() {
    println!("{}", content::OWNER_NAME);
    println!("  email:  {}", content::CONTACT_EMAIL);
    println!("  mailto: {}", content::mailto_link());
    for link in content::SOCIAL_LINKS {
        println!("  {:<10}{}", link.name, link.url);
    }
}
