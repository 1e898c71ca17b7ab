use anyhow::{Context, Result};
use clap::Parser;
use std::sync::{Arc, Mutex};
use std::{fmt::Debug, path::PathBuf};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import modules from the library crate
use moodify_server::config::{self, AppConfig, ModelsSettings};
use moodify_server::emotion::{
    text::RemoteTextClassifier, EmotionService, FacialEmotionModel, OnnxFacialModel,
    SpeechEmotionModel, SvmSpeechModel, TextEmotionModel,
};
use moodify_server::recommendation::{MusicRecommender, NoRecommender, SpotifyClient};
use moodify_server::server::{metrics, run_server, RequestsLoggingLevel};
use moodify_server::user::{JwtIssuer, SqliteUserStore, UserManager};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory containing the moodify.db database file.
    /// Can also be specified in config file.
    #[clap(long, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Maximum size of uploaded audio and image files, in MiB.
    #[clap(long)]
    pub max_upload_mb: Option<usize>,

    /// Secret used to sign JWTs. Prefer the MOODIFY_JWT_SECRET variable.
    #[clap(long)]
    pub jwt_secret: Option<String>,

    /// Inference endpoint of the text emotion classifier.
    #[clap(long)]
    pub text_model_url: Option<String>,

    /// JSON export of the speech emotion classifier.
    #[clap(long, value_parser = parse_path)]
    pub speech_model_path: Option<PathBuf>,

    /// ONNX facial emotion classifier.
    #[clap(long, value_parser = parse_path)]
    pub facial_model_path: Option<PathBuf>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            frontend_dir_path: args.frontend_dir_path.clone(),
            max_upload_mb: args.max_upload_mb,
            jwt_secret: args.jwt_secret.clone(),
            text_model_url: args.text_model_url.clone(),
            speech_model_path: args.speech_model_path.clone(),
            facial_model_path: args.facial_model_path.clone(),
        }
    }
}

fn build_emotion_service(models: &ModelsSettings) -> Result<EmotionService> {
    let text: Option<Arc<dyn TextEmotionModel>> = match &models.text {
        Some(settings) => {
            info!("Text emotion classifier at {}", settings.url);
            Some(Arc::new(RemoteTextClassifier::new(settings.clone())?))
        }
        None => {
            warn!("No text emotion model configured, text detection is disabled");
            None
        }
    };

    let speech: Option<Arc<dyn SpeechEmotionModel>> = match &models.speech_model_path {
        Some(path) => {
            info!("Loading speech emotion model from {:?}", path);
            Some(Arc::new(SvmSpeechModel::load(path)?))
        }
        None => {
            warn!("No speech emotion model configured, speech detection will guess");
            None
        }
    };

    let facial: Option<Arc<dyn FacialEmotionModel>> = match &models.facial_model_path {
        Some(path) => {
            info!("Loading facial emotion model from {:?}", path);
            Some(Arc::new(OnnxFacialModel::load(
                path,
                models.facial.clone(),
            )?))
        }
        None => {
            warn!("No facial emotion model configured, facial detection will guess");
            None
        }
    };

    Ok(EmotionService::new(text, speech, facial)
        .with_speech_max_seconds(models.speech_max_seconds))
}

fn build_recommender(app_config: &AppConfig) -> Arc<dyn MusicRecommender> {
    let Some(settings) = app_config.spotify.clone() else {
        warn!("Spotify credentials not configured, recommendations are disabled");
        return Arc::new(NoRecommender);
    };
    match SpotifyClient::new(settings) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            warn!("Could not create Spotify client: {}", err);
            Arc::new(NoRecommender)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!("  port: {}", app_config.port);
    info!("  max upload: {} bytes", app_config.max_upload_bytes);

    // Initialize metrics system
    info!("Initializing metrics...");
    metrics::init_metrics();

    // Create user store (will create DB if not exists)
    if !app_config.user_db_path().exists() {
        info!(
            "Creating new user database at {:?}",
            app_config.user_db_path()
        );
    }
    let user_store = SqliteUserStore::new(app_config.user_db_path())?;
    let user_manager = Arc::new(Mutex::new(UserManager::new(Box::new(user_store))));

    let jwt = Arc::new(JwtIssuer::new(
        &app_config.jwt.secret,
        app_config.jwt.access_token_ttl,
        app_config.jwt.refresh_token_ttl,
    ));

    let emotion = build_emotion_service(&app_config.models)?;
    let recommender = build_recommender(&app_config);

    info!("Ready to serve at port {}!", app_config.port);
    info!("Metrics available at port {}!", app_config.metrics_port);
    run_server(
        app_config.server_config(),
        user_manager,
        jwt,
        emotion,
        recommender,
    )
    .await
}
