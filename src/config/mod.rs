mod file_config;

pub use file_config::{FileConfig, JwtConfig, ModelsConfig, SpotifyConfig};

use crate::emotion::facial::FacialModelSettings;
use crate::emotion::DEFAULT_SPEECH_MAX_SECONDS;
use crate::emotion::text::TextModelSettings;
use crate::recommendation::SpotifySettings;
use crate::server::{RequestsLoggingLevel, ServerConfig};
use crate::user::jwt::{DEFAULT_ACCESS_TOKEN_TTL, DEFAULT_REFRESH_TOKEN_TTL};
use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const JWT_SECRET_ENV: &str = "MOODIFY_JWT_SECRET";
pub const SPOTIFY_CLIENT_ID_ENV: &str = "SPOTIFY_CLIENT_ID";
pub const SPOTIFY_CLIENT_SECRET_ENV: &str = "SPOTIFY_CLIENT_SECRET";
pub const TEXT_MODEL_API_TOKEN_ENV: &str = "TEXT_MODEL_API_TOKEN";

pub const USER_DB_FILE_NAME: &str = "moodify.db";
const DEFAULT_MAX_UPLOAD_MB: usize = 20;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub max_upload_mb: Option<usize>,
    pub jwt_secret: Option<String>,
    pub text_model_url: Option<String>,
    pub speech_model_path: Option<PathBuf>,
    pub facial_model_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub max_upload_bytes: usize,
    pub permissive_cors: bool,

    pub jwt: JwtSettings,
    /// None when no client credentials are configured.
    pub spotify: Option<SpotifySettings>,
    pub models: ModelsSettings,
}

#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct ModelsSettings {
    pub text: Option<TextModelSettings>,
    pub speech_model_path: Option<PathBuf>,
    pub speech_max_seconds: f64,
    pub facial_model_path: Option<PathBuf>,
    pub facial: FacialModelSettings,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present. Secrets missing from
    /// both are read from the environment.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        Self::resolve_with_env(cli, file_config, |key| std::env::var(key).ok())
    }

    pub fn resolve_with_env<F>(cli: &CliConfig, file_config: Option<FileConfig>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        // Validate db_dir exists
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = match file.logging_level {
            Some(s) => parse_logging_level(&s)
                .with_context(|| format!("Invalid logging_level in config file: {}", s))?,
            None => cli.logging_level.clone(),
        };

        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let max_upload_mb = file
            .max_upload_mb
            .or(cli.max_upload_mb)
            .unwrap_or(DEFAULT_MAX_UPLOAD_MB);
        if max_upload_mb == 0 {
            bail!("max_upload_mb must be greater than zero");
        }
        let permissive_cors = file.permissive_cors.unwrap_or(true);

        let jwt_file = file.jwt.unwrap_or_default();
        let secret = non_blank(jwt_file.secret)
            .or_else(|| non_blank(cli.jwt_secret.clone()))
            .or_else(|| non_blank(env(JWT_SECRET_ENV)))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "A JWT secret must be set via --jwt-secret, [jwt] secret or {}",
                    JWT_SECRET_ENV
                )
            })?;
        let jwt = JwtSettings {
            secret,
            access_token_ttl: jwt_file
                .access_token_lifetime_sec
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_ACCESS_TOKEN_TTL),
            refresh_token_ttl: jwt_file
                .refresh_token_lifetime_sec
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REFRESH_TOKEN_TTL),
        };
        if jwt.access_token_ttl.is_zero() || jwt.refresh_token_ttl.is_zero() {
            bail!("JWT lifetimes must be greater than zero");
        }

        let spotify = resolve_spotify(file.spotify.unwrap_or_default(), &env);
        let models = resolve_models(cli, file.models.unwrap_or_default(), &env)?;

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            frontend_dir_path,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            permissive_cors,
            jwt,
            spotify,
            models,
        })
    }

    pub fn user_db_path(&self) -> PathBuf {
        self.db_dir.join(USER_DB_FILE_NAME)
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            requests_logging_level: self.logging_level.clone(),
            port: self.port,
            metrics_port: self.metrics_port,
            frontend_dir_path: self.frontend_dir_path.clone(),
            max_upload_bytes: self.max_upload_bytes,
            permissive_cors: self.permissive_cors,
        }
    }
}

fn resolve_spotify<F>(file: SpotifyConfig, env: &F) -> Option<SpotifySettings>
where
    F: Fn(&str) -> Option<String>,
{
    let client_id = non_blank(file.client_id).or_else(|| non_blank(env(SPOTIFY_CLIENT_ID_ENV)))?;
    let client_secret =
        non_blank(file.client_secret).or_else(|| non_blank(env(SPOTIFY_CLIENT_SECRET_ENV)))?;

    let defaults = SpotifySettings::default();
    Some(SpotifySettings {
        client_id,
        client_secret,
        market: file.market.unwrap_or(defaults.market),
        limit: file.limit.unwrap_or(defaults.limit),
        accounts_url: file.accounts_url.unwrap_or(defaults.accounts_url),
        api_url: file
            .api_url
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_url),
        timeout_sec: file.timeout_sec.unwrap_or(defaults.timeout_sec),
    })
}

fn resolve_models<F>(cli: &CliConfig, file: ModelsConfig, env: &F) -> Result<ModelsSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let text = non_blank(file.text_model_url)
        .or_else(|| non_blank(cli.text_model_url.clone()))
        .map(|url| {
            let mut settings = TextModelSettings::new(url);
            settings.api_token =
                non_blank(file.text_model_api_token).or_else(|| non_blank(env(TEXT_MODEL_API_TOKEN_ENV)));
            if let Some(labels) = file.text_labels {
                settings.labels = labels;
            }
            if let Some(timeout_sec) = file.text_timeout_sec {
                settings.timeout_sec = timeout_sec;
            }
            settings
        });

    let speech_model_path = file
        .speech_model_path
        .map(PathBuf::from)
        .or_else(|| cli.speech_model_path.clone());
    let facial_model_path = file
        .facial_model_path
        .map(PathBuf::from)
        .or_else(|| cli.facial_model_path.clone());

    let speech_max_seconds = file.speech_max_seconds.unwrap_or(DEFAULT_SPEECH_MAX_SECONDS);
    if !speech_max_seconds.is_finite() || speech_max_seconds <= 0.0 {
        bail!("speech_max_seconds must be positive");
    }

    for path in speech_model_path.iter().chain(facial_model_path.iter()) {
        if !path.is_file() {
            bail!("Model file not found: {:?}", path);
        }
    }

    let mut facial = FacialModelSettings::default();
    if let Some(labels) = file.facial_labels {
        if labels.is_empty() {
            bail!("facial_labels cannot be empty");
        }
        facial.labels = labels;
    }
    if let Some(input_name) = file.facial_input_name {
        facial.input_name = input_name;
    }
    if let Some(layout) = file.facial_layout {
        facial.layout = layout.parse()?;
    }
    if let Some(min_confidence) = file.facial_min_confidence {
        facial.min_confidence = min_confidence;
    }

    Ok(ModelsSettings {
        text,
        speech_model_path,
        speech_max_seconds,
        facial_model_path,
        facial,
    })
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::facial::TensorLayout;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn make_temp_db_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn cli_with_dir(dir: &TempDir) -> CliConfig {
        CliConfig {
            db_dir: Some(dir.path().to_path_buf()),
            jwt_secret: Some("cli-secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("none"),
            Some(RequestsLoggingLevel::None)
        ));
        assert!(matches!(
            parse_logging_level("path"),
            Some(RequestsLoggingLevel::Path)
        ));
        assert!(matches!(
            parse_logging_level("headers"),
            Some(RequestsLoggingLevel::Headers)
        ));
        // Case insensitive
        assert!(matches!(
            parse_logging_level("BODY"),
            Some(RequestsLoggingLevel::Body)
        ));
        assert!(parse_logging_level("invalid").is_none());
    }

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            port: 3001,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::Headers,
            frontend_dir_path: Some("/frontend".to_string()),
            max_upload_mb: Some(2),
            jwt_secret: Some("cli-secret".to_string()),
            text_model_url: Some("http://localhost:8080".to_string()),
            ..Default::default()
        };

        let config = AppConfig::resolve_with_env(&cli, None, no_env).unwrap();

        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.port, 3001);
        assert_eq!(config.metrics_port, 9091);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Headers);
        assert_eq!(config.frontend_dir_path, Some("/frontend".to_string()));
        assert_eq!(config.max_upload_bytes, 2 * 1024 * 1024);
        assert_eq!(config.jwt.secret, "cli-secret");
        assert_eq!(config.jwt.access_token_ttl, DEFAULT_ACCESS_TOKEN_TTL);
        assert_eq!(config.jwt.refresh_token_ttl, DEFAULT_REFRESH_TOKEN_TTL);
        assert!(config.spotify.is_none());
        let text = config.models.text.unwrap();
        assert_eq!(text.url, "http://localhost:8080");
        assert!(text.api_token.is_none());
        assert!(config.models.speech_model_path.is_none());
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(PathBuf::from("/should/be/overridden")),
            port: 3001,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::Path,
            jwt_secret: Some("cli-secret".to_string()),
            ..Default::default()
        };

        let file_config = FileConfig {
            db_dir: Some(temp_dir.path().to_string_lossy().to_string()),
            port: Some(4000),
            logging_level: Some("body".to_string()),
            jwt: Some(JwtConfig {
                secret: Some("file-secret".to_string()),
                access_token_lifetime_sec: Some(60),
                refresh_token_lifetime_sec: None,
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve_with_env(&cli, Some(file_config), no_env).unwrap();

        // TOML values should override CLI
        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.port, 4000);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Body);
        assert_eq!(config.jwt.secret, "file-secret");
        assert_eq!(config.jwt.access_token_ttl, Duration::from_secs(60));
        // CLI value used when TOML doesn't specify
        assert_eq!(config.metrics_port, 9091);
        assert_eq!(config.jwt.refresh_token_ttl, DEFAULT_REFRESH_TOKEN_TTL);
    }

    #[test]
    fn test_resolve_secrets_from_env() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        let file_config = FileConfig {
            models: Some(ModelsConfig {
                text_model_url: Some("http://classifier".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let env: HashMap<&str, &str> = HashMap::from([
            (JWT_SECRET_ENV, "env-secret"),
            (SPOTIFY_CLIENT_ID_ENV, "env-id"),
            (SPOTIFY_CLIENT_SECRET_ENV, "env-client-secret"),
            (TEXT_MODEL_API_TOKEN_ENV, "hf_token"),
        ]);

        let config = AppConfig::resolve_with_env(&cli, Some(file_config), |key| {
            env.get(key).map(|v| v.to_string())
        })
        .unwrap();

        assert_eq!(config.jwt.secret, "env-secret");
        let spotify = config.spotify.unwrap();
        assert_eq!(spotify.client_id, "env-id");
        assert_eq!(spotify.client_secret, "env-client-secret");
        assert_eq!(spotify.market, "US");
        assert_eq!(
            config.models.text.unwrap().api_token,
            Some("hf_token".to_string())
        );
    }

    #[test]
    fn test_resolve_missing_jwt_secret_error() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            jwt_secret: Some("  ".to_string()),
            ..Default::default()
        };
        let result = AppConfig::resolve_with_env(&cli, None, no_env);
        assert!(result.unwrap_err().to_string().contains("JWT secret"));
    }

    #[test]
    fn test_resolve_missing_db_dir_error() {
        let cli = CliConfig::default();
        let result = AppConfig::resolve_with_env(&cli, None, no_env);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("db_dir must be specified"));
    }

    #[test]
    fn test_resolve_nonexistent_db_dir_error() {
        let cli = CliConfig {
            db_dir: Some(PathBuf::from("/nonexistent/path/that/should/not/exist")),
            jwt_secret: Some("secret".to_string()),
            ..Default::default()
        };
        let result = AppConfig::resolve_with_env(&cli, None, no_env);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn test_resolve_db_dir_not_directory_error() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(temp_file.path().to_path_buf()),
            jwt_secret: Some("secret".to_string()),
            ..Default::default()
        };
        let result = AppConfig::resolve_with_env(&cli, None, no_env);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not a directory"));
    }

    #[test]
    fn test_resolve_invalid_logging_level_error() {
        let temp_dir = make_temp_db_dir();
        let file_config = FileConfig {
            logging_level: Some("verbose".to_string()),
            ..Default::default()
        };
        let result = AppConfig::resolve_with_env(&cli_with_dir(&temp_dir), Some(file_config), no_env);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_spotify_requires_both_credentials() {
        let temp_dir = make_temp_db_dir();
        let file_config = FileConfig {
            spotify: Some(SpotifyConfig {
                client_id: Some("id".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config =
            AppConfig::resolve_with_env(&cli_with_dir(&temp_dir), Some(file_config), no_env).unwrap();
        assert!(config.spotify.is_none());
    }

    #[test]
    fn test_resolve_facial_model_settings() {
        let temp_dir = make_temp_db_dir();
        let model_path = temp_dir.path().join("face.onnx");
        std::fs::write(&model_path, b"onnx").unwrap();
        let file_config = FileConfig {
            models: Some(ModelsConfig {
                facial_model_path: Some(model_path.to_string_lossy().to_string()),
                facial_labels: Some(vec!["happy".to_string(), "sad".to_string()]),
                facial_layout: Some("NHWC".to_string()),
                facial_min_confidence: Some(0.4),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config =
            AppConfig::resolve_with_env(&cli_with_dir(&temp_dir), Some(file_config), no_env).unwrap();
        assert_eq!(config.models.facial_model_path, Some(model_path));
        assert_eq!(config.models.facial.labels, vec!["happy", "sad"]);
        assert_eq!(config.models.facial.layout, TensorLayout::Nhwc);
        assert_eq!(config.models.facial.min_confidence, 0.4);
        assert_eq!(config.models.facial.input_name, "input");
    }

    #[test]
    fn test_resolve_speech_max_seconds() {
        let temp_dir = make_temp_db_dir();
        let config = AppConfig::resolve_with_env(&cli_with_dir(&temp_dir), None, no_env).unwrap();
        assert_eq!(config.models.speech_max_seconds, DEFAULT_SPEECH_MAX_SECONDS);

        let file_config = |seconds: f64| FileConfig {
            models: Some(ModelsConfig {
                speech_max_seconds: Some(seconds),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config =
            AppConfig::resolve_with_env(&cli_with_dir(&temp_dir), Some(file_config(12.0)), no_env)
                .unwrap();
        assert_eq!(config.models.speech_max_seconds, 12.0);

        let result =
            AppConfig::resolve_with_env(&cli_with_dir(&temp_dir), Some(file_config(0.0)), no_env);
        assert!(result.unwrap_err().to_string().contains("speech_max_seconds"));
    }

    #[test]
    fn test_resolve_missing_model_file_error() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            speech_model_path: Some(temp_dir.path().join("missing.json")),
            ..cli_with_dir(&temp_dir)
        };
        let result = AppConfig::resolve_with_env(&cli, None, no_env);
        assert!(result.unwrap_err().to_string().contains("Model file not found"));
    }

    #[test]
    fn test_db_path_and_server_config() {
        let temp_dir = make_temp_db_dir();
        let config = AppConfig::resolve_with_env(&cli_with_dir(&temp_dir), None, no_env).unwrap();

        assert_eq!(config.user_db_path(), temp_dir.path().join("moodify.db"));
        let server_config = config.server_config();
        assert_eq!(server_config.max_upload_bytes, 20 * 1024 * 1024);
        assert!(server_config.permissive_cors);
    }
}
