use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use clap::Parser;
use serde::Deserialize;

/// pita - cascading property store over HTTP
#[derive(Parser, Debug, Default)]
#[command(name = "pita")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// YAML configuration file; command-line values override it
    #[arg(short, long, env = "PITA_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "PITA_HOST")]
    pub host: Option<String>,

    #[arg(short, long, env = "PITA_PORT")]
    pub port: Option<u16>,

    /// Root directory of the property tree
    #[arg(long, env = "PITA_DATABASE_DIRECTORY")]
    pub database_directory: Option<PathBuf>,

    /// Directory holding persisted views
    #[arg(long, env = "PITA_VIEW_DIRECTORY")]
    pub view_directory: Option<PathBuf>,

    /// Callback table mapping changed files to actions
    #[arg(long, env = "PITA_CALLBACK_FILE")]
    pub callback_file: Option<PathBuf>,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, env = "PITA_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Append logs to this file instead of stderr
    #[arg(long, env = "PITA_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Prefix for URLs in listings, e.g. http://pita.example.com
    #[arg(long, env = "PITA_BASE_URL")]
    pub base_url: Option<String>,

    /// Upper bound for a single callback command or request
    #[arg(long, env = "PITA_ACTION_TIMEOUT_SECS")]
    pub action_timeout_secs: Option<u64>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Can not read configuration {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("Can not parse configuration {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_directory: PathBuf,
    pub view_directory: PathBuf,
    pub callback_file: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub base_url: String,
    pub action_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4567,
            database_directory: PathBuf::from("db"),
            view_directory: PathBuf::from("views"),
            callback_file: PathBuf::from("callbacks.yaml"),
            log_level: "info".to_string(),
            log_file: None,
            base_url: String::new(),
            action_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Defaults, then the config file (if any), then command-line/environment values.
    pub fn load(args: &Args) -> Result<Config, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply(args);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if contents.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply(&mut self, args: &Args) {
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(dir) = &args.database_directory {
            self.database_directory = dir.clone();
        }
        if let Some(dir) = &args.view_directory {
            self.view_directory = dir.clone();
        }
        if let Some(file) = &args.callback_file {
            self.callback_file = file.clone();
        }
        if let Some(level) = &args.log_level {
            self.log_level = level.clone();
        }
        if let Some(file) = &args.log_file {
            self.log_file = Some(file.clone());
        }
        if let Some(url) = &args.base_url {
            self.base_url = url.clone();
        }
        if let Some(secs) = args.action_timeout_secs {
            self.action_timeout_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut validation_errors = Vec::new();

        match fs::metadata(&self.database_directory) {
            Ok(meta) if !meta.is_dir() => validation_errors.push(format!(
                "database_directory `{}` exists but is not a directory",
                self.database_directory.display()
            )),
            Ok(_) => {}
            Err(_) => validation_errors.push(format!(
                "database_directory `{}` does not exist",
                self.database_directory.display()
            )),
        }

        if self.action_timeout_secs == 0 {
            validation_errors.push("action_timeout_secs must be greater than 0".to_string());
        }

        if validation_errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(validation_errors.join("\n")))
        }
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_are_overridden_by_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("db");
        fs::create_dir(&db).unwrap();
        let file = dir.path().join("config.yaml");
        fs::write(
            &file,
            format!(
                "database_directory: {}\nport: 8080\nlog_level: debug\n",
                db.display()
            ),
        )
        .unwrap();

        let args = Args {
            config: Some(file),
            port: Some(9090),
            ..Args::default()
        };
        let config = Config::load(&args).unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.database_directory, db);
        assert_eq!(config.view_directory, PathBuf::from("views"));
    }

    #[test]
    fn missing_database_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args {
            database_directory: Some(dir.path().join("nope")),
            ..Args::default()
        };
        assert!(matches!(Config::load(&args), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unknown_file_is_a_read_error() {
        let args = Args {
            config: Some(PathBuf::from("/definitely/not/here.yaml")),
            ..Args::default()
        };
        assert!(matches!(Config::load(&args), Err(ConfigError::Read { .. })));
    }

    #[test]
    fn args_parse_from_the_command_line() {
        let args = Args::parse_from([
            "pita",
            "--database-directory",
            "/srv/db",
            "--action-timeout-secs",
            "5",
        ]);
        assert_eq!(args.database_directory, Some(PathBuf::from("/srv/db")));
        assert_eq!(args.action_timeout_secs, Some(5));
    }
}
