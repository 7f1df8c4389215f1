//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`UBCAR_ROOT_FOLDER`, then `UBCAR_ROOT`)
//! 3. TOML config file (`~/.config/ubcar/<module>.toml`, then `/etc/ubcar/<module>.toml`)
//! 4. OS-dependent compiled default (fallback)
//!
//! Missing or malformed TOML never aborts startup: a warning is logged and the
//! next source in the chain is used. Runtime settings live in the database
//! `settings` table (see [`crate::db::settings`]).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Primary environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "UBCAR_ROOT_FOLDER";

/// Secondary (short) environment variable naming the root folder
pub const ROOT_ENV: &str = "UBCAR_ROOT";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "ubcar.db";

/// Upload directory name inside the root folder
pub const UPLOADS_DIR_NAME: &str = "uploads";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database and uploads
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP listen port
    #[serde(default)]
    pub port: Option<u16>,

    /// Absolute base URL the redirect page may send users to
    /// (relative targets are always allowed)
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Compiled defaults used when no other source provides a value
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub port: u16,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    /// Defaults for the platform this binary was compiled for
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            port: 5730,
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/ubcar (or /var/lib/ubcar for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("ubcar"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/ubcar"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/ubcar
        dirs::data_dir()
            .map(|d| d.join("ubcar"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/ubcar"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\ubcar
        dirs::data_local_dir()
            .map(|d| d.join("ubcar"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\ubcar"))
    } else {
        PathBuf::from("./ubcar_data")
    }
}

/// Resolves the root folder for one module using the priority chain above
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
        }
    }

    /// Attach the command-line override (highest priority)
    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    /// Resolve the root folder. Never fails; falls back to compiled defaults.
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!("Root folder from command line: {}", path.display());
            return path.clone();
        }

        for var in [ROOT_FOLDER_ENV, ROOT_ENV] {
            if let Ok(path) = std::env::var(var) {
                if !path.is_empty() {
                    debug!("Root folder from {}: {}", var, path);
                    return PathBuf::from(path);
                }
            }
        }

        if let Some(root) = self.load_toml().and_then(|c| c.root_folder) {
            debug!("Root folder from TOML: {}", root.display());
            return root;
        }

        CompiledDefaults::for_current_platform().root_folder
    }

    /// Load this module's TOML config, if one exists and parses
    pub fn load_toml(&self) -> Option<TomlConfig> {
        let path = self.config_file_path()?;
        match load_toml_file(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// First existing config file for this module
    fn config_file_path(&self) -> Option<PathBuf> {
        let file_name = format!("{}.toml", self.module_name);
        let user_config = dirs::config_dir().map(|d| d.join("ubcar").join(&file_name));
        let system_config = PathBuf::from("/etc/ubcar").join(&file_name);

        user_config
            .into_iter()
            .chain(std::iter::once(system_config))
            .find(|p| p.exists())
    }
}

/// Parse a TOML config file
pub fn load_toml_file(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

/// Creates the root folder layout and locates files within it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Path of the SQLite database file
    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    /// Directory for uploaded files and thumbnails
    pub fn uploads_path(&self) -> PathBuf {
        self.root_folder.join(UPLOADS_DIR_NAME)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    /// Create the root folder and uploads directory (idempotent)
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        std::fs::create_dir_all(self.uploads_path())?;
        Ok(())
    }
}
