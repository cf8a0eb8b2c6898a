//! # Configuración del Servidor
//! src/config.rs
//!
//! La configuración se arma en tres capas:
//!
//! 1. Valores por defecto (`Config::default()`)
//! 2. Archivo TOML (por defecto `/etc/spsrv.conf`), cada clave es opcional
//! 3. Argumentos CLI o variables de entorno, que pisan lo anterior
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./spsrv -c ./spsrv.conf -h example.org -p 3000 -d ./public
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! SPSRV_PORT=3000 SPSRV_DIR=./public ./spsrv
//! ```
//!
//! ### Archivo
//! ```toml
//! Hostname = "example.org"
//! RootDir = "/var/spartan"
//! DirlistSort = "time"
//! CGIPaths = ["cgi/", "bin/"]
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgAction, Parser};
use log::{info, warn};
use serde::Deserialize;
use thiserror::Error;

/// Ruta por defecto del archivo de configuración
pub const DEFAULT_CONFIG_PATH: &str = "/etc/spsrv.conf";

/// Errores al cargar o validar la configuración
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Invalid(String),
}

/// Argumentos de línea de comandos
///
/// `-h` es el hostname, así que la ayuda queda en `-?`/`--help` y la
/// versión en `-v`/`--version`.
#[derive(Debug, Clone, Parser)]
#[command(name = "spsrv")]
#[command(about = "Servidor Spartan: archivos estáticos, directorios de usuario y CGI")]
#[command(version, disable_help_flag = true, disable_version_flag = true)]
pub struct Cli {
    /// Ruta del archivo de configuración
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_PATH, env = "SPSRV_CONFIG")]
    pub config: PathBuf,

    /// Hostname aceptado en los requests ("" acepta cualquiera)
    #[arg(short = 'h', long, env = "SPSRV_HOSTNAME")]
    pub hostname: Option<String>,

    /// Puerto en el que escucha el servidor
    #[arg(short = 'p', long, env = "SPSRV_PORT")]
    pub port: Option<u16>,

    /// Directorio raíz de contenido
    #[arg(short = 'd', long = "dir", env = "SPSRV_DIR")]
    pub root_dir: Option<PathBuf>,

    /// Muestra la ayuda
    #[arg(short = '?', long = "help", action = ArgAction::Help)]
    #[allow(dead_code)]
    help: Option<bool>,

    /// Muestra la versión
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,
}

/// Criterio de orden de los listados de directorio
///
/// Cualquier valor desconocido en el archivo se convierte en `Name` al
/// cargar la configuración.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum SortKey {
    #[default]
    Name,
    Time,
    Size,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Time => "time",
            SortKey::Size => "size",
        }
    }
}

impl From<String> for SortKey {
    fn from(value: String) -> Self {
        match value.as_str() {
            "name" => SortKey::Name,
            "time" => SortKey::Time,
            "size" => SortKey::Size,
            other => {
                warn!("DirlistSort {:?} is not one of name/time/size, defaulting to name", other);
                SortKey::Name
            }
        }
    }
}

/// Configuración del servidor Spartan
///
/// Se construye una vez al arrancar y después solo se lee.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Config {
    /// Puerto en el que escucha el servidor
    pub port: u16,

    /// Interfaz en la que escucha
    pub listen: String,

    /// Hostname esperado en la request line (vacío = sin restricción)
    pub hostname: String,

    /// Directorio raíz de contenido
    pub root_dir: PathBuf,

    /// Directorio que contiene los homes de usuario
    pub home_dir: PathBuf,

    // === Directorios de usuario ===

    /// Habilita `/~usuario/`
    pub user_dir_enable: bool,

    /// Subdirectorio publicado dentro del home de cada usuario
    pub user_dir: String,

    /// Habilita `usuario.hostname` como alias de `/~usuario/`
    pub user_subdomains: bool,

    /// Permite CGI dentro de los directorios de usuario
    #[serde(rename = "UserCGIEnable")]
    pub user_cgi_enable: bool,

    // === Listados ===

    /// Genera listados cuando un directorio no tiene index.gmi
    pub dirlist_enable: bool,

    pub dirlist_sort: SortKey,

    pub dirlist_reverse: bool,

    /// Usa el primer heading `# ` de los .gmi como etiqueta
    pub dirlist_titles: bool,

    // === CGI ===

    /// Prefijos (relativos, sin `/` inicial) que disparan CGI
    #[serde(rename = "CGIPaths")]
    pub cgi_paths: Vec<String>,

    /// Tiempo máximo de ejecución de un script, en segundos
    #[serde(rename = "CGITimeout")]
    pub cgi_timeout_secs: u64,
}

impl Config {
    /// Carga el archivo de configuración
    ///
    /// Si el archivo no existe se usan los valores por defecto.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("{} does not exist, using default configuration values", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Parsea la configuración desde un string TOML
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Carga archivo + overrides de la CLI y valida el resultado
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = Self::load(&cli.config)?;
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Aplica los valores que vinieron por CLI/entorno
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(hostname) = &cli.hostname {
            self.hostname = hostname.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(root_dir) = &cli.root_dir {
            self.root_dir = root_dir.clone();
        }
    }

    /// Obtiene la dirección completa para bind (listen:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use spsrv::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "0.0.0.0:300");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }

    /// Tiempo máximo de un script CGI
    pub fn cgi_timeout(&self) -> Duration {
        Duration::from_secs(self.cgi_timeout_secs)
    }

    /// Directorio publicado de un usuario: `<home>/<usuario>/<user_dir>`
    pub fn user_root(&self, user: &str) -> PathBuf {
        self.home_dir.join(user).join(&self.user_dir)
    }

    /// Valida la configuración
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cgi_timeout_secs == 0 {
            return Err(ConfigError::Invalid("CGI timeout must be > 0".to_string()));
        }

        if self.user_dir_enable && self.user_dir.is_empty() {
            return Err(ConfigError::Invalid(
                "UserDir must not be empty when user directories are enabled".to_string(),
            ));
        }

        for prefix in &self.cgi_paths {
            if prefix.is_empty() || prefix.starts_with('/') || prefix.contains("..") {
                return Err(ConfigError::Invalid(format!(
                    "CGI path {:?} must be relative to the root directory",
                    prefix
                )));
            }
        }

        Ok(())
    }

    /// Registra un resumen de la configuración efectiva
    pub fn log_summary(&self) {
        info!("Address:        {}", self.address());
        if self.hostname.is_empty() {
            info!("Hostname:       (any)");
        } else {
            info!("Hostname:       {}", self.hostname);
        }
        info!("Root dir:       {}", self.root_dir.display());

        if self.user_dir_enable {
            info!(
                "User dirs:      {}/<user>/{} (subdomains: {}, CGI: {})",
                self.home_dir.display(),
                self.user_dir,
                self.user_subdomains,
                self.user_cgi_enable
            );
        } else {
            info!("User dirs:      disabled");
        }

        if self.dirlist_enable {
            info!(
                "Dir listings:   sort={} reverse={} titles={}",
                self.dirlist_sort.as_str(),
                self.dirlist_reverse,
                self.dirlist_titles
            );
        } else {
            info!("Dir listings:   disabled");
        }

        info!(
            "CGI paths:      {:?} (timeout {} s)",
            self.cgi_paths, self.cgi_timeout_secs
        );
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            port: 300,
            listen: "0.0.0.0".to_string(),
            hostname: "localhost".to_string(),
            root_dir: PathBuf::from("/var/spartan/"),
            home_dir: PathBuf::from("/home"),
            user_dir_enable: false,
            user_dir: "public_spartan".to_string(),
            user_subdomains: false,
            user_cgi_enable: false,
            dirlist_enable: true,
            dirlist_sort: SortKey::Name,
            dirlist_reverse: false,
            dirlist_titles: true,
            cgi_paths: vec!["cgi/".to_string()],
            cgi_timeout_secs: 10,
        }
    }
}
