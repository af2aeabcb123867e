use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub storage_dir: String,
    /// URL prefix under which uploaded assets are served.
    pub public_url: String,
    /// Folder segment new asset keys are created in.
    pub asset_folder: String,
    /// Upper bound on a single remote delete call.
    pub delete_timeout: Duration,
    /// Per-file upload limit in bytes.
    pub max_upload_bytes: u64,
}

/// What the binary should do after loading configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Serve,
    Migrate,
    Reconcile,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Product catalog API with managed image assets")]
pub struct Args {
    /// Host to bind to (overrides CATALOG_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CATALOG_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides CATALOG_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory where uploaded images are stored (overrides CATALOG_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Public URL prefix for stored images (overrides CATALOG_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Folder new image keys are created in (overrides CATALOG_ASSET_FOLDER)
    #[arg(long)]
    pub asset_folder: Option<String>,

    /// Timeout for each remote image delete, in milliseconds (overrides CATALOG_DELETE_TIMEOUT_MS)
    #[arg(long)]
    pub delete_timeout_ms: Option<u64>,

    /// Maximum size of one uploaded image in bytes (overrides CATALOG_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<u64>,

    /// Run migrations and exit
    #[arg(long, conflicts_with = "reconcile")]
    pub migrate: bool,

    /// Retry recorded failed image deletions and exit
    #[arg(long)]
    pub reconcile: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, RunMode)> {
        Self::from_parts(Args::parse(), |name| env::var(name).ok())
    }

    /// Merge parsed args over values looked up through `lookup`, then defaults.
    pub fn from_parts(
        args: Args,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(Self, RunMode)> {
        let env_host = lookup("CATALOG_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port: u16 = parse_var(&lookup, "CATALOG_PORT", 5000)?;
        let env_db = lookup("CATALOG_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/meta/catalog.db".into());
        let env_storage = lookup("CATALOG_STORAGE_DIR").unwrap_or_else(|| "./data/assets".into());
        let env_public =
            lookup("CATALOG_PUBLIC_URL").unwrap_or_else(|| "http://localhost:5000/assets".into());
        let env_folder = lookup("CATALOG_ASSET_FOLDER").unwrap_or_else(|| "product_images".into());
        let env_timeout: u64 = parse_var(&lookup, "CATALOG_DELETE_TIMEOUT_MS", 5000)?;
        let env_max_upload: u64 = parse_var(&lookup, "CATALOG_MAX_UPLOAD_BYTES", 5 * 1024 * 1024)?;

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            public_url: args.public_url.unwrap_or(env_public),
            asset_folder: args.asset_folder.unwrap_or(env_folder),
            delete_timeout: Duration::from_millis(args.delete_timeout_ms.unwrap_or(env_timeout)),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
        };
        cfg.validate()?;

        let mode = if args.migrate {
            RunMode::Migrate
        } else if args.reconcile {
            RunMode::Reconcile
        } else {
            RunMode::Serve
        };
        Ok((cfg, mode))
    }

    /// Image keys are `{folder}/{name}`, and URLs only resolve back to them
    /// when the folder is exactly one path segment.
    fn validate(&self) -> Result<()> {
        let folder = &self.asset_folder;
        if folder.is_empty() || folder.contains(['/', '\\', '.', ',']) {
            bail!("asset folder `{folder}` must be a single path segment without dots or commas");
        }
        if self.delete_timeout.is_zero() {
            bail!("delete timeout must be greater than zero");
        }
        if self.max_upload_bytes == 0 {
            bail!("max upload bytes must be greater than zero");
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {name} value `{value}`")),
        None => Ok(default),
    }
}
