use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, fmt, path::PathBuf};
use url::Url;

const DEFAULT_LISTEN: &str = ":8080";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen: ListenAddr,
    pub root_dir: Option<PathBuf>,
    pub store: StoreConfig,
}

/// Connection settings for the backing object store.
#[derive(Clone, Default)]
pub struct StoreConfig {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Where the HTTP listener binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    Tcp(String),
    Unix(PathBuf),
}

impl ListenAddr {
    /// Addresses starting with `/` select a Unix socket, anything else is TCP.
    /// A bare `:port` binds every interface.
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with('/') {
            return ListenAddr::Unix(PathBuf::from(raw));
        }
        if raw.starts_with(':') {
            return ListenAddr::Tcp(format!("0.0.0.0{}", raw));
        }
        ListenAddr::Tcp(raw.to_string())
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddr::Tcp(addr) => write!(f, "http://{}", addr),
            ListenAddr::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "HTTP upload gateway backed by an S3-compatible store")]
pub struct Args {
    /// Address to listen to, `/path` for a Unix socket (overrides PUT_LISTEN, default :8080)
    #[arg(long)]
    pub listen: Option<String>,

    /// Directory served for GET requests (overrides PUT_ROOT, default: embedded index page)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// S3 endpoint URL, e.g. https://s3.example.com (overrides PUT_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// S3 region used when creating the bucket (overrides PUT_S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// S3 bucket receiving uploads (overrides PUT_S3_BUCKET)
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// S3 access key (overrides PUT_S3_ACCESS_KEY)
    #[arg(long)]
    pub s3_access_key: Option<String>,

    /// S3 secret key (overrides PUT_S3_SECRET_KEY)
    #[arg(long)]
    pub s3_secret_key: Option<String>,
}

impl AppConfig {
    /// Parse CLI args and the process environment into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Args::parse(), |key| env::var(key).ok())
    }

    /// Merge CLI args over environment values over defaults.
    ///
    /// Empty values count as unset, so `--s3-region ""` still falls back to
    /// `PUT_S3_REGION`.
    pub fn resolve<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |flag: Option<String>, key: &str| {
            flag.filter(|v| !v.is_empty())
                .or_else(|| lookup(key).filter(|v| !v.is_empty()))
        };

        let listen = pick(args.listen, "PUT_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.into());
        let root_dir = args
            .root
            .filter(|p| !p.as_os_str().is_empty())
            .or_else(|| pick(None, "PUT_ROOT").map(PathBuf::from));

        let store = StoreConfig {
            endpoint: pick(args.s3_endpoint, "PUT_S3_ENDPOINT").unwrap_or_default(),
            region: pick(args.s3_region, "PUT_S3_REGION").unwrap_or_default(),
            bucket: pick(args.s3_bucket, "PUT_S3_BUCKET").unwrap_or_default(),
            access_key: pick(args.s3_access_key, "PUT_S3_ACCESS_KEY").unwrap_or_default(),
            secret_key: pick(args.s3_secret_key, "PUT_S3_SECRET_KEY").unwrap_or_default(),
        };
        store.validate()?;

        Ok(Self {
            listen: ListenAddr::parse(&listen),
            root_dir,
            store,
        })
    }
}

impl StoreConfig {
    /// Reject settings that can never produce a working client.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            bail!("missing S3 endpoint (--s3-endpoint or PUT_S3_ENDPOINT)");
        }
        let url = Url::parse(&self.endpoint)
            .with_context(|| format!("parsing S3 endpoint `{}`", self.endpoint))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            bail!(
                "S3 endpoint `{}` must be an http(s) URL with a host",
                self.endpoint
            );
        }
        if self.bucket.is_empty() {
            bail!("missing S3 bucket (--s3-bucket or PUT_S3_BUCKET)");
        }
        Ok(())
    }
}
