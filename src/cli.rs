use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll the document store forever (or `--max-ticks` times).
    Run(RunArgs),
    /// Process one batch of pending records and print the report as JSON.
    Once(ServiceArgs),
    /// Resolve metadata and cover URL for one ISBN without touching the store.
    Lookup(LookupArgs),
    /// Compose a banner from a local cover image.
    Banner(BannerArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// Write objects below `--storage-dir`.
    Local,
    /// PUT objects to `--storage-endpoint`.
    HttpPut,
}

#[derive(Debug, Args)]
pub struct ProviderArgs {
    /// Google Books API key (optional; unauthenticated requests are rate limited).
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: Option<String>,

    #[arg(long, env = "GOOGLE_BOOKS_BASE_URL", default_value = crate::metadata::google_books::DEFAULT_BASE_URL)]
    pub google_books_base_url: String,

    #[arg(long, env = "OPEN_LIBRARY_BASE_URL", default_value = crate::metadata::open_library::DEFAULT_BASE_URL)]
    pub open_library_base_url: String,

    #[arg(long, env = "OPEN_LIBRARY_COVERS_BASE_URL", default_value = crate::metadata::open_library::DEFAULT_COVERS_BASE_URL)]
    pub open_library_covers_base_url: String,

    /// Image fetched when no cover source produces a usable URL.
    #[arg(long, env = "PLACEHOLDER_COVER_URL", default_value = crate::cover::PLACEHOLDER_COVER_URL)]
    pub placeholder_cover_url: String,

    /// Per-request timeout for every outbound HTTP call.
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 10)]
    pub http_timeout_secs: u64,
}

#[derive(Debug, Args)]
pub struct ServiceArgs {
    #[command(flatten)]
    pub providers: ProviderArgs,

    #[arg(long, env = "NOTION_TOKEN", hide_env_values = true)]
    pub notion_token: Option<String>,

    #[arg(long, env = "NOTION_DATABASE_ID")]
    pub notion_database_id: Option<String>,

    #[arg(long, env = "NOTION_BASE_URL", default_value = crate::store::NOTION_BASE_URL)]
    pub notion_base_url: String,

    /// Title substring that marks a record as pending.
    #[arg(long, env = "PENDING_MARKER", default_value = "New Book")]
    pub marker: String,

    #[arg(long, env = "STORAGE_BACKEND", value_enum, default_value_t = StorageBackend::Local)]
    pub storage: StorageBackend,

    /// Root directory for `--storage local`.
    #[arg(long, env = "STORAGE_DIR")]
    pub storage_dir: Option<String>,

    /// Bucket endpoint for `--storage http-put`.
    #[arg(long, env = "STORAGE_ENDPOINT")]
    pub storage_endpoint: Option<String>,

    /// Authorization header value sent with every PUT.
    #[arg(long, env = "STORAGE_AUTH_HEADER", hide_env_values = true)]
    pub storage_auth_header: Option<String>,

    /// Public URL prefix under which stored objects are reachable.
    #[arg(long, env = "PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    /// Push notifications through Pushover (`yes` / `no`).
    #[arg(
        long,
        env = "USE_PUSHOVER",
        default_value = "no",
        value_parser = BoolishValueParser::new(),
        action = ArgAction::Set
    )]
    pub use_pushover: bool,

    #[arg(long, env = "PO_TOKEN", hide_env_values = true)]
    pub pushover_token: Option<String>,

    #[arg(long, env = "PO_USER", hide_env_values = true)]
    pub pushover_user: Option<String>,

    #[arg(long, env = "PUSHOVER_BASE_URL", default_value = crate::notify::PUSHOVER_BASE_URL)]
    pub pushover_base_url: String,

    /// Directory for transient cover downloads (default: system temp dir).
    #[arg(long, env = "SCRATCH_DIR")]
    pub scratch_dir: Option<String>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub service: ServiceArgs,

    /// Seconds between the start of consecutive ticks.
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 60)]
    pub interval_secs: u64,

    /// Stop after this many ticks.
    #[arg(long)]
    pub max_ticks: Option<u64>,
}

#[derive(Debug, Args)]
pub struct LookupArgs {
    /// ISBN-10 or ISBN-13, passed to providers as-is.
    #[arg(long)]
    pub isbn: String,

    #[command(flatten)]
    pub providers: ProviderArgs,
}

#[derive(Debug, Args)]
pub struct BannerArgs {
    /// Cover image to compose from.
    #[arg(long)]
    pub input: String,

    /// Output path for the banner JPEG.
    #[arg(long)]
    pub out: String,
}
