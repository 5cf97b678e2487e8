//! Fixed constants, runtime configuration and command line arguments

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

/// How often usage is polled once the organization is known
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(30);
/// Timeout for plain reads (organizations, usage, conversation creation)
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for the streamed completion sent on a reset
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_BASE_URL: &str = "https://claude.ai/api";
pub const COOKIE_DOMAIN: &str = ".claude.ai";
pub const COOKIE_ENV_VAR: &str = "CLAUDE_COOKIE";
pub const NOTIFY_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Kernel keyutils entries do not outlive the login session
pub const LINUX_KEYRING_NOTE: &str = "On Linux the OS keychain is the kernel keyring, \
                                      which is cleared at logout or reboot; \
                                      use --file for a store that persists";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Where session cookies are loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// Environment variable, then keychain, then encrypted file
    Auto,
    Env,
    Keyring,
    File,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// API root, e.g. `https://claude.ai/api`
    pub base_url: String,
    pub cookie_domain: String,
    pub refresh_interval: Duration,
    pub read_timeout: Duration,
    pub notify_timeout: Duration,
    pub user_agent: String,
    pub notify_model: String,
    pub source: SourceKind,
    pub cookie_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cookie_domain: COOKIE_DOMAIN.to_string(),
            refresh_interval: REFRESH_INTERVAL,
            read_timeout: READ_TIMEOUT,
            notify_timeout: NOTIFY_TIMEOUT,
            user_agent: USER_AGENT.to_string(),
            notify_model: NOTIFY_MODEL.to_string(),
            source: SourceKind::Auto,
            cookie_file: default_cookie_file(),
        }
    }
}

impl Config {
    /// Site origin derived from the API root, used for Origin/Referer headers
    pub fn origin(&self) -> &str {
        self.base_url
            .strip_suffix("/api")
            .unwrap_or(&self.base_url)
            .trim_end_matches('/')
    }

    /// Apply the overrides given on the command line
    pub fn merge_cli(&mut self, cli: &Cli) {
        if let Some(url) = &cli.base_url {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        self.source = cli.source;
        if let Some(path) = &cli.cookie_file {
            self.cookie_file = path.clone();
        }
    }
}

/// Default location of the encrypted cookie file
pub fn default_cookie_file() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("usage-watcher")
        .join("cookies.enc")
}

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Live claude.ai usage-limit watcher")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Override the API root
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Where to load session cookies from
    #[arg(long, value_enum, default_value_t = SourceKind::Auto, global = true)]
    pub source: SourceKind,

    /// Encrypted cookie file path
    #[arg(long, global = true)]
    pub cookie_file: Option<PathBuf>,

    /// Subcommand (defaults to `watch`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Poll continuously and print each update
    Watch {
        /// Start in compact mode
        #[arg(short, long)]
        compact: bool,
    },
    /// Fetch once, print the result and exit
    Once {
        /// Print the view model as JSON
        #[arg(long)]
        json: bool,
    },
    /// Store a Cookie header for claude.ai
    ///
    /// Cookies go to the OS keychain unless --file is given. On Linux that
    /// keychain is the kernel keyring, which is cleared at logout or reboot;
    /// use --file there for a store that persists.
    Import {
        /// Raw `Cookie:` header value, e.g. "sessionKey=...; cf_clearance=..."
        #[arg(long)]
        cookie: String,
        /// Store in the encrypted file instead of the OS keychain
        #[arg(long)]
        file: bool,
    },
    /// Delete stored cookies from the keychain and the encrypted file
    Forget,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
