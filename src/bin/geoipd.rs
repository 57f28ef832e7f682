mod cli_utils;
mod commands;

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use geoipd::config::{
    default_listen_addr, resolve_database_path, DEFAULT_DATABASE_FILE, SEARCH_PATH_ENV,
};
use geoipd::logging::{init_logging, LogFormat};
use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;

use commands::{cmd_inspect, cmd_query, cmd_serve};

#[derive(Parser)]
#[command(name = "geoipd")]
#[command(
    about = "IP geolocation lookup service backed by a MaxMind DB file",
    long_about = "geoipd - IP geolocation lookup service\n\n\
    Resolves IPv4 and IPv6 addresses to an ISO country code, a city name and a\n\
    first-level subdivision name using a local MaxMind DB (.mmdb) file, and\n\
    serves those lookups over TCP as length-prefixed JSON frames.\n\n\
    Examples:\n\
      geoipd serve --database GeoIP2-City.mmdb --listen 127.0.0.1:50051\n\
      geoipd query country 81.2.69.142 --database GeoIP2-City.mmdb\n\
      geoipd query all 2001:db8::1 --search-path /srv/geoip:/usr/share/geoip\n\
      geoipd inspect GeoIP2-City.mmdb --json"
)]
#[command(version)]
struct Cli {
    /// Log filter (e.g. info, debug, geoipd=trace); RUST_LOG overrides it
    #[arg(long, global = true, env = "GEOIPD_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format: text or json
    #[arg(long, global = true, env = "GEOIPD_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Where to find the database
#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    /// Path to the database file (.mmdb or .mmdb.gz); overrides the search path
    #[arg(short, long, env = "GEOIPD_DATABASE", value_name = "FILE")]
    database: Option<PathBuf>,

    /// Directories to search for the database, in platform path-list syntax
    #[arg(long, env = SEARCH_PATH_ENV, value_name = "DIRS")]
    search_path: Option<OsString>,

    /// File name looked up in each search directory
    #[arg(long, default_value = DEFAULT_DATABASE_FILE, value_name = "NAME")]
    file_name: String,
}

impl DatabaseArgs {
    /// Resolve to a single file
    pub fn resolve(&self) -> Result<PathBuf> {
        Ok(resolve_database_path(
            self.database.as_deref(),
            self.search_path.as_deref(),
            &self.file_name,
        )?)
    }
}

/// What `query` prints
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// ISO country code
    Country,
    /// City name
    City,
    /// First subdivision name
    Subdivision,
    /// All three fields as JSON
    All,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the database and serve lookups over TCP
    Serve {
        #[command(flatten)]
        db: DatabaseArgs,

        /// Address to listen on
        #[arg(short, long, env = "GEOIPD_LISTEN", default_value_t = default_listen_addr())]
        listen: SocketAddr,

        /// Language for city and subdivision names
        #[arg(long, env = "GEOIPD_LANGUAGE", default_value = "en")]
        language: String,
    },

    /// Look up one address directly in the database
    Query {
        /// Which field to print
        #[arg(value_enum, value_name = "KIND")]
        kind: QueryKind,

        /// IPv4 or IPv6 address
        #[arg(value_name = "IP")]
        ip: String,

        #[command(flatten)]
        db: DatabaseArgs,

        /// Language for city and subdivision names
        #[arg(long, env = "GEOIPD_LANGUAGE", default_value = "en")]
        language: String,

        /// Quiet mode - no output, only exit code (0 = found, 1 = not found)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show database metadata
    Inspect {
        /// Path to the database file
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Output metadata as JSON
        #[arg(short, long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format).map_err(|e| anyhow!(e))?;

    match cli.command {
        Commands::Serve {
            db,
            listen,
            language,
        } => cmd_serve(&db, listen, language),
        Commands::Query {
            kind,
            ip,
            db,
            language,
            quiet,
        } => cmd_query(&db, kind, ip, language, quiet),
        Commands::Inspect { database, json } => cmd_inspect(database, json),
    }
}
