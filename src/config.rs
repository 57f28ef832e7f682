//! Service configuration and database path resolution

use crate::error::OpenError;
use crate::geo::DEFAULT_LANGUAGE;
use std::ffi::OsStr;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name looked up in each search directory
pub const DEFAULT_DATABASE_FILE: &str = "GeoIP2-City.mmdb";

/// Environment variable holding the database search path list
pub const SEARCH_PATH_ENV: &str = "GEOIPD_SEARCH_PATH";

/// Default listen port
pub const DEFAULT_PORT: u16 = 50051;

/// Everything `serve` needs to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Resolved database file
    pub database: PathBuf,
    /// Address to listen on
    pub listen: SocketAddr,
    /// Language for localized names
    pub language: String,
}

impl ServiceConfig {
    /// Defaults for everything except the database path
    pub fn new(database: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            listen: default_listen_addr(),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    /// Listen on `listen` instead of [`default_listen_addr`]
    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    /// Read localized names in `language`
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// Loopback on [`DEFAULT_PORT`]
pub fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT))
}

/// Pick the database file to open
///
/// An explicit path always wins and is returned unchecked; opening it
/// reports any problem. Otherwise each directory in `search_path`
/// (platform path-list syntax) is joined with `file_name` and the first
/// existing file is returned.
pub fn resolve_database_path(
    explicit: Option<&Path>,
    search_path: Option<&OsStr>,
    file_name: &str,
) -> Result<PathBuf, OpenError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let search_path = search_path.ok_or_else(|| {
        OpenError::NotResolved(format!(
            "no --database given and {} is not set",
            SEARCH_PATH_ENV
        ))
    })?;

    for dir in std::env::split_paths(search_path) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let candidate = dir.join(file_name);
        debug!(candidate = %candidate.display(), "checking database location");
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    Err(OpenError::NotResolved(format!(
        "{} not found in any search directory",
        file_name
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_path_wins() {
        let dir = TempDir::new().unwrap();
        let search = OsString::from(dir.path());
        let explicit = Path::new("/some/where/else.mmdb");

        let resolved = resolve_database_path(
            Some(explicit),
            Some(search.as_os_str()),
            DEFAULT_DATABASE_FILE,
        )
        .unwrap();
        assert_eq!(resolved, explicit);
    }

    #[test]
    fn test_first_existing_entry() {
        let empty = TempDir::new().unwrap();
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        std::fs::write(first.path().join("db.mmdb"), b"x").unwrap();
        std::fs::write(second.path().join("db.mmdb"), b"x").unwrap();

        let search =
            std::env::join_paths([empty.path(), first.path(), second.path()]).unwrap();
        let resolved = resolve_database_path(None, Some(search.as_os_str()), "db.mmdb").unwrap();
        assert_eq!(resolved, first.path().join("db.mmdb"));
    }

    #[test]
    fn test_not_found() {
        let dir = TempDir::new().unwrap();
        let search = OsString::from(dir.path());

        let err = resolve_database_path(None, Some(search.as_os_str()), "db.mmdb").unwrap_err();
        assert!(matches!(err, OpenError::NotResolved(_)));

        let err = resolve_database_path(None, None, "db.mmdb").unwrap_err();
        assert!(err.to_string().contains(SEARCH_PATH_ENV));
    }

    #[test]
    fn test_directory_is_not_a_database() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("db.mmdb")).unwrap();
        let search = OsString::from(dir.path());

        assert!(resolve_database_path(None, Some(search.as_os_str()), "db.mmdb").is_err());
    }

    #[test]
    fn test_service_config_defaults() {
        let config = ServiceConfig::new("/tmp/db.mmdb");
        assert_eq!(config.listen.port(), DEFAULT_PORT);
        assert!(config.listen.ip().is_loopback());
        assert_eq!(config.language, "en");

        let listen: SocketAddr = "0.0.0.0:9000".parse().unwrap();
        let config = config.with_listen(listen).with_language("de");
        assert_eq!(config.listen, listen);
        assert_eq!(config.language, "de");
        assert_eq!(config.database, PathBuf::from("/tmp/db.mmdb"));
    }
}
