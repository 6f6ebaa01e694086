use crate::core::{DbError, Result};
use std::time::Duration;

/// Environment variable read by [`AdapterConfig::from_env`] for the URI.
pub const URI_ENV: &str = "MONGODB_URI";
/// Environment variable read by [`AdapterConfig::from_env`] for the database.
pub const DATABASE_ENV: &str = "MONGODB_DATABASE";

const SCHEMES: [&str; 2] = ["mongodb://", "mongodb+srv://"];

/// Adapter connection configuration
///
/// The connection string is handed to the driver as is; the other fields
/// override what it specifies.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Connection string, e.g. `mongodb://localhost:27001,localhost:27002`
    pub uri: String,

    /// Database to operate on. Defaults to the one named in the URI,
    /// then to `test`.
    pub database: Option<String>,

    /// Application name reported to the server
    pub app_name: Option<String>,

    /// Timeout for establishing a single connection
    pub connect_timeout: Option<Duration>,

    /// How long to wait for a suitable server before failing an operation
    pub server_selection_timeout: Option<Duration>,

    /// Maximum number of connections the driver pools per server
    pub max_pool_size: Option<u32>,

    /// Minimum number of connections the driver keeps open per server
    pub min_pool_size: Option<u32>,
}

impl AdapterConfig {
    /// Create a configuration for a connection string
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            database: None,
            app_name: Some(env!("CARGO_PKG_NAME").to_string()),
            connect_timeout: None,
            server_selection_timeout: Some(Duration::from_secs(30)),
            max_pool_size: None,
            min_pool_size: None,
        }
    }

    /// Set the database name
    pub fn database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    /// Set the application name
    pub fn app_name(mut self, app_name: &str) -> Self {
        self.app_name = Some(app_name.to_string());
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set server selection timeout
    pub fn server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = Some(timeout);
        self
    }

    /// Set maximum pool size
    pub fn max_pool_size(mut self, max: u32) -> Self {
        self.max_pool_size = Some(max);
        self
    }

    /// Set minimum pool size
    pub fn min_pool_size(mut self, min: u32) -> Self {
        self.min_pool_size = Some(min);
        self
    }

    /// Parse from connection string
    ///
    /// Accepts `mongodb://` and `mongodb+srv://` URIs. The rest of the string
    /// is validated by the driver on connect.
    ///
    /// # Examples
    ///
    /// ```
    /// use mongo_adapter::AdapterConfig;
    ///
    /// let config = AdapterConfig::from_url("mongodb://localhost:27017/app").unwrap();
    /// assert_eq!(config.uri, "mongodb://localhost:27017/app");
    /// assert!(AdapterConfig::from_url("postgres://localhost").is_err());
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        let url = url.trim();
        if !SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
            return Err(DbError::InvalidConfig(
                "URI must start with 'mongodb://' or 'mongodb+srv://'".to_string(),
            ));
        }

        let config = Self::new(url);
        config.validate()?;
        Ok(config)
    }

    /// Read `MONGODB_URI` and, if present, `MONGODB_DATABASE`
    pub fn from_env() -> Result<Self> {
        let uri = std::env::var(URI_ENV)
            .map_err(|_| DbError::InvalidConfig(format!("{URI_ENV} is not set")))?;
        let config = Self::from_url(&uri)?;

        Ok(match std::env::var(DATABASE_ENV) {
            Ok(database) if !database.trim().is_empty() => config.database(database.trim()),
            _ => config,
        })
    }

    /// Connection string with the password replaced, safe for logs
    pub fn to_url(&self) -> String {
        redact_password(&self.uri)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let rest = SCHEMES
            .iter()
            .find_map(|scheme| self.uri.strip_prefix(scheme))
            .ok_or_else(|| DbError::InvalidConfig("unsupported URI scheme".to_string()))?;

        if rest.is_empty() || rest.starts_with('/') {
            return Err(DbError::InvalidConfig("URI has no host".to_string()));
        }

        if let Some(database) = &self.database {
            if database.is_empty() {
                return Err(DbError::InvalidConfig("database cannot be empty".to_string()));
            }
            if database.contains(['/', '\\', '.', ' ', '"', '$']) {
                return Err(DbError::InvalidConfig(format!(
                    "invalid database name '{database}'"
                )));
            }
        }

        if self.max_pool_size == Some(0) {
            return Err(DbError::InvalidConfig("max_pool_size must be > 0".to_string()));
        }

        if let (Some(min), Some(max)) = (self.min_pool_size, self.max_pool_size) {
            if min > max {
                return Err(DbError::InvalidConfig(
                    "min_pool_size cannot exceed max_pool_size".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn redact_password(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://").map(|i| i + 3) else {
        return uri.to_string();
    };
    let authority_end = uri[scheme_end..]
        .find(['/', '?'])
        .map_or(uri.len(), |i| scheme_end + i);
    let authority = &uri[scheme_end..authority_end];

    let Some(at) = authority.rfind('@') else {
        return uri.to_string();
    };
    let credentials = &authority[..at];
    let Some(colon) = credentials.find(':') else {
        return uri.to_string();
    };

    format!(
        "{}{}:***{}",
        &uri[..scheme_end],
        &credentials[..colon],
        &uri[scheme_end + at..]
    )
}
