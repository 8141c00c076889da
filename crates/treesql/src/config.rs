use crate::dialect::Dialect;
use std::time::Duration;

/// Default number of SQL bytes kept in log events.
pub const DEFAULT_MAX_LOGGED_SQL_LEN: usize = 200;

/// Configuration for [`Engine`](crate::Engine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Dialect used to compile requests and to resolve operation names.
    pub dialect: Dialect,
    /// Timeout for each statement round trip. `None` means no timeout (default).
    pub statement_timeout: Option<Duration>,
    /// Statements slower than this are logged at `WARN`.
    pub slow_statement_threshold: Option<Duration>,
    /// Whether executed SQL text is included in log events.
    pub log_sql: bool,
    /// Maximum SQL bytes per log event. `None` logs the full text.
    pub max_logged_sql_len: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::postgres(),
            statement_timeout: None,
            slow_statement_threshold: None,
            log_sql: true,
            max_logged_sql_len: Some(DEFAULT_MAX_LOGGED_SQL_LEN),
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set the statement timeout.
    ///
    /// A statement exceeding it fails with [`SqlError::Timeout`](crate::SqlError::Timeout).
    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    pub fn slow_statement_threshold(mut self, threshold: Duration) -> Self {
        self.slow_statement_threshold = Some(threshold);
        self
    }

    /// Enable or disable SQL text in log events.
    pub fn log_sql(mut self, enabled: bool) -> Self {
        self.log_sql = enabled;
        self
    }

    pub fn max_logged_sql_len(mut self, max: Option<usize>) -> Self {
        self.max_logged_sql_len = max;
        self
    }
}

/// Truncate `sql` to at most `max_bytes`, backing off to a char boundary.
pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}
