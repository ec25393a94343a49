use simple_error::SimpleError;
use std::time::Duration;

/// Environment variable naming the table when using `Config::from_env`.
pub const TABLE_NAME_VAR: &str = "TABLE_NAME";

/// Controls how a chunk of writes is retried while the store keeps reporting unprocessed items.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteRetryPolicy {
    /// Retries after the initial attempt. Once spent, whatever is still unprocessed either fails
    /// the call or is dropped.
    pub max_retries: u32,
    /// Having already retried `n` times, the next wait is `2^n * base_delay`, jittered by up to
    /// half that either way.
    pub base_delay: Duration,
}

impl Default for WriteRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 6,
            base_delay: Duration::from_millis(10),
        }
    }
}

impl WriteRetryPolicy {
    /// The un-jittered wait after `retries` retries have already been made.
    pub fn backoff(&self, retries: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retries)
    }

    /// The backoff with symmetric jitter of up to half its length.
    pub fn jittered_backoff(&self, retries: u32) -> Duration {
        use rand::Rng;
        let wait = self.backoff(retries).as_secs_f64();
        let jitter: f64 = rand::thread_rng().gen_range(-0.5, 0.5);
        Duration::from_secs_f64((wait + wait * jitter).max(0.0))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub table_name: String,
    pub write_retry: WriteRetryPolicy,
    /// Passes the reader makes over a key set before giving up on stragglers.
    pub read_retries: u32,
    /// Caps each range query page. None leaves paging to the store.
    pub query_page_limit: Option<u32>,
    pub consistent_reads: bool,
}

impl Config {
    pub fn new<T: Into<String>>(table_name: T) -> Self {
        Self {
            table_name: table_name.into(),
            write_retry: WriteRetryPolicy::default(),
            read_retries: 3,
            query_page_limit: None,
            consistent_reads: true,
        }
    }

    /// Builds the default configuration for the table named by `TABLE_NAME`.
    pub fn from_env() -> Result<Self, SimpleError> {
        match std::env::var(TABLE_NAME_VAR) {
            Ok(name) if !name.is_empty() => Ok(Self::new(name)),
            _ => Err(SimpleError::new(format!("{} must be set", TABLE_NAME_VAR))),
        }
    }

    pub fn with_write_retry(mut self, policy: WriteRetryPolicy) -> Self {
        self.write_retry = policy;
        self
    }

    pub fn with_read_retries(mut self, retries: u32) -> Self {
        self.read_retries = retries;
        self
    }

    pub fn with_query_page_limit(mut self, limit: u32) -> Self {
        self.query_page_limit = Some(limit);
        self
    }

    pub fn with_eventually_consistent_reads(mut self) -> Self {
        self.consistent_reads = false;
        self
    }
}
