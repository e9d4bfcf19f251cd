use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};

/// Which implementation of the auth service and record store to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Hosted,
    Memory,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hosted" => Ok(BackendKind::Hosted),
            "memory" => Ok(BackendKind::Memory),
            other => bail!("unknown BACKEND {other:?}, expected \"hosted\" or \"memory\""),
        }
    }
}

/// Unset means `false`; anything other than `true`/`false` is a startup error.
fn parse_flag(name: &str, value: Option<&str>) -> anyhow::Result<bool> {
    match value.map(str::trim) {
        None | Some("") => Ok(false),
        Some(v) => v
            .to_ascii_lowercase()
            .parse()
            .with_context(|| format!("{name} must be true or false, got {v:?}")),
    }
}

#[derive(Debug, Clone)]
pub struct HostedConfig {
    pub url: String,
    pub anon_key: String,
    pub jwt_secret: Option<String>,
    pub entries_table: String,
    pub session_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    pub cors_extra_origins: Vec<String>,

    pub backend: BackendKind,
    pub hosted: Option<HostedConfig>,
    pub backend_timeout: Duration,

    // In-memory backend
    pub memory_require_confirmation: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let backend: BackendKind = env::var("BACKEND")
            .unwrap_or_else(|_| "hosted".into())
            .parse()?;

        let hosted = match backend {
            BackendKind::Hosted => Some(HostedConfig {
                url: env::var("SUPABASE_URL")
                    .context("SUPABASE_URL must be set when BACKEND=hosted")?
                    .trim_end_matches('/')
                    .to_string(),
                anon_key: env::var("SUPABASE_ANON_KEY")
                    .context("SUPABASE_ANON_KEY must be set when BACKEND=hosted")?,
                jwt_secret: env::var("AUTH_JWT_SECRET").ok().filter(|s| !s.is_empty()),
                entries_table: env::var("ENTRIES_TABLE")
                    .unwrap_or_else(|_| "journal_entries".into()),
                session_file: env::var("SESSION_FILE")
                    .unwrap_or_else(|_| ".moodlog-session.json".into())
                    .into(),
            }),
            BackendKind::Memory => None,
        };

        let timeout_secs: u64 = env::var("BACKEND_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .context("BACKEND_TIMEOUT_SECS must be a number")?;
        if timeout_secs == 0 {
            bail!("BACKEND_TIMEOUT_SECS must be greater than zero");
        }

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()
                .context("PORT must be a number")?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            cors_extra_origins: env::var("CORS_EXTRA_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),

            backend,
            hosted,
            backend_timeout: Duration::from_secs(timeout_secs),

            memory_require_confirmation: parse_flag(
                "MEMORY_REQUIRE_CONFIRMATION",
                env::var("MEMORY_REQUIRE_CONFIRMATION").ok().as_deref(),
            )?,
        })
    }

    /// Settings for running against the in-memory backend.
    #[cfg(test)]
    pub fn memory() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            frontend_url: "http://localhost:3000".into(),
            cors_extra_origins: Vec::new(),
            backend: BackendKind::Memory,
            hosted: None,
            backend_timeout: Duration::from_secs(5),
            memory_require_confirmation: false,
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("hosted".parse::<BackendKind>().unwrap(), BackendKind::Hosted);
        assert_eq!(" Memory ".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert!("sqlite".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(!parse_flag("FLAG", None).unwrap());
        assert!(!parse_flag("FLAG", Some("")).unwrap());
        assert!(parse_flag("FLAG", Some("true")).unwrap());
        assert!(parse_flag("FLAG", Some(" TRUE ")).unwrap());
        assert!(!parse_flag("FLAG", Some("false")).unwrap());

        let err = parse_flag("MEMORY_REQUIRE_CONFIRMATION", Some("yes")).unwrap_err();
        assert!(err.to_string().contains("MEMORY_REQUIRE_CONFIRMATION"));
    }

    #[test]
    fn test_listen_addr() {
        let mut config = Config::memory();
        config.port = 9090;
        assert_eq!(config.listen_addr(), "127.0.0.1:9090");
    }
}
