use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rate_limit::RateLimiters;
use crate::{Backend, Config, RedisConfig, ServiceConfig, default_services};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub http: Option<HttpConfig>,
    pub redis: Option<RedisSection>,
    pub concurrency: Option<ConcurrencyConfig>,
    pub storage: Option<StorageConfig>,
    pub services: Option<BTreeMap<String, ServiceSection>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpConfig {
    pub mailto: Option<String>,
    pub orcid_api_key: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub connect_backoff_secs: Option<u64>,
    pub use_api_service: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db: Option<i64>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub parse_workers: Option<usize>,
    pub resolve_workers: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceSection {
    pub parser: Option<String>,
    pub finders: Option<Vec<String>>,
    pub prefix: Option<String>,
    pub cache_dir: Option<String>,
    pub backend: Option<String>,
}

/// Platform config path: `~/.opencitations/index/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|d| d.join(".opencitations").join("index").join("config.toml"))
}

/// Where service globs live unless configured otherwise.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|d| d.join(".opencitations").join("index").join("data"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Load config by cascading CWD `.ocindex.toml` over the platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".ocindex.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config");
            None
        }
    }
}

/// The overlay's value if set, else the base's.
fn pick<S, T>(overlay: Option<&S>, base: Option<&S>, field: impl Fn(&S) -> Option<T>) -> Option<T> {
    overlay.and_then(&field).or_else(|| base.and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (bh, oh) = (base.http.as_ref(), overlay.http.as_ref());
    let (br, orr) = (base.redis.as_ref(), overlay.redis.as_ref());
    let (bc, oc) = (base.concurrency.as_ref(), overlay.concurrency.as_ref());
    let (bs, os) = (base.storage.as_ref(), overlay.storage.as_ref());

    let services = match (base.services.clone(), overlay.services.clone()) {
        (None, None) => None,
        (Some(b), None) => Some(b),
        (None, Some(o)) => Some(o),
        (Some(mut b), Some(o)) => {
            for (tag, over) in o {
                let merged = match b.remove(&tag) {
                    Some(under) => ServiceSection {
                        parser: over.parser.or(under.parser),
                        finders: over.finders.or(under.finders),
                        prefix: over.prefix.or(under.prefix),
                        cache_dir: over.cache_dir.or(under.cache_dir),
                        backend: over.backend.or(under.backend),
                    },
                    None => over,
                };
                b.insert(tag, merged);
            }
            Some(b)
        }
    };

    ConfigFile {
        http: Some(HttpConfig {
            mailto: pick(oh, bh, |h| h.mailto.clone()),
            orcid_api_key: pick(oh, bh, |h| h.orcid_api_key.clone()),
            timeout_secs: pick(oh, bh, |h| h.timeout_secs),
            max_attempts: pick(oh, bh, |h| h.max_attempts),
            connect_backoff_secs: pick(oh, bh, |h| h.connect_backoff_secs),
            use_api_service: pick(oh, bh, |h| h.use_api_service),
        }),
        redis: Some(RedisSection {
            host: pick(orr, br, |r| r.host.clone()),
            port: pick(orr, br, |r| r.port),
            db: pick(orr, br, |r| r.db),
            batch_size: pick(orr, br, |r| r.batch_size),
        }),
        concurrency: Some(ConcurrencyConfig {
            parse_workers: pick(oc, bc, |c| c.parse_workers),
            resolve_workers: pick(oc, bc, |c| c.resolve_workers),
        }),
        storage: Some(StorageConfig {
            data_dir: pick(os, bs, |s| s.data_dir.clone()),
        }),
        services,
    }
}

fn parse_backend(tag: &str, raw: &str) -> Backend {
    match raw.to_lowercase().as_str() {
        "csv" => Backend::Csv,
        "redis" => Backend::Redis,
        other => {
            tracing::warn!(service = tag, backend = other, "unknown backend, using csv");
            Backend::Csv
        }
    }
}

/// Apply a file config over the built-in defaults.
pub fn to_config(file: &ConfigFile) -> Config {
    let defaults = Config::default();
    let http = file.http.clone().unwrap_or_default();
    let redis = file.redis.clone().unwrap_or_default();
    let concurrency = file.concurrency.clone().unwrap_or_default();

    let data_dir = file
        .storage
        .as_ref()
        .and_then(|s| s.data_dir.as_ref())
        .map(PathBuf::from)
        .unwrap_or(defaults.data_dir);

    let mut services = default_services(&data_dir);
    for (tag, section) in file.services.iter().flatten() {
        let tag = tag.to_lowercase();
        let base = services.remove(&tag);
        let parser = section
            .parser
            .clone()
            .or_else(|| base.as_ref().map(|b| b.parser.clone()));
        let Some(parser) = parser else {
            tracing::warn!(service = %tag, "service has no parser, ignoring");
            continue;
        };
        services.insert(
            tag.clone(),
            ServiceConfig {
                parser,
                finders: section
                    .finders
                    .clone()
                    .or_else(|| base.as_ref().map(|b| b.finders.clone()))
                    .unwrap_or_default(),
                prefix: section
                    .prefix
                    .clone()
                    .or_else(|| base.as_ref().map(|b| b.prefix.clone()))
                    .unwrap_or_default(),
                cache_dir: section
                    .cache_dir
                    .as_ref()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| data_dir.join(&tag)),
                backend: section
                    .backend
                    .as_deref()
                    .map(|b| parse_backend(&tag, b))
                    .or_else(|| base.as_ref().map(|b| b.backend))
                    .unwrap_or_default(),
            },
        );
    }

    let mailto = http.mailto.filter(|m| !m.trim().is_empty());
    let redis_defaults = RedisConfig::default();

    Config {
        rate_limiters: Arc::new(RateLimiters::new(mailto.is_some())),
        mailto,
        orcid_api_key: http.orcid_api_key.filter(|k| !k.trim().is_empty()),
        timeout: http
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout),
        max_attempts: http.max_attempts.unwrap_or(defaults.max_attempts).max(1),
        connect_backoff: http
            .connect_backoff_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.connect_backoff),
        use_api_service: http.use_api_service.unwrap_or(defaults.use_api_service),
        parse_workers: concurrency
            .parse_workers
            .unwrap_or(defaults.parse_workers)
            .max(1),
        resolve_workers: concurrency
            .resolve_workers
            .unwrap_or(defaults.resolve_workers)
            .max(1),
        redis: RedisConfig {
            host: redis.host.unwrap_or(redis_defaults.host),
            port: redis.port.unwrap_or(redis_defaults.port),
            db: redis.db.unwrap_or(redis_defaults.db),
            batch_size: redis.batch_size.unwrap_or(redis_defaults.batch_size).max(1),
        },
        data_dir,
        services,
    }
}

/// Save the current config to the platform config path.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf, String> {
    let path = config_path().ok_or_else(|| "Could not determine home directory".to_string())?;
    save_config_to(config, &path)?;
    Ok(path)
}

pub fn save_config_to(config: &ConfigFile, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| format!("Failed to serialize config: {}", e))?;
    std::fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_toml() {
        let config = ConfigFile {
            http: Some(HttpConfig {
                mailto: Some("ops@example.org".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        save_config_to(&config, &path).unwrap();
        let parsed = load_from_path(&path).unwrap();
        assert_eq!(parsed.http.unwrap().mailto.as_deref(), Some("ops@example.org"));
    }

    #[test]
    fn unparseable_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[http\nmailto = ").unwrap();
        assert!(load_from_path(&path).is_none());
        assert!(load_from_path(&dir.path().join("absent.toml")).is_none());
    }

    #[test]
    fn merge_overlay_wins_field_by_field() {
        let base: ConfigFile = toml::from_str(
            r#"
            [http]
            mailto = "base@example.org"
            timeout_secs = 10

            [services.coci]
            parser = "crossref"
            finders = ["crossref"]
            "#,
        )
        .unwrap();
        let overlay: ConfigFile = toml::from_str(
            r#"
            [http]
            timeout_secs = 60

            [services.coci]
            backend = "redis"
            "#,
        )
        .unwrap();

        let merged = merge(base, overlay);
        let http = merged.http.unwrap();
        assert_eq!(http.mailto.as_deref(), Some("base@example.org"));
        assert_eq!(http.timeout_secs, Some(60));
        let coci = &merged.services.unwrap()["coci"];
        assert_eq!(coci.parser.as_deref(), Some("crossref"));
        assert_eq!(coci.backend.as_deref(), Some("redis"));
    }

    // ── to_config ──────────────────────────────────────────────────────

    #[test]
    fn empty_file_gives_defaults() {
        let config = to_config(&ConfigFile::default());
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.redis.batch_size, 50_000);
        assert_eq!(config.service("COCI").unwrap().parser, "crossref");
        assert_eq!(config.service("noci").unwrap().parser, "nih");
    }

    #[test]
    fn services_are_overridden_and_added() {
        let file: ConfigFile = toml::from_str(
            r#"
            [storage]
            data_dir = "/srv/oc"

            [services.coci]
            backend = "redis"

            [services.local]
            parser = "crowdsourced"
            finders = ["crossref"]
            prefix = "0990"

            [services.broken]
            finders = ["crossref"]
            "#,
        )
        .unwrap();
        let config = to_config(&file);

        let coci = config.service("coci").unwrap();
        assert_eq!(coci.backend, Backend::Redis);
        assert_eq!(coci.parser, "crossref");
        assert_eq!(coci.cache_dir, PathBuf::from("/srv/oc/coci"));

        let local = config.service("local").unwrap();
        assert_eq!(local.finders, vec!["crossref"]);
        assert_eq!(local.prefix, "0990");
        assert_eq!(coci.prefix, "020");
        assert_eq!(local.cache_dir, PathBuf::from("/srv/oc/local"));

        assert!(config.service("broken").is_none());
    }

    #[test]
    fn blank_mailto_is_ignored() {
        let file: ConfigFile = toml::from_str("[http]\nmailto = \"  \"\n").unwrap();
        assert!(to_config(&file).mailto.is_none());
    }
}
