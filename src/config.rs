use anyhow::{bail, Context};
use std::path::PathBuf;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Runtime configuration, resolved once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Maximum allowed distance between the agent and the store at check-in.
    /// Required: there is no permissive fallback radius.
    pub gps_max_distance_m: f64,
    /// Whether evidence may be submitted without an open visit. When false,
    /// a missing visit turns the submission into a validation error.
    pub allow_visitless_evidence: bool,
    pub upload_dir: PathBuf,
    /// Base URL under which stored uploads are served back to clients.
    pub public_base_url: String,
    pub max_upload_bytes: usize,
    pub auth_introspection_url: Option<String>,
    pub auth_bypass: bool,
    pub allowed_origins: Vec<String>,
    pub debug_mode: bool,
    pub skip_migrations: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let gps_max_distance_m =
            parse_gps_radius(std::env::var("GPS_MAX_DISTANCE_METERS").ok())?;

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3001".to_string());
        url::Url::parse(&public_base_url)
            .context("PUBLIC_BASE_URL must be a valid URL")?;

        let auth_bypass = env_flag("AUTH_BYPASS", false);
        let auth_introspection_url = std::env::var("AUTH_INTROSPECTION_URL").ok();
        if !auth_bypass && auth_introspection_url.is_none() {
            bail!("AUTH_INTROSPECTION_URL must be set (or AUTH_BYPASS=true for development)");
        }

        Ok(Config {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            database_url,
            gps_max_distance_m,
            allow_visitless_evidence: env_flag("ALLOW_VISITLESS_EVIDENCE", true),
            upload_dir: PathBuf::from(
                std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
            ),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            auth_introspection_url,
            auth_bypass,
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            debug_mode: env_flag("DEBUG_MODE", false),
            skip_migrations: env_flag("SKIP_MIGRATIONS", false),
        })
    }
}

/// Required, no fallback radius. Must parse as a positive finite number.
fn parse_gps_radius(raw: Option<String>) -> anyhow::Result<f64> {
    let raw = match raw {
        Some(v) => v,
        None => bail!("GPS_MAX_DISTANCE_METERS must be set (meters, e.g. 200)"),
    };
    let radius: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("GPS_MAX_DISTANCE_METERS is not a number: {raw:?}"))?;
    if !radius.is_finite() || radius <= 0.0 {
        bail!("GPS_MAX_DISTANCE_METERS must be a positive number, got {raw:?}");
    }
    Ok(radius)
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.to_lowercase();
            v == "true" || v == "1"
        }
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gps_radius_is_required() {
        assert!(parse_gps_radius(None).is_err());
    }

    #[test]
    fn gps_radius_must_be_a_positive_number() {
        assert!(parse_gps_radius(Some("abc".into())).is_err());
        assert!(parse_gps_radius(Some("-5".into())).is_err());
        assert!(parse_gps_radius(Some("0".into())).is_err());
        assert!(parse_gps_radius(Some("inf".into())).is_err());
    }

    #[test]
    fn gps_radius_parses_plain_meters() {
        assert_eq!(parse_gps_radius(Some("200".into())).unwrap(), 200.0);
        assert_eq!(parse_gps_radius(Some(" 150.5 ".into())).unwrap(), 150.5);
    }
}
