use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    pub dir: PathBuf,
    pub pg_dump_bin: String,
    pub psql_bin: String,
}

/// Credentials for the first super admin, created at startup when none exists.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub minio_endpoint: String,
    pub minio_bucket: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub backup: BackupConfig,
    pub cookie_secure: bool,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "classos".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "classos-users".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES").unwrap_or(60),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES").unwrap_or(60 * 24 * 14),
        };
        let backup = BackupConfig {
            dir: std::env::var("BACKUP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("backups")),
            pg_dump_bin: std::env::var("PG_DUMP_BIN").unwrap_or_else(|_| "pg_dump".into()),
            psql_bin: std::env::var("PSQL_BIN").unwrap_or_else(|_| "psql".into()),
        };
        let bootstrap_admin = match (
            std::env::var("BOOTSTRAP_SUPERADMIN_USERNAME"),
            std::env::var("BOOTSTRAP_SUPERADMIN_PASSWORD"),
        ) {
            (Ok(username), Ok(password)) if !username.trim().is_empty() => Some(BootstrapAdmin {
                username: username.trim().to_string(),
                password,
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt,
            minio_endpoint: std::env::var("MINIO_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:9000".into()),
            minio_bucket: std::env::var("MINIO_BUCKET").unwrap_or_else(|_| "classos".into()),
            minio_access_key: std::env::var("MINIO_ACCESS_KEY").unwrap_or_default(),
            minio_secret_key: std::env::var("MINIO_SECRET_KEY").unwrap_or_default(),
            backup,
            cookie_secure: env_parse("COOKIE_SECURE").unwrap_or(false),
            bootstrap_admin,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_ignores_garbage() {
        std::env::set_var("CLASSOS_TEST_NUMBER", "not-a-number");
        assert_eq!(env_parse::<i64>("CLASSOS_TEST_NUMBER"), None);
        std::env::set_var("CLASSOS_TEST_NUMBER", "42");
        assert_eq!(env_parse::<i64>("CLASSOS_TEST_NUMBER"), Some(42));
        assert_eq!(env_parse::<bool>("CLASSOS_TEST_MISSING_FLAG"), None);
    }
}
