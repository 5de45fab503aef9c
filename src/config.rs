use std::env;

/// Warehouse connection parameters, resolved from the environment.
///
/// `DATABASE_URL` wins when set; otherwise the individual `DB_*` variables
/// are combined, falling back to local-development defaults.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl DbConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_or("DB_HOST", "localhost"),
            port: env::var("DB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5432),
            dbname: env_or("DB_NAME", "ukdata"),
            user: env_or("DB_USER", "postgres"),
            password: env_or("DB_PASS", "postgres"),
        }
    }

    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.dbname
        )
    }
}

/// Resolves the connection string the process should use.
pub fn database_url() -> String {
    env::var("DATABASE_URL").unwrap_or_else(|_| DbConfig::from_env().url())
}

/// Masks the password portion of a connection URL for logs and errors.
pub fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((userinfo, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match userinfo.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_combines_all_parts() {
        let config = DbConfig {
            host: "db".to_string(),
            port: 5433,
            dbname: "ukdata".to_string(),
            user: "analytics".to_string(),
            password: "hunter2".to_string(),
        };
        assert_eq!(config.url(), "postgres://analytics:hunter2@db:5433/ukdata");
    }

    #[test]
    fn redact_masks_password() {
        assert_eq!(
            redact_url("postgres://analytics:hunter2@db:5433/ukdata"),
            "postgres://analytics:***@db:5433/ukdata"
        );
    }

    #[test]
    fn redact_leaves_passwordless_urls_alone() {
        assert_eq!(
            redact_url("postgres://db:5432/ukdata"),
            "postgres://db:5432/ukdata"
        );
    }
}
