use anyhow::Context;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl DbConfig {
    /// Reads `DATABASE_URL` and `EXAM_RESULTS_MAX_CONNECTIONS`, after loading
    /// a `.env` file if one is present.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = var("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .context("DATABASE_URL must be set to a Postgres instance")?;

        let max_connections = match var("EXAM_RESULTS_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("EXAM_RESULTS_MAX_CONNECTIONS is not a number: {raw}"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url,
            max_connections,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<DbConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DbConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn requires_database_url() {
        assert!(load(&[]).is_err());
        assert!(load(&[("DATABASE_URL", "  ")]).is_err());
    }

    #[test]
    fn defaults_connection_limit() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/exams")]).unwrap();
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn reads_connection_limit() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/exams"),
            ("EXAM_RESULTS_MAX_CONNECTIONS", "12"),
        ])
        .unwrap();
        assert_eq!(config.max_connections, 12);

        assert!(load(&[
            ("DATABASE_URL", "postgres://localhost/exams"),
            ("EXAM_RESULTS_MAX_CONNECTIONS", "many"),
        ])
        .is_err());
    }
}
