use adsync_core::AppError;

/// Configuration for the database connection pool.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// Read configuration from environment variables.
    ///
    /// - `DATABASE_URL` (required)
    /// - `DATABASE_MAX_CONNECTIONS` (optional, defaults to 5)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let url = lookup("DATABASE_URL").ok_or_else(|| {
            AppError::ConfigError("DATABASE_URL not set. Required for the task queue.".into())
        })?;

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            None => 5,
            Some(raw) => {
                let parsed: u32 = raw.parse().map_err(|_| {
                    AppError::ConfigError(format!(
                        "Invalid DATABASE_MAX_CONNECTIONS '{raw}': must be a positive integer"
                    ))
                })?;
                if parsed == 0 {
                    return Err(AppError::ConfigError(
                        "DATABASE_MAX_CONNECTIONS must be at least 1".into(),
                    ));
                }
                parsed
            }
        };

        Ok(Self {
            url,
            max_connections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_validation() {
        let config = DatabaseConfig::from_lookup(|k| {
            (k == "DATABASE_URL").then(|| "postgres://localhost/adsync".to_string())
        })
        .unwrap();
        assert_eq!(config.max_connections, 5);

        let err = DatabaseConfig::from_lookup(|k| match k {
            "DATABASE_URL" => Some("postgres://localhost/adsync".into()),
            _ => Some("0".into()),
        })
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        assert!(DatabaseConfig::from_lookup(|_| None).is_err());
    }
}
