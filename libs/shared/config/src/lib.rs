use std::env;
use tracing::warn;

/// Which persistence backend the scheduling stores run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// PostgREST endpoint; the database enforces slot uniqueness.
    Postgrest,
    /// Single-process in-memory store. Development and tests only.
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_rest_url: String,
    pub database_service_key: String,
    pub api_jwt_secret: String,
    /// Offset of the clinic's canonical time zone from UTC, in minutes.
    /// All "today" and lead-time comparisons happen in this zone.
    pub clinic_utc_offset_minutes: i32,
    pub store_backend: StoreBackend,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let store_backend = match env::var("STORE_BACKEND").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            Ok("postgrest") | Err(_) => StoreBackend::Postgrest,
            Ok(other) => {
                warn!("Unknown STORE_BACKEND '{}', falling back to postgrest", other);
                StoreBackend::Postgrest
            }
        };

        let config = Self {
            database_rest_url: env::var("DATABASE_REST_URL")
                .unwrap_or_else(|_| {
                    warn!("DATABASE_REST_URL not set, using empty value");
                    String::new()
                }),
            database_service_key: env::var("DATABASE_SERVICE_KEY")
                .unwrap_or_else(|_| {
                    warn!("DATABASE_SERVICE_KEY not set, using empty value");
                    String::new()
                }),
            api_jwt_secret: env::var("API_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("API_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            clinic_utc_offset_minutes: env::var("CLINIC_UTC_OFFSET_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| {
                    warn!("CLINIC_UTC_OFFSET_MINUTES not set, assuming UTC");
                    0
                }),
            store_backend,
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        let store_ok = self.store_backend == StoreBackend::Memory
            || (!self.database_rest_url.is_empty() && !self.database_service_key.is_empty());
        store_ok && !self.api_jwt_secret.is_empty()
    }
}
