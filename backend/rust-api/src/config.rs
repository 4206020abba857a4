use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    pub http_port: u16,
    /// Emails granted the admin role on login.
    pub admin_emails: Vec<String>,
    pub otp: OtpSettings,
    /// Presigned-upload support is optional; the admin upload endpoint
    /// returns 503 when this is absent.
    pub object_storage: Option<ObjectStorageSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpSettings {
    pub ttl_seconds: u64,
    pub max_attempts: u32,
}

impl Default for OtpSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStorageSettings {
    pub bucket: String,
    pub region: String,
    /// S3-compatible endpoint, e.g. "https://s3.us-east-1.amazonaws.com".
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    /// Base URL images are publicly served from (CDN or bucket website).
    pub public_base_url: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            // Fallback to current directory .env for backward compatibility
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env_name = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let config_builder = config::Config::builder()
            .add_source(
                config::File::with_name(&format!("config/{}", env_name)).required(false), // Allow missing config file, fallback to ENV
            )
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings = config_builder.build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "artalyze".to_string());

        let jwt_secret = settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
            .unwrap_or_else(|_| {
                if env_name == "prod" {
                    panic!("FATAL: JWT_SECRET must be set in production!");
                }
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            });

        let http_port = settings
            .get_string("server.port")
            .or_else(|_| env::var("PORT"))
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(8080);

        let admin_emails = settings
            .get_string("auth.admin_emails")
            .or_else(|_| env::var("ADMIN_EMAILS"))
            .map(|raw| {
                raw.split(',')
                    .map(|email| email.trim().to_lowercase())
                    .filter(|email| !email.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let otp = OtpSettings {
            ttl_seconds: settings
                .get_string("otp.ttl_seconds")
                .or_else(|_| env::var("OTP_TTL_SECONDS"))
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(300),
            max_attempts: settings
                .get_string("otp.max_attempts")
                .or_else(|_| env::var("OTP_MAX_ATTEMPTS"))
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(5),
        };

        let object_storage = Self::load_object_storage(&settings);

        Ok(Config {
            mongo_uri,
            redis_uri,
            mongo_database,
            jwt_secret,
            http_port,
            admin_emails,
            otp,
            object_storage,
        })
    }

    fn load_object_storage(settings: &config::Config) -> Option<ObjectStorageSettings> {
        let get = |key: &str, env_key: &str| {
            settings
                .get_string(key)
                .or_else(|_| env::var(env_key))
                .ok()
                .filter(|value| !value.is_empty())
        };
        Some(ObjectStorageSettings {
            bucket: get("object_storage.bucket", "S3_BUCKET")?,
            region: get("object_storage.region", "S3_REGION")?,
            endpoint: get("object_storage.endpoint", "S3_ENDPOINT")?,
            access_key: get("object_storage.access_key", "S3_ACCESS_KEY")?,
            secret_key: get("object_storage.secret_key", "S3_SECRET_KEY")?,
            public_base_url: get("object_storage.public_base_url", "S3_PUBLIC_BASE_URL")?,
        })
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let normalized = email.to_lowercase();
        self.admin_emails.iter().any(|admin| admin == &normalized)
    }
}
