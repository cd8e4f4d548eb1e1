use std::env;

pub const DEFAULT_PORT: &str = "8080";
pub const DEFAULT_SERVICE_NAME: &str = "grafana-demo-app";
pub const DEFAULT_OTLP_ENDPOINT: &str = "alloy.monitoring.svc.cluster.local:4317";

/// Fault injection toggles. Each one is enabled only by the exact value `"true"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChaosConfig {
    /// `CHAOS_ERROR`: business logic fails one time in five.
    pub error: bool,
    /// `CHAOS_DB_FAILURE`: the database call stalls and is marked failed.
    pub db_failure: bool,
    /// `CHAOS_SLOW_DB`: the database call takes the slow path.
    pub slow_db: bool,
}

/// Environment-derived configuration, read once at startup. An empty variable
/// counts as unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `PORT`. Kept as text; an invalid value surfaces as a bind failure.
    pub port: String,
    /// `APP_NAME`, exported as the `service.name` resource attribute.
    pub service_name: String,
    /// `OTEL_EXPORTER_OTLP_ENDPOINT`, the gRPC collector address.
    pub otlp_endpoint: String,
    pub chaos: ChaosConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            otlp_endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            chaos: ChaosConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let flag = |key: &str| lookup(key).as_deref() == Some("true");

        Self {
            port: var("PORT", DEFAULT_PORT),
            service_name: var("APP_NAME", DEFAULT_SERVICE_NAME),
            otlp_endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT", DEFAULT_OTLP_ENDPOINT),
            chaos: ChaosConfig {
                error: flag("CHAOS_ERROR"),
                db_failure: flag("CHAOS_DB_FAILURE"),
                slow_db: flag("CHAOS_SLOW_DB"),
            },
        }
    }

    /// Address the HTTP listener binds to.
    pub fn listen_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    /// Collector endpoint as a URI. A bare `host:port` gets the `http` scheme,
    /// which makes the gRPC channel plaintext.
    pub fn collector_endpoint(&self) -> String {
        if self.otlp_endpoint.contains("://") {
            self.otlp_endpoint.clone()
        } else {
            format!("http://{}", self.otlp_endpoint)
        }
    }
}
