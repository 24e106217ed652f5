use std::time::Duration;

use anyhow::{Context, Result};
use payments_core::{psp::midtrans_client::DEFAULT_BASE_URL, requesters::RequesterConfig};
use url::Url;

use super::config_model::{BackendServer, Database, DotEnvyConfig, Midtrans};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<DotEnvyConfig> {
    let required = |key: &str| -> Result<String> {
        lookup(key)
            .filter(|value| !value.trim().is_empty())
            .with_context(|| format!("{key} is invalid"))
    };
    let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    let backend_server = BackendServer {
        port: required("SERVER_PORT_BACKEND")?
            .parse::<u16>()
            .context("SERVER_PORT_BACKEND is invalid")?,
        body_limit: required("SERVER_BODY_LIMIT")?
            .parse::<u64>()
            .context("SERVER_BODY_LIMIT is invalid")?,
        timeout: required("SERVER_TIMEOUT")?
            .parse::<u64>()
            .context("SERVER_TIMEOUT is invalid")?,
    };

    let database = Database {
        url: required("DATABASE_URL")?,
        max_connections: optional("DATABASE_MAX_CONNECTIONS")
            .map(|raw| raw.parse::<u32>())
            .transpose()
            .context("DATABASE_MAX_CONNECTIONS is invalid")?
            .unwrap_or(10),
    };

    let midtrans = Midtrans {
        server_key: required("MIDTRANS_SERVER_KEY")?,
        base_url: optional("MIDTRANS_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        timeout: Duration::from_secs(
            optional("MIDTRANS_TIMEOUT_SECS")
                .map(|raw| raw.parse::<u64>())
                .transpose()
                .context("MIDTRANS_TIMEOUT_SECS is invalid")?
                .unwrap_or(10),
        ),
        verify_signature: optional("MIDTRANS_VERIFY_SIGNATURE")
            .map(|raw| raw.parse::<bool>())
            .transpose()
            .context("MIDTRANS_VERIFY_SIGNATURE is invalid")?
            .unwrap_or(false),
    };

    let parse_url = |key: &str| -> Result<Option<Url>> {
        optional(key)
            .map(|raw| Url::parse(&raw))
            .transpose()
            .with_context(|| format!("{key} is invalid"))
    };

    let requesters = RequesterConfig {
        order_url: parse_url("ORDERS_SERVICE_URL")?,
        reservation_url: parse_url("RESERVATIONS_SERVICE_URL")?,
        event_url: parse_url("EVENTS_SERVICE_URL")?,
        delivery_url: parse_url("DELIVERY_SERVICE_URL")?,
        queue_capacity: optional("REQUESTER_QUEUE_CAPACITY")
            .map(|raw| raw.parse::<usize>())
            .transpose()
            .context("REQUESTER_QUEUE_CAPACITY is invalid")?
            .unwrap_or(256),
        max_attempts: optional("REQUESTER_MAX_ATTEMPTS")
            .map(|raw| raw.parse::<u32>())
            .transpose()
            .context("REQUESTER_MAX_ATTEMPTS is invalid")?
            .unwrap_or(3),
        retry_backoff: Duration::from_millis(500),
        request_timeout: Duration::from_secs(
            optional("REQUESTER_TIMEOUT_SECS")
                .map(|raw| raw.parse::<u64>())
                .transpose()
                .context("REQUESTER_TIMEOUT_SECS is invalid")?
                .unwrap_or(5),
        ),
    };

    Ok(DotEnvyConfig {
        backend_server,
        database,
        midtrans,
        requesters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("SERVER_PORT_BACKEND", "8080"),
        ("SERVER_BODY_LIMIT", "10"),
        ("SERVER_TIMEOUT", "30"),
        ("DATABASE_URL", "postgres://localhost:5432/payments"),
        ("MIDTRANS_SERVER_KEY", "SB-Mid-server-abc"),
    ];

    #[test]
    fn loads_minimal_config_with_defaults() {
        let config = from_lookup(lookup(BASE)).unwrap();

        assert_eq!(config.backend_server.port, 8080);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.midtrans.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.midtrans.timeout, Duration::from_secs(10));
        assert!(!config.midtrans.verify_signature);
        assert!(config.requesters.order_url.is_none());
        assert_eq!(config.requesters.max_attempts, 3);
        assert_eq!(config.requesters.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn requester_timeout_is_independent_of_server_timeout() {
        let mut vars = BASE.to_vec();
        vars.push(("REQUESTER_TIMEOUT_SECS", "2"));
        let config = from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.backend_server.timeout, 30);
        assert_eq!(config.requesters.request_timeout, Duration::from_secs(2));

        let mut invalid = BASE.to_vec();
        invalid.push(("REQUESTER_TIMEOUT_SECS", "soon"));
        let err = from_lookup(lookup(&invalid)).unwrap_err();
        assert!(err.to_string().contains("REQUESTER_TIMEOUT_SECS"));
    }

    #[test]
    fn missing_server_key_names_the_variable() {
        let vars: Vec<_> = BASE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "MIDTRANS_SERVER_KEY")
            .collect();
        let err = from_lookup(lookup(&vars)).unwrap_err();

        assert!(err.to_string().contains("MIDTRANS_SERVER_KEY"));
    }

    #[test]
    fn requester_urls_are_validated() {
        let mut vars = BASE.to_vec();
        vars.push(("ORDERS_SERVICE_URL", "http://orders:8000/api/v1/orders"));
        let config = from_lookup(lookup(&vars)).unwrap();
        assert_eq!(
            config.requesters.order_url.unwrap().as_str(),
            "http://orders:8000/api/v1/orders"
        );

        vars.push(("DELIVERY_SERVICE_URL", "not a url"));
        let err = from_lookup(lookup(&vars)).unwrap_err();
        assert!(err.to_string().contains("DELIVERY_SERVICE_URL"));
    }
}
