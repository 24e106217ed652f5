use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub(crate) struct ServiceContext {
    pub(crate) service_name: String,
    pub(crate) environment: String,
    pub(crate) component: String,
}

#[derive(Debug, Clone)]
pub(crate) struct ObservabilityConfig {
    pub(crate) service_context: ServiceContext,
    pub(crate) log_format: LogFormat,
    /// Warnings captured during config parsing so they can be logged after tracing is initialized.
    pub(crate) warnings: Vec<String>,
}

impl ObservabilityConfig {
    pub(crate) fn from_env(component: &str) -> Self {
        Self::from_lookup(component, |key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(component: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let component = component.trim().to_string();
        let mut warnings = Vec::new();

        let service_name = lookup("SERVICE_NAME")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| component.clone());

        let environment = lookup("STAGE")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        let log_format = match lookup("LOG_FORMAT") {
            None => LogFormat::Pretty,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "" | "pretty" | "text" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                _ => {
                    warnings.push(format!(
                        "LOG_FORMAT is invalid (value: {raw}); defaulting to pretty"
                    ));
                    LogFormat::Pretty
                }
            },
        };

        Self {
            service_context: ServiceContext {
                service_name,
                environment,
                component,
            },
            log_format,
            warnings,
        }
    }
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

    #[test]
    fn defaults_to_component_name_and_pretty_logs() {
        let config = ObservabilityConfig::from_lookup(" backend ", lookup(&[]));

        assert_eq!(config.service_context.service_name, "backend");
        assert_eq!(config.service_context.environment, "unknown");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn reads_service_context_and_json_format() {
        let config = ObservabilityConfig::from_lookup(
            "backend",
            lookup(&[("SERVICE_NAME", "payments"), ("STAGE", "production"), ("LOG_FORMAT", "JSON")]),
        );

        assert_eq!(config.service_context.service_name, "payments");
        assert_eq!(config.service_context.environment, "production");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn invalid_format_is_reported_not_fatal() {
        let config = ObservabilityConfig::from_lookup("backend", lookup(&[("LOG_FORMAT", "xml")]));

        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.warnings.len(), 1);
    }
}
