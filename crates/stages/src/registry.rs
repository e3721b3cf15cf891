//! Registry of the text stages

use std::sync::Arc;

use contracts::{Result, StageConfig};
use engine::{Stage, StageRegistry};
use tracing::debug;

use crate::error::StageError;
use crate::text::{Affix, Lowercase, MaxLength, RejectEmpty, Text, Trim, Uppercase};

/// Payload name text blueprints declare (`data_type = "string"`)
pub const TEXT_PAYLOAD: &str = "string";

fn shared<S: Stage<Text>>(stage: S) -> Result<Arc<dyn Stage<Text>>> {
    Ok(Arc::new(stage))
}

fn required<'a>(config: &'a StageConfig, param: &str) -> std::result::Result<&'a str, StageError> {
    config
        .params
        .get(param)
        .map(String::as_str)
        .ok_or_else(|| StageError::missing_param(&config.name, param))
}

/// Every text stage under its factory name
///
/// # Errors
/// Only on a duplicate factory name, which would be a bug here.
pub fn text_registry() -> Result<StageRegistry<Text>> {
    let mut registry = StageRegistry::new(TEXT_PAYLOAD);
    registry
        .register("uppercase", "upper-cases every line", |_| shared(Uppercase))?
        .register("lowercase", "lower-cases every line", |_| shared(Lowercase))?
        .register("trim", "strips surrounding whitespace", |_| shared(Trim))?
        .register("prefix", "prepends params.text", |config| {
            shared(Affix::prefix(required(config, "text")?))
        })?
        .register("suffix", "appends params.text", |config| {
            shared(Affix::suffix(required(config, "text")?))
        })?
        .register("reject-empty", "reports and drops blank lines", |_| {
            shared(RejectEmpty)
        })?
        .register(
            "max-length",
            "reports and drops lines longer than params.limit characters",
            |config| {
                let raw = required(config, "limit")?;
                let limit = raw.parse::<usize>().map_err(|e| {
                    StageError::invalid_param(&config.name, "limit", e.to_string())
                })?;
                shared(MaxLength::new(limit))
            },
        )?;
    debug!(factories = ?registry.names(), "Text stage registry ready");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::PipelineError;
    use std::collections::HashMap;

    fn config(factory: &str, params: &[(&str, &str)]) -> StageConfig {
        StageConfig {
            name: format!("{factory}-stage"),
            factory: factory.to_string(),
            priority: 1,
            enabled: true,
            bypassed: false,
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_registry_names() {
        let registry = text_registry().unwrap();
        assert_eq!(registry.payload(), TEXT_PAYLOAD);
        assert_eq!(
            registry.names(),
            [
                "lowercase",
                "max-length",
                "prefix",
                "reject-empty",
                "suffix",
                "trim",
                "uppercase"
            ]
        );
    }

    #[test]
    fn test_factories_with_params() {
        let registry = text_registry().unwrap();
        assert!(registry.create(&config("prefix", &[("text", "> ")])).is_ok());
        assert!(registry.create(&config("max-length", &[("limit", "80")])).is_ok());
    }

    #[test]
    fn test_missing_param() {
        let registry = text_registry().unwrap();
        let err = registry.create(&config("suffix", &[])).err().unwrap();
        assert!(matches!(err, PipelineError::ConfigValidation { .. }));
        assert!(err.to_string().contains("'text'"), "got: {err}");
    }

    #[test]
    fn test_invalid_param() {
        let registry = text_registry().unwrap();
        let err = registry
            .create(&config("max-length", &[("limit", "lots")]))
            .err()
            .unwrap();
        assert!(err.to_string().contains("params.limit"), "got: {err}");
    }
}
