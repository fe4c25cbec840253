//! Registry selecting a writer factory by content type string.

use std::collections::HashMap;

use tracing::debug;

use crate::json::JSON_CONTENT_TYPE;
use crate::{SerializationError, SerializationWriter, SerializationWriterFactory};

const REGISTRY_TARGET: &str = "kiota_serialization::registry";

/// Maps content types to the factories that serve them.
///
/// Lookups ignore media type parameters (`; charset=utf-8`) and fall back
/// from a vendor-specific type (`application/vnd.api+json`) to its structured
/// syntax suffix (`application/json`).
pub struct SerializationWriterFactoryRegistry {
    factories: HashMap<String, Box<dyn SerializationWriterFactory>>,
    default_content_type: String,
}

impl SerializationWriterFactoryRegistry {
    /// Creates an empty registry that prefers `application/json`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            default_content_type: JSON_CONTENT_TYPE.to_owned(),
        }
    }

    /// Changes the content type reported as preferred.
    #[must_use]
    pub fn with_default_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.default_content_type = content_type.into();
        self
    }

    /// Registers `factory` under its own valid content type, replacing any
    /// previous registration for that type.
    pub fn register<F>(&mut self, factory: F)
    where
        F: SerializationWriterFactory + 'static,
    {
        let key = factory.valid_content_type().to_ascii_lowercase();
        debug!(
            target: REGISTRY_TARGET,
            content_type = %key,
            "registering serialization writer factory"
        );
        self.factories.insert(key, Box::new(factory));
    }

    /// Returns `true` when a factory serves `content_type`.
    #[must_use]
    pub fn supports(&self, content_type: &str) -> bool {
        self.resolve(content_type).is_ok()
    }

    /// Returns the registered content types in sorted order.
    #[must_use]
    pub fn content_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    fn resolve(
        &self,
        content_type: &str,
    ) -> Result<(&str, &dyn SerializationWriterFactory), SerializationError> {
        let without_parameters = strip_parameters(content_type);
        if without_parameters.is_empty() {
            return Err(SerializationError::EmptyContentType);
        }
        if let Some((key, factory)) = self.factories.get_key_value(&without_parameters) {
            return Ok((key.as_str(), factory.as_ref()));
        }
        let normalised = normalise_content_type(content_type)?;
        self.factories
            .get_key_value(&normalised)
            .map(|(key, factory)| (key.as_str(), factory.as_ref()))
            .ok_or(SerializationError::UnsupportedContentType {
                content_type: normalised,
            })
    }
}

impl Default for SerializationWriterFactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SerializationWriterFactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializationWriterFactoryRegistry")
            .field("content_types", &self.content_types())
            .field("default_content_type", &self.default_content_type)
            .finish()
    }
}

impl SerializationWriterFactory for SerializationWriterFactoryRegistry {
    fn valid_content_type(&self) -> &str {
        &self.default_content_type
    }

    fn writer(
        &self,
        content_type: &str,
    ) -> Result<Box<dyn SerializationWriter>, SerializationError> {
        let (key, factory) = self.resolve(content_type)?;
        factory.writer(key)
    }
}

fn strip_parameters(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Reduces a content type to the key a factory is registered under.
///
/// Parameters are dropped, the result is lower-cased, and a structured
/// syntax suffix replaces the vendor subtype.
///
/// ```
/// use kiota_serialization::normalise_content_type;
///
/// let key = normalise_content_type("application/vnd.github.v3+json; charset=utf-8")?;
/// assert_eq!(key, "application/json");
/// # Ok::<(), kiota_serialization::SerializationError>(())
/// ```
///
/// # Errors
///
/// Returns [`SerializationError::EmptyContentType`] when nothing remains
/// after stripping parameters.
pub fn normalise_content_type(content_type: &str) -> Result<String, SerializationError> {
    let base = strip_parameters(content_type);
    if base.is_empty() {
        return Err(SerializationError::EmptyContentType);
    }
    let Some((kind, subtype)) = base.split_once('/') else {
        return Ok(base);
    };
    match subtype.rsplit_once('+') {
        Some((_, suffix)) if !suffix.is_empty() => Ok(format!("{kind}/{suffix}")),
        _ => Ok(base),
    }
}

#[cfg(test)]
mod tests;
