//! Plain-text writer for single primitive payloads.

use crate::writer::ensure_content_type;
use crate::{Serializable, SerializationError, SerializationWriter, SerializationWriterFactory};

/// Content type produced by [`TextSerializationWriterFactory`].
pub const TEXT_CONTENT_TYPE: &str = "text/plain";

/// Writes exactly one unkeyed primitive as UTF-8 text.
///
/// Structured data (keyed values, collections, objects) has no text
/// representation and is rejected, as is a second value.
#[derive(Debug, Default)]
pub struct TextSerializationWriter {
    value: Option<String>,
}

impl TextSerializationWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&mut self, key: Option<&str>, value: String) -> Result<(), SerializationError> {
        if let Some(name) = key {
            return Err(unsupported(format!("keyed value '{name}'")));
        }
        if self.value.is_some() {
            return Err(unsupported(String::from("more than one value")));
        }
        self.value = Some(value);
        Ok(())
    }
}

fn unsupported(message: String) -> SerializationError {
    SerializationError::UnsupportedValue {
        content_type: TEXT_CONTENT_TYPE.to_owned(),
        message,
    }
}

impl SerializationWriter for TextSerializationWriter {
    fn write_string_value(
        &mut self,
        key: Option<&str>,
        value: &str,
    ) -> Result<(), SerializationError> {
        self.put(key, value.to_owned())
    }

    fn write_bool_value(&mut self, key: Option<&str>, value: bool) -> Result<(), SerializationError> {
        self.put(key, value.to_string())
    }

    fn write_i64_value(&mut self, key: Option<&str>, value: i64) -> Result<(), SerializationError> {
        self.put(key, value.to_string())
    }

    fn write_f64_value(&mut self, key: Option<&str>, value: f64) -> Result<(), SerializationError> {
        self.put(key, value.to_string())
    }

    fn write_null_value(&mut self, key: Option<&str>) -> Result<(), SerializationError> {
        self.put(key, String::from("null"))
    }

    fn write_collection_of_string_values(
        &mut self,
        _key: Option<&str>,
        _values: &[String],
    ) -> Result<(), SerializationError> {
        Err(unsupported(String::from("collections")))
    }

    fn write_object_value(
        &mut self,
        _key: Option<&str>,
        _value: &dyn Serializable,
    ) -> Result<(), SerializationError> {
        Err(unsupported(String::from("objects")))
    }

    fn serialized_content(&mut self) -> Result<Vec<u8>, SerializationError> {
        self.value
            .clone()
            .map(String::into_bytes)
            .ok_or_else(|| unsupported(String::from("an empty payload")))
    }
}

/// Hands out [`TextSerializationWriter`] instances for `text/plain`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextSerializationWriterFactory;

impl SerializationWriterFactory for TextSerializationWriterFactory {
    fn valid_content_type(&self) -> &str {
        TEXT_CONTENT_TYPE
    }

    fn writer(
        &self,
        content_type: &str,
    ) -> Result<Box<dyn SerializationWriter>, SerializationError> {
        ensure_content_type(TEXT_CONTENT_TYPE, content_type)?;
        Ok(Box::new(TextSerializationWriter::new()))
    }
}
