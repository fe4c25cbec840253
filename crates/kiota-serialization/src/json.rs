//! JSON writer backed by `serde_json` values.

use serde_json::{Map, Number, Value};

use crate::writer::ensure_content_type;
use crate::{Serializable, SerializationError, SerializationWriter, SerializationWriterFactory};

/// Content type produced by [`JsonSerializationWriterFactory`].
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Builds a JSON document from keyed and unkeyed writes.
///
/// Keyed writes populate the root object; an unkeyed write replaces the whole
/// document with a single value.
#[derive(Debug, Default)]
pub struct JsonSerializationWriter {
    properties: Map<String, Value>,
    root: Option<Value>,
}

impl JsonSerializationWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the writer and returns the document as a JSON value.
    ///
    /// A writer that only received keyed writes (or none) yields an object.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.root.unwrap_or(Value::Object(self.properties))
    }

    fn put(&mut self, key: Option<&str>, value: Value) {
        match key {
            Some(name) => {
                self.properties.insert(name.to_owned(), value);
            }
            None => self.root = Some(value),
        }
    }
}

impl SerializationWriter for JsonSerializationWriter {
    fn write_string_value(
        &mut self,
        key: Option<&str>,
        value: &str,
    ) -> Result<(), SerializationError> {
        self.put(key, Value::String(value.to_owned()));
        Ok(())
    }

    fn write_bool_value(&mut self, key: Option<&str>, value: bool) -> Result<(), SerializationError> {
        self.put(key, Value::Bool(value));
        Ok(())
    }

    fn write_i64_value(&mut self, key: Option<&str>, value: i64) -> Result<(), SerializationError> {
        self.put(key, Value::Number(value.into()));
        Ok(())
    }

    fn write_f64_value(&mut self, key: Option<&str>, value: f64) -> Result<(), SerializationError> {
        let number = Number::from_f64(value).ok_or_else(|| SerializationError::UnsupportedValue {
            content_type: JSON_CONTENT_TYPE.to_owned(),
            message: format!("non-finite number {value}"),
        })?;
        self.put(key, Value::Number(number));
        Ok(())
    }

    fn write_null_value(&mut self, key: Option<&str>) -> Result<(), SerializationError> {
        self.put(key, Value::Null);
        Ok(())
    }

    fn write_collection_of_string_values(
        &mut self,
        key: Option<&str>,
        values: &[String],
    ) -> Result<(), SerializationError> {
        let items = values.iter().cloned().map(Value::String).collect();
        self.put(key, Value::Array(items));
        Ok(())
    }

    fn write_object_value(
        &mut self,
        key: Option<&str>,
        value: &dyn Serializable,
    ) -> Result<(), SerializationError> {
        let mut nested = Self::new();
        value.serialize(&mut nested)?;
        self.put(key, nested.into_value());
        Ok(())
    }

    fn serialized_content(&mut self) -> Result<Vec<u8>, SerializationError> {
        let document = match &self.root {
            Some(value) => value.clone(),
            None => Value::Object(self.properties.clone()),
        };
        serde_json::to_vec(&document).map_err(|error| SerializationError::UnsupportedValue {
            content_type: JSON_CONTENT_TYPE.to_owned(),
            message: error.to_string(),
        })
    }
}

/// Hands out [`JsonSerializationWriter`] instances for `application/json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializationWriterFactory;

impl SerializationWriterFactory for JsonSerializationWriterFactory {
    fn valid_content_type(&self) -> &str {
        JSON_CONTENT_TYPE
    }

    fn writer(
        &self,
        content_type: &str,
    ) -> Result<Box<dyn SerializationWriter>, SerializationError> {
        ensure_content_type(JSON_CONTENT_TYPE, content_type)?;
        Ok(Box::new(JsonSerializationWriter::new()))
    }
}
