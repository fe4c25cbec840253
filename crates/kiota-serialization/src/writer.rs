//! Writer and factory capability traits.

use crate::SerializationError;

/// Serialises primitive and nested values into a wire payload.
///
/// Every write takes an optional key: keyed writes add a property to the
/// object being built, unkeyed writes set the payload's top-level value.
pub trait SerializationWriter {
    /// Writes a string value.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::UnsupportedValue`] when the format cannot
    /// represent the value at this position.
    fn write_string_value(&mut self, key: Option<&str>, value: &str)
    -> Result<(), SerializationError>;

    /// Writes a boolean value.
    ///
    /// # Errors
    ///
    /// See [`SerializationWriter::write_string_value`].
    fn write_bool_value(&mut self, key: Option<&str>, value: bool) -> Result<(), SerializationError>;

    /// Writes a signed integer value.
    ///
    /// # Errors
    ///
    /// See [`SerializationWriter::write_string_value`].
    fn write_i64_value(&mut self, key: Option<&str>, value: i64) -> Result<(), SerializationError>;

    /// Writes a floating point value. Non-finite values are rejected.
    ///
    /// # Errors
    ///
    /// See [`SerializationWriter::write_string_value`].
    fn write_f64_value(&mut self, key: Option<&str>, value: f64) -> Result<(), SerializationError>;

    /// Writes an explicit null.
    ///
    /// # Errors
    ///
    /// See [`SerializationWriter::write_string_value`].
    fn write_null_value(&mut self, key: Option<&str>) -> Result<(), SerializationError>;

    /// Writes a collection of strings.
    ///
    /// # Errors
    ///
    /// See [`SerializationWriter::write_string_value`].
    fn write_collection_of_string_values(
        &mut self,
        key: Option<&str>,
        values: &[String],
    ) -> Result<(), SerializationError>;

    /// Writes a nested object by letting it serialise itself.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the nested object or by the writer.
    fn write_object_value(
        &mut self,
        key: Option<&str>,
        value: &dyn Serializable,
    ) -> Result<(), SerializationError>;

    /// Returns the payload produced so far.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::UnsupportedValue`] when nothing encodable
    /// has been written.
    fn serialized_content(&mut self) -> Result<Vec<u8>, SerializationError>;
}

/// A domain object that knows how to write itself to any writer.
pub trait Serializable {
    /// Writes this object's properties to `writer`.
    ///
    /// # Errors
    ///
    /// Propagates writer errors.
    fn serialize(&self, writer: &mut dyn SerializationWriter) -> Result<(), SerializationError>;
}

/// Produces writers for one content type.
pub trait SerializationWriterFactory: Send + Sync {
    /// The content type this factory produces.
    fn valid_content_type(&self) -> &str;

    /// Returns a fresh writer for `content_type`.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::EmptyContentType`] for an empty string,
    /// and [`SerializationError::ContentTypeMismatch`] or
    /// [`SerializationError::UnsupportedContentType`] when the content type
    /// is not served.
    fn writer(&self, content_type: &str)
    -> Result<Box<dyn SerializationWriter>, SerializationError>;
}

/// Checks a requested content type against the one a factory produces.
pub(crate) fn ensure_content_type(
    expected: &str,
    requested: &str,
) -> Result<(), SerializationError> {
    if requested.trim().is_empty() {
        return Err(SerializationError::EmptyContentType);
    }
    if !requested.eq_ignore_ascii_case(expected) {
        return Err(SerializationError::ContentTypeMismatch {
            expected: expected.to_owned(),
            actual: requested.to_owned(),
        });
    }
    Ok(())
}
