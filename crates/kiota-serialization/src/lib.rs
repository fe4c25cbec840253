//! Content-type keyed serialization writers.
//!
//! Higher layers that need to turn structured domain objects into a wire
//! payload ask a [`SerializationWriterFactory`] for a writer by content type
//! string. The factory reports the content type it prefers through
//! [`SerializationWriterFactory::valid_content_type`], and hands out
//! [`SerializationWriter`] implementations selected at runtime rather than by
//! static type.
//!
//! The [`SerializationWriterFactoryRegistry`] groups several factories behind
//! one lookup, normalising vendor-specific content types such as
//! `application/vnd.github+json` onto their base type.
//!
//! # Example
//!
//! ```
//! use kiota_serialization::{
//!     JsonSerializationWriterFactory, SerializationWriterFactory,
//!     SerializationWriterFactoryRegistry,
//! };
//!
//! let mut registry = SerializationWriterFactoryRegistry::new();
//! registry.register(JsonSerializationWriterFactory);
//!
//! let mut writer = registry.writer("application/json; charset=utf-8")?;
//! writer.write_string_value(Some("language"), "rust")?;
//! assert_eq!(writer.serialized_content()?, br#"{"language":"rust"}"#.to_vec());
//! # Ok::<(), kiota_serialization::SerializationError>(())
//! ```

mod error;
mod json;
mod registry;
mod text;
mod writer;

pub use self::error::SerializationError;
pub use self::json::{JSON_CONTENT_TYPE, JsonSerializationWriter, JsonSerializationWriterFactory};
pub use self::registry::{SerializationWriterFactoryRegistry, normalise_content_type};
pub use self::text::{TEXT_CONTENT_TYPE, TextSerializationWriter, TextSerializationWriterFactory};
pub use self::writer::{Serializable, SerializationWriter, SerializationWriterFactory};
