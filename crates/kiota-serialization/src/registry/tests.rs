//! Unit tests for content-type resolution.

use rstest::{fixture, rstest};

use super::*;
use crate::{JsonSerializationWriterFactory, TextSerializationWriterFactory};

#[fixture]
fn registry() -> SerializationWriterFactoryRegistry {
    let mut registry = SerializationWriterFactoryRegistry::new();
    registry.register(JsonSerializationWriterFactory);
    registry.register(TextSerializationWriterFactory);
    registry
}

#[rstest]
#[case("application/json", "application/json")]
#[case("Application/JSON; charset=utf-8", "application/json")]
#[case("application/vnd.github.v3+json", "application/json")]
#[case("text/plain", "text/plain")]
#[case("multipart", "multipart")]
fn normalises_content_types(#[case] input: &str, #[case] expected: &str) {
    assert_eq!(normalise_content_type(input).expect("normalise"), expected);
}

#[rstest]
fn normalising_empty_content_type_fails() {
    assert_eq!(
        normalise_content_type(" ; charset=utf-8"),
        Err(SerializationError::EmptyContentType)
    );
}

#[rstest]
fn resolves_vendor_content_type_to_json(registry: SerializationWriterFactoryRegistry) {
    let mut writer = registry
        .writer("application/vnd.kiota+json")
        .expect("vendor json should resolve");
    writer.write_bool_value(Some("ok"), true).expect("write");
    assert_eq!(
        writer.serialized_content().expect("content"),
        br#"{"ok":true}"#.to_vec()
    );
}

#[rstest]
fn resolves_text_with_parameters(registry: SerializationWriterFactoryRegistry) {
    let mut writer = registry
        .writer("text/plain; charset=utf-8")
        .expect("text should resolve");
    writer.write_string_value(None, "hello").expect("write");
    assert_eq!(writer.serialized_content().expect("content"), b"hello".to_vec());
}

#[rstest]
fn unknown_content_type_is_reported(registry: SerializationWriterFactoryRegistry) {
    let err = registry
        .writer("application/xml")
        .err()
        .expect("xml should not resolve");
    assert_eq!(
        err,
        SerializationError::UnsupportedContentType {
            content_type: String::from("application/xml"),
        }
    );
}

#[rstest]
fn reports_preferred_content_type(registry: SerializationWriterFactoryRegistry) {
    assert_eq!(registry.valid_content_type(), "application/json");
    let text_first = registry.with_default_content_type("text/plain");
    assert_eq!(text_first.valid_content_type(), "text/plain");
}

#[rstest]
fn lists_registered_content_types(registry: SerializationWriterFactoryRegistry) {
    assert_eq!(registry.content_types(), vec!["application/json", "text/plain"]);
    assert!(registry.supports("application/problem+json"));
    assert!(!registry.supports("image/png"));
}
