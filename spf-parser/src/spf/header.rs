use rustc_hash::FxHashMap;

use crate::error::{Diagnostic, ErrorCollector, HeaderFieldError, Result};

use super::AttributeValue;

/// Expected parameter counts of the three HEADER records.
pub(crate) const HEADER_FIELDS: [(&str, usize); 3] = [
    ("FILE_DESCRIPTION", 2),
    ("FILE_NAME", 7),
    ("FILE_SCHEMA", 1),
];

/// The HEADER records as parsed, keyed by their canonical uppercase name.
pub(crate) type RawHeader = FxHashMap<String, Vec<AttributeValue>>;

/// Shape-checks the parameter count of each HEADER record. Under
/// `only_header` the first mismatch terminates the pass immediately.
pub(crate) fn validate_header_fields(
    header: &RawHeader,
    collector: &mut ErrorCollector,
    only_header: bool,
) -> Result<()> {
    for (field, expected) in HEADER_FIELDS {
        let found = header.get(field).map(|params| params.len()).unwrap_or(0);
        if found != expected {
            let diagnostic = Diagnostic::HeaderField(HeaderFieldError {
                field: field.to_string(),
                found,
                expected,
            });
            if only_header {
                return Err(collector.fatal(diagnostic));
            }
            collector.add(diagnostic)?;
        }
    }
    Ok(())
}

/// FILE_DESCRIPTION record: the free-form description lines and the
/// implementation level.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FileDescription {
    pub description: Vec<String>,
    pub implementation_level: String,
}

/// FILE_NAME record with its seven positional fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FileName {
    pub name: String,
    pub time_stamp: String,
    pub author: Vec<String>,
    pub organization: Vec<String>,
    pub preprocessor_version: String,
    pub originating_system: String,
    pub authorization: String,
}

/// FILE_SCHEMA record: the governing schema identifiers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FileSchema {
    pub schema_identifiers: Vec<String>,
}

/// Typed view over the three HEADER records.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Header {
    pub file_description: FileDescription,
    pub file_name: FileName,
    pub file_schema: FileSchema,
}

impl Header {
    pub(crate) fn from_raw(raw: &RawHeader) -> Header {
        let description = raw.get("FILE_DESCRIPTION");
        let name = raw.get("FILE_NAME");
        let schema = raw.get("FILE_SCHEMA");

        Header {
            file_description: FileDescription {
                description: string_list_at(description, 0),
                implementation_level: string_at(description, 1),
            },
            file_name: FileName {
                name: string_at(name, 0),
                time_stamp: string_at(name, 1),
                author: string_list_at(name, 2),
                organization: string_list_at(name, 3),
                preprocessor_version: string_at(name, 4),
                originating_system: string_at(name, 5),
                authorization: string_at(name, 6),
            },
            file_schema: FileSchema {
                schema_identifiers: string_list_at(schema, 0),
            },
        }
    }
}

fn string_of(value: &AttributeValue) -> String {
    match value {
        AttributeValue::String(s) => s.clone(),
        AttributeValue::Null => String::new(),
        other => other.to_string(),
    }
}

fn string_at(params: Option<&Vec<AttributeValue>>, index: usize) -> String {
    params
        .and_then(|p| p.get(index))
        .map(string_of)
        .unwrap_or_default()
}

fn string_list_at(params: Option<&Vec<AttributeValue>>, index: usize) -> Vec<String> {
    match params.and_then(|p| p.get(index)) {
        Some(AttributeValue::List(items)) => items.iter().map(string_of).collect(),
        Some(AttributeValue::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod test {
    use crate::error::{CollectMode, Error};

    use super::*;

    fn raw_header() -> RawHeader {
        let mut raw = RawHeader::default();
        raw.insert(
            "FILE_DESCRIPTION".to_string(),
            vec![
                AttributeValue::List(vec![AttributeValue::String(
                    "ViewDefinition [CoordinationView]".to_string(),
                )]),
                AttributeValue::String("2;1".to_string()),
            ],
        );
        raw.insert(
            "FILE_NAME".to_string(),
            vec![
                AttributeValue::String("model.ifc".to_string()),
                AttributeValue::String("2024-05-01T10:00:00".to_string()),
                AttributeValue::List(vec![AttributeValue::String("Alice".to_string())]),
                AttributeValue::List(vec![AttributeValue::String("ACME".to_string())]),
                AttributeValue::String("exporter 1.0".to_string()),
                AttributeValue::Null,
                AttributeValue::Null,
            ],
        );
        raw.insert(
            "FILE_SCHEMA".to_string(),
            vec![AttributeValue::List(vec![AttributeValue::String(
                "IFC4".to_string(),
            )])],
        );
        raw
    }

    #[test]
    fn test_from_raw() {
        let header = Header::from_raw(&raw_header());
        assert_eq!(
            header.file_description.description,
            vec!["ViewDefinition [CoordinationView]"]
        );
        assert_eq!(header.file_description.implementation_level, "2;1");
        assert_eq!(header.file_name.name, "model.ifc");
        assert_eq!(header.file_name.author, vec!["Alice"]);
        assert_eq!(header.file_name.organization, vec!["ACME"]);
        assert_eq!(header.file_name.originating_system, "");
        assert_eq!(header.file_schema.schema_identifiers, vec!["IFC4"]);
    }

    #[test]
    fn test_validate_ok() {
        let mut collector = ErrorCollector::new(CollectMode::CollectAll);
        validate_header_fields(&raw_header(), &mut collector, false).unwrap();
        assert!(collector.is_empty());
    }

    #[test]
    fn test_validate_arity_mismatch_collected() {
        let mut raw = raw_header();
        raw.get_mut("FILE_NAME").unwrap().pop();

        let mut collector = ErrorCollector::new(CollectMode::CollectAll);
        validate_header_fields(&raw, &mut collector, false).unwrap();

        match collector.finish() {
            Err(Error::Validation(collected)) => {
                assert_eq!(collected.errors.len(), 1);
                match &collected.errors[0] {
                    Diagnostic::HeaderField(e) => {
                        assert_eq!(e.field, "FILE_NAME");
                        assert_eq!(e.found, 6);
                        assert_eq!(e.expected, 7);
                    }
                    other => panic!("unexpected diagnostic {:?}", other),
                }
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_only_header_is_fatal() {
        let mut raw = raw_header();
        raw.remove("FILE_SCHEMA");

        let mut collector = ErrorCollector::new(CollectMode::CollectAll);
        let result = validate_header_fields(&raw, &mut collector, true);
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
