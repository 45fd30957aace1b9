pub mod header;
mod lexer;
pub mod mvd;
mod parser;
mod preprocess;

use std::{fmt, ops::Index, path::Path, str::FromStr, sync::OnceLock};

use regex::Regex;
use rustc_hash::FxHashMap;

use crate::{Error, Result};

pub use header::{FileDescription, FileName, FileSchema, Header};
pub use mvd::{AutoCommitList, KeywordMap, MvdInfo, MvdOptions, OptionValue};

/// A typed attribute value of an entity instance.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Integer(i64),
    Real(f64),
    /// Decoded text: `''` unfolded to `'`, `\\` to `\`, control directives
    /// kept verbatim.
    String(String),
    /// Bare identifier between dots, e.g. `.NOTDEFINED.`.
    Enum(String),
    /// Reference to another entity by numeric id; may point forward.
    Ref(i64),
    /// The `$` literal.
    Null,
    /// The `*` literal.
    Omitted,
    Binary {
        leading_bits: u8,
        digits: String,
    },
    List(Vec<AttributeValue>),
    /// A single value wrapped by a defined-type constructor keyword.
    Typed(String, Box<AttributeValue>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Integer(v) => write!(f, "{}", v),
            AttributeValue::Real(v) => write!(f, "{:?}", v),
            AttributeValue::String(s) => write!(f, "'{}'", s),
            AttributeValue::Enum(k) => write!(f, ".{}.", k),
            AttributeValue::Ref(id) => write!(f, "#{}", id),
            AttributeValue::Null => write!(f, "$"),
            AttributeValue::Omitted => write!(f, "*"),
            AttributeValue::Binary {
                leading_bits,
                digits,
            } => write!(f, "\"{}{}\"", leading_bits, digits),
            AttributeValue::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    item.fmt(f)?;
                }
                write!(f, ")")
            }
            AttributeValue::Typed(keyword, value) => write!(f, "{}({})", keyword, value),
        }
    }
}

/// One `KEYWORD(params)` record. Simple instances carry exactly one of
/// these; complex instances carry an ordered sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleRecord {
    pub keyword: String,
    pub attributes: Vec<AttributeValue>,
}

/// A numbered record of the DATA section, immutable once lowered.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInstance {
    id: i64,
    records: Vec<SimpleRecord>,
    line_span: (u32, u32),
}

impl EntityInstance {
    pub(crate) fn new(id: i64, records: Vec<SimpleRecord>, line_span: (u32, u32)) -> Self {
        EntityInstance {
            id,
            records,
            line_span,
        }
    }

    /// Returns the id of the instance.
    pub fn get_id(&self) -> i64 {
        self.id
    }

    pub fn is_complex(&self) -> bool {
        self.records.len() > 1
    }

    /// Returns the entity keyword, or `None` for a complex instance.
    pub fn get_type(&self) -> Option<&str> {
        match self.records.as_slice() {
            [record] => Some(&record.keyword),
            _ => None,
        }
    }

    /// Returns the attribute values of the first record.
    pub fn get_attributes(&self) -> &[AttributeValue] {
        self.records
            .first()
            .map(|r| r.attributes.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_records(&self) -> &[SimpleRecord] {
        &self.records
    }

    /// First and last source line covered by the record's tokens.
    pub fn get_line_span(&self) -> (u32, u32) {
        self.line_span
    }

    /// Case-insensitive match against any of the record keywords.
    pub fn matches_type(&self, name: &str) -> bool {
        self.records
            .iter()
            .any(|r| r.keyword.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for EntityInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}=", self.id)?;
        if self.is_complex() {
            write!(f, "(")?;
            for record in &self.records {
                write_record(f, record)?;
            }
            write!(f, ")")
        } else if let Some(record) = self.records.first() {
            write_record(f, record)
        } else {
            Ok(())
        }
    }
}

fn write_record(f: &mut fmt::Formatter<'_>, record: &SimpleRecord) -> fmt::Result {
    write!(f, "{}(", record.keyword)?;
    for (i, attribute) in record.attributes.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        fmt::Display::fmt(attribute, f)?;
    }
    write!(f, ")")
}

/// The entity population of a file, in source order, with an id index.
#[derive(Debug, Default)]
pub struct EntityStore {
    instances: Vec<EntityInstance>,
    index: FxHashMap<i64, Vec<usize>>,
}

impl EntityStore {
    /// Inserts an instance. When the id is already taken the existing
    /// instance wins and `(id, first line, duplicate line)` is returned.
    pub(crate) fn insert(&mut self, instance: EntityInstance) -> Option<(i64, u32, u32)> {
        let id = instance.get_id();
        if let Some(positions) = self.index.get(&id) {
            let first_line = self.instances[positions[0]].get_line_span().0;
            return Some((id, first_line, instance.get_line_span().0));
        }

        self.index.insert(id, vec![self.instances.len()]);
        self.instances.push(instance);
        None
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Iterates the instances in source order of first appearance.
    pub fn iter(&self) -> std::slice::Iter<'_, EntityInstance> {
        self.instances.iter()
    }

    pub fn by_id(&self, id: i64) -> Result<&EntityInstance> {
        match self.index.get(&id) {
            None => Err(Error::InstanceNotFound(id)),
            Some(positions) if positions.len() != 1 => Err(Error::DuplicateDefinition(id)),
            Some(positions) => Ok(&self.instances[positions[0]]),
        }
    }

    pub fn by_type(&self, name: &str) -> Vec<&EntityInstance> {
        self.instances
            .iter()
            .filter(|instance| instance.matches_type(name))
            .collect()
    }
}

/// A parsed SPF file: the typed header plus the entity population.
/// Read-only after the parse, apart from the single-writer MVD view.
#[derive(Debug, Default)]
pub struct SpfFile {
    header: Header,
    entities: EntityStore,
}

static SCHEMA_PREFIX: OnceLock<Regex> = OnceLock::new();
static VERSION_PARTS: OnceLock<[Regex; 4]> = OnceLock::new();

impl SpfFile {
    pub(crate) fn new(header: Header, entities: EntityStore) -> Self {
        SpfFile { header, entities }
    }

    pub fn get_header(&self) -> &Header {
        &self.header
    }

    pub fn get_entities(&self) -> &EntityStore {
        &self.entities
    }

    /// Returns the single instance with the given id.
    pub fn by_id(&self, id: i64) -> Result<&EntityInstance> {
        self.entities.by_id(id)
    }

    /// Returns the instances of the given entity type, in source order.
    /// The match is case-insensitive.
    pub fn by_type(&self, name: &str) -> Vec<&EntityInstance> {
        self.entities.by_type(name)
    }

    /// First entry of `FILE_SCHEMA.schema_identifiers`.
    pub fn schema_identifier(&self) -> Option<&str> {
        self.header
            .file_schema
            .schema_identifiers
            .first()
            .map(|s| s.as_str())
    }

    /// Short schema name, e.g. `IFC4X3` for `IFC4X3_ADD2`. The `_ADD` and
    /// `_TC` suffixes contribute to `schema_version` but not to the name.
    pub fn schema(&self) -> Option<String> {
        let identifier = self.schema_identifier()?;
        let re = SCHEMA_PREFIX
            .get_or_init(|| Regex::new(r"^(IFC\d+)?(X\d+)?(_ADD\d+)?(_TC\d+)?").unwrap());
        let captures = re.captures(identifier)?;

        let mut short = String::new();
        for group in 1..=2 {
            if let Some(m) = captures.get(group) {
                short.push_str(m.as_str());
            }
        }
        Some(short)
    }

    /// Numeric `(IFC, X, _ADD, _TC)` version, absent parts reported as 0.
    pub fn schema_version(&self) -> (u32, u32, u32, u32) {
        let parts = VERSION_PARTS.get_or_init(|| {
            [
                Regex::new(r"IFC(\d)").unwrap(),
                Regex::new(r"X(\d)").unwrap(),
                Regex::new(r"_ADD(\d)").unwrap(),
                Regex::new(r"_TC(\d)").unwrap(),
            ]
        });

        let identifier = match self.schema_identifier() {
            Some(identifier) => identifier,
            None => return (0, 0, 0, 0),
        };

        let mut version = [0u32; 4];
        for (slot, re) in version.iter_mut().zip(parts.iter()) {
            if let Some(captures) = re.captures(identifier) {
                *slot = captures[1].parse().unwrap_or(0);
            }
        }
        (version[0], version[1], version[2], version[3])
    }

    /// Mutable model-view-definition view over the header description.
    /// Edits are written back into `FILE_DESCRIPTION.description`.
    pub fn mvd(&mut self) -> MvdInfo<'_> {
        MvdInfo::new(&mut self.header.file_description.description)
    }
}

impl Index<i64> for SpfFile {
    type Output = EntityInstance;

    /// Subscript access, equivalent to [`SpfFile::by_id`]. Panics when the
    /// id is absent.
    fn index(&self, id: i64) -> &EntityInstance {
        match self.by_id(id) {
            Ok(instance) => instance,
            Err(err) => panic!("{}", err),
        }
    }
}

impl FromStr for SpfFile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SpfParser::new().parse_str(s)
    }
}

/// Parser configuration, consumed by [`SpfParser::parse_file`] and
/// [`SpfParser::parse_str`].
///
/// `with_tree` selects the full lowering; disabling it runs the skeleton
/// pass that validates the file and tracks instance identifiers without
/// retaining the entity population. `only_header` parses a synthetic input
/// built from the sliced HEADER section.
#[derive(Debug, Clone, Copy)]
pub struct SpfParser {
    pub with_progress: bool,
    pub with_tree: bool,
    pub only_header: bool,
    pub fail_fast: bool,
}

impl Default for SpfParser {
    fn default() -> Self {
        SpfParser {
            with_progress: false,
            with_tree: true,
            only_header: false,
            fail_fast: false,
        }
    }
}

impl SpfParser {
    pub fn new() -> Self {
        Default::default()
    }

    /// Reads and parses the given file.
    ///
    /// # Arguments
    /// * `path` - The path to the SPF file.
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<SpfFile> {
        let bytes = std::fs::read(path)?;
        // Latin-1 widening keeps the byte-to-char mapping 1:1; the token
        // alphabet itself is ASCII.
        let content: String = bytes.iter().map(|&b| b as char).collect();
        self.parse_str(&content)
    }

    /// Parses SPF content that is already in memory.
    pub fn parse_str(&self, content: &str) -> Result<SpfFile> {
        parser::parse(content, self)
    }
}
