use std::{io::Write, ops::Range};

use log::{debug, trace};
use logos::Logos;
use rustc_hash::FxHashMap;

use crate::error::{
    CollectMode, Diagnostic, DuplicateNameError, ErrorCollector, MissingHeaderError, Result,
    SyntaxError, SyntaxErrorKind,
};
use crate::Error;

use super::{
    header::{self, Header, RawHeader},
    lexer::{decode_string, scan_control_directives, LineIndex, Token},
    preprocess, AttributeValue, EntityInstance, EntityStore, SimpleRecord, SpfFile, SpfParser,
};

/// Terminal names accepted at a parameter position, pre-sorted.
const PARAMETER_EXPECTED: &[&str] = &[
    "BINARY", "ENUMERATION", "ID", "INT", "KEYWORD", "LPAR", "NONE", "REAL", "STAR", "STRING",
];

/// Runs a complete pass over the given content with the given options.
pub(crate) fn parse(content: &str, options: &SpfParser) -> Result<SpfFile> {
    let mode = if options.fail_fast {
        CollectMode::FailFast
    } else {
        CollectMode::CollectAll
    };
    let mut collector = ErrorCollector::new(mode);

    let stripped = match preprocess::strip_comments(content) {
        Ok(stripped) => stripped,
        Err(offset) => {
            let index = LineIndex::new(content);
            return Err(unterminated_comment(content, &index, offset));
        }
    };

    if options.only_header {
        let Some(synthetic) = preprocess::slice_header(&stripped) else {
            return Err(collector.fatal(Diagnostic::MissingHeader(MissingHeaderError)));
        };
        let mut parser = Parser::new(&synthetic, &synthetic)?;
        let outcome = parser.parse_file(false)?;
        header::validate_header_fields(&outcome.raw_header, &mut collector, true)?;
        collector.finish()?;
        return Ok(SpfFile::new(
            Header::from_raw(&outcome.raw_header),
            EntityStore::default(),
        ));
    }

    let mut parser = Parser::new(&stripped, content)?;
    let outcome = parser.parse_file(options.with_tree)?;
    let index = parser.index;

    header::validate_header_fields(&outcome.raw_header, &mut collector, false)?;

    let mut store = EntityStore::default();
    if options.with_tree {
        let total = outcome.entities.len();
        for (position, entity) in outcome.entities.into_iter().enumerate() {
            if options.with_progress {
                emit_progress(position, total);
            }
            if let Some((name, first_line, duplicate_line)) = store.insert(entity) {
                collector.add(Diagnostic::DuplicateName(DuplicateNameError {
                    name,
                    lines: (first_line, duplicate_line),
                    line: index.line_text(content, first_line).to_string(),
                }))?;
            }
        }
    } else {
        let total = outcome.identifiers.len();
        let mut seen: FxHashMap<i64, u32> = FxHashMap::default();
        for (position, (id, line)) in outcome.identifiers.into_iter().enumerate() {
            if options.with_progress {
                emit_progress(position, total);
            }
            match seen.get(&id) {
                Some(&first_line) => {
                    collector.add(Diagnostic::DuplicateName(DuplicateNameError {
                        name: id,
                        lines: (first_line, line),
                        line: index.line_text(content, first_line).to_string(),
                    }))?;
                }
                None => {
                    seen.insert(id, line);
                }
            }
        }
    }

    collector.finish()?;
    Ok(SpfFile::new(Header::from_raw(&outcome.raw_header), store))
}

/// Progress dots on stdout, ~100 in total across the population.
fn emit_progress(position: usize, total: usize) {
    let before = position as u64 * 100 / total as u64;
    let done = (position as u64 + 1) * 100 / total as u64;
    let mut out = std::io::stdout();
    for _ in before..done {
        let _ = out.write_all(b".");
    }
    let _ = out.flush();
}

fn unterminated_comment(content: &str, index: &LineIndex, offset: usize) -> Error {
    let (lineno, column) = index.line_col(content, offset);
    Diagnostic::Syntax(SyntaxError {
        kind: SyntaxErrorKind::UnexpectedCharacter,
        lineno,
        column,
        found_type: "character".to_string(),
        found_value: "/*".to_string(),
        expected: Vec::new(),
        line: index.line_text(content, lineno).to_string(),
    })
    .into()
}

fn unexpected_character(src: &str, index: &LineIndex, mut offset: usize) -> Error {
    while !src.is_char_boundary(offset) {
        offset -= 1;
    }
    let (lineno, column) = index.line_col(src, offset);
    let found: String = src[offset..].chars().take(1).collect();
    Diagnostic::Syntax(SyntaxError {
        kind: SyntaxErrorKind::UnexpectedCharacter,
        lineno,
        column,
        found_type: "character".to_string(),
        found_value: found,
        expected: Vec::new(),
        line: index.line_text(src, lineno).to_string(),
    })
    .into()
}

/// Everything a single recognizer pass produces. In skeleton passes the
/// entity list stays empty and only the identifiers are kept.
struct Outcome {
    raw_header: RawHeader,
    entities: Vec<EntityInstance>,
    identifiers: Vec<(i64, u32)>,
}

/// Recursive-descent recognizer over the materialized token stream.
struct Parser<'src> {
    /// Text the diagnostics quote; positions are identical to the stripped
    /// text the tokens were lexed from.
    raw: &'src str,
    index: LineIndex,
    tokens: Vec<(Token<'src>, Range<usize>)>,
    pos: usize,
}

impl<'src> Parser<'src> {
    /// Tokenizes the stripped content. Characters the lexer rejects and
    /// malformed control directives inside string bodies are fatal here.
    fn new(stripped: &'src str, raw: &'src str) -> Result<Self> {
        let index = LineIndex::new(raw);
        let mut lexer = Token::lexer(stripped);
        let mut tokens = Vec::new();

        while let Some(item) = lexer.next() {
            let span = lexer.span();
            match item {
                Ok(Token::String(body)) => {
                    if let Err(bad) = scan_control_directives(body) {
                        // +1 skips the opening apostrophe
                        return Err(unexpected_character(raw, &index, span.start + 1 + bad));
                    }
                    tokens.push((Token::String(body), span));
                }
                Ok(token) => tokens.push((token, span)),
                Err(()) => return Err(unexpected_character(raw, &index, span.start)),
            }
        }

        Ok(Parser {
            raw,
            index,
            tokens,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn line_of(&self, at: usize) -> u32 {
        self.index.line_col(self.raw, self.tokens[at].1.start).0
    }

    /// Consumes the current token if accepted, returning its position.
    fn expect(&mut self, accept: impl Fn(&Token) -> bool, expected: &[&str]) -> Result<usize> {
        match self.tokens.get(self.pos) {
            Some((token, _)) if accept(token) => {
                let at = self.pos;
                self.pos += 1;
                Ok(at)
            }
            _ => Err(self.error(expected)),
        }
    }

    fn expect_keyword(&mut self) -> Result<&'src str> {
        match self.tokens.get(self.pos) {
            Some((Token::Keyword(keyword), _)) => {
                let keyword = *keyword;
                self.pos += 1;
                Ok(keyword)
            }
            _ => Err(self.error(&["KEYWORD"])),
        }
    }

    fn expect_id(&mut self) -> Result<(i64, u32)> {
        match self.tokens.get(self.pos) {
            Some((Token::Id(id), span)) => {
                let id = *id;
                let line = self.index.line_col(self.raw, span.start).0;
                self.pos += 1;
                Ok((id, line))
            }
            _ => Err(self.error(&["ENDSEC", "ID"])),
        }
    }

    /// Builds the syntax error for the current position.
    fn error(&self, expected: &[&str]) -> Error {
        let mut expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
        expected.sort();

        let diagnostic = match self.tokens.get(self.pos) {
            Some((token, span)) => {
                let (lineno, column) = self.index.line_col(self.raw, span.start);
                SyntaxError {
                    kind: SyntaxErrorKind::UnexpectedToken,
                    lineno,
                    column,
                    found_type: token.name().to_lowercase(),
                    found_value: self.raw[span.clone()].to_string(),
                    expected,
                    line: self.index.line_text(self.raw, lineno).to_string(),
                }
            }
            None => {
                let (lineno, column) = self.index.end_position(self.raw);
                SyntaxError {
                    kind: SyntaxErrorKind::UnexpectedToken,
                    lineno,
                    column,
                    found_type: "eof".to_string(),
                    found_value: String::new(),
                    expected,
                    line: self.index.line_text(self.raw, lineno).to_string(),
                }
            }
        };
        Diagnostic::Syntax(diagnostic).into()
    }

    fn parse_file(&mut self, with_tree: bool) -> Result<Outcome> {
        self.expect(|t| matches!(t, Token::StartTag), &["ISO-10303-21"])?;
        self.expect(|t| matches!(t, Token::Sem), &["SEMICOLON"])?;

        let raw_header = self.parse_header()?;
        let (entities, identifiers) = self.parse_data_section(with_tree)?;

        self.expect(|t| matches!(t, Token::EndTag), &["END-ISO-10303-21"])?;
        self.expect(|t| matches!(t, Token::Sem), &["SEMICOLON"])?;
        if self.pos != self.tokens.len() {
            return Err(self.error(&[]));
        }

        Ok(Outcome {
            raw_header,
            entities,
            identifiers,
        })
    }

    fn parse_header(&mut self) -> Result<RawHeader> {
        debug!("parsing HEADER section");
        self.expect(|t| matches!(t, Token::Header), &["HEADER"])?;
        self.expect(|t| matches!(t, Token::Sem), &["SEMICOLON"])?;

        let mut raw = RawHeader::default();
        for (field, _) in header::HEADER_FIELDS {
            self.expect(
                |t| matches!(t, Token::Keyword(keyword) if *keyword == field),
                &[field],
            )?;
            self.expect(|t| matches!(t, Token::BrO), &["LPAR"])?;
            let params = self.parse_parameter_list()?;
            self.expect(|t| matches!(t, Token::BrC), &["COMMA", "RPAR"])?;
            self.expect(|t| matches!(t, Token::Sem), &["SEMICOLON"])?;
            raw.insert(field.to_string(), params);
        }

        self.expect(|t| matches!(t, Token::Endsec), &["ENDSEC"])?;
        self.expect(|t| matches!(t, Token::Sem), &["SEMICOLON"])?;
        Ok(raw)
    }

    fn parse_data_section(
        &mut self,
        with_tree: bool,
    ) -> Result<(Vec<EntityInstance>, Vec<(i64, u32)>)> {
        debug!("parsing DATA section");
        self.expect(|t| matches!(t, Token::Data), &["DATA"])?;
        self.expect(|t| matches!(t, Token::Sem), &["SEMICOLON"])?;

        let mut entities = Vec::new();
        let mut identifiers = Vec::new();

        loop {
            if matches!(self.peek(), Some(Token::Endsec)) {
                self.pos += 1;
                self.expect(|t| matches!(t, Token::Sem), &["SEMICOLON"])?;
                break;
            }

            let (id, first_line) = self.expect_id()?;
            self.expect(|t| matches!(t, Token::Eq), &["EQUAL"])?;

            let records = match self.peek() {
                Some(Token::Keyword(_)) => vec![self.parse_simple_record()?],
                Some(Token::BrO) => {
                    self.pos += 1;
                    let mut records = vec![self.parse_simple_record()?];
                    while matches!(self.peek(), Some(Token::Keyword(_))) {
                        records.push(self.parse_simple_record()?);
                    }
                    self.expect(|t| matches!(t, Token::BrC), &["KEYWORD", "RPAR"])?;
                    records
                }
                _ => return Err(self.error(&["KEYWORD", "LPAR"])),
            };

            let sem = self.expect(|t| matches!(t, Token::Sem), &["SEMICOLON"])?;
            let last_line = self.line_of(sem);

            trace!("lowered entity #{}", id);
            if with_tree {
                entities.push(EntityInstance::new(id, records, (first_line, last_line)));
            } else {
                identifiers.push((id, first_line));
            }
        }

        Ok((entities, identifiers))
    }

    fn parse_simple_record(&mut self) -> Result<SimpleRecord> {
        let keyword = self.expect_keyword()?;
        self.expect(|t| matches!(t, Token::BrO), &["LPAR"])?;

        let attributes = if matches!(self.peek(), Some(Token::BrC)) {
            Vec::new()
        } else {
            self.parse_parameter_list()?
        };
        self.expect(|t| matches!(t, Token::BrC), &["COMMA", "RPAR"])?;

        Ok(SimpleRecord {
            keyword: keyword.to_string(),
            attributes,
        })
    }

    fn parse_parameter_list(&mut self) -> Result<Vec<AttributeValue>> {
        let mut params = vec![self.parse_parameter()?];
        while matches!(self.peek(), Some(Token::Com)) {
            self.pos += 1;
            params.push(self.parse_parameter()?);
        }
        Ok(params)
    }

    fn parse_parameter(&mut self) -> Result<AttributeValue> {
        let Some((token, _)) = self.tokens.get(self.pos).cloned() else {
            return Err(self.error(PARAMETER_EXPECTED));
        };

        match token {
            Token::Dol => {
                self.pos += 1;
                Ok(AttributeValue::Null)
            }
            Token::Star => {
                self.pos += 1;
                Ok(AttributeValue::Omitted)
            }
            Token::Integer(value) => {
                self.pos += 1;
                Ok(AttributeValue::Integer(value))
            }
            Token::Real(value) => {
                self.pos += 1;
                Ok(AttributeValue::Real(value))
            }
            Token::Id(id) => {
                self.pos += 1;
                Ok(AttributeValue::Ref(id))
            }
            Token::Enumeration(keyword) => {
                self.pos += 1;
                Ok(AttributeValue::Enum(keyword.to_string()))
            }
            Token::String(body) => {
                self.pos += 1;
                Ok(AttributeValue::String(decode_string(body)))
            }
            Token::Binary(raw) => {
                self.pos += 1;
                Ok(AttributeValue::Binary {
                    leading_bits: raw.as_bytes()[0] - b'0',
                    digits: raw[1..].to_string(),
                })
            }
            Token::Keyword(_) => {
                let keyword = self.expect_keyword()?;
                self.expect(|t| matches!(t, Token::BrO), &["LPAR"])?;
                let value = self.parse_parameter()?;
                self.expect(|t| matches!(t, Token::BrC), &["RPAR"])?;
                Ok(AttributeValue::Typed(keyword.to_string(), Box::new(value)))
            }
            Token::BrO => {
                self.pos += 1;
                if matches!(self.peek(), Some(Token::BrC)) {
                    self.pos += 1;
                    return Ok(AttributeValue::List(Vec::new()));
                }
                let items = self.parse_parameter_list()?;
                self.expect(|t| matches!(t, Token::BrC), &["COMMA", "RPAR"])?;
                Ok(AttributeValue::List(items))
            }
            _ => Err(self.error(PARAMETER_EXPECTED)),
        }
    }
}
