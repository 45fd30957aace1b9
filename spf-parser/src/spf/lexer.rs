use logos::Logos;

/// Token alphabet of the ISO-10303-21 clear-text encoding.
///
/// Comments never reach the lexer; the preprocessor has already rewritten
/// them to spaces. String bodies are kept raw (outer apostrophes stripped)
/// so that the directive sub-recognizer and the decoder can work on the
/// original spelling.
#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Token<'src> {
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Whitespace,
    #[token("=")]
    Eq,
    #[token(";")]
    Sem,
    #[token("(")]
    BrO,
    #[token(")")]
    BrC,
    #[token(",")]
    Com,
    #[token("$")]
    Dol,
    #[token("*")]
    Star,
    #[token("HEADER")]
    Header,
    #[token("DATA")]
    Data,
    #[token("ENDSEC")]
    Endsec,
    #[token("ISO-10303-21")]
    StartTag,
    #[token("END-ISO-10303-21")]
    EndTag,
    #[regex(r"#[0-9]+", |lex| lex.slice()[1..].parse::<i64>().ok())]
    Id(i64),
    #[regex(r"[A-Z][0-9A-Z_]*")]
    Keyword(&'src str),
    #[regex(r"\.[A-Z][0-9A-Z_]*\.", |lex| lex.slice().trim_matches('.'))]
    Enumeration(&'src str),
    #[regex(r"'([^']|'')*'", |lex| { let s = lex.slice(); &s[1..s.len() - 1] })]
    String(&'src str),
    #[regex(r#""[0-3][0-9A-F]*""#, |lex| { let s = lex.slice(); &s[1..s.len() - 1] })]
    Binary(&'src str),
    #[regex(r"[+-]?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Integer(i64),
    #[regex(r"[+-]?[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Real(f64),
}

impl Token<'_> {
    /// Terminal name as reported in the `expected` set of syntax errors.
    pub fn name(&self) -> &'static str {
        match self {
            Token::Whitespace => "WS",
            Token::Eq => "EQUAL",
            Token::Sem => "SEMICOLON",
            Token::BrO => "LPAR",
            Token::BrC => "RPAR",
            Token::Com => "COMMA",
            Token::Dol => "NONE",
            Token::Star => "STAR",
            Token::Header => "HEADER",
            Token::Data => "DATA",
            Token::Endsec => "ENDSEC",
            Token::StartTag => "ISO-10303-21",
            Token::EndTag => "END-ISO-10303-21",
            Token::Id(_) => "ID",
            Token::Keyword(_) => "KEYWORD",
            Token::Enumeration(_) => "ENUMERATION",
            Token::String(_) => "STRING",
            Token::Binary(_) => "BINARY",
            Token::Integer(_) => "INT",
            Token::Real(_) => "REAL",
        }
    }
}

/// Byte offsets of line starts, for 1-based line/column lookups.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(src: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            src.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        LineIndex { starts }
    }

    /// Returns the 1-based line and character column of a byte offset.
    pub fn line_col(&self, src: &str, offset: usize) -> (u32, u32) {
        let line = self.starts.partition_point(|&s| s <= offset);
        let column = src[self.starts[line - 1]..offset].chars().count() + 1;
        (line as u32, column as u32)
    }

    /// Position just past the last character, for end-of-input reports.
    pub fn end_position(&self, src: &str) -> (u32, u32) {
        self.line_col(src, src.len())
    }

    /// Text of the given 1-based line, without its terminating newline.
    pub fn line_text<'a>(&self, src: &'a str, lineno: u32) -> &'a str {
        let lineno = lineno as usize;
        if lineno == 0 || lineno > self.starts.len() {
            return "";
        }
        let start = self.starts[lineno - 1];
        let end = match self.starts.get(lineno) {
            Some(&next) => next - 1,
            None => src.len(),
        };
        &src[start..end]
    }
}

/// Checks the control directives of a string literal body.
///
/// Accepted forms are `\\`, `''`, `\*\`, `\S\c`, `\Pc\`, `\X\hh`,
/// `\X2\…\X0\` (groups of 4 hex digits) and `\X4\…\X0\` (groups of 8).
/// All other body characters must be printable ASCII; anything outside the
/// clear-text alphabet has to be spelled through a directive.
///
/// Returns the byte offset of the first offending character.
pub(crate) fn scan_control_directives(body: &str) -> std::result::Result<(), usize> {
    let b = body.as_bytes();
    let mut i = 0;

    while i < b.len() {
        if b[i] != b'\\' {
            if (0x20..=0x7E).contains(&b[i]) {
                i += 1;
                continue;
            }
            return Err(i);
        }

        match b.get(i + 1) {
            Some(b'\\') => i += 2,
            Some(b'*') if b.get(i + 2) == Some(&b'\\') => i += 3,
            Some(b'S') if b.get(i + 2) == Some(&b'\\') && i + 3 < b.len() => i += 4,
            Some(b'P')
                if b.get(i + 2).is_some_and(|c| c.is_ascii_uppercase())
                    && b.get(i + 3) == Some(&b'\\') =>
            {
                i += 4
            }
            Some(b'X') => match b.get(i + 2) {
                Some(b'\\') if hex_run(b, i + 3, 2) => i += 5,
                Some(b'2') if b.get(i + 3) == Some(&b'\\') => {
                    i = scan_extended(b, i + 4, 4).ok_or(i)?;
                }
                Some(b'4') if b.get(i + 3) == Some(&b'\\') => {
                    i = scan_extended(b, i + 4, 8).ok_or(i)?;
                }
                _ => return Err(i),
            },
            _ => return Err(i),
        }
    }

    Ok(())
}

/// Consumes hex groups after `\X2\`/`\X4\` up to and including the `\X0\`
/// terminator. Returns the offset past the terminator.
fn scan_extended(b: &[u8], mut i: usize, group: usize) -> Option<usize> {
    loop {
        if b[i..].starts_with(br"\X0\") {
            return Some(i + 4);
        }
        if !hex_run(b, i, group) {
            return None;
        }
        i += group;
    }
}

fn hex_run(b: &[u8], start: usize, len: usize) -> bool {
    start + len <= b.len()
        && b[start..start + len]
            .iter()
            .all(|c| c.is_ascii_digit() || (b'A'..=b'F').contains(c))
}

/// Decodes a raw string body: `''` unfolds to `'` and `\\` to `\`.
/// Control directives are preserved verbatim.
pub(crate) fn decode_string(body: &str) -> String {
    let b = body.as_bytes();
    let mut out = String::with_capacity(b.len());
    let mut i = 0;

    while i < b.len() {
        if b[i] == b'\'' && b.get(i + 1) == Some(&b'\'') {
            out.push('\'');
            i += 2;
        } else if b[i] == b'\\' && b.get(i + 1) == Some(&b'\\') {
            out.push('\\');
            i += 2;
        } else {
            out.push(b[i] as char);
            i += 1;
        }
    }

    out
}
