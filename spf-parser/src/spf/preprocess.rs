use std::sync::OnceLock;

use regex::Regex;

/// Rewrites every `/* … */` span to spaces, keeping newlines, so token
/// line/column data keeps referring to the raw source. Comment openers
/// inside string and binary literals are left untouched.
///
/// Returns the byte offset of the opening `/*` if a comment is left
/// unterminated.
pub(crate) fn strip_comments(content: &str) -> std::result::Result<String, usize> {
    #[derive(PartialEq)]
    enum State {
        Normal,
        String,
        Binary,
        Comment,
    }

    let bytes = content.as_bytes();
    let mut out = bytes.to_vec();
    let mut state = State::Normal;
    let mut comment_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match state {
            State::Normal => {
                if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
                    comment_start = i;
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    state = State::Comment;
                    i += 2;
                    continue;
                }
                match bytes[i] {
                    b'\'' => state = State::String,
                    b'"' => state = State::Binary,
                    _ => {}
                }
                i += 1;
            }
            State::String => {
                if bytes[i] == b'\'' {
                    state = State::Normal;
                }
                i += 1;
            }
            State::Binary => {
                if bytes[i] == b'"' {
                    state = State::Normal;
                }
                i += 1;
            }
            State::Comment => {
                if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    state = State::Normal;
                    i += 2;
                    continue;
                }
                if bytes[i] != b'\n' {
                    out[i] = b' ';
                }
                i += 1;
            }
        }
    }

    if state == State::Comment {
        return Err(comment_start);
    }

    // Comment spans are blanked wholesale, so multi-byte characters inside
    // them cannot be split.
    String::from_utf8(out).map_err(|_| comment_start)
}

static HEADER_SLICE: OnceLock<Regex> = OnceLock::new();

/// Extracts the HEADER section and wraps it into a minimal synthetic file,
/// for parses that skip the DATA section entirely. Returns `None` if the
/// input has no recognizable HEADER.
pub(crate) fn slice_header(content: &str) -> Option<String> {
    let re = HEADER_SLICE
        .get_or_init(|| Regex::new(r"(?is)ISO-10303-21;\s*HEADER;(.*?)ENDSEC;").unwrap());
    let captures = re.captures(content)?;
    Some(format!(
        "ISO-10303-21;HEADER;{}ENDSEC;DATA;ENDSEC;END-ISO-10303-21;",
        &captures[1]
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_single_line_comment() {
        let out = strip_comments("DATA; /* note */ #1").unwrap();
        assert_eq!(out, "DATA;            #1");
        assert_eq!(out.len(), "DATA; /* note */ #1".len());
    }

    #[test]
    fn test_multi_line_comment_keeps_newlines() {
        let src = "A /* one\ntwo\nthree */ B";
        let out = strip_comments(src).unwrap();
        assert_eq!(out, "A       \n   \n         B");
        assert_eq!(out.matches('\n').count(), 2);
    }

    #[test]
    fn test_comment_opener_inside_string() {
        let src = "#1=X('/* not a comment */');";
        assert_eq!(strip_comments(src).unwrap(), src);
    }

    #[test]
    fn test_comment_opener_inside_binary() {
        let src = "#1=X(\"0AB\");/*x*/";
        assert_eq!(strip_comments(src).unwrap(), "#1=X(\"0AB\");     ");
    }

    #[test]
    fn test_unterminated_comment() {
        assert_eq!(strip_comments("abc /* never closed"), Err(4));
    }

    #[test]
    fn test_star_without_slash_stays() {
        let src = "#1=X(*);";
        assert_eq!(strip_comments(src).unwrap(), src);
    }

    #[test]
    fn test_slice_header() {
        let src = "ISO-10303-21;\nHEADER;\nFILE_DESCRIPTION((''),'2;1');\nENDSEC;\nDATA;\nENDSEC;\nEND-ISO-10303-21;";
        let sliced = slice_header(src).unwrap();
        assert_eq!(
            sliced,
            "ISO-10303-21;HEADER;\nFILE_DESCRIPTION((''),'2;1');\nENDSEC;DATA;ENDSEC;END-ISO-10303-21;"
        );
    }

    #[test]
    fn test_slice_header_case_insensitive() {
        let src = "iso-10303-21; header; FILE_SCHEMA(('IFC4')); endsec; DATA;ENDSEC;END-ISO-10303-21;";
        assert!(slice_header(src).is_some());
    }

    #[test]
    fn test_slice_header_missing() {
        assert!(slice_header("DATA;ENDSEC;").is_none());
    }
}
