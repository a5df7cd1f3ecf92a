/// Replaces every literal (string, integer, decimal, real, binary, NULL) in
/// `statement` with a single `?` placeholder (spec §4.1 Canonicalization).
/// Empty strings become `"?"`. The result is used only for logging/metrics,
/// never for routing, so it doesn't need to preserve whitespace exactly.
///
/// Grounded on the tokenizing approach sketched in the teacher's
/// `sql::normalize::QueryNormalizer`, but as a complete single-pass scanner
/// rather than the unfinished `todo!()` stubs it left behind.
pub fn canonicalize(statement: &str) -> String {
    let bytes = statement.as_bytes();
    let mut out = String::with_capacity(statement.len());
    let mut i = 0;
    let n = bytes.len();

    while i < n {
        let c = bytes[i] as char;
        match c {
            '\'' | '"' | '`' => {
                let quote = bytes[i];
                let is_identifier_quote = quote == b'`';
                let start = i;
                i += 1;
                while i < n {
                    if bytes[i] == b'\\' && !is_identifier_quote && i + 1 < n {
                        i += 2;
                        continue;
                    }
                    if bytes[i] == quote {
                        if i + 1 < n && bytes[i + 1] == quote {
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
                if is_identifier_quote {
                    out.push_str(&statement[start..i.min(n)]);
                } else if i - start <= 2 {
                    out.push_str("\"?\"");
                } else {
                    out.push('?');
                }
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < n && (bytes[i].is_ascii_digit() || bytes[i] == b'.' || bytes[i] == b'e' || bytes[i] == b'E'
                    || ((bytes[i] == b'+' || bytes[i] == b'-') && i > start && (bytes[i - 1] == b'e' || bytes[i - 1] == b'E')))
                {
                    i += 1;
                }
                out.push('?');
            }
            '0' if i + 1 < n && (bytes[i + 1] == b'x' || bytes[i + 1] == b'X') => {
                i += 2;
                while i < n && bytes[i].is_ascii_hexdigit() {
                    i += 1;
                }
                out.push('?');
            }
            _ => {
                if is_word_start(bytes, i) && matches_keyword_ci(bytes, i, "NULL") {
                    out.push('?');
                    i += 4;
                } else if is_word_start(bytes, i) && matches_keyword_ci(bytes, i, "TRUE") {
                    out.push('?');
                    i += 4;
                } else if is_word_start(bytes, i) && matches_keyword_ci(bytes, i, "FALSE") {
                    out.push('?');
                    i += 5;
                } else {
                    out.push(c);
                    i += 1;
                }
            }
        }
    }

    out
}

fn is_word_start(bytes: &[u8], i: usize) -> bool {
    i == 0 || !(bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_')
}

fn matches_keyword_ci(bytes: &[u8], i: usize, kw: &str) -> bool {
    let kwb = kw.as_bytes();
    if i + kwb.len() > bytes.len() {
        return false;
    }
    let next_ok = i + kwb.len() == bytes.len()
        || !(bytes[i + kwb.len()].is_ascii_alphanumeric() || bytes[i + kwb.len()] == b'_');
    next_ok
        && bytes[i..i + kwb.len()]
            .iter()
            .zip(kwb.iter())
            .all(|(a, b)| a.to_ascii_uppercase() == *b)
}
