//! Text-layer reader for PDF content streams.
//!
//! This is not a PDF parser. It finds `stream ... endstream` bodies that are
//! either unfiltered or plain `/FlateDecode`, tokenizes them, and keeps the
//! strings shown by `Tj`, `TJ`, `'` and `"` together with a count of path
//! operators. That is enough for keyword inference on plan sheets exported
//! with a text layer.

use std::io::Read;
use std::sync::LazyLock;

use flate2::read::ZlibDecoder;
use regex::bytes::Regex;

static STREAM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s-u)<<((?:[^<>]|<<[^<>]*>>)*)>>\s*stream\r?\n(.*?)\r?\n?endstream")
        .expect("invalid stream regex")
});

static PAGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?-u)/Type\s*/Page\b").expect("invalid page regex"));

static FLATE_ONLY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?-u)/Filter\s*(?:/FlateDecode|\[\s*/FlateDecode\s*\])")
        .expect("invalid filter regex")
});

pub const PDF_MAGIC: &[u8] = b"%PDF";

/// Upper bound on one inflated content stream.
const MAX_INFLATED_STREAM_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentScan {
    pub text_lines: Vec<String>,
    pub page_count: u32,
    pub line_ops: u64,
    pub rect_ops: u64,
    pub inflated_streams: u32,
    pub filtered_streams: u32,
}

impl ContentScan {
    pub fn full_text(&self) -> String {
        self.text_lines.join("\n")
    }
}

pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    let start = bytes.iter().position(|byte| !byte.is_ascii_whitespace()).unwrap_or(bytes.len());
    bytes[start..].starts_with(PDF_MAGIC)
}

pub fn scan_document(bytes: &[u8]) -> ContentScan {
    let mut scan = ContentScan {
        page_count: PAGE_REGEX.find_iter(bytes).count() as u32,
        ..ContentScan::default()
    };

    for captures in STREAM_REGEX.captures_iter(bytes) {
        let dictionary = captures.get(1).map(|m| m.as_bytes()).unwrap_or_default();
        let body = captures.get(2).map(|m| m.as_bytes()).unwrap_or_default();
        if !contains(dictionary, b"/Filter") {
            interpret(&tokenize(body), &mut scan);
            continue;
        }
        match inflate_content(dictionary, body) {
            Some(content) => {
                scan.inflated_streams += 1;
                interpret(&tokenize(&content), &mut scan);
            }
            None => scan.filtered_streams += 1,
        }
    }

    scan
}

/// Inflates a page content stream compressed with `/FlateDecode` alone.
/// Images, fonts, predictor-encoded and multi-filter streams are left alone.
fn inflate_content(dictionary: &[u8], body: &[u8]) -> Option<Vec<u8>> {
    if !FLATE_ONLY_REGEX.is_match(dictionary)
        || [&b"/Subtype"[..], b"/Length1", b"/DecodeParms"]
            .iter()
            .any(|key| contains(dictionary, key))
    {
        return None;
    }

    let mut content = Vec::new();
    let read =
        ZlibDecoder::new(body).take(MAX_INFLATED_STREAM_BYTES).read_to_end(&mut content);
    // A trailing newline trimmed off the body can cut the checksum; keep what inflated.
    match read {
        Ok(_) => Some(content),
        Err(_) if !content.is_empty() => Some(content),
        Err(_) => None,
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Str(String),
    ArrayStart,
    ArrayEnd,
    Word(String),
}

fn is_delimiter(byte: u8) -> bool {
    matches!(byte, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn tokenize(content: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut index = 0;

    while index < content.len() {
        let byte = content[index];
        match byte {
            b'%' => {
                while index < content.len() && content[index] != b'\n' && content[index] != b'\r' {
                    index += 1;
                }
            }
            b'(' => {
                let (literal, next) = read_literal(content, index + 1);
                tokens.push(Token::Str(literal));
                index = next;
            }
            b'[' => {
                tokens.push(Token::ArrayStart);
                index += 1;
            }
            b']' => {
                tokens.push(Token::ArrayEnd);
                index += 1;
            }
            b'<' if content.get(index + 1) == Some(&b'<') => {
                tokens.push(Token::Word("<<".to_string()));
                index += 2;
            }
            b'>' if content.get(index + 1) == Some(&b'>') => {
                tokens.push(Token::Word(">>".to_string()));
                index += 2;
            }
            b'<' => {
                let (literal, next) = read_hex(content, index + 1);
                tokens.push(Token::Str(literal));
                index = next;
            }
            _ if byte.is_ascii_whitespace() => index += 1,
            _ => {
                let start = index;
                index += 1;
                while index < content.len()
                    && !content[index].is_ascii_whitespace()
                    && !is_delimiter(content[index])
                {
                    index += 1;
                }
                tokens.push(Token::Word(String::from_utf8_lossy(&content[start..index]).into()));
            }
        }
    }

    tokens
}

fn read_literal(content: &[u8], mut index: usize) -> (String, usize) {
    let mut depth = 1usize;
    let mut out = Vec::new();

    while index < content.len() {
        let byte = content[index];
        index += 1;
        match byte {
            b'\\' => {
                let Some(&escaped) = content.get(index) else { break };
                index += 1;
                match escaped {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'b' | b'f' => {}
                    b'0'..=b'7' => {
                        let mut value = u32::from(escaped - b'0');
                        for _ in 0..2 {
                            match content.get(index) {
                                Some(&digit @ b'0'..=b'7') => {
                                    value = value * 8 + u32::from(digit - b'0');
                                    index += 1;
                                }
                                _ => break,
                            }
                        }
                        out.push((value & 0xff) as u8);
                    }
                    b'\r' | b'\n' => {}
                    other => out.push(other),
                }
            }
            b'(' => {
                depth += 1;
                out.push(byte);
            }
            b')' => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
                out.push(byte);
            }
            _ => out.push(byte),
        }
    }

    (String::from_utf8_lossy(&out).into_owned(), index)
}

fn read_hex(content: &[u8], mut index: usize) -> (String, usize) {
    let mut digits = Vec::new();
    while index < content.len() {
        let byte = content[index];
        index += 1;
        if byte == b'>' {
            break;
        }
        if byte.is_ascii_hexdigit() {
            digits.push(byte);
        }
    }
    if digits.len() % 2 == 1 {
        digits.push(b'0');
    }

    let bytes: Vec<u8> = digits
        .chunks(2)
        .filter_map(|pair| std::str::from_utf8(pair).ok())
        .filter_map(|pair| u8::from_str_radix(pair, 16).ok())
        .collect();
    (String::from_utf8_lossy(&bytes).into_owned(), index)
}

fn interpret(tokens: &[Token], scan: &mut ContentScan) {
    let mut pending: Vec<&str> = Vec::new();
    let mut line = String::new();

    let flush = |line: &mut String, scan: &mut ContentScan| {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            scan.text_lines.push(trimmed.to_string());
        }
        line.clear();
    };

    for token in tokens {
        match token {
            Token::Str(value) => pending.push(value),
            Token::ArrayStart | Token::ArrayEnd => {}
            Token::Word(word) => match word.as_str() {
                "Tj" | "TJ" => {
                    line.push_str(&pending.concat());
                    pending.clear();
                }
                "'" | "\"" => {
                    flush(&mut line, scan);
                    line.push_str(&pending.concat());
                    pending.clear();
                }
                "Td" | "TD" | "T*" | "Tm" | "ET" => flush(&mut line, scan),
                "l" => scan.line_ops += 1,
                "re" => scan.rect_ops += 1,
                other if other.parse::<f64>().is_ok() => {}
                _ => pending.clear(),
            },
        }
    }

    flush(&mut line, scan);
}
