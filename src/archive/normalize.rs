//! Top-level header rewrites applied before a message is imported.
//!
//! Only the header block is touched. The body and every header that is not
//! rewritten are passed through byte for byte.

use std::ops::Range;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Wrap a bare Message-ID value in angle brackets
    pub fix_msgid: bool,
    /// Declare `text/quoted-printable` bodies as `text/plain`
    pub replace_quoted_printable: bool,
}

impl NormalizeOptions {
    pub fn is_noop(&self) -> bool {
        !self.fix_msgid && !self.replace_quoted_printable
    }
}

pub fn normalize_message(raw: Vec<u8>, options: NormalizeOptions) -> Vec<u8> {
    if options.is_noop() {
        return raw;
    }

    let header_len = header_block_len(&raw);
    let mut replacements: Vec<(Range<usize>, Vec<u8>)> = Vec::new();
    let mut msgid_seen = false;
    let mut content_type_seen = false;

    for field in split_fields(&raw[..header_len]) {
        let bytes = &raw[field.clone()];
        let name = field_name(bytes);

        if !msgid_seen && name.eq_ignore_ascii_case(b"message-id") {
            msgid_seen = true;
            if options.fix_msgid {
                if let Some(line) = fix_message_id(bytes) {
                    replacements.push((field, line));
                }
            }
        } else if !content_type_seen && name.eq_ignore_ascii_case(b"content-type") {
            content_type_seen = true;
            if options.replace_quoted_printable {
                if let Some(line) = replace_quoted_printable(bytes) {
                    replacements.push((field, line));
                }
            }
        }
    }

    if replacements.is_empty() {
        return raw;
    }

    let mut out = Vec::with_capacity(raw.len() + 2);
    let mut pos = 0;
    for (range, line) in replacements {
        out.extend_from_slice(&raw[pos..range.start]);
        out.extend_from_slice(&line);
        pos = range.end;
    }
    out.extend_from_slice(&raw[pos..]);
    out
}

fn fix_message_id(field: &[u8]) -> Option<Vec<u8>> {
    let value = field_value(field);
    if value.is_empty() || (value.starts_with('<') && value.ends_with('>')) {
        return None;
    }

    let inner = value.trim_matches(|c: char| c == '<' || c == '>').trim();
    if inner.is_empty() {
        return None;
    }

    Some(rebuild(field, &format!("<{}>", inner)))
}

fn replace_quoted_printable(field: &[u8]) -> Option<Vec<u8>> {
    let value = field_value(field);
    let media_end = value.find(';').unwrap_or(value.len());
    if !value[..media_end]
        .trim()
        .eq_ignore_ascii_case("text/quoted-printable")
    {
        return None;
    }

    Some(rebuild(field, &format!("text/plain{}", &value[media_end..])))
}

/// Header line with the original field name and line ending around a new value
fn rebuild(field: &[u8], value: &str) -> Vec<u8> {
    let mut line = field_name(field).to_vec();
    line.extend_from_slice(b": ");
    line.extend_from_slice(value.as_bytes());
    line.extend_from_slice(line_ending(field));
    line
}

/// Length of the header block, excluding the blank separator line.
fn header_block_len(raw: &[u8]) -> usize {
    let mut pos = 0;
    while pos < raw.len() {
        let end = next_line_end(raw, pos);
        let line = &raw[pos..end];
        if line == b"\n" || line == b"\r\n" {
            return pos;
        }
        pos = end;
    }
    raw.len()
}

/// Header fields with their folded continuation lines.
fn split_fields(header: &[u8]) -> Vec<Range<usize>> {
    let mut fields: Vec<Range<usize>> = Vec::new();
    let mut pos = 0;

    while pos < header.len() {
        let end = next_line_end(header, pos);
        let continuation = matches!(header[pos], b' ' | b'\t');
        match fields.last_mut() {
            Some(last) if continuation => last.end = end,
            _ => fields.push(pos..end),
        }
        pos = end;
    }

    fields
}

fn next_line_end(raw: &[u8], from: usize) -> usize {
    raw[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|i| from + i + 1)
        .unwrap_or(raw.len())
}

fn field_name(field: &[u8]) -> &[u8] {
    match field.iter().position(|&b| b == b':') {
        Some(colon) => {
            let mut name = &field[..colon];
            while let [rest @ .., last] = name {
                if !last.is_ascii_whitespace() {
                    break;
                }
                name = rest;
            }
            name
        }
        None => &[],
    }
}

/// Unfolded, trimmed value of a header field
fn field_value(field: &[u8]) -> String {
    let Some(colon) = field.iter().position(|&b| b == b':') else {
        return String::new();
    };
    String::from_utf8_lossy(&field[colon + 1..])
        .replace("\r\n", "")
        .replace('\n', "")
        .trim()
        .to_string()
}

fn line_ending(field: &[u8]) -> &'static [u8] {
    if field.ends_with(b"\r\n") {
        b"\r\n"
    } else if field.ends_with(b"\n") {
        b"\n"
    } else {
        b""
    }
}
