//! Low-level PDF object serializer
//!
//! Stateless rendering of `lopdf` values into PDF syntax. Every indirect
//! reference written is reported to the cross-reference tracker, which
//! resolves it later (either a rewritten object or a flushed original).

use lopdf::{Dictionary, Object, ObjectId, Stream, StringFormat};

use crate::xref::XrefTracker;

/// Render a number the way content streams expect: integers without a
/// fraction, otherwise at most six decimals with trailing zeros trimmed
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let mut text = format!("{:.6}", value);
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    if text == "-0" {
        text = "0".to_string();
    }
    text
}

#[inline]
fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// `/Name`, escaping delimiters, whitespace, `#` and non-ASCII as `#xx`
pub fn write_name(buf: &mut Vec<u8>, name: &[u8]) {
    buf.push(b'/');
    for &b in name {
        if (b'!'..=b'~').contains(&b) && !is_delimiter(b) && b != b'#' {
            buf.push(b);
        } else {
            buf.extend_from_slice(format!("#{:02X}", b).as_bytes());
        }
    }
}

/// Literal string in parentheses with backslash escapes
pub fn write_string(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.push(b'(');
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                buf.push(b'\\');
                buf.push(b);
            }
            b'\n' => buf.extend_from_slice(b"\\n"),
            b'\r' => buf.extend_from_slice(b"\\r"),
            b'\t' => buf.extend_from_slice(b"\\t"),
            0x08 => buf.extend_from_slice(b"\\b"),
            0x0c => buf.extend_from_slice(b"\\f"),
            0x20..=0x7e => buf.push(b),
            _ => buf.extend_from_slice(format!("\\{:03o}", b).as_bytes()),
        }
    }
    buf.push(b')');
}

pub fn write_hex_string(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.push(b'<');
    for &b in bytes {
        buf.extend_from_slice(format!("{:02X}", b).as_bytes());
    }
    buf.push(b'>');
}

pub fn write_reference(buf: &mut Vec<u8>, id: ObjectId, tracker: &mut XrefTracker) {
    tracker.reference(id);
    buf.extend_from_slice(format!("{} {} R", id.0, id.1).as_bytes());
}

pub fn write_object(buf: &mut Vec<u8>, obj: &Object, tracker: &mut XrefTracker) {
    match obj {
        Object::Null => buf.extend_from_slice(b"null"),
        Object::Boolean(value) => {
            buf.extend_from_slice(if *value { b"true" as &[u8] } else { b"false" })
        }
        Object::Integer(value) => buf.extend_from_slice(value.to_string().as_bytes()),
        Object::Real(value) => buf.extend_from_slice(format_number(*value as f64).as_bytes()),
        Object::Name(name) => write_name(buf, name),
        Object::String(bytes, StringFormat::Literal) => write_string(buf, bytes),
        Object::String(bytes, StringFormat::Hexadecimal) => write_hex_string(buf, bytes),
        Object::Array(items) => {
            buf.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(b' ');
                }
                write_object(buf, item, tracker);
            }
            buf.push(b']');
        }
        Object::Dictionary(dict) => write_dictionary(buf, dict, tracker),
        Object::Stream(stream) => write_stream(buf, stream, tracker),
        Object::Reference(id) => write_reference(buf, *id, tracker),
    }
}

/// Keys keep the order they have in the source dictionary
pub fn write_dictionary(buf: &mut Vec<u8>, dict: &Dictionary, tracker: &mut XrefTracker) {
    buf.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        buf.push(b' ');
        write_name(buf, key);
        buf.push(b' ');
        write_object(buf, value, tracker);
    }
    buf.extend_from_slice(b" >>");
}

/// Stream with `/Length` taken from the content actually written
pub fn write_stream(buf: &mut Vec<u8>, stream: &Stream, tracker: &mut XrefTracker) {
    buf.extend_from_slice(b"<<");
    for (key, value) in stream.dict.iter() {
        if key.as_slice() == b"Length" {
            continue;
        }
        buf.push(b' ');
        write_name(buf, key);
        buf.push(b' ');
        write_object(buf, value, tracker);
    }
    buf.extend_from_slice(format!(" /Length {} >>\nstream\n", stream.content.len()).as_bytes());
    buf.extend_from_slice(&stream.content);
    buf.extend_from_slice(b"\nendstream");
}

/// Full indirect object definition `N G obj ... endobj`
pub fn write_indirect(buf: &mut Vec<u8>, id: ObjectId, obj: &Object, tracker: &mut XrefTracker) {
    buf.extend_from_slice(format!("{} {} obj\n", id.0, id.1).as_bytes());
    write_object(buf, obj, tracker);
    buf.extend_from_slice(b"\nendobj\n");
}
