//! Descriptive-metadata helpers.
//!
//! The pipeline only ever needs three things from the XML sidecars it
//! handles: the text of a named leaf element (MODS `identifier`, DC
//! `title`, DC `identifier`), entity escaping for the OPEX documents it
//! emits, and stripping the `<?xml ...?>` declaration before embedding
//! a sidecar into another document. This is a small forward scanner
//! with exactly that contract: namespace prefixes are ignored
//! (`mods:identifier` and `identifier` match the same query),
//! attributes and comments are tolerated, and only leaf text is
//! returned. CDATA sections are not recognized.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("metadata file {} not found", .0.display())]
    FileNotFound(PathBuf),
    #[error("no `{element}` element with text in {}", .path.display())]
    FieldNotFound { path: PathBuf, element: &'static str },
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// First non-empty text value of `element` in the file at `path`.
///
/// # Errors
///
/// Returns `FileNotFound` / `Read` when the file is unavailable and
/// `FieldNotFound` when no matching element carries text.
pub fn extract_field(path: &Path, element: &'static str) -> Result<String, XmlError> {
    let content = read_metadata(path)?;
    extract_all(&content, element)
        .into_iter()
        .next()
        .ok_or_else(|| XmlError::FieldNotFound {
            path: path.to_path_buf(),
            element,
        })
}

/// Every non-empty text value of `element` in the file at `path`, in
/// document order. Missing elements are an empty list, not an error.
///
/// # Errors
///
/// Returns `FileNotFound` / `Read` when the file is unavailable.
pub fn extract_fields(path: &Path, element: &str) -> Result<Vec<String>, XmlError> {
    let content = read_metadata(path)?;
    Ok(extract_all(&content, element))
}

fn read_metadata(path: &Path) -> Result<String, XmlError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            Err(XmlError::FileNotFound(path.to_path_buf()))
        }
        Err(err) => Err(XmlError::Read {
            path: path.to_path_buf(),
            source: err,
        }),
    }
}

/// Scan `content` for leaf elements named `element` (any namespace
/// prefix) and return their trimmed, entity-decoded text values.
#[must_use]
pub fn extract_all(content: &str, element: &str) -> Vec<String> {
    let mut values = Vec::new();
    let bytes = content.as_bytes();
    let mut pos = 0;

    while let Some(offset) = content[pos..].find('<') {
        let start = pos + offset;
        let rest = &content[start..];

        // Skip declarations, comments, DOCTYPE and friends.
        if rest.starts_with("<?") {
            pos = content[start..]
                .find("?>")
                .map_or(content.len(), |i| start + i + 2);
            continue;
        }
        if rest.starts_with("<!--") {
            pos = content[start..]
                .find("-->")
                .map_or(content.len(), |i| start + i + 3);
            continue;
        }
        if rest.starts_with("<!") || rest.starts_with("</") {
            pos = find_tag_end(rest).map_or(content.len(), |i| start + i + 1);
            continue;
        }

        let Some(tag_end) = find_tag_end(rest) else {
            break;
        };
        let tag_end = start + tag_end;
        let tag = &content[start + 1..tag_end];
        let self_closing = tag.ends_with('/');
        let name = tag
            .split([' ', '\t', '\r', '\n', '/'])
            .next()
            .unwrap_or_default();

        if !local_name_matches(name, element) || self_closing {
            pos = tag_end + 1;
            continue;
        }

        // Leaf text: everything up to the next markup boundary.
        let text_start = tag_end + 1;
        let text_end = content[text_start..]
            .find('<')
            .map_or(bytes.len(), |i| text_start + i);
        let text = unescape_text(content[text_start..text_end].trim());
        if !text.is_empty() {
            values.push(text);
        }
        pos = text_end;
    }

    values
}

// A `>` inside a quoted attribute value does not end the tag.
fn find_tag_end(rest: &str) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, byte) in rest.bytes().enumerate() {
        match quote {
            Some(open) if byte == open => quote = None,
            Some(_) => {}
            None => match byte {
                b'"' | b'\'' => quote = Some(byte),
                b'>' => return Some(i),
                _ => {}
            },
        }
    }
    None
}

fn local_name_matches(tag_name: &str, element: &str) -> bool {
    match tag_name.rsplit_once(':') {
        Some((_, local)) => local == element,
        None => tag_name == element,
    }
}

/// Escape `value` for use as XML element text.
#[must_use]
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

/// Escape `value` for use inside a double-quoted XML attribute.
#[must_use]
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// Decode the five named entities plus numeric character references.
#[must_use]
pub fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                if let Some(ch) = decode_char_ref(entity) {
                    out.push(ch);
                } else {
                    // Not an entity we know; keep the raw text.
                    out.push_str(&tail[..=semi]);
                }
            }
        }
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    out
}

fn decode_char_ref(entity: &str) -> Option<char> {
    let digits = entity.strip_prefix('#')?;
    let code = if let Some(hex) = digits.strip_prefix(['x', 'X']) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse().ok()?
    };
    char::from_u32(code)
}

/// Drop a leading `<?xml ...?>` declaration so the document can be
/// embedded inside another one.
#[must_use]
pub fn strip_declaration(content: &str) -> &str {
    let trimmed = content.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return trimmed[end + 2..].trim_start();
        }
    }
    trimmed
}
