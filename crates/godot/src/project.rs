//! §4.5 project-config codec — `ECFG` binary ⇄ INI-style text (`project.godot`/`export_presets.cfg`).
//!
//! Unlike the resource formats, this one is genuinely symmetric: §8's round-trip property
//! (`decode_binary ∘ encode_text ∘ parse_text ∘ encode_binary`) requires both directions to exist,
//! so this module carries a text *parser* the other format modules in this crate deliberately don't.

use std::fmt::Write as _;

use pakrat_core::data::{DataCursor, Endian};
use pakrat_core::stream::{ByteWriter, ReadExt};

use crate::engine::EngineGeneration;
use crate::error::{corrupt, Error, Result};
use crate::math::RealWidth;
use crate::variant::{self, Context, StringPool, Variant};

const MAGIC: [u8; 4] = *b"ECFG";

/// A parsed project configuration: a flat key/value map plus the engine generation its values
/// were decoded under (needed to re-encode the same Variant tag table on a round trip).
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectConfig {
    pub generation: EngineGeneration,
    /// Insertion order from the source; `encode_text` re-sorts within each section per §4.5, but
    /// `encode_binary` preserves this order verbatim.
    pub entries: Vec<(String, Variant)>,
}

impl ProjectConfig {
    #[must_use]
    pub fn new(generation: EngineGeneration) -> Self {
        Self { generation, entries: Vec::new() }
    }

    pub fn set(&mut self, key: impl Into<String>, value: Variant) {
        let key = key.into();
        if let Some(existing) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Variant> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Decodes a binary `ECFG` stream.
///
/// # Errors
/// [`Error::BadMagic`] if the stream doesn't start with `ECFG`.
pub fn decode_binary<R: ReadExt>(reader: &mut R, generation: EngineGeneration) -> Result<ProjectConfig> {
    let magic = reader.read_exact::<4>()?;
    if magic != MAGIC {
        return Err(Error::BadMagic { expected: MAGIC, found: magic });
    }

    let count = reader.read_u32()? as usize;
    let mut entries = Vec::with_capacity(count);
    let mut pool = StringPool::new();
    for _ in 0..count {
        let key_len = reader.read_u32()? as usize;
        let key = reader.read_string(key_len)?;
        let value_len = reader.read_u32()? as usize;
        let value_bytes = reader.read_slice(value_len)?;
        let mut cursor = DataCursor::new(value_bytes, Endian::Little);
        let mut ctx = Context::new(generation, RealWidth::F32).with_pool(&mut pool);
        let value = variant::decode(&mut cursor, &mut ctx)
            .map_err(|_| corrupt(format!("project config entry '{key}'"), "malformed Variant value"))?;
        entries.push((key, value));
    }

    Ok(ProjectConfig { generation, entries })
}

/// Re-serializes a [`ProjectConfig`] to the binary `ECFG` layout.
///
/// # Errors
/// Propagates any error from encoding an individual entry's Variant value.
pub fn encode_binary(config: &ProjectConfig) -> Result<Vec<u8>> {
    use pakrat_core::data::EndianWrite;

    let mut writer = ByteWriter::new(Endian::Little);
    writer.write_slice(&MAGIC);
    writer.write_u32(config.entries.len() as u32)?;
    let mut pool = StringPool::new();
    for (key, value) in &config.entries {
        writer.write_u32(key.len() as u32)?;
        writer.write_slice(key.as_bytes());

        let mut value_writer = ByteWriter::new(Endian::Little);
        let mut ctx = Context::new(config.generation, RealWidth::F32).with_pool(&mut pool);
        variant::encode(&mut value_writer, &mut ctx, value)?;
        let value_bytes = value_writer.into_inner();
        writer.write_u32(value_bytes.len() as u32)?;
        writer.write_slice(&value_bytes);
    }
    Ok(writer.into_inner())
}

const HEADER_COMMENT: &str = "\
; Project configuration file.
; It's best edited with the project settings editor, not by hand, since not every
; parameter in this file behaves the same when typed in by hand.
;
; Format: a section header groups the keys below it; key=value assigns a value
; to a key, and keys containing a slash nest under a section of that name.
";

fn config_version_for(generation: EngineGeneration, minor: u32) -> u32 {
    generation.config_version(minor)
}

/// Splits `key` into `(section, name)`; keys with no `/` land in the leading unnamed section.
fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.split_once('/') {
        Some((section, name)) => (Some(section), name),
        None => (None, key),
    }
}

/// Renders `config` as INI-style text, per §4.5.
///
/// `minor` selects the `config_version` scalar within the config's generation (§4.5's table keys
/// off generation *and* minor version, e.g. V3.0 vs V3.x).
#[must_use]
pub fn encode_text(config: &ProjectConfig, minor: u32) -> String {
    let version = config_version_for(config.generation, minor);

    let mut sections: Vec<(Option<String>, Vec<(String, &Variant)>)> = Vec::new();
    for (key, value) in &config.entries {
        let (section, name) = split_key(key);
        let section = section.map(str::to_owned);
        if let Some(entry) = sections.iter_mut().find(|(s, _)| *s == section) {
            entry.1.push((name.to_owned(), value));
        } else {
            sections.push((section, vec![(name.to_owned(), value)]));
        }
    }
    sections.iter_mut().for_each(|(_, entries)| entries.sort_by(|a, b| a.0.cmp(&b.0)));
    sections.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = String::new();
    out.push_str(HEADER_COMMENT);
    out.push('\n');
    let _ = writeln!(out, "config_version={version}");
    out.push('\n');

    for (section, entries) in &sections {
        if let Some(name) = section {
            let _ = writeln!(out, "[{name}]\n");
        }
        for (name, value) in entries {
            let _ = writeln!(out, "{name}={}", print_config_value(value));
        }
        out.push('\n');
    }

    while out.ends_with("\n\n") {
        out.truncate(out.len() - 1);
    }
    out
}

fn print_config_value(value: &Variant) -> String {
    match value {
        Variant::Nil => "null".to_owned(),
        Variant::Bool(b) => b.to_string(),
        Variant::Int32(v) => v.to_string(),
        Variant::Int64(v) => v.to_string(),
        Variant::Float32(v) => v.to_string(),
        Variant::Float64(v) => v.to_string(),
        Variant::String(s) | Variant::StringName(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Variant::Array(entries) => format!("[{}]", entries.iter().map(print_config_value).collect::<Vec<_>>().join(", ")),
        other => format!("\"{other:?}\""),
    }
}

/// Parses text produced by [`encode_text`] (or a hand-written `project.godot`) back into a
/// [`ProjectConfig`]. Only the scalar/array subset [`print_config_value`] emits is understood;
/// anything else (a `Vector2(...)`-style constructor call, say) is kept as its literal source text
/// wrapped in a `Variant::String`, which still round-trips through `encode_text` even if it isn't
/// semantically a string.
///
/// # Errors
/// [`Error::CorruptData`] for a line that's neither blank, a comment, a section header, nor a
/// `key=value` assignment.
pub fn parse_text(text: &str, generation: EngineGeneration) -> Result<ProjectConfig> {
    let mut config = ProjectConfig::new(generation);
    let mut section: Option<String> = None;

    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            section = Some(stripped.to_owned());
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(corrupt(format!("project config line {}", line_no + 1), "expected 'key=value'"));
        };
        let key = key.trim();
        let value = parse_config_value(value.trim());
        if key == "config_version" && section.is_none() {
            continue;
        }
        let full_key = match &section {
            Some(section) => format!("{section}/{key}"),
            None => key.to_owned(),
        };
        config.set(full_key, value);
    }

    Ok(config)
}

fn parse_config_value(text: &str) -> Variant {
    if text == "null" {
        return Variant::Nil;
    }
    if text == "true" {
        return Variant::Bool(true);
    }
    if text == "false" {
        return Variant::Bool(false);
    }
    if let Some(quoted) = text.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Variant::String(quoted.replace("\\\"", "\"").replace("\\\\", "\\"));
    }
    if let Ok(v) = text.parse::<i64>() {
        return Variant::Int64(v);
    }
    if let Ok(v) = text.parse::<f64>() {
        return Variant::Float64(v);
    }
    if let Some(inner) = text.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        let items = split_top_level(inner).into_iter().map(|item| parse_config_value(item.trim())).collect();
        return Variant::Array(items);
    }
    Variant::String(text.to_owned())
}

/// Splits on top-level commas, ignoring commas nested inside brackets or quotes.
fn split_top_level(text: &str) -> Vec<&str> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quotes = false;
    let mut start = 0usize;
    for (index, ch) in text.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => depth += 1,
            ']' if !in_quotes => depth -= 1,
            ',' if depth == 0 && !in_quotes => {
                parts.push(&text[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pakrat_core::stream::ByteReader;

    use super::*;

    #[test]
    fn s6_binary_to_text_round_trip_preserves_sections() {
        let mut config = ProjectConfig::new(EngineGeneration::V4);
        config.set("application/config/name", Variant::String("Demo".to_owned()));
        config.set("display/window/size/width", Variant::Int64(1280));

        let bytes = encode_binary(&config).unwrap();
        let mut reader = ByteReader::new(Cursor::new(bytes), Endian::Little);
        let decoded = decode_binary(&mut reader, EngineGeneration::V4).unwrap();
        assert_eq!(decoded, config);

        let text = encode_text(&decoded, 3);
        assert!(text.contains("config_version=5"));
        assert!(text.contains("[application]"));
        assert!(text.contains("[display]"));

        let reparsed = parse_text(&text, EngineGeneration::V4).unwrap();
        assert_eq!(reparsed.get("application/config/name"), Some(&Variant::String("Demo".to_owned())));
        assert_eq!(reparsed.get("display/window/size/width"), Some(&Variant::Int64(1280)));
    }

    #[test]
    fn keyless_entries_land_in_leading_section() {
        let mut config = ProjectConfig::new(EngineGeneration::V3);
        config.set("run_main_scene", Variant::String("res://main.tscn".to_owned()));
        let text = encode_text(&config, 5);
        assert!(text.contains("run_main_scene=\"res://main.tscn\""));
        assert!(!text.contains('['), "no section header should be emitted for a keyless entry");
    }

    #[test]
    fn parses_nested_arrays() {
        let parsed = parse_config_value("[1, 2, \"three\"]");
        assert_eq!(parsed, Variant::Array(vec![Variant::Int64(1), Variant::Int64(2), Variant::String("three".to_owned())]));
    }

    #[test]
    fn rejects_malformed_line() {
        let err = parse_text("not a valid line", EngineGeneration::V4).unwrap_err();
        assert!(matches!(err, Error::CorruptData { .. }));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut reader = ByteReader::new(Cursor::new(b"XXXX".to_vec()), Endian::Little);
        assert!(matches!(decode_binary(&mut reader, EngineGeneration::V4), Err(Error::BadMagic { .. })));
    }
}
