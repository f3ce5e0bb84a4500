//! §4.6 — legacy V2 embedded `Image` and `InputEvent` objects.
//!
//! Godot 2.x serialized these two types directly inside Variant streams (tags 15 and 19 of
//! `V2Type`, see `original_source/compat/variant_decoder_compat.h`). Both were folded into the
//! generic `Object` system in 3.x, so this module's job is to decode the V2-only wire layout
//! (grounded in `original_source/utility/image_parser_v2.cpp` and
//! `original_source/compat/input_event_parser_v2.cpp`) and re-emit the result as a V4-shaped
//! [`ObjectRef::Inline`], the way the rest of this crate already represents objects.

use pakrat_core::stream::ReadExt;

use crate::error::{corrupt, Result};
use crate::variant::{ObjectRef, Variant};

const ENCODING_EMPTY: u32 = 0;
const ENCODING_RAW: u32 = 1;
const ENCODING_LOSSLESS: u32 = 2;
const ENCODING_LOSSY: u32 = 3;

/// The nearest V4 `Image::Format` name for a V2 raw-encoded image, per
/// `image_parser_v2.cpp`'s `_convert_v2image_format` table.
///
/// `FORMAT_CUSTOM` has no documented target upstream either (Design Note open question (i)); this
/// mirrors the original's own placeholder of mapping it to `ETC2_RA_AS_RG` and flagging the
/// result lossy.
#[must_use]
pub fn v2_raw_format_to_v4(format: u32) -> (&'static str, bool) {
    match format {
        0 => ("L8", false),            // GRAYSCALE
        2 => ("LA8", false),           // GRAYSCALE_ALPHA
        3 => ("RGB8", false),          // RGB
        4 => ("RGBA8", false),         // RGBA
        7 => ("DXT1", false),          // BC1
        8 => ("DXT3", false),          // BC2
        9 => ("DXT5", false),          // BC3
        10 => ("RGTC_R", false),       // BC4
        11 => ("RGTC_RG", false),      // BC5
        12 => ("PVRTC1_2", false),     // PVRTC2
        13 => ("PVRTC1_2A", false),    // PVRTC2_ALPHA
        14 => ("PVRTC1_4", false),     // PVRTC4
        15 => ("PVRTC1_4A", false),    // PVRTC4_ALPHA
        16 => ("ETC", false),          // ETC
        1 => ("ETC2_R11", true),       // INTENSITY (dropped, lossy placeholder)
        5 => ("ETC2_R11S", true),      // INDEXED (dropped, lossy placeholder)
        6 => ("ETC2_RG11", true),      // INDEXED_ALPHA (dropped, lossy placeholder)
        17 => ("ETC2_RG11S", true),    // ATC (dropped, lossy placeholder)
        18 => ("ETC2_RGB8", true),     // ATC_ALPHA_EXPLICIT (dropped, lossy placeholder)
        19 => ("ETC2_RGB8A1", true),   // ATC_ALPHA_INTERPOLATED (dropped, lossy placeholder)
        30 => ("ETC2_RA_AS_RG", true), // CUSTOM: no documented mapping, known-lossy (see Design Note i)
        _ => ("ETC2_RA_AS_RG", true),
    }
}

#[inline]
const fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

/// Decodes a V2-embedded `Image` (variant tag 15) into an inline `Image`-class [`ObjectRef`].
///
/// # Errors
/// Returns [`Error::CorruptData`](crate::error::Error::CorruptData) for an unrecognized encoding
/// byte, or the usual bounded-read errors from `reader`.
pub fn decode_legacy_image<R: ReadExt>(reader: &mut R) -> Result<Variant> {
    let encoding = reader.read_u32()?;
    let mut properties = Vec::new();

    match encoding {
        ENCODING_EMPTY => {}
        ENCODING_RAW => {
            let width = reader.read_u32()?;
            let height = reader.read_u32()?;
            let mipmaps = reader.read_u32()?;
            let raw_format = reader.read_u32()?;
            let (format_name, lossy) = v2_raw_format_to_v4(raw_format);

            let data_len = reader.read_u32()? as usize;
            let data = reader.read_slice(data_len)?;
            let padding = pad4(data_len) - data_len;
            if padding > 0 {
                reader.read_slice(padding)?;
            }

            properties.push(("width".to_owned(), Variant::Int64(i64::from(width))));
            properties.push(("height".to_owned(), Variant::Int64(i64::from(height))));
            properties.push(("mipmaps".to_owned(), Variant::Int64(i64::from(mipmaps))));
            properties.push(("format".to_owned(), Variant::String(format_name.to_owned())));
            properties.push(("lossy".to_owned(), Variant::Bool(lossy)));
            properties.push(("data".to_owned(), Variant::PackedByteArray(data)));
        }
        ENCODING_LOSSLESS | ENCODING_LOSSY => {
            let width = reader.read_u32()?;
            let height = reader.read_u32()?;
            let data_len = reader.read_u32()? as usize;
            let data = reader.read_slice(data_len)?;
            let padding = pad4(data_len) - data_len;
            if padding > 0 {
                reader.read_slice(padding)?;
            }
            properties.push(("width".to_owned(), Variant::Int64(i64::from(width))));
            properties.push(("height".to_owned(), Variant::Int64(i64::from(height))));
            properties.push((
                "format".to_owned(),
                Variant::String(if encoding == ENCODING_LOSSLESS { "png" } else { "webp" }.to_owned()),
            ));
            properties.push(("data".to_owned(), Variant::PackedByteArray(data)));
        }
        other => return Err(corrupt("legacy Image", format!("unknown encoding byte {other}"))),
    }

    Ok(Variant::Object(ObjectRef::Inline { class_name: "Image".to_owned(), properties }))
}

const EVENT_KEY: u32 = 1;
const EVENT_MOUSE_BUTTON: u32 = 3;
const EVENT_JOYSTICK_MOTION: u32 = 4;
const EVENT_JOYSTICK_BUTTON: u32 = 5;
const EVENT_SCREEN_TOUCH: u32 = 6;

const KEY_MASK_SHIFT: u32 = 1 << 1;
const KEY_MASK_CTRL: u32 = 1 << 2;
const KEY_MASK_ALT: u32 = 1 << 3;
const KEY_MASK_META: u32 = 1 << 4;

/// The V2 "special key" tag bit and the one keycode (`Kp Enter`) whose numeric value changed
/// between V2 and V4, per `convert_v2_key_to_v4_key` in `input_event_parser_v2.cpp`.
const SPKEY: u32 = 1 << 24;
const V2_KEY_KP_ENTER: u32 = SPKEY | 0x17;
const V2_KEY_RETURN: u32 = SPKEY | 0x03;

/// Remaps a raw V2 keycode to its V4 equivalent. Non-special keys (anything below the `SPKEY`
/// bit, e.g. printable ASCII like `KEY_SPACE = 0x20`) are numerically identical across engine
/// generations and pass through unchanged; special keys flip the `SPKEY` marker for V4's
/// `Key::SPECIAL` bit, with the two keys whose assignment actually moved (`Kp Enter`/`Return`)
/// special-cased first.
#[must_use]
pub fn v2_keycode_to_v4(keycode: u32) -> u32 {
    if keycode & SPKEY == 0 {
        return keycode;
    }
    if keycode == V2_KEY_KP_ENTER {
        return 0x0100_0000 | 0x17; // Key::KP_ENTER under V4's SPECIAL namespace
    }
    if keycode == V2_KEY_RETURN {
        return 0x0100_0000 | 0x03; // Key::ENTER
    }
    (keycode ^ SPKEY) | 0x0100_0000
}

/// Decodes a V2-embedded `InputEvent` (variant tag 19) into an inline `InputEvent*`-class
/// [`ObjectRef`], per `input_event_parser_v2.cpp`'s `decode_input_event`.
///
/// # Errors
/// Returns [`Error::CorruptData`](crate::error::Error::CorruptData) for an unrecognized event
/// kind, or the usual bounded-read errors from `reader`.
pub fn decode_legacy_input_event<R: ReadExt>(reader: &mut R) -> Result<Variant> {
    let kind = reader.read_u32()?;
    let device = reader.read_u32()?;
    let mut properties = vec![("device".to_owned(), Variant::Int64(i64::from(device)))];

    let class_name = match kind {
        EVENT_KEY => {
            let mods = reader.read_u32()?;
            let keycode = reader.read_u32()?;
            properties.push(("keycode".to_owned(), Variant::Int64(i64::from(v2_keycode_to_v4(keycode)))));
            if keycode == V2_KEY_KP_ENTER {
                properties.push(("physical_keycode".to_owned(), Variant::Int64(i64::from(keycode))));
            }
            properties.push(("shift_pressed".to_owned(), Variant::Bool(mods & KEY_MASK_SHIFT != 0)));
            properties.push(("ctrl_pressed".to_owned(), Variant::Bool(mods & KEY_MASK_CTRL != 0)));
            properties.push(("alt_pressed".to_owned(), Variant::Bool(mods & KEY_MASK_ALT != 0)));
            properties.push(("meta_pressed".to_owned(), Variant::Bool(mods & KEY_MASK_META != 0)));
            "InputEventKey"
        }
        EVENT_MOUSE_BUTTON => {
            let button_index = reader.read_u32()?;
            properties.push(("button_index".to_owned(), Variant::Int64(i64::from(button_index))));
            "InputEventMouseButton"
        }
        EVENT_JOYSTICK_BUTTON => {
            let button_index = reader.read_u32()?;
            properties.push(("button_index".to_owned(), Variant::Int64(i64::from(button_index))));
            "InputEventJoypadButton"
        }
        EVENT_JOYSTICK_MOTION => {
            let axis = reader.read_u32()?;
            let axis_value = reader.read_f32()?;
            properties.push(("axis".to_owned(), Variant::Int64(i64::from(axis))));
            properties.push(("axis_value".to_owned(), Variant::Float32(axis_value)));
            "InputEventJoypadMotion"
        }
        EVENT_SCREEN_TOUCH => {
            let index = reader.read_u32()?;
            properties.push(("index".to_owned(), Variant::Int64(i64::from(index))));
            "InputEventScreenTouch"
        }
        other => return Err(corrupt("legacy InputEvent", format!("unknown event kind {other}"))),
    };

    Ok(Variant::Object(ObjectRef::Inline { class_name: class_name.to_owned(), properties }))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pakrat_core::data::Endian;
    use pakrat_core::stream::ByteReader;

    use super::*;

    #[test]
    fn s5_v2_input_event_key_decodes_shift_space() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&EVENT_KEY.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes()); // device
        bytes.extend_from_slice(&KEY_MASK_SHIFT.to_le_bytes()); // mods
        bytes.extend_from_slice(&0x20u32.to_le_bytes()); // keycode: KEY_SPACE

        let mut reader = ByteReader::new(Cursor::new(bytes), Endian::Little);
        let value = decode_legacy_input_event(&mut reader).unwrap();
        let Variant::Object(ObjectRef::Inline { class_name, properties }) = value else {
            panic!("expected an inline object");
        };
        assert_eq!(class_name, "InputEventKey");
        assert!(properties.contains(&("shift_pressed".to_owned(), Variant::Bool(true))));
        assert!(properties.contains(&("keycode".to_owned(), Variant::Int64(0x20))));
    }

    #[test]
    fn image_empty_encoding_has_no_trailing_fields() {
        let bytes = ENCODING_EMPTY.to_le_bytes().to_vec();
        let mut reader = ByteReader::new(Cursor::new(bytes), Endian::Little);
        let value = decode_legacy_image(&mut reader).unwrap();
        let Variant::Object(ObjectRef::Inline { class_name, properties }) = value else {
            panic!("expected an inline object");
        };
        assert_eq!(class_name, "Image");
        assert!(properties.is_empty());
    }

    #[test]
    fn image_custom_format_is_flagged_lossy() {
        let (name, lossy) = v2_raw_format_to_v4(30);
        assert_eq!(name, "ETC2_RA_AS_RG");
        assert!(lossy);
    }

    #[test]
    fn raw_image_round_trips_dimensions_and_data() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&ENCODING_RAW.to_le_bytes());
        bytes.extend_from_slice(&4u32.to_le_bytes()); // width
        bytes.extend_from_slice(&4u32.to_le_bytes()); // height
        bytes.extend_from_slice(&0u32.to_le_bytes()); // mipmaps
        bytes.extend_from_slice(&3u32.to_le_bytes()); // format: RGB
        let data = [1u8, 2, 3];
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&data);
        bytes.extend_from_slice(&[0u8]); // pad to 4 bytes

        let mut reader = ByteReader::new(Cursor::new(bytes), Endian::Little);
        let value = decode_legacy_image(&mut reader).unwrap();
        let Variant::Object(ObjectRef::Inline { properties, .. }) = value else {
            panic!("expected an inline object");
        };
        assert!(properties.contains(&("width".to_owned(), Variant::Int64(4))));
        assert!(properties.contains(&("format".to_owned(), Variant::String("RGB8".to_owned()))));
    }
}
