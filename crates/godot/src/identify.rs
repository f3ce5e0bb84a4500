//! Magic-byte format recognition for the archive, resource, bytecode, and config formats this
//! crate understands (§6). Each identifier only peeks at the leading magic plus whatever a handful
//! of header fields reveal for free — none of them attempt a full parse, so they're safe to run
//! over arbitrary, possibly-corrupt input before committing to a real loader.

use pakrat_core::identify::{FileIdentifier, FileInfo};

/// Identifies `.pck` archives (§2) by their `GDPC` magic, either at the start of the file or, for
/// archives embedded in an executable, trailing the last 4 bytes.
pub struct PckIdentifier;

impl FileIdentifier for PckIdentifier {
    fn identify(data: &[u8]) -> Option<FileInfo> {
        if data.len() >= 4 && &data[0..4] == b"GDPC" {
            return Some(FileInfo::new(String::from("Godot PCK archive (standalone)"), None));
        }
        if data.len() >= 4 && &data[data.len() - 4..] == b"GDPC" {
            return Some(FileInfo::new(
                String::from("Godot PCK archive (embedded in executable)"),
                None,
            ));
        }
        None
    }
}

/// Identifies binary resource/scene files (`RSRC`, §4) and resource-stream compression wrappers
/// (`RSCC`, §4.3), which share a loader but are distinguished by their magic.
pub struct ResourceIdentifier;

impl FileIdentifier for ResourceIdentifier {
    fn identify(data: &[u8]) -> Option<FileInfo> {
        match data.get(0..4) {
            Some(b"RSRC") => {
                Some(FileInfo::new(String::from("Godot binary resource (RSRC)"), None))
            }
            Some(b"RSCC") => Some(FileInfo::new(
                String::from("Godot compressed resource stream (RSCC)"),
                None,
            )),
            _ => None,
        }
    }
}

/// Identifies compiled GDScript bytecode (`GDSC`, §4.8).
pub struct GdscriptIdentifier;

impl FileIdentifier for GdscriptIdentifier {
    fn identify(data: &[u8]) -> Option<FileInfo> {
        if data.get(0..4) == Some(b"GDSC") {
            let revision = data
                .get(4..8)
                .map(|bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
            let info = match revision {
                Some(revision) => format!("Godot GDScript bytecode (revision {revision:#010x})"),
                None => String::from("Godot GDScript bytecode"),
            };
            return Some(FileInfo::new(info, None));
        }
        None
    }
}

/// Identifies binary project configuration files (`ECFG`, §4.9).
pub struct ProjectConfigIdentifier;

impl FileIdentifier for ProjectConfigIdentifier {
    fn identify(data: &[u8]) -> Option<FileInfo> {
        if data.get(0..4) == Some(b"ECFG") {
            return Some(FileInfo::new(String::from("Godot binary project config (ECFG)"), None));
        }
        None
    }
}

/// Tries every identifier this crate provides in turn, returning the first match.
#[must_use]
pub fn identify_any(data: &[u8]) -> Option<FileInfo> {
    PckIdentifier::identify(data)
        .or_else(|| ResourceIdentifier::identify(data))
        .or_else(|| GdscriptIdentifier::identify(data))
        .or_else(|| ProjectConfigIdentifier::identify(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_each_magic() {
        assert!(identify_any(b"GDPC....").is_some());
        assert!(identify_any(b"RSRC....").is_some());
        assert!(identify_any(b"RSCC....").is_some());
        assert!(identify_any(b"ECFG....").is_some());
    }

    #[test]
    fn reports_gdscript_revision() {
        let mut data = b"GDSC".to_vec();
        data.extend_from_slice(&0x0556_5f55u32.to_le_bytes());
        let info = GdscriptIdentifier::identify(&data).unwrap();
        assert!(info.info.contains("556"), "{}", info.info);
    }

    #[test]
    fn finds_embedded_pck_trailer() {
        let mut data = vec![0u8; 64];
        data.extend_from_slice(b"GDPC");
        assert!(PckIdentifier::identify(&data).is_some());
    }

    #[test]
    fn unrecognized_data_returns_none() {
        assert!(identify_any(b"xxxxxxxx").is_none());
    }
}
