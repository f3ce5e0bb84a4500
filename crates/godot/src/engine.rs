//! §3 — the engine generation axis that every other codec in this crate branches on.
//!
//! Godot's on-disk formats changed incompatibly twice in the engine's history (2.x → 3.x → 4.x).
//! Rather than threading `(major, minor)` pairs through every decode call, callers pick an
//! [`EngineGeneration`] once per file and the codecs dispatch on that instead.

/// The V4 minor version at which both the resource format version and `config_version` bump
/// again (4.3), per Design Note (iii) — the source embeds this boundary as a bare literal; this
/// crate gives it a name instead of repeating the magic number at each call site.
const V4_MINOR_SECOND_BUMP: u32 = 3;

/// Which of the three incompatible on-disk eras a file belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineGeneration {
    V2,
    V3,
    V4,
}

impl EngineGeneration {
    /// Picks a generation from an engine version triple, as recorded in a PCK or resource header.
    #[must_use]
    pub const fn from_major_minor(major: u32, _minor: u32) -> Self {
        match major {
            0 | 1 | 2 => Self::V2,
            3 => Self::V3,
            _ => Self::V4,
        }
    }

    /// The resource binary `format_version` a fresh write under this generation should target, per
    /// §4.4's header-tag table (`V2→1, V3.0→2, V3.x→3, V4.0..4.2→3, V4.3+→4`).
    #[must_use]
    pub const fn default_resource_format_version(self, minor: u32) -> u32 {
        match self {
            Self::V2 => 1,
            Self::V3 => {
                if minor == 0 {
                    2
                } else {
                    3
                }
            }
            Self::V4 => {
                if minor >= V4_MINOR_SECOND_BUMP {
                    4
                } else {
                    3
                }
            }
        }
    }

    /// The `config_version` a project-config text emission should carry, per §4.5
    /// (`V2→2, V3.0→3, V3.x→4, V4→5`).
    #[must_use]
    pub const fn config_version(self, minor: u32) -> u32 {
        match self {
            Self::V2 => 2,
            Self::V3 => {
                if minor == 0 {
                    3
                } else {
                    4
                }
            }
            Self::V4 => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_generation_from_major_version() {
        assert_eq!(EngineGeneration::from_major_minor(2, 1), EngineGeneration::V2);
        assert_eq!(EngineGeneration::from_major_minor(3, 5), EngineGeneration::V3);
        assert_eq!(EngineGeneration::from_major_minor(4, 2), EngineGeneration::V4);
    }

    #[test]
    fn config_version_matches_spec_table() {
        assert_eq!(EngineGeneration::V2.config_version(1), 2);
        assert_eq!(EngineGeneration::V3.config_version(0), 3);
        assert_eq!(EngineGeneration::V3.config_version(5), 4);
        assert_eq!(EngineGeneration::V4.config_version(2), 5);
    }

    #[test]
    fn resource_format_version_matches_spec_table() {
        assert_eq!(EngineGeneration::V2.default_resource_format_version(1), 1);
        assert_eq!(EngineGeneration::V3.default_resource_format_version(0), 2);
        assert_eq!(EngineGeneration::V3.default_resource_format_version(4), 3);
        assert_eq!(EngineGeneration::V4.default_resource_format_version(2), 3);
        assert_eq!(EngineGeneration::V4.default_resource_format_version(3), 4);
    }
}
