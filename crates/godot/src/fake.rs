//! §4.3 `FAKE_LOAD` policy — placeholder stand-ins for resources the caller doesn't want to follow.
//!
//! Inspecting or round-tripping a `.tscn` doesn't require actually loading every texture and mesh
//! it references; `FAKE_LOAD` replaces each external (and, if asked, each internal) resource with a
//! [`FakeResource`] that remembers enough to re-emit an equivalent reference, but runs no loader and
//! follows no path. This mirrors `ResourceLoader`'s own placeholder path rather than anything novel.

/// A placeholder standing in for a resource that load policy chose not to resolve.
///
/// Carries exactly the identity a writer needs to re-emit an equivalent `ExtResource`/`SubResource`
/// reference: nothing about the placeholder's own properties is ever populated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FakeResource {
    pub type_name: String,
    pub path: Option<String>,
    pub subindex: Option<u32>,
}

impl FakeResource {
    #[must_use]
    pub fn external(type_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self { type_name: type_name.into(), path: Some(path.into()), subindex: None }
    }

    #[must_use]
    pub fn internal(type_name: impl Into<String>, subindex: u32) -> Self {
        Self { type_name: type_name.into(), path: None, subindex: Some(subindex) }
    }

    /// `true` for a resource that stands in for an external reference (as opposed to a skipped
    /// internal subresource).
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.path.is_some()
    }
}

/// Tracks which externals/internals a `FAKE_LOAD` pass has stood in for, so a caller can report
/// what was skipped without walking the whole graph again.
#[derive(Clone, Debug, Default)]
pub struct FakeRegistry {
    entries: Vec<FakeResource>,
}

impl FakeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, fake: FakeResource) {
        self.entries.push(fake);
    }

    #[must_use]
    pub fn entries(&self) -> &[FakeResource] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_fake_carries_path_not_subindex() {
        let fake = FakeResource::external("Texture2D", "res://x.png");
        assert!(fake.is_external());
        assert_eq!(fake.path.as_deref(), Some("res://x.png"));
        assert_eq!(fake.subindex, None);
    }

    #[test]
    fn internal_fake_carries_subindex_not_path() {
        let fake = FakeResource::internal("StandardMaterial3D", 2);
        assert!(!fake.is_external());
        assert_eq!(fake.subindex, Some(2));
    }

    #[test]
    fn registry_tracks_recorded_fakes_in_order() {
        let mut registry = FakeRegistry::new();
        assert!(registry.is_empty());
        registry.record(FakeResource::external("Texture2D", "res://a.png"));
        registry.record(FakeResource::internal("Shader", 1));
        assert_eq!(registry.entries().len(), 2);
        assert!(registry.entries()[0].is_external());
        assert!(!registry.entries()[1].is_external());
    }
}
