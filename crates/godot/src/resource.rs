//! §4.3/§3 — the binary resource loader and the [`ResourceGraph`] it produces.
//!
//! A `.res`/`.scn`/`.tex` file (optionally `RSCC`-compressed, see [`crate::compression`]) is a
//! `RSRC` header, a shared string pool, an external-resource table, and an internal-resource table
//! whose bodies are themselves Variant property bags (§4.2). This module turns that stream into a
//! self-sufficient [`ResourceGraph`] that [`crate::text`] and a future binary re-writer consume
//! without ever touching the original bytes again.

use pakrat_core::data::{DataCursor, Endian};
use pakrat_core::stream::{ByteWriter, ReadExt, SeekExt};

use crate::compression;
use crate::engine::EngineGeneration;
use crate::error::{corrupt, Error, Result};
use crate::fake::FakeResource;
use crate::math::RealWidth;
use crate::variant::{self, Context, NodePath, StringPool, Variant};

const MAGIC: [u8; 4] = *b"RSRC";

/// `Object.ConnectFlags.CONNECT_PERSIST`, the default a scene connection carries when no explicit
/// flags were set. Not defined anywhere in the retrieved gdsdecomp corpus (only referenced
/// symbolically as `Object::CONNECT_PERSIST`); this is the public engine constant. See DESIGN.md.
const CONNECT_PERSIST: i32 = 2;

bitflags::bitflags! {
    /// `§4.3 step 5` format-≥3 header flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ResourceFlags: u32 {
        const NAMED_SCENE_IDS = 1 << 0;
        const UIDS            = 1 << 1;
        const SCRIPT_CLASS    = 1 << 2;
    }
}

/// `ResourceGraph.format_header`.
#[derive(Clone, Debug)]
pub struct FormatHeader {
    pub big_endian: bool,
    pub use_real64: bool,
    pub engine_major: u32,
    pub engine_minor: u32,
    pub format_version: u32,
    pub root_type: String,
}

impl FormatHeader {
    #[must_use]
    pub fn generation(&self) -> EngineGeneration {
        EngineGeneration::from_major_minor(self.engine_major, self.engine_minor)
    }

    #[must_use]
    pub fn real_width(&self) -> RealWidth {
        RealWidth::from_flag(self.use_real64)
    }
}

/// How an [`ExternalRef`] was handled by the load policy.
#[derive(Clone, Debug, PartialEq)]
pub enum ExternalBinding {
    /// Not yet touched by a policy (only produced by the lowest-level directory parse, never
    /// returned from [`load_binary`]).
    Unresolved,
    /// Stood in for by `FAKE_LOAD`.
    Fake(FakeResource),
    /// Resolved to an actual value by `REAL_LOAD`/`GLTF_LOAD`.
    Resolved(Variant),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExternalRef {
    pub type_name: String,
    pub path: String,
    pub uid: Option<u64>,
    pub binding: ExternalBinding,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InternalRes {
    pub local_path: String,
    pub type_name: String,
    pub subindex: u32,
    /// Insertion-ordered; names round-trip verbatim and unknown names must never be rejected (§9
    /// "dynamic property bags").
    pub properties: Vec<(String, Variant)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportSource {
    pub path: String,
    pub md5: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportMetadata {
    pub editor: String,
    pub sources: Vec<ImportSource>,
    pub options: Vec<(String, Variant)>,
}

/// The in-memory model every other format in this crate that deals with resources builds on.
#[derive(Clone, Debug)]
pub struct ResourceGraph {
    pub header: FormatHeader,
    pub string_pool: StringPool,
    pub external_resources: Vec<ExternalRef>,
    /// Order matters: the last entry is the main resource (§3).
    pub internal_resources: Vec<InternalRes>,
    pub import_metadata: Option<ImportMetadata>,
    pub script_class: Option<String>,
    pub uid: Option<u64>,
    /// Externals demoted to a placeholder under `REAL_LOAD` without `abort_on_missing` (§4.3).
    pub dependency_errors: Vec<String>,
}

impl ResourceGraph {
    /// The main resource: the last internal resource, per §3.
    #[must_use]
    pub fn main_resource(&self) -> Option<&InternalRes> {
        self.internal_resources.last()
    }
}

/// Injection point for `REAL_LOAD`/`GLTF_LOAD`: resolves an external reference to a concrete value.
pub trait ResourceResolver {
    /// # Errors
    /// Any resolver-specific failure; [`load_binary`] turns this into a [`Error::DependencyMissing`]
    /// or a demoted placeholder depending on the active policy.
    fn resolve(&mut self, path: &str, type_hint: &str, uid: Option<u64>) -> Result<Variant>;
}

/// Which of §4.3's three load policies to apply while parsing externals.
pub enum LoadPolicy<'a> {
    RealLoad { resolver: &'a mut dyn ResourceResolver, abort_on_missing: bool },
    FakeLoad { fake_internals: bool },
    /// Like `RealLoad`, but mesh/texture types route through `mesh_texture_resolver` instead.
    GltfLoad {
        resolver: &'a mut dyn ResourceResolver,
        mesh_texture_resolver: &'a mut dyn ResourceResolver,
        abort_on_missing: bool,
    },
}

fn is_mesh_or_texture(type_name: &str) -> bool {
    matches!(type_name, "Texture2D" | "Texture" | "ImageTexture" | "Mesh" | "ArrayMesh" | "PrimitiveMesh")
}

/// Parses a binary resource stream (optionally `RSCC`-wrapped) into a [`ResourceGraph`], applying
/// `policy` to every external reference.
///
/// # Errors
/// [`Error::BadMagic`] if neither `RSCC` nor `RSRC` is found; [`Error::CorruptData`] for any
/// structural violation; [`Error::DependencyMissing`] under `REAL_LOAD`/`GLTF_LOAD` with
/// `abort_on_missing` when a resolver fails.
pub fn load_binary<R: ReadExt + SeekExt>(reader: &mut R, policy: &mut LoadPolicy) -> Result<ResourceGraph> {
    if let Some(decompressed) = compression::try_decompress(reader)? {
        let mut cursor = DataCursor::new(decompressed, Endian::Little);
        return load_rsrc(&mut cursor, policy);
    }
    load_rsrc(reader, policy)
}

fn load_rsrc<R: ReadExt + SeekExt>(reader: &mut R, policy: &mut LoadPolicy) -> Result<ResourceGraph> {
    let magic = reader.read_exact::<4>()?;
    if magic != MAGIC {
        return Err(Error::BadMagic { expected: MAGIC, found: magic });
    }

    let big_endian = reader.read_u32()? != 0;
    let use_real64 = reader.read_u32()? != 0;
    let engine_major = reader.read_u32()?;
    let engine_minor = reader.read_u32()?;
    let format_version = reader.read_u32()?;
    if format_version > 4 {
        return Err(Error::UnsupportedVersion { version: format_version, maximum: 4 });
    }

    let root_type = read_pooled_string(reader)?;
    let import_metadata_offset = reader.read_u64()?;
    for _ in 0..14 {
        reader.read_u32()?;
    }

    let mut flags = ResourceFlags::empty();
    let mut uid = None;
    let mut script_class = None;
    if format_version >= 3 {
        flags = ResourceFlags::from_bits_truncate(reader.read_u32()?);
        if flags.contains(ResourceFlags::UIDS) {
            uid = Some(reader.read_u64()?);
        }
        if flags.contains(ResourceFlags::SCRIPT_CLASS) {
            script_class = Some(read_pooled_string(reader)?);
        }
    }

    let string_count = reader.read_u32()? as usize;
    let mut names = Vec::with_capacity(string_count);
    for _ in 0..string_count {
        names.push(read_pooled_string(reader)?);
    }
    let string_pool = StringPool::from_entries(names);

    let external_count = reader.read_u32()? as usize;
    let mut external_resources = Vec::with_capacity(external_count);
    for _ in 0..external_count {
        let type_name = read_pooled_string(reader)?;
        let path = read_pooled_string(reader)?;
        let uid = if format_version >= 3 { Some(reader.read_u64()?) } else { None };
        external_resources.push(ExternalRef { type_name, path, uid, binding: ExternalBinding::Unresolved });
    }

    let internal_count = reader.read_u32()? as usize;
    let mut offsets = Vec::with_capacity(internal_count);
    for _ in 0..internal_count {
        let local_path = read_pooled_string(reader)?;
        let body_offset = reader.read_u64()?;
        offsets.push((local_path, body_offset));
    }

    let generation = EngineGeneration::from_major_minor(engine_major, engine_minor);
    let real_width = RealWidth::from_flag(use_real64);

    let mut internal_resources = Vec::with_capacity(internal_count);
    let mut pool_copy = string_pool.clone();
    for (index, (local_path, offset)) in offsets.into_iter().enumerate() {
        reader.set_position(offset)?;
        let type_name = read_pooled_string(reader)?;
        let property_count = reader.read_u32()? as usize;
        let mut properties = Vec::with_capacity(property_count);
        for _ in 0..property_count {
            let name = read_property_name(reader, &pool_copy)?;
            let mut ctx = Context::new(generation, real_width).with_pool(&mut pool_copy);
            let value = variant::decode(reader, &mut ctx)
                .map_err(|e| annotate(e, format!("internal resource #{index} · property '{name}'")))?;
            properties.push((name, value));
        }
        let subindex = u32::try_from(index + 1).unwrap_or(u32::MAX);
        internal_resources.push(InternalRes { local_path, type_name, subindex, properties });
    }

    if root_type == "PackedScene" {
        if let Some(main) = internal_resources.last_mut() {
            if let Some(pos) = main.properties.iter().position(|(name, _)| name == "_bundled") {
                let (_, bundled_value) = main.properties.remove(pos);
                if let Variant::Dictionary(bundled_fields) = bundled_value {
                    let unpacked = unpack_scene_state(&bundled_fields)
                        .map_err(|e| annotate(e, "PackedScene · _bundled"))?;
                    main.properties.extend(unpacked);
                }
            }
        }
    }

    let import_metadata = if format_version <= 3 && import_metadata_offset != 0 {
        reader.set_position(import_metadata_offset)?;
        Some(read_import_metadata(reader)?)
    } else {
        None
    };

    let mut dependency_errors = Vec::new();
    apply_policy(&mut external_resources, policy, &mut dependency_errors)?;

    if let LoadPolicy::FakeLoad { fake_internals: true } = policy {
        for internal in &mut internal_resources {
            let fake = FakeResource::internal(internal.type_name.clone(), internal.subindex);
            internal.properties = vec![("__fake__".to_owned(), Variant::String(format!("{fake:?}")))];
        }
    }

    Ok(ResourceGraph {
        header: FormatHeader { big_endian, use_real64, engine_major, engine_minor, format_version, root_type },
        string_pool,
        external_resources,
        internal_resources,
        import_metadata,
        script_class,
        uid,
        dependency_errors,
    })
}

fn annotate(err: Error, breadcrumb: impl Into<String>) -> Error {
    match err {
        Error::CorruptData { reason, .. } => corrupt(breadcrumb, reason),
        other => other,
    }
}

fn apply_policy(
    externals: &mut [ExternalRef],
    policy: &mut LoadPolicy,
    dependency_errors: &mut Vec<String>,
) -> Result<()> {
    for ext in externals.iter_mut() {
        ext.binding = match policy {
            LoadPolicy::FakeLoad { .. } => {
                ExternalBinding::Fake(FakeResource::external(ext.type_name.clone(), ext.path.clone()))
            }
            LoadPolicy::RealLoad { resolver, abort_on_missing } => {
                match resolver.resolve(&ext.path, &ext.type_name, ext.uid) {
                    Ok(value) => ExternalBinding::Resolved(value),
                    Err(_) if *abort_on_missing => {
                        return Err(Error::DependencyMissing { path: ext.path.clone() })
                    }
                    Err(_) => {
                        dependency_errors.push(ext.path.clone());
                        ExternalBinding::Fake(FakeResource::external(ext.type_name.clone(), ext.path.clone()))
                    }
                }
            }
            LoadPolicy::GltfLoad { resolver, mesh_texture_resolver, abort_on_missing } => {
                let used = if is_mesh_or_texture(&ext.type_name) { &mut **mesh_texture_resolver } else { &mut **resolver };
                match used.resolve(&ext.path, &ext.type_name, ext.uid) {
                    Ok(value) => ExternalBinding::Resolved(value),
                    Err(_) if *abort_on_missing => {
                        return Err(Error::DependencyMissing { path: ext.path.clone() })
                    }
                    Err(_) => {
                        dependency_errors.push(ext.path.clone());
                        ExternalBinding::Fake(FakeResource::external(ext.type_name.clone(), ext.path.clone()))
                    }
                }
            }
        };
    }
    Ok(())
}

fn read_import_metadata<R: ReadExt>(reader: &mut R) -> Result<ImportMetadata> {
    let editor = read_pooled_string(reader)?;
    let source_count = reader.read_u32()? as usize;
    let mut sources = Vec::with_capacity(source_count);
    for _ in 0..source_count {
        let path = read_pooled_string(reader)?;
        let md5 = read_pooled_string(reader)?;
        sources.push(ImportSource { path, md5 });
    }
    let option_count = reader.read_u32()? as usize;
    let mut options = Vec::with_capacity(option_count);
    let mut pool = StringPool::new();
    for _ in 0..option_count {
        let name = read_pooled_string(reader)?;
        let mut ctx = Context::new(EngineGeneration::V2, RealWidth::F32).with_pool(&mut pool);
        let value = variant::decode(reader, &mut ctx)?;
        options.push((name, value));
    }
    Ok(ImportMetadata { editor, sources, options })
}

/// Reads an inline (non-pooled) string using Variant's `u32 len` + padded-to-4 convention, which
/// every header-level string (root type, external type/path, import metadata) uses.
fn read_pooled_string<R: ReadExt>(reader: &mut R) -> Result<String> {
    let len = reader.read_u32()? as usize;
    if len == 0 {
        return Ok(String::new());
    }
    let bytes = reader.read_slice(len)?;
    let padding = (4 - len % 4) % 4;
    if padding > 0 {
        reader.read_slice(padding)?;
    }
    let content = &bytes[..bytes.len().saturating_sub(1)];
    String::from_utf8(content.to_vec()).map_err(|_| Error::BadUtf8 { breadcrumb: "resource string".to_owned() })
}

fn write_pooled_string(writer: &mut ByteWriter, value: &str) -> Result<()> {
    use pakrat_core::data::EndianWrite;
    if value.is_empty() {
        writer.write_u32(0)?;
        return Ok(());
    }
    let len = value.len() + 1;
    writer.write_u32(len as u32)?;
    writer.write_slice(value.as_bytes());
    writer.write_slice(&[0]);
    let padding = (4 - len % 4) % 4;
    if padding > 0 {
        writer.write_padding(0, padding);
    }
    Ok(())
}

/// Property names are plain indices into the resource's string pool (§4.3 step 9).
fn read_property_name<R: ReadExt>(reader: &mut R, pool: &StringPool) -> Result<String> {
    let index = reader.read_u32()?;
    pool.get(index).map(str::to_owned).ok_or_else(|| corrupt("resource property name", "string pool index out of range"))
}

/// Re-serializes a [`ResourceGraph`] to the binary `RSRC` layout at `format_version`.
///
/// # Errors
/// [`Error::CorruptData`] if any `Variant` in the graph isn't representable under the graph's
/// engine generation.
pub fn write_binary(graph: &ResourceGraph) -> Result<Vec<u8>> {
    use pakrat_core::data::EndianWrite;

    let mut writer = ByteWriter::new(Endian::Little);
    writer.write_slice(&MAGIC);
    writer.write_u32(u32::from(graph.header.big_endian))?;
    writer.write_u32(u32::from(graph.header.use_real64))?;
    writer.write_u32(graph.header.engine_major)?;
    writer.write_u32(graph.header.engine_minor)?;
    writer.write_u32(graph.header.format_version)?;
    write_pooled_string(&mut writer, &graph.header.root_type)?;

    let import_md_patch_offset = writer.len();
    writer.write_u64(0)?; // patched below if import metadata is present
    writer.write_padding(0, 14 * 4);

    let mut flags = ResourceFlags::empty();
    if graph.uid.is_some() {
        flags |= ResourceFlags::UIDS;
    }
    if graph.script_class.is_some() {
        flags |= ResourceFlags::SCRIPT_CLASS;
    }
    if graph.header.format_version >= 3 {
        writer.write_u32(flags.bits())?;
        if let Some(uid) = graph.uid {
            writer.write_u64(uid)?;
        }
        if let Some(script_class) = &graph.script_class {
            write_pooled_string(&mut writer, script_class)?;
        }
    }

    let mut pool = graph.string_pool.clone();
    let names = pool.as_slice();
    writer.write_u32(names.len() as u32)?;
    for name in &names {
        write_pooled_string(&mut writer, name)?;
    }

    writer.write_u32(graph.external_resources.len() as u32)?;
    for ext in &graph.external_resources {
        write_pooled_string(&mut writer, &ext.type_name)?;
        write_pooled_string(&mut writer, &ext.path)?;
        if graph.header.format_version >= 3 {
            writer.write_u64(ext.uid.unwrap_or(0))?;
        }
    }

    writer.write_u32(graph.internal_resources.len() as u32)?;
    let mut offset_patch_positions = Vec::with_capacity(graph.internal_resources.len());
    for internal in &graph.internal_resources {
        write_pooled_string(&mut writer, &internal.local_path)?;
        offset_patch_positions.push(writer.len());
        writer.write_u64(0)?;
    }

    let generation = graph.header.generation();
    let real_width = graph.header.real_width();

    let is_scene = graph.header.root_type == "PackedScene";
    let last_index = graph.internal_resources.len().saturating_sub(1);

    let mut body_offsets = Vec::with_capacity(graph.internal_resources.len());
    for (index, internal) in graph.internal_resources.iter().enumerate() {
        body_offsets.push(writer.len() as u64);
        write_pooled_string(&mut writer, &internal.type_name)?;

        let owned_properties;
        let properties: &[(String, Variant)] = if is_scene && index == last_index {
            owned_properties = pack_internal_scene_properties(internal);
            &owned_properties
        } else {
            &internal.properties
        };

        writer.write_u32(properties.len() as u32)?;
        for (name, value) in properties {
            let index = pool.intern(name);
            writer.write_u32(index)?;
            let mut ctx = Context::new(generation, real_width).with_pool(&mut pool);
            variant::encode(&mut writer, &mut ctx, value)?;
        }
    }

    for (patch_at, offset) in offset_patch_positions.into_iter().zip(body_offsets) {
        writer.patch::<8>(patch_at, offset.to_le_bytes());
    }

    if let Some(metadata) = &graph.import_metadata {
        let offset = writer.len() as u64;
        writer.patch::<8>(import_md_patch_offset, offset.to_le_bytes());
        write_pooled_string(&mut writer, &metadata.editor)?;
        writer.write_u32(metadata.sources.len() as u32)?;
        for source in &metadata.sources {
            write_pooled_string(&mut writer, &source.path)?;
            write_pooled_string(&mut writer, &source.md5)?;
        }
        writer.write_u32(metadata.options.len() as u32)?;
        let mut option_pool = StringPool::new();
        for (name, value) in &metadata.options {
            write_pooled_string(&mut writer, name)?;
            let mut ctx = Context::new(EngineGeneration::V2, RealWidth::F32).with_pool(&mut option_pool);
            variant::encode(&mut writer, &mut ctx, value)?;
        }
    }

    Ok(writer.into_inner())
}

fn dict_value<'a>(fields: &'a [(Variant, Variant)], key: &str) -> Option<&'a Variant> {
    fields.iter().find_map(|(k, v)| matches!(k, Variant::String(s) if s == key).then_some(v))
}

fn dict_str<'a>(fields: &'a [(Variant, Variant)], key: &str) -> Option<&'a str> {
    match dict_value(fields, key) {
        Some(Variant::String(s)) => Some(s.as_str()),
        _ => None,
    }
}

fn dict_int(fields: &[(Variant, Variant)], key: &str) -> Option<i64> {
    match dict_value(fields, key)? {
        Variant::Int32(v) => Some(i64::from(*v)),
        Variant::Int64(v) => Some(*v),
        _ => None,
    }
}

fn dict_i32_array(fields: &[(Variant, Variant)], key: &str) -> Vec<i32> {
    match dict_value(fields, key) {
        Some(Variant::PackedInt32Array(v)) => v.clone(),
        _ => Vec::new(),
    }
}

fn dict_str_array(fields: &[(Variant, Variant)], key: &str) -> Vec<String> {
    match dict_value(fields, key) {
        Some(Variant::PackedStringArray(v)) => v.clone(),
        _ => Vec::new(),
    }
}

fn dict_array(fields: &[(Variant, Variant)], key: &str) -> Vec<Variant> {
    match dict_value(fields, key) {
        Some(Variant::Array(v)) => v.clone(),
        _ => Vec::new(),
    }
}

fn dict_dict(fields: &[(Variant, Variant)], key: &str) -> Vec<(Variant, Variant)> {
    match dict_value(fields, key) {
        Some(Variant::Dictionary(v)) => v.clone(),
        _ => Vec::new(),
    }
}

/// Renders a pooled `node_paths` entry (a `Variant::NodePath`, or plain `Variant::String` if
/// something upstream already flattened it) to the bare path text `write_node_section`'s
/// `parent`/`owner` attributes expect — distinct from [`crate::text`]'s `NodePath("...")`
/// value-literal rendering.
fn variant_to_path_string(value: &Variant) -> String {
    match value {
        Variant::NodePath(path) => node_path_to_string(path),
        Variant::String(s) => s.clone(),
        _ => String::new(),
    }
}

fn node_path_to_string(path: &NodePath) -> String {
    if path.names.is_empty() {
        return ".".to_owned();
    }
    let mut rendered = String::new();
    if path.absolute {
        rendered.push('/');
    }
    rendered.push_str(&path.names.join("/"));
    rendered
}

fn node_path_from_string(raw: &str) -> NodePath {
    if raw.is_empty() || raw == "." {
        return NodePath { names: Vec::new(), subnames: Vec::new(), absolute: false };
    }
    let absolute = raw.starts_with('/');
    let names = raw.trim_start_matches('/').split('/').map(str::to_owned).collect();
    NodePath { names, subnames: Vec::new(), absolute }
}

fn pooled_name(names: &[String], idx: i32) -> String {
    if idx < 0 {
        String::new()
    } else {
        names.get(idx as usize).cloned().unwrap_or_default()
    }
}

fn pooled_path(node_paths: &[Variant], idx: i32) -> Option<String> {
    if idx < 0 {
        None
    } else {
        node_paths.get(idx as usize).map(variant_to_path_string)
    }
}

fn pooled_value(variants: &[Variant], idx: i32) -> Variant {
    if idx < 0 {
        Variant::Nil
    } else {
        variants.get(idx as usize).cloned().unwrap_or(Variant::Nil)
    }
}

fn next_i32(packed: &[i32], cursor: &mut usize, breadcrumb: &'static str) -> Result<i32> {
    let value = *packed.get(*cursor).ok_or_else(|| corrupt(breadcrumb, "truncated record"))?;
    *cursor += 1;
    Ok(value)
}

/// §4.4 scene reconstruction: unpacks a `PackedScene` main resource's `_bundled` Dictionary into
/// the `"nodes"`/`"connections"`/`"editable_paths"` properties [`crate::text::write_text`] already
/// knows how to render.
///
/// The per-node field order (`parent, owner, type, name, instance, index, …`) and per-connection
/// field order (`from, to, signal, method, flags, unbinds, …`) mirror the argument order of
/// `SceneState::add_node`/`add_connection` exactly as gdsdecomp's
/// `compat/resource_compat_text.cpp` text parser calls them. The `_bundled` dictionary's own flat
/// int-array packing isn't in the retrieved corpus; see DESIGN.md for that gap.
fn unpack_scene_state(bundled: &[(Variant, Variant)]) -> Result<Vec<(String, Variant)>> {
    let names = dict_str_array(bundled, "names");
    let variants = dict_array(bundled, "variants");
    let node_paths = dict_array(bundled, "node_paths");
    let editable = dict_array(bundled, "editable_instances");
    let nodes_packed = dict_i32_array(bundled, "nodes");
    let conns_packed = dict_i32_array(bundled, "conns");
    let node_count = dict_int(bundled, "node_count").unwrap_or(0).max(0) as usize;
    let conn_count = dict_int(bundled, "conn_count").unwrap_or(0).max(0) as usize;

    let mut cursor = 0usize;
    let mut nodes_out = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        let parent = next_i32(&nodes_packed, &mut cursor, "_bundled.nodes")?;
        let owner = next_i32(&nodes_packed, &mut cursor, "_bundled.nodes")?;
        let type_idx = next_i32(&nodes_packed, &mut cursor, "_bundled.nodes")?;
        let name_idx = next_i32(&nodes_packed, &mut cursor, "_bundled.nodes")?;
        let _instance_idx = next_i32(&nodes_packed, &mut cursor, "_bundled.nodes")?;
        let _index = next_i32(&nodes_packed, &mut cursor, "_bundled.nodes")?;
        let prop_count = next_i32(&nodes_packed, &mut cursor, "_bundled.nodes")?.max(0) as usize;
        let mut properties = Vec::with_capacity(prop_count);
        for _ in 0..prop_count {
            let prop_name_idx = next_i32(&nodes_packed, &mut cursor, "_bundled.nodes")?;
            let prop_value_idx = next_i32(&nodes_packed, &mut cursor, "_bundled.nodes")?;
            properties.push((
                Variant::String(pooled_name(&names, prop_name_idx)),
                pooled_value(&variants, prop_value_idx),
            ));
        }
        let group_count = next_i32(&nodes_packed, &mut cursor, "_bundled.nodes")?.max(0) as usize;
        let mut groups = Vec::with_capacity(group_count);
        for _ in 0..group_count {
            let group_name_idx = next_i32(&nodes_packed, &mut cursor, "_bundled.nodes")?;
            groups.push(Variant::String(pooled_name(&names, group_name_idx)));
        }

        let mut fields = vec![(Variant::String("name".to_owned()), Variant::String(pooled_name(&names, name_idx)))];
        if type_idx >= 0 {
            fields.push((Variant::String("type".to_owned()), Variant::String(pooled_name(&names, type_idx))));
        }
        if let Some(parent_path) = pooled_path(&node_paths, parent) {
            fields.push((Variant::String("parent".to_owned()), Variant::String(parent_path)));
        }
        if let Some(owner_path) = pooled_path(&node_paths, owner) {
            fields.push((Variant::String("owner".to_owned()), Variant::String(owner_path)));
        }
        if !groups.is_empty() {
            fields.push((Variant::String("groups".to_owned()), Variant::Array(groups)));
        }
        fields.push((Variant::String("properties".to_owned()), Variant::Dictionary(properties)));
        nodes_out.push(Variant::Dictionary(fields));
    }

    let mut ccursor = 0usize;
    let mut connections_out = Vec::with_capacity(conn_count);
    for _ in 0..conn_count {
        let from = next_i32(&conns_packed, &mut ccursor, "_bundled.conns")?;
        let to = next_i32(&conns_packed, &mut ccursor, "_bundled.conns")?;
        let signal = next_i32(&conns_packed, &mut ccursor, "_bundled.conns")?;
        let method = next_i32(&conns_packed, &mut ccursor, "_bundled.conns")?;
        let flags = next_i32(&conns_packed, &mut ccursor, "_bundled.conns")?;
        let unbinds = next_i32(&conns_packed, &mut ccursor, "_bundled.conns")?;
        let bind_count = next_i32(&conns_packed, &mut ccursor, "_bundled.conns")?.max(0) as usize;
        let mut binds = Vec::with_capacity(bind_count);
        for _ in 0..bind_count {
            let bind_idx = next_i32(&conns_packed, &mut ccursor, "_bundled.conns")?;
            binds.push(pooled_value(&variants, bind_idx));
        }

        let mut fields = vec![
            (Variant::String("signal".to_owned()), Variant::String(pooled_name(&names, signal))),
            (Variant::String("from".to_owned()), Variant::String(pooled_path(&node_paths, from).unwrap_or_else(|| ".".to_owned()))),
            (Variant::String("to".to_owned()), Variant::String(pooled_path(&node_paths, to).unwrap_or_else(|| ".".to_owned()))),
            (Variant::String("method".to_owned()), Variant::String(pooled_name(&names, method))),
        ];
        if flags != CONNECT_PERSIST {
            fields.push((Variant::String("flags".to_owned()), Variant::Int32(flags)));
        }
        if unbinds != 0 {
            fields.push((Variant::String("unbinds".to_owned()), Variant::Int32(unbinds)));
        }
        if !binds.is_empty() {
            fields.push((Variant::String("binds".to_owned()), Variant::Array(binds)));
        }
        connections_out.push(Variant::Dictionary(fields));
    }

    let editable_out: Vec<Variant> = editable.iter().map(|v| Variant::String(variant_to_path_string(v))).collect();

    Ok(vec![
        ("nodes".to_owned(), Variant::Array(nodes_out)),
        ("connections".to_owned(), Variant::Array(connections_out)),
        ("editable_paths".to_owned(), Variant::Array(editable_out)),
    ])
}

/// Interns names/values/paths into `_bundled`'s pools while packing; mirrors the accumulate-as-you-
/// go shape `SceneState::add_name`/`add_node_path` have in `compat/resource_compat_text.cpp`.
#[derive(Default)]
struct ScenePacker {
    names: Vec<String>,
    variants: Vec<Variant>,
    node_paths: Vec<Variant>,
}

impl ScenePacker {
    fn intern_name(&mut self, value: &str) -> i32 {
        if let Some(pos) = self.names.iter().position(|n| n == value) {
            pos as i32
        } else {
            self.names.push(value.to_owned());
            (self.names.len() - 1) as i32
        }
    }

    fn intern_path(&mut self, value: &str) -> i32 {
        let rendered = node_path_from_string(value);
        if let Some(pos) = self.node_paths.iter().position(|p| matches!(p, Variant::NodePath(existing) if *existing == rendered)) {
            pos as i32
        } else {
            self.node_paths.push(Variant::NodePath(rendered));
            (self.node_paths.len() - 1) as i32
        }
    }

    fn intern_value(&mut self, value: Variant) -> i32 {
        self.variants.push(value);
        (self.variants.len() - 1) as i32
    }
}

/// Inverse of [`unpack_scene_state`]: packs the `"nodes"`/`"connections"`/`"editable_paths"`
/// synthetic properties a scene [`ResourceGraph`] carries back into the `_bundled` Dictionary shape
/// a real Godot binary resource expects for its `PackedScene` main resource.
fn pack_scene_state(nodes: &Variant, connections: &Variant, editable: &Variant) -> Variant {
    let mut packer = ScenePacker::default();
    let mut nodes_packed: Vec<i32> = Vec::new();
    let mut node_count = 0i32;

    if let Variant::Array(entries) = nodes {
        node_count = entries.len() as i32;
        for entry in entries {
            let Variant::Dictionary(fields) = entry else { continue };
            let name = dict_str(fields, "name").unwrap_or_default();
            let type_name = dict_str(fields, "type");
            let parent = dict_str(fields, "parent");
            let owner = dict_str(fields, "owner");
            let groups = dict_array(fields, "groups");
            let properties = dict_dict(fields, "properties");

            nodes_packed.push(parent.map_or(-1, |p| packer.intern_path(p)));
            nodes_packed.push(owner.map_or(-1, |o| packer.intern_path(o)));
            nodes_packed.push(type_name.map_or(-1, |t| packer.intern_name(t)));
            nodes_packed.push(packer.intern_name(name));
            nodes_packed.push(-1); // instance: not part of the §4.4 node shape this crate carries
            nodes_packed.push(-1); // index: not part of the §4.4 node shape this crate carries
            nodes_packed.push(properties.len() as i32);
            for (prop_name, prop_value) in &properties {
                let Variant::String(prop_name) = prop_name else { continue };
                nodes_packed.push(packer.intern_name(prop_name));
                nodes_packed.push(packer.intern_value(prop_value.clone()));
            }
            nodes_packed.push(groups.len() as i32);
            for group in &groups {
                if let Variant::String(group_name) = group {
                    nodes_packed.push(packer.intern_name(group_name));
                }
            }
        }
    }

    let mut conns_packed: Vec<i32> = Vec::new();
    let mut conn_count = 0i32;
    let mut max_unbinds = 0i32;
    if let Variant::Array(entries) = connections {
        conn_count = entries.len() as i32;
        for entry in entries {
            let Variant::Dictionary(fields) = entry else { continue };
            let signal = dict_str(fields, "signal").unwrap_or_default();
            let from = dict_str(fields, "from").unwrap_or(".");
            let to = dict_str(fields, "to").unwrap_or(".");
            let method = dict_str(fields, "method").unwrap_or_default();
            let flags = dict_int(fields, "flags").map_or(CONNECT_PERSIST, |v| v as i32);
            let unbinds = dict_int(fields, "unbinds").map_or(0, |v| v as i32);
            let binds = dict_array(fields, "binds");

            conns_packed.push(packer.intern_path(from));
            conns_packed.push(packer.intern_path(to));
            conns_packed.push(packer.intern_name(signal));
            conns_packed.push(packer.intern_name(method));
            conns_packed.push(flags);
            conns_packed.push(unbinds);
            conns_packed.push(binds.len() as i32);
            for bind in &binds {
                conns_packed.push(packer.intern_value(bind.clone()));
            }
            max_unbinds = max_unbinds.max(unbinds);
        }
    }

    let editable_out: Vec<Variant> = match editable {
        Variant::Array(entries) => entries
            .iter()
            .map(|v| match v {
                Variant::String(path) => Variant::NodePath(node_path_from_string(path)),
                other => other.clone(),
            })
            .collect(),
        _ => Vec::new(),
    };

    // `compat/resource_compat_text.cpp` only bumps `packed_scene_version` to 3 when a connection
    // carries unbinds.
    let version = if max_unbinds != 0 { 3 } else { 2 };

    Variant::Dictionary(vec![
        (Variant::String("version".to_owned()), Variant::Int32(version)),
        (Variant::String("names".to_owned()), Variant::PackedStringArray(packer.names)),
        (Variant::String("variants".to_owned()), Variant::Array(packer.variants)),
        (Variant::String("node_count".to_owned()), Variant::Int32(node_count)),
        (Variant::String("nodes".to_owned()), Variant::PackedInt32Array(nodes_packed)),
        (Variant::String("conn_count".to_owned()), Variant::Int32(conn_count)),
        (Variant::String("conns".to_owned()), Variant::PackedInt32Array(conns_packed)),
        (Variant::String("node_paths".to_owned()), Variant::Array(packer.node_paths)),
        (Variant::String("editable_instances".to_owned()), Variant::Array(editable_out)),
    ])
}

/// For the scene main resource, replaces its `"nodes"`/`"connections"`/`"editable_paths"`
/// properties with a single packed `"_bundled"` Dictionary; any other property passes through
/// unchanged. Internal resources that never carried the synthetic scene shape (no `"nodes"` key)
/// pass through verbatim.
fn pack_internal_scene_properties(internal: &InternalRes) -> Vec<(String, Variant)> {
    let Some(nodes) = internal.properties.iter().find(|(name, _)| name == "nodes").map(|(_, v)| v) else {
        return internal.properties.clone();
    };
    let empty_connections = Variant::Array(Vec::new());
    let empty_editable = Variant::Array(Vec::new());
    let connections = internal.properties.iter().find(|(name, _)| name == "connections").map_or(&empty_connections, |(_, v)| v);
    let editable = internal.properties.iter().find(|(name, _)| name == "editable_paths").map_or(&empty_editable, |(_, v)| v);

    let bundled = pack_scene_state(nodes, connections, editable);
    let mut out: Vec<(String, Variant)> = internal
        .properties
        .iter()
        .filter(|(name, _)| !matches!(name.as_str(), "nodes" | "connections" | "editable_paths"))
        .cloned()
        .collect();
    out.push(("_bundled".to_owned(), bundled));
    out
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pakrat_core::data::EndianWrite;
    use pakrat_core::stream::ByteReader;

    use super::*;

    fn minimal_graph() -> ResourceGraph {
        ResourceGraph {
            header: FormatHeader {
                big_endian: false,
                use_real64: false,
                engine_major: 4,
                engine_minor: 2,
                format_version: 3,
                root_type: "StandardMaterial3D".to_owned(),
            },
            string_pool: StringPool::from_entries(vec!["albedo_color".to_owned()]),
            external_resources: vec![ExternalRef {
                type_name: "Texture2D".to_owned(),
                path: "res://x.png".to_owned(),
                uid: None,
                binding: ExternalBinding::Unresolved,
            }],
            internal_resources: vec![InternalRes {
                local_path: String::new(),
                type_name: "StandardMaterial3D".to_owned(),
                subindex: 1,
                properties: vec![("albedo_color".to_owned(), Variant::Bool(true))],
            }],
            import_metadata: None,
            script_class: None,
            uid: None,
            dependency_errors: Vec::new(),
        }
    }

    struct StubResolver;
    impl ResourceResolver for StubResolver {
        fn resolve(&mut self, path: &str, type_hint: &str, _uid: Option<u64>) -> Result<Variant> {
            Ok(Variant::String(format!("{type_hint}@{path}")))
        }
    }

    struct FailingResolver;
    impl ResourceResolver for FailingResolver {
        fn resolve(&mut self, path: &str, _type_hint: &str, _uid: Option<u64>) -> Result<Variant> {
            Err(corrupt("resolver", format!("no such resource {path}")))
        }
    }

    fn encode_minimal() -> Vec<u8> {
        write_binary(&minimal_graph()).unwrap()
    }

    #[test]
    fn fake_load_stands_in_for_externals() {
        let bytes = encode_minimal();
        let mut reader = ByteReader::new(Cursor::new(bytes), Endian::Little);
        let mut policy = LoadPolicy::FakeLoad { fake_internals: false };
        let graph = load_binary(&mut reader, &mut policy).unwrap();
        assert_eq!(graph.external_resources.len(), 1);
        assert!(matches!(graph.external_resources[0].binding, ExternalBinding::Fake(_)));
        assert_eq!(graph.main_resource().unwrap().type_name, "StandardMaterial3D");
    }

    #[test]
    fn real_load_resolves_externals_via_injected_resolver() {
        let bytes = encode_minimal();
        let mut reader = ByteReader::new(Cursor::new(bytes), Endian::Little);
        let mut resolver = StubResolver;
        let mut policy = LoadPolicy::RealLoad { resolver: &mut resolver, abort_on_missing: true };
        let graph = load_binary(&mut reader, &mut policy).unwrap();
        assert_eq!(
            graph.external_resources[0].binding,
            ExternalBinding::Resolved(Variant::String("Texture2D@res://x.png".to_owned()))
        );
    }

    #[test]
    fn real_load_aborts_on_missing_when_requested() {
        let bytes = encode_minimal();
        let mut reader = ByteReader::new(Cursor::new(bytes), Endian::Little);
        let mut resolver = FailingResolver;
        let mut policy = LoadPolicy::RealLoad { resolver: &mut resolver, abort_on_missing: true };
        let err = load_binary(&mut reader, &mut policy).unwrap_err();
        assert!(matches!(err, Error::DependencyMissing { .. }));
    }

    #[test]
    fn real_load_demotes_missing_when_not_aborting() {
        let bytes = encode_minimal();
        let mut reader = ByteReader::new(Cursor::new(bytes), Endian::Little);
        let mut resolver = FailingResolver;
        let mut policy = LoadPolicy::RealLoad { resolver: &mut resolver, abort_on_missing: false };
        let graph = load_binary(&mut reader, &mut policy).unwrap();
        assert_eq!(graph.dependency_errors, vec!["res://x.png".to_owned()]);
        assert!(matches!(graph.external_resources[0].binding, ExternalBinding::Fake(_)));
    }

    fn packed_scene_graph() -> ResourceGraph {
        ResourceGraph {
            header: FormatHeader {
                big_endian: false,
                use_real64: false,
                engine_major: 4,
                engine_minor: 2,
                format_version: 3,
                root_type: "PackedScene".to_owned(),
            },
            string_pool: StringPool::new(),
            external_resources: Vec::new(),
            internal_resources: vec![InternalRes {
                local_path: String::new(),
                type_name: "PackedScene".to_owned(),
                subindex: 1,
                properties: vec![
                    (
                        "nodes".to_owned(),
                        Variant::Array(vec![
                            Variant::Dictionary(vec![
                                (Variant::String("name".to_owned()), Variant::String("Root".to_owned())),
                                (Variant::String("type".to_owned()), Variant::String("Node2D".to_owned())),
                                (
                                    Variant::String("properties".to_owned()),
                                    Variant::Dictionary(vec![(
                                        Variant::String("position".to_owned()),
                                        Variant::Vector2(crate::math::Vector2 { x: 1.0, y: 2.0 }),
                                    )]),
                                ),
                            ]),
                            Variant::Dictionary(vec![
                                (Variant::String("name".to_owned()), Variant::String("Child".to_owned())),
                                (Variant::String("type".to_owned()), Variant::String("Sprite2D".to_owned())),
                                (Variant::String("parent".to_owned()), Variant::String(".".to_owned())),
                                (
                                    Variant::String("groups".to_owned()),
                                    Variant::Array(vec![Variant::String("enemies".to_owned())]),
                                ),
                                (Variant::String("properties".to_owned()), Variant::Dictionary(Vec::new())),
                            ]),
                        ]),
                    ),
                    (
                        "connections".to_owned(),
                        Variant::Array(vec![Variant::Dictionary(vec![
                            (Variant::String("signal".to_owned()), Variant::String("pressed".to_owned())),
                            (Variant::String("from".to_owned()), Variant::String("Child".to_owned())),
                            (Variant::String("to".to_owned()), Variant::String(".".to_owned())),
                            (Variant::String("method".to_owned()), Variant::String("_on_pressed".to_owned())),
                        ])]),
                    ),
                    ("editable_paths".to_owned(), Variant::Array(vec![Variant::String("Child".to_owned())])),
                ],
            }],
            import_metadata: None,
            script_class: None,
            uid: None,
            dependency_errors: Vec::new(),
        }
    }

    #[test]
    fn binary_packed_scene_round_trips_into_populated_text() {
        let bytes = write_binary(&packed_scene_graph()).unwrap();
        let mut reader = ByteReader::new(Cursor::new(bytes), Endian::Little);
        let mut policy = LoadPolicy::FakeLoad { fake_internals: false };
        let loaded = load_binary(&mut reader, &mut policy).unwrap();

        let main = loaded.main_resource().unwrap();
        assert!(main.properties.iter().any(|(name, _)| name == "nodes"));
        assert!(!main.properties.iter().any(|(name, _)| name == "_bundled"));

        let text = crate::text::write_text(&loaded).unwrap();
        assert!(text.contains("[node name=\"Root\" type=\"Node2D\"]"));
        assert!(text.contains("position = Vector2(1, 2)"));
        assert!(text.contains("[node name=\"Child\" type=\"Sprite2D\" parent=\".\"]"));
        assert!(text.contains("groups = [\"enemies\"]"));
        assert!(text.contains("[connection signal=\"pressed\" from=\"Child\" to=\".\" method=\"_on_pressed\"]"));
        assert!(text.contains("[editable path=\"Child\"]"));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut writer = ByteWriter::new(Endian::Little);
        writer.write_slice(b"XXXX");
        let mut reader = ByteReader::new(Cursor::new(writer.into_inner()), Endian::Little);
        let mut policy = LoadPolicy::FakeLoad { fake_internals: false };
        assert!(matches!(load_binary(&mut reader, &mut policy), Err(Error::BadMagic { .. })));
    }
}
