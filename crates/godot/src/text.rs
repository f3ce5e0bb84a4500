//! §4.4 resource text writer — renders a [`ResourceGraph`](crate::resource::ResourceGraph) as the
//! `[gd_scene]`/`[gd_resource]` text format Godot's editor and `ResourceFormatLoaderText` both read
//! — and [`parse_text`], which reads that same format back into a graph (§8 invariant 3 requires
//! `write_text` to round-trip through a parser, not just render). A node's packed scene state is
//! represented in [`ResourceGraph`] as plain typed fields (`"nodes"`/`"connections"`/
//! `"editable_paths"` properties on the main resource) rather than Godot's own flattened
//! `PackedScene` arrays: [`crate::resource`]'s binary loader decodes a real `PackedScene`'s
//! `_bundled` SceneState Dictionary into this same shape before this module ever sees it (and packs
//! it back on the way out), so this writer only ever deals with the one shape regardless of whether
//! the graph came from a `.tscn` parse or a binary `.scn` load. See `DESIGN.md` for how that
//! `_bundled` decode is grounded.

use std::fmt::Write as _;

use hashbrown::HashMap;

use crate::error::{corrupt, Result};
use crate::math::{
    Aabb, Basis, Color, Plane, Quaternion, Rect2, Rect2i, Transform2D, Transform3D, Vector2,
    Vector2i, Vector3, Vector3i,
};
use crate::resource::{ExternalBinding, ExternalRef, FormatHeader, InternalRes, ResourceGraph};
use crate::variant::{NodePath, ObjectRef, StringPool, Variant};

/// Builds the full text document for `graph`.
///
/// # Errors
/// [`Error::CorruptData`](crate::error::Error::CorruptData) if a property value references an
/// [`ObjectRef::InternalByIndex`]/[`ObjectRef::ExternalByIndex`] with no matching entry in `graph`.
pub fn write_text(graph: &ResourceGraph) -> Result<String> {
    let is_scene = graph.header.root_type == "PackedScene";
    let ids = ReferenceIds::build(graph);

    let mut out = String::new();
    write_header(&mut out, graph, is_scene);
    out.push('\n');

    for (index, ext) in graph.external_resources.iter().enumerate() {
        write_ext_resource_header(&mut out, ext, ids.ext_id(index));
        out.push('\n');
    }
    if !graph.external_resources.is_empty() {
        out.push('\n');
    }

    let internal_count = graph.internal_resources.len();
    for (index, internal) in graph.internal_resources.iter().enumerate() {
        let is_main = index + 1 == internal_count;
        if is_main {
            if is_scene {
                write_scene_body(&mut out, internal, &ids, graph)?;
            } else {
                writeln!(out, "[resource]").expect("String writes never fail");
                write_properties(&mut out, internal, &ids, graph)?;
            }
        } else {
            writeln!(out, "[sub_resource type=\"{}\" id=\"{}\"]", internal.type_name, ids.sub_id(internal.subindex))
                .expect("String writes never fail");
            write_properties(&mut out, internal, &ids, graph)?;
        }
        out.push('\n');
    }

    while out.ends_with("\n\n") {
        out.truncate(out.len() - 1);
    }
    Ok(out)
}

fn write_header(out: &mut String, graph: &ResourceGraph, is_scene: bool) {
    let tag = if is_scene { "gd_scene" } else { "gd_resource" };
    let load_steps = graph.external_resources.len() + graph.internal_resources.len();

    let mut attrs = String::new();
    if !is_scene {
        let _ = write!(attrs, " type=\"{}\"", graph.header.root_type);
    }
    if let Some(script_class) = &graph.script_class {
        let _ = write!(attrs, " script_class=\"{script_class}\"");
    }
    let _ = write!(attrs, " load_steps={load_steps} format={}", graph.header.format_version);
    if let Some(uid) = graph.uid {
        let _ = write!(attrs, " uid=\"uid://{uid:x}\"");
    }
    let _ = writeln!(out, "[{tag}{attrs}]");
}

fn write_ext_resource_header(out: &mut String, ext: &crate::resource::ExternalRef, id: String) {
    let _ = writeln!(out, "[ext_resource type=\"{}\" path=\"{}\" id=\"{id}\"]", ext.type_name, ext.path);
}

fn write_properties(
    out: &mut String,
    internal: &InternalRes,
    ids: &ReferenceIds,
    graph: &ResourceGraph,
) -> Result<()> {
    for (name, value) in &internal.properties {
        let rendered = print_variant(value, ids, graph)?;
        let _ = writeln!(out, "{} = {rendered}", print_property_name(name));
    }
    Ok(())
}

fn write_scene_body(
    out: &mut String,
    main: &InternalRes,
    ids: &ReferenceIds,
    graph: &ResourceGraph,
) -> Result<()> {
    let nodes = main.properties.iter().find(|(name, _)| name == "nodes").map(|(_, v)| v);
    let connections = main.properties.iter().find(|(name, _)| name == "connections").map(|(_, v)| v);
    let editable_paths = main.properties.iter().find(|(name, _)| name == "editable_paths").map(|(_, v)| v);
    let skip = ["nodes", "connections", "editable_paths"];

    if let Some(Variant::Array(entries)) = nodes {
        for entry in entries {
            write_node_section(out, entry, ids, graph)?;
        }
    }
    if let Some(Variant::Array(entries)) = connections {
        for entry in entries {
            write_connection_section(out, entry)?;
        }
    }
    if let Some(Variant::Array(entries)) = editable_paths {
        for entry in entries {
            if let Variant::String(path) = entry {
                let _ = writeln!(out, "[editable path=\"{path}\"]");
            }
        }
    }

    let leftover: Vec<_> = main.properties.iter().filter(|(name, _)| !skip.contains(&name.as_str())).collect();
    if !leftover.is_empty() {
        let _ = writeln!(out, "[resource]");
        for (name, value) in leftover {
            let rendered = print_variant(value, ids, graph)?;
            let _ = writeln!(out, "{} = {rendered}", print_property_name(name));
        }
    }
    Ok(())
}

fn write_node_section(out: &mut String, entry: &Variant, ids: &ReferenceIds, graph: &ResourceGraph) -> Result<()> {
    let Variant::Dictionary(fields) = entry else {
        return Err(corrupt("scene node entry", "expected a Dictionary"));
    };
    let name = dict_str(fields, "name").unwrap_or("Node");
    let kind = dict_str(fields, "type");
    let parent = dict_str(fields, "parent");
    let owner = dict_str(fields, "owner");

    let mut attrs = format!(" name=\"{name}\"");
    if let Some(kind) = kind {
        let _ = write!(attrs, " type=\"{kind}\"");
    }
    if let Some(parent) = parent {
        let _ = write!(attrs, " parent=\"{parent}\"");
    }
    if let Some(owner) = owner {
        let _ = write!(attrs, " owner=\"{owner}\"");
    }
    let _ = writeln!(out, "[node{attrs}]");

    if let Some((_, Variant::Array(groups))) = fields.iter().find(|(k, _)| matches!(k, Variant::String(s) if s == "groups")) {
        if !groups.is_empty() {
            let rendered: Vec<String> = groups.iter().map(|g| print_variant(g, ids, graph)).collect::<Result<_>>()?;
            let _ = writeln!(out, "groups = [{}]", rendered.join(", "));
        }
    }
    if let Some((_, Variant::Dictionary(properties))) = fields.iter().find(|(k, _)| matches!(k, Variant::String(s) if s == "properties")) {
        for (key, value) in properties {
            let Variant::String(key) = key else { continue };
            let rendered = print_variant(value, ids, graph)?;
            let _ = writeln!(out, "{} = {rendered}", print_property_name(key));
        }
    }
    Ok(())
}

fn write_connection_section(out: &mut String, entry: &Variant) -> Result<()> {
    let Variant::Dictionary(fields) = entry else {
        return Err(corrupt("scene connection entry", "expected a Dictionary"));
    };
    let signal = dict_str(fields, "signal").unwrap_or_default();
    let from = dict_str(fields, "from").unwrap_or_default();
    let to = dict_str(fields, "to").unwrap_or_default();
    let method = dict_str(fields, "method").unwrap_or_default();
    let mut attrs = format!(" signal=\"{signal}\" from=\"{from}\" to=\"{to}\" method=\"{method}\"");
    if let Some((_, Variant::Int32(flags))) = fields.iter().find(|(k, _)| matches!(k, Variant::String(s) if s == "flags")) {
        let _ = write!(attrs, " flags={flags}");
    }
    if let Some((_, Variant::Int32(unbinds))) = fields.iter().find(|(k, _)| matches!(k, Variant::String(s) if s == "unbinds")) {
        let _ = write!(attrs, " unbinds={unbinds}");
    }
    // "binds" is an array-valued attribute; this module's header-tag parser (`parse_attrs`) only
    // understands scalar bareword/quoted-string values, so it isn't rendered here — emitting it
    // would produce text this same module's `parse_text` couldn't read back (§8 invariant 3).
    let _ = writeln!(out, "[connection{attrs}]");
    Ok(())
}

fn dict_str<'a>(fields: &'a [(Variant, Variant)], key: &str) -> Option<&'a str> {
    fields.iter().find_map(|(k, v)| match (k, v) {
        (Variant::String(name), Variant::String(value)) if name == key => Some(value.as_str()),
        _ => None,
    })
}

/// Quotes a property name unless it's already a valid bare identifier.
fn print_property_name(name: &str) -> String {
    let is_identifier =
        !name.is_empty() && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '/');
    if is_identifier {
        name.to_owned()
    } else {
        format!("\"{}\"", escape_string(name))
    }
}

fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

fn print_float(value: f64) -> String {
    if value == 0.0 {
        "0".to_owned()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

/// Resolves [`ObjectRef::InternalByIndex`]/[`ObjectRef::ExternalByIndex`] to their text id.
struct ReferenceIds {
    ext_suffixes: Vec<String>,
    format_version: u32,
}

impl ReferenceIds {
    fn build(graph: &ResourceGraph) -> Self {
        let ext_suffixes = graph.external_resources.iter().map(|ext| fnv_suffix(&ext.path)).collect();
        Self { ext_suffixes, format_version: graph.header.format_version }
    }

    fn ext_id(&self, index: usize) -> String {
        if self.format_version >= 3 {
            format!("{}_{}", index + 1, self.ext_suffixes[index])
        } else {
            format!("{}", index + 1)
        }
    }

    fn sub_id(&self, subindex: u32) -> String {
        subindex.to_string()
    }
}

/// A short, deterministic stand-in for the random suffix Godot's editor assigns to ext_resource
/// string ids (e.g. `"1_abcd"`). Stable across re-emits of the same graph since it's derived from
/// the resource path rather than generated fresh each time.
fn fnv_suffix(path: &str) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in path.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    let alphabet = b"abcdefghijklmnopqrstuvwxyz";
    (0..5).map(|i| alphabet[((hash >> (i * 5)) % 26) as usize] as char).collect()
}

fn print_variant(value: &Variant, ids: &ReferenceIds, graph: &ResourceGraph) -> Result<String> {
    Ok(match value {
        Variant::Nil => "null".to_owned(),
        Variant::Bool(b) => b.to_string(),
        Variant::Int32(v) => v.to_string(),
        Variant::Int64(v) => v.to_string(),
        Variant::Float32(v) => print_float(f64::from(*v)),
        Variant::Float64(v) => print_float(*v),
        Variant::String(s) | Variant::StringName(s) => format!("\"{}\"", escape_string(s)),
        Variant::Vector2(v) => format!("Vector2({}, {})", print_float(v.x), print_float(v.y)),
        Variant::Vector2i(v) => format!("Vector2i({}, {})", v.x, v.y),
        Variant::Vector3(v) => format!("Vector3({}, {}, {})", print_float(v.x), print_float(v.y), print_float(v.z)),
        Variant::Vector3i(v) => format!("Vector3i({}, {}, {})", v.x, v.y, v.z),
        Variant::Color(c) => format!("Color({}, {}, {}, {})", c.r, c.g, c.b, c.a),
        Variant::Rect2(r) => format!(
            "Rect2({}, {}, {}, {})",
            print_float(r.position.x),
            print_float(r.position.y),
            print_float(r.size.x),
            print_float(r.size.y)
        ),
        Variant::Rect2i(r) => format!("Rect2i({}, {}, {}, {})", r.position.x, r.position.y, r.size.x, r.size.y),
        Variant::Plane(p) => {
            format!("Plane({}, {}, {}, {})", print_float(p.normal.x), print_float(p.normal.y), print_float(p.normal.z), print_float(p.d))
        }
        Variant::Quaternion(q) => {
            format!("Quaternion({}, {}, {}, {})", print_float(q.x), print_float(q.y), print_float(q.z), print_float(q.w))
        }
        Variant::Aabb(a) => format!(
            "AABB({}, {}, {}, {}, {}, {})",
            print_float(a.position.x),
            print_float(a.position.y),
            print_float(a.position.z),
            print_float(a.size.x),
            print_float(a.size.y),
            print_float(a.size.z)
        ),
        Variant::Basis(b) => {
            let v = b.rows;
            format!(
                "Basis({}, {}, {}, {}, {}, {}, {}, {}, {})",
                print_float(v[0].x), print_float(v[0].y), print_float(v[0].z),
                print_float(v[1].x), print_float(v[1].y), print_float(v[1].z),
                print_float(v[2].x), print_float(v[2].y), print_float(v[2].z)
            )
        }
        Variant::Transform2D(t) => format!(
            "Transform2D({}, {}, {}, {}, {}, {})",
            print_float(t.x.x), print_float(t.x.y), print_float(t.y.x), print_float(t.y.y), print_float(t.origin.x), print_float(t.origin.y)
        ),
        Variant::Transform3D(t) => {
            let v = t.basis.rows;
            format!(
                "Transform3D({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
                print_float(v[0].x), print_float(v[0].y), print_float(v[0].z),
                print_float(v[1].x), print_float(v[1].y), print_float(v[1].z),
                print_float(v[2].x), print_float(v[2].y), print_float(v[2].z),
                print_float(t.origin.x), print_float(t.origin.y), print_float(t.origin.z)
            )
        }
        Variant::NodePath(path) => {
            let mut rendered = String::new();
            if path.absolute {
                rendered.push('/');
            }
            rendered.push_str(&path.names.join("/"));
            for subname in &path.subnames {
                let _ = write!(rendered, ":{subname}");
            }
            format!("NodePath(\"{rendered}\")")
        }
        Variant::Rid(id) => format!("RID({id})"),
        Variant::Object(obj) => print_object_ref(obj, ids, graph)?,
        Variant::Dictionary(entries) => {
            let mut sorted: Vec<_> = entries.iter().collect();
            sorted.sort_by(|(a, _), (b, _)| variant_cmp(a, b));
            let rendered: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| Ok(format!("{}: {}", print_variant(k, ids, graph)?, print_variant(v, ids, graph)?)))
                .collect::<Result<_>>()?;
            format!("{{\n{}\n}}", rendered.iter().map(|line| format!("{line},")).collect::<Vec<_>>().join("\n"))
        }
        Variant::Array(entries) => {
            let rendered: Vec<String> = entries.iter().map(|v| print_variant(v, ids, graph)).collect::<Result<_>>()?;
            format!("[{}]", rendered.join(", "))
        }
        Variant::PackedByteArray(bytes) => {
            format!("PackedByteArray({})", bytes.iter().map(u8::to_string).collect::<Vec<_>>().join(", "))
        }
        Variant::PackedInt32Array(v) => format!("PackedInt32Array({})", v.iter().map(i32::to_string).collect::<Vec<_>>().join(", ")),
        Variant::PackedInt64Array(v) => format!("PackedInt64Array({})", v.iter().map(i64::to_string).collect::<Vec<_>>().join(", ")),
        Variant::PackedFloat32Array(v) => format!("PackedFloat32Array({})", v.iter().map(|f| print_float(f64::from(*f))).collect::<Vec<_>>().join(", ")),
        Variant::PackedFloat64Array(v) => format!("PackedFloat64Array({})", v.iter().map(|f| print_float(*f)).collect::<Vec<_>>().join(", ")),
        Variant::PackedStringArray(v) => {
            format!("PackedStringArray({})", v.iter().map(|s| format!("\"{}\"", escape_string(s))).collect::<Vec<_>>().join(", "))
        }
        Variant::PackedVector2Array(v) => {
            format!("PackedVector2Array({})", v.iter().map(|p| format!("{}, {}", print_float(p.x), print_float(p.y))).collect::<Vec<_>>().join(", "))
        }
        Variant::PackedVector3Array(v) => {
            format!("PackedVector3Array({})", v.iter().map(|p| format!("{}, {}, {}", print_float(p.x), print_float(p.y), print_float(p.z))).collect::<Vec<_>>().join(", "))
        }
        Variant::PackedColorArray(v) => {
            format!("PackedColorArray({})", v.iter().map(|c| format!("{}, {}, {}, {}", c.r, c.g, c.b, c.a)).collect::<Vec<_>>().join(", "))
        }
    })
}

fn print_object_ref(obj: &ObjectRef, ids: &ReferenceIds, graph: &ResourceGraph) -> Result<String> {
    Ok(match obj {
        ObjectRef::Empty => "null".to_owned(),
        ObjectRef::ExternalByPath { path, .. } => format!("Resource(\"{path}\")"),
        ObjectRef::ExternalByIndex(index) => {
            let index = *index as usize;
            if index >= graph.external_resources.len() {
                return Err(corrupt("ExtResource reference", "index out of range"));
            }
            format!("ExtResource(\"{}\")", ids.ext_id(index))
        }
        ObjectRef::InternalByIndex(index) => {
            let subindex = *index;
            if !graph.internal_resources.iter().any(|r| r.subindex == subindex) {
                return Err(corrupt("SubResource reference", "subindex out of range"));
            }
            format!("SubResource(\"{}\")", ids.sub_id(subindex))
        }
        ObjectRef::Inline { class_name, properties } => {
            let rendered: Vec<String> = properties
                .iter()
                .map(|(k, v)| Ok(format!("\"{}\": {}", escape_string(k), print_variant(v, ids, graph)?)))
                .collect::<Result<_>>()?;
            format!("{class_name}({{{}}})", rendered.join(", "))
        }
    })
}

fn variant_cmp(a: &Variant, b: &Variant) -> std::cmp::Ordering {
    fn rank(v: &Variant) -> i32 {
        match v {
            Variant::Nil => 0,
            Variant::Bool(_) => 1,
            Variant::Int32(_) | Variant::Int64(_) => 2,
            Variant::Float32(_) | Variant::Float64(_) => 3,
            Variant::String(_) | Variant::StringName(_) => 4,
            _ => 5,
        }
    }
    match (a, b) {
        (Variant::String(x), Variant::String(y)) | (Variant::StringName(x), Variant::StringName(y)) => x.cmp(y),
        (Variant::Int32(x), Variant::Int32(y)) => x.cmp(y),
        (Variant::Int64(x), Variant::Int64(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

impl ExternalBinding {
    /// `true` when a placeholder stands in for this reference: the text writer still renders the
    /// original type/path, only the loaded *value* is a stub.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Fake(_))
    }
}

/// Parses text produced by [`write_text`] (or a hand-written `.tres`/`.tscn`) back into a
/// [`ResourceGraph`]. `engine_major`/`engine_minor` and `use_real64`/`big_endian` aren't recorded
/// in the text format at all, so they're inferred from `format` per §4.4's header-tag table; a
/// hand-written file targeting a specific engine point release should go through the binary loader
/// instead if that distinction matters.
///
/// # Errors
/// [`Error::CorruptData`] for malformed syntax: an unterminated string or bracket, a `key` with no
/// `=`, a `SubResource`/`ExtResource` reference to an id this document never declared.
pub fn parse_text(source: &str) -> Result<ResourceGraph> {
    let mut cursor = Cursor::new(source);
    let mut builder = Builder::default();

    loop {
        cursor.skip_trivia();
        if cursor.peek().is_none() {
            break;
        }
        if cursor.peek() == Some('[') {
            parse_header(&mut cursor, &mut builder)?;
        } else {
            let name = parse_key(&mut cursor)?;
            cursor.eat('=')?;
            let value = parse_value(&mut cursor, &builder)?;
            builder.assign(name, value)?;
        }
    }

    builder.finish()
}

#[derive(Default)]
struct NodeBuilder {
    name: Option<String>,
    type_name: Option<String>,
    parent: Option<String>,
    owner: Option<String>,
    groups: Vec<Variant>,
    properties: Vec<(Variant, Variant)>,
}

impl NodeBuilder {
    fn into_dict(self) -> Variant {
        let mut fields = Vec::new();
        fields.push((Variant::String("name".to_owned()), Variant::String(self.name.unwrap_or_default())));
        if let Some(type_name) = self.type_name {
            fields.push((Variant::String("type".to_owned()), Variant::String(type_name)));
        }
        if let Some(parent) = self.parent {
            fields.push((Variant::String("parent".to_owned()), Variant::String(parent)));
        }
        if let Some(owner) = self.owner {
            fields.push((Variant::String("owner".to_owned()), Variant::String(owner)));
        }
        if !self.groups.is_empty() {
            fields.push((Variant::String("groups".to_owned()), Variant::Array(self.groups)));
        }
        fields.push((Variant::String("properties".to_owned()), Variant::Dictionary(self.properties)));
        Variant::Dictionary(fields)
    }
}

/// Where the next `key = value` assignment lands.
enum Target {
    None,
    /// Index into `Builder::sub_resources`.
    SubResource(usize),
    /// The main `[resource]`/scene-leftover property bag.
    Main,
    Node,
}

#[derive(Default)]
struct Builder {
    is_scene: bool,
    root_type: Option<String>,
    script_class: Option<String>,
    format_version: u32,
    uid: Option<u64>,
    ext_resources: Vec<ExternalRef>,
    ext_ids: HashMap<String, usize>,
    sub_resources: Vec<InternalRes>,
    sub_ids: HashMap<String, u32>,
    main_props: Vec<(String, Variant)>,
    nodes: Vec<Variant>,
    connections: Vec<Variant>,
    editable_paths: Vec<Variant>,
    pending_node: Option<NodeBuilder>,
    target: Target,
}

impl Default for Target {
    fn default() -> Self {
        Target::None
    }
}

impl Builder {
    fn flush_node(&mut self) {
        if let Some(node) = self.pending_node.take() {
            self.nodes.push(node.into_dict());
        }
    }

    fn assign(&mut self, name: String, value: Variant) -> Result<()> {
        match self.target {
            Target::SubResource(index) => self.sub_resources[index].properties.push((name, value)),
            Target::Main => self.main_props.push((name, value)),
            Target::Node => {
                let node = self.pending_node.get_or_insert_with(NodeBuilder::default);
                if name == "groups" {
                    if let Variant::Array(items) = value {
                        node.groups = items;
                    }
                } else {
                    node.properties.push((Variant::String(name), value));
                }
            }
            Target::None => {
                return Err(corrupt(format!("property '{name}'"), "assignment outside any section"))
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<ResourceGraph> {
        self.flush_node();

        let root_type =
            self.root_type.unwrap_or_else(|| if self.is_scene { "PackedScene".to_owned() } else { String::new() });
        let (engine_major, engine_minor) = infer_engine(self.format_version);

        let mut internal_resources = self.sub_resources;
        let subindex = u32::try_from(internal_resources.len() + 1).unwrap_or(u32::MAX);
        let mut properties = Vec::new();
        if self.is_scene {
            properties.push(("nodes".to_owned(), Variant::Array(self.nodes)));
            properties.push(("connections".to_owned(), Variant::Array(self.connections)));
            properties.push(("editable_paths".to_owned(), Variant::Array(self.editable_paths)));
        }
        properties.extend(self.main_props);
        internal_resources.push(InternalRes {
            local_path: String::new(),
            type_name: root_type.clone(),
            subindex,
            properties,
        });

        Ok(ResourceGraph {
            header: FormatHeader {
                big_endian: false,
                use_real64: false,
                engine_major,
                engine_minor,
                format_version: self.format_version,
                root_type,
            },
            string_pool: StringPool::new(),
            external_resources: self.ext_resources,
            internal_resources,
            import_metadata: None,
            script_class: self.script_class,
            uid: self.uid,
            dependency_errors: Vec::new(),
        })
    }
}

/// Reverses [`crate::engine::EngineGeneration::default_resource_format_version`]'s table. Ambiguous
/// `format=3` (shared by V3.x and V4.0..4.2) resolves to V4, matching this crate's own emission.
fn infer_engine(format_version: u32) -> (u32, u32) {
    match format_version {
        1 => (2, 0),
        2 => (3, 0),
        4 => (4, 3),
        _ => (4, 2),
    }
}

fn parse_header(cursor: &mut Cursor, builder: &mut Builder) -> Result<()> {
    cursor.eat('[')?;
    let tag = parse_bare_ident(cursor)?;
    let attrs = parse_attrs(cursor)?;
    cursor.eat(']')?;

    builder.flush_node();

    match tag.as_str() {
        "gd_scene" => {
            builder.is_scene = true;
            apply_common_header_attrs(builder, &attrs);
        }
        "gd_resource" => {
            builder.is_scene = false;
            if let Some(type_name) = attrs.get("type") {
                builder.root_type = Some(type_name.clone());
            }
            apply_common_header_attrs(builder, &attrs);
        }
        "ext_resource" => {
            let type_name = attrs.get("type").cloned().unwrap_or_default();
            let path = attrs.get("path").cloned().unwrap_or_default();
            let uid = attrs.get("uid").and_then(|u| parse_uid(u));
            let id = attrs.get("id").cloned().unwrap_or_default();
            builder.ext_ids.insert(id, builder.ext_resources.len());
            builder.ext_resources.push(ExternalRef { type_name, path, uid, binding: ExternalBinding::Unresolved });
            builder.target = Target::None;
        }
        "sub_resource" => {
            let type_name = attrs.get("type").cloned().unwrap_or_default();
            let id = attrs.get("id").cloned().unwrap_or_default();
            let subindex = id.parse::<u32>().unwrap_or_else(|_| u32::try_from(builder.sub_resources.len() + 1).unwrap_or(u32::MAX));
            builder.sub_ids.insert(id, subindex);
            builder.sub_resources.push(InternalRes {
                local_path: String::new(),
                type_name,
                subindex,
                properties: Vec::new(),
            });
            builder.target = Target::SubResource(builder.sub_resources.len() - 1);
        }
        "resource" => builder.target = Target::Main,
        "node" => {
            builder.pending_node = Some(NodeBuilder {
                name: attrs.get("name").cloned(),
                type_name: attrs.get("type").cloned(),
                parent: attrs.get("parent").cloned(),
                owner: attrs.get("owner").cloned(),
                groups: Vec::new(),
                properties: Vec::new(),
            });
            builder.target = Target::Node;
        }
        "connection" => {
            let signal = attrs.get("signal").cloned().unwrap_or_default();
            let from = attrs.get("from").cloned().unwrap_or_default();
            let to = attrs.get("to").cloned().unwrap_or_default();
            let method = attrs.get("method").cloned().unwrap_or_default();
            builder.connections.push(Variant::Dictionary(vec![
                (Variant::String("signal".to_owned()), Variant::String(signal)),
                (Variant::String("from".to_owned()), Variant::String(from)),
                (Variant::String("to".to_owned()), Variant::String(to)),
                (Variant::String("method".to_owned()), Variant::String(method)),
            ]));
            builder.target = Target::None;
        }
        "editable" => {
            if let Some(path) = attrs.get("path") {
                builder.editable_paths.push(Variant::String(path.clone()));
            }
            builder.target = Target::None;
        }
        other => return Err(corrupt("resource text header", format!("unknown section '[{other}]'"))),
    }
    Ok(())
}

fn apply_common_header_attrs(builder: &mut Builder, attrs: &HashMap<String, String>) {
    if let Some(script_class) = attrs.get("script_class") {
        builder.script_class = Some(script_class.clone());
    }
    if let Some(format) = attrs.get("format") {
        builder.format_version = format.parse().unwrap_or(3);
    }
    if let Some(uid) = attrs.get("uid") {
        builder.uid = parse_uid(uid);
    }
}

fn parse_uid(text: &str) -> Option<u64> {
    u64::from_str_radix(text.strip_prefix("uid://")?, 16).ok()
}

/// Parses `key="value"`/`key=bareword` pairs up to the header's closing `]`.
fn parse_attrs(cursor: &mut Cursor) -> Result<HashMap<String, String>> {
    let mut attrs = HashMap::new();
    loop {
        cursor.skip_ws();
        if cursor.peek() == Some(']') || cursor.peek().is_none() {
            break;
        }
        let key = parse_bare_ident(cursor)?;
        cursor.eat('=')?;
        cursor.skip_ws();
        let value = if cursor.peek() == Some('"') {
            parse_string_literal(cursor)?
        } else {
            parse_bareword(cursor)
        };
        attrs.insert(key, value);
    }
    Ok(attrs)
}

fn parse_bareword(cursor: &mut Cursor) -> String {
    let mut out = String::new();
    while let Some(ch) = cursor.peek() {
        if ch.is_whitespace() || ch == ']' {
            break;
        }
        out.push(ch);
        cursor.bump();
    }
    out
}

fn parse_key(cursor: &mut Cursor) -> Result<String> {
    cursor.skip_ws();
    if cursor.peek() == Some('"') {
        parse_string_literal(cursor)
    } else {
        let mut out = String::new();
        while let Some(ch) = cursor.peek() {
            if ch.is_alphanumeric() || ch == '_' || ch == '/' {
                out.push(ch);
                cursor.bump();
            } else {
                break;
            }
        }
        if out.is_empty() {
            return Err(corrupt("resource text", "expected a property name"));
        }
        Ok(out)
    }
}

fn parse_bare_ident(cursor: &mut Cursor) -> Result<String> {
    cursor.skip_ws();
    let mut out = String::new();
    while let Some(ch) = cursor.peek() {
        if ch.is_alphanumeric() || ch == '_' {
            out.push(ch);
            cursor.bump();
        } else {
            break;
        }
    }
    if out.is_empty() {
        return Err(corrupt("resource text", "expected an identifier"));
    }
    Ok(out)
}

fn parse_string_literal(cursor: &mut Cursor) -> Result<String> {
    cursor.eat('"')?;
    let mut out = String::new();
    loop {
        match cursor.bump() {
            None => return Err(corrupt("resource text", "unterminated string literal")),
            Some('"') => break,
            Some('\\') => match cursor.bump() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some(other) => out.push(other),
                None => return Err(corrupt("resource text", "unterminated escape sequence")),
            },
            Some(ch) => out.push(ch),
        }
    }
    Ok(out)
}

fn parse_value(cursor: &mut Cursor, builder: &Builder) -> Result<Variant> {
    cursor.skip_ws();
    match cursor.peek() {
        Some('"') => Ok(Variant::String(parse_string_literal(cursor)?)),
        Some('{') => Ok(Variant::Dictionary(parse_dictionary(cursor, builder)?)),
        Some('[') => Ok(Variant::Array(parse_array(cursor, builder)?)),
        Some(ch) if ch == '-' || ch.is_ascii_digit() => parse_number(cursor),
        Some(_) => parse_constructor(cursor, builder),
        None => Err(corrupt("resource text", "unexpected end of input while parsing a value")),
    }
}

fn parse_dictionary(cursor: &mut Cursor, builder: &Builder) -> Result<Vec<(Variant, Variant)>> {
    cursor.eat('{')?;
    let mut entries = Vec::new();
    loop {
        cursor.skip_ws();
        if cursor.peek() == Some('}') {
            cursor.bump();
            break;
        }
        let key = parse_value(cursor, builder)?;
        cursor.skip_ws();
        cursor.eat(':')?;
        let value = parse_value(cursor, builder)?;
        entries.push((key, value));
        cursor.skip_ws();
        if cursor.peek() == Some(',') {
            cursor.bump();
            continue;
        }
        cursor.skip_ws();
        if cursor.peek() == Some('}') {
            cursor.bump();
            break;
        }
        return Err(corrupt("dictionary literal", "expected ',' or '}'"));
    }
    Ok(entries)
}

fn parse_array(cursor: &mut Cursor, builder: &Builder) -> Result<Vec<Variant>> {
    cursor.eat('[')?;
    let mut items = Vec::new();
    loop {
        cursor.skip_ws();
        if cursor.peek() == Some(']') {
            cursor.bump();
            break;
        }
        items.push(parse_value(cursor, builder)?);
        cursor.skip_ws();
        if cursor.peek() == Some(',') {
            cursor.bump();
            continue;
        }
        cursor.skip_ws();
        if cursor.peek() == Some(']') {
            cursor.bump();
            break;
        }
        return Err(corrupt("array literal", "expected ',' or ']'"));
    }
    Ok(items)
}

fn parse_number(cursor: &mut Cursor) -> Result<Variant> {
    let start = cursor.pos;
    if cursor.peek() == Some('-') {
        cursor.bump();
    }
    let mut is_float = false;
    while let Some(ch) = cursor.peek() {
        if ch.is_ascii_digit() {
            cursor.bump();
        } else if ch == '.' || ch == 'e' || ch == 'E' {
            is_float = true;
            cursor.bump();
            if (ch == 'e' || ch == 'E') && matches!(cursor.peek(), Some('+') | Some('-')) {
                cursor.bump();
            }
        } else {
            break;
        }
    }
    let text = &cursor.text[start..cursor.pos];
    if is_float {
        text.parse::<f64>().map(Variant::Float64).map_err(|_| corrupt("number literal", "invalid float"))
    } else {
        text.parse::<i64>().map(Variant::Int64).map_err(|_| corrupt("number literal", "invalid integer"))
    }
}

/// Parses the top-level comma-separated numeric arguments of a `Name(...)`-style constructor.
fn parse_numeric_args(cursor: &mut Cursor, count: usize) -> Result<Vec<f64>> {
    cursor.eat('(')?;
    let mut values = Vec::with_capacity(count);
    for i in 0..count {
        cursor.skip_ws();
        let negative = cursor.peek() == Some('-');
        if negative {
            cursor.bump();
        }
        let start = cursor.pos;
        while cursor.peek().is_some_and(|c| c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '+' || c == '-') {
            cursor.bump();
        }
        let text = &cursor.text[start..cursor.pos];
        let mut value: f64 = text.parse().map_err(|_| corrupt("constructor argument", "invalid number"))?;
        if negative {
            value = -value;
        }
        values.push(value);
        cursor.skip_ws();
        if i + 1 < count {
            cursor.eat(',')?;
        }
    }
    cursor.skip_ws();
    cursor.eat(')')?;
    Ok(values)
}

/// Parses a flat, variable-length list of numeric arguments (the `Packed*Array` constructors).
fn parse_numeric_list(cursor: &mut Cursor) -> Result<Vec<f64>> {
    cursor.eat('(')?;
    let mut values = Vec::new();
    loop {
        cursor.skip_ws();
        if cursor.peek() == Some(')') {
            cursor.bump();
            break;
        }
        let negative = cursor.peek() == Some('-');
        if negative {
            cursor.bump();
        }
        let start = cursor.pos;
        while cursor.peek().is_some_and(|c| c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E') {
            cursor.bump();
        }
        let text = &cursor.text[start..cursor.pos];
        let mut value: f64 = text.parse().map_err(|_| corrupt("packed array element", "invalid number"))?;
        if negative {
            value = -value;
        }
        values.push(value);
        cursor.skip_ws();
        if cursor.peek() == Some(',') {
            cursor.bump();
            continue;
        }
        cursor.skip_ws();
        if cursor.peek() == Some(')') {
            cursor.bump();
            break;
        }
        return Err(corrupt("packed array literal", "expected ',' or ')'"));
    }
    Ok(values)
}

fn parse_string_list(cursor: &mut Cursor) -> Result<Vec<String>> {
    cursor.eat('(')?;
    let mut values = Vec::new();
    loop {
        cursor.skip_ws();
        if cursor.peek() == Some(')') {
            cursor.bump();
            break;
        }
        values.push(parse_string_literal(cursor)?);
        cursor.skip_ws();
        if cursor.peek() == Some(',') {
            cursor.bump();
            continue;
        }
        cursor.skip_ws();
        if cursor.peek() == Some(')') {
            cursor.bump();
            break;
        }
        return Err(corrupt("packed string array literal", "expected ',' or ')'"));
    }
    Ok(values)
}

fn parse_constructor(cursor: &mut Cursor, builder: &Builder) -> Result<Variant> {
    let ident = parse_bare_ident(cursor)?;
    match ident.as_str() {
        "null" => Ok(Variant::Nil),
        "true" => Ok(Variant::Bool(true)),
        "false" => Ok(Variant::Bool(false)),
        "Vector2" => {
            let a = parse_numeric_args(cursor, 2)?;
            Ok(Variant::Vector2(Vector2 { x: a[0], y: a[1] }))
        }
        "Vector2i" => {
            let a = parse_numeric_args(cursor, 2)?;
            Ok(Variant::Vector2i(Vector2i { x: a[0] as i32, y: a[1] as i32 }))
        }
        "Vector3" => {
            let a = parse_numeric_args(cursor, 3)?;
            Ok(Variant::Vector3(Vector3 { x: a[0], y: a[1], z: a[2] }))
        }
        "Vector3i" => {
            let a = parse_numeric_args(cursor, 3)?;
            Ok(Variant::Vector3i(Vector3i { x: a[0] as i32, y: a[1] as i32, z: a[2] as i32 }))
        }
        "Rect2" => {
            let a = parse_numeric_args(cursor, 4)?;
            Ok(Variant::Rect2(Rect2 { position: Vector2 { x: a[0], y: a[1] }, size: Vector2 { x: a[2], y: a[3] } }))
        }
        "Rect2i" => {
            let a = parse_numeric_args(cursor, 4)?;
            Ok(Variant::Rect2i(Rect2i {
                position: Vector2i { x: a[0] as i32, y: a[1] as i32 },
                size: Vector2i { x: a[2] as i32, y: a[3] as i32 },
            }))
        }
        "Plane" => {
            let a = parse_numeric_args(cursor, 4)?;
            Ok(Variant::Plane(Plane { normal: Vector3 { x: a[0], y: a[1], z: a[2] }, d: a[3] }))
        }
        "Quaternion" => {
            let a = parse_numeric_args(cursor, 4)?;
            Ok(Variant::Quaternion(Quaternion { x: a[0], y: a[1], z: a[2], w: a[3] }))
        }
        "AABB" => {
            let a = parse_numeric_args(cursor, 6)?;
            Ok(Variant::Aabb(Aabb {
                position: Vector3 { x: a[0], y: a[1], z: a[2] },
                size: Vector3 { x: a[3], y: a[4], z: a[5] },
            }))
        }
        "Basis" => {
            let a = parse_numeric_args(cursor, 9)?;
            Ok(Variant::Basis(Basis {
                rows: [
                    Vector3 { x: a[0], y: a[1], z: a[2] },
                    Vector3 { x: a[3], y: a[4], z: a[5] },
                    Vector3 { x: a[6], y: a[7], z: a[8] },
                ],
            }))
        }
        "Transform2D" => {
            let a = parse_numeric_args(cursor, 6)?;
            Ok(Variant::Transform2D(Transform2D {
                x: Vector2 { x: a[0], y: a[1] },
                y: Vector2 { x: a[2], y: a[3] },
                origin: Vector2 { x: a[4], y: a[5] },
            }))
        }
        "Transform3D" => {
            let a = parse_numeric_args(cursor, 12)?;
            Ok(Variant::Transform3D(Transform3D {
                basis: Basis {
                    rows: [
                        Vector3 { x: a[0], y: a[1], z: a[2] },
                        Vector3 { x: a[3], y: a[4], z: a[5] },
                        Vector3 { x: a[6], y: a[7], z: a[8] },
                    ],
                },
                origin: Vector3 { x: a[9], y: a[10], z: a[11] },
            }))
        }
        "Color" => {
            let a = parse_numeric_args(cursor, 4)?;
            Ok(Variant::Color(Color { r: a[0] as f32, g: a[1] as f32, b: a[2] as f32, a: a[3] as f32 }))
        }
        "NodePath" => {
            cursor.eat('(')?;
            let raw = parse_string_literal(cursor)?;
            cursor.skip_ws();
            cursor.eat(')')?;
            Ok(Variant::NodePath(parse_node_path(&raw)))
        }
        "RID" => {
            cursor.eat('(')?;
            cursor.skip_ws();
            let start = cursor.pos;
            while cursor.peek().is_some_and(|c| c.is_ascii_digit()) {
                cursor.bump();
            }
            let id: u64 = cursor.text[start..cursor.pos].parse().unwrap_or(0);
            cursor.skip_ws();
            cursor.eat(')')?;
            Ok(Variant::Rid(id))
        }
        "ExtResource" => {
            cursor.eat('(')?;
            let id = parse_string_literal(cursor)?;
            cursor.skip_ws();
            cursor.eat(')')?;
            let index = builder
                .ext_ids
                .get(&id)
                .ok_or_else(|| corrupt("ExtResource reference", format!("undeclared id \"{id}\"")))?;
            Ok(Variant::Object(ObjectRef::ExternalByIndex(u32::try_from(*index).unwrap_or(u32::MAX))))
        }
        "SubResource" => {
            cursor.eat('(')?;
            let id = parse_string_literal(cursor)?;
            cursor.skip_ws();
            cursor.eat(')')?;
            let subindex = builder
                .sub_ids
                .get(&id)
                .copied()
                .or_else(|| id.parse().ok())
                .ok_or_else(|| corrupt("SubResource reference", format!("undeclared id \"{id}\"")))?;
            Ok(Variant::Object(ObjectRef::InternalByIndex(subindex)))
        }
        "Resource" => {
            cursor.eat('(')?;
            let path = parse_string_literal(cursor)?;
            cursor.skip_ws();
            cursor.eat(')')?;
            Ok(Variant::Object(ObjectRef::ExternalByPath { type_name: String::new(), path }))
        }
        "PackedByteArray" => {
            let values = parse_numeric_list(cursor)?;
            Ok(Variant::PackedByteArray(values.into_iter().map(|v| v as u8).collect()))
        }
        "PackedInt32Array" => {
            let values = parse_numeric_list(cursor)?;
            Ok(Variant::PackedInt32Array(values.into_iter().map(|v| v as i32).collect()))
        }
        "PackedInt64Array" => {
            let values = parse_numeric_list(cursor)?;
            Ok(Variant::PackedInt64Array(values.into_iter().map(|v| v as i64).collect()))
        }
        "PackedFloat32Array" => {
            let values = parse_numeric_list(cursor)?;
            Ok(Variant::PackedFloat32Array(values.into_iter().map(|v| v as f32).collect()))
        }
        "PackedFloat64Array" => Ok(Variant::PackedFloat64Array(parse_numeric_list(cursor)?)),
        "PackedStringArray" => Ok(Variant::PackedStringArray(parse_string_list(cursor)?)),
        "PackedVector2Array" => {
            let values = parse_numeric_list(cursor)?;
            Ok(Variant::PackedVector2Array(
                values.chunks_exact(2).map(|c| Vector2 { x: c[0], y: c[1] }).collect(),
            ))
        }
        "PackedVector3Array" => {
            let values = parse_numeric_list(cursor)?;
            Ok(Variant::PackedVector3Array(
                values.chunks_exact(3).map(|c| Vector3 { x: c[0], y: c[1], z: c[2] }).collect(),
            ))
        }
        "PackedColorArray" => {
            let values = parse_numeric_list(cursor)?;
            Ok(Variant::PackedColorArray(
                values
                    .chunks_exact(4)
                    .map(|c| Color { r: c[0] as f32, g: c[1] as f32, b: c[2] as f32, a: c[3] as f32 })
                    .collect(),
            ))
        }
        other => {
            cursor.eat('(')?;
            cursor.eat('{')?;
            let properties = parse_inline_properties(cursor, builder)?;
            cursor.skip_ws();
            cursor.eat('}')?;
            cursor.skip_ws();
            cursor.eat(')')?;
            Ok(Variant::Object(ObjectRef::Inline { class_name: other.to_owned(), properties }))
        }
    }
}

fn parse_inline_properties(cursor: &mut Cursor, builder: &Builder) -> Result<Vec<(String, Variant)>> {
    let mut properties = Vec::new();
    loop {
        cursor.skip_ws();
        if cursor.peek() == Some('}') {
            break;
        }
        let key = parse_string_literal(cursor)?;
        cursor.skip_ws();
        cursor.eat(':')?;
        let value = parse_value(cursor, builder)?;
        properties.push((key, value));
        cursor.skip_ws();
        if cursor.peek() == Some(',') {
            cursor.bump();
            continue;
        }
        break;
    }
    Ok(properties)
}

fn parse_node_path(raw: &str) -> NodePath {
    let (absolute, rest) = match raw.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let mut parts = rest.splitn(2, ':');
    let path = parts.next().unwrap_or_default();
    let names = if path.is_empty() { Vec::new() } else { path.split('/').map(str::to_owned).collect() };
    let subnames = match parts.next() {
        Some(rest) => rest.split(':').map(str::to_owned).collect(),
        None => Vec::new(),
    };
    NodePath { names, subnames, absolute }
}

/// A minimal char cursor over the source text; tracks a byte offset so slicing stays zero-copy.
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_ws(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
    }

    /// Skips whitespace and full-line `;` comments, which may appear between top-level statements.
    fn skip_trivia(&mut self) {
        loop {
            self.skip_ws();
            if self.peek() == Some(';') {
                while let Some(ch) = self.peek() {
                    self.pos += ch.len_utf8();
                    if ch == '\n' {
                        break;
                    }
                }
                continue;
            }
            break;
        }
    }

    fn eat(&mut self, expected: char) -> Result<()> {
        self.skip_ws();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.pos += ch.len_utf8();
                Ok(())
            }
            Some(ch) => Err(corrupt("resource text", format!("expected '{expected}', found '{ch}'"))),
            None => Err(corrupt("resource text", format!("expected '{expected}', found end of input"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::resource::{ExternalRef, FormatHeader, InternalRes};
    use crate::variant::StringPool;

    use super::*;

    fn basic_graph() -> ResourceGraph {
        ResourceGraph {
            header: FormatHeader {
                big_endian: false,
                use_real64: false,
                engine_major: 4,
                engine_minor: 2,
                format_version: 3,
                root_type: "StandardMaterial3D".to_owned(),
            },
            string_pool: StringPool::new(),
            external_resources: vec![ExternalRef {
                type_name: "Texture2D".to_owned(),
                path: "res://albedo.png".to_owned(),
                uid: None,
                binding: ExternalBinding::Unresolved,
            }],
            internal_resources: vec![InternalRes {
                local_path: String::new(),
                type_name: "StandardMaterial3D".to_owned(),
                subindex: 1,
                properties: vec![
                    ("albedo_color".to_owned(), Variant::Bool(true)),
                    ("albedo_texture".to_owned(), Variant::Object(ObjectRef::ExternalByIndex(0))),
                ],
            }],
            import_metadata: None,
            script_class: None,
            uid: None,
            dependency_errors: Vec::new(),
        }
    }

    #[test]
    fn header_carries_load_steps_and_format() {
        let text = write_text(&basic_graph()).unwrap();
        assert!(text.starts_with("[gd_resource type=\"StandardMaterial3D\" load_steps=2 format=3]"));
    }

    #[test]
    fn ext_resource_uses_string_id_at_format_three() {
        let text = write_text(&basic_graph()).unwrap();
        assert!(text.contains("[ext_resource type=\"Texture2D\" path=\"res://albedo.png\" id=\"1_"));
    }

    #[test]
    fn external_by_index_renders_as_ext_resource_reference() {
        let text = write_text(&basic_graph()).unwrap();
        assert!(text.contains("albedo_texture = ExtResource(\"1_"));
    }

    #[test]
    fn float_zero_never_prints_negative() {
        assert_eq!(print_float(-0.0), "0");
    }

    #[test]
    fn out_of_range_internal_reference_is_corrupt_data() {
        let mut graph = basic_graph();
        graph.internal_resources[0].properties.push(("bad".to_owned(), Variant::Object(ObjectRef::InternalByIndex(99))));
        let err = write_text(&graph).unwrap_err();
        assert!(matches!(err, crate::error::Error::CorruptData { .. }));
    }

    fn sub_resource_graph() -> ResourceGraph {
        ResourceGraph {
            header: FormatHeader {
                big_endian: false,
                use_real64: false,
                engine_major: 4,
                engine_minor: 2,
                format_version: 3,
                root_type: "StandardMaterial3D".to_owned(),
            },
            string_pool: StringPool::new(),
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
                properties: vec![
                    ("albedo_color".to_owned(), Variant::Color(Color { r: 1.0, g: 0.0, b: 0.0, a: 1.0 })),
                    ("albedo_texture".to_owned(), Variant::Object(ObjectRef::ExternalByIndex(0))),
                ],
            }],
            import_metadata: None,
            script_class: None,
            uid: None,
            dependency_errors: Vec::new(),
        }
    }

    #[test]
    fn s4_text_round_trip_preserves_properties_and_references() {
        let graph = sub_resource_graph();
        let text = write_text(&graph).unwrap();
        let reparsed = parse_text(&text).unwrap();

        assert_eq!(reparsed.external_resources.len(), 1);
        assert_eq!(reparsed.external_resources[0].path, "res://x.png");
        assert_eq!(reparsed.external_resources[0].type_name, "Texture2D");

        let main = reparsed.main_resource().unwrap();
        assert_eq!(main.type_name, "StandardMaterial3D");
        assert_eq!(
            main.properties.iter().find(|(name, _)| name == "albedo_color").map(|(_, v)| v),
            Some(&Variant::Color(Color { r: 1.0, g: 0.0, b: 0.0, a: 1.0 }))
        );
        assert_eq!(
            main.properties.iter().find(|(name, _)| name == "albedo_texture").map(|(_, v)| v),
            Some(&Variant::Object(ObjectRef::ExternalByIndex(0)))
        );

        let rebuilt_bytes = crate::resource::write_binary(&reparsed).unwrap();
        assert!(!rebuilt_bytes.is_empty());
    }

    #[test]
    fn parses_multiple_sub_resources_in_order() {
        let text = "[gd_resource type=\"Material\" load_steps=2 format=3]\n\n\
                     [sub_resource type=\"Gradient\" id=\"1\"]\noffsets = [0, 1]\n\n\
                     [sub_resource type=\"GradientTexture1D\" id=\"2\"]\ngradient = SubResource(\"1\")\n\n\
                     [resource]\n";
        let graph = parse_text(text).unwrap();
        assert_eq!(graph.internal_resources.len(), 3);
        assert_eq!(graph.internal_resources[0].type_name, "Gradient");
        assert_eq!(graph.internal_resources[1].type_name, "GradientTexture1D");
        assert_eq!(
            graph.internal_resources[1].properties[0].1,
            Variant::Object(ObjectRef::InternalByIndex(1))
        );
    }

    #[test]
    fn parses_nested_array_and_dictionary_values() {
        let text = "[gd_resource type=\"Resource\" load_steps=1 format=3]\n\n[resource]\n\
                     items = [1, 2, \"three\"]\n\
                     mapping = {\n\"a\": 1,\n\"b\": 2,\n}\n";
        let graph = parse_text(text).unwrap();
        let main = graph.main_resource().unwrap();
        assert_eq!(
            main.properties.iter().find(|(n, _)| n == "items").map(|(_, v)| v),
            Some(&Variant::Array(vec![Variant::Int64(1), Variant::Int64(2), Variant::String("three".to_owned())]))
        );
        let mapping = main.properties.iter().find(|(n, _)| n == "mapping").map(|(_, v)| v).unwrap();
        assert!(matches!(mapping, Variant::Dictionary(entries) if entries.len() == 2));
    }

    #[test]
    fn parses_vector3_and_packed_float_array() {
        let text = "[gd_resource type=\"Resource\" load_steps=1 format=3]\n\n[resource]\n\
                     offset = Vector3(1.5, -2.0, 0.0)\n\
                     weights = PackedFloat32Array(1.0, 2.5, -3.0)\n";
        let graph = parse_text(text).unwrap();
        let main = graph.main_resource().unwrap();
        assert_eq!(
            main.properties.iter().find(|(n, _)| n == "offset").map(|(_, v)| v),
            Some(&Variant::Vector3(Vector3 { x: 1.5, y: -2.0, z: 0.0 }))
        );
        assert_eq!(
            main.properties.iter().find(|(n, _)| n == "weights").map(|(_, v)| v),
            Some(&Variant::PackedFloat32Array(vec![1.0, 2.5, -3.0]))
        );
    }

    #[test]
    fn undeclared_ext_resource_id_is_corrupt_data() {
        let text = "[gd_resource type=\"Resource\" load_steps=1 format=3]\n\n[resource]\n\
                     dep = ExtResource(\"9_xxxx\")\n";
        let err = parse_text(text).unwrap_err();
        assert!(matches!(err, crate::error::Error::CorruptData { .. }));
    }
}
