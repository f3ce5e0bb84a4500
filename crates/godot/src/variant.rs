//! §4.2 — the polymorphic `Variant` codec shared by every other format in this crate.
//!
//! One recursive encode/decode pair, parameterized by [`EngineGeneration`] so the three
//! incompatible on-disk tag tables (grounded directly in
//! `original_source/compat/variant_decoder_compat.h`'s `V2Type`/`V3Type` enums) funnel into the
//! same generation-neutral [`Variant`] the rest of this crate works with.
//!
//! V4 has no wire tag table in the retrieved source (the real engine kept evolving it after this
//! toolkit's upstream was written). This implementation extends `V3Type`'s numbering 1:1 for every
//! type V3 already has — which is what the literal `Vector3` fixture in this crate's test suite
//! requires (tag `7`, matching `V3Type::VECTOR3`) — and appends the V4-only additions
//! (`StringName`, `Vector2i`, `Rect2i`, `Vector3i`) at new trailing ids. See `DESIGN.md` for the
//! full rationale.

use indexmap::IndexSet;
use pakrat_core::cancel::Cancellation;
use pakrat_core::data::{EndianRead, EndianWrite};
use pakrat_core::stream::{ByteWriter, ReadExt};

use crate::engine::EngineGeneration;
use crate::error::{corrupt, Error, Result};
use crate::math::{Aabb, Basis, Color, Plane, Quaternion, Rect2, Rect2i, RealWidth, Transform2D, Transform3D, Vector2, Vector2i, Vector3, Vector3i};

/// Bit 16 of the tag word. Means "64-bit numeric" for `Int`/`Float` under V3, or "object stored by
/// id" for `Object` under V4 — the two uses never collide since they key off the low-order type id.
const FLAG_BIT: u32 = 1 << 16;

/// A name table shared by every Variant encoded within one resource file, used to deduplicate
/// `StringName`/`NodePath` components (§3 `ResourceGraph.string_pool`).
///
/// Backed by an [`IndexSet`] rather than a plain `Vec` plus linear scan, since `intern` is called
/// once per `StringName`/`NodePath` component in a resource and needs both insertion order (the
/// pool's index *is* the wire encoding) and fast dedup lookup.
#[derive(Clone, Debug, Default)]
pub struct StringPool {
    names: IndexSet<String>,
}

impl StringPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_entries(names: Vec<String>) -> Self {
        Self { names: names.into_iter().collect() }
    }

    #[must_use]
    pub fn get(&self, index: u32) -> Option<&str> {
        self.names.get_index(index as usize).map(String::as_str)
    }

    /// Returns the index of `name`, inserting it at the end if it's not already present.
    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(pos) = self.names.get_index_of(name) {
            pos as u32
        } else {
            let (pos, _) = self.names.insert_full(name.to_owned());
            pos as u32
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }
}

/// Per-file state threaded through every Variant encode/decode call.
pub struct Context<'a> {
    pub generation: EngineGeneration,
    pub real_width: RealWidth,
    pub depth_cap: usize,
    /// `Some` when decoding/encoding within a resource file, whose `StringName`/`NodePath`
    /// components are pool-indexed. `None` for standalone Variant streams (bytecode constants,
    /// project-config values), which have no string table to index into and fall back to inline
    /// string encoding.
    pub string_pool: Option<&'a mut StringPool>,
    /// §5: checked every [`Cancellation::CHECK_INTERVAL`] elements while decoding `Array`/
    /// `Dictionary` containers, so a caller driving this from a worker thread can abort a runaway
    /// or merely huge container without waiting for it to finish.
    pub cancellation: Option<&'a Cancellation>,
}

impl<'a> Context<'a> {
    #[must_use]
    pub fn new(generation: EngineGeneration, real_width: RealWidth) -> Self {
        Self { generation, real_width, depth_cap: 64, string_pool: None, cancellation: None }
    }

    #[must_use]
    pub fn with_pool(mut self, pool: &'a mut StringPool) -> Self {
        self.string_pool = Some(pool);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancellation: &'a Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }
}

/// A Godot object reference or inline property bag, per the design notes' `Object` constructor.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectRef {
    Empty,
    ExternalByPath { type_name: String, path: String },
    InternalByIndex(u32),
    ExternalByIndex(u32),
    /// An inline class name + property bag. Only produced decoding a V2 embedded object (§4.6) or
    /// the text form's `Object(...)` literal; never produced by V3/V4 binary decode.
    Inline { class_name: String, properties: Vec<(String, Variant)> },
}

/// A path to a node or a node's property, relative or absolute.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodePath {
    pub names: Vec<String>,
    pub subnames: Vec<String>,
    pub absolute: bool,
}

/// The generation-neutral canonical value type every Godot wire format funnels through.
#[derive(Clone, Debug, PartialEq)]
pub enum Variant {
    Nil,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    StringName(String),
    Vector2(Vector2),
    Vector2i(Vector2i),
    Rect2(Rect2),
    Rect2i(Rect2i),
    Vector3(Vector3),
    Vector3i(Vector3i),
    Transform2D(Transform2D),
    Plane(Plane),
    Quaternion(Quaternion),
    Aabb(Aabb),
    Basis(Basis),
    Transform3D(Transform3D),
    Color(Color),
    NodePath(NodePath),
    Rid(u64),
    Object(ObjectRef),
    Dictionary(Vec<(Variant, Variant)>),
    Array(Vec<Variant>),
    PackedByteArray(Vec<u8>),
    PackedInt32Array(Vec<i32>),
    PackedInt64Array(Vec<i64>),
    PackedFloat32Array(Vec<f32>),
    PackedFloat64Array(Vec<f64>),
    PackedStringArray(Vec<String>),
    PackedVector2Array(Vec<Vector2>),
    PackedVector3Array(Vec<Vector3>),
    PackedColorArray(Vec<Color>),
}

#[inline]
const fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

fn read_inline_string<R: ReadExt>(reader: &mut R) -> Result<String> {
    let len = reader.read_u32()? as usize;
    if len == 0 {
        return Ok(String::new());
    }
    let bytes = reader.read_slice(len)?;
    let padding = pad4(len) - len;
    if padding > 0 {
        reader.read_slice(padding)?;
    }
    let content = &bytes[..bytes.len().saturating_sub(1)];
    String::from_utf8(content.to_vec()).map_err(|_| Error::BadUtf8 { breadcrumb: String::from("variant string") })
}

fn write_inline_string(writer: &mut ByteWriter, value: &str) -> Result<()> {
    if value.is_empty() {
        writer.write_u32(0)?;
        return Ok(());
    }
    let len = value.len() + 1;
    writer.write_u32(len as u32)?;
    writer.write_slice(value.as_bytes());
    writer.write_slice(&[0]);
    let padding = pad4(len) - len;
    if padding > 0 {
        writer.write_padding(0, padding);
    }
    Ok(())
}

fn read_name<R: ReadExt>(reader: &mut R, ctx: &mut Context) -> Result<String> {
    if let Some(pool) = ctx.string_pool.as_mut() {
        let index = reader.read_u32()?;
        pool.get(index).map(str::to_owned).ok_or_else(|| corrupt("string pool", "index out of range"))
    } else {
        read_inline_string(reader)
    }
}

fn write_name(writer: &mut ByteWriter, ctx: &mut Context, name: &str) -> Result<()> {
    if let Some(pool) = ctx.string_pool.as_mut() {
        let index = pool.intern(name);
        writer.write_u32(index)?;
        Ok(())
    } else {
        write_inline_string(writer, name)
    }
}

fn read_real<R: ReadExt>(reader: &mut R, width: RealWidth) -> Result<f64> {
    Ok(match width {
        RealWidth::F32 => f64::from(reader.read_f32()?),
        RealWidth::F64 => reader.read_f64()?,
    })
}

fn write_real(writer: &mut ByteWriter, width: RealWidth, value: f64) -> Result<()> {
    match width {
        RealWidth::F32 => writer.write_f32(value as f32)?,
        RealWidth::F64 => writer.write_f64(value)?,
    }
    Ok(())
}

fn read_vector2<R: ReadExt>(reader: &mut R, width: RealWidth) -> Result<Vector2> {
    Ok(Vector2 { x: read_real(reader, width)?, y: read_real(reader, width)? })
}
fn write_vector2(writer: &mut ByteWriter, width: RealWidth, v: Vector2) -> Result<()> {
    write_real(writer, width, v.x)?;
    write_real(writer, width, v.y)
}
fn read_vector3<R: ReadExt>(reader: &mut R, width: RealWidth) -> Result<Vector3> {
    Ok(Vector3 { x: read_real(reader, width)?, y: read_real(reader, width)?, z: read_real(reader, width)? })
}
fn write_vector3(writer: &mut ByteWriter, width: RealWidth, v: Vector3) -> Result<()> {
    write_real(writer, width, v.x)?;
    write_real(writer, width, v.y)?;
    write_real(writer, width, v.z)
}
fn read_color<R: ReadExt>(reader: &mut R) -> Result<Color> {
    Ok(Color { r: reader.read_f32()?, g: reader.read_f32()?, b: reader.read_f32()?, a: reader.read_f32()? })
}
fn write_color(writer: &mut ByteWriter, c: Color) -> Result<()> {
    writer.write_f32(c.r)?;
    writer.write_f32(c.g)?;
    writer.write_f32(c.b)?;
    writer.write_f32(c.a)?;
    Ok(())
}

fn read_node_path<R: ReadExt>(reader: &mut R, ctx: &mut Context) -> Result<NodePath> {
    let name_count = reader.read_u16()? as usize;
    let raw_subname_count = reader.read_u16()?;
    let absolute = raw_subname_count & 0x8000 != 0;
    let subname_count = (raw_subname_count & 0x7fff) as usize;

    let mut names = Vec::with_capacity(name_count);
    for _ in 0..name_count {
        names.push(read_name(reader, ctx)?);
    }
    let mut subnames = Vec::with_capacity(subname_count);
    for _ in 0..subname_count {
        subnames.push(read_name(reader, ctx)?);
    }
    if ctx.generation == EngineGeneration::V2 {
        let property = read_name(reader, ctx)?;
        if !property.is_empty() {
            subnames.push(property);
        }
    }
    Ok(NodePath { names, subnames, absolute })
}

fn write_node_path(writer: &mut ByteWriter, ctx: &mut Context, path: &NodePath) -> Result<()> {
    writer.write_u16(path.names.len() as u16)?;
    let mut subname_count = u16::try_from(path.subnames.len())
        .map_err(|_| corrupt("NodePath", "too many subnames to encode"))?;
    if path.absolute {
        subname_count |= 0x8000;
    }
    writer.write_u16(subname_count)?;
    for name in &path.names {
        write_name(writer, ctx, name)?;
    }
    for name in &path.subnames {
        write_name(writer, ctx, name)?;
    }
    if ctx.generation == EngineGeneration::V2 {
        write_name(writer, ctx, "")?;
    }
    Ok(())
}

/// Decodes one Variant, consulting `ctx` for generation, real width, and depth cap.
pub fn decode<R: ReadExt>(reader: &mut R, ctx: &mut Context) -> Result<Variant> {
    decode_at_depth(reader, ctx, 0)
}

fn decode_at_depth<R: ReadExt>(reader: &mut R, ctx: &mut Context, depth: usize) -> Result<Variant> {
    if depth > ctx.depth_cap {
        return Err(Error::DepthExceeded { cap: ctx.depth_cap });
    }
    let raw_tag = reader.read_u32()?;
    let tag = raw_tag & 0xffff;
    let flag = raw_tag & FLAG_BIT != 0;

    match ctx.generation {
        EngineGeneration::V2 => decode_v2(reader, ctx, tag, depth),
        EngineGeneration::V3 => decode_v3(reader, ctx, tag, flag, depth),
        EngineGeneration::V4 => decode_v4(reader, ctx, tag, flag, depth),
    }
}

fn decode_object<R: ReadExt>(reader: &mut R, ctx: &mut Context, depth: usize) -> Result<ObjectRef> {
    match reader.read_u32()? {
        0 => Ok(ObjectRef::Empty),
        1 => {
            let type_name = read_inline_string(reader)?;
            let path = read_inline_string(reader)?;
            Ok(ObjectRef::ExternalByPath { type_name, path })
        }
        2 => Ok(ObjectRef::InternalByIndex(reader.read_u32()?)),
        3 => Ok(ObjectRef::ExternalByIndex(reader.read_u32()?)),
        4 => {
            let class_name = read_inline_string(reader)?;
            let property_count = reader.read_u32()? as usize;
            let mut properties = Vec::with_capacity(property_count);
            for _ in 0..property_count {
                let name = read_name(reader, ctx)?;
                let value = decode_at_depth(reader, ctx, depth + 1)?;
                properties.push((name, value));
            }
            Ok(ObjectRef::Inline { class_name, properties })
        }
        other => Err(corrupt("Object", format!("unknown object kind {other}"))),
    }
}

fn write_object(writer: &mut ByteWriter, ctx: &mut Context, obj: &ObjectRef) -> Result<()> {
    match obj {
        ObjectRef::Empty => writer.write_u32(0)?,
        ObjectRef::ExternalByPath { type_name, path } => {
            writer.write_u32(1)?;
            write_inline_string(writer, type_name)?;
            write_inline_string(writer, path)?;
        }
        ObjectRef::InternalByIndex(index) => {
            writer.write_u32(2)?;
            writer.write_u32(*index)?;
        }
        ObjectRef::ExternalByIndex(index) => {
            writer.write_u32(3)?;
            writer.write_u32(*index)?;
        }
        ObjectRef::Inline { class_name, properties } => {
            writer.write_u32(4)?;
            write_inline_string(writer, class_name)?;
            writer.write_u32(properties.len() as u32)?;
            for (name, value) in properties {
                write_name(writer, ctx, name)?;
                encode(writer, ctx, value)?;
            }
        }
    }
    Ok(())
}

/// Checks `ctx`'s cancellation handle every [`Cancellation::CHECK_INTERVAL`] elements of a
/// container decode loop, per §5.
fn check_cancelled(ctx: &Context, index: usize) -> Result<()> {
    if index % Cancellation::CHECK_INTERVAL == 0 {
        if let Some(cancellation) = ctx.cancellation {
            if cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }
        }
    }
    Ok(())
}

fn decode_array<R: ReadExt>(reader: &mut R, ctx: &mut Context, depth: usize) -> Result<Vec<Variant>> {
    let count = (reader.read_u32()? & 0x7fff_ffff) as usize;
    let mut values = Vec::with_capacity(count.min(4096));
    for index in 0..count {
        check_cancelled(ctx, index)?;
        values.push(decode_at_depth(reader, ctx, depth + 1)?);
    }
    Ok(values)
}

fn decode_dictionary<R: ReadExt>(
    reader: &mut R,
    ctx: &mut Context,
    depth: usize,
) -> Result<Vec<(Variant, Variant)>> {
    let count = (reader.read_u32()? & 0x7fff_ffff) as usize;
    let mut entries = Vec::with_capacity(count.min(4096));
    for index in 0..count {
        check_cancelled(ctx, index)?;
        let key = decode_at_depth(reader, ctx, depth + 1)?;
        let value = decode_at_depth(reader, ctx, depth + 1)?;
        entries.push((key, value));
    }
    Ok(entries)
}

macro_rules! decode_packed_numeric {
    ($reader:ident, $read:ident) => {{
        let count = $reader.read_u32()? as usize;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push($reader.$read()?);
        }
        values
    }};
}

fn decode_packed_byte_array<R: ReadExt>(reader: &mut R) -> Result<Vec<u8>> {
    let count = reader.read_u32()? as usize;
    let bytes = reader.read_slice(count)?;
    let padding = pad4(count) - count;
    if padding > 0 {
        reader.read_slice(padding)?;
    }
    Ok(bytes)
}

fn write_packed_byte_array(writer: &mut ByteWriter, bytes: &[u8]) -> Result<()> {
    writer.write_u32(bytes.len() as u32)?;
    writer.write_slice(bytes);
    let padding = pad4(bytes.len()) - bytes.len();
    if padding > 0 {
        writer.write_padding(0, padding);
    }
    Ok(())
}

fn decode_packed_string_array<R: ReadExt>(reader: &mut R) -> Result<Vec<String>> {
    let count = reader.read_u32()? as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(read_inline_string(reader)?);
    }
    Ok(values)
}

fn decode_packed_vector2_array<R: ReadExt>(reader: &mut R, width: RealWidth) -> Result<Vec<Vector2>> {
    let count = reader.read_u32()? as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(read_vector2(reader, width)?);
    }
    Ok(values)
}

fn decode_packed_vector3_array<R: ReadExt>(reader: &mut R, width: RealWidth) -> Result<Vec<Vector3>> {
    let count = reader.read_u32()? as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(read_vector3(reader, width)?);
    }
    Ok(values)
}

fn decode_packed_color_array<R: ReadExt>(reader: &mut R) -> Result<Vec<Color>> {
    let count = reader.read_u32()? as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(read_color(reader)?);
    }
    Ok(values)
}

// --- V2 --------------------------------------------------------------------------------------

fn decode_v2<R: ReadExt>(reader: &mut R, ctx: &mut Context, tag: u32, depth: usize) -> Result<Variant> {
    let width = ctx.real_width;
    Ok(match tag {
        0 => Variant::Nil,
        1 => Variant::Bool(reader.read_u32()? != 0),
        2 => Variant::Int32(reader.read_i32()?),
        3 => Variant::Float32(reader.read_f32()?),
        4 => Variant::String(read_inline_string(reader)?),
        5 => Variant::Vector2(read_vector2(reader, width)?),
        6 => Variant::Rect2(Rect2 { position: read_vector2(reader, width)?, size: read_vector2(reader, width)? }),
        7 => Variant::Vector3(read_vector3(reader, width)?),
        8 => Variant::Transform2D(Transform2D {
            x: read_vector2(reader, width)?,
            y: read_vector2(reader, width)?,
            origin: read_vector2(reader, width)?,
        }),
        9 => Variant::Plane(Plane { normal: read_vector3(reader, width)?, d: read_real(reader, width)? }),
        10 => Variant::Quaternion(Quaternion {
            x: read_real(reader, width)?,
            y: read_real(reader, width)?,
            z: read_real(reader, width)?,
            w: read_real(reader, width)?,
        }),
        11 => Variant::Aabb(Aabb { position: read_vector3(reader, width)?, size: read_vector3(reader, width)? }),
        12 => Variant::Basis(Basis {
            rows: [read_vector3(reader, width)?, read_vector3(reader, width)?, read_vector3(reader, width)?],
        }),
        13 => Variant::Transform3D(Transform3D {
            basis: Basis {
                rows: [read_vector3(reader, width)?, read_vector3(reader, width)?, read_vector3(reader, width)?],
            },
            origin: read_vector3(reader, width)?,
        }),
        14 => Variant::Color(read_color(reader)?),
        15 => crate::legacy::decode_legacy_image(reader)?,
        16 => Variant::NodePath(read_node_path(reader, ctx)?),
        17 => Variant::Rid(reader.read_u64()?),
        18 => Variant::Object(decode_object(reader, ctx, depth)?),
        19 => crate::legacy::decode_legacy_input_event(reader)?,
        20 => Variant::Dictionary(decode_dictionary(reader, ctx, depth)?),
        21 => Variant::Array(decode_array(reader, ctx, depth)?),
        22 => Variant::PackedByteArray(decode_packed_byte_array(reader)?),
        23 => Variant::PackedInt32Array(decode_packed_numeric!(reader, read_i32)),
        24 => Variant::PackedFloat32Array(decode_packed_numeric!(reader, read_f32)),
        25 => Variant::PackedStringArray(decode_packed_string_array(reader)?),
        26 => Variant::PackedVector2Array(decode_packed_vector2_array(reader, width)?),
        27 => Variant::PackedVector3Array(decode_packed_vector3_array(reader, width)?),
        28 => Variant::PackedColorArray(decode_packed_color_array(reader)?),
        other => return Err(corrupt("Variant (V2)", format!("unknown tag {other}"))),
    })
}

// --- V3 --------------------------------------------------------------------------------------

fn decode_v3<R: ReadExt>(reader: &mut R, ctx: &mut Context, tag: u32, flag_64: bool, depth: usize) -> Result<Variant> {
    let width = ctx.real_width;
    Ok(match tag {
        0 => Variant::Nil,
        1 => Variant::Bool(reader.read_u32()? != 0),
        2 => {
            if flag_64 {
                Variant::Int64(reader.read_i64()?)
            } else {
                Variant::Int32(reader.read_i32()?)
            }
        }
        3 => {
            if flag_64 {
                Variant::Float64(reader.read_f64()?)
            } else {
                Variant::Float32(reader.read_f32()?)
            }
        }
        4 => Variant::String(read_inline_string(reader)?),
        5 => Variant::Vector2(read_vector2(reader, width)?),
        6 => Variant::Rect2(Rect2 { position: read_vector2(reader, width)?, size: read_vector2(reader, width)? }),
        7 => Variant::Vector3(read_vector3(reader, width)?),
        8 => Variant::Transform2D(Transform2D {
            x: read_vector2(reader, width)?,
            y: read_vector2(reader, width)?,
            origin: read_vector2(reader, width)?,
        }),
        9 => Variant::Plane(Plane { normal: read_vector3(reader, width)?, d: read_real(reader, width)? }),
        10 => Variant::Quaternion(Quaternion {
            x: read_real(reader, width)?,
            y: read_real(reader, width)?,
            z: read_real(reader, width)?,
            w: read_real(reader, width)?,
        }),
        11 => Variant::Aabb(Aabb { position: read_vector3(reader, width)?, size: read_vector3(reader, width)? }),
        12 => Variant::Basis(Basis {
            rows: [read_vector3(reader, width)?, read_vector3(reader, width)?, read_vector3(reader, width)?],
        }),
        13 => Variant::Transform3D(Transform3D {
            basis: Basis {
                rows: [read_vector3(reader, width)?, read_vector3(reader, width)?, read_vector3(reader, width)?],
            },
            origin: read_vector3(reader, width)?,
        }),
        14 => Variant::Color(read_color(reader)?),
        15 => Variant::NodePath(read_node_path(reader, ctx)?),
        16 => Variant::Rid(reader.read_u64()?),
        17 => Variant::Object(decode_object(reader, ctx, depth)?),
        18 => Variant::Dictionary(decode_dictionary(reader, ctx, depth)?),
        19 => Variant::Array(decode_array(reader, ctx, depth)?),
        20 => Variant::PackedByteArray(decode_packed_byte_array(reader)?),
        21 => Variant::PackedInt32Array(decode_packed_numeric!(reader, read_i32)),
        22 => Variant::PackedFloat32Array(decode_packed_numeric!(reader, read_f32)),
        23 => Variant::PackedStringArray(decode_packed_string_array(reader)?),
        24 => Variant::PackedVector2Array(decode_packed_vector2_array(reader, width)?),
        25 => Variant::PackedVector3Array(decode_packed_vector3_array(reader, width)?),
        26 => Variant::PackedColorArray(decode_packed_color_array(reader)?),
        other => return Err(corrupt("Variant (V3)", format!("unknown tag {other}"))),
    })
}

// --- V4 --------------------------------------------------------------------------------------

fn decode_v4<R: ReadExt>(
    reader: &mut R,
    ctx: &mut Context,
    tag: u32,
    object_as_id: bool,
    depth: usize,
) -> Result<Variant> {
    let width = ctx.real_width;
    Ok(match tag {
        0 => Variant::Nil,
        1 => Variant::Bool(reader.read_u32()? != 0),
        2 => Variant::Int64(reader.read_i64()?),
        3 => Variant::Float64(reader.read_f64()?),
        4 => Variant::String(read_inline_string(reader)?),
        5 => Variant::Vector2(read_vector2(reader, width)?),
        6 => Variant::Rect2(Rect2 { position: read_vector2(reader, width)?, size: read_vector2(reader, width)? }),
        7 => Variant::Vector3(read_vector3(reader, width)?),
        8 => Variant::Transform2D(Transform2D {
            x: read_vector2(reader, width)?,
            y: read_vector2(reader, width)?,
            origin: read_vector2(reader, width)?,
        }),
        9 => Variant::Plane(Plane { normal: read_vector3(reader, width)?, d: read_real(reader, width)? }),
        10 => Variant::Quaternion(Quaternion {
            x: read_real(reader, width)?,
            y: read_real(reader, width)?,
            z: read_real(reader, width)?,
            w: read_real(reader, width)?,
        }),
        11 => Variant::Aabb(Aabb { position: read_vector3(reader, width)?, size: read_vector3(reader, width)? }),
        12 => Variant::Basis(Basis {
            rows: [read_vector3(reader, width)?, read_vector3(reader, width)?, read_vector3(reader, width)?],
        }),
        13 => Variant::Transform3D(Transform3D {
            basis: Basis {
                rows: [read_vector3(reader, width)?, read_vector3(reader, width)?, read_vector3(reader, width)?],
            },
            origin: read_vector3(reader, width)?,
        }),
        14 => Variant::Color(read_color(reader)?),
        15 => Variant::NodePath(read_node_path(reader, ctx)?),
        16 => Variant::Rid(reader.read_u64()?),
        17 => {
            if object_as_id {
                // Objects serialized "as id" carry just the instance id, with no resolvable
                // resource reference; model as an opaque external-by-index of the raw id.
                Variant::Object(ObjectRef::ExternalByIndex(reader.read_u64()? as u32))
            } else {
                Variant::Object(decode_object(reader, ctx, depth)?)
            }
        }
        18 => Variant::Dictionary(decode_dictionary(reader, ctx, depth)?),
        19 => Variant::Array(decode_array(reader, ctx, depth)?),
        20 => Variant::PackedByteArray(decode_packed_byte_array(reader)?),
        21 => Variant::PackedInt32Array(decode_packed_numeric!(reader, read_i32)),
        22 => Variant::PackedInt64Array(decode_packed_numeric!(reader, read_i64)),
        23 => Variant::PackedFloat32Array(decode_packed_numeric!(reader, read_f32)),
        24 => Variant::PackedFloat64Array(decode_packed_numeric!(reader, read_f64)),
        25 => Variant::PackedStringArray(decode_packed_string_array(reader)?),
        26 => Variant::PackedVector2Array(decode_packed_vector2_array(reader, width)?),
        27 => Variant::PackedVector3Array(decode_packed_vector3_array(reader, width)?),
        28 => Variant::PackedColorArray(decode_packed_color_array(reader)?),
        29 => Variant::StringName(read_name(reader, ctx)?),
        30 => Variant::Vector2i(Vector2i { x: reader.read_i32()?, y: reader.read_i32()? }),
        31 => Variant::Rect2i(Rect2i {
            position: Vector2i { x: reader.read_i32()?, y: reader.read_i32()? },
            size: Vector2i { x: reader.read_i32()?, y: reader.read_i32()? },
        }),
        32 => Variant::Vector3i(Vector3i { x: reader.read_i32()?, y: reader.read_i32()?, z: reader.read_i32()? }),
        other => return Err(corrupt("Variant (V4)", format!("unknown tag {other}"))),
    })
}

/// Encodes one Variant for the generation/real-width recorded in `ctx`.
///
/// # Errors
/// Returns [`Error::CorruptData`] if `value` isn't representable under `ctx.generation` (e.g.
/// encoding a `Vector2i` for V2, which has no such type).
pub fn encode(writer: &mut ByteWriter, ctx: &mut Context, value: &Variant) -> Result<()> {
    match ctx.generation {
        EngineGeneration::V2 => encode_v2(writer, ctx, value),
        EngineGeneration::V3 => encode_v3(writer, ctx, value),
        EngineGeneration::V4 => encode_v4(writer, ctx, value),
    }
}

fn write_tag(writer: &mut ByteWriter, tag: u32, flag: bool) -> Result<()> {
    let mut raw = tag;
    if flag {
        raw |= FLAG_BIT;
    }
    writer.write_u32(raw)?;
    Ok(())
}

fn encode_array(writer: &mut ByteWriter, ctx: &mut Context, values: &[Variant]) -> Result<()> {
    writer.write_u32(values.len() as u32)?;
    for value in values {
        encode(writer, ctx, value)?;
    }
    Ok(())
}

fn encode_dictionary(writer: &mut ByteWriter, ctx: &mut Context, entries: &[(Variant, Variant)]) -> Result<()> {
    writer.write_u32(entries.len() as u32)?;
    for (key, value) in entries {
        encode(writer, ctx, key)?;
        encode(writer, ctx, value)?;
    }
    Ok(())
}

fn encode_v2(writer: &mut ByteWriter, ctx: &mut Context, value: &Variant) -> Result<()> {
    let width = ctx.real_width;
    match value {
        Variant::Nil => write_tag(writer, 0, false)?,
        Variant::Bool(b) => {
            write_tag(writer, 1, false)?;
            writer.write_u32(u32::from(*b))?;
        }
        Variant::Int32(v) => {
            write_tag(writer, 2, false)?;
            writer.write_i32(*v)?;
        }
        Variant::Float32(v) => {
            write_tag(writer, 3, false)?;
            writer.write_f32(*v)?;
        }
        Variant::String(s) => {
            write_tag(writer, 4, false)?;
            write_inline_string(writer, s)?;
        }
        Variant::Vector2(v) => {
            write_tag(writer, 5, false)?;
            write_vector2(writer, width, *v)?;
        }
        Variant::Rect2(r) => {
            write_tag(writer, 6, false)?;
            write_vector2(writer, width, r.position)?;
            write_vector2(writer, width, r.size)?;
        }
        Variant::Vector3(v) => {
            write_tag(writer, 7, false)?;
            write_vector3(writer, width, *v)?;
        }
        Variant::Transform2D(t) => {
            write_tag(writer, 8, false)?;
            write_vector2(writer, width, t.x)?;
            write_vector2(writer, width, t.y)?;
            write_vector2(writer, width, t.origin)?;
        }
        Variant::Plane(p) => {
            write_tag(writer, 9, false)?;
            write_vector3(writer, width, p.normal)?;
            write_real(writer, width, p.d)?;
        }
        Variant::Quaternion(q) => {
            write_tag(writer, 10, false)?;
            write_real(writer, width, q.x)?;
            write_real(writer, width, q.y)?;
            write_real(writer, width, q.z)?;
            write_real(writer, width, q.w)?;
        }
        Variant::Aabb(a) => {
            write_tag(writer, 11, false)?;
            write_vector3(writer, width, a.position)?;
            write_vector3(writer, width, a.size)?;
        }
        Variant::Basis(b) => {
            write_tag(writer, 12, false)?;
            for row in b.rows {
                write_vector3(writer, width, row)?;
            }
        }
        Variant::Transform3D(t) => {
            write_tag(writer, 13, false)?;
            for row in t.basis.rows {
                write_vector3(writer, width, row)?;
            }
            write_vector3(writer, width, t.origin)?;
        }
        Variant::Color(c) => {
            write_tag(writer, 14, false)?;
            write_color(writer, *c)?;
        }
        Variant::NodePath(path) => {
            write_tag(writer, 16, false)?;
            write_node_path(writer, ctx, path)?;
        }
        Variant::Rid(id) => {
            write_tag(writer, 17, false)?;
            writer.write_u64(*id)?;
        }
        Variant::Object(obj) => {
            write_tag(writer, 18, false)?;
            write_object(writer, ctx, obj)?;
        }
        Variant::Dictionary(entries) => {
            write_tag(writer, 20, false)?;
            encode_dictionary(writer, ctx, entries)?;
        }
        Variant::Array(values) => {
            write_tag(writer, 21, false)?;
            encode_array(writer, ctx, values)?;
        }
        Variant::PackedByteArray(bytes) => {
            write_tag(writer, 22, false)?;
            write_packed_byte_array(writer, bytes)?;
        }
        Variant::PackedInt32Array(values) => {
            write_tag(writer, 23, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                writer.write_i32(*v)?;
            }
        }
        Variant::PackedFloat32Array(values) => {
            write_tag(writer, 24, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                writer.write_f32(*v)?;
            }
        }
        Variant::PackedStringArray(values) => {
            write_tag(writer, 25, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                write_inline_string(writer, v)?;
            }
        }
        Variant::PackedVector2Array(values) => {
            write_tag(writer, 26, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                write_vector2(writer, width, *v)?;
            }
        }
        Variant::PackedVector3Array(values) => {
            write_tag(writer, 27, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                write_vector3(writer, width, *v)?;
            }
        }
        Variant::PackedColorArray(values) => {
            write_tag(writer, 28, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                write_color(writer, *v)?;
            }
        }
        not_representable => {
            return Err(corrupt("Variant (V2 encode)", format!("{not_representable:?} has no V2 wire form")))
        }
    }
    Ok(())
}

fn encode_v3(writer: &mut ByteWriter, ctx: &mut Context, value: &Variant) -> Result<()> {
    let width = ctx.real_width;
    match value {
        Variant::Nil => write_tag(writer, 0, false)?,
        Variant::Bool(b) => {
            write_tag(writer, 1, false)?;
            writer.write_u32(u32::from(*b))?;
        }
        Variant::Int32(v) => {
            write_tag(writer, 2, false)?;
            writer.write_i32(*v)?;
        }
        Variant::Int64(v) => {
            write_tag(writer, 2, true)?;
            writer.write_i64(*v)?;
        }
        Variant::Float32(v) => {
            write_tag(writer, 3, false)?;
            writer.write_f32(*v)?;
        }
        Variant::Float64(v) => {
            write_tag(writer, 3, true)?;
            writer.write_f64(*v)?;
        }
        Variant::String(s) => {
            write_tag(writer, 4, false)?;
            write_inline_string(writer, s)?;
        }
        Variant::Vector2(v) => {
            write_tag(writer, 5, false)?;
            write_vector2(writer, width, *v)?;
        }
        Variant::Rect2(r) => {
            write_tag(writer, 6, false)?;
            write_vector2(writer, width, r.position)?;
            write_vector2(writer, width, r.size)?;
        }
        Variant::Vector3(v) => {
            write_tag(writer, 7, false)?;
            write_vector3(writer, width, *v)?;
        }
        Variant::Transform2D(t) => {
            write_tag(writer, 8, false)?;
            write_vector2(writer, width, t.x)?;
            write_vector2(writer, width, t.y)?;
            write_vector2(writer, width, t.origin)?;
        }
        Variant::Plane(p) => {
            write_tag(writer, 9, false)?;
            write_vector3(writer, width, p.normal)?;
            write_real(writer, width, p.d)?;
        }
        Variant::Quaternion(q) => {
            write_tag(writer, 10, false)?;
            write_real(writer, width, q.x)?;
            write_real(writer, width, q.y)?;
            write_real(writer, width, q.z)?;
            write_real(writer, width, q.w)?;
        }
        Variant::Aabb(a) => {
            write_tag(writer, 11, false)?;
            write_vector3(writer, width, a.position)?;
            write_vector3(writer, width, a.size)?;
        }
        Variant::Basis(b) => {
            write_tag(writer, 12, false)?;
            for row in b.rows {
                write_vector3(writer, width, row)?;
            }
        }
        Variant::Transform3D(t) => {
            write_tag(writer, 13, false)?;
            for row in t.basis.rows {
                write_vector3(writer, width, row)?;
            }
            write_vector3(writer, width, t.origin)?;
        }
        Variant::Color(c) => {
            write_tag(writer, 14, false)?;
            write_color(writer, *c)?;
        }
        Variant::NodePath(path) => {
            write_tag(writer, 15, false)?;
            write_node_path(writer, ctx, path)?;
        }
        Variant::Rid(id) => {
            write_tag(writer, 16, false)?;
            writer.write_u64(*id)?;
        }
        Variant::Object(obj) => {
            write_tag(writer, 17, false)?;
            write_object(writer, ctx, obj)?;
        }
        Variant::Dictionary(entries) => {
            write_tag(writer, 18, false)?;
            encode_dictionary(writer, ctx, entries)?;
        }
        Variant::Array(values) => {
            write_tag(writer, 19, false)?;
            encode_array(writer, ctx, values)?;
        }
        Variant::PackedByteArray(bytes) => {
            write_tag(writer, 20, false)?;
            write_packed_byte_array(writer, bytes)?;
        }
        Variant::PackedInt32Array(values) => {
            write_tag(writer, 21, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                writer.write_i32(*v)?;
            }
        }
        Variant::PackedFloat32Array(values) => {
            write_tag(writer, 22, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                writer.write_f32(*v)?;
            }
        }
        Variant::PackedStringArray(values) => {
            write_tag(writer, 23, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                write_inline_string(writer, v)?;
            }
        }
        Variant::PackedVector2Array(values) => {
            write_tag(writer, 24, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                write_vector2(writer, width, *v)?;
            }
        }
        Variant::PackedVector3Array(values) => {
            write_tag(writer, 25, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                write_vector3(writer, width, *v)?;
            }
        }
        Variant::PackedColorArray(values) => {
            write_tag(writer, 26, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                write_color(writer, *v)?;
            }
        }
        not_representable => {
            return Err(corrupt("Variant (V3 encode)", format!("{not_representable:?} has no V3 wire form")))
        }
    }
    Ok(())
}

fn encode_v4(writer: &mut ByteWriter, ctx: &mut Context, value: &Variant) -> Result<()> {
    let width = ctx.real_width;
    match value {
        Variant::Nil => write_tag(writer, 0, false)?,
        Variant::Bool(b) => {
            write_tag(writer, 1, false)?;
            writer.write_u32(u32::from(*b))?;
        }
        Variant::Int32(v) => {
            write_tag(writer, 2, false)?;
            writer.write_i64(i64::from(*v))?;
        }
        Variant::Int64(v) => {
            write_tag(writer, 2, false)?;
            writer.write_i64(*v)?;
        }
        Variant::Float32(v) => {
            write_tag(writer, 3, false)?;
            writer.write_f64(f64::from(*v))?;
        }
        Variant::Float64(v) => {
            write_tag(writer, 3, false)?;
            writer.write_f64(*v)?;
        }
        Variant::String(s) => {
            write_tag(writer, 4, false)?;
            write_inline_string(writer, s)?;
        }
        Variant::Vector2(v) => {
            write_tag(writer, 5, false)?;
            write_vector2(writer, width, *v)?;
        }
        Variant::Rect2(r) => {
            write_tag(writer, 6, false)?;
            write_vector2(writer, width, r.position)?;
            write_vector2(writer, width, r.size)?;
        }
        Variant::Vector3(v) => {
            write_tag(writer, 7, false)?;
            write_vector3(writer, width, *v)?;
        }
        Variant::Transform2D(t) => {
            write_tag(writer, 8, false)?;
            write_vector2(writer, width, t.x)?;
            write_vector2(writer, width, t.y)?;
            write_vector2(writer, width, t.origin)?;
        }
        Variant::Plane(p) => {
            write_tag(writer, 9, false)?;
            write_vector3(writer, width, p.normal)?;
            write_real(writer, width, p.d)?;
        }
        Variant::Quaternion(q) => {
            write_tag(writer, 10, false)?;
            write_real(writer, width, q.x)?;
            write_real(writer, width, q.y)?;
            write_real(writer, width, q.z)?;
            write_real(writer, width, q.w)?;
        }
        Variant::Aabb(a) => {
            write_tag(writer, 11, false)?;
            write_vector3(writer, width, a.position)?;
            write_vector3(writer, width, a.size)?;
        }
        Variant::Basis(b) => {
            write_tag(writer, 12, false)?;
            for row in b.rows {
                write_vector3(writer, width, row)?;
            }
        }
        Variant::Transform3D(t) => {
            write_tag(writer, 13, false)?;
            for row in t.basis.rows {
                write_vector3(writer, width, row)?;
            }
            write_vector3(writer, width, t.origin)?;
        }
        Variant::Color(c) => {
            write_tag(writer, 14, false)?;
            write_color(writer, *c)?;
        }
        Variant::NodePath(path) => {
            write_tag(writer, 15, false)?;
            write_node_path(writer, ctx, path)?;
        }
        Variant::Rid(id) => {
            write_tag(writer, 16, false)?;
            writer.write_u64(*id)?;
        }
        Variant::Object(obj) => {
            write_tag(writer, 17, false)?;
            write_object(writer, ctx, obj)?;
        }
        Variant::Dictionary(entries) => {
            write_tag(writer, 18, false)?;
            encode_dictionary(writer, ctx, entries)?;
        }
        Variant::Array(values) => {
            write_tag(writer, 19, false)?;
            encode_array(writer, ctx, values)?;
        }
        Variant::PackedByteArray(bytes) => {
            write_tag(writer, 20, false)?;
            write_packed_byte_array(writer, bytes)?;
        }
        Variant::PackedInt32Array(values) => {
            write_tag(writer, 21, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                writer.write_i32(*v)?;
            }
        }
        Variant::PackedInt64Array(values) => {
            write_tag(writer, 22, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                writer.write_i64(*v)?;
            }
        }
        Variant::PackedFloat32Array(values) => {
            write_tag(writer, 23, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                writer.write_f32(*v)?;
            }
        }
        Variant::PackedFloat64Array(values) => {
            write_tag(writer, 24, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                writer.write_f64(*v)?;
            }
        }
        Variant::PackedStringArray(values) => {
            write_tag(writer, 25, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                write_inline_string(writer, v)?;
            }
        }
        Variant::PackedVector2Array(values) => {
            write_tag(writer, 26, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                write_vector2(writer, width, *v)?;
            }
        }
        Variant::PackedVector3Array(values) => {
            write_tag(writer, 27, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                write_vector3(writer, width, *v)?;
            }
        }
        Variant::PackedColorArray(values) => {
            write_tag(writer, 28, false)?;
            writer.write_u32(values.len() as u32)?;
            for v in values {
                write_color(writer, *v)?;
            }
        }
        Variant::StringName(name) => {
            write_tag(writer, 29, false)?;
            write_name(writer, ctx, name)?;
        }
        Variant::Vector2i(v) => {
            write_tag(writer, 30, false)?;
            writer.write_i32(v.x)?;
            writer.write_i32(v.y)?;
        }
        Variant::Rect2i(r) => {
            write_tag(writer, 31, false)?;
            writer.write_i32(r.position.x)?;
            writer.write_i32(r.position.y)?;
            writer.write_i32(r.size.x)?;
            writer.write_i32(r.size.y)?;
        }
        Variant::Vector3i(v) => {
            write_tag(writer, 32, false)?;
            writer.write_i32(v.x)?;
            writer.write_i32(v.y)?;
            writer.write_i32(v.z)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pakrat_core::data::Endian;
    use pakrat_core::stream::ByteReader;

    use super::*;

    fn round_trip(generation: EngineGeneration, value: Variant) -> Variant {
        let mut writer = ByteWriter::new(Endian::Little);
        let mut ctx = Context::new(generation, RealWidth::F32);
        encode(&mut writer, &mut ctx, &value).unwrap();
        let bytes = writer.into_inner();
        let mut reader = ByteReader::new(Cursor::new(bytes), Endian::Little);
        let mut ctx = Context::new(generation, RealWidth::F32);
        decode(&mut reader, &mut ctx).unwrap()
    }

    #[test]
    fn s1_vector3_v4_matches_literal_fixture() {
        let mut writer = ByteWriter::new(Endian::Little);
        let mut ctx = Context::new(EngineGeneration::V4, RealWidth::F32);
        let value = Variant::Vector3(Vector3 { x: 1.5, y: -2.0, z: 0.0 });
        encode(&mut writer, &mut ctx, &value).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(
            bytes,
            vec![0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC0, 0x3F, 0x00, 0x00, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x00]
        );

        let mut reader = ByteReader::new(Cursor::new(bytes), Endian::Little);
        let mut ctx = Context::new(EngineGeneration::V4, RealWidth::F32);
        assert_eq!(decode(&mut reader, &mut ctx).unwrap(), value);
    }

    #[test]
    fn round_trips_scalars_across_generations() {
        for generation in [EngineGeneration::V2, EngineGeneration::V3, EngineGeneration::V4] {
            assert_eq!(round_trip(generation, Variant::Nil), Variant::Nil);
            assert_eq!(round_trip(generation, Variant::Bool(true)), Variant::Bool(true));
            assert_eq!(round_trip(generation, Variant::String("hello".into())), Variant::String("hello".into()));
        }
    }

    #[test]
    fn round_trips_nested_array_and_dictionary() {
        let value = Variant::Array(vec![
            Variant::Int64(1),
            Variant::Dictionary(vec![(Variant::String("k".into()), Variant::Bool(false))]),
        ]);
        assert_eq!(round_trip(EngineGeneration::V4, value.clone()), value);
    }

    #[test]
    fn depth_cap_is_enforced() {
        let mut writer = ByteWriter::new(Endian::Little);
        let mut ctx = Context::new(EngineGeneration::V4, RealWidth::F32);
        ctx.depth_cap = 2;
        let deeply_nested = Variant::Array(vec![Variant::Array(vec![Variant::Array(vec![Variant::Nil])])]);
        // Encoding doesn't enforce the cap (only decode does, matching "bounded read" semantics);
        // build the bytes directly via a generous cap, then decode with the tight one.
        let mut encode_ctx = Context::new(EngineGeneration::V4, RealWidth::F32);
        encode(&mut writer, &mut encode_ctx, &deeply_nested).unwrap();
        let bytes = writer.into_inner();
        let mut reader = ByteReader::new(Cursor::new(bytes), Endian::Little);
        assert!(matches!(decode(&mut reader, &mut ctx), Err(Error::DepthExceeded { cap: 2 })));
    }

    #[test]
    fn string_pool_round_trips_string_name() {
        let mut pool = StringPool::new();
        let mut writer = ByteWriter::new(Endian::Little);
        {
            let mut ctx = Context::new(EngineGeneration::V4, RealWidth::F32).with_pool(&mut pool);
            encode(&mut writer, &mut ctx, &Variant::StringName("thing".into())).unwrap();
        }
        let bytes = writer.into_inner();
        let mut reader = ByteReader::new(Cursor::new(bytes), Endian::Little);
        let mut ctx = Context::new(EngineGeneration::V4, RealWidth::F32).with_pool(&mut pool);
        assert_eq!(decode(&mut reader, &mut ctx).unwrap(), Variant::StringName("thing".into()));
    }

    #[test]
    fn vector2i_is_not_representable_under_v2() {
        let mut writer = ByteWriter::new(Endian::Little);
        let mut ctx = Context::new(EngineGeneration::V2, RealWidth::F32);
        let err = encode(&mut writer, &mut ctx, &Variant::Vector2i(Vector2i { x: 1, y: 2 })).unwrap_err();
        assert!(matches!(err, Error::CorruptData { .. }));
    }
}
