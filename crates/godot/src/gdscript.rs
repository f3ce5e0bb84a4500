//! §4.8 GDScript bytecode decompiler.
//!
//! Byte layout grounded directly in `bytecode/bytecode_base.cpp`'s `get_ids_consts_tokens`: magic,
//! identifier pool (XOR-`0xB6` obfuscated), constant pool (Variant-encoded), a line map, then a
//! token stream whose entries are 1 byte or, when bit `0x80` of the first byte is set, a 4-byte
//! little-endian word with that bit cleared (low byte = token tag, remaining bits = payload). Token
//! *kind* names are grounded in `editor/gdscript_tokenizer_old.h`'s `Token`/`Function` enums, which
//! this crate treats as one pluggable revision in a [`RevisionTable`] rather than the only one,
//! since bytecode layouts changed release to release and the source's own table is keyed the same
//! way (by the tokenizer's git commit hash).

use hashbrown::HashMap;

use crate::engine::EngineGeneration;
use crate::error::{corrupt, Error, Result};
use crate::math::RealWidth;
use crate::variant::{Context, StringPool, Variant};

const MAGIC: [u8; 4] = *b"GDSC";
/// XOR mask obfuscating the identifier pool.
const IDENTIFIER_MASK: u8 = 0xB6;
/// Bit set on the first byte of a 4-byte token word; the 1-byte form never has it set since plain
/// token tags are `0..=127`.
const TOKEN_WIDE_FLAG: u8 = 0x80;

#[inline]
const fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

/// Every token kind `GDScriptTokenizerOld::Token` enumerates, in its original declaration order —
/// the order the commit-specific token tag tables in [`RevisionTable`] index into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Empty,
    Identifier,
    Constant,
    SelfKw,
    BuiltinType,
    BuiltinFunc,
    OpIn,
    OpEqual,
    OpNotEqual,
    OpLess,
    OpLessEqual,
    OpGreater,
    OpGreaterEqual,
    OpAnd,
    OpOr,
    OpNot,
    OpAdd,
    OpSub,
    OpMul,
    OpDiv,
    OpMod,
    OpShiftLeft,
    OpShiftRight,
    OpAssign,
    OpAssignAdd,
    OpAssignSub,
    OpAssignMul,
    OpAssignDiv,
    OpAssignMod,
    OpAssignShiftLeft,
    OpAssignShiftRight,
    OpAssignBitAnd,
    OpAssignBitOr,
    OpAssignBitXor,
    OpBitAnd,
    OpBitOr,
    OpBitXor,
    OpBitInvert,
    CfIf,
    CfElif,
    CfElse,
    CfFor,
    CfWhile,
    CfBreak,
    CfContinue,
    CfPass,
    CfReturn,
    CfMatch,
    PrFunction,
    PrClass,
    PrClassName,
    PrExtends,
    PrIs,
    PrOnready,
    PrTool,
    PrStatic,
    PrExport,
    PrSetget,
    PrConst,
    PrVar,
    PrAs,
    PrVoid,
    PrEnum,
    PrPreload,
    PrAssert,
    PrYield,
    PrSignal,
    PrBreakpoint,
    PrRemote,
    PrSync,
    PrMaster,
    PrSlave,
    PrPuppet,
    PrRemotesync,
    PrMastersync,
    PrPuppetsync,
    BracketOpen,
    BracketClose,
    CurlyBracketOpen,
    CurlyBracketClose,
    ParenthesisOpen,
    ParenthesisClose,
    Comma,
    Semicolon,
    Period,
    QuestionMark,
    Colon,
    Dollar,
    ForwardArrow,
    Newline,
    ConstPi,
    ConstTau,
    Wildcard,
    ConstInf,
    ConstNan,
    Error_,
    Eof,
    Cursor,
}

impl TokenKind {
    /// The literal source text for every token kind with no payload. `None` for kinds whose text
    /// depends on the payload (`Identifier`, `Constant`, `BuiltinType`, `BuiltinFunc`, `Newline`).
    fn literal(self) -> Option<&'static str> {
        use TokenKind::*;
        Some(match self {
            SelfKw => "self",
            OpIn => "in",
            OpEqual => "==",
            OpNotEqual => "!=",
            OpLess => "<",
            OpLessEqual => "<=",
            OpGreater => ">",
            OpGreaterEqual => ">=",
            OpAnd => "and",
            OpOr => "or",
            OpNot => "not",
            OpAdd => "+",
            OpSub => "-",
            OpMul => "*",
            OpDiv => "/",
            OpMod => "%",
            OpShiftLeft => "<<",
            OpShiftRight => ">>",
            OpAssign => "=",
            OpAssignAdd => "+=",
            OpAssignSub => "-=",
            OpAssignMul => "*=",
            OpAssignDiv => "/=",
            OpAssignMod => "%=",
            OpAssignShiftLeft => "<<=",
            OpAssignShiftRight => ">>=",
            OpAssignBitAnd => "&=",
            OpAssignBitOr => "|=",
            OpAssignBitXor => "^=",
            OpBitAnd => "&",
            OpBitOr => "|",
            OpBitXor => "^",
            OpBitInvert => "~",
            CfIf => "if",
            CfElif => "elif",
            CfElse => "else",
            CfFor => "for",
            CfWhile => "while",
            CfBreak => "break",
            CfContinue => "continue",
            CfPass => "pass",
            CfReturn => "return",
            CfMatch => "match",
            PrFunction => "func",
            PrClass => "class",
            PrClassName => "class_name",
            PrExtends => "extends",
            PrIs => "is",
            PrOnready => "onready",
            PrTool => "tool",
            PrStatic => "static",
            PrExport => "export",
            PrSetget => "setget",
            PrConst => "const",
            PrVar => "var",
            PrAs => "as",
            PrVoid => "void",
            PrEnum => "enum",
            PrPreload => "preload",
            PrAssert => "assert",
            PrYield => "yield",
            PrSignal => "signal",
            PrBreakpoint => "breakpoint",
            PrRemote => "remote",
            PrSync => "sync",
            PrMaster => "master",
            PrSlave => "slave",
            PrPuppet => "puppet",
            PrRemotesync => "remotesync",
            PrMastersync => "mastersync",
            PrPuppetsync => "puppetsync",
            BracketOpen => "[",
            BracketClose => "]",
            CurlyBracketOpen => "{",
            CurlyBracketClose => "}",
            ParenthesisOpen => "(",
            ParenthesisClose => ")",
            Comma => ",",
            Semicolon => ";",
            Period => ".",
            QuestionMark => "?",
            Colon => ":",
            Dollar => "$",
            ForwardArrow => "->",
            ConstPi => "PI",
            ConstTau => "TAU",
            Wildcard => "_",
            ConstInf => "INF",
            ConstNan => "NAN",
            Empty | Identifier | Constant | BuiltinType | BuiltinFunc | Newline | Error_ | Eof | Cursor => return None,
        })
    }

    /// `true` for tokens that should never be preceded by a space (closing punctuation).
    fn glued_to_previous(self) -> bool {
        matches!(
            self,
            Self::Comma | Self::Semicolon | Self::Period | Self::ParenthesisClose | Self::BracketClose | Self::CurlyBracketClose | Self::Colon | Self::QuestionMark
        )
    }
}

/// One pluggable bytecode revision: a commit-keyed token tag table plus its builtin name tables.
pub struct RevisionSpec {
    pub label: &'static str,
    pub generation: EngineGeneration,
    pub tokens: &'static [TokenKind],
    pub builtin_funcs: &'static [&'static str],
    pub builtin_types: &'static [&'static str],
}

impl RevisionSpec {
    fn token_kind(&self, tag: u8) -> Result<TokenKind> {
        self.tokens.get(tag as usize).copied().ok_or_else(|| corrupt("bytecode token", format!("tag {tag} has no entry in this revision's table")))
    }
}

/// `token_tag → TokenKind` for the "old" (pre-4.0 rewrite) tokenizer, grounded verbatim in
/// `GDScriptTokenizerOld::Token`'s declaration order.
#[rustfmt::skip]
const TOKENS_OLD: &[TokenKind] = &[
    TokenKind::Empty, TokenKind::Identifier, TokenKind::Constant, TokenKind::SelfKw, TokenKind::BuiltinType, TokenKind::BuiltinFunc,
    TokenKind::OpIn, TokenKind::OpEqual, TokenKind::OpNotEqual, TokenKind::OpLess, TokenKind::OpLessEqual, TokenKind::OpGreater, TokenKind::OpGreaterEqual,
    TokenKind::OpAnd, TokenKind::OpOr, TokenKind::OpNot, TokenKind::OpAdd, TokenKind::OpSub, TokenKind::OpMul, TokenKind::OpDiv, TokenKind::OpMod,
    TokenKind::OpShiftLeft, TokenKind::OpShiftRight,
    TokenKind::OpAssign, TokenKind::OpAssignAdd, TokenKind::OpAssignSub, TokenKind::OpAssignMul, TokenKind::OpAssignDiv, TokenKind::OpAssignMod,
    TokenKind::OpAssignShiftLeft, TokenKind::OpAssignShiftRight, TokenKind::OpAssignBitAnd, TokenKind::OpAssignBitOr, TokenKind::OpAssignBitXor,
    TokenKind::OpBitAnd, TokenKind::OpBitOr, TokenKind::OpBitXor, TokenKind::OpBitInvert,
    TokenKind::CfIf, TokenKind::CfElif, TokenKind::CfElse, TokenKind::CfFor, TokenKind::CfWhile, TokenKind::CfBreak, TokenKind::CfContinue, TokenKind::CfPass, TokenKind::CfReturn, TokenKind::CfMatch,
    TokenKind::PrFunction, TokenKind::PrClass, TokenKind::PrClassName, TokenKind::PrExtends, TokenKind::PrIs, TokenKind::PrOnready, TokenKind::PrTool, TokenKind::PrStatic, TokenKind::PrExport,
    TokenKind::PrSetget, TokenKind::PrConst, TokenKind::PrVar, TokenKind::PrAs, TokenKind::PrVoid, TokenKind::PrEnum, TokenKind::PrPreload, TokenKind::PrAssert, TokenKind::PrYield, TokenKind::PrSignal,
    TokenKind::PrBreakpoint, TokenKind::PrRemote, TokenKind::PrSync, TokenKind::PrMaster, TokenKind::PrSlave, TokenKind::PrPuppet, TokenKind::PrRemotesync, TokenKind::PrMastersync, TokenKind::PrPuppetsync,
    TokenKind::BracketOpen, TokenKind::BracketClose, TokenKind::CurlyBracketOpen, TokenKind::CurlyBracketClose, TokenKind::ParenthesisOpen, TokenKind::ParenthesisClose,
    TokenKind::Comma, TokenKind::Semicolon, TokenKind::Period, TokenKind::QuestionMark, TokenKind::Colon, TokenKind::Dollar, TokenKind::ForwardArrow, TokenKind::Newline,
    TokenKind::ConstPi, TokenKind::ConstTau, TokenKind::Wildcard, TokenKind::ConstInf, TokenKind::ConstNan, TokenKind::Error_, TokenKind::Eof, TokenKind::Cursor,
];

/// Builtin function names, grounded verbatim (same order) in `bytecode_base.cpp`'s
/// `builtin_func_arg_elements` table, for revisions whose `Function` enum matches.
#[rustfmt::skip]
const BUILTIN_FUNCS_3X: &[&str] = &[
    "sin", "cos", "tan", "sinh", "cosh", "tanh", "asin", "acos", "atan", "atan2", "sqrt", "fmod", "fposmod", "posmod",
    "floor", "ceil", "round", "abs", "sign", "pow", "log", "exp", "is_nan", "is_inf", "is_equal_approx", "is_zero_approx",
    "ease", "decimals", "step_decimals", "stepify", "lerp", "lerp_angle", "inverse_lerp", "range_lerp", "smoothstep",
    "move_toward", "dectime", "randomize", "randi", "randf", "rand_range", "seed", "rand_seed", "deg2rad", "rad2deg",
    "linear2db", "db2linear", "polar2cartesian", "cartesian2polar", "wrapi", "wrapf", "max", "min", "clamp", "nearest_po2",
    "weakref", "funcref", "convert", "typeof", "type_exists", "char", "ord", "str", "print", "printt", "prints", "printerr",
    "printraw", "print_debug", "push_error", "push_warning", "var2str", "str2var", "var2bytes", "bytes2var", "range",
    "load", "inst2dict", "dict2inst", "validate_json", "parse_json", "to_json", "hash", "Color8", "ColorN", "print_stack",
    "get_stack", "instance_from_id", "len", "is_instance_valid", "deep_equal",
];

#[rustfmt::skip]
const BUILTIN_TYPES_3X: &[&str] = &[
    "bool", "int", "float", "String", "Vector2", "Vector2i", "Rect2", "Rect2i", "Vector3", "Vector3i", "Transform2D",
    "Plane", "Quaternion", "AABB", "Basis", "Transform3D", "Color", "NodePath", "RID", "Object", "Dictionary", "Array",
    "PackedByteArray", "PackedInt32Array", "PackedInt64Array", "PackedFloat32Array", "PackedFloat64Array",
    "PackedStringArray", "PackedVector2Array", "PackedVector3Array", "PackedColorArray",
];

/// A commit-keyed registry of known bytecode revisions. Referenced by name from
/// [`Error::UnknownRevision`](crate::error::Error::UnknownRevision)'s doc comment.
pub struct RevisionTable {
    revisions: HashMap<u32, RevisionSpec>,
}

impl RevisionTable {
    /// The revisions this crate ships a table for out of the box. `0xf3f05dc` ("4.0 dev", per
    /// §9's open question) and `0x5565f55` ("3.2") both use the pre-4.0 tokenizer layout; the
    /// actual 4.0-stable tokenizer was rewritten and isn't covered here.
    #[must_use]
    pub fn with_known_revisions() -> Self {
        let mut revisions = HashMap::new();
        revisions.insert(
            0x0556_5f55,
            RevisionSpec {
                label: "3.2",
                generation: EngineGeneration::V3,
                tokens: TOKENS_OLD,
                builtin_funcs: BUILTIN_FUNCS_3X,
                builtin_types: BUILTIN_TYPES_3X,
            },
        );
        revisions.insert(
            0xf3f05dc,
            RevisionSpec {
                label: "4.0 dev",
                generation: EngineGeneration::V3,
                tokens: TOKENS_OLD,
                builtin_funcs: BUILTIN_FUNCS_3X,
                builtin_types: BUILTIN_TYPES_3X,
            },
        );
        Self { revisions }
    }

    pub fn register(&mut self, revision: u32, spec: RevisionSpec) {
        self.revisions.insert(revision, spec);
    }

    #[must_use]
    pub fn get(&self, revision: u32) -> Option<&RevisionSpec> {
        self.revisions.get(&revision)
    }
}

/// One decoded token: its tag (resolved to a [`TokenKind`] via a [`RevisionSpec`]) and payload.
#[derive(Clone, Copy, Debug)]
struct RawToken {
    tag: u8,
    payload: u32,
}

/// The parsed, not-yet-decompiled form of a `GDSC` buffer.
pub struct Bytecode {
    pub revision: u32,
    pub identifiers: Vec<String>,
    pub constants: Vec<Variant>,
    /// `(token_index, packed_line_col)` pairs, in file order.
    pub lines: Vec<(u32, u32)>,
    tokens: Vec<RawToken>,
}

/// Parses a `GDSC` buffer. Does not decompile; call [`decompile`] with a matching
/// [`RevisionSpec`] for that.
///
/// # Errors
/// [`Error::BadMagic`] if the buffer doesn't start with `GDSC`; [`Error::UnknownRevision`] if
/// `table` has no entry for the embedded revision; [`Error::CorruptData`] for any truncated or
/// structurally invalid section.
pub fn parse_bytecode(buffer: &[u8], table: &RevisionTable) -> Result<Bytecode> {
    if buffer.len() < 24 {
        return Err(Error::EndOfFile);
    }
    let magic = [buffer[0], buffer[1], buffer[2], buffer[3]];
    if magic != MAGIC {
        return Err(Error::BadMagic { expected: MAGIC, found: magic });
    }

    let revision = read_u32(buffer, 4)?;
    let spec = table.get(revision).ok_or(Error::UnknownRevision { revision })?;

    let identifier_count = read_u32(buffer, 8)? as usize;
    let constant_count = read_u32(buffer, 12)? as usize;
    let line_count = read_u32(buffer, 16)? as usize;
    let token_count = read_u32(buffer, 20)? as usize;

    let mut cursor = 24usize;

    let mut identifiers = Vec::with_capacity(identifier_count);
    for _ in 0..identifier_count {
        let len = read_u32(buffer, cursor)? as usize;
        cursor += 4;
        let raw = take(buffer, cursor, len)?;
        let deobfuscated: Vec<u8> = raw.iter().map(|b| b ^ IDENTIFIER_MASK).collect();
        identifiers.push(String::from_utf8(deobfuscated).map_err(|_| Error::BadUtf8 { breadcrumb: format!("identifier #{}", identifiers.len()) })?);
        cursor += pad4(len);
    }

    let mut constants = Vec::with_capacity(constant_count);
    let mut pool = StringPool::new();
    for index in 0..constant_count {
        let mut data_cursor = pakrat_core::data::DataCursor::new(buffer[cursor..].to_vec(), pakrat_core::data::Endian::Little);
        let mut ctx = Context::new(spec.generation, RealWidth::F32).with_pool(&mut pool);
        let value = crate::variant::decode(&mut data_cursor, &mut ctx)
            .map_err(|_| corrupt(format!("bytecode constant #{index}"), "malformed Variant value"))?;
        let consumed = pakrat_core::stream::SeekExt::position(&mut data_cursor).unwrap_or(0) as usize;
        cursor += consumed;
        constants.push(value);
    }

    let mut lines = Vec::with_capacity(line_count);
    for _ in 0..line_count {
        let token_index = read_u32(buffer, cursor)?;
        cursor += 4;
        let linecol = read_u32(buffer, cursor)?;
        cursor += 4;
        lines.push((token_index, linecol));
    }

    let mut tokens = Vec::with_capacity(token_count);
    for _ in 0..token_count {
        if cursor >= buffer.len() {
            return Err(Error::EndOfFile);
        }
        if buffer[cursor] & TOKEN_WIDE_FLAG != 0 {
            let word = read_u32(buffer, cursor)? & !u32::from(TOKEN_WIDE_FLAG);
            cursor += 4;
            tokens.push(RawToken { tag: (word & 0xFF) as u8, payload: word >> 8 });
        } else {
            tokens.push(RawToken { tag: buffer[cursor], payload: 0 });
            cursor += 1;
        }
    }

    for token in &tokens {
        spec.token_kind(token.tag)?;
    }

    Ok(Bytecode { revision, identifiers, constants, lines, tokens })
}

fn read_u32(buffer: &[u8], offset: usize) -> Result<u32> {
    let bytes = take(buffer, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn take(buffer: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    buffer.get(offset..offset + len).ok_or(Error::EndOfFile)
}

/// Re-emits `bytecode` as GDScript source text, under the given revision table.
///
/// # Errors
/// [`Error::UnknownRevision`] if `bytecode.revision` isn't in `table`; [`Error::CorruptData`] if a
/// token's payload indexes out of bounds into the identifier/constant pool.
pub fn decompile(table: &RevisionTable, bytecode: &Bytecode) -> Result<String> {
    let spec = table.get(bytecode.revision).ok_or(Error::UnknownRevision { revision: bytecode.revision })?;

    let mut out = String::new();
    let mut last_was_newline = true;
    for token in &bytecode.tokens {
        let kind = spec.token_kind(token.tag)?;
        match kind {
            TokenKind::Eof | TokenKind::Empty | TokenKind::Cursor => continue,
            TokenKind::Newline => {
                let spaces = token.payload & 0xFFFF;
                let tabs = token.payload >> 16;
                out.push('\n');
                out.push_str(&"\t".repeat(tabs as usize));
                out.push_str(&" ".repeat(spaces as usize));
                last_was_newline = true;
                continue;
            }
            _ => {}
        }

        let text = match kind {
            TokenKind::Identifier => bytecode
                .identifiers
                .get(token.payload as usize)
                .cloned()
                .ok_or_else(|| corrupt("bytecode token", "identifier index out of range"))?,
            TokenKind::Constant => bytecode
                .constants
                .get(token.payload as usize)
                .map(print_constant)
                .ok_or_else(|| corrupt("bytecode token", "constant index out of range"))?,
            TokenKind::BuiltinFunc => spec
                .builtin_funcs
                .get(token.payload as usize)
                .map(|s| (*s).to_owned())
                .ok_or_else(|| corrupt("bytecode token", "builtin func index out of range"))?,
            TokenKind::BuiltinType => spec
                .builtin_types
                .get(token.payload as usize)
                .map(|s| (*s).to_owned())
                .ok_or_else(|| corrupt("bytecode token", "builtin type index out of range"))?,
            other => other.literal().unwrap_or_default().to_owned(),
        };

        if !last_was_newline && !kind.glued_to_previous() {
            out.push(' ');
        }
        out.push_str(&text);
        last_was_newline = false;
    }
    Ok(out)
}

fn print_constant(value: &Variant) -> String {
    match value {
        Variant::Nil => "null".to_owned(),
        Variant::Bool(b) => b.to_string(),
        Variant::Int32(v) => v.to_string(),
        Variant::Int64(v) => v.to_string(),
        Variant::Float32(v) => v.to_string(),
        Variant::Float64(v) => v.to_string(),
        Variant::String(s) | Variant::StringName(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_string_constant(value: &str) -> Vec<u8> {
        let mut writer = pakrat_core::stream::ByteWriter::new(pakrat_core::data::Endian::Little);
        let mut pool = StringPool::new();
        let mut ctx = Context::new(EngineGeneration::V3, RealWidth::F32).with_pool(&mut pool);
        crate::variant::encode(&mut writer, &mut ctx, &Variant::String(value.to_owned())).unwrap();
        writer.into_inner()
    }

    fn build_minimal_bytecode(revision: u32, identifier: &str, constant_bytes: &[u8], tokens: &[(u8, Option<u32>)]) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&MAGIC);
        buffer.extend_from_slice(&revision.to_le_bytes());
        buffer.extend_from_slice(&1u32.to_le_bytes()); // identifier_count
        buffer.extend_from_slice(&1u32.to_le_bytes()); // constant_count
        buffer.extend_from_slice(&0u32.to_le_bytes()); // line_count
        buffer.extend_from_slice(&(tokens.len() as u32).to_le_bytes());

        let padded_len = pad4(identifier.len());
        buffer.extend_from_slice(&(identifier.len() as u32).to_le_bytes());
        let mut obfuscated: Vec<u8> = identifier.bytes().map(|b| b ^ IDENTIFIER_MASK).collect();
        obfuscated.resize(padded_len, 0 ^ IDENTIFIER_MASK);
        buffer.extend_from_slice(&obfuscated);

        buffer.extend_from_slice(constant_bytes);

        for (tag, payload) in tokens {
            match payload {
                None => buffer.push(*tag),
                Some(p) => {
                    let word = (u32::from(*tag) | (p << 8)) | u32::from(TOKEN_WIDE_FLAG);
                    buffer.extend_from_slice(&word.to_le_bytes());
                }
            }
        }
        buffer
    }

    #[test]
    fn rejects_bad_magic() {
        let table = RevisionTable::with_known_revisions();
        let err = parse_bytecode(b"XXXXXXXXXXXXXXXXXXXXXXXX", &table).unwrap_err();
        assert!(matches!(err, Error::BadMagic { .. }));
    }

    #[test]
    fn rejects_unknown_revision() {
        let table = RevisionTable::with_known_revisions();
        let eof_tag = tag_for(TokenKind::Eof);
        let buffer = build_minimal_bytecode(0xdead_beef, "x", &encode_string_constant("x"), &[(eof_tag, None)]);
        let err = parse_bytecode(&buffer, &table).unwrap_err();
        assert!(matches!(err, Error::UnknownRevision { revision: 0xdead_beef }));
    }

    fn tag_for(kind: TokenKind) -> u8 {
        TOKENS_OLD.iter().position(|k| *k == kind).unwrap() as u8
    }

    #[test]
    fn decompiles_identifier_and_constant_tokens() {
        let table = RevisionTable::with_known_revisions();
        let buffer = build_minimal_bytecode(
            0x0556_5f55,
            "speed",
            &encode_string_constant("hello"),
            &[(tag_for(TokenKind::Identifier), Some(0)), (tag_for(TokenKind::Constant), Some(0)), (tag_for(TokenKind::Eof), None)],
        );
        let bytecode = parse_bytecode(&buffer, &table).unwrap();
        assert_eq!(bytecode.identifiers, vec!["speed".to_owned()]);
        let text = decompile(&table, &bytecode).unwrap();
        assert_eq!(text.trim(), "speed \"hello\"");
    }

    #[test]
    fn newline_token_recovers_indentation() {
        let table = RevisionTable::with_known_revisions();
        let payload = 2u32; // 2 spaces, 0 tabs
        let buffer = build_minimal_bytecode(
            0x0556_5f55,
            "x",
            &encode_string_constant("x"),
            &[(tag_for(TokenKind::Newline), Some(payload)), (tag_for(TokenKind::PrVar), None), (tag_for(TokenKind::Eof), None)],
        );
        let bytecode = parse_bytecode(&buffer, &table).unwrap();
        let text = decompile(&table, &bytecode).unwrap();
        assert_eq!(text, "\n  var");
    }
}
