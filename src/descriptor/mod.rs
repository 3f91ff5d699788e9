//! Schema descriptors: the static shape of messages, fields, enums,
//! extensions, and services that the codec dispatches over.
//!
//! Descriptors are built through [`RegistryBuilder`] in two phases: every
//! `add_*` call hands out an id immediately (so mutually recursive
//! messages can reference each other by name), and [`RegistryBuilder::build`]
//! links the named references and enforces the structural invariants.

// Field-number -> index casts are bounded by the dense-index heuristic.
#![allow(clippy::as_conversions)]

mod registry;

pub use registry::{
    EnumDecl, FieldDecl, MessageDecl, MethodDecl, Registry, RegistryBuilder, ServiceDecl,
};

use std::collections::HashMap;
use std::sync::Arc;

use crate::value::Value;
use crate::wire::WireType;

/// Identifies a [`Schema`] within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaId(pub(crate) u32);

/// Identifies a [`MessageDescriptor`] within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub(crate) u32);

/// Identifies an [`EnumDescriptor`] within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumId(pub(crate) u32);

/// Identifies a [`TypeAlias`] within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AliasId(pub(crate) u32);

/// Identifies a [`ServiceDescriptor`] within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceId(pub(crate) u32);

impl MessageId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// The only syntax this runtime accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Proto2,
}

/// Field cardinality and presence requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Optional,
    Required,
    Repeated,
}

impl Label {
    #[inline]
    pub fn is_repeated(self) -> bool {
        matches!(self, Label::Repeated)
    }
}

/// The primitive field-type keywords of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Double,
    Float,
    Int64,
    Uint64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    String,
    Bytes,
    Uint32,
    Sfixed32,
    Sfixed64,
    Sint32,
    Sint64,
}

impl ScalarType {
    /// The wire type every value of this scalar encodes with.
    pub const fn wire_type(self) -> WireType {
        match self {
            ScalarType::Int32
            | ScalarType::Int64
            | ScalarType::Uint32
            | ScalarType::Uint64
            | ScalarType::Sint32
            | ScalarType::Sint64
            | ScalarType::Bool => WireType::Varint,
            ScalarType::Fixed64 | ScalarType::Sfixed64 | ScalarType::Double => WireType::Fixed64,
            ScalarType::Fixed32 | ScalarType::Sfixed32 | ScalarType::Float => WireType::Fixed32,
            ScalarType::String | ScalarType::Bytes => WireType::LengthDelimited,
        }
    }

    /// Whether a repeated field of this scalar may use the packed encoding.
    pub const fn is_packable(self) -> bool {
        !matches!(self, ScalarType::String | ScalarType::Bytes)
    }

    /// Fixed payload width in bytes, when the scalar has one.
    pub(crate) const fn fixed_width(self) -> Option<u8> {
        match self {
            ScalarType::Fixed64 | ScalarType::Sfixed64 | ScalarType::Double => Some(8),
            ScalarType::Fixed32 | ScalarType::Sfixed32 | ScalarType::Float => Some(4),
            _ => None,
        }
    }

    /// The `.proto` keyword for this scalar.
    pub const fn keyword(self) -> &'static str {
        match self {
            ScalarType::Double => "double",
            ScalarType::Float => "float",
            ScalarType::Int64 => "int64",
            ScalarType::Uint64 => "uint64",
            ScalarType::Int32 => "int32",
            ScalarType::Fixed64 => "fixed64",
            ScalarType::Fixed32 => "fixed32",
            ScalarType::Bool => "bool",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
            ScalarType::Uint32 => "uint32",
            ScalarType::Sfixed32 => "sfixed32",
            ScalarType::Sfixed64 => "sfixed64",
            ScalarType::Sint32 => "sint32",
            ScalarType::Sint64 => "sint64",
        }
    }
}

/// A field type as declared, before the registry links names to ids.
#[derive(Debug, Clone)]
pub enum TypeRef {
    /// One of the primitive keywords.
    Scalar(ScalarType),
    /// A message, enum, or type alias by (optionally package-qualified)
    /// name, resolved at build time.
    Named(String),
    /// A group content message by name; encoded between START_GROUP and
    /// END_GROUP delimiters rather than a length prefix.
    Group(String),
}

/// A field type after the registry has linked names to ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Scalar(ScalarType),
    Message(MessageId),
    Group(MessageId),
    Enum(EnumId),
    Alias(AliasId),
}

/// Backing-store hint for repeated fields, carried from the declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatedStorage {
    #[default]
    List,
    Vector,
}

/// Whether a message is a plain message, group content, or a block of
/// extension definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    #[default]
    Regular,
    Group,
    ExtensionBlock,
}

/// The enclosing scope a message or enum is declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    Schema(SchemaId),
    Message(MessageId),
}

/// An inclusive span of field numbers a message reserves for extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionRange {
    pub start: u32,
    pub end: u32,
}

impl ExtensionRange {
    pub fn new(start: u32, end: u32) -> ExtensionRange {
        ExtensionRange { start, end }
    }

    #[inline]
    pub fn contains(&self, number: u32) -> bool {
        (self.start..=self.end).contains(&number)
    }
}

/// A linked field descriptor.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub(crate) name: Box<str>,
    pub(crate) number: u32,
    pub(crate) label: Label,
    pub(crate) field_type: FieldType,
    pub(crate) default: Option<Value>,
    pub(crate) packed: bool,
    pub(crate) lazy: bool,
    pub(crate) storage: RepeatedStorage,
    pub(crate) accessor_name: Option<Box<str>>,
    /// Index into the record's bool bit sets, for singular `bool` fields.
    pub(crate) bool_slot: Option<u32>,
}

impl FieldDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn label(&self) -> Label {
        self.label
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// The declared default, or `None` when the declaration left it empty.
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_repeated(&self) -> bool {
        self.label.is_repeated()
    }

    /// Whether a repeated scalar field uses the packed encoding.
    pub fn is_packed(&self) -> bool {
        self.packed
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn storage(&self) -> RepeatedStorage {
        self.storage
    }

    /// Accessor name override, falling back to the field name.
    pub fn accessor_name(&self) -> &str {
        self.accessor_name.as_deref().unwrap_or(&self.name)
    }

    /// The wire type a singular value of this field encodes with.
    pub fn wire_type(&self, registry: &Registry) -> WireType {
        match self.field_type {
            FieldType::Scalar(scalar) => scalar.wire_type(),
            FieldType::Message(_) => WireType::LengthDelimited,
            FieldType::Group(_) => WireType::StartGroup,
            FieldType::Enum(_) => WireType::Varint,
            FieldType::Alias(id) => registry.alias(id).wire_scalar().wire_type(),
        }
    }
}

/// Field-number lookup: a direct vector when the number space is dense,
/// an associative fallback otherwise.
#[derive(Debug, Clone)]
pub(crate) enum FieldIndex {
    Dense(Vec<Option<u16>>),
    Sparse(HashMap<u32, u16>),
}

/// A linked message descriptor.
#[derive(Debug, Clone)]
pub struct MessageDescriptor {
    pub(crate) name: Box<str>,
    pub(crate) qualified_name: Box<str>,
    pub(crate) kind: MessageKind,
    pub(crate) parent: Parent,
    pub(crate) schema: SchemaId,
    /// Fields in definition order.
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) index: FieldIndex,
    /// Field indices sorted by ascending number (ties keep definition
    /// order); serialization walks this.
    pub(crate) emit_order: Vec<u16>,
    /// Indices of `required` fields.
    pub(crate) required: Vec<u16>,
    pub(crate) extension_ranges: Vec<ExtensionRange>,
    /// Number of bool bit-slots records of this message carry.
    pub(crate) bool_slots: u32,
}

impl MessageDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted name, package-prefixed, built by walking the parent chain.
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn parent(&self) -> Parent {
        self.parent
    }

    pub fn schema(&self) -> SchemaId {
        self.schema
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn extension_ranges(&self) -> &[ExtensionRange] {
        &self.extension_ranges
    }

    /// Whether the message declares any extension range.
    pub fn is_extendable(&self) -> bool {
        !self.extension_ranges.is_empty()
    }

    /// Whether `number` falls inside one of the declared extension ranges.
    pub fn extends(&self, number: u32) -> bool {
        self.extension_ranges.iter().any(|r| r.contains(number))
    }

    /// O(1) lookup by wire field number.
    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.index_of(number).map(|i| &self.fields[i])
    }

    /// Lookup by symbolic field name.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| &*f.name == name)
    }

    pub(crate) fn index_of(&self, number: u32) -> Option<usize> {
        match &self.index {
            FieldIndex::Dense(slots) => slots
                .get(number as usize)
                .copied()
                .flatten()
                .map(usize::from),
            FieldIndex::Sparse(map) => map.get(&number).copied().map(usize::from),
        }
    }
}

/// A single symbolic value of an enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub(crate) name: Box<str>,
    pub(crate) number: i32,
}

impl EnumValue {
    pub fn new(name: &str, number: i32) -> EnumValue {
        EnumValue {
            name: name.into(),
            number,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wire index transmitted for this value.
    pub fn number(&self) -> i32 {
        self.number
    }
}

/// A linked enum descriptor.
#[derive(Debug, Clone)]
pub struct EnumDescriptor {
    pub(crate) name: Box<str>,
    pub(crate) qualified_name: Box<str>,
    pub(crate) parent: Parent,
    pub(crate) schema: SchemaId,
    pub(crate) values: Vec<EnumValue>,
    /// Another enum whose values this one shares.
    pub(crate) alias_for: Option<EnumId>,
    /// Open enums coerce unknown symbolic values to index 0 on serialize.
    pub(crate) open: bool,
}

impl EnumDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn values(&self) -> &[EnumValue] {
        &self.values
    }

    pub fn alias_for(&self) -> Option<EnumId> {
        self.alias_for
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn value_by_name(&self, name: &str) -> Option<&EnumValue> {
        self.values.iter().find(|v| &*v.name == name)
    }

    /// First value declared with `number`; later duplicates are aliases.
    pub fn value_by_number(&self, number: i32) -> Option<&EnumValue> {
        self.values.iter().find(|v| v.number == number)
    }
}

/// A descriptor for one source file.
#[derive(Debug, Clone)]
pub struct Schema {
    pub(crate) name: Box<str>,
    pub(crate) syntax: Syntax,
    pub(crate) package: Box<str>,
    pub(crate) imports: Vec<SchemaId>,
    pub(crate) messages: Vec<MessageId>,
    pub(crate) enums: Vec<EnumId>,
    pub(crate) services: Vec<ServiceId>,
}

impl Schema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn imports(&self) -> &[SchemaId] {
        &self.imports
    }

    /// Top-level messages, in declaration order.
    pub fn messages(&self) -> &[MessageId] {
        &self.messages
    }

    pub fn enums(&self) -> &[EnumId] {
        &self.enums
    }

    pub fn services(&self) -> &[ServiceId] {
        &self.services
    }
}

/// One rpc of a service.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub(crate) name: Box<str>,
    pub(crate) input: MessageId,
    pub(crate) output: MessageId,
    pub(crate) client_streaming: bool,
    pub(crate) server_streaming: bool,
    pub(crate) index: u32,
}

impl MethodDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input(&self) -> MessageId {
        self.input
    }

    pub fn output(&self) -> MessageId {
        self.output
    }

    pub fn client_streaming(&self) -> bool {
        self.client_streaming
    }

    pub fn server_streaming(&self) -> bool {
        self.server_streaming
    }

    /// Position of the method within its service.
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// A linked service descriptor. The codec treats rpc inputs and outputs as
/// ordinary messages; this exists for the RPC layer at the boundary.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub(crate) name: Box<str>,
    pub(crate) qualified_name: Box<str>,
    pub(crate) schema: SchemaId,
    pub(crate) methods: Vec<MethodDescriptor>,
}

impl ServiceDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn method_by_name(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| &*m.name == name)
    }
}

/// Converts an in-memory value to its wire representation.
pub type AliasEncodeFn = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;
/// Converts a wire value back to its in-memory representation.
pub type AliasDecodeFn = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// A first-class field type backed by a scalar wire encoding plus a pair
/// of conversion closures.
#[derive(Clone)]
pub struct TypeAlias {
    pub(crate) name: Box<str>,
    pub(crate) wire_scalar: ScalarType,
    pub(crate) encode: AliasEncodeFn,
    pub(crate) decode: AliasDecodeFn,
}

impl TypeAlias {
    pub fn new(
        name: &str,
        wire_scalar: ScalarType,
        encode: AliasEncodeFn,
        decode: AliasDecodeFn,
    ) -> TypeAlias {
        TypeAlias {
            name: name.into(),
            wire_scalar,
            encode,
            decode,
        }
    }

    /// The built-in `symbol` alias: a qualified identifier transmitted as
    /// a UTF-8 string. Not part of the canonical wire format; register it
    /// only when both peers understand it.
    pub fn symbol() -> TypeAlias {
        fn expect_symbol(value: &Value) -> Result<&str, String> {
            match value {
                Value::String(s) if !s.is_empty() => Ok(s),
                Value::String(_) => Err("symbol must not be empty".to_owned()),
                other => Err(format!("expected a symbol string, got {other:?}")),
            }
        }

        TypeAlias::new(
            "symbol",
            ScalarType::String,
            Arc::new(|value| expect_symbol(value).map(|s| Value::String(s.to_owned()))),
            Arc::new(|value| {
                expect_symbol(&value)?;
                Ok(value)
            }),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The scalar whose wire encoding carries this alias.
    pub fn wire_scalar(&self) -> ScalarType {
        self.wire_scalar
    }

    pub(crate) fn encode_value(&self, value: &Value) -> Result<Value, String> {
        (self.encode)(value)
    }

    pub(crate) fn decode_value(&self, value: Value) -> Result<Value, String> {
        (self.decode)(value)
    }
}

impl core::fmt::Debug for TypeAlias {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TypeAlias")
            .field("name", &self.name)
            .field("wire_scalar", &self.wire_scalar)
            .finish_non_exhaustive()
    }
}
