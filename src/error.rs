//! Error types surfaced by the codec and the descriptor registry.

use core::fmt;

use crate::wire::WireType;

/// Errors raised while decoding a wire-format buffer.
///
/// Decoding never recovers internally; the first failure is terminal for
/// the call and the partially-filled record is discarded by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A varint carried a continuation bit past its maximum width, or its
    /// payload bits overflowed the target integer.
    MalformedVarint,
    /// The buffer ended in the middle of a value.
    UnexpectedEndOfBuffer,
    /// A tag's wire type does not match the field's declared type.
    WireTypeMismatch {
        field_number: u32,
        expected: WireType,
        actual: WireType,
    },
    /// A length prefix promised more bytes than remain, or a nested decode
    /// consumed fewer bytes than its declared length.
    TruncatedSubmessage { declared: usize, available: usize },
    /// A START_GROUP tag was not matched by the corresponding END_GROUP.
    GroupMismatch { started: u32, ended: u32 },
    /// A required field was absent when its record finished decoding.
    MissingRequired { field: Box<str> },
    /// A string payload was not valid UTF-8.
    InvalidUtf8 { field_number: u32 },
    /// A length prefix exceeds the platform's addressable memory.
    LengthOverflow { value: u64 },
    /// A packed fixed-width payload is not a multiple of the element size.
    InvalidPackedLength { element_size: u8, actual: usize },
    /// Messages or groups nested past the supported depth.
    NestingTooDeep { limit: u32 },
    /// A type-alias deserializer rejected the wire value.
    AliasFailed { alias: Box<str>, reason: Box<str> },
    /// An invalid wire type (6 or 7) or zero field number in a tag.
    InvalidTag { raw: u32 },
}

impl DecodeError {
    #[cold]
    pub(crate) fn wire_type_mismatch(
        field_number: u32,
        expected: WireType,
        actual: WireType,
    ) -> Self {
        DecodeError::WireTypeMismatch {
            field_number,
            expected,
            actual,
        }
    }

    #[cold]
    pub(crate) fn truncated(declared: usize, available: usize) -> Self {
        DecodeError::TruncatedSubmessage {
            declared,
            available,
        }
    }

    #[cold]
    pub(crate) fn missing_required(field: &str) -> Self {
        DecodeError::MissingRequired {
            field: field.into(),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MalformedVarint => write!(f, "malformed varint"),
            DecodeError::UnexpectedEndOfBuffer => write!(f, "unexpected end of buffer"),
            DecodeError::WireTypeMismatch {
                field_number,
                expected,
                actual,
            } => write!(
                f,
                "field {field_number}: wire type {actual:?} does not match declared {expected:?}"
            ),
            DecodeError::TruncatedSubmessage {
                declared,
                available,
            } => write!(
                f,
                "truncated submessage: declared {declared} bytes, {available} available"
            ),
            DecodeError::GroupMismatch { started, ended } => write!(
                f,
                "group started with field {started} ended with field {ended}"
            ),
            DecodeError::MissingRequired { field } => {
                write!(f, "required field '{field}' is missing")
            }
            DecodeError::InvalidUtf8 { field_number } => {
                write!(f, "field {field_number}: string payload is not valid UTF-8")
            }
            DecodeError::LengthOverflow { value } => {
                write!(f, "length prefix {value} exceeds addressable memory")
            }
            DecodeError::InvalidPackedLength {
                element_size,
                actual,
            } => write!(
                f,
                "packed payload of {actual} bytes is not a multiple of {element_size}"
            ),
            DecodeError::NestingTooDeep { limit } => {
                write!(f, "message nesting exceeds the supported depth of {limit}")
            }
            DecodeError::AliasFailed { alias, reason } => {
                write!(f, "type alias '{alias}' failed to decode: {reason}")
            }
            DecodeError::InvalidTag { raw } => write!(f, "invalid tag value {raw}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Errors raised while serializing a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A required field has no value.
    MissingRequired { message: Box<str>, field: Box<str> },
    /// An enum field holds a symbolic value with no wire index.
    UnknownEnumValue {
        enum_name: Box<str>,
        value: Box<str>,
    },
    /// A slot holds a value whose variant does not match the field type.
    ValueTypeMismatch {
        field: Box<str>,
        expected: &'static str,
    },
    /// A type-alias serializer rejected the in-memory value.
    AliasFailed { alias: Box<str>, reason: Box<str> },
}

impl EncodeError {
    #[cold]
    pub(crate) fn value_type_mismatch(field: &str, expected: &'static str) -> Self {
        EncodeError::ValueTypeMismatch {
            field: field.into(),
            expected,
        }
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::MissingRequired { message, field } => {
                write!(f, "required field '{field}' of '{message}' is not set")
            }
            EncodeError::UnknownEnumValue { enum_name, value } => {
                write!(f, "enum '{enum_name}' has no wire index for '{value}'")
            }
            EncodeError::ValueTypeMismatch { field, expected } => {
                write!(f, "field '{field}' expects a {expected} value")
            }
            EncodeError::AliasFailed { alias, reason } => {
                write!(f, "type alias '{alias}' failed to encode: {reason}")
            }
        }
    }
}

impl std::error::Error for EncodeError {}

/// Errors raised while building a descriptor registry.
///
/// All of these are detected during [`build`], before any codec call can
/// observe the offending descriptor.
///
/// [`build`]: crate::descriptor::RegistryBuilder::build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// A field number lies outside `[1, 2^29 - 1]`.
    FieldNumberOutOfRange { message: Box<str>, number: u32 },
    /// A field number lies in the reserved range `[19000, 19999]`.
    ReservedFieldNumber { message: Box<str>, number: u32 },
    /// Two fields (or a field and a registered extension) of one message
    /// share a number.
    DuplicateFieldNumber { message: Box<str>, number: u32 },
    /// A qualified name was registered twice.
    DuplicateName { name: Box<str> },
    /// Two values of one enum share a symbolic name.
    DuplicateEnumValue { enum_name: Box<str>, value: Box<str> },
    /// Two values of one enum share a wire index without `alias_for`.
    DuplicateEnumNumber { enum_name: Box<str>, number: i32 },
    /// A named type reference did not resolve to a message, enum, or alias.
    UnresolvedTypeName { referrer: Box<str>, name: Box<str> },
    /// A registered extension's number lies outside every extension range
    /// declared by its host.
    ExtensionOutOfRange { message: Box<str>, number: u32 },
    /// The schema declares a syntax other than `"proto2"`.
    InvalidSyntax { schema: Box<str>, syntax: Box<str> },
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::FieldNumberOutOfRange { message, number } => {
                write!(f, "field number {number} of '{message}' is out of range")
            }
            DescriptorError::ReservedFieldNumber { message, number } => {
                write!(f, "field number {number} of '{message}' is reserved")
            }
            DescriptorError::DuplicateFieldNumber { message, number } => {
                write!(f, "field number {number} appears twice in '{message}'")
            }
            DescriptorError::DuplicateName { name } => {
                write!(f, "qualified name '{name}' is already registered")
            }
            DescriptorError::DuplicateEnumValue { enum_name, value } => {
                write!(f, "enum '{enum_name}' declares value '{value}' twice")
            }
            DescriptorError::DuplicateEnumNumber { enum_name, number } => {
                write!(
                    f,
                    "enum '{enum_name}' reuses wire index {number} without alias-for"
                )
            }
            DescriptorError::UnresolvedTypeName { referrer, name } => {
                write!(f, "'{referrer}' references unknown type '{name}'")
            }
            DescriptorError::ExtensionOutOfRange { message, number } => {
                write!(
                    f,
                    "extension number {number} is outside the ranges of '{message}'"
                )
            }
            DescriptorError::InvalidSyntax { schema, syntax } => {
                write!(
                    f,
                    "schema '{schema}' declares syntax '{syntax}', expected 'proto2'"
                )
            }
        }
    }
}

impl std::error::Error for DescriptorError {}

/// Errors raised by record field accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAccessError {
    /// The message declares no field with this number.
    UnknownField { number: u32 },
    /// `set` on a repeated field, or `push` on a singular one.
    LabelMismatch { number: u32 },
}

impl fmt::Display for FieldAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldAccessError::UnknownField { number } => {
                write!(f, "message declares no field {number}")
            }
            FieldAccessError::LabelMismatch { number } => {
                write!(f, "field {number} accessed with the wrong arity")
            }
        }
    }
}

impl std::error::Error for FieldAccessError {}

/// Extension accessor used against a host that cannot carry the extension:
/// the host declares no extension ranges, the number is outside them, or no
/// extension is registered for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionNotFound {
    pub message: Box<str>,
    pub number: u32,
}

impl fmt::Display for ExtensionNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "message '{}' carries no extension {}",
            self.message, self.number
        )
    }
}

impl std::error::Error for ExtensionNotFound {}
