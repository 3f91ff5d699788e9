//! Declaration builders and the two-phase descriptor registry.

use std::collections::{HashMap, HashSet};

use crate::error::DescriptorError;
use crate::value::Value;
use crate::wire::{MAX_FIELD_NUMBER, MIN_FIELD_NUMBER, RESERVED_FIELD_NUMBERS};

use super::{
    AliasId, EnumDescriptor, EnumId, EnumValue, ExtensionRange, FieldDescriptor, FieldIndex,
    FieldType, Label, MessageDescriptor, MessageId, MessageKind, MethodDescriptor, Parent,
    RepeatedStorage, ScalarType, Schema, SchemaId, ServiceDescriptor, ServiceId, Syntax, TypeAlias,
    TypeRef,
};

/// A field as declared, before linking.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub(crate) name: String,
    pub(crate) number: u32,
    pub(crate) label: Label,
    pub(crate) field_type: TypeRef,
    pub(crate) default: Option<Value>,
    pub(crate) packed: bool,
    pub(crate) lazy: bool,
    pub(crate) storage: RepeatedStorage,
    pub(crate) accessor_name: Option<String>,
}

impl FieldDecl {
    pub fn new(name: &str, number: u32, label: Label, field_type: TypeRef) -> FieldDecl {
        FieldDecl {
            name: name.to_owned(),
            number,
            label,
            field_type,
            default: None,
            packed: false,
            lazy: false,
            storage: RepeatedStorage::List,
            accessor_name: None,
        }
    }

    /// Shorthand for a field of a primitive keyword type.
    pub fn scalar(name: &str, number: u32, label: Label, scalar: ScalarType) -> FieldDecl {
        FieldDecl::new(name, number, label, TypeRef::Scalar(scalar))
    }

    /// Shorthand for a field referencing a message, enum, or alias by name.
    pub fn named(name: &str, number: u32, label: Label, type_name: &str) -> FieldDecl {
        FieldDecl::new(name, number, label, TypeRef::Named(type_name.to_owned()))
    }

    /// Shorthand for a group field whose content message is `type_name`.
    pub fn group(name: &str, number: u32, label: Label, type_name: &str) -> FieldDecl {
        FieldDecl::new(name, number, label, TypeRef::Group(type_name.to_owned()))
    }

    /// Request the packed encoding; honored for repeated scalars.
    pub fn packed(mut self) -> FieldDecl {
        self.packed = true;
        self
    }

    pub fn lazy(mut self) -> FieldDecl {
        self.lazy = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> FieldDecl {
        self.default = Some(default);
        self
    }

    pub fn vector_storage(mut self) -> FieldDecl {
        self.storage = RepeatedStorage::Vector;
        self
    }

    /// Override the generated accessor name.
    pub fn accessor(mut self, name: &str) -> FieldDecl {
        self.accessor_name = Some(name.to_owned());
        self
    }
}

/// A message as declared, before linking.
#[derive(Debug, Clone)]
pub struct MessageDecl {
    pub(crate) name: String,
    pub(crate) kind: MessageKind,
    pub(crate) fields: Vec<FieldDecl>,
    pub(crate) extension_ranges: Vec<ExtensionRange>,
}

impl MessageDecl {
    pub fn new(name: &str) -> MessageDecl {
        MessageDecl {
            name: name.to_owned(),
            kind: MessageKind::Regular,
            fields: Vec::new(),
            extension_ranges: Vec::new(),
        }
    }

    pub fn kind(mut self, kind: MessageKind) -> MessageDecl {
        self.kind = kind;
        self
    }

    pub fn field(mut self, field: FieldDecl) -> MessageDecl {
        self.fields.push(field);
        self
    }

    /// Reserve `[start, end]` (inclusive) for extensions.
    pub fn extension_range(mut self, start: u32, end: u32) -> MessageDecl {
        self.extension_ranges.push(ExtensionRange::new(start, end));
        self
    }
}

/// An enum as declared, before linking.
#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub(crate) name: String,
    pub(crate) values: Vec<EnumValue>,
    pub(crate) alias_for: Option<String>,
    pub(crate) open: bool,
}

impl EnumDecl {
    pub fn new(name: &str) -> EnumDecl {
        EnumDecl {
            name: name.to_owned(),
            values: Vec::new(),
            alias_for: None,
            open: false,
        }
    }

    pub fn value(mut self, name: &str, number: i32) -> EnumDecl {
        self.values.push(EnumValue::new(name, number));
        self
    }

    /// Share the values of another enum.
    pub fn alias_for(mut self, target: &str) -> EnumDecl {
        self.alias_for = Some(target.to_owned());
        self
    }

    /// Coerce unknown symbolic values to index 0 on serialize instead of
    /// failing.
    pub fn open(mut self) -> EnumDecl {
        self.open = true;
        self
    }
}

/// One rpc as declared, before linking.
#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub(crate) name: String,
    pub(crate) input: String,
    pub(crate) output: String,
    pub(crate) client_streaming: bool,
    pub(crate) server_streaming: bool,
}

impl MethodDecl {
    pub fn new(name: &str, input: &str, output: &str) -> MethodDecl {
        MethodDecl {
            name: name.to_owned(),
            input: input.to_owned(),
            output: output.to_owned(),
            client_streaming: false,
            server_streaming: false,
        }
    }

    pub fn client_streaming(mut self) -> MethodDecl {
        self.client_streaming = true;
        self
    }

    pub fn server_streaming(mut self) -> MethodDecl {
        self.server_streaming = true;
        self
    }
}

/// A service as declared, before linking.
#[derive(Debug, Clone)]
pub struct ServiceDecl {
    pub(crate) name: String,
    pub(crate) methods: Vec<MethodDecl>,
}

impl ServiceDecl {
    pub fn new(name: &str) -> ServiceDecl {
        ServiceDecl {
            name: name.to_owned(),
            methods: Vec::new(),
        }
    }

    pub fn method(mut self, method: MethodDecl) -> ServiceDecl {
        self.methods.push(method);
        self
    }
}

struct SchemaDraft {
    name: String,
    package: String,
    syntax: String,
    imports: Vec<String>,
    messages: Vec<MessageId>,
    enums: Vec<EnumId>,
    services: Vec<ServiceId>,
}

struct MessageDraft {
    decl: MessageDecl,
    parent: Parent,
}

struct EnumDraft {
    decl: EnumDecl,
    parent: Parent,
}

struct ServiceDraft {
    decl: ServiceDecl,
    schema: SchemaId,
}

struct ExtensionDraft {
    host: String,
    field: FieldDecl,
}

/// Collects declarations (phase 1) for [`build`](RegistryBuilder::build)
/// to link and validate (phase 2).
///
/// Ids are assigned as declarations are added, so a field may reference a
/// message that is registered later — including the message it belongs to.
#[derive(Default)]
pub struct RegistryBuilder {
    schemas: Vec<SchemaDraft>,
    messages: Vec<MessageDraft>,
    enums: Vec<EnumDraft>,
    aliases: Vec<TypeAlias>,
    services: Vec<ServiceDraft>,
    extensions: Vec<ExtensionDraft>,
}

impl RegistryBuilder {
    pub fn new() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Register a schema. `syntax` must be `"proto2"`; anything else fails
    /// at build time.
    pub fn add_schema(&mut self, name: &str, package: &str, syntax: &str) -> SchemaId {
        let id = SchemaId(self.schemas.len() as u32);
        self.schemas.push(SchemaDraft {
            name: name.to_owned(),
            package: package.to_owned(),
            syntax: syntax.to_owned(),
            imports: Vec::new(),
            messages: Vec::new(),
            enums: Vec::new(),
            services: Vec::new(),
        });
        id
    }

    /// Record that `schema` imports the schema named `imported`.
    pub fn add_import(&mut self, schema: SchemaId, imported: &str) {
        self.schemas[schema.0 as usize]
            .imports
            .push(imported.to_owned());
    }

    /// Register a message under a schema or an enclosing message.
    pub fn add_message(&mut self, parent: Parent, decl: MessageDecl) -> MessageId {
        let id = MessageId(self.messages.len() as u32);
        if let Parent::Schema(schema) = parent {
            self.schemas[schema.0 as usize].messages.push(id);
        }
        self.messages.push(MessageDraft { decl, parent });
        id
    }

    /// Register an enum under a schema or an enclosing message.
    pub fn add_enum(&mut self, parent: Parent, decl: EnumDecl) -> EnumId {
        let id = EnumId(self.enums.len() as u32);
        if let Parent::Schema(schema) = parent {
            self.schemas[schema.0 as usize].enums.push(id);
        }
        self.enums.push(EnumDraft { decl, parent });
        id
    }

    /// Register an extension field against the message named `host`.
    pub fn add_extension(&mut self, host: &str, field: FieldDecl) {
        self.extensions.push(ExtensionDraft {
            host: host.to_owned(),
            field,
        });
    }

    /// Register a type alias, usable as a field type by name.
    pub fn add_type_alias(&mut self, alias: TypeAlias) -> AliasId {
        let id = AliasId(self.aliases.len() as u32);
        self.aliases.push(alias);
        id
    }

    /// Register a service under a schema.
    pub fn add_service(&mut self, schema: SchemaId, decl: ServiceDecl) -> ServiceId {
        let id = ServiceId(self.services.len() as u32);
        self.schemas[schema.0 as usize].services.push(id);
        self.services.push(ServiceDraft { decl, schema });
        id
    }

    /// Link named references and validate every structural invariant,
    /// yielding an immutable [`Registry`].
    pub fn build(self) -> Result<Registry, DescriptorError> {
        Linker::run(self)
    }
}

/// Phase-2 state: name tables built first, then declarations are linked
/// against them.
struct Linker {
    builder: RegistryBuilder,
    /// (schema, qualified name) per message draft, in id order.
    message_scope: Vec<(SchemaId, String)>,
    enum_scope: Vec<(SchemaId, String)>,
    messages_by_name: HashMap<Box<str>, MessageId>,
    enums_by_name: HashMap<Box<str>, EnumId>,
    aliases_by_name: HashMap<Box<str>, AliasId>,
    /// Shared symbol namespace for duplicate detection.
    taken: HashSet<String>,
}

impl Linker {
    fn run(builder: RegistryBuilder) -> Result<Registry, DescriptorError> {
        let mut linker = Linker {
            builder,
            message_scope: Vec::new(),
            enum_scope: Vec::new(),
            messages_by_name: HashMap::new(),
            enums_by_name: HashMap::new(),
            aliases_by_name: HashMap::new(),
            taken: HashSet::new(),
        };

        let (schemas, schemas_by_name) = linker.link_schemas()?;
        linker.claim_names()?;

        let enums = linker.link_enums()?;
        let messages = linker.link_messages()?;
        let extensions_by_host = linker.link_extensions(&messages)?;
        let (services, services_by_name) = linker.link_services()?;

        let Linker {
            builder,
            messages_by_name,
            enums_by_name,
            aliases_by_name,
            ..
        } = linker;

        Ok(Registry {
            schemas,
            messages,
            enums,
            aliases: builder.aliases,
            services,
            schemas_by_name,
            messages_by_name,
            enums_by_name,
            aliases_by_name,
            services_by_name,
            extensions_by_host,
        })
    }

    fn link_schemas(
        &mut self,
    ) -> Result<(Vec<Schema>, HashMap<Box<str>, SchemaId>), DescriptorError> {
        let mut by_name: HashMap<Box<str>, SchemaId> = HashMap::new();
        for (i, draft) in self.builder.schemas.iter().enumerate() {
            if draft.syntax != "proto2" {
                return Err(DescriptorError::InvalidSyntax {
                    schema: draft.name.as_str().into(),
                    syntax: draft.syntax.as_str().into(),
                });
            }
            let id = SchemaId(i as u32);
            if by_name.insert(draft.name.as_str().into(), id).is_some() {
                return Err(DescriptorError::DuplicateName {
                    name: draft.name.as_str().into(),
                });
            }
        }

        let mut schemas = Vec::with_capacity(self.builder.schemas.len());
        for draft in &self.builder.schemas {
            let mut imports = Vec::with_capacity(draft.imports.len());
            for import in &draft.imports {
                let id = by_name.get(import.as_str()).copied().ok_or_else(|| {
                    DescriptorError::UnresolvedTypeName {
                        referrer: draft.name.as_str().into(),
                        name: import.as_str().into(),
                    }
                })?;
                imports.push(id);
            }
            schemas.push(Schema {
                name: draft.name.as_str().into(),
                syntax: Syntax::Proto2,
                package: draft.package.as_str().into(),
                imports,
                messages: draft.messages.clone(),
                enums: draft.enums.clone(),
                services: draft.services.clone(),
            });
        }
        Ok((schemas, by_name))
    }

    /// Compute qualified names for messages, enums, and aliases, and claim
    /// each in the shared namespace.
    fn claim_names(&mut self) -> Result<(), DescriptorError> {
        for i in 0..self.builder.messages.len() {
            let draft = &self.builder.messages[i];
            let (schema, qualified) = self.scope_of(draft.parent, &draft.decl.name);
            self.claim(&qualified)?;
            self.messages_by_name
                .insert(qualified.as_str().into(), MessageId(i as u32));
            self.message_scope.push((schema, qualified));
        }

        for i in 0..self.builder.enums.len() {
            let draft = &self.builder.enums[i];
            let (schema, qualified) = self.scope_of(draft.parent, &draft.decl.name);
            self.claim(&qualified)?;
            self.enums_by_name
                .insert(qualified.as_str().into(), EnumId(i as u32));
            self.enum_scope.push((schema, qualified));
        }

        for (i, alias) in self.builder.aliases.iter().enumerate() {
            let name = alias.name.to_string();
            if self
                .aliases_by_name
                .insert(name.as_str().into(), AliasId(i as u32))
                .is_some()
            {
                return Err(DescriptorError::DuplicateName { name: name.into() });
            }
        }
        Ok(())
    }

    /// Schema and qualified name of a declaration, built by walking the
    /// parent chain. Parents always precede children in id order.
    fn scope_of(&self, parent: Parent, name: &str) -> (SchemaId, String) {
        let (schema, prefix) = match parent {
            Parent::Schema(id) => {
                let package = &self.builder.schemas[id.0 as usize].package;
                (id, package.clone())
            }
            Parent::Message(id) => {
                let (schema, qualified) = &self.message_scope[id.index()];
                (*schema, qualified.clone())
            }
        };
        let qualified = if prefix.is_empty() {
            name.to_owned()
        } else {
            format!("{prefix}.{name}")
        };
        (schema, qualified)
    }

    fn claim(&mut self, name: &str) -> Result<(), DescriptorError> {
        if !self.taken.insert(name.to_owned()) {
            return Err(DescriptorError::DuplicateName { name: name.into() });
        }
        Ok(())
    }

    fn link_enums(&self) -> Result<Vec<EnumDescriptor>, DescriptorError> {
        let mut enums = Vec::with_capacity(self.builder.enums.len());
        for (i, draft) in self.builder.enums.iter().enumerate() {
            let (schema, qualified) = &self.enum_scope[i];
            let decl = &draft.decl;

            let mut names = HashSet::new();
            let mut numbers = HashSet::new();
            for value in &decl.values {
                if !names.insert(value.name.clone()) {
                    return Err(DescriptorError::DuplicateEnumValue {
                        enum_name: qualified.as_str().into(),
                        value: value.name.clone(),
                    });
                }
                if !numbers.insert(value.number) && decl.alias_for.is_none() {
                    return Err(DescriptorError::DuplicateEnumNumber {
                        enum_name: qualified.as_str().into(),
                        number: value.number,
                    });
                }
            }

            let alias_for = match &decl.alias_for {
                None => None,
                Some(target) => Some(self.resolve_enum(target, *schema).ok_or_else(|| {
                    DescriptorError::UnresolvedTypeName {
                        referrer: qualified.as_str().into(),
                        name: target.as_str().into(),
                    }
                })?),
            };

            enums.push(EnumDescriptor {
                name: decl.name.as_str().into(),
                qualified_name: qualified.as_str().into(),
                parent: draft.parent,
                schema: *schema,
                values: decl.values.clone(),
                alias_for,
                open: decl.open,
            });
        }

        // Reject alias-for cycles so value lookups can chase chains freely.
        for (i, desc) in enums.iter().enumerate() {
            let mut seen = HashSet::from([i]);
            let mut cursor = desc.alias_for;
            while let Some(next) = cursor {
                if !seen.insert(next.0 as usize) {
                    return Err(DescriptorError::UnresolvedTypeName {
                        referrer: desc.qualified_name.clone(),
                        name: enums[next.0 as usize].qualified_name.clone(),
                    });
                }
                cursor = enums[next.0 as usize].alias_for;
            }
        }
        Ok(enums)
    }

    fn link_messages(&self) -> Result<Vec<MessageDescriptor>, DescriptorError> {
        let mut messages = Vec::with_capacity(self.builder.messages.len());
        for (i, draft) in self.builder.messages.iter().enumerate() {
            let (schema, qualified) = &self.message_scope[i];
            let decl = &draft.decl;

            for range in &decl.extension_ranges {
                if range.start < MIN_FIELD_NUMBER
                    || range.end > MAX_FIELD_NUMBER
                    || range.start > range.end
                {
                    return Err(DescriptorError::FieldNumberOutOfRange {
                        message: qualified.as_str().into(),
                        number: range.start,
                    });
                }
            }

            let mut fields = Vec::with_capacity(decl.fields.len());
            let mut numbers = HashSet::new();
            let mut bool_slots = 0u32;
            for field in &decl.fields {
                self.check_field_number(qualified, field.number, &mut numbers)?;
                if decl.extension_ranges.iter().any(|r| r.contains(field.number)) {
                    return Err(DescriptorError::DuplicateFieldNumber {
                        message: qualified.as_str().into(),
                        number: field.number,
                    });
                }

                let field_type = self.resolve_field_type(qualified, field, *schema)?;
                let bool_slot = match (field.label, field_type) {
                    (Label::Optional | Label::Required, FieldType::Scalar(ScalarType::Bool)) => {
                        let slot = bool_slots;
                        bool_slots += 1;
                        Some(slot)
                    }
                    _ => None,
                };
                fields.push(FieldDescriptor {
                    name: field.name.as_str().into(),
                    number: field.number,
                    label: field.label,
                    field_type,
                    default: field.default.clone(),
                    packed: field.packed,
                    lazy: field.lazy,
                    storage: field.storage,
                    accessor_name: field.accessor_name.as_deref().map(Into::into),
                    bool_slot,
                });
            }

            let index = build_field_index(&fields);
            let mut emit_order: Vec<u16> = (0..fields.len() as u16).collect();
            emit_order.sort_by_key(|&i| fields[usize::from(i)].number);
            let required: Vec<u16> = (0..fields.len() as u16)
                .filter(|&i| fields[usize::from(i)].label == Label::Required)
                .collect();

            messages.push(MessageDescriptor {
                name: decl.name.as_str().into(),
                qualified_name: qualified.as_str().into(),
                kind: decl.kind,
                parent: draft.parent,
                schema: *schema,
                fields,
                index,
                emit_order,
                required,
                extension_ranges: decl.extension_ranges.clone(),
                bool_slots,
            });
        }
        Ok(messages)
    }

    fn link_extensions(
        &self,
        messages: &[MessageDescriptor],
    ) -> Result<HashMap<MessageId, Vec<FieldDescriptor>>, DescriptorError> {
        let mut by_host: HashMap<MessageId, Vec<FieldDescriptor>> = HashMap::new();
        for draft in &self.builder.extensions {
            let host_id = self
                .messages_by_name
                .get(draft.host.as_str())
                .copied()
                .ok_or_else(|| DescriptorError::UnresolvedTypeName {
                    referrer: draft.field.name.as_str().into(),
                    name: draft.host.as_str().into(),
                })?;
            let host = &messages[host_id.index()];
            let field = &draft.field;

            let mut numbers: HashSet<u32> =
                host.fields.iter().map(|f| f.number).collect();
            numbers.extend(
                by_host
                    .get(&host_id)
                    .into_iter()
                    .flatten()
                    .map(|f| f.number),
            );
            self.check_field_number(&host.qualified_name, field.number, &mut numbers)?;
            if !host.extends(field.number) {
                return Err(DescriptorError::ExtensionOutOfRange {
                    message: host.qualified_name.clone(),
                    number: field.number,
                });
            }

            let field_type = self.resolve_field_type(&host.qualified_name, field, host.schema)?;
            by_host.entry(host_id).or_default().push(FieldDescriptor {
                name: field.name.as_str().into(),
                number: field.number,
                label: field.label,
                field_type,
                default: field.default.clone(),
                packed: field.packed,
                lazy: field.lazy,
                storage: field.storage,
                accessor_name: field.accessor_name.as_deref().map(Into::into),
                bool_slot: None,
            });
        }
        for extensions in by_host.values_mut() {
            extensions.sort_by_key(|f| f.number);
        }
        Ok(by_host)
    }

    fn link_services(
        &self,
    ) -> Result<(Vec<ServiceDescriptor>, HashMap<Box<str>, ServiceId>), DescriptorError> {
        let mut services = Vec::with_capacity(self.builder.services.len());
        let mut by_name = HashMap::new();
        for draft in &self.builder.services {
            let (_, qualified) = self.scope_of(Parent::Schema(draft.schema), &draft.decl.name);
            if by_name
                .insert(qualified.as_str().into(), ServiceId(services.len() as u32))
                .is_some()
                || self.taken.contains(&qualified)
            {
                return Err(DescriptorError::DuplicateName {
                    name: qualified.into(),
                });
            }

            let mut methods = Vec::with_capacity(draft.decl.methods.len());
            for (index, method) in draft.decl.methods.iter().enumerate() {
                let input = self
                    .resolve_message(&method.input, draft.schema)
                    .ok_or_else(|| DescriptorError::UnresolvedTypeName {
                        referrer: qualified.as_str().into(),
                        name: method.input.as_str().into(),
                    })?;
                let output = self
                    .resolve_message(&method.output, draft.schema)
                    .ok_or_else(|| DescriptorError::UnresolvedTypeName {
                        referrer: qualified.as_str().into(),
                        name: method.output.as_str().into(),
                    })?;
                methods.push(MethodDescriptor {
                    name: method.name.as_str().into(),
                    input,
                    output,
                    client_streaming: method.client_streaming,
                    server_streaming: method.server_streaming,
                    index: index as u32,
                });
            }
            services.push(ServiceDescriptor {
                name: draft.decl.name.as_str().into(),
                qualified_name: qualified.as_str().into(),
                schema: draft.schema,
                methods,
            });
        }
        Ok((services, by_name))
    }

    fn check_field_number(
        &self,
        message: &str,
        number: u32,
        numbers: &mut HashSet<u32>,
    ) -> Result<(), DescriptorError> {
        if number < MIN_FIELD_NUMBER || number > MAX_FIELD_NUMBER {
            return Err(DescriptorError::FieldNumberOutOfRange {
                message: message.into(),
                number,
            });
        }
        if RESERVED_FIELD_NUMBERS.contains(&number) {
            return Err(DescriptorError::ReservedFieldNumber {
                message: message.into(),
                number,
            });
        }
        if !numbers.insert(number) {
            return Err(DescriptorError::DuplicateFieldNumber {
                message: message.into(),
                number,
            });
        }
        Ok(())
    }

    fn resolve_field_type(
        &self,
        referrer: &str,
        field: &FieldDecl,
        schema: SchemaId,
    ) -> Result<FieldType, DescriptorError> {
        let unresolved = |name: &str| DescriptorError::UnresolvedTypeName {
            referrer: referrer.into(),
            name: name.into(),
        };
        match &field.field_type {
            TypeRef::Scalar(scalar) => Ok(FieldType::Scalar(*scalar)),
            TypeRef::Named(name) => {
                if let Some(id) = self.resolve_message(name, schema) {
                    Ok(FieldType::Message(id))
                } else if let Some(id) = self.resolve_enum(name, schema) {
                    Ok(FieldType::Enum(id))
                } else if let Some(id) = self.aliases_by_name.get(name.as_str()).copied() {
                    Ok(FieldType::Alias(id))
                } else {
                    Err(unresolved(name))
                }
            }
            TypeRef::Group(name) => self
                .resolve_message(name, schema)
                .map(FieldType::Group)
                .ok_or_else(|| unresolved(name)),
        }
    }

    /// Resolve a message name: exact qualified match first, then relative
    /// to the referring schema's package.
    fn resolve_message(&self, name: &str, schema: SchemaId) -> Option<MessageId> {
        if let Some(id) = self.messages_by_name.get(name).copied() {
            return Some(id);
        }
        let package = &self.builder.schemas[schema.0 as usize].package;
        if package.is_empty() {
            return None;
        }
        self.messages_by_name
            .get(format!("{package}.{name}").as_str())
            .copied()
    }

    fn resolve_enum(&self, name: &str, schema: SchemaId) -> Option<EnumId> {
        if let Some(id) = self.enums_by_name.get(name).copied() {
            return Some(id);
        }
        let package = &self.builder.schemas[schema.0 as usize].package;
        if package.is_empty() {
            return None;
        }
        self.enums_by_name
            .get(format!("{package}.{name}").as_str())
            .copied()
    }
}

/// Direct-index the field numbers when they are dense; otherwise fall back
/// to a map.
fn build_field_index(fields: &[FieldDescriptor]) -> FieldIndex {
    let max = fields.iter().map(|f| f.number).max().unwrap_or(0);
    if usize::try_from(max).map_or(false, |max| max <= fields.len() * 2 + 16) {
        let mut slots = vec![None; max as usize + 1];
        for (i, field) in fields.iter().enumerate() {
            slots[field.number as usize] = Some(i as u16);
        }
        FieldIndex::Dense(slots)
    } else {
        FieldIndex::Sparse(
            fields
                .iter()
                .enumerate()
                .map(|(i, f)| (f.number, i as u16))
                .collect(),
        )
    }
}

/// An immutable, linked descriptor registry.
///
/// Built once by [`RegistryBuilder::build`] and then shared freely; codec
/// calls borrow it and never mutate it, so concurrent readers are safe.
#[derive(Debug)]
pub struct Registry {
    schemas: Vec<Schema>,
    messages: Vec<MessageDescriptor>,
    enums: Vec<EnumDescriptor>,
    aliases: Vec<TypeAlias>,
    services: Vec<ServiceDescriptor>,
    schemas_by_name: HashMap<Box<str>, SchemaId>,
    messages_by_name: HashMap<Box<str>, MessageId>,
    enums_by_name: HashMap<Box<str>, EnumId>,
    aliases_by_name: HashMap<Box<str>, AliasId>,
    services_by_name: HashMap<Box<str>, ServiceId>,
    /// Registered extension fields per host, sorted by field number.
    extensions_by_host: HashMap<MessageId, Vec<FieldDescriptor>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn schema(&self, id: SchemaId) -> &Schema {
        &self.schemas[id.0 as usize]
    }

    pub fn message(&self, id: MessageId) -> &MessageDescriptor {
        &self.messages[id.index()]
    }

    pub fn enum_descriptor(&self, id: EnumId) -> &EnumDescriptor {
        &self.enums[id.0 as usize]
    }

    pub fn alias(&self, id: AliasId) -> &TypeAlias {
        &self.aliases[id.0 as usize]
    }

    pub fn service(&self, id: ServiceId) -> &ServiceDescriptor {
        &self.services[id.0 as usize]
    }

    pub fn schema_by_name(&self, name: &str) -> Option<SchemaId> {
        self.schemas_by_name.get(name).copied()
    }

    /// Lookup by qualified dotted name.
    pub fn message_by_name(&self, name: &str) -> Option<MessageId> {
        self.messages_by_name.get(name).copied()
    }

    pub fn enum_by_name(&self, name: &str) -> Option<EnumId> {
        self.enums_by_name.get(name).copied()
    }

    pub fn alias_by_name(&self, name: &str) -> Option<AliasId> {
        self.aliases_by_name.get(name).copied()
    }

    pub fn service_by_name(&self, name: &str) -> Option<ServiceId> {
        self.services_by_name.get(name).copied()
    }

    /// Extension fields registered against `host`, sorted by number.
    pub fn extensions_of(&self, host: MessageId) -> &[FieldDescriptor] {
        self.extensions_by_host
            .get(&host)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The extension field registered against `host` for `number`.
    pub fn extension(&self, host: MessageId, number: u32) -> Option<&FieldDescriptor> {
        let extensions = self.extensions_by_host.get(&host)?;
        extensions
            .binary_search_by_key(&number, |f| f.number)
            .ok()
            .map(|i| &extensions[i])
    }

    /// The enum whose value list is authoritative for `id`, chasing
    /// `alias_for` chains (acyclic by construction).
    pub(crate) fn effective_enum(&self, id: EnumId) -> &EnumDescriptor {
        let mut current = self.enum_descriptor(id);
        while let Some(target) = current.alias_for {
            current = self.enum_descriptor(target);
        }
        current
    }

    /// Wire index of a symbolic enum value.
    pub(crate) fn enum_wire_index(&self, id: EnumId, name: &str) -> Option<i32> {
        self.effective_enum(id)
            .value_by_name(name)
            .map(EnumValue::number)
    }

    /// Symbolic value for a wire index.
    pub(crate) fn enum_symbol(&self, id: EnumId, number: i32) -> Option<&str> {
        self.effective_enum(id)
            .value_by_number(number)
            .map(EnumValue::name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TypeRef;

    fn schema(builder: &mut RegistryBuilder) -> SchemaId {
        builder.add_schema("test.proto", "test", "proto2")
    }

    #[test]
    fn qualified_names_walk_parents() {
        let mut builder = Registry::builder();
        let file = schema(&mut builder);
        let outer = builder.add_message(Parent::Schema(file), MessageDecl::new("Outer"));
        builder.add_message(Parent::Message(outer), MessageDecl::new("Inner"));
        let registry = builder.build().unwrap();

        assert!(registry.message_by_name("test.Outer").is_some());
        let inner = registry.message_by_name("test.Outer.Inner").unwrap();
        assert_eq!(registry.message(inner).qualified_name(), "test.Outer.Inner");
    }

    #[test]
    fn rejects_wrong_syntax() {
        let mut builder = Registry::builder();
        builder.add_schema("three.proto", "", "proto3");
        assert!(matches!(
            builder.build(),
            Err(DescriptorError::InvalidSyntax { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_and_reserved_numbers() {
        for number in [0u32, 1 << 29, 19_000, 19_999] {
            let mut builder = Registry::builder();
            let file = schema(&mut builder);
            builder.add_message(
                Parent::Schema(file),
                MessageDecl::new("M").field(FieldDecl::scalar(
                    "f",
                    number,
                    Label::Optional,
                    ScalarType::Int32,
                )),
            );
            let err = builder.build().unwrap_err();
            match number {
                19_000 | 19_999 => {
                    assert!(matches!(err, DescriptorError::ReservedFieldNumber { .. }))
                }
                _ => assert!(matches!(
                    err,
                    DescriptorError::FieldNumberOutOfRange { .. }
                )),
            }
        }
    }

    #[test]
    fn rejects_duplicate_field_numbers() {
        let mut builder = Registry::builder();
        let file = schema(&mut builder);
        builder.add_message(
            Parent::Schema(file),
            MessageDecl::new("M")
                .field(FieldDecl::scalar("a", 1, Label::Optional, ScalarType::Int32))
                .field(FieldDecl::scalar("b", 1, Label::Optional, ScalarType::Int64)),
        );
        assert!(matches!(
            builder.build(),
            Err(DescriptorError::DuplicateFieldNumber { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_qualified_names() {
        let mut builder = Registry::builder();
        let file = schema(&mut builder);
        builder.add_message(Parent::Schema(file), MessageDecl::new("M"));
        builder.add_enum(Parent::Schema(file), EnumDecl::new("M").value("A", 0));
        assert!(matches!(
            builder.build(),
            Err(DescriptorError::DuplicateName { .. })
        ));
    }

    #[test]
    fn rejects_unresolved_type_reference() {
        let mut builder = Registry::builder();
        let file = schema(&mut builder);
        builder.add_message(
            Parent::Schema(file),
            MessageDecl::new("M").field(FieldDecl::new(
                "missing",
                1,
                Label::Optional,
                TypeRef::Named("Nowhere".to_owned()),
            )),
        );
        assert!(matches!(
            builder.build(),
            Err(DescriptorError::UnresolvedTypeName { .. })
        ));
    }

    #[test]
    fn enum_value_rules() {
        let mut builder = Registry::builder();
        let file = schema(&mut builder);
        builder.add_enum(
            Parent::Schema(file),
            EnumDecl::new("E").value("A", 0).value("A", 1),
        );
        assert!(matches!(
            builder.build(),
            Err(DescriptorError::DuplicateEnumValue { .. })
        ));

        let mut builder = Registry::builder();
        let file = schema(&mut builder);
        builder.add_enum(
            Parent::Schema(file),
            EnumDecl::new("E").value("A", 0).value("B", 0),
        );
        assert!(matches!(
            builder.build(),
            Err(DescriptorError::DuplicateEnumNumber { .. })
        ));

        // Repeated wire indices are allowed under alias-for.
        let mut builder = Registry::builder();
        let file = schema(&mut builder);
        builder.add_enum(
            Parent::Schema(file),
            EnumDecl::new("Base").value("A", 0).value("B", 1),
        );
        builder.add_enum(
            Parent::Schema(file),
            EnumDecl::new("Mirror")
                .value("A", 0)
                .value("ALIAS_A", 0)
                .alias_for("Base"),
        );
        let registry = builder.build().unwrap();
        let mirror = registry.enum_by_name("test.Mirror").unwrap();
        assert_eq!(registry.enum_wire_index(mirror, "B"), Some(1));
    }

    #[test]
    fn extension_must_land_in_a_declared_range() {
        let mut builder = Registry::builder();
        let file = schema(&mut builder);
        builder.add_message(
            Parent::Schema(file),
            MessageDecl::new("Host").extension_range(100, 199),
        );
        builder.add_extension(
            "test.Host",
            FieldDecl::scalar("outside", 200, Label::Optional, ScalarType::Int32),
        );
        assert!(matches!(
            builder.build(),
            Err(DescriptorError::ExtensionOutOfRange { .. })
        ));
    }

    #[test]
    fn field_number_colliding_with_extension_range() {
        let mut builder = Registry::builder();
        let file = schema(&mut builder);
        builder.add_message(
            Parent::Schema(file),
            MessageDecl::new("Host")
                .field(FieldDecl::scalar("f", 150, Label::Optional, ScalarType::Int32))
                .extension_range(100, 199),
        );
        assert!(matches!(
            builder.build(),
            Err(DescriptorError::DuplicateFieldNumber { .. })
        ));
    }

    #[test]
    fn sparse_field_numbers_use_the_fallback_index() {
        let mut builder = Registry::builder();
        let file = schema(&mut builder);
        let id = builder.add_message(
            Parent::Schema(file),
            MessageDecl::new("Sparse")
                .field(FieldDecl::scalar("a", 1, Label::Optional, ScalarType::Int32))
                .field(FieldDecl::scalar(
                    "b",
                    500_000,
                    Label::Optional,
                    ScalarType::Int32,
                )),
        );
        let registry = builder.build().unwrap();
        let message = registry.message(id);
        assert!(matches!(message.index, FieldIndex::Sparse(_)));
        assert_eq!(message.field_by_number(500_000).unwrap().name(), "b");
        assert!(message.field_by_number(2).is_none());
    }

    #[test]
    fn services_link_against_messages() {
        let mut builder = Registry::builder();
        let file = schema(&mut builder);
        builder.add_message(Parent::Schema(file), MessageDecl::new("Ping"));
        builder.add_message(Parent::Schema(file), MessageDecl::new("Pong"));
        builder.add_service(
            file,
            ServiceDecl::new("Echo").method(MethodDecl::new("Call", "Ping", "Pong").server_streaming()),
        );
        let registry = builder.build().unwrap();

        let service = registry.service(registry.service_by_name("test.Echo").unwrap());
        let method = service.method_by_name("Call").unwrap();
        assert_eq!(method.index(), 0);
        assert!(method.server_streaming());
        assert_eq!(
            registry.message(method.input()).qualified_name(),
            "test.Ping"
        );
    }
}
