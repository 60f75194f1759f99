// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly module data model.
//!
//! This module defines the structured representation the codec decodes into
//! and encodes from: the module itself, one type per section kind, and the
//! descriptors those sections contain. All fields are public and freely
//! mutable; encoders recompute size prefixes from the current structure, so
//! edits never desynchronize framing.
//!
//! The model is deliberately shape-level. Bytes the binary format does not
//! require the codec to understand (value types, reference types, export
//! kinds, limits flag bits beyond bit 0) are carried as raw `u8`s, and names
//! are raw byte strings; interpreting them is the host's business.

mod instr;
pub use instr::*;

use alloc::vec::Vec;

use num_enum::TryFromPrimitive;

/// WebAssembly magic number, read and written as a little-endian u32.
///
/// Represented as a one-value enum to leverage the same "decode this u32
/// enum" machinery used for [`Version`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum Magic {
    Value = 0x6d73_6100, // '\0asm'
}

/// WebAssembly module version.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum Version {
    V1 = 1,
}

/// A parsed module: the version header plus its sections in input order.
///
/// The section sequence is preserved exactly as read, including custom
/// sections wherever they appeared and sections with unrecognized IDs; the
/// codec performs no ordering or duplicate validation.
#[derive(Clone, Debug, PartialEq)]
pub struct Module {
    pub version: Version,
    pub sections: Vec<Section>,
}

impl Module {
    /// Creates an empty module with no sections.
    pub fn new() -> Self {
        Self {
            version: Version::V1,
            sections: Vec::new(),
        }
    }

    /// Returns a mutable reference to the start section, if present.
    pub fn start_mut(&mut self) -> Option<&mut StartSection> {
        self.sections.iter_mut().find_map(|section| match section {
            Section::Start(start) => Some(start),
            _ => None,
        })
    }

    /// Iterates over the module's custom sections.
    pub fn custom_sections(&self) -> impl Iterator<Item = &CustomSection> {
        self.sections.iter().filter_map(|section| match section {
            Section::Custom(custom) => Some(custom),
            _ => None,
        })
    }

    /// Finds the first custom section with the given name.
    pub fn custom_section(&self, name: &[u8]) -> Option<&CustomSection> {
        self.custom_sections().find(|custom| custom.name == name)
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

/// Section identifier within a module.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum SectionId {
    /// Custom section with arbitrary data.
    Custom = 0,
    /// Type definitions.
    Type = 1,
    /// Import declarations.
    Import = 2,
    /// Type indices for module-defined functions.
    Function = 3,
    /// Table declarations.
    Table = 4,
    /// Memory declarations.
    Memory = 5,
    /// Global declarations.
    Global = 6,
    /// Export declarations.
    Export = 7,
    /// Start function index.
    Start = 8,
    /// Element segments for table initialization.
    Element = 9,
    /// Function bodies.
    Code = 10,
    /// Data segments for memory initialization.
    Data = 11,
    /// Data segment count (for bulk memory operations).
    DataCount = 12,
    /// Exception tag declarations.
    Tag = 13,
}

/// A module section, keyed on the wire by a single-byte section ID.
///
/// Sections with an ID the codec does not recognize are preserved verbatim
/// in [`Section::Unknown`] and re-emitted untouched.
#[derive(Clone, Debug, PartialEq)]
pub enum Section {
    Custom(CustomSection),
    Type(TypeSection),
    Import(ImportSection),
    Function(FunctionSection),
    Table(TableSection),
    Memory(MemorySection),
    Global(GlobalSection),
    Export(ExportSection),
    Start(StartSection),
    Element(ElementSection),
    Code(CodeSection),
    Data(DataSection),
    DataCount(DataCountSection),
    Tag(TagSection),
    Unknown(UnknownSection),
}

impl Section {
    /// The section's wire ID byte, including unrecognized kinds.
    pub fn id(&self) -> u8 {
        match self {
            Section::Custom(_) => SectionId::Custom as u8,
            Section::Type(_) => SectionId::Type as u8,
            Section::Import(_) => SectionId::Import as u8,
            Section::Function(_) => SectionId::Function as u8,
            Section::Table(_) => SectionId::Table as u8,
            Section::Memory(_) => SectionId::Memory as u8,
            Section::Global(_) => SectionId::Global as u8,
            Section::Export(_) => SectionId::Export as u8,
            Section::Start(_) => SectionId::Start as u8,
            Section::Element(_) => SectionId::Element as u8,
            Section::Code(_) => SectionId::Code as u8,
            Section::Data(_) => SectionId::Data as u8,
            Section::DataCount(_) => SectionId::DataCount as u8,
            Section::Tag(_) => SectionId::Tag as u8,
            Section::Unknown(unknown) => unknown.kind,
        }
    }
}

/// Custom section: a length-prefixed name, then arbitrary bytes consuming
/// the remainder of the section payload. Contents are never interpreted.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CustomSection {
    pub name: Vec<u8>,
    pub data: Vec<u8>,
}

impl CustomSection {
    /// The section name, when its bytes happen to be valid UTF-8.
    pub fn name_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.name).ok()
    }
}

/// Section containing type definitions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypeSection(pub Vec<TypeDef>);

/// Section containing import declarations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportSection(pub Vec<Import>);

/// Section containing type indices for module-defined functions.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FunctionSection(pub Vec<u32>);

/// Section containing table declarations.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TableSection(pub Vec<TableType>);

/// Section containing linear memory declarations.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MemorySection(pub Vec<Limits>);

/// Section containing global declarations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GlobalSection(pub Vec<Global>);

/// Section containing export declarations.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExportSection(pub Vec<Export>);

/// Holds the index of the start function.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StartSection {
    pub func: u32,
}

/// Section containing element segments for table initialization.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ElementSection(pub Vec<ElementSegment>);

/// Section containing function bodies.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CodeSection(pub Vec<FuncBody>);

/// Section containing data segments for memory initialization.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataSection(pub Vec<DataSegment>);

/// Holds the declared number of data segments.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DataCountSection {
    pub count: u32,
}

/// Section containing exception tag declarations.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TagSection(pub Vec<Tag>);

/// A section with an unrecognized ID, preserved verbatim.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UnknownSection {
    pub kind: u8,
    pub data: Vec<u8>,
}

/// A type definition.
///
/// The common case is a bare function type: prefix `0x60` directly followed
/// by the signature, with no supertype list and no separate kind byte. The
/// `0x4e`/`0x4d` prefixes carry a count-prefixed u32 supertype list before
/// the kind byte and body. Any other prefix byte is carried through as-is
/// and still reads a kind byte and body, mirroring the format's lenient
/// shape.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TypeDef {
    pub prefix: u8,
    pub subtypes: Vec<u32>,
    pub body: TypeBody,
}

impl TypeDef {
    /// Prefix of a bare function type.
    pub const FUNC: u8 = 0x60;
    /// Prefix carrying a supertype list.
    pub const SUB: u8 = 0x4e;
    /// Prefix carrying a supertype list, final form.
    pub const SUB_FINAL: u8 = 0x4d;

    /// Creates a bare function type definition.
    pub fn func(params: Vec<u8>, results: Vec<u8>) -> Self {
        Self {
            prefix: Self::FUNC,
            subtypes: Vec::new(),
            body: TypeBody::Func(FuncType { params, results }),
        }
    }
}

/// The body of a type definition, keyed by its kind byte.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TypeBody {
    Func(FuncType),
    Struct(StructType),
    Array(FieldType),
}

impl TypeBody {
    pub(crate) const FUNC: u8 = 0x60;
    pub(crate) const STRUCT: u8 = 0x5e;
    pub(crate) const ARRAY: u8 = 0x5f;

    /// The body's wire kind byte.
    pub fn kind(&self) -> u8 {
        match self {
            TypeBody::Func(_) => Self::FUNC,
            TypeBody::Struct(_) => Self::STRUCT,
            TypeBody::Array(_) => Self::ARRAY,
        }
    }
}

/// A function signature: parameter and result value-type bytes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FuncType {
    pub params: Vec<u8>,
    pub results: Vec<u8>,
}

/// A struct type: a sequence of fields.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StructType {
    pub fields: Vec<FieldType>,
}

/// A struct field or array element type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FieldType {
    pub valtype: u8,
    pub mutable: u8,
}

/// An import declaration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Import {
    /// Name of the module to import from.
    pub module: Vec<u8>,
    /// Name of the imported entity.
    pub name: Vec<u8>,
    /// Shape of the imported entity.
    pub desc: ImportDesc,
}

/// Import descriptor, keyed on the wire by a single-byte kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImportDesc {
    /// Kind 0: a function with the given type index.
    Func(u32),
    /// Kind 1: a table.
    Table(TableType),
    /// Kind 2: a memory.
    Memory(Limits),
    /// Kind 3: a global.
    Global(GlobalType),
}

/// Size limits for tables and memories.
///
/// The flag byte is preserved verbatim; only bit 0 gates the presence of
/// `max`, so proposal bits (shared memories, 64-bit memories) pass through
/// untouched. When bit 0 is set and `max` is `None`, the encoder emits zero.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Limits {
    pub flag: u8,
    pub min: u32,
    pub max: Option<u32>,
}

impl Limits {
    /// Limits with a minimum only.
    pub fn at_least(min: u32) -> Self {
        Self {
            flag: 0,
            min,
            max: None,
        }
    }

    /// Limits with both bounds.
    pub fn bounded(min: u32, max: u32) -> Self {
        Self {
            flag: 1,
            min,
            max: Some(max),
        }
    }
}

/// A table declaration: element reference type plus size limits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TableType {
    pub reftype: u8,
    pub limits: Limits,
}

/// The type of a global: its value type byte and mutability byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GlobalType {
    pub valtype: u8,
    pub mutable: u8,
}

/// A global declaration: its type and initializer expression.
#[derive(Clone, Debug, PartialEq)]
pub struct Global {
    pub ty: GlobalType,
    pub init: ConstExpr,
}

/// An export declaration. The kind byte is carried through unvalidated.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Export {
    pub name: Vec<u8>,
    pub kind: u8,
    pub index: u32,
}

/// An element segment, keyed on the wire by a u32 flag in `0..=7`.
///
/// Each variant stores exactly the fields of its flag's wire layout. Flags 0
/// and 4 have identical payloads (an offset expression and function
/// indices); they remain distinct variants so re-encoding preserves the
/// input flag.
#[derive(Clone, Debug, PartialEq)]
pub enum ElementSegment {
    /// Flag 0: active on table 0, function indices.
    Active { offset: ConstExpr, funcs: Vec<u32> },
    /// Flag 1: passive, element expressions.
    Passive { reftype: u8, exprs: Vec<ConstExpr> },
    /// Flag 2: active with an explicit table index, element expressions.
    ActiveWithTable {
        table: u32,
        offset: ConstExpr,
        reftype: u8,
        exprs: Vec<ConstExpr>,
    },
    /// Flag 3: declarative, element expressions.
    Declarative { reftype: u8, exprs: Vec<ConstExpr> },
    /// Flag 4: active on table 0, function indices (alternate encoding of
    /// flag 0's payload).
    ActiveAlt { offset: ConstExpr, funcs: Vec<u32> },
    /// Flag 5: passive, function indices.
    PassiveFuncs { reftype: u8, funcs: Vec<u32> },
    /// Flag 6: active with an explicit table index, function indices.
    ActiveWithTableFuncs {
        table: u32,
        offset: ConstExpr,
        reftype: u8,
        funcs: Vec<u32>,
    },
    /// Flag 7: declarative, function indices.
    DeclarativeFuncs { reftype: u8, funcs: Vec<u32> },
}

impl ElementSegment {
    /// The segment's wire flag.
    pub fn flag(&self) -> u32 {
        match self {
            ElementSegment::Active { .. } => 0,
            ElementSegment::Passive { .. } => 1,
            ElementSegment::ActiveWithTable { .. } => 2,
            ElementSegment::Declarative { .. } => 3,
            ElementSegment::ActiveAlt { .. } => 4,
            ElementSegment::PassiveFuncs { .. } => 5,
            ElementSegment::ActiveWithTableFuncs { .. } => 6,
            ElementSegment::DeclarativeFuncs { .. } => 7,
        }
    }
}

/// A function body: locals declared in run-length groups, then the
/// instruction sequence.
///
/// On the wire the whole body is size-prefixed, and the instructions occupy
/// exactly the rest of that frame; the terminating `end` is an ordinary
/// member of `code`, not an implicit delimiter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FuncBody {
    pub locals: Vec<LocalGroup>,
    pub code: Vec<Instruction>,
}

/// A run of `count` locals sharing one value type byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LocalGroup {
    pub count: u32,
    pub valtype: u8,
}

/// A data segment, keyed on the wire by a u32 flag in `0..=2`.
#[derive(Clone, Debug, PartialEq)]
pub enum DataSegment {
    /// Flag 0: active in memory 0.
    Active { offset: ConstExpr, data: Vec<u8> },
    /// Flag 1: passive.
    Passive { data: Vec<u8> },
    /// Flag 2: active with an explicit memory index.
    ActiveWithMemory {
        memory: u32,
        offset: ConstExpr,
        data: Vec<u8>,
    },
}

impl DataSegment {
    /// The segment's wire flag.
    pub fn flag(&self) -> u32 {
        match self {
            DataSegment::Active { .. } => 0,
            DataSegment::Passive { .. } => 1,
            DataSegment::ActiveWithMemory { .. } => 2,
        }
    }
}

/// An exception tag declaration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Tag {
    pub attribute: u8,
    pub ty: u32,
}

/// A constant expression: an instruction sequence terminated at and
/// including an `end` instruction.
///
/// Used for global initializers, element offsets and init expressions, and
/// data offsets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstExpr(pub Vec<Instruction>);

impl ConstExpr {
    /// A constant expression holding the given instructions followed by
    /// `end`.
    pub fn terminated(mut instructions: Vec<Instruction>) -> Self {
        instructions.push(Instruction::end());
        Self(instructions)
    }
}
