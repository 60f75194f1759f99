// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Binary encoding of modules, sections, and instructions.
//!
//! Every encodable node provides a pure `size()` that agrees exactly with
//! the bytes its `encode()` produces; that agreement is what lets section
//! and function-body frames write their size prefix before their payload,
//! and it is debug-asserted at each framing point. Integers are always
//! emitted in minimal LEB128 form, regardless of how the source encoded
//! them.

use alloc::vec::Vec;

use crate::cursor::Writer;
use crate::error::Error;
use crate::leb128;
use crate::types::*;

// Types that can be encoded to a writer, with a precomputable byte size.
pub(crate) trait Encodable {
    fn size(&self) -> usize;
    fn encode(&self, w: &mut Writer) -> Result<(), Error>;
}

impl Encodable for u32 {
    fn size(&self) -> usize {
        leb128::size_u32(*self)
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        leb128::write_u32(w, *self);
        Ok(())
    }
}

// Writes a sequence's u32 count prefix.
fn encode_count(len: usize, w: &mut Writer) -> Result<(), Error> {
    let count = u32::try_from(len).map_err(|_| Error::SizeOverflow)?;
    leb128::write_u32(w, count);
    Ok(())
}

fn vec_size<T: Encodable>(items: &[T]) -> usize {
    let mut size = leb128::size_u32(items.len() as u32);
    for item in items {
        size += item.size();
    }
    size
}

fn encode_vec<T: Encodable>(items: &[T], w: &mut Writer) -> Result<(), Error> {
    encode_count(items.len(), w)?;
    for item in items {
        item.encode(w)?;
    }
    Ok(())
}

fn byte_run_size(bytes: &[u8]) -> usize {
    leb128::size_u32(bytes.len() as u32) + bytes.len()
}

fn encode_byte_run(bytes: &[u8], w: &mut Writer) -> Result<(), Error> {
    encode_count(bytes.len(), w)?;
    w.write_bytes(bytes);
    Ok(())
}

impl Module {
    /// Serializes the module, recomputing every size prefix from the
    /// current structure.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut w = Writer::new();
        w.write_u32_le(Magic::Value as u32);
        w.write_u32_le(self.version as u32);
        for section in &self.sections {
            section.encode(&mut w)?;
        }
        Ok(w.into_bytes())
    }
}

impl Section {
    fn payload_size(&self) -> usize {
        match self {
            Section::Custom(custom) => custom.size(),
            Section::Type(types) => vec_size(&types.0),
            Section::Import(imports) => vec_size(&imports.0),
            Section::Function(funcs) => vec_size(&funcs.0),
            Section::Table(tables) => vec_size(&tables.0),
            Section::Memory(memories) => vec_size(&memories.0),
            Section::Global(globals) => vec_size(&globals.0),
            Section::Export(exports) => vec_size(&exports.0),
            Section::Start(start) => leb128::size_u32(start.func),
            Section::Element(elements) => vec_size(&elements.0),
            Section::Code(code) => vec_size(&code.0),
            Section::Data(data) => vec_size(&data.0),
            Section::DataCount(count) => leb128::size_u32(count.count),
            Section::Tag(tags) => vec_size(&tags.0),
            Section::Unknown(unknown) => unknown.data.len(),
        }
    }

    fn encode_payload(&self, w: &mut Writer) -> Result<(), Error> {
        match self {
            Section::Custom(custom) => custom.encode(w),
            Section::Type(types) => encode_vec(&types.0, w),
            Section::Import(imports) => encode_vec(&imports.0, w),
            Section::Function(funcs) => encode_vec(&funcs.0, w),
            Section::Table(tables) => encode_vec(&tables.0, w),
            Section::Memory(memories) => encode_vec(&memories.0, w),
            Section::Global(globals) => encode_vec(&globals.0, w),
            Section::Export(exports) => encode_vec(&exports.0, w),
            Section::Start(start) => {
                leb128::write_u32(w, start.func);
                Ok(())
            }
            Section::Element(elements) => encode_vec(&elements.0, w),
            Section::Code(code) => encode_vec(&code.0, w),
            Section::Data(data) => encode_vec(&data.0, w),
            Section::DataCount(count) => {
                leb128::write_u32(w, count.count);
                Ok(())
            }
            Section::Tag(tags) => encode_vec(&tags.0, w),
            Section::Unknown(unknown) => {
                w.write_bytes(&unknown.data);
                Ok(())
            }
        }
    }
}

impl Encodable for Section {
    fn size(&self) -> usize {
        let payload = self.payload_size();
        1 + leb128::size_u32(payload as u32) + payload
    }

    // Writes the (kind, size, payload) frame.
    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        w.write_u8(self.id());
        let payload = self.payload_size();
        let size = u32::try_from(payload).map_err(|_| Error::SizeOverflow)?;
        leb128::write_u32(w, size);

        let start = w.len();
        self.encode_payload(w)?;
        debug_assert_eq!(w.len() - start, payload, "section payload size drift");
        Ok(())
    }
}

impl Encodable for CustomSection {
    fn size(&self) -> usize {
        byte_run_size(&self.name) + self.data.len()
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        encode_byte_run(&self.name, w)?;
        w.write_bytes(&self.data);
        Ok(())
    }
}

impl Encodable for TypeDef {
    fn size(&self) -> usize {
        // A bare function type writes its signature with no kind byte.
        if self.prefix == Self::FUNC
            && let TypeBody::Func(func) = &self.body
        {
            return 1 + func.size();
        }
        let mut size = 1;
        if self.prefix == Self::SUB || self.prefix == Self::SUB_FINAL {
            size += vec_size(&self.subtypes);
        }
        size + self.body.size()
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        w.write_u8(self.prefix);
        if self.prefix == Self::FUNC
            && let TypeBody::Func(func) = &self.body
        {
            return func.encode(w);
        }
        if self.prefix == Self::SUB || self.prefix == Self::SUB_FINAL {
            encode_vec(&self.subtypes, w)?;
        }
        self.body.encode(w)
    }
}

impl Encodable for TypeBody {
    fn size(&self) -> usize {
        1 + match self {
            TypeBody::Func(func) => func.size(),
            TypeBody::Struct(body) => vec_size(&body.fields),
            TypeBody::Array(field) => field.size(),
        }
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        w.write_u8(self.kind());
        match self {
            TypeBody::Func(func) => func.encode(w),
            TypeBody::Struct(body) => encode_vec(&body.fields, w),
            TypeBody::Array(field) => field.encode(w),
        }
    }
}

impl Encodable for FuncType {
    fn size(&self) -> usize {
        byte_run_size(&self.params) + byte_run_size(&self.results)
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        encode_byte_run(&self.params, w)?;
        encode_byte_run(&self.results, w)
    }
}

impl Encodable for FieldType {
    fn size(&self) -> usize {
        2
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        w.write_u8(self.valtype);
        w.write_u8(self.mutable);
        Ok(())
    }
}

impl Encodable for Import {
    fn size(&self) -> usize {
        byte_run_size(&self.module) + byte_run_size(&self.name) + self.desc.size()
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        encode_byte_run(&self.module, w)?;
        encode_byte_run(&self.name, w)?;
        self.desc.encode(w)
    }
}

impl Encodable for ImportDesc {
    fn size(&self) -> usize {
        1 + match self {
            ImportDesc::Func(ty) => leb128::size_u32(*ty),
            ImportDesc::Table(table) => table.size(),
            ImportDesc::Memory(limits) => limits.size(),
            ImportDesc::Global(global) => global.size(),
        }
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        match self {
            ImportDesc::Func(ty) => {
                w.write_u8(0x00);
                leb128::write_u32(w, *ty);
                Ok(())
            }
            ImportDesc::Table(table) => {
                w.write_u8(0x01);
                table.encode(w)
            }
            ImportDesc::Memory(limits) => {
                w.write_u8(0x02);
                limits.encode(w)
            }
            ImportDesc::Global(global) => {
                w.write_u8(0x03);
                global.encode(w)
            }
        }
    }
}

impl Encodable for Limits {
    fn size(&self) -> usize {
        let mut size = 1 + leb128::size_u32(self.min);
        if self.flag & 1 != 0 {
            size += leb128::size_u32(self.max.unwrap_or(0));
        }
        size
    }

    // Bit 0 of the preserved flag byte gates the max field.
    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        w.write_u8(self.flag);
        leb128::write_u32(w, self.min);
        if self.flag & 1 != 0 {
            leb128::write_u32(w, self.max.unwrap_or(0));
        }
        Ok(())
    }
}

impl Encodable for TableType {
    fn size(&self) -> usize {
        1 + self.limits.size()
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        w.write_u8(self.reftype);
        self.limits.encode(w)
    }
}

impl Encodable for GlobalType {
    fn size(&self) -> usize {
        2
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        w.write_u8(self.valtype);
        w.write_u8(self.mutable);
        Ok(())
    }
}

impl Encodable for Global {
    fn size(&self) -> usize {
        self.ty.size() + self.init.size()
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        self.ty.encode(w)?;
        self.init.encode(w)
    }
}

impl Encodable for Export {
    fn size(&self) -> usize {
        byte_run_size(&self.name) + 1 + leb128::size_u32(self.index)
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        encode_byte_run(&self.name, w)?;
        w.write_u8(self.kind);
        leb128::write_u32(w, self.index);
        Ok(())
    }
}

impl Encodable for ElementSegment {
    fn size(&self) -> usize {
        let flag = leb128::size_u32(self.flag());
        flag + match self {
            ElementSegment::Active { offset, funcs }
            | ElementSegment::ActiveAlt { offset, funcs } => offset.size() + vec_size(funcs),
            ElementSegment::Passive { exprs, .. } | ElementSegment::Declarative { exprs, .. } => {
                1 + vec_size(exprs)
            }
            ElementSegment::ActiveWithTable {
                table,
                offset,
                exprs,
                ..
            } => leb128::size_u32(*table) + offset.size() + 1 + vec_size(exprs),
            ElementSegment::PassiveFuncs { funcs, .. }
            | ElementSegment::DeclarativeFuncs { funcs, .. } => 1 + vec_size(funcs),
            ElementSegment::ActiveWithTableFuncs {
                table,
                offset,
                funcs,
                ..
            } => leb128::size_u32(*table) + offset.size() + 1 + vec_size(funcs),
        }
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        leb128::write_u32(w, self.flag());
        match self {
            ElementSegment::Active { offset, funcs }
            | ElementSegment::ActiveAlt { offset, funcs } => {
                offset.encode(w)?;
                encode_vec(funcs, w)
            }
            ElementSegment::Passive { reftype, exprs }
            | ElementSegment::Declarative { reftype, exprs } => {
                w.write_u8(*reftype);
                encode_vec(exprs, w)
            }
            ElementSegment::ActiveWithTable {
                table,
                offset,
                reftype,
                exprs,
            } => {
                leb128::write_u32(w, *table);
                offset.encode(w)?;
                w.write_u8(*reftype);
                encode_vec(exprs, w)
            }
            ElementSegment::PassiveFuncs { reftype, funcs }
            | ElementSegment::DeclarativeFuncs { reftype, funcs } => {
                w.write_u8(*reftype);
                encode_vec(funcs, w)
            }
            ElementSegment::ActiveWithTableFuncs {
                table,
                offset,
                reftype,
                funcs,
            } => {
                leb128::write_u32(w, *table);
                offset.encode(w)?;
                w.write_u8(*reftype);
                encode_vec(funcs, w)
            }
        }
    }
}

impl Encodable for FuncBody {
    fn size(&self) -> usize {
        let inner = self.inner_size();
        leb128::size_u32(inner as u32) + inner
    }

    // The body writes its own size prefix, then locals and code.
    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        let inner = self.inner_size();
        let size = u32::try_from(inner).map_err(|_| Error::SizeOverflow)?;
        leb128::write_u32(w, size);

        let start = w.len();
        encode_vec(&self.locals, w)?;
        for instruction in &self.code {
            instruction.encode(w)?;
        }
        debug_assert_eq!(w.len() - start, inner, "function body size drift");
        Ok(())
    }
}

impl FuncBody {
    fn inner_size(&self) -> usize {
        let mut size = vec_size(&self.locals);
        for instruction in &self.code {
            size += instruction.size();
        }
        size
    }
}

impl Encodable for LocalGroup {
    fn size(&self) -> usize {
        leb128::size_u32(self.count) + 1
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        leb128::write_u32(w, self.count);
        w.write_u8(self.valtype);
        Ok(())
    }
}

impl Encodable for DataSegment {
    fn size(&self) -> usize {
        let flag = leb128::size_u32(self.flag());
        flag + match self {
            DataSegment::Active { offset, data } => offset.size() + byte_run_size(data),
            DataSegment::Passive { data } => byte_run_size(data),
            DataSegment::ActiveWithMemory {
                memory,
                offset,
                data,
            } => leb128::size_u32(*memory) + offset.size() + byte_run_size(data),
        }
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        leb128::write_u32(w, self.flag());
        match self {
            DataSegment::Active { offset, data } => {
                offset.encode(w)?;
                encode_byte_run(data, w)
            }
            DataSegment::Passive { data } => encode_byte_run(data, w),
            DataSegment::ActiveWithMemory {
                memory,
                offset,
                data,
            } => {
                leb128::write_u32(w, *memory);
                offset.encode(w)?;
                encode_byte_run(data, w)
            }
        }
    }
}

impl Encodable for Tag {
    fn size(&self) -> usize {
        1 + leb128::size_u32(self.ty)
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        w.write_u8(self.attribute);
        leb128::write_u32(w, self.ty);
        Ok(())
    }
}

impl Encodable for ConstExpr {
    fn size(&self) -> usize {
        self.0.iter().map(|instruction| instruction.size()).sum()
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        for instruction in &self.0 {
            instruction.encode(w)?;
        }
        Ok(())
    }
}

impl Encodable for CatchClause {
    fn size(&self) -> usize {
        let mut size = 1 + leb128::size_u32(self.label);
        if self.kind < 2 {
            size += leb128::size_u32(self.tag.unwrap_or(0));
        }
        size
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        w.write_u8(self.kind);
        if self.kind < 2 {
            leb128::write_u32(w, self.tag.unwrap_or(0));
        }
        leb128::write_u32(w, self.label);
        Ok(())
    }
}

impl Encodable for Instruction {
    fn size(&self) -> usize {
        1 + match &self.operands {
            Operands::None => 0,
            Operands::BlockType(block_type) => leb128::size_i33(*block_type),
            Operands::Index(index) => leb128::size_u32(*index),
            Operands::CallIndirect { ty, table } => {
                leb128::size_u32(*ty) + leb128::size_u32(*table)
            }
            Operands::BrTable(operands) => {
                vec_size(&operands.labels) + leb128::size_u32(operands.default)
            }
            Operands::SelectTypes(types) => vec_size(types),
            Operands::TryTable(operands) => {
                leb128::size_i33(operands.block_type) + vec_size(&operands.catches)
            }
            Operands::MemArg(memarg) => {
                leb128::size_u32(memarg.align) + leb128::size_u32(memarg.offset)
            }
            Operands::I32(value) => leb128::size_i32(*value),
            Operands::I64(value) => leb128::size_i64(*value),
            Operands::F32(_) => 4,
            Operands::F64(_) => 8,
            Operands::HeapType(heap_type) => leb128::size_i33(*heap_type),
            Operands::Misc { op, args } => {
                leb128::size_u32(*op as u32)
                    + match args {
                        MiscArgs::None => 0,
                        MiscArgs::One(a) => leb128::size_u32(*a),
                        MiscArgs::Two(a, b) => leb128::size_u32(*a) + leb128::size_u32(*b),
                    }
            }
        }
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        w.write_u8(self.opcode as u8);
        match &self.operands {
            Operands::None => {}
            Operands::BlockType(block_type) => leb128::write_i33(w, *block_type),
            Operands::Index(index) => leb128::write_u32(w, *index),
            Operands::CallIndirect { ty, table } => {
                leb128::write_u32(w, *ty);
                leb128::write_u32(w, *table);
            }
            Operands::BrTable(operands) => {
                encode_vec(&operands.labels, w)?;
                leb128::write_u32(w, operands.default);
            }
            Operands::SelectTypes(types) => encode_vec(types, w)?,
            Operands::TryTable(operands) => {
                leb128::write_i33(w, operands.block_type);
                encode_vec(&operands.catches, w)?;
            }
            Operands::MemArg(memarg) => {
                leb128::write_u32(w, memarg.align);
                leb128::write_u32(w, memarg.offset);
            }
            Operands::I32(value) => leb128::write_i32(w, *value),
            Operands::I64(value) => leb128::write_i64(w, *value),
            Operands::F32(value) => w.write_f32_le(*value),
            Operands::F64(value) => w.write_f64_le(*value),
            Operands::HeapType(heap_type) => leb128::write_i33(w, *heap_type),
            Operands::Misc { op, args } => {
                leb128::write_u32(w, *op as u32);
                match args {
                    MiscArgs::None => {}
                    MiscArgs::One(a) => leb128::write_u32(w, *a),
                    MiscArgs::Two(a, b) => {
                        leb128::write_u32(w, *a);
                        leb128::write_u32(w, *b);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(node: &impl Encodable) -> Vec<u8> {
        let mut w = Writer::new();
        node.encode(&mut w).unwrap();
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), node.size(), "size() disagrees with encode()");
        bytes
    }

    #[test]
    fn instruction_sizes_agree() {
        let samples = [
            Instruction::plain(Opcode::Unreachable),
            Instruction::end(),
            Instruction::new(Opcode::Block, Operands::BlockType(-64)),
            Instruction::new(Opcode::If, Operands::BlockType(1000)),
            Instruction::new(Opcode::Br, Operands::Index(300)),
            Instruction::new(
                Opcode::CallIndirect,
                Operands::CallIndirect { ty: 128, table: 1 },
            ),
            Instruction::new(
                Opcode::BrTable,
                Operands::BrTable(BrTableOperands {
                    labels: vec![0, 200, 70000],
                    default: 5,
                }),
            ),
            Instruction::new(Opcode::SelectT, Operands::SelectTypes(vec![0x7f, 0x7e])),
            Instruction::new(
                Opcode::TryTable,
                Operands::TryTable(TryTableOperands {
                    block_type: -64,
                    catches: vec![
                        CatchClause {
                            kind: 0,
                            tag: Some(1),
                            label: 2,
                        },
                        CatchClause {
                            kind: 3,
                            tag: None,
                            label: 0,
                        },
                    ],
                }),
            ),
            Instruction::new(
                Opcode::I64Load,
                Operands::MemArg(MemArg {
                    align: 3,
                    offset: 65536,
                }),
            ),
            Instruction::i32_const(i32::MIN),
            Instruction::i64_const(i64::MAX),
            Instruction::new(Opcode::F32Const, Operands::F32(3.5)),
            Instruction::new(Opcode::F64Const, Operands::F64(-0.0)),
            Instruction::new(Opcode::RefNull, Operands::HeapType(-16)),
            Instruction::new(
                Opcode::MiscPrefix,
                Operands::Misc {
                    op: MiscOpcode::TableCopy,
                    args: MiscArgs::Two(1, 2),
                },
            ),
        ];
        for instruction in &samples {
            encoded(instruction);
        }
    }

    #[test]
    fn start_section_bytes() {
        let section = Section::Start(StartSection { func: 3 });
        assert_eq!(encoded(&section), [0x08, 0x01, 0x03]);
    }

    #[test]
    fn custom_section_bytes() {
        let section = Section::Custom(CustomSection {
            name: b"name".to_vec(),
            data: vec![0xaa, 0xbb],
        });
        assert_eq!(
            encoded(&section),
            [0x00, 0x07, 0x04, b'n', b'a', b'm', b'e', 0xaa, 0xbb]
        );
    }

    #[test]
    fn unknown_section_bytes() {
        let section = Section::Unknown(UnknownSection {
            kind: 0x2a,
            data: vec![1, 2, 3],
        });
        assert_eq!(encoded(&section), [0x2a, 0x03, 1, 2, 3]);
    }

    #[test]
    fn limits_flag_gates_max() {
        assert_eq!(encoded(&Limits::at_least(16)), [0x00, 0x10]);
        assert_eq!(encoded(&Limits::bounded(16, 32)), [0x01, 0x10, 0x20]);
        // Proposal bits beyond bit 0 ride along untouched.
        let shared = Limits {
            flag: 0x03,
            min: 1,
            max: Some(2),
        };
        assert_eq!(encoded(&shared), [0x03, 0x01, 0x02]);
        let no_max_bit = Limits {
            flag: 0x02,
            min: 1,
            max: None,
        };
        assert_eq!(encoded(&no_max_bit), [0x02, 0x01]);
    }

    #[test]
    fn func_type_definition_bytes() {
        let def = TypeDef::func(vec![0x7f, 0x7e], vec![0x7f]);
        assert_eq!(encoded(&def), [0x60, 0x02, 0x7f, 0x7e, 0x01, 0x7f]);
    }

    #[test]
    fn sub_type_definition_bytes() {
        let def = TypeDef {
            prefix: TypeDef::SUB,
            subtypes: vec![0],
            body: TypeBody::Array(FieldType {
                valtype: 0x7f,
                mutable: 0x01,
            }),
        };
        assert_eq!(encoded(&def), [0x4e, 0x01, 0x00, 0x5f, 0x7f, 0x01]);
    }

    #[test]
    fn func_body_size_prefix() {
        let body = FuncBody {
            locals: vec![LocalGroup {
                count: 2,
                valtype: 0x7f,
            }],
            code: vec![Instruction::i32_const(1), Instruction::end()],
        };
        // locals: 01 02 7f, code: 41 01 0b => 6 payload bytes.
        assert_eq!(encoded(&body), [0x06, 0x01, 0x02, 0x7f, 0x41, 0x01, 0x0b]);
    }
}
