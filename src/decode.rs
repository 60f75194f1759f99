// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Binary decoding of modules, sections, and instructions.
//!
//! Decoding is shape-driven and allocation-per-value: every decoder returns
//! a freshly owned value and restricts itself to the frame it was handed.
//! Section payloads are isolated with [`Reader::take`], so a section decoder
//! that would read past its declared size fails with
//! [`Error::UnexpectedEnd`] rather than bleeding into the next frame.

use alloc::vec::Vec;

use crate::cursor::Reader;
use crate::error::Error;
use crate::leb128;
use crate::types::*;

// Types that can be decoded from a reader positioned at their first byte.
pub(crate) trait Decodable: Sized {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error>;
}

impl Decodable for u32 {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        leb128::read_u32(r)
    }
}

// Reads a count-prefixed sequence.
fn decode_vec<T: Decodable>(r: &mut Reader<'_>) -> Result<Vec<T>, Error> {
    let count = leb128::read_u32(r)?;
    let mut items = Vec::new();
    for _ in 0..count {
        items.push(T::decode(r)?);
    }
    Ok(items)
}

// Reads a length-prefixed byte run (names and data payloads).
fn decode_byte_run(r: &mut Reader<'_>) -> Result<Vec<u8>, Error> {
    let len = leb128::read_u32(r)? as usize;
    Ok(r.read_bytes(len)?.to_vec())
}

impl Module {
    /// Decodes a module from its complete binary image.
    ///
    /// The image must be exhausted by the final section; trailing garbage
    /// fails while being parsed as a further section frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let mut r = Reader::new(bytes);

        let magic = r.read_u32_le()?;
        Magic::try_from(magic).map_err(|_| Error::InvalidMagic(magic))?;
        let raw = r.read_u32_le()?;
        let version = Version::try_from(raw).map_err(|_| Error::UnsupportedVersion(raw))?;

        let mut sections = Vec::new();
        while !r.is_empty() {
            sections.push(Section::decode(&mut r)?);
        }
        Ok(Self { version, sections })
    }
}

impl Decodable for Section {
    // Reads one (kind, size, payload) frame and decodes the payload within
    // an isolated sub-reader.
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        let kind = r.read_u8()?;
        let size = leb128::read_u32(r)?;
        let mut payload = r.take(size as usize)?;

        let section = match SectionId::try_from(kind) {
            Ok(SectionId::Custom) => Section::Custom(CustomSection::decode(&mut payload)?),
            Ok(SectionId::Type) => Section::Type(TypeSection::decode(&mut payload)?),
            Ok(SectionId::Import) => Section::Import(ImportSection::decode(&mut payload)?),
            Ok(SectionId::Function) => Section::Function(FunctionSection::decode(&mut payload)?),
            Ok(SectionId::Table) => Section::Table(TableSection::decode(&mut payload)?),
            Ok(SectionId::Memory) => Section::Memory(MemorySection::decode(&mut payload)?),
            Ok(SectionId::Global) => Section::Global(GlobalSection::decode(&mut payload)?),
            Ok(SectionId::Export) => Section::Export(ExportSection::decode(&mut payload)?),
            Ok(SectionId::Start) => Section::Start(StartSection::decode(&mut payload)?),
            Ok(SectionId::Element) => Section::Element(ElementSection::decode(&mut payload)?),
            Ok(SectionId::Code) => Section::Code(CodeSection::decode(&mut payload)?),
            Ok(SectionId::Data) => Section::Data(DataSection::decode(&mut payload)?),
            Ok(SectionId::DataCount) => Section::DataCount(DataCountSection::decode(&mut payload)?),
            Ok(SectionId::Tag) => Section::Tag(TagSection::decode(&mut payload)?),
            Err(_) => {
                let data = payload.read_bytes(payload.remaining())?.to_vec();
                Section::Unknown(UnknownSection { kind, data })
            }
        };

        // Custom and unknown sections consume their frame by definition;
        // every other section must account for each declared byte.
        if !payload.is_empty() {
            return Err(Error::SectionSizeMismatch {
                kind,
                declared: size,
                actual: size - payload.remaining() as u32,
            });
        }
        Ok(section)
    }
}

impl Decodable for CustomSection {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        let name = decode_byte_run(r)?;
        let data = r.read_bytes(r.remaining())?.to_vec();
        Ok(Self { name, data })
    }
}

impl Decodable for TypeSection {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self(decode_vec(r)?))
    }
}

impl Decodable for ImportSection {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self(decode_vec(r)?))
    }
}

impl Decodable for FunctionSection {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self(decode_vec(r)?))
    }
}

impl Decodable for TableSection {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self(decode_vec(r)?))
    }
}

impl Decodable for MemorySection {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self(decode_vec(r)?))
    }
}

impl Decodable for GlobalSection {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self(decode_vec(r)?))
    }
}

impl Decodable for ExportSection {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self(decode_vec(r)?))
    }
}

impl Decodable for StartSection {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self {
            func: leb128::read_u32(r)?,
        })
    }
}

impl Decodable for ElementSection {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self(decode_vec(r)?))
    }
}

impl Decodable for CodeSection {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self(decode_vec(r)?))
    }
}

impl Decodable for DataSection {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self(decode_vec(r)?))
    }
}

impl Decodable for DataCountSection {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self {
            count: leb128::read_u32(r)?,
        })
    }
}

impl Decodable for TagSection {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self(decode_vec(r)?))
    }
}

impl Decodable for TypeDef {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        let prefix = r.read_u8()?;

        // A bare function type: no supertype list and no kind byte.
        if prefix == TypeDef::FUNC {
            return Ok(Self {
                prefix,
                subtypes: Vec::new(),
                body: TypeBody::Func(FuncType::decode(r)?),
            });
        }

        // Only the sub prefixes carry a supertype list, but any other
        // prefix byte still reads a kind byte and body.
        let subtypes = if prefix == TypeDef::SUB || prefix == TypeDef::SUB_FINAL {
            decode_vec(r)?
        } else {
            Vec::new()
        };
        let body = TypeBody::decode(r)?;
        Ok(Self {
            prefix,
            subtypes,
            body,
        })
    }
}

impl Decodable for TypeBody {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        let kind = r.read_u8()?;
        match kind {
            TypeBody::FUNC => Ok(TypeBody::Func(FuncType::decode(r)?)),
            TypeBody::STRUCT => Ok(TypeBody::Struct(StructType::decode(r)?)),
            TypeBody::ARRAY => Ok(TypeBody::Array(FieldType::decode(r)?)),
            _ => Err(Error::UnknownTypeKind(kind)),
        }
    }
}

impl Decodable for FuncType {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self {
            params: decode_byte_run(r)?,
            results: decode_byte_run(r)?,
        })
    }
}

impl Decodable for StructType {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self {
            fields: decode_vec(r)?,
        })
    }
}

impl Decodable for FieldType {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self {
            valtype: r.read_u8()?,
            mutable: r.read_u8()?,
        })
    }
}

impl Decodable for Import {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self {
            module: decode_byte_run(r)?,
            name: decode_byte_run(r)?,
            desc: ImportDesc::decode(r)?,
        })
    }
}

impl Decodable for ImportDesc {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        let kind = r.read_u8()?;
        match kind {
            0x00 => Ok(ImportDesc::Func(leb128::read_u32(r)?)),
            0x01 => Ok(ImportDesc::Table(TableType::decode(r)?)),
            0x02 => Ok(ImportDesc::Memory(Limits::decode(r)?)),
            0x03 => Ok(ImportDesc::Global(GlobalType::decode(r)?)),
            _ => Err(Error::UnknownImportKind(kind)),
        }
    }
}

impl Decodable for Limits {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        let flag = r.read_u8()?;
        let min = leb128::read_u32(r)?;
        let max = if flag & 1 != 0 {
            Some(leb128::read_u32(r)?)
        } else {
            None
        };
        Ok(Self { flag, min, max })
    }
}

impl Decodable for TableType {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self {
            reftype: r.read_u8()?,
            limits: Limits::decode(r)?,
        })
    }
}

impl Decodable for GlobalType {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self {
            valtype: r.read_u8()?,
            mutable: r.read_u8()?,
        })
    }
}

impl Decodable for Global {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self {
            ty: GlobalType::decode(r)?,
            init: ConstExpr::decode(r)?,
        })
    }
}

impl Decodable for Export {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self {
            name: decode_byte_run(r)?,
            kind: r.read_u8()?,
            index: leb128::read_u32(r)?,
        })
    }
}

impl Decodable for ElementSegment {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        let flag = leb128::read_u32(r)?;
        match flag {
            0 => Ok(ElementSegment::Active {
                offset: ConstExpr::decode(r)?,
                funcs: decode_vec(r)?,
            }),
            1 => Ok(ElementSegment::Passive {
                reftype: r.read_u8()?,
                exprs: decode_vec(r)?,
            }),
            2 => Ok(ElementSegment::ActiveWithTable {
                table: leb128::read_u32(r)?,
                offset: ConstExpr::decode(r)?,
                reftype: r.read_u8()?,
                exprs: decode_vec(r)?,
            }),
            3 => Ok(ElementSegment::Declarative {
                reftype: r.read_u8()?,
                exprs: decode_vec(r)?,
            }),
            4 => Ok(ElementSegment::ActiveAlt {
                offset: ConstExpr::decode(r)?,
                funcs: decode_vec(r)?,
            }),
            5 => Ok(ElementSegment::PassiveFuncs {
                reftype: r.read_u8()?,
                funcs: decode_vec(r)?,
            }),
            6 => Ok(ElementSegment::ActiveWithTableFuncs {
                table: leb128::read_u32(r)?,
                offset: ConstExpr::decode(r)?,
                reftype: r.read_u8()?,
                funcs: decode_vec(r)?,
            }),
            7 => Ok(ElementSegment::DeclarativeFuncs {
                reftype: r.read_u8()?,
                funcs: decode_vec(r)?,
            }),
            _ => Err(Error::UnknownElementFlag(flag)),
        }
    }
}

impl Decodable for FuncBody {
    // The body is size-prefixed; its instructions consume exactly the rest
    // of that frame, terminating `end` included.
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        let size = leb128::read_u32(r)?;
        let mut body = r.take(size as usize)?;

        let locals = decode_vec(&mut body)?;
        let mut code = Vec::new();
        while !body.is_empty() {
            code.push(Instruction::decode(&mut body)?);
        }
        Ok(Self { locals, code })
    }
}

impl Decodable for LocalGroup {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self {
            count: leb128::read_u32(r)?,
            valtype: r.read_u8()?,
        })
    }
}

impl Decodable for DataSegment {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        let flag = leb128::read_u32(r)?;
        match flag {
            0 => Ok(DataSegment::Active {
                offset: ConstExpr::decode(r)?,
                data: decode_byte_run(r)?,
            }),
            1 => Ok(DataSegment::Passive {
                data: decode_byte_run(r)?,
            }),
            2 => Ok(DataSegment::ActiveWithMemory {
                memory: leb128::read_u32(r)?,
                offset: ConstExpr::decode(r)?,
                data: decode_byte_run(r)?,
            }),
            _ => Err(Error::UnknownDataFlag(flag)),
        }
    }
}

impl Decodable for Tag {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        Ok(Self {
            attribute: r.read_u8()?,
            ty: leb128::read_u32(r)?,
        })
    }
}

impl Decodable for ConstExpr {
    // Reads instructions through the terminating `end`, inclusive.
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        let mut instructions = Vec::new();
        loop {
            let instruction = Instruction::decode(r)?;
            let done = instruction.opcode == Opcode::End;
            instructions.push(instruction);
            if done {
                return Ok(Self(instructions));
            }
        }
    }
}

impl Decodable for CatchClause {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        let kind = r.read_u8()?;
        let tag = if kind < 2 {
            Some(leb128::read_u32(r)?)
        } else {
            None
        };
        Ok(Self {
            kind,
            tag,
            label: leb128::read_u32(r)?,
        })
    }
}

impl Decodable for Instruction {
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        let byte = r.read_u8()?;
        let opcode = Opcode::try_from(byte).map_err(|_| Error::UnknownOpcode(byte))?;

        let operands = match OPERAND_KINDS[byte as usize] {
            // Opcode::try_from has already rejected these bytes.
            OperandKind::Invalid => return Err(Error::UnknownOpcode(byte)),
            OperandKind::None => Operands::None,
            OperandKind::BlockType => Operands::BlockType(leb128::read_i33(r)?),
            OperandKind::Index => Operands::Index(leb128::read_u32(r)?),
            OperandKind::CallIndirect => Operands::CallIndirect {
                ty: leb128::read_u32(r)?,
                table: leb128::read_u32(r)?,
            },
            OperandKind::BrTable => Operands::BrTable(BrTableOperands {
                labels: decode_vec(r)?,
                default: leb128::read_u32(r)?,
            }),
            OperandKind::SelectTypes => Operands::SelectTypes(decode_vec(r)?),
            OperandKind::TryTable => Operands::TryTable(TryTableOperands {
                block_type: leb128::read_i33(r)?,
                catches: decode_vec(r)?,
            }),
            OperandKind::MemArg => Operands::MemArg(MemArg {
                align: leb128::read_u32(r)?,
                offset: leb128::read_u32(r)?,
            }),
            OperandKind::I32 => Operands::I32(leb128::read_i32(r)?),
            OperandKind::I64 => Operands::I64(leb128::read_i64(r)?),
            OperandKind::F32 => Operands::F32(r.read_f32_le()?),
            OperandKind::F64 => Operands::F64(r.read_f64_le()?),
            OperandKind::HeapType => Operands::HeapType(leb128::read_i33(r)?),
            OperandKind::Misc => {
                let sub = leb128::read_u32(r)?;
                let op = MiscOpcode::try_from(sub).map_err(|_| Error::UnknownMiscOpcode(sub))?;
                let args = match op.immediate_count() {
                    0 => MiscArgs::None,
                    1 => MiscArgs::One(leb128::read_u32(r)?),
                    _ => MiscArgs::Two(leb128::read_u32(r)?, leb128::read_u32(r)?),
                };
                Operands::Misc { op, args }
            }
        };
        Ok(Self { opcode, operands })
    }
}
