// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Module-level round-trip tests: wire images in, structured edits,
//! re-encoded bytes out.

use reflow::types::*;
use reflow::{Error, Module};

const HEADER: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

// Frames a section payload with its kind and (single-byte) size.
fn section(kind: u8, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() < 0x80);
    let mut bytes = vec![kind, payload.len() as u8];
    bytes.extend_from_slice(payload);
    bytes
}

fn module_bytes(sections: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = HEADER.to_vec();
    for section in sections {
        bytes.extend_from_slice(section);
    }
    bytes
}

#[test]
fn minimal_empty_module() {
    let module = Module::decode(&HEADER).unwrap();
    assert_eq!(module.version, Version::V1);
    assert!(module.sections.is_empty());
    assert_eq!(module.encode().unwrap(), HEADER);
}

#[test]
fn header_errors() {
    assert_eq!(
        Module::decode(&[0x00, 0x61, 0x73, 0x6e, 0x01, 0x00, 0x00, 0x00]),
        Err(Error::InvalidMagic(0x6e73_6100))
    );
    assert_eq!(
        Module::decode(&[0x00, 0x61, 0x73, 0x6d, 0x02, 0x00, 0x00, 0x00]),
        Err(Error::UnsupportedVersion(2))
    );
    assert_eq!(Module::decode(&HEADER[..7]), Err(Error::UnexpectedEnd));
}

#[test]
fn start_section_rewrite() {
    let bytes = module_bytes(&[section(0x08, &[0x03])]);
    let mut module = Module::decode(&bytes).unwrap();
    assert_eq!(
        module.sections,
        vec![Section::Start(StartSection { func: 3 })]
    );

    module.start_mut().unwrap().func = 0;
    assert_eq!(
        module.encode().unwrap(),
        module_bytes(&[section(0x08, &[0x00])])
    );
}

#[test]
fn custom_section_round_trip() {
    let bytes = module_bytes(&[section(
        0x00,
        &[0x04, b'n', b'a', b'm', b'e', 0xaa, 0xbb],
    )]);
    let module = Module::decode(&bytes).unwrap();

    let custom = module.custom_section(b"name").unwrap();
    assert_eq!(custom.name_str(), Some("name"));
    assert_eq!(custom.data, [0xaa, 0xbb]);

    assert_eq!(module.encode().unwrap(), bytes);
}

#[test]
fn unknown_section_preserved_verbatim() {
    let bytes = module_bytes(&[
        section(0x7f, &[0xde, 0xad, 0xbe, 0xef]),
        section(0x08, &[0x01]),
    ]);
    let module = Module::decode(&bytes).unwrap();
    assert_eq!(
        module.sections[0],
        Section::Unknown(UnknownSection {
            kind: 0x7f,
            data: vec![0xde, 0xad, 0xbe, 0xef],
        })
    );
    assert_eq!(module.encode().unwrap(), bytes);
}

#[test]
fn unknown_opcode_in_code_section() {
    // One function body containing the unassigned opcode 0x27.
    let bytes = module_bytes(&[section(0x0a, &[0x01, 0x02, 0x00, 0x27])]);
    assert_eq!(Module::decode(&bytes), Err(Error::UnknownOpcode(0x27)));
}

#[test]
fn section_length_must_match() {
    // Start section declaring two bytes but encoding a one-byte index.
    let bytes = module_bytes(&[section(0x08, &[0x03, 0x00])]);
    assert_eq!(
        Module::decode(&bytes),
        Err(Error::SectionSizeMismatch {
            kind: 0x08,
            declared: 2,
            actual: 1,
        })
    );

    // A section frame running past the end of the input.
    let mut truncated = HEADER.to_vec();
    truncated.extend_from_slice(&[0x08, 0x05, 0x03]);
    assert_eq!(Module::decode(&truncated), Err(Error::UnexpectedEnd));
}

#[test]
fn trailing_garbage_fails() {
    let mut bytes = module_bytes(&[section(0x08, &[0x03])]);
    bytes.push(0x00);
    // The stray byte reads as a section kind with no size behind it.
    assert_eq!(Module::decode(&bytes), Err(Error::UnexpectedEnd));
}

#[test]
fn representative_module_round_trip() {
    let bytes = module_bytes(&[
        // type: (i32, i32) -> i32
        section(0x01, &[0x01, 0x60, 0x02, 0x7f, 0x7f, 0x01, 0x7f]),
        // import: "env"."mem", memory {min 1}
        section(
            0x02,
            &[0x01, 0x03, b'e', b'n', b'v', 0x03, b'm', b'e', b'm', 0x02, 0x00, 0x01],
        ),
        // function: [0]
        section(0x03, &[0x01, 0x00]),
        // table: funcref, min 1 max 8
        section(0x04, &[0x01, 0x70, 0x01, 0x01, 0x08]),
        // memory: min 1
        section(0x05, &[0x01, 0x00, 0x01]),
        // global: const i32 = 42
        section(0x06, &[0x01, 0x7f, 0x00, 0x41, 0x2a, 0x0b]),
        // export: "add" -> func 0
        section(0x07, &[0x01, 0x03, b'a', b'd', b'd', 0x00, 0x00]),
        // start: func 0
        section(0x08, &[0x00]),
        // element flag 0: offset i32.const 0, funcs [0]
        section(0x09, &[0x01, 0x00, 0x41, 0x00, 0x0b, 0x01, 0x00]),
        // datacount: 1
        section(0x0c, &[0x01]),
        // code: local.get 0, local.get 1, i32.add, end
        section(0x0a, &[0x01, 0x07, 0x00, 0x20, 0x00, 0x20, 0x01, 0x6a, 0x0b]),
        // data flag 1: two bytes
        section(0x0b, &[0x01, 0x01, 0x02, 0xca, 0xfe]),
        // tag: attribute 0, type 0
        section(0x0d, &[0x01, 0x00, 0x00]),
        // custom section at the tail
        section(0x00, &[0x01, b'x', 0xff]),
    ]);

    let module = Module::decode(&bytes).unwrap();
    assert_eq!(module.sections.len(), 14);

    // Minimal input implies a byte-identical re-encode.
    let reencoded = module.encode().unwrap();
    assert_eq!(reencoded, bytes);

    // And the value itself survives the trip.
    assert_eq!(Module::decode(&reencoded).unwrap(), module);
}

#[test]
fn element_segment_flags() {
    let expr_null = [0xd0, 0x70, 0x0b];
    let payloads: [Vec<u8>; 8] = [
        // 0: offset expr, funcs
        vec![0x00, 0x41, 0x01, 0x0b, 0x02, 0x00, 0x01],
        // 1: reftype, exprs
        [&[0x01, 0x70, 0x01][..], &expr_null].concat(),
        // 2: table, offset expr, reftype, exprs
        [&[0x02, 0x02, 0x41, 0x00, 0x0b, 0x70, 0x01][..], &expr_null].concat(),
        // 3: reftype, exprs
        [&[0x03, 0x6f, 0x01][..], &expr_null].concat(),
        // 4: offset expr, funcs
        vec![0x04, 0x41, 0x01, 0x0b, 0x02, 0x00, 0x01],
        // 5: reftype, funcs
        vec![0x05, 0x70, 0x01, 0x07],
        // 6: table, offset expr, reftype, funcs
        vec![0x06, 0x01, 0x41, 0x00, 0x0b, 0x70, 0x01, 0x07],
        // 7: reftype, funcs
        vec![0x07, 0x6f, 0x01, 0x07],
    ];

    for (flag, payload) in payloads.iter().enumerate() {
        let mut body = vec![0x01];
        body.extend_from_slice(payload);
        let bytes = module_bytes(&[section(0x09, &body)]);
        let module = Module::decode(&bytes).unwrap();
        let Section::Element(elements) = &module.sections[0] else {
            panic!("expected an element section for flag {flag}");
        };
        assert_eq!(elements.0.len(), 1);
        assert_eq!(elements.0[0].flag(), flag as u32, "flag preserved");
        assert_eq!(module.encode().unwrap(), bytes, "flag {flag} bytes");
    }

    // Flags 0 and 4 carry identical payloads but stay distinct.
    let zero = Module::decode(&module_bytes(&[section(
        0x09,
        &[0x01, 0x00, 0x41, 0x01, 0x0b, 0x01, 0x00],
    )]))
    .unwrap();
    let four = Module::decode(&module_bytes(&[section(
        0x09,
        &[0x01, 0x04, 0x41, 0x01, 0x0b, 0x01, 0x00],
    )]))
    .unwrap();
    assert_ne!(zero, four);

    // Out-of-range flag.
    let bytes = module_bytes(&[section(0x09, &[0x01, 0x08])]);
    assert_eq!(Module::decode(&bytes), Err(Error::UnknownElementFlag(8)));
}

#[test]
fn data_segment_flags() {
    let payloads: [Vec<u8>; 3] = [
        vec![0x00, 0x41, 0x10, 0x0b, 0x02, 0xaa, 0xbb],
        vec![0x01, 0x02, 0xaa, 0xbb],
        vec![0x02, 0x01, 0x41, 0x00, 0x0b, 0x01, 0xcc],
    ];

    for (flag, payload) in payloads.iter().enumerate() {
        let mut body = vec![0x01];
        body.extend_from_slice(payload);
        let bytes = module_bytes(&[section(0x0b, &body)]);
        let module = Module::decode(&bytes).unwrap();
        let Section::Data(data) = &module.sections[0] else {
            panic!("expected a data section for flag {flag}");
        };
        assert_eq!(data.0[0].flag(), flag as u32);
        assert_eq!(module.encode().unwrap(), bytes, "flag {flag} bytes");
    }

    let bytes = module_bytes(&[section(0x0b, &[0x01, 0x03])]);
    assert_eq!(Module::decode(&bytes), Err(Error::UnknownDataFlag(3)));
}

#[test]
fn type_section_shapes() {
    let bytes = module_bytes(&[section(
        0x01,
        &[
            0x03, // three definitions
            0x60, 0x01, 0x7f, 0x00, // func (i32) -> ()
            0x4e, 0x01, 0x00, 0x5e, 0x01, 0x7f, 0x01, // sub [0] struct {mut i32}
            0x4d, 0x00, 0x5f, 0x7e, 0x00, // sub-final [] array i64 const
        ],
    )]);
    let module = Module::decode(&bytes).unwrap();
    let Section::Type(types) = &module.sections[0] else {
        panic!("expected a type section");
    };
    assert_eq!(types.0.len(), 3);
    assert_eq!(types.0[0], TypeDef::func(vec![0x7f], vec![]));
    assert_eq!(types.0[1].prefix, TypeDef::SUB);
    assert_eq!(types.0[1].subtypes, [0]);
    assert_eq!(
        types.0[1].body,
        TypeBody::Struct(StructType {
            fields: vec![FieldType {
                valtype: 0x7f,
                mutable: 0x01,
            }],
        })
    );
    assert_eq!(types.0[2].prefix, TypeDef::SUB_FINAL);
    assert!(types.0[2].subtypes.is_empty());

    assert_eq!(module.encode().unwrap(), bytes);

    // An unrecognized prefix still reads a kind byte and body.
    let odd = module_bytes(&[section(0x01, &[0x01, 0x50, 0x5f, 0x7f, 0x00])]);
    let module = Module::decode(&odd).unwrap();
    let Section::Type(types) = &module.sections[0] else {
        panic!("expected a type section");
    };
    assert_eq!(types.0[0].prefix, 0x50);
    assert_eq!(module.encode().unwrap(), odd);

    // A bad kind byte fails.
    let bad = module_bytes(&[section(0x01, &[0x01, 0x50, 0x10])]);
    assert_eq!(Module::decode(&bad), Err(Error::UnknownTypeKind(0x10)));
}

#[test]
fn import_kinds() {
    let bytes = module_bytes(&[section(
        0x02,
        &[
            0x04, // four imports, all from "m" with one-byte names
            0x01, b'm', 0x01, b'f', 0x00, 0x02, // func type 2
            0x01, b'm', 0x01, b't', 0x01, 0x70, 0x00, 0x01, // table funcref min 1
            0x01, b'm', 0x01, b'g', 0x03, 0x7f, 0x01, // global mut i32
            0x01, b'm', 0x01, b'M', 0x02, 0x01, 0x01, 0x02, // memory 1..2
        ],
    )]);
    let module = Module::decode(&bytes).unwrap();
    let Section::Import(imports) = &module.sections[0] else {
        panic!("expected an import section");
    };
    assert_eq!(imports.0[0].desc, ImportDesc::Func(2));
    assert_eq!(
        imports.0[1].desc,
        ImportDesc::Table(TableType {
            reftype: 0x70,
            limits: Limits::at_least(1),
        })
    );
    assert_eq!(
        imports.0[2].desc,
        ImportDesc::Global(GlobalType {
            valtype: 0x7f,
            mutable: 0x01,
        })
    );
    assert_eq!(imports.0[3].desc, ImportDesc::Memory(Limits::bounded(1, 2)));
    assert_eq!(module.encode().unwrap(), bytes);

    let bad = module_bytes(&[section(0x02, &[0x01, 0x00, 0x00, 0x04])]);
    assert_eq!(Module::decode(&bad), Err(Error::UnknownImportKind(0x04)));
}

#[test]
fn non_minimal_lengths_reencode_minimally() {
    // The start section's size and index both encoded non-minimally.
    let mut bytes = HEADER.to_vec();
    bytes.extend_from_slice(&[0x08, 0x83, 0x80, 0x00, 0x83, 0x80, 0x00]);
    let module = Module::decode(&bytes).unwrap();
    assert_eq!(
        module.sections,
        vec![Section::Start(StartSection { func: 3 })]
    );

    // Value-level equality survives; the bytes shrink to minimal form.
    let reencoded = module.encode().unwrap();
    assert_eq!(reencoded, module_bytes(&[section(0x08, &[0x03])]));
    assert_eq!(Module::decode(&reencoded).unwrap(), module);
}

#[test]
fn mutation_then_round_trip() {
    let bytes = module_bytes(&[
        section(0x06, &[0x01, 0x7f, 0x00, 0x41, 0x2a, 0x0b]),
        section(0x07, &[0x01, 0x01, b'g', 0x03, 0x00]),
        section(0x00, &[0x03, b'o', b'l', b'd']),
    ]);
    let mut module = Module::decode(&bytes).unwrap();

    // Rewrite the global initializer, the export name, and the custom
    // section wholesale.
    let Section::Global(globals) = &mut module.sections[0] else {
        panic!("expected a global section");
    };
    globals.0[0].init = ConstExpr::terminated(vec![Instruction::i32_const(-7)]);
    let Section::Export(exports) = &mut module.sections[1] else {
        panic!("expected an export section");
    };
    exports.0[0].name = b"renamed".to_vec();
    exports.0[0].index = 9;
    let Section::Custom(custom) = &mut module.sections[2] else {
        panic!("expected a custom section");
    };
    custom.name = b"new".to_vec();
    custom.data = vec![0x01, 0x02, 0x03];

    // The encoder depends only on the mutated structure.
    let reencoded = module.encode().unwrap();
    assert_eq!(Module::decode(&reencoded).unwrap(), module);
    assert_eq!(
        reencoded,
        module_bytes(&[
            section(0x06, &[0x01, 0x7f, 0x00, 0x41, 0x79, 0x0b]),
            section(
                0x07,
                &[0x01, 0x07, b'r', b'e', b'n', b'a', b'm', b'e', b'd', 0x03, 0x09],
            ),
            section(0x00, &[0x03, b'n', b'e', b'w', 0x01, 0x02, 0x03]),
        ])
    );
}

#[test]
fn constructed_module_round_trip() {
    let mut module = Module::new();
    module.sections.push(Section::Type(TypeSection(vec![
        TypeDef::func(vec![0x7f], vec![0x7f]),
    ])));
    module
        .sections
        .push(Section::Function(FunctionSection(vec![0])));
    module.sections.push(Section::Code(CodeSection(vec![
        FuncBody {
            locals: vec![LocalGroup {
                count: 1,
                valtype: 0x7e,
            }],
            code: vec![
                Instruction::new(Opcode::LocalGet, Operands::Index(0)),
                Instruction::end(),
            ],
        },
    ])));
    module.sections.push(Section::Data(DataSection(vec![
        DataSegment::ActiveWithMemory {
            memory: 1,
            offset: ConstExpr::terminated(vec![Instruction::i32_const(64)]),
            data: vec![0xde, 0xad],
        },
    ])));

    let bytes = module.encode().unwrap();
    assert_eq!(Module::decode(&bytes).unwrap(), module);
}

#[test]
fn nan_payloads_round_trip_bytewise() {
    // f64.const with a non-canonical NaN payload; bit patterns must pass
    // through both directions untouched.
    let nan_bits: u64 = 0x7ff4_0000_dead_beef;
    let mut payload = vec![0x01, 0x7c, 0x00, 0x44];
    payload.extend_from_slice(&nan_bits.to_le_bytes());
    payload.push(0x0b);
    let bytes = module_bytes(&[section(0x06, &payload)]);

    let module = Module::decode(&bytes).unwrap();
    assert_eq!(module.encode().unwrap(), bytes);
}
