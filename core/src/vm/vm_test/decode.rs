use super::*;

use crate::vm::{Decoder, Fault, Operand, decode_at};

#[test]
fn test_opcode_table_is_consistent() {
    for &op in Opcode::ALL {
        assert_eq!(Opcode::from_byte(op as u8), Some(op));
        assert_eq!(Opcode::from_mnemonic(op.mnemonic()), Some(op));
        assert_eq!(op.size(), 1 + op.class().width());
    }
    assert_eq!(Opcode::ALL.len(), 44);
    assert_eq!(Opcode::from_byte(0x00), None);
    assert_eq!(Opcode::from_byte(0x17), None);
    assert_eq!(Opcode::from_mnemonic("PRINT_ITEM"), None);
}

#[test]
fn test_decode_operand_classes() {
    let code = [
        Opcode::PopTop as u8,
        Opcode::CallFunction as u8,
        2,
        Opcode::LoadConst as u8,
        0x34,
        0x12,
        Opcode::JumpAbsolute as u8,
        0,
        0,
    ];
    let instrs: Vec<_> = Decoder::new(&code).collect::<Result<_, _>>().unwrap();
    assert_eq!(instrs.len(), 4);
    assert_eq!(instrs[0].operand, Operand::None);
    assert_eq!(instrs[1].operand, Operand::Index(2));
    assert_eq!(instrs[2].operand, Operand::Index(0x1234));
    assert_eq!(instrs[2].next, 6);
    assert_eq!(instrs[3].target(), Some(0));
}

#[test]
fn test_decode_relative_jump_resolves_from_next() {
    let code = [Opcode::JumpForward as u8, 5, 0];
    let instr = decode_at(&code, 0).unwrap().unwrap();
    assert_eq!(instr.next, 3);
    assert_eq!(instr.target(), Some(8));
    assert_eq!(instr.to_string(), "    0 JUMP_FORWARD -> 8");
}

#[test]
fn test_decode_end_of_stream_and_errors() {
    assert!(decode_at(&[], 0).unwrap().is_none());
    assert!(matches!(decode_at(&[0xEE], 0), Err(Fault::UnsupportedOpcode(0xEE))));
    assert!(matches!(
        decode_at(&[Opcode::LoadName as u8, 1], 0),
        Err(Fault::MalformedCode(_))
    ));
}

#[test]
fn test_decoder_stops_after_first_error() {
    let code = [Opcode::Nop as u8, 0xEE, Opcode::Nop as u8];
    let items: Vec<_> = Decoder::new(&code).collect();
    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert!(items[1].is_err());
}
