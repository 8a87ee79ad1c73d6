//! Opcode table and decoded instruction representation.

use std::fmt;

/// How many bytes follow an opcode byte and how they are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandClass {
    /// Bare opcode.
    None,
    /// One unsigned byte.
    Byte,
    /// Two bytes, little-endian table index or count.
    Wide,
    /// Two bytes, little-endian absolute jump target.
    Absolute,
    /// Two bytes, little-endian delta from the next instruction.
    Relative,
}

impl OperandClass {
    pub const fn width(self) -> usize {
        match self {
            OperandClass::None => 0,
            OperandClass::Byte => 1,
            OperandClass::Wide | OperandClass::Absolute | OperandClass::Relative => 2,
        }
    }

    pub const fn is_jump(self) -> bool {
        matches!(self, OperandClass::Absolute | OperandClass::Relative)
    }
}

macro_rules! define_opcodes {
    ($($variant:ident = $byte:literal, $class:ident, $mnemonic:literal;)*) => {
        /// Closed set of instructions understood by the VM.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($variant = $byte,)*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant,)*];

            pub fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($byte => Some(Opcode::$variant),)*
                    _ => None,
                }
            }

            pub fn from_mnemonic(name: &str) -> Option<Self> {
                match name {
                    $($mnemonic => Some(Opcode::$variant),)*
                    _ => None,
                }
            }

            pub const fn class(self) -> OperandClass {
                match self {
                    $(Opcode::$variant => OperandClass::$class,)*
                }
            }

            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $mnemonic,)*
                }
            }
        }
    };
}

define_opcodes! {
    PopTop = 0x01, None, "POP_TOP";
    RotTwo = 0x02, None, "ROT_TWO";
    RotThree = 0x03, None, "ROT_THREE";
    DupTop = 0x04, None, "DUP_TOP";
    Nop = 0x09, None, "NOP";
    UnaryNegative = 0x0A, None, "UNARY_NEGATIVE";
    UnaryNot = 0x0B, None, "UNARY_NOT";
    BinaryAdd = 0x10, None, "BINARY_ADD";
    BinarySubtract = 0x11, None, "BINARY_SUBTRACT";
    BinaryMultiply = 0x12, None, "BINARY_MULTIPLY";
    BinaryTrueDivide = 0x13, None, "BINARY_TRUE_DIVIDE";
    BinaryFloorDivide = 0x14, None, "BINARY_FLOOR_DIVIDE";
    BinaryModulo = 0x15, None, "BINARY_MODULO";
    BinarySubscr = 0x16, None, "BINARY_SUBSCR";
    InplaceAdd = 0x18, None, "INPLACE_ADD";
    InplaceSubtract = 0x19, None, "INPLACE_SUBTRACT";
    InplaceMultiply = 0x1A, None, "INPLACE_MULTIPLY";
    GetIter = 0x20, None, "GET_ITER";
    BreakLoop = 0x21, None, "BREAK_LOOP";
    ReturnValue = 0x22, None, "RETURN_VALUE";
    PopBlock = 0x23, None, "POP_BLOCK";
    EndFinally = 0x24, None, "END_FINALLY";
    MakeFunction = 0x25, None, "MAKE_FUNCTION";
    CompareOp = 0x40, Byte, "COMPARE_OP";
    CallFunction = 0x41, Byte, "CALL_FUNCTION";
    RaiseVarargs = 0x42, Byte, "RAISE_VARARGS";
    LoadConst = 0x60, Wide, "LOAD_CONST";
    LoadName = 0x61, Wide, "LOAD_NAME";
    StoreName = 0x62, Wide, "STORE_NAME";
    DeleteName = 0x63, Wide, "DELETE_NAME";
    LoadFast = 0x64, Wide, "LOAD_FAST";
    StoreFast = 0x65, Wide, "STORE_FAST";
    LoadGlobal = 0x66, Wide, "LOAD_GLOBAL";
    StoreGlobal = 0x67, Wide, "STORE_GLOBAL";
    LoadDeref = 0x68, Wide, "LOAD_DEREF";
    BuildList = 0x69, Wide, "BUILD_LIST";
    BuildTuple = 0x6A, Wide, "BUILD_TUPLE";
    JumpAbsolute = 0x70, Absolute, "JUMP_ABSOLUTE";
    PopJumpIfFalse = 0x71, Absolute, "POP_JUMP_IF_FALSE";
    JumpForward = 0x78, Relative, "JUMP_FORWARD";
    ForIter = 0x79, Relative, "FOR_ITER";
    SetupLoop = 0x7A, Relative, "SETUP_LOOP";
    SetupExcept = 0x7B, Relative, "SETUP_EXCEPT";
    SetupFinally = 0x7C, Relative, "SETUP_FINALLY";
}

impl Opcode {
    /// Encoded size of this instruction in bytes.
    pub const fn size(self) -> usize {
        1 + self.class().width()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Decoded operand. Jump operands are always absolute after decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    Index(u16),
    Target(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: Opcode,
    pub operand: Operand,
    pub next: usize,
}

impl Instruction {
    /// Table index, count or byte argument; `0` for operand-less opcodes.
    #[inline]
    pub fn arg(&self) -> usize {
        match self.operand {
            Operand::Index(i) => i as usize,
            _ => 0,
        }
    }

    #[inline]
    pub fn target(&self) -> Option<usize> {
        match self.operand {
            Operand::Target(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Operand::None => write!(f, "{:>5} {}", self.offset, self.opcode),
            Operand::Index(i) => write!(f, "{:>5} {} {}", self.offset, self.opcode, i),
            Operand::Target(t) => write!(f, "{:>5} {} -> {}", self.offset, self.opcode, t),
        }
    }
}
