use crate::error::EmuError;
use crate::memory::TypeAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInstruction {
    code: u16,
}

impl RawInstruction {
    pub fn new(code: u16) -> Self {
        RawInstruction { code }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    // n is starting digit, m is length
    pub fn nth_m_digits(&self, n: u8, m: u8) -> u16 {
        // 0110 1100 1111 0001
        // -------------------
        // 1111 1111 1111 1111
        //      1111 1111 1111
        //           1111 1111
        //                1111
        //
        // 4 - (m) - (n - 1), n = 2
        let shift_places = (4 - m - (n - 1)) * 4;
        let mask = ((1u32 << (m * 4)) - 1) as u16;
        (self.code >> shift_places) & mask
    }

    pub fn identifier(&self) -> u8 {
        self.nth_m_digits(1, 1) as u8
    }

    /// `_X__`
    pub fn x(&self) -> u8 {
        self.nth_m_digits(2, 1) as u8
    }

    /// `__Y_`
    pub fn y(&self) -> u8 {
        self.nth_m_digits(3, 1) as u8
    }

    /// `___N`
    pub fn n(&self) -> u8 {
        self.nth_m_digits(4, 1) as u8
    }

    /// `__NN`
    pub fn kk(&self) -> u8 {
        self.nth_m_digits(3, 2) as u8
    }

    /// `_NNN`
    pub fn addr(&self) -> TypeAddr {
        self.nth_m_digits(2, 3)
    }
}

impl PartialEq<u16> for RawInstruction {
    fn eq(&self, ins: &u16) -> bool {
        ins.eq(&self.code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCodes {
    // 00E0
    // turn all pixels to 0
    ClearScreen,
    // 00EE
    PopSubroutine,
    // 0NNN
    // machine code routine on the original hardware, ignored here
    MachineRoutine(TypeAddr),
    // 1NNN
    // set PC to address NNN, "jump" to memory location
    Jump(TypeAddr),
    // 2NNN
    PushSubroutine(TypeAddr),

    // 3XNN
    SkipEqualConstant(u8, u8),
    // 4XNN
    SkipNotEqualConstant(u8, u8),
    // 5XY0
    SkipEqualRegister(u8, u8),
    // 9XY0
    SkipNotEqualRegister(u8, u8),

    // 6XNN
    // set register VX to value NN
    SetRegister(u8, u8),
    // 7XNN
    // add value NN to VX, no carry
    AddToRegister(u8, u8),

    // 8XY0
    CopyRegister(u8, u8),
    // 8XY1
    Or(u8, u8),
    // 8XY2
    And(u8, u8),
    // 8XY3
    XOr(u8, u8),
    // 8XY4
    Add(u8, u8),
    // 8XY5
    SubtractForward(u8, u8),
    // 8XY6
    RightShift(u8, u8),
    // 8XY7
    SubtractBackward(u8, u8),
    // 8XYE
    LeftShift(u8, u8),

    // ANNN
    // set index register I to address NNN
    SetIndexRegister(TypeAddr),
    // BNNN
    JumpWithOffset(TypeAddr),
    // CXNN
    Random(u8, u8),
    // DXYN
    // draw an N pixel tall sprite starting at I
    // at Coordinates (VX, VY)
    // XOR pixels on screen using sprite data
    // if pixels on screen were switched OFF: VF set to 1
    Draw(u8, u8, u8),

    // EX9E
    SkipIfPressed(u8),
    // EXA1
    SkipIfNotPressed(u8),

    // FX07
    CopyDelayToRegister(u8),
    // FX0A
    GetKey(u8),
    // FX15
    CopyRegisterToDelay(u8),
    // FX18
    CopyRegisterToSound(u8),
    // FX1E
    AddToIndex(u8),
    // FX29
    PointChar(u8),
    // FX33
    ToDecimal(u8),
    // FX55
    StoreRegisterToMemory(u8),
    // FX65
    LoadRegisterFromMemory(u8),
}

impl OpCodes {
    /// Nibble dispatch: switch on the top four bits, then on whichever low
    /// field tells apart the opcodes sharing that nibble.
    pub fn decode_raw(ins: u16) -> Result<Self, EmuError> {
        let raw = RawInstruction::new(ins);
        let (x, y) = (raw.x(), raw.y());

        let op = match raw.identifier() {
            0x0 => match ins {
                0x00E0 => Self::ClearScreen,
                0x00EE => Self::PopSubroutine,
                _ => Self::MachineRoutine(raw.addr()),
            },
            0x1 => Self::Jump(raw.addr()),
            0x2 => Self::PushSubroutine(raw.addr()),
            0x3 => Self::SkipEqualConstant(x, raw.kk()),
            0x4 => Self::SkipNotEqualConstant(x, raw.kk()),
            0x5 if raw.n() == 0x0 => Self::SkipEqualRegister(x, y),
            0x6 => Self::SetRegister(x, raw.kk()),
            0x7 => Self::AddToRegister(x, raw.kk()),
            0x8 => match raw.n() {
                0x0 => Self::CopyRegister(x, y),
                0x1 => Self::Or(x, y),
                0x2 => Self::And(x, y),
                0x3 => Self::XOr(x, y),
                0x4 => Self::Add(x, y),
                0x5 => Self::SubtractForward(x, y),
                0x6 => Self::RightShift(x, y),
                0x7 => Self::SubtractBackward(x, y),
                0xE => Self::LeftShift(x, y),
                _ => return Err(EmuError::UnknownOpcode { opcode: ins }),
            },
            0x9 if raw.n() == 0x0 => Self::SkipNotEqualRegister(x, y),
            0xA => Self::SetIndexRegister(raw.addr()),
            0xB => Self::JumpWithOffset(raw.addr()),
            0xC => Self::Random(x, raw.kk()),
            0xD => Self::Draw(x, y, raw.n()),
            0xE => match raw.kk() {
                0x9E => Self::SkipIfPressed(x),
                0xA1 => Self::SkipIfNotPressed(x),
                _ => return Err(EmuError::UnknownOpcode { opcode: ins }),
            },
            0xF => match raw.kk() {
                0x07 => Self::CopyDelayToRegister(x),
                0x0A => Self::GetKey(x),
                0x15 => Self::CopyRegisterToDelay(x),
                0x18 => Self::CopyRegisterToSound(x),
                0x1E => Self::AddToIndex(x),
                0x29 => Self::PointChar(x),
                0x33 => Self::ToDecimal(x),
                0x55 => Self::StoreRegisterToMemory(x),
                0x65 => Self::LoadRegisterFromMemory(x),
                _ => return Err(EmuError::UnknownOpcode { opcode: ins }),
            },
            _ => return Err(EmuError::UnknownOpcode { opcode: ins }),
        };
        Ok(op)
    }

    /// Table scan: the first entry whose masked bits match wins.
    pub fn decode_table(ins: u16) -> Result<Self, EmuError> {
        let raw = RawInstruction::new(ins);
        OPCODE_TABLE
            .iter()
            .find(|pattern| ins & pattern.mask == pattern.bits)
            .map(|pattern| (pattern.build)(raw))
            .ok_or(EmuError::UnknownOpcode { opcode: ins })
    }
}

pub struct OpcodePattern {
    pub bits: u16,
    pub mask: u16,
    build: fn(RawInstruction) -> OpCodes,
}

/// Ordered most specific mask first: `00E0`/`00EE` must be tried before the
/// `0NNN` catch-all.
pub const OPCODE_TABLE: [OpcodePattern; 35] = [
    OpcodePattern { bits: 0x00E0, mask: 0xFFFF, build: |_| OpCodes::ClearScreen },
    OpcodePattern { bits: 0x00EE, mask: 0xFFFF, build: |_| OpCodes::PopSubroutine },
    OpcodePattern { bits: 0x0000, mask: 0xF000, build: |r| OpCodes::MachineRoutine(r.addr()) },
    OpcodePattern { bits: 0x1000, mask: 0xF000, build: |r| OpCodes::Jump(r.addr()) },
    OpcodePattern { bits: 0x2000, mask: 0xF000, build: |r| OpCodes::PushSubroutine(r.addr()) },
    OpcodePattern { bits: 0x3000, mask: 0xF000, build: |r| OpCodes::SkipEqualConstant(r.x(), r.kk()) },
    OpcodePattern { bits: 0x4000, mask: 0xF000, build: |r| OpCodes::SkipNotEqualConstant(r.x(), r.kk()) },
    OpcodePattern { bits: 0x5000, mask: 0xF00F, build: |r| OpCodes::SkipEqualRegister(r.x(), r.y()) },
    OpcodePattern { bits: 0x6000, mask: 0xF000, build: |r| OpCodes::SetRegister(r.x(), r.kk()) },
    OpcodePattern { bits: 0x7000, mask: 0xF000, build: |r| OpCodes::AddToRegister(r.x(), r.kk()) },
    OpcodePattern { bits: 0x8000, mask: 0xF00F, build: |r| OpCodes::CopyRegister(r.x(), r.y()) },
    OpcodePattern { bits: 0x8001, mask: 0xF00F, build: |r| OpCodes::Or(r.x(), r.y()) },
    OpcodePattern { bits: 0x8002, mask: 0xF00F, build: |r| OpCodes::And(r.x(), r.y()) },
    OpcodePattern { bits: 0x8003, mask: 0xF00F, build: |r| OpCodes::XOr(r.x(), r.y()) },
    OpcodePattern { bits: 0x8004, mask: 0xF00F, build: |r| OpCodes::Add(r.x(), r.y()) },
    OpcodePattern { bits: 0x8005, mask: 0xF00F, build: |r| OpCodes::SubtractForward(r.x(), r.y()) },
    OpcodePattern { bits: 0x8006, mask: 0xF00F, build: |r| OpCodes::RightShift(r.x(), r.y()) },
    OpcodePattern { bits: 0x8007, mask: 0xF00F, build: |r| OpCodes::SubtractBackward(r.x(), r.y()) },
    OpcodePattern { bits: 0x800E, mask: 0xF00F, build: |r| OpCodes::LeftShift(r.x(), r.y()) },
    OpcodePattern { bits: 0x9000, mask: 0xF00F, build: |r| OpCodes::SkipNotEqualRegister(r.x(), r.y()) },
    OpcodePattern { bits: 0xA000, mask: 0xF000, build: |r| OpCodes::SetIndexRegister(r.addr()) },
    OpcodePattern { bits: 0xB000, mask: 0xF000, build: |r| OpCodes::JumpWithOffset(r.addr()) },
    OpcodePattern { bits: 0xC000, mask: 0xF000, build: |r| OpCodes::Random(r.x(), r.kk()) },
    OpcodePattern { bits: 0xD000, mask: 0xF000, build: |r| OpCodes::Draw(r.x(), r.y(), r.n()) },
    OpcodePattern { bits: 0xE09E, mask: 0xF0FF, build: |r| OpCodes::SkipIfPressed(r.x()) },
    OpcodePattern { bits: 0xE0A1, mask: 0xF0FF, build: |r| OpCodes::SkipIfNotPressed(r.x()) },
    OpcodePattern { bits: 0xF007, mask: 0xF0FF, build: |r| OpCodes::CopyDelayToRegister(r.x()) },
    OpcodePattern { bits: 0xF00A, mask: 0xF0FF, build: |r| OpCodes::GetKey(r.x()) },
    OpcodePattern { bits: 0xF015, mask: 0xF0FF, build: |r| OpCodes::CopyRegisterToDelay(r.x()) },
    OpcodePattern { bits: 0xF018, mask: 0xF0FF, build: |r| OpCodes::CopyRegisterToSound(r.x()) },
    OpcodePattern { bits: 0xF01E, mask: 0xF0FF, build: |r| OpCodes::AddToIndex(r.x()) },
    OpcodePattern { bits: 0xF029, mask: 0xF0FF, build: |r| OpCodes::PointChar(r.x()) },
    OpcodePattern { bits: 0xF033, mask: 0xF0FF, build: |r| OpCodes::ToDecimal(r.x()) },
    OpcodePattern { bits: 0xF055, mask: 0xF0FF, build: |r| OpCodes::StoreRegisterToMemory(r.x()) },
    OpcodePattern { bits: 0xF065, mask: 0xF0FF, build: |r| OpCodes::LoadRegisterFromMemory(r.x()) },
];

/// Which of the two equivalent decoders the run loop uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// Scan `OPCODE_TABLE` in order.
    Table,
    /// Match on the top nibble, then on the low fields.
    #[default]
    Nibble,
}

impl DecodeStrategy {
    pub fn decode(self, ins: u16) -> Result<OpCodes, EmuError> {
        match self {
            Self::Table => OpCodes::decode_table(ins),
            Self::Nibble => OpCodes::decode_raw(ins),
        }
    }
}
