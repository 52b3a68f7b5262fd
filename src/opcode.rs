use std::fmt;

/// Every instruction the LS-8 understands.
///
/// The opcode byte is laid out as `AABCDDDD`:
///
/// | Bits | Meaning                                   |
/// |------|-------------------------------------------|
/// | `AA` | number of operands that follow (0 to 2)   |
/// | `B`  | set if the ALU performs the operation     |
/// | `C`  | set if the instruction may assign `pc`    |
/// | `DDDD` | instruction identifier                  |
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
  /// | Operation | Semantics/RTL      | Assembly |
  /// |-----------|--------------------|----------|
  /// | No-op     | `(do nothing)`     | `NOP`    |
  Nop = 0b0000_0000,

  /// | Operation | Semantics/RTL      | Assembly |
  /// |-----------|--------------------|----------|
  /// | Halt      | `(stop execution)` | `HLT`    |
  Hlt = 0b0000_0001,

  /// Returns from a subroutine by popping the return address.
  ///
  /// | Operation | Semantics/RTL                 | Assembly |
  /// |-----------|-------------------------------|----------|
  /// | Return    | `pc ← m[sp]`, `sp ← sp + 1`   | `RET`    |
  Ret = 0b0001_0001,

  /// | Operation | Semantics/RTL                 | Assembly |
  /// |-----------|-------------------------------|----------|
  /// | Push      | `sp ← sp − 1`, `m[sp] ← r[a]` | `PUSH ra` |
  Push = 0b0100_0101,

  /// | Operation | Semantics/RTL                 | Assembly |
  /// |-----------|-------------------------------|----------|
  /// | Pop       | `r[a] ← m[sp]`, `sp ← sp + 1` | `POP ra` |
  Pop = 0b0100_0110,

  /// Prints the register as a decimal number.
  ///
  /// | Operation     | Semantics/RTL    | Assembly |
  /// |---------------|------------------|----------|
  /// | Print Numeric | `out ← dec r[a]` | `PRN ra` |
  Prn = 0b0100_0111,

  /// Prints the register as an ASCII character.
  ///
  /// | Operation   | Semantics/RTL      | Assembly |
  /// |-------------|--------------------|----------|
  /// | Print Alpha | `out ← ascii r[a]` | `PRA ra` |
  Pra = 0b0100_1000,

  /// Calls a subroutine at the address held in a register.
  ///
  /// | Operation | Semantics/RTL                                   | Assembly  |
  /// |-----------|-------------------------------------------------|-----------|
  /// | Call      | `sp ← sp − 1`, `m[sp] ← pc + 2`, `pc ← r[a]`    | `CALL ra` |
  Call = 0b0101_0000,

  /// Jumps to the address given directly as the operand.
  ///
  /// | Operation | Semantics/RTL | Assembly   |
  /// |-----------|---------------|------------|
  /// | Jump      | `pc ← a`      | `JMP addr` |
  Jmp = 0b0101_0100,

  /// | Operation    | Semantics/RTL       | Assembly |
  /// |--------------|---------------------|----------|
  /// | Jump Equal   | `if E : pc ← r[a]`  | `JEQ ra` |
  Jeq = 0b0101_0101,

  /// | Operation     | Semantics/RTL       | Assembly |
  /// |---------------|---------------------|----------|
  /// | Jump Not Equal| `if !E : pc ← r[a]` | `JNE ra` |
  Jne = 0b0101_0110,

  /// | Operation    | Semantics/RTL       | Assembly |
  /// |--------------|---------------------|----------|
  /// | Jump Greater | `if G : pc ← r[a]`  | `JGT ra` |
  Jgt = 0b0101_0111,

  /// | Operation | Semantics/RTL       | Assembly |
  /// |-----------|---------------------|----------|
  /// | Jump Less | `if L : pc ← r[a]`  | `JLT ra` |
  Jlt = 0b0101_1000,

  /// | Operation          | Semantics/RTL          | Assembly |
  /// |--------------------|------------------------|----------|
  /// | Jump Less or Equal | `if L ∨ E : pc ← r[a]` | `JLE ra` |
  Jle = 0b0101_1001,

  /// | Operation             | Semantics/RTL          | Assembly |
  /// |-----------------------|------------------------|----------|
  /// | Jump Greater or Equal | `if G ∨ E : pc ← r[a]` | `JGE ra` |
  Jge = 0b0101_1010,

  /// | Operation | Semantics/RTL       | Assembly |
  /// |-----------|---------------------|----------|
  /// | Increment | `r[a] ← r[a] + 1`   | `INC ra` |
  Inc = 0b0110_0101,

  /// | Operation | Semantics/RTL       | Assembly |
  /// |-----------|---------------------|----------|
  /// | Decrement | `r[a] ← r[a] − 1`   | `DEC ra` |
  Dec = 0b0110_0110,

  /// | Operation   | Semantics/RTL  | Assembly |
  /// |-------------|----------------|----------|
  /// | Logical NOT | `r[a] ← ~r[a]` | `NOT ra` |
  Not = 0b0110_1001,

  /// Loads an immediate value into a register.
  ///
  /// | Operation      | Semantics/RTL | Assembly      |
  /// |----------------|---------------|---------------|
  /// | Load Immediate | `r[a] ← b`    | `LDI ra, imm` |
  Ldi = 0b1000_0010,

  /// | Operation | Semantics/RTL     | Assembly     |
  /// |-----------|-------------------|--------------|
  /// | Load      | `r[a] ← m[r[b]]`  | `LD ra, rb`  |
  Ld = 0b1000_0011,

  /// | Operation | Semantics/RTL     | Assembly     |
  /// |-----------|-------------------|--------------|
  /// | Store     | `m[r[a]] ← r[b]`  | `ST ra, rb`  |
  St = 0b1000_0100,

  /// | Operation | Semantics/RTL          | Assembly     |
  /// |-----------|------------------------|--------------|
  /// | Add       | `r[a] ← r[a] + r[b]`   | `ADD ra, rb` |
  Add = 0b1010_0000,

  /// | Operation | Semantics/RTL          | Assembly     |
  /// |-----------|------------------------|--------------|
  /// | Subtract  | `r[a] ← r[a] − r[b]`   | `SUB ra, rb` |
  Sub = 0b1010_0001,

  /// | Operation | Semantics/RTL          | Assembly     |
  /// |-----------|------------------------|--------------|
  /// | Multiply  | `r[a] ← r[a] × r[b]`   | `MUL ra, rb` |
  Mul = 0b1010_0010,

  /// | Operation | Semantics/RTL          | Assembly     |
  /// |-----------|------------------------|--------------|
  /// | Divide    | `r[a] ← r[a] ÷ r[b]`   | `DIV ra, rb` |
  Div = 0b1010_0011,

  /// | Operation | Semantics/RTL            | Assembly     |
  /// |-----------|--------------------------|--------------|
  /// | Modulo    | `r[a] ← r[a] mod r[b]`   | `MOD ra, rb` |
  Mod = 0b1010_0100,

  /// Sets exactly one of the `E`, `L` or `G` flags.
  ///
  /// | Operation | Semantics/RTL          | Assembly     |
  /// |-----------|------------------------|--------------|
  /// | Compare   | `FL ← cmp(r[a], r[b])` | `CMP ra, rb` |
  Cmp = 0b1010_0111,

  /// | Operation   | Semantics/RTL        | Assembly     |
  /// |-------------|----------------------|--------------|
  /// | Logical AND | `r[a] ← r[a] & r[b]` | `AND ra, rb` |
  And = 0b1010_1000,

  /// | Operation  | Semantics/RTL         | Assembly    |
  /// |------------|-----------------------|-------------|
  /// | Logical OR | `r[a] ← r[a] \| r[b]` | `OR ra, rb` |
  Or = 0b1010_1010,

  /// | Operation   | Semantics/RTL        | Assembly     |
  /// |-------------|----------------------|--------------|
  /// | Logical XOR | `r[a] ← r[a] ^ r[b]` | `XOR ra, rb` |
  Xor = 0b1010_1011,

  /// | Operation  | Semantics/RTL         | Assembly     |
  /// |------------|-----------------------|--------------|
  /// | Shift Left | `r[a] ← r[a] << r[b]` | `SHL ra, rb` |
  Shl = 0b1010_1100,

  /// | Operation   | Semantics/RTL         | Assembly     |
  /// |-------------|-----------------------|--------------|
  /// | Shift Right | `r[a] ← r[a] >> r[b]` | `SHR ra, rb` |
  Shr = 0b1010_1101,
}

impl Opcode {
  /// How many operand bytes follow the opcode
  pub const fn operand_count(self) -> usize {
    (self as u8 >> 6) as usize
  }

  /// Total size of the instruction in memory, opcode included
  pub const fn width(self) -> usize {
    self.operand_count() + 1
  }

  pub const fn is_alu(self) -> bool {
    self as u8 & 0b0010_0000 != 0
  }

  pub const fn sets_pc(self) -> bool {
    self as u8 & 0b0001_0000 != 0
  }

  pub const fn mnemonic(self) -> &'static str {
    match self {
      Self::Nop => "NOP",
      Self::Hlt => "HLT",
      Self::Ret => "RET",
      Self::Push => "PUSH",
      Self::Pop => "POP",
      Self::Prn => "PRN",
      Self::Pra => "PRA",
      Self::Call => "CALL",
      Self::Jmp => "JMP",
      Self::Jeq => "JEQ",
      Self::Jne => "JNE",
      Self::Jgt => "JGT",
      Self::Jlt => "JLT",
      Self::Jle => "JLE",
      Self::Jge => "JGE",
      Self::Inc => "INC",
      Self::Dec => "DEC",
      Self::Not => "NOT",
      Self::Ldi => "LDI",
      Self::Ld => "LD",
      Self::St => "ST",
      Self::Add => "ADD",
      Self::Sub => "SUB",
      Self::Mul => "MUL",
      Self::Div => "DIV",
      Self::Mod => "MOD",
      Self::Cmp => "CMP",
      Self::And => "AND",
      Self::Or => "OR",
      Self::Xor => "XOR",
      Self::Shl => "SHL",
      Self::Shr => "SHR",
    }
  }
}

impl fmt::Display for Opcode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.mnemonic())
  }
}

/// The byte did not name any instruction; carries the byte back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownOpcode(pub u8);

impl TryFrom<u8> for Opcode {
  type Error = UnknownOpcode;

  fn try_from(byte: u8) -> Result<Self, Self::Error> {
    let op = match byte {
      0b0000_0000 => Self::Nop,
      0b0000_0001 => Self::Hlt,
      0b0001_0001 => Self::Ret,
      0b0100_0101 => Self::Push,
      0b0100_0110 => Self::Pop,
      0b0100_0111 => Self::Prn,
      0b0100_1000 => Self::Pra,
      0b0101_0000 => Self::Call,
      0b0101_0100 => Self::Jmp,
      0b0101_0101 => Self::Jeq,
      0b0101_0110 => Self::Jne,
      0b0101_0111 => Self::Jgt,
      0b0101_1000 => Self::Jlt,
      0b0101_1001 => Self::Jle,
      0b0101_1010 => Self::Jge,
      0b0110_0101 => Self::Inc,
      0b0110_0110 => Self::Dec,
      0b0110_1001 => Self::Not,
      0b1000_0010 => Self::Ldi,
      0b1000_0011 => Self::Ld,
      0b1000_0100 => Self::St,
      0b1010_0000 => Self::Add,
      0b1010_0001 => Self::Sub,
      0b1010_0010 => Self::Mul,
      0b1010_0011 => Self::Div,
      0b1010_0100 => Self::Mod,
      0b1010_0111 => Self::Cmp,
      0b1010_1000 => Self::And,
      0b1010_1010 => Self::Or,
      0b1010_1011 => Self::Xor,
      0b1010_1100 => Self::Shl,
      0b1010_1101 => Self::Shr,
      other => return Err(UnknownOpcode(other)),
    };
    Ok(op)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const ALL: [Opcode; 32] = [
    Opcode::Nop,
    Opcode::Hlt,
    Opcode::Ret,
    Opcode::Push,
    Opcode::Pop,
    Opcode::Prn,
    Opcode::Pra,
    Opcode::Call,
    Opcode::Jmp,
    Opcode::Jeq,
    Opcode::Jne,
    Opcode::Jgt,
    Opcode::Jlt,
    Opcode::Jle,
    Opcode::Jge,
    Opcode::Inc,
    Opcode::Dec,
    Opcode::Not,
    Opcode::Ldi,
    Opcode::Ld,
    Opcode::St,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::Div,
    Opcode::Mod,
    Opcode::Cmp,
    Opcode::And,
    Opcode::Or,
    Opcode::Xor,
    Opcode::Shl,
    Opcode::Shr,
  ];

  #[test]
  fn decode_every_known_byte() {
    for op in ALL {
      assert_eq!(Opcode::try_from(op as u8), Ok(op));
    }
  }

  #[test]
  fn decode_unknown_byte() {
    assert_eq!(Opcode::try_from(0xFF), Err(UnknownOpcode(0xFF)));
    assert_eq!(Opcode::try_from(0x52), Err(UnknownOpcode(0x52))); // INT is not supported
    assert_eq!(Opcode::try_from(0x13), Err(UnknownOpcode(0x13))); // nor IRET
  }

  #[test]
  fn only_known_bytes_decode() {
    let known = (0..=u8::MAX)
      .filter(|byte| Opcode::try_from(*byte).is_ok())
      .count();
    assert_eq!(known, ALL.len());
  }

  #[test]
  fn widths_follow_high_bits() {
    assert_eq!(Opcode::Hlt.width(), 1);
    assert_eq!(Opcode::Ret.width(), 1);
    assert_eq!(Opcode::Prn.width(), 2);
    assert_eq!(Opcode::Push.width(), 2);
    assert_eq!(Opcode::Jeq.width(), 2);
    assert_eq!(Opcode::Ldi.width(), 3);
    assert_eq!(Opcode::Cmp.width(), 3);
  }

  #[test]
  fn alu_and_pc_bits() {
    for op in ALL {
      let alu = matches!(
        op,
        Opcode::Add
          | Opcode::Sub
          | Opcode::Mul
          | Opcode::Div
          | Opcode::Mod
          | Opcode::Cmp
          | Opcode::And
          | Opcode::Or
          | Opcode::Xor
          | Opcode::Shl
          | Opcode::Shr
          | Opcode::Not
          | Opcode::Inc
          | Opcode::Dec
      );
      assert_eq!(op.is_alu(), alu, "{op}");
    }
    assert!(Opcode::Jmp.sets_pc());
    assert!(Opcode::Call.sets_pc());
    assert!(Opcode::Ret.sets_pc());
    assert!(!Opcode::Ldi.sets_pc());
  }

  #[test]
  fn display_uses_mnemonic() {
    assert_eq!(Opcode::Ldi.to_string(), "LDI");
    assert_eq!(Opcode::Push.to_string(), "PUSH");
  }
}
