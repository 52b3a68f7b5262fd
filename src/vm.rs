use std::fmt;
use std::io::{self, Write};

use crate::loader::{self, LoadError};
use crate::opcode::{Opcode, UnknownOpcode};
use crate::region::Region;

/// The type of a single register in our virtual machine
pub type Register = u8;

/// Bytes of addressable memory
pub const MEMORY_SIZE: usize = 256;

pub const REGISTER_COUNT: usize = 8;

/// Where `sp` sits while the stack is empty, one past the last address
pub const STACK_EMPTY: usize = MEMORY_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
  Running,
  Halted,
}

/// Condition flags written by `CMP`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
  pub equal: bool,
  pub less: bool,
  pub greater: bool,
}

impl Flags {
  fn compare(a: Register, b: Register) -> Self {
    Self {
      equal: a == b,
      less: a < b,
      greater: a > b,
    }
  }

  /// The flags packed as the LS-8 `FL` register, `00000LGE`
  pub fn bits(self) -> u8 {
    (self.less as u8) << 2 | (self.greater as u8) << 1 | self.equal as u8
  }
}

/// A virtual machine for the LS-8 architecture.
///
/// Memory and registers are fixed size arenas, and every index that comes out
/// of a program is checked before it is used. Any fault halts the machine.
#[derive(Debug)]
pub struct Vm {
  pc: usize,
  sp: usize,
  // first address past the loaded program, the stack may not grow into it
  program_end: usize,
  memory: [u8; MEMORY_SIZE],
  registers: [Register; REGISTER_COUNT],
  flags: Flags,
  state: State,
}

impl Vm {
  /// Create a new, empty virtual machine
  pub fn new() -> Self {
    Self {
      pc: 0,
      sp: STACK_EMPTY,
      program_end: 0,
      memory: [0; MEMORY_SIZE],
      registers: [0; REGISTER_COUNT],
      flags: Flags::default(),
      state: State::Running,
    }
  }

  /// Create a virtual machine with `region` installed at address 0
  pub fn with_program<R>(region: &R) -> loader::Result<Self>
  where
    R: Region + ?Sized,
  {
    let mut vm = Self::new();
    vm.load(region)?;
    Ok(vm)
  }

  /// Reset the machine and copy `region` into memory starting at address 0
  ///
  /// On error the machine is left untouched.
  pub fn load<R>(&mut self, region: &R) -> loader::Result<()>
  where
    R: Region + ?Sized,
  {
    let bytes = region.bytes();
    if bytes.len() > MEMORY_SIZE {
      return Err(LoadError::TooLarge {
        capacity: MEMORY_SIZE,
      });
    }
    *self = Self::new();
    self.memory[..bytes.len()].copy_from_slice(bytes);
    self.program_end = bytes.len();
    log::debug!("installed {} program bytes", bytes.len());
    Ok(())
  }

  /// Step through a single instruction
  ///
  /// A fault is returned to the caller and leaves the machine halted.
  pub fn step<W>(&mut self, out: &mut W) -> Result<State>
  where
    W: Write,
  {
    if self.state == State::Halted {
      return Err(Error::MachineHalted);
    }
    let result = Task::new(self, out).and_then(|mut task| task.run());
    if let Err(err) = &result {
      log::warn!("machine faulted: {err}");
      self.state = State::Halted;
    }
    result.map(|()| self.state)
  }

  /// Run until `HLT` or the first fault
  pub fn run<W>(&mut self, out: &mut W) -> Result<()>
  where
    W: Write,
  {
    while self.state == State::Running {
      self.step(out)?;
    }
    Ok(())
  }

  /// Run at most `limit` instructions, returning the state reached
  pub fn run_for<W>(&mut self, out: &mut W, limit: u64) -> Result<State>
  where
    W: Write,
  {
    for _ in 0..limit {
      if self.state == State::Halted {
        break;
      }
      self.step(out)?;
    }
    Ok(self.state)
  }

  pub fn pc(&self) -> usize {
    self.pc
  }

  pub fn sp(&self) -> usize {
    self.sp
  }

  pub fn flags(&self) -> Flags {
    self.flags
  }

  pub fn state(&self) -> State {
    self.state
  }

  pub fn registers(&self) -> &[Register; REGISTER_COUNT] {
    &self.registers
  }

  pub fn memory(&self) -> &[u8; MEMORY_SIZE] {
    &self.memory
  }

  /// A one line, hex formatted dump of the machine for debugging
  pub fn trace(&self) -> Trace<'_> {
    Trace(self)
  }

  fn read_byte(&self, address: usize) -> Option<u8> {
    self.memory.get(address).copied()
  }

  fn write_byte(&mut self, address: usize, value: u8) -> Option<()> {
    self.memory.get_mut(address).map(|prev| {
      *prev = value;
    })
  }
}

impl Default for Vm {
  fn default() -> Self {
    Self::new()
  }
}

/// Formats as `TRACE: PC | B0 B1 B2 | FL | R0 R1 R2 R3 R4 R5 R6 R7`
pub struct Trace<'vm>(&'vm Vm);

impl fmt::Display for Trace<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let vm = self.0;
    let byte = |offset: usize| vm.read_byte(vm.pc + offset).unwrap_or(0);
    write!(
      f,
      "TRACE: {:02X} | {:02X} {:02X} {:02X} | {:02X} |",
      vm.pc,
      byte(0),
      byte(1),
      byte(2),
      vm.flags.bits()
    )?;
    for register in vm.registers {
      write!(f, " {register:02X}")?;
    }
    Ok(())
  }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A fault raised while executing instructions
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
  #[error("invalid opcode {opcode:#010b} at address {address:#04x}")]
  InvalidOpcode { address: usize, opcode: u8 },

  #[error("{op} r{a}, r{b} at {pc:#04x}: division by zero")]
  DivisionByZero {
    pc: usize,
    op: Opcode,
    a: u8,
    b: u8,
  },

  #[error("{op} at {pc:#04x}: stack overflow (sp = {sp:#04x})")]
  StackOverflow { pc: usize, op: Opcode, sp: usize },

  #[error("{op} at {pc:#04x}: stack underflow (sp = {sp:#04x})")]
  StackUnderflow { pc: usize, op: Opcode, sp: usize },

  #[error("{op} at {pc:#04x}: not an ALU operation")]
  UnsupportedOperation { pc: usize, op: Opcode },

  #[error("{op} at {pc:#04x}: no register r{index}")]
  InvalidRegister { pc: usize, op: Opcode, index: u8 },

  #[error("{op} at {pc:#04x}: address {address:#x} is out of range")]
  AddressOutOfBounds {
    pc: usize,
    op: Opcode,
    address: usize,
  },

  #[error("program counter {pc:#x} is out of range")]
  PcOutOfBounds { pc: usize },

  #[error("{op} at {pc:#04x}: could not write output: {kind}")]
  Output {
    pc: usize,
    op: Opcode,
    kind: io::ErrorKind,
  },

  #[error("machine is halted")]
  MachineHalted,
}

/// What to do with `pc` once a handler is done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
  Next,
  Jump(usize),
  Halt,
}

/// A single decoded instruction, borrowing the machine while it executes
struct Task<'vm, 'out, W> {
  vm: &'vm mut Vm,
  out: &'out mut W,
  pc: usize,
  op: Opcode,
  a: u8,
  b: u8,
}

impl<'vm, 'out, W> Task<'vm, 'out, W>
where
  W: Write,
{
  fn new(vm: &'vm mut Vm, out: &'out mut W) -> Result<Self> {
    let pc = vm.pc;
    let byte = vm.read_byte(pc).ok_or(Error::PcOutOfBounds { pc })?;
    let op = Opcode::try_from(byte)
      .map_err(|UnknownOpcode(opcode)| Error::InvalidOpcode { address: pc, opcode })?;
    let last = pc + op.operand_count();
    if last >= MEMORY_SIZE {
      return Err(Error::AddressOutOfBounds {
        pc,
        op,
        address: last,
      });
    }
    // both operand slots are always read, unused ones are just ignored
    let a = vm.read_byte(pc + 1).unwrap_or(0);
    let b = vm.read_byte(pc + 2).unwrap_or(0);
    Ok(Self {
      vm,
      out,
      pc,
      op,
      a,
      b,
    })
  }

  fn run(&mut self) -> Result<()> {
    log::debug!(
      "{:02X}: {} {:02X} {:02X}",
      self.pc,
      self.op,
      self.a,
      self.b
    );
    let op = self.op;
    let flow = match op {
      Opcode::Nop => Flow::Next,
      Opcode::Hlt => hlt(self),
      Opcode::Ldi => ldi(self)?,
      Opcode::Ld => ld(self)?,
      Opcode::St => st(self)?,
      Opcode::Prn => prn(self)?,
      Opcode::Pra => pra(self)?,
      Opcode::Push => push(self)?,
      Opcode::Pop => pop(self)?,
      Opcode::Call => call(self)?,
      Opcode::Ret => ret(self)?,
      Opcode::Jmp => jmp(self),
      Opcode::Jeq => jump_if(self, |fl| fl.equal)?,
      Opcode::Jne => jump_if(self, |fl| !fl.equal)?,
      Opcode::Jgt => jump_if(self, |fl| fl.greater)?,
      Opcode::Jlt => jump_if(self, |fl| fl.less)?,
      Opcode::Jle => jump_if(self, |fl| fl.less || fl.equal)?,
      Opcode::Jge => jump_if(self, |fl| fl.greater || fl.equal)?,
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
      | Opcode::Dec => alu(self, op)?,
    };
    match flow {
      Flow::Next => self.vm.pc = self.pc + op.width(),
      Flow::Jump(target) => self.vm.pc = target,
      Flow::Halt => self.vm.state = State::Halted,
    }
    Ok(())
  }

  /// Validate a register operand, handing back its index
  fn register(&self, index: u8) -> Result<usize> {
    let i = index as usize;
    if i < REGISTER_COUNT {
      Ok(i)
    } else {
      Err(Error::InvalidRegister {
        pc: self.pc,
        op: self.op,
        index,
      })
    }
  }

  fn push_byte(&mut self, value: u8) -> Result<()> {
    let sp = self.vm.sp;
    if sp == 0 || sp - 1 < self.vm.program_end {
      return Err(Error::StackOverflow {
        pc: self.pc,
        op: self.op,
        sp,
      });
    }
    self.vm.sp = sp - 1;
    self
      .vm
      .write_byte(self.vm.sp, value)
      .ok_or(Error::AddressOutOfBounds {
        pc: self.pc,
        op: self.op,
        address: self.vm.sp,
      })
  }

  fn pop_byte(&mut self) -> Result<u8> {
    let sp = self.vm.sp;
    let value = match self.vm.read_byte(sp) {
      Some(value) if sp < STACK_EMPTY => value,
      _ => {
        return Err(Error::StackUnderflow {
          pc: self.pc,
          op: self.op,
          sp,
        })
      }
    };
    self.vm.sp = sp + 1;
    Ok(value)
  }

  fn emit(&mut self, bytes: &[u8]) -> Result<()> {
    self.out.write_all(bytes).map_err(|err| Error::Output {
      pc: self.pc,
      op: self.op,
      kind: err.kind(),
    })
  }
}

// (stop execution)
fn hlt<W>(task: &mut Task<'_, '_, W>) -> Flow
where
  W: Write,
{
  log::info!("halted at {:#04x}", task.pc);
  Flow::Halt
}

// r[a] ← b
fn ldi<W>(task: &mut Task<'_, '_, W>) -> Result<Flow>
where
  W: Write,
{
  let a = task.register(task.a)?;
  task.vm.registers[a] = task.b;
  Ok(Flow::Next)
}

// r[a] ← m[r[b]]
fn ld<W>(task: &mut Task<'_, '_, W>) -> Result<Flow>
where
  W: Write,
{
  let a = task.register(task.a)?;
  let b = task.register(task.b)?;
  let address = task.vm.registers[b] as usize;
  let value = task.vm.read_byte(address).ok_or(Error::AddressOutOfBounds {
    pc: task.pc,
    op: task.op,
    address,
  })?;
  task.vm.registers[a] = value;
  Ok(Flow::Next)
}

// m[r[a]] ← r[b]
fn st<W>(task: &mut Task<'_, '_, W>) -> Result<Flow>
where
  W: Write,
{
  let a = task.register(task.a)?;
  let b = task.register(task.b)?;
  let address = task.vm.registers[a] as usize;
  let value = task.vm.registers[b];
  task
    .vm
    .write_byte(address, value)
    .ok_or(Error::AddressOutOfBounds {
      pc: task.pc,
      op: task.op,
      address,
    })?;
  Ok(Flow::Next)
}

// out ← dec r[a]
fn prn<W>(task: &mut Task<'_, '_, W>) -> Result<Flow>
where
  W: Write,
{
  let a = task.register(task.a)?;
  let value = task.vm.registers[a];
  task.emit(format!("{value}\n").as_bytes())?;
  Ok(Flow::Next)
}

// out ← ascii r[a], written as the raw byte
fn pra<W>(task: &mut Task<'_, '_, W>) -> Result<Flow>
where
  W: Write,
{
  let a = task.register(task.a)?;
  let value = task.vm.registers[a];
  task.emit(&[value])?;
  Ok(Flow::Next)
}

// sp ← sp − 1, m[sp] ← r[a]
fn push<W>(task: &mut Task<'_, '_, W>) -> Result<Flow>
where
  W: Write,
{
  let a = task.register(task.a)?;
  task.push_byte(task.vm.registers[a])?;
  Ok(Flow::Next)
}

// r[a] ← m[sp], sp ← sp + 1
fn pop<W>(task: &mut Task<'_, '_, W>) -> Result<Flow>
where
  W: Write,
{
  let a = task.register(task.a)?;
  task.vm.registers[a] = task.pop_byte()?;
  Ok(Flow::Next)
}

// sp ← sp − 1, m[sp] ← pc + 2, pc ← r[a]
fn call<W>(task: &mut Task<'_, '_, W>) -> Result<Flow>
where
  W: Write,
{
  let a = task.register(task.a)?;
  let target = task.vm.registers[a] as usize;
  let return_to = task.pc + task.op.width();
  let return_to = u8::try_from(return_to).map_err(|_| Error::AddressOutOfBounds {
    pc: task.pc,
    op: task.op,
    address: return_to,
  })?;
  task.push_byte(return_to)?;
  Ok(Flow::Jump(target))
}

// pc ← m[sp], sp ← sp + 1
fn ret<W>(task: &mut Task<'_, '_, W>) -> Result<Flow>
where
  W: Write,
{
  let target = task.pop_byte()? as usize;
  Ok(Flow::Jump(target))
}

// pc ← a
fn jmp<W>(task: &mut Task<'_, '_, W>) -> Flow
where
  W: Write,
{
  Flow::Jump(task.a as usize)
}

// if cond(FL) : pc ← r[a]
fn jump_if<W, F>(task: &mut Task<'_, '_, W>, cond: F) -> Result<Flow>
where
  W: Write,
  F: FnOnce(Flags) -> bool,
{
  let a = task.register(task.a)?;
  if cond(task.vm.flags) {
    Ok(Flow::Jump(task.vm.registers[a] as usize))
  } else {
    Ok(Flow::Next)
  }
}

/// Arithmetic and logic on registers. Results wrap to 8 bits.
///
/// Nothing is written back when the operation fails.
fn alu<W>(task: &mut Task<'_, '_, W>, op: Opcode) -> Result<Flow>
where
  W: Write,
{
  if !op.is_alu() {
    return Err(Error::UnsupportedOperation { pc: task.pc, op });
  }
  let a = task.register(task.a)?;
  let x = task.vm.registers[a];
  // single operand ops never look at `b`
  let y = if op.operand_count() == 2 {
    task.vm.registers[task.register(task.b)?]
  } else {
    0
  };
  let divide_by_zero = || Error::DivisionByZero {
    pc: task.pc,
    op,
    a: task.a,
    b: task.b,
  };
  let result = match op {
    Opcode::Add => x.wrapping_add(y),
    Opcode::Sub => x.wrapping_sub(y),
    Opcode::Mul => x.wrapping_mul(y),
    Opcode::Div => x.checked_div(y).ok_or_else(divide_by_zero)?,
    Opcode::Mod => x.checked_rem(y).ok_or_else(divide_by_zero)?,
    Opcode::And => x & y,
    Opcode::Or => x | y,
    Opcode::Xor => x ^ y,
    Opcode::Shl => x.checked_shl(y as u32).unwrap_or(0),
    Opcode::Shr => x.checked_shr(y as u32).unwrap_or(0),
    Opcode::Not => !x,
    Opcode::Inc => x.wrapping_add(1),
    Opcode::Dec => x.wrapping_sub(1),
    Opcode::Cmp => {
      task.vm.flags = Flags::compare(x, y);
      return Ok(Flow::Next);
    }
    _ => return Err(Error::UnsupportedOperation { pc: task.pc, op }),
  };
  task.vm.registers[a] = result;
  Ok(Flow::Next)
}
