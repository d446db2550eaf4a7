//! The AGV instruction set: raw (opcode, operand) statements and the typed
//! instructions they decode into.
//!
//! Programs arrive as an ordered list of [`Statement`]s. A small operand
//! stack exists **only during decoding**: `PUSH` places a value, and the
//! consuming opcodes pop exactly what they need into a typed [`Instr`]
//! variant. After decoding there are no runtime casts left — every
//! instruction carries its operands.

use crate::area::Point;
use crate::storage::BeveragesBox;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Malformed program. Fatal to the program; raised before any AGV state
/// changes.
#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    #[error("program does not begin with START")]
    MissingStart,
    #[error("START appears after the first statement")]
    UnexpectedStart,
    #[error("{opcode:?} needs {needed} operand(s) on the stack, found {found}")]
    StackUnderflow {
        opcode: Opcode,
        needed: usize,
        found: usize,
    },
    #[error("{opcode:?} cannot consume operand {operand:?}")]
    OperandMismatch { opcode: Opcode, operand: Value },
    #[error("PUSH requires exactly one inline operand")]
    MalformedPush,
    #[error("{opcode:?} takes no inline operands")]
    UnexpectedOperand { opcode: Opcode },
    #[error("transfer at {cell:?} has no preceding MOVE to pair with")]
    TransferWithoutMove { cell: String },
    #[error("CHARGE target {cell:?} is not a charging station")]
    NotAChargingStation { cell: String },
}

// ---------------------------------------------------------------------------
// Raw encoding
// ---------------------------------------------------------------------------

/// Opcodes understood by the AGV virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opcode {
    /// Program header. Must be the first statement.
    Start,
    /// Terminate the program. Statements after STOP are never decoded and
    /// the operand stack is discarded; legs queued before it survive.
    Stop,
    /// Rebind the AGV's position to a popped location.
    Setup,
    /// Push one inline operand onto the decode stack.
    Push,
    /// Pop a location and travel there.
    Move,
    /// Pop a cell label and a box; pick the box up on arrival.
    Take,
    /// Pop a cell label and a box; put the box down on arrival.
    Release,
    /// Pop a charging-station label and start charging on arrival.
    Charge,
}

/// An operand value. Pushed by `PUSH`, consumed during decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// A storage notation such as `"B7"`.
    Label(String),
    /// A raw floor coordinate.
    Coord(Point),
    /// A box reference for TAKE/RELEASE.
    Item(BeveragesBox),
}

/// One (opcode, operands) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub opcode: Opcode,
    pub operands: Vec<Value>,
}

impl Statement {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            operands: Vec::new(),
        }
    }

    pub fn push(value: Value) -> Self {
        Self {
            opcode: Opcode::Push,
            operands: vec![value],
        }
    }
}

/// An ordered list of statements, consumed once by the VM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }

    /// The canonical delivery shape: `START, PUSH from, MOVE, PUSH to, MOVE`.
    pub fn move_between(from: Value, to: Value) -> Self {
        Self::new(vec![
            Statement::new(Opcode::Start),
            Statement::push(from),
            Statement::new(Opcode::Move),
            Statement::push(to),
            Statement::new(Opcode::Move),
        ])
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Typed instructions
// ---------------------------------------------------------------------------

/// A location operand: either a notation label or a raw coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Location {
    Label(String),
    Coord(Point),
}

/// Direction of a box transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferDir {
    /// TAKE: cell -> AGV.
    Take,
    /// RELEASE: AGV -> cell.
    Release,
}

/// A fully decoded instruction carrying exactly the operands it needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// Rebind the AGV's position.
    Setup { at: Location },
    /// Travel to a location.
    MoveTo { dest: Location },
    /// Transfer a box at a cell, fired on arrival there.
    Transfer {
        dir: TransferDir,
        item: BeveragesBox,
        cell: String,
    },
    /// Travel to a station and start charging on arrival.
    ChargeAt { station: String },
    /// End of program. Nothing after it exists.
    Halt,
}

fn as_location(opcode: Opcode, value: Value) -> Result<Location, ProgramError> {
    match value {
        Value::Label(label) => Ok(Location::Label(label)),
        Value::Coord(point) => Ok(Location::Coord(point)),
        operand @ Value::Item(_) => Err(ProgramError::OperandMismatch { opcode, operand }),
    }
}

fn as_label(opcode: Opcode, value: Value) -> Result<String, ProgramError> {
    match value {
        Value::Label(label) => Ok(label),
        operand => Err(ProgramError::OperandMismatch { opcode, operand }),
    }
}

fn as_item(opcode: Opcode, value: Value) -> Result<BeveragesBox, ProgramError> {
    match value {
        Value::Item(item) => Ok(item),
        operand => Err(ProgramError::OperandMismatch { opcode, operand }),
    }
}

/// Decode a raw program into typed instructions.
///
/// The first statement must be `START`; anything else fails before any
/// state change. Statements after the last opcode simply don't exist —
/// running off the end is a no-op, not an error.
pub fn decode(program: &Program) -> Result<Vec<Instr>, ProgramError> {
    let mut statements = program.statements.iter();
    match statements.next() {
        Some(first) if first.opcode == Opcode::Start => {}
        _ => return Err(ProgramError::MissingStart),
    }

    let mut stack: Vec<Value> = Vec::new();
    let mut instrs: Vec<Instr> = Vec::new();

    let pop = |opcode: Opcode, needed: usize, stack: &mut Vec<Value>| {
        let found = stack.len();
        if found < needed {
            Err(ProgramError::StackUnderflow {
                opcode,
                needed,
                found,
            })
        } else {
            Ok(stack.pop().expect("length checked"))
        }
    };

    for statement in statements {
        let opcode = statement.opcode;
        if opcode != Opcode::Push && !statement.operands.is_empty() {
            return Err(ProgramError::UnexpectedOperand { opcode });
        }
        match opcode {
            Opcode::Start => return Err(ProgramError::UnexpectedStart),
            Opcode::Push => {
                if statement.operands.len() != 1 {
                    return Err(ProgramError::MalformedPush);
                }
                stack.push(statement.operands[0].clone());
            }
            Opcode::Setup => {
                let at = as_location(opcode, pop(opcode, 1, &mut stack)?)?;
                instrs.push(Instr::Setup { at });
            }
            Opcode::Move => {
                let dest = as_location(opcode, pop(opcode, 1, &mut stack)?)?;
                instrs.push(Instr::MoveTo { dest });
            }
            Opcode::Take | Opcode::Release => {
                let cell = as_label(opcode, pop(opcode, 2, &mut stack)?)?;
                let item = as_item(opcode, pop(opcode, 1, &mut stack)?)?;
                let dir = if opcode == Opcode::Take {
                    TransferDir::Take
                } else {
                    TransferDir::Release
                };
                instrs.push(Instr::Transfer { dir, item, cell });
            }
            Opcode::Charge => {
                let station = as_label(opcode, pop(opcode, 1, &mut stack)?)?;
                instrs.push(Instr::ChargeAt { station });
            }
            Opcode::Stop => {
                instrs.push(Instr::Halt);
                break;
            }
        }
    }

    Ok(instrs)
}
