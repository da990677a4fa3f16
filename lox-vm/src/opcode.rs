// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Bytecode instruction definitions.

/// Bytecode instructions for the Lox VM.
///
/// Each instruction is one opcode byte followed by a fixed number of operand
/// bytes (see [`OpCode::operand_len`]). Single-byte operands are constant
/// indices, stack slots, upvalue indices or argument counts. Jump distances
/// are two bytes big-endian; `ConstantLong` carries a three-byte
/// little-endian constant index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // =========================================================================
    // Constants & Stack
    // =========================================================================
    /// Push constants[n].
    Constant,
    /// Push constants[n] with a 24-bit index.
    ConstantLong,
    Nil,
    True,
    False,
    /// Discard the top of stack.
    Pop,

    // =========================================================================
    // Variables
    // =========================================================================
    /// Push stack[frame_base + n].
    GetLocal,
    /// stack[frame_base + n] = peek(0). Leaves the value on the stack.
    SetLocal,
    /// Push the global named by constants[n].
    GetGlobal,
    /// Define the global named by constants[n] as pop().
    DefineGlobal,
    /// Assign an existing global; leaves the value on the stack.
    SetGlobal,
    /// Push the value behind the current closure's upvalue n.
    GetUpvalue,
    /// Store peek(0) through upvalue n.
    SetUpvalue,

    // =========================================================================
    // Properties
    // =========================================================================
    /// Replace the instance on top with its field or bound method constants[n].
    GetProperty,
    /// instance.field = value, where value = pop(), instance = pop(); push value.
    SetProperty,
    /// Bind method constants[n] of superclass = pop() to receiver = pop().
    GetSuper,

    // =========================================================================
    // Operators
    // =========================================================================
    Equal,
    Greater,
    Less,
    /// Numeric addition or string concatenation.
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,

    // =========================================================================
    // Statements & Control Flow
    // =========================================================================
    /// Print pop().
    Print,
    /// Unconditional forward jump.
    Jump,
    /// Forward jump if peek(0) is falsey. Does not pop.
    JumpIfFalse,
    /// Backward jump.
    Loop,

    // =========================================================================
    // Calls & Closures
    // =========================================================================
    /// Call the value at stack[sp - n - 1] with n arguments.
    Call,
    /// Call method constants[a] on the receiver at stack[sp - b - 1].
    Invoke,
    /// Call superclass method constants[a]; the superclass is on top.
    SuperInvoke,
    /// Wrap function constants[n] in a closure. Followed by one
    /// (is_local, index) byte pair per upvalue.
    Closure,
    /// Hoist the local on top of the stack into its upvalue, then pop it.
    CloseUpvalue,
    /// Return pop() to the caller.
    Return,

    // =========================================================================
    // Classes
    // =========================================================================
    /// Push a new class named constants[n].
    Class,
    /// Copy the superclass' methods into the subclass on top; pop subclass.
    Inherit,
    /// Add method = pop() to the class below it under constants[n].
    Method,
}

impl OpCode {
    const ALL: [OpCode; 38] = [
        OpCode::Constant,
        OpCode::ConstantLong,
        OpCode::Nil,
        OpCode::True,
        OpCode::False,
        OpCode::Pop,
        OpCode::GetLocal,
        OpCode::SetLocal,
        OpCode::GetGlobal,
        OpCode::DefineGlobal,
        OpCode::SetGlobal,
        OpCode::GetUpvalue,
        OpCode::SetUpvalue,
        OpCode::GetProperty,
        OpCode::SetProperty,
        OpCode::GetSuper,
        OpCode::Equal,
        OpCode::Greater,
        OpCode::Less,
        OpCode::Add,
        OpCode::Subtract,
        OpCode::Multiply,
        OpCode::Divide,
        OpCode::Not,
        OpCode::Negate,
        OpCode::Print,
        OpCode::Jump,
        OpCode::JumpIfFalse,
        OpCode::Loop,
        OpCode::Call,
        OpCode::Invoke,
        OpCode::SuperInvoke,
        OpCode::Closure,
        OpCode::CloseUpvalue,
        OpCode::Return,
        OpCode::Class,
        OpCode::Inherit,
        OpCode::Method,
    ];

    /// Number of fixed operand bytes following the opcode.
    ///
    /// `Closure` is followed by a further two bytes per upvalue of the
    /// function it wraps; those are not counted here.
    #[inline]
    pub fn operand_len(self) -> usize {
        match self {
            OpCode::ConstantLong => 3,
            OpCode::Jump
            | OpCode::JumpIfFalse
            | OpCode::Loop
            | OpCode::Invoke
            | OpCode::SuperInvoke => 2,
            OpCode::Constant
            | OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::GetGlobal
            | OpCode::DefineGlobal
            | OpCode::SetGlobal
            | OpCode::GetUpvalue
            | OpCode::SetUpvalue
            | OpCode::GetProperty
            | OpCode::SetProperty
            | OpCode::GetSuper
            | OpCode::Call
            | OpCode::Closure
            | OpCode::Class
            | OpCode::Method => 1,
            _ => 0,
        }
    }

    /// Returns the stack effect of this instruction (positive = push, negative = pop).
    /// Returns None for instructions whose effect depends on operands or the
    /// callee (calls, returns, closures).
    #[inline]
    pub fn stack_effect(self) -> Option<i8> {
        Some(match self {
            // Push 1
            OpCode::Constant
            | OpCode::ConstantLong
            | OpCode::Nil
            | OpCode::True
            | OpCode::False
            | OpCode::GetLocal
            | OpCode::GetGlobal
            | OpCode::GetUpvalue
            | OpCode::Class => 1,

            // Pop 1
            OpCode::Pop
            | OpCode::DefineGlobal
            | OpCode::Print
            | OpCode::CloseUpvalue
            | OpCode::Inherit
            | OpCode::Method => -1,

            // Neutral: assignments leave their value, unary operators replace it
            OpCode::SetLocal
            | OpCode::SetGlobal
            | OpCode::SetUpvalue
            | OpCode::GetProperty
            | OpCode::Not
            | OpCode::Negate => 0,

            // Pop 2, push 1
            OpCode::SetProperty
            | OpCode::GetSuper
            | OpCode::Equal
            | OpCode::Greater
            | OpCode::Less
            | OpCode::Add
            | OpCode::Subtract
            | OpCode::Multiply
            | OpCode::Divide => -1,

            // Jumps do not touch the stack
            OpCode::Jump | OpCode::JumpIfFalse | OpCode::Loop => 0,

            // Variable effect
            OpCode::Call
            | OpCode::Invoke
            | OpCode::SuperInvoke
            | OpCode::Closure
            | OpCode::Return => return None,
        })
    }

    /// Upper-case mnemonic used by the disassembler.
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::Constant => "OP_CONSTANT",
            OpCode::ConstantLong => "OP_CONSTANT_LONG",
            OpCode::Nil => "OP_NIL",
            OpCode::True => "OP_TRUE",
            OpCode::False => "OP_FALSE",
            OpCode::Pop => "OP_POP",
            OpCode::GetLocal => "OP_GET_LOCAL",
            OpCode::SetLocal => "OP_SET_LOCAL",
            OpCode::GetGlobal => "OP_GET_GLOBAL",
            OpCode::DefineGlobal => "OP_DEFINE_GLOBAL",
            OpCode::SetGlobal => "OP_SET_GLOBAL",
            OpCode::GetUpvalue => "OP_GET_UPVALUE",
            OpCode::SetUpvalue => "OP_SET_UPVALUE",
            OpCode::GetProperty => "OP_GET_PROPERTY",
            OpCode::SetProperty => "OP_SET_PROPERTY",
            OpCode::GetSuper => "OP_GET_SUPER",
            OpCode::Equal => "OP_EQUAL",
            OpCode::Greater => "OP_GREATER",
            OpCode::Less => "OP_LESS",
            OpCode::Add => "OP_ADD",
            OpCode::Subtract => "OP_SUBTRACT",
            OpCode::Multiply => "OP_MULTIPLY",
            OpCode::Divide => "OP_DIVIDE",
            OpCode::Not => "OP_NOT",
            OpCode::Negate => "OP_NEGATE",
            OpCode::Print => "OP_PRINT",
            OpCode::Jump => "OP_JUMP",
            OpCode::JumpIfFalse => "OP_JUMP_IF_FALSE",
            OpCode::Loop => "OP_LOOP",
            OpCode::Call => "OP_CALL",
            OpCode::Invoke => "OP_INVOKE",
            OpCode::SuperInvoke => "OP_SUPER_INVOKE",
            OpCode::Closure => "OP_CLOSURE",
            OpCode::CloseUpvalue => "OP_CLOSE_UPVALUE",
            OpCode::Return => "OP_RETURN",
            OpCode::Class => "OP_CLASS",
            OpCode::Inherit => "OP_INHERIT",
            OpCode::Method => "OP_METHOD",
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        OpCode::ALL.get(byte as usize).copied().ok_or(byte)
    }
}
