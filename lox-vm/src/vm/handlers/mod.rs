// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Opcode handlers, organised by category.

pub mod arithmetic;
pub mod classes;
pub mod control;
pub mod variables;
