// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Lexical scopes, local slots and upvalue resolution.

use crate::opcode::OpCode;

use super::Compiler;
use super::types::{Local, UpvalueDesc};

/// Locals and upvalues are addressed by a single operand byte.
const MAX_SLOTS: usize = u8::MAX as usize + 1;

impl<'src, 'h> Compiler<'src, 'h> {
    pub(super) fn begin_scope(&mut self) {
        self.state_mut().scope_depth += 1;
    }

    /// Leave a block: discard its locals, hoisting captured ones into their
    /// upvalues first.
    pub(super) fn end_scope(&mut self) {
        self.state_mut().scope_depth -= 1;
        loop {
            let state = self.state();
            let captured = match state.locals.last() {
                Some(local) if local.depth.is_none_or(|d| d > state.scope_depth) => {
                    local.is_captured
                }
                _ => break,
            };
            self.emit_op(if captured {
                OpCode::CloseUpvalue
            } else {
                OpCode::Pop
            });
            self.state_mut().locals.pop();
        }
    }

    pub(super) fn add_local(&mut self, name: &'src str) {
        if self.state().locals.len() == MAX_SLOTS {
            self.error("Too many local variables in function.");
            return;
        }
        self.state_mut().locals.push(Local {
            name,
            depth: None,
            is_captured: false,
        });
    }

    /// Record the variable named by the previous token as a local of the
    /// current scope. Globals are late bound and need nothing here.
    pub(super) fn declare_variable(&mut self) {
        let state = self.state();
        if state.scope_depth == 0 {
            return;
        }

        let name = self.previous.lexeme;
        let duplicate = state
            .locals
            .iter()
            .rev()
            .take_while(|local| local.depth.is_none_or(|d| d >= state.scope_depth))
            .any(|local| local.name == name);
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(name);
    }

    /// The newest local's initializer is done; it may now be referenced.
    pub(super) fn mark_initialized(&mut self) {
        let state = self.state_mut();
        if state.scope_depth == 0 {
            return;
        }
        let depth = state.scope_depth;
        if let Some(local) = state.locals.last_mut() {
            local.depth = Some(depth);
        }
    }

    /// Find `name` among the locals of `functions[function]`, innermost first.
    pub(super) fn resolve_local(&mut self, function: usize, name: &str) -> Option<u8> {
        let (slot, initialized) = self.functions[function]
            .locals
            .iter()
            .enumerate()
            .rev()
            .find(|(_, local)| local.name == name)
            .map(|(slot, local)| (slot, local.depth.is_some()))?;

        if !initialized {
            self.error("Can't read local variable in its own initializer.");
        }
        Some(slot as u8)
    }

    /// Resolve `name` in an enclosing function, threading an upvalue through
    /// every function in between.
    pub(super) fn resolve_upvalue(&mut self, function: usize, name: &str) -> Option<u8> {
        let enclosing = function.checked_sub(1)?;

        if let Some(local) = self.resolve_local(enclosing, name) {
            self.functions[enclosing].locals[local as usize].is_captured = true;
            return Some(self.add_upvalue(function, local, true));
        }

        let upvalue = self.resolve_upvalue(enclosing, name)?;
        Some(self.add_upvalue(function, upvalue, false))
    }

    fn add_upvalue(&mut self, function: usize, index: u8, is_local: bool) -> u8 {
        let desc = UpvalueDesc { index, is_local };
        let upvalues = &self.functions[function].upvalues;
        if let Some(existing) = upvalues.iter().position(|u| *u == desc) {
            return existing as u8;
        }
        if upvalues.len() == MAX_SLOTS {
            self.error("Too many closure variables in function.");
            return 0;
        }
        self.functions[function].upvalues.push(desc);
        (self.functions[function].upvalues.len() - 1) as u8
    }
}
