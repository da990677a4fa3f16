// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! VM configuration.

/// Tunables for one VM instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Maximum call depth, including the top-level script frame.
    pub max_frames: usize,
    /// Operand stack slots reserved per frame. Stack capacity is
    /// `max_frames * stack_slots_per_frame`.
    pub stack_slots_per_frame: usize,
    /// Bytes allocated before the first collection.
    pub initial_gc_threshold: usize,
    /// After a collection the next threshold is live bytes times this factor.
    pub gc_heap_grow_factor: usize,
    /// Collect on every allocation.
    pub stress_gc: bool,
    /// Emit a `trace`-level disassembly of every executed instruction.
    pub trace_execution: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_frames: 64,
            stack_slots_per_frame: 256,
            initial_gc_threshold: 1024 * 1024,
            gc_heap_grow_factor: 2,
            stress_gc: false,
            trace_execution: false,
        }
    }
}

impl VmConfig {
    /// Total operand stack capacity.
    pub fn stack_capacity(&self) -> usize {
        self.max_frames * self.stack_slots_per_frame
    }

    /// Default config with collection forced on every allocation.
    pub fn stress() -> Self {
        Self {
            stress_gc: true,
            ..Self::default()
        }
    }
}
