// lox-embed - Engine implementation
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The Engine struct - main entry point for embedding Lox.

use std::cell::RefCell;
use std::io::{self, Write};
use std::path::Path;
use std::rc::Rc;

use lox_vm::{InterpretError, Pinned, Value, Vm, VmConfig};
use tracing::debug;

use crate::convert::{FromValue, IntoValue};
use crate::error::{Error, Result};

/// The Lox scripting engine.
///
/// # Thread Safety
///
/// **`Engine` is NOT thread-safe.** Native functions are held in `Rc`s and
/// the heap is owned by a single VM. Create one engine per thread; engines
/// share nothing.
///
/// # Example
///
/// ```rust
/// use lox_embed::Engine;
///
/// let mut engine = Engine::new();
/// engine.set_global("name", "lox");
/// engine.eval("var greeting = \"hello \" + name;").unwrap();
/// assert_eq!(engine.get_global::<String>("greeting").unwrap(), "hello lox");
/// ```
pub struct Engine {
    vm: Vm,
}

impl Engine {
    /// Create an engine with the default configuration, printing to stdout.
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        debug!(?config, "creating engine");
        Engine {
            vm: Vm::with_config(config),
        }
    }

    /// Send `print` output to `out` instead of stdout.
    #[must_use]
    pub fn with_output(mut self, out: impl Write + 'static) -> Self {
        self.vm.set_output(Box::new(out));
        self
    }

    /// Redirect `print` output into a buffer and return a handle to it.
    pub fn capture_output(&mut self) -> CapturedOutput {
        let captured = CapturedOutput::default();
        self.vm.set_output(Box::new(captured.clone()));
        captured
    }

    /// Compile and run a string of Lox code.
    ///
    /// # Errors
    ///
    /// Returns the compile diagnostics or the runtime error with its
    /// traceback. The engine stays usable either way; globals defined
    /// before a runtime error are kept.
    pub fn eval(&mut self, source: &str) -> std::result::Result<(), InterpretError> {
        self.vm.interpret(source)
    }

    /// Run a file of Lox code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, otherwise the same
    /// errors as [`eval`](Engine::eval).
    pub fn eval_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.eval(&source)?;
        Ok(())
    }

    /// Get a global converted to `T`.
    ///
    /// Heap values come back as [`Pinned`] handles, which stay valid across
    /// later evaluations and collections.
    ///
    /// # Example
    ///
    /// ```rust
    /// use lox_embed::{Engine, Error};
    ///
    /// let mut engine = Engine::new();
    /// engine.eval("var x = \"text\";").unwrap();
    ///
    /// assert!(matches!(engine.get_global::<f64>("missing"), Err(Error::UndefinedGlobal(_))));
    /// assert!(matches!(engine.get_global::<f64>("x"), Err(Error::TypeError { .. })));
    /// assert_eq!(engine.get_global::<Option<String>>("x").unwrap().as_deref(), Some("text"));
    /// ```
    pub fn get_global<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self
            .vm
            .get_global(name)
            .ok_or_else(|| Error::UndefinedGlobal(name.to_string()))?;
        T::from_value(value, &self.vm)
    }

    /// Define or overwrite a global.
    pub fn set_global(&mut self, name: &str, value: impl IntoValue) {
        let value = value.into_value(&mut self.vm);
        self.vm.set_global(name, value);
    }

    /// Register a native Rust function as a global.
    ///
    /// The function receives its arguments and returns a value, or an error
    /// message that becomes a Lox runtime error.
    pub fn register_native(
        &mut self,
        name: &str,
        func: impl Fn(&[Value]) -> std::result::Result<Value, String> + 'static,
    ) {
        debug!(name, "registering native function");
        self.vm.define_native(name, Rc::new(func));
    }

    /// Format a value the way `print` does.
    #[must_use]
    pub fn display(&self, value: &Pinned) -> String {
        self.vm.display(value.value())
    }

    /// Run a full garbage collection now.
    pub fn collect_garbage(&mut self) {
        self.vm.collect_garbage();
    }

    /// Get access to the underlying VM.
    #[must_use]
    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle on output captured by [`Engine::capture_output`].
#[derive(Clone, Default)]
pub struct CapturedOutput(Rc<RefCell<Vec<u8>>>);

impl CapturedOutput {
    /// Everything printed so far.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    /// Everything printed so far, clearing the buffer.
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.0.borrow_mut());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
