//! Print handler for configurable output.
//!
//! The `print`/`println` builtins write through a handler so output can be
//! directed to stdout (the CLI), captured in a buffer (tests and embedding
//! hosts), or discarded.
//!
//! Enum dispatch rather than a trait object: printing sits on the dispatch
//! hot path.

use parking_lot::Mutex;

/// Default print handler that writes to stdout.
#[derive(Default)]
pub struct StdoutPrintHandler;

impl StdoutPrintHandler {
    /// Print a line (with newline).
    pub fn println(&self, msg: &str) {
        println!("{msg}");
    }

    /// Print without newline.
    pub fn print(&self, msg: &str) {
        print!("{msg}");
    }
}

/// Print handler that captures output to a buffer.
pub struct BufferPrintHandler {
    buffer: Mutex<String>,
}

impl BufferPrintHandler {
    /// Create a new buffer print handler.
    pub fn new() -> Self {
        BufferPrintHandler {
            buffer: Mutex::new(String::new()),
        }
    }

    /// Print a line (with newline).
    pub fn println(&self, msg: &str) {
        let mut buf = self.buffer.lock();
        buf.push_str(msg);
        buf.push('\n');
    }

    /// Print without newline.
    pub fn print(&self, msg: &str) {
        self.buffer.lock().push_str(msg);
    }

    /// Get all captured output.
    pub fn output(&self) -> String {
        self.buffer.lock().clone()
    }

    /// Clear captured output.
    pub fn clear(&self) {
        self.buffer.lock().clear();
    }
}

impl Default for BufferPrintHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Print handler implementation.
pub enum PrintHandlerImpl {
    /// Writes to stdout (default).
    Stdout(StdoutPrintHandler),
    /// Captures to a buffer (tests/embedding).
    Buffer(BufferPrintHandler),
    /// Discards all output silently.
    Silent,
}

impl PrintHandlerImpl {
    /// Print a line (with newline).
    pub fn println(&self, msg: &str) {
        match self {
            Self::Stdout(h) => h.println(msg),
            Self::Buffer(h) => h.println(msg),
            Self::Silent => {}
        }
    }

    /// Print without newline.
    pub fn print(&self, msg: &str) {
        match self {
            Self::Stdout(h) => h.print(msg),
            Self::Buffer(h) => h.print(msg),
            Self::Silent => {}
        }
    }

    /// Get all captured output; empty for handlers that don't capture.
    pub fn output(&self) -> String {
        match self {
            Self::Buffer(h) => h.output(),
            Self::Stdout(_) | Self::Silent => String::new(),
        }
    }
}

/// Shared print handler that can be handed to a VM and kept by the host.
pub type SharedPrintHandler = std::sync::Arc<PrintHandlerImpl>;

/// Create a default stdout print handler.
pub fn stdout_handler() -> SharedPrintHandler {
    std::sync::Arc::new(PrintHandlerImpl::Stdout(StdoutPrintHandler))
}

/// Create a buffer print handler for capturing output.
pub fn buffer_handler() -> SharedPrintHandler {
    std::sync::Arc::new(PrintHandlerImpl::Buffer(BufferPrintHandler::new()))
}

/// Create a silent print handler that discards all output.
pub fn silent_handler() -> SharedPrintHandler {
    std::sync::Arc::new(PrintHandlerImpl::Silent)
}
