//! `VmBuilder` for creating `Vm` instances with various configurations.

use super::{Vm, DEFAULT_CALL_DEPTH_LIMIT};
use crate::print_handler::{stdout_handler, SharedPrintHandler};

/// Builder for `Vm` instances.
///
/// Defaults: stdout printing, a call depth limit of
/// `DEFAULT_CALL_DEPTH_LIMIT`. Hosts that embed the VM typically swap in a
/// buffer print handler and tighten the depth limit.
pub struct VmBuilder {
    print_handler: Option<SharedPrintHandler>,
    call_depth_limit: usize,
}

impl VmBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        VmBuilder {
            print_handler: None,
            call_depth_limit: DEFAULT_CALL_DEPTH_LIMIT,
        }
    }

    /// Set the print handler the `print`/`println` builtins write through.
    #[must_use]
    pub fn print_handler(mut self, handler: SharedPrintHandler) -> Self {
        self.print_handler = Some(handler);
        self
    }

    /// Set the interpreted call depth at which execution fails with
    /// `ResourceExhausted`.
    #[must_use]
    pub fn call_depth_limit(mut self, limit: usize) -> Self {
        self.call_depth_limit = limit;
        self
    }

    /// Build the VM with builtins installed.
    pub fn build(self) -> Vm {
        let print = self.print_handler.unwrap_or_else(stdout_handler);
        Vm::with_parts(print, self.call_depth_limit)
    }
}

impl Default for VmBuilder {
    fn default() -> Self {
        Self::new()
    }
}
