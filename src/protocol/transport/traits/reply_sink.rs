//! Outlet for reply text produced by the protocol adapters.

/// Receives the textual replies an adapter emits toward the controller.
pub trait ReplySink {
    /// Emit a fragment without terminating the line (init progress output).
    fn send_partial(&mut self, text: &str);

    /// Emit one complete reply line.
    fn send_line(&mut self, line: &str);
}
