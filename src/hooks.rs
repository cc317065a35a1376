//! Side effects of terminal failures, injected into the client.

/// User-facing error surface (toast, status bar, stderr). Fire-and-forget.
pub trait Notifier: Send + Sync {
    fn notify_error(&self, message: &str);
}

/// Sends the user to the login surface after a 401.
pub trait Navigator: Send + Sync {
    fn redirect(&self, path: &str);
}

/// Default notifier: logs at `error`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_error(&self, message: &str) {
        tracing::error!(%message, "request failed");
    }
}

/// Default navigator: logs at `warn`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn redirect(&self, path: &str) {
        tracing::warn!(%path, "authentication required; redirecting to login");
    }
}
