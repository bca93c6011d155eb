/// Best-effort user notification (toast, desktop popup, chat webhook ...).
///
/// Implementations swallow their own failures; nothing is reported back.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

/// Notifier that drops every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _title: &str, _message: &str) {}
}
