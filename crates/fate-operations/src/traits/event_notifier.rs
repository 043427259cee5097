/// Receives human-readable notifications about completed operations.
pub trait EventNotifier: Send + Sync {
    fn event(&self, message: &str);
}
