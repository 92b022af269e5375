/// Outbound user notifications (sound, system toast). Delivery is best-effort
/// by construction: the port is infallible, so a broken notification channel
/// can never stall or fail the timer that emits through it.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: Option<&str>);
}

/// Default sink that only traces notifications through the `log` facade.
/// Hosts embedding the engine swap in a platform-specific implementation.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: Option<&str>) {
        match body {
            Some(body) => log::info!("notification: {title} ({body})"),
            None => log::info!("notification: {title}"),
        }
    }
}
