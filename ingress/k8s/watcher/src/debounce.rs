use crate::notify::Trigger;
use tokio::time::{self, Duration};

/// Invokes `f` once the trigger has been quiet for `window`.
///
/// Each notification restarts the window, so a burst of notifications
/// results in a single invocation after the burst ends. Notifications that
/// arrive while `f` runs schedule another invocation.
pub(crate) async fn debounce(trigger: &Trigger, window: Duration, mut f: impl FnMut()) {
    loop {
        trigger.notified().await;
        loop {
            tokio::select! {
                _ = trigger.notified() => {}
                _ = time::sleep(window) => break,
            }
        }
        f();
    }
}
