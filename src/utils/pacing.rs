use log::debug;
use std::time::Duration;

/// Courtesy wait between external calls. Zero durations return at once.
pub async fn pause(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    debug!("Waiting {:?}", duration);
    tokio::time::sleep(duration).await;
}
