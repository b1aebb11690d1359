/*
Telemetry viewer for a provisioned unit.

Once running, the firmware prints one JSON object per line on its serial
port. A reader loop decodes those lines and publishes the latest reading
into a watch channel; the HTTP server hands out whatever value is current.
Readers only ever need the most recent value, older ones are simply
overwritten, and the host receive time tells clients how stale it is.
*/

mod reading;
mod server;

pub use reading::{LatestReading, Reading, read_loop};
pub use server::{router, serve};

use tokio::sync::watch;

/// Create the shared latest-value cell
pub fn latest_reading() -> (watch::Sender<LatestReading>, watch::Receiver<LatestReading>) {
    watch::channel(LatestReading::default())
}
