//! Times a fan-out of concurrent child tasks that are gathered by their parent.
//!
//! Each child waits on a simulated remote call and then does a little processor work. The
//! children run concurrently, so the gathered scope lasts about as long as the slowest child
//! and most of it is spent waiting in the poller.
//!
//! Run with: `cargo run --example fan_out_gather`.
//! Set `RUST_LOG=loop_timing=trace` to also see every turn of the event loop.

#[cfg(unix)]
use std::time::Duration;

#[cfg(unix)]
use futures::future::join_all;
#[cfg(unix)]
use loop_timing::{Handle, LocalRuntime};
#[cfg(unix)]
use testing::burn_processor_time;
#[cfg(unix)]
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
const CHILD_COUNT: u64 = 8;

#[cfg(unix)]
fn main() -> loop_timing::Result<()> {
    // Logs go to stderr so they do not interleave with the timing block on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut runtime = LocalRuntime::timed();
    let handle = runtime.handle();
    let reporter = runtime.timing_reporter();

    let results = runtime.block_on(reporter.with_timing_async(Some("gather"), async {
        let children = (0..CHILD_COUNT).map(|index| handle.spawn(child(handle.clone(), index)));

        join_all(children).await
    }))?;

    println!("gathered {} results: {results:?}", results.len());

    // The same work without waiting for any children shows up as pure processor time.
    reporter.with_timing(Some("processing only"), || {
        burn_processor_time(Duration::from_millis(20));
    });

    Ok(())
}

/// Simulates a remote call followed by some processing of its response.
#[cfg(unix)]
async fn child(handle: Handle, index: u64) -> u64 {
    let latency = Duration::from_millis(50_u64.saturating_add(index.saturating_mul(10)));
    handle.sleep(latency).await;

    burn_processor_time(Duration::from_millis(2));

    index.saturating_mul(index)
}

#[cfg(not(unix))]
fn main() {
    println!("This example needs the operating system poller, which is only available on Unix.");
}
