//! The example from the package README.
//!
//! Run with: `cargo run --example loop_timing_readme`.

#[cfg(unix)]
use std::time::Duration;

#[cfg(unix)]
use loop_timing::LocalRuntime;

#[cfg(unix)]
fn main() -> loop_timing::Result<()> {
    let mut runtime = LocalRuntime::timed();
    let handle = runtime.handle();
    let reporter = runtime.timing_reporter();

    runtime.block_on(async {
        reporter
            .with_timing_async(Some("download"), async {
                // Stands in for waiting on a socket.
                handle.sleep(Duration::from_millis(100)).await;
            })
            .await;
    })?;

    Ok(())
}

#[cfg(not(unix))]
fn main() {
    println!("This example needs the operating system poller, which is only available on Unix.");
}
