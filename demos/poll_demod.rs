use std::error::Error;
use std::time::Duration;

use zidaq::{poll_flags, DaqClient, NodePath};

/// Subscribe to a demodulator sample node and poll a short burst of data.
///
/// Usage: cargo run --example poll_demod -- <device> [host]
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let device = args.get(1).map(|s| s.as_str()).unwrap_or("dev2006");
    let host = args.get(2).map(|s| s.as_str()).unwrap_or("127.0.0.1");

    let mut client = DaqClient::connect(host, zidaq::DEFAULT_PORT)?;
    client.connect_device(device, "")?;

    // Enable the demodulator before subscribing so data is flowing.
    client.set_int(&NodePath::parse(&format!("/{device}/demods/0/enable"))?, 1)?;
    client.set_double(&NodePath::parse(&format!("/{device}/demods/0/rate"))?, 10e3)?;
    client.sync()?;

    let sample_node = NodePath::parse(&format!("/{device}/demods/0/sample"))?;
    client.subscribe(&sample_node)?;

    // One quick reading without the streaming machinery.
    let sample = client.get_sample(&sample_node)?;
    println!(
        "Single sample: r = {:.6e} V, theta = {:.3} rad",
        sample.r(),
        sample.theta()
    );

    // Record 1 s of data; fill gaps so the timestamps stay contiguous.
    let result = client.poll(
        Duration::from_secs(1),
        Duration::from_millis(500),
        poll_flags::FILL_GAPS,
    )?;
    client.unsubscribe(&sample_node)?;

    let burst = result.demod_samples(&sample_node)?;
    if burst.data_loss {
        println!("Warning: sample loss during poll, data may have gaps");
    }
    let mean_r =
        burst.samples.iter().map(|s| s.r()).sum::<f64>() / burst.samples.len().max(1) as f64;
    println!("Polled {} samples, mean r = {mean_r:.6e} V", burst.samples.len());

    Ok(())
}
