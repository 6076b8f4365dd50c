use std::error::Error;
use std::time::Duration;

use zidaq::{poll_flags, DaqClient, MultiDeviceSync, NodePath};

/// Synchronize two devices on the same data server, then poll both and
/// compare their aligned timestamps.
///
/// Usage: cargo run --example mds_sync -- <leader> <follower> [host]
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let leader = args.get(1).map(|s| s.as_str()).unwrap_or("dev2006");
    let follower = args.get(2).map(|s| s.as_str()).unwrap_or("dev2007");
    let host = args.get(3).map(|s| s.as_str()).unwrap_or("127.0.0.1");

    let mut client = DaqClient::connect(host, zidaq::DEFAULT_PORT)?;
    let leader_props = client.connect_device(leader, "")?;
    client.connect_device(follower, "")?;

    let mut mds = MultiDeviceSync::new(&mut client)?;
    mds.start(&[leader, follower], 0)?;
    mds.wait_synchronized(Duration::from_secs(60))?;
    mds.finish()?;
    drop(mds);

    // With a common timebase, samples from both devices line up.
    for device in [leader, follower] {
        client.set_int(&NodePath::parse(&format!("/{device}/demods/0/enable"))?, 1)?;
        client.set_double(&NodePath::parse(&format!("/{device}/demods/0/rate"))?, 10e3)?;
        client.subscribe(&NodePath::parse(&format!("/{device}/demods/0/sample"))?)?;
    }
    client.sync()?;

    let result = client.poll(
        Duration::from_millis(500),
        Duration::from_millis(500),
        poll_flags::NONE,
    )?;
    client.unsubscribe_all()?;

    let clockbase = leader_props.clockbase;
    let mut first_timestamps = Vec::new();
    for device in [leader, follower] {
        let node = NodePath::parse(&format!("/{device}/demods/0/sample"))?;
        let burst = result.demod_samples(&node)?;
        if let Some(first) = burst.samples.first() {
            first_timestamps.push(first.timestamp);
            println!("{device}: {} samples", burst.samples.len());
        }
    }
    if let [a, b] = first_timestamps[..] {
        let skew = (a.abs_diff(b)) as f64 / clockbase;
        println!("Timestamp skew between devices: {skew:.2e} s");
    }

    Ok(())
}
