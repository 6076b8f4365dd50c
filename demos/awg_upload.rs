use std::error::Error;
use std::time::Duration;

use zidaq::{DaqClient, NodePath};

const SEQUENCE: &str = r#"
const AWG_N = 2000;
wave gauss_pulse = gauss(AWG_N, AWG_N/2, AWG_N/8);
wave drag_pulse = drag(AWG_N, AWG_N/2, AWG_N/8);
while (true) {
  playWave(gauss_pulse);
  playWave(drag_pulse);
  waitWave();
}
"#;

/// Upload a sequencer program to the first AWG core, wait for the
/// compiler and start playback.
///
/// Usage: cargo run --example awg_upload -- <device> [host]
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let device = args.get(1).map(|s| s.as_str()).unwrap_or("dev2006");
    let host = args.get(2).map(|s| s.as_str()).unwrap_or("127.0.0.1");

    let mut client = DaqClient::connect(host, zidaq::DEFAULT_PORT)?;
    let props = client.connect_device(device, "")?;
    DaqClient::require_option(&props, "AWG")?;

    client.awg_upload_source(device, 0, SEQUENCE)?;
    client.awg_wait_compiled(device, 0, Duration::from_secs(30))?;
    println!("Sequence compiled and uploaded");

    // Replace the second waveform in place without recompiling.
    let n = 2000;
    let ramp: Vec<f64> = (0..n).map(|i| i as f64 / (n - 1) as f64).collect();
    client.awg_write_waveform(device, 0, 1, &ramp)?;

    client.awg_enable(device, 0, true, false)?;
    let running =
        client.get_int(&NodePath::parse(&format!("/{device}/awgs/0/enable"))?)? != 0;
    println!("AWG running: {running}");

    Ok(())
}
