use std::error::Error;
use std::time::Duration;

use zidaq::{DaqClient, DutSource, PidAdvisor, PidAdvisorConfig};

/// Optimize PLL controller gains for a target bandwidth using the PID
/// advisor's internal PLL plant model.
///
/// Usage: cargo run --example pid_advisor -- <device> [host]
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let device = args.get(1).map(|s| s.as_str()).unwrap_or("dev2006");
    let host = args.get(2).map(|s| s.as_str()).unwrap_or("127.0.0.1");

    let mut client = DaqClient::connect(host, zidaq::DEFAULT_PORT)?;
    let props = client.connect_device(device, "")?;
    DaqClient::require_option(&props, "PID")?;

    let mut advisor = PidAdvisor::new(&mut client)?;
    advisor.configure(&PidAdvisorConfig {
        device: device.to_string(),
        index: 0,
        dut_source: DutSource::InternalPll,
        target_bandwidth: 10e3,
        ..Default::default()
    })?;

    // PLL advising simulates the full loop, allow plenty of time.
    let advice = advisor.advise(Duration::from_secs(120))?;
    println!(
        "P = {:.3}, I = {:.3}, D = {:.6}, simulated bandwidth {:.1} Hz",
        advice.p, advice.i, advice.d, advice.bandwidth
    );

    advisor.to_device()?;
    println!("Gains transferred to PLL 0 of {device}");

    advisor.finish()?;
    Ok(())
}
