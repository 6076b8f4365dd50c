use chrono::Utc;
use std::error::Error;
use std::time::Duration;

use zidaq::{
    DaqClient, Logger, NodePath, SweepConfig, SweepMapping, SweepSample, Sweeper,
};

/// Sweep an oscillator across a resonance and record the demodulated
/// response, writing each sweep point to a JSONL file.
///
/// Usage: cargo run --example sweeper -- <device> [host]
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let device = args.get(1).map(|s| s.as_str()).unwrap_or("dev2006");
    let host = args.get(2).map(|s| s.as_str()).unwrap_or("127.0.0.1");

    let mut client = DaqClient::connect(host, zidaq::DEFAULT_PORT)?;
    client.connect_device(device, "")?;

    client.set_int(&NodePath::parse(&format!("/{device}/demods/0/enable"))?, 1)?;
    client.set_double(&NodePath::parse(&format!("/{device}/demods/0/rate"))?, 10e3)?;
    client.sync()?;

    let sample_node = NodePath::parse(&format!("/{device}/demods/0/sample"))?;

    let mut sweeper = Sweeper::new(&mut client)?;
    sweeper.configure(&SweepConfig {
        device: device.to_string(),
        grid_node: "oscs/0/freq".to_string(),
        start: 100e3,
        stop: 500e3,
        samplecount: 100,
        mapping: SweepMapping::Logarithmic,
        ..Default::default()
    })?;
    sweeper.subscribe(&sample_node)?;

    let result = sweeper.run(Duration::from_secs(120))?;
    sweeper.unsubscribe(&sample_node)?;

    let filename = format!("sweep_{}.jsonl", Utc::now().format("%Y%m%d_%H%M%S"));
    let mut logger: Logger<SweepSample> = Logger::new(&filename, 1000, false);
    for record in result.sweep_records(&sample_node)? {
        let r = record.r();
        if let Some((index, peak)) = r
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
        {
            println!(
                "Sweep of {} points, peak r = {:.6e} V at {:.1} Hz",
                record.len(),
                peak,
                record.grid[index]
            );
        }
        for i in 0..record.len() {
            logger.add(SweepSample {
                grid: record.grid[i],
                x: record.x[i],
                y: record.y[i],
                bandwidth: record.bandwidth[i],
                count: record.count[i],
            })?;
        }
    }
    logger.flush()?;
    println!("Sweep data written to {}", logger.path().display());

    Ok(())
}
