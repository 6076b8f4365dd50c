use std::error::Error;
use std::time::Duration;

use zidaq::{DaqClient, DaqConfig, DaqModule, GridMode, NodePath, TriggerEdge, TriggerType};

/// Edge-triggered grid acquisition of a demodulator signal: each trigger
/// records a window around the crossing, interpolated onto a fixed grid.
///
/// Usage: cargo run --example daq_edge -- <device> [host]
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let device = args.get(1).map(|s| s.as_str()).unwrap_or("dev2006");
    let host = args.get(2).map(|s| s.as_str()).unwrap_or("127.0.0.1");

    let mut client = DaqClient::connect(host, zidaq::DEFAULT_PORT)?;
    client.connect_device(device, "")?;

    client.set_int(&NodePath::parse(&format!("/{device}/demods/0/enable"))?, 1)?;
    client.set_double(&NodePath::parse(&format!("/{device}/demods/0/rate"))?, 100e3)?;
    client.sync()?;

    // Trigger and record the demod magnitude.
    let signal = NodePath::parse(&format!("/{device}/demods/0/sample.r"))?;

    let mut daq = DaqModule::new(&mut client)?;
    daq.configure(&DaqConfig {
        device: device.to_string(),
        trigger_node: format!("/{device}/demods/0/sample.r"),
        trigger_type: TriggerType::Edge,
        edge: TriggerEdge::Rising,
        level: 0.1e-3,
        hysteresis: 0.01e-3,
        delay: -0.020,
        holdoff_time: 0.100,
        count: 5,
        duration: 0.1,
        grid_mode: GridMode::Exact,
        grid_cols: 1000,
        ..Default::default()
    })?;
    daq.subscribe(&signal)?;

    let result = daq.run(Duration::from_secs(60))?;
    for record in result.grid_records(&signal)? {
        let (rows, cols) = record.values.dim();
        let mean = record.values.mean().unwrap_or(0.0);
        println!(
            "Grid {rows} x {cols}, finished = {}, mean r = {mean:.6e} V",
            record.finished
        );
    }

    Ok(())
}
