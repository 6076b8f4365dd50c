use std::error::Error;
use std::time::Duration;

use zidaq::{DaqClient, FftWindow, NodePath, ScopeConfig, ScopeMode, ScopeModule};

/// Record a few scope shots of the signal inputs and print per-channel
/// statistics.
///
/// Usage: cargo run --example scope -- <device> [host]
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let device = args.get(1).map(|s| s.as_str()).unwrap_or("dev2006");
    let host = args.get(2).map(|s| s.as_str()).unwrap_or("127.0.0.1");

    let mut client = DaqClient::connect(host, zidaq::DEFAULT_PORT)?;
    client.connect_device(device, "")?;

    // Scope input: signal input 1, full scale, 2^12 samples per shot.
    client.set_int(&NodePath::parse(&format!("/{device}/scopes/0/channel"))?, 1)?;
    client.set_int(&NodePath::parse(&format!("/{device}/scopes/0/length"))?, 4096)?;
    client.set_int(
        &NodePath::parse(&format!("/{device}/scopes/0/channels/0/inputselect"))?,
        0,
    )?;
    client.sync()?;

    let wave_node = NodePath::parse(&format!("/{device}/scopes/0/wave"))?;

    let mut scope = ScopeModule::new(&mut client)?;
    scope.configure(&ScopeConfig {
        mode: ScopeMode::Time,
        averager_weight: 1,
        history_length: 20,
        fft_window: FftWindow::Hann,
    })?;
    scope.subscribe(&wave_node)?;

    let result = scope.get_records(device, 5, Duration::from_secs(30))?;
    for (shot, record) in result.scope_records(&wave_node)?.iter().enumerate() {
        for (channel, wave) in record.channels.iter().enumerate() {
            let min = wave.iter().copied().fold(f64::INFINITY, f64::min);
            let max = wave.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            println!(
                "Shot {shot} channel {channel}: {} samples over {:.3e} s, range {min:.4} .. {max:.4} V",
                wave.len(),
                record.dt * wave.len() as f64
            );
        }
        if record.overrange {
            println!("Shot {shot} clipped, reduce the input range");
        }
    }

    Ok(())
}
