use std::error::Error;

use zidaq::{DaqClient, NodePath, ZiValue};

/// Connect to a device and configure a demodulator.
///
/// Usage: cargo run --example connect_config -- <device> [host]
/// Example: cargo run --example connect_config -- dev2006 127.0.0.1
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let device = args.get(1).map(|s| s.as_str()).unwrap_or("dev2006");
    let host = args.get(2).map(|s| s.as_str()).unwrap_or("127.0.0.1");

    let mut client = DaqClient::connect(host, zidaq::DEFAULT_PORT)?;
    client.check_server_version()?;
    println!("Data server version: {}", client.server_version());

    let props = client.connect_device(device, "")?;
    println!(
        "Connected to {} ({}) over {}",
        props.serial,
        props.devtype,
        props.interfaces.join("|")
    );

    // Start from a defined state.
    client.disable_everything(device)?;

    // One transaction per setting.
    client.set_double(&NodePath::parse(&format!("/{device}/demods/0/rate"))?, 10e3)?;
    client.set_int(&NodePath::parse(&format!("/{device}/demods/0/order"))?, 4)?;

    // Or batched, the way larger configurations are written.
    client.set(&[
        (
            NodePath::parse(&format!("/{device}/demods/0/timeconstant"))?,
            ZiValue::F64(0.01),
        ),
        (
            NodePath::parse(&format!("/{device}/demods/0/enable"))?,
            ZiValue::I64(1),
        ),
        (
            NodePath::parse(&format!("/{device}/oscs/0/freq"))?,
            ZiValue::F64(400e3),
        ),
    ])?;
    client.sync()?;

    let freq = client.get_double(&NodePath::parse(&format!("/{device}/oscs/0/freq"))?)?;
    println!("Oscillator frequency: {freq} Hz");

    // Wildcard read over every demodulator.
    for (path, value) in client.get(&NodePath::parse(&format!("/{device}/demods/*/rate"))?)? {
        println!("{path} = {value:?}");
    }

    Ok(())
}
