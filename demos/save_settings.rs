use std::error::Error;
use std::time::Duration;

use zidaq::{DaqClient, DeviceSettings, NodePath};

/// Save the device settings to a file on the data-server host, change a
/// setting, then restore the saved state.
///
/// Usage: cargo run --example save_settings -- <device> [host]
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let device = args.get(1).map(|s| s.as_str()).unwrap_or("dev2006");
    let host = args.get(2).map(|s| s.as_str()).unwrap_or("127.0.0.1");

    let mut client = DaqClient::connect(host, zidaq::DEFAULT_PORT)?;
    client.connect_device(device, "")?;

    let freq_node = NodePath::parse(&format!("/{device}/oscs/0/freq"))?;
    let original = client.get_double(&freq_node)?;
    println!("Oscillator frequency before: {original} Hz");

    let timeout = Duration::from_secs(30);
    let filename = "settings_demo";
    {
        let mut settings = DeviceSettings::new(&mut client)?;
        settings.save(device, filename, None, timeout)?;
    }
    println!("Settings saved as {filename}");

    client.set_double(&freq_node, original * 2.0)?;
    client.sync()?;
    println!("Oscillator frequency changed to {} Hz", original * 2.0);

    {
        let mut settings = DeviceSettings::new(&mut client)?;
        settings.load(device, filename, None, timeout)?;
    }
    // Loading happens asynchronously on the device, sync before reading.
    client.sync()?;

    let restored = client.get_double(&freq_node)?;
    println!("Oscillator frequency after restore: {restored} Hz");

    Ok(())
}
