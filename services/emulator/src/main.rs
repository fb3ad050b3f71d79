use std::convert::TryFrom;

use clap::{Arg, Command};
use emulator::{is_delay, EmulatorConfig, ReadType};
use tracing::info;

fn validate_delay_value(value: &str) -> Result<u64, String> {
    is_delay(value.to_owned())?;
    value.parse::<u64>().map_err(|_| "Invalid delay value".to_owned())
}

fn validate_read_type(value: &str) -> Result<ReadType, String> {
    ReadType::try_from(value).map_err(|()| "Invalid read type".to_owned())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "emulator starting");

    let matches = Command::new("Rack Telemetry Emulator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A synthetic family-B/family-T rack gateway for exercising the ingest pipeline")
        .arg(
            Arg::new("broker")
                .help("MQTT broker URL, e.g. tcp://localhost:1883")
                .short('b')
                .long("broker")
                .default_value("tcp://localhost:1883"),
        )
        .arg(
            Arg::new("device_id")
                .help("Synthetic gateway device id used in published topics")
                .short('i')
                .long("device-id")
                .default_value("EMU1"),
        )
        .arg(
            Arg::new("delay")
                .help("Delay between publishes, in milliseconds")
                .short('d')
                .long("delay")
                .value_parser(validate_delay_value)
                .default_value("1000"),
        )
        .arg(
            Arg::new("read_type")
                .help("Which frame family to emit: temp_hum, rfid, or mixed")
                .short('t')
                .long("type")
                .value_parser(validate_read_type)
                .default_value("mixed"),
        )
        .get_matches();

    let config = EmulatorConfig {
        broker_url: matches.get_one::<String>("broker").expect("broker has a default").clone(),
        device_id: matches.get_one::<String>("device_id").expect("device_id has a default").clone(),
        delay_ms: *matches.get_one::<u64>("delay").expect("delay has a default"),
        read_type: *matches.get_one::<ReadType>("read_type").expect("read_type has a default"),
    };

    emulator::run(config).await;
}
