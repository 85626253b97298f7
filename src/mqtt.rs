use anyhow::{Context, Result};
use log::info;
use rumqttc::{Client, MqttOptions, QoS};
use std::time::Duration;

use crate::config::Config;

/// Publish a serialized report to the configured MQTT broker.
/// Uses QoS 0 (fire-and-forget).
pub fn publish_report(config: &Config, host: &str, payload: &str) -> Result<()> {
    let mut opts = MqttOptions::new(&config.mqtt_client_id, host, config.mqtt_port);
    opts.set_keep_alive(Duration::from_secs(60));
    opts.set_max_packet_size(payload.len() + 1024, payload.len() + 1024);

    let (client, mut connection) = Client::new(opts, 10);

    client
        .publish(
            &config.mqtt_topic,
            QoS::AtMostOnce,
            false,
            payload.as_bytes(),
        )
        .context("Failed to queue MQTT publish")?;

    // The event loop has to be driven for the packet to go out
    for event in connection.iter() {
        match event {
            Ok(rumqttc::Event::Outgoing(rumqttc::Outgoing::Publish(_))) => {
                info!(
                    "Published report to {} on {}:{}",
                    config.mqtt_topic, host, config.mqtt_port
                );
                break;
            }
            Ok(rumqttc::Event::Outgoing(rumqttc::Outgoing::Disconnect)) => break,
            Err(e) => return Err(anyhow::anyhow!("MQTT connection error: {}", e)),
            _ => continue,
        }
    }

    client.disconnect().ok();
    Ok(())
}
