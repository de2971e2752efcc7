use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use anyhow::{Context, Result};
use esp_idf_svc::mqtt::client::{
    Details, EspMqttClient, EventPayload, MqttClientConfiguration, QoS,
};

use epddash::transport::Fragment;

/// Largest message the client buffers in one piece
const MQTT_MAX_MESSAGE_LEN: usize = 8 * 1024;

/// Connected, subscribed client plus the fragments its callback produces
pub struct MqttLink {
    _client: EspMqttClient<'static>,
    pub fragments: Receiver<Fragment>,
}

impl MqttLink {
    pub fn connect(broker: &str, topics: &[String], timeout: Duration) -> Result<Self> {
        let (tx, fragments) = mpsc::channel();
        let (connected_tx, connected) = mpsc::channel();
        let mut topic = String::new();

        let config = MqttClientConfiguration {
            client_id: Some("epddash"),
            buffer_size: MQTT_MAX_MESSAGE_LEN,
            ..Default::default()
        };

        log::info!("Connecting to MQTT broker {}", broker);
        let mut client = EspMqttClient::new_cb(broker, &config, move |event| {
            match event.payload() {
                EventPayload::Connected(_) => {
                    let _ = connected_tx.send(());
                }
                EventPayload::Received {
                    topic: received_topic,
                    data,
                    details,
                    ..
                } => {
                    if let Some(t) = received_topic {
                        topic = t.to_string();
                    }
                    let (index, total) = match details {
                        Details::Complete => (0, data.len()),
                        Details::InitialChunk(chunk) => (0, chunk.total_data_size),
                        Details::SubsequentChunk(chunk) => {
                            (chunk.current_data_offset, chunk.total_data_size)
                        }
                    };
                    let fragment = Fragment {
                        topic: topic.clone(),
                        payload: data.to_vec(),
                        index,
                        total,
                    };
                    // the receiver is gone once ingestion is over
                    let _ = tx.send(fragment);
                }
                EventPayload::Disconnected => log::warn!("Disconnected from MQTT"),
                _ => {}
            }
        })?;

        connected
            .recv_timeout(timeout)
            .context("MQTT broker did not accept the connection")?;
        log::info!("Connected to MQTT");

        for t in topics {
            client.subscribe(t, QoS::ExactlyOnce)?;
        }

        Ok(Self {
            _client: client,
            fragments,
        })
    }
}
