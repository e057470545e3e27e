//! KafkaSink - produce every payload to one topic
//!
//! The producer itself needs the `kafka` feature (librdkafka). Parameter
//! parsing is always available so manifests can be checked without it.

use std::collections::HashMap;
use std::time::Duration;

use contracts::CapturedEvent;
use serde_json::Value;

const DEFAULT_PARTITIONS: i32 = 3;
const DEFAULT_REPLICATION_FACTOR: i32 = 1;

/// Configuration for KafkaSink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaSinkConfig {
    /// `host:port` seeds, in configuration order
    pub bootstrap_servers: Vec<String>,
    pub topic: String,
    /// Used only when the topic has to be created
    pub partitions: i32,
    pub replication_factor: i32,
    /// Row column whose value becomes the record key; the event id otherwise
    pub key_column: Option<String>,
    /// Upper bound on one synchronous produce
    pub message_timeout: Duration,
    /// Extra librdkafka properties (`client.<property>` params)
    pub client_properties: Vec<(String, String)>,
}

impl KafkaSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let bootstrap_servers: Vec<String> = params
            .get("bootstrap_servers")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if bootstrap_servers.is_empty() {
            return Err("missing 'bootstrap_servers' parameter".to_string());
        }

        let topic = params
            .get("topic")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "missing 'topic' parameter".to_string())?;

        let mut client_properties: Vec<(String, String)> = params
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix("client.")
                    .map(|prop| (prop.to_string(), v.clone()))
            })
            .collect();
        client_properties.sort();

        Ok(Self {
            bootstrap_servers,
            topic,
            partitions: parse_positive(params, "partitions", DEFAULT_PARTITIONS)?,
            replication_factor: parse_positive(
                params,
                "replication_factor",
                DEFAULT_REPLICATION_FACTOR,
            )?,
            key_column: params
                .get("key_column")
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            message_timeout: Duration::from_millis(parse_millis(params, "message_timeout_ms")?),
            client_properties,
        })
    }

    /// Record key for `event`
    ///
    /// String columns are used verbatim, other values as their JSON text. A
    /// missing or null column falls back to the event id.
    pub fn record_key(&self, event: &CapturedEvent) -> String {
        let column = self
            .key_column
            .as_deref()
            .and_then(|column| event.row.get(column));
        match column {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => event.id.to_string(),
            Some(other) => other.to_string(),
        }
    }
}

fn parse_positive(
    params: &HashMap<String, String>,
    key: &str,
    default: i32,
) -> Result<i32, String> {
    match params.get(key) {
        Some(raw) => match raw.trim().parse::<i32>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(format!("'{key}' must be a positive integer, got '{raw}'")),
        },
        None => Ok(default),
    }
}

fn parse_millis(params: &HashMap<String, String>, key: &str) -> Result<u64, String> {
    match params.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("'{key}' must be a non-negative integer, got '{raw}'")),
        None => Ok(30_000),
    }
}

#[cfg(feature = "kafka")]
pub use self::producer::KafkaSink;

#[cfg(feature = "kafka")]
mod producer {
    use std::collections::HashMap;

    use contracts::{CapturedEvent, ContractError, DataSink};
    use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
    use rdkafka::client::DefaultClientContext;
    use rdkafka::config::ClientConfig;
    use rdkafka::error::RDKafkaErrorCode;
    use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
    use rdkafka::util::Timeout;
    use tracing::{debug, info, instrument};

    use super::KafkaSinkConfig;

    /// Sink that produces each payload synchronously to a Kafka topic
    ///
    /// The topic is created on the first publish when missing, with the
    /// configured partitions and replication factor. An existing topic is
    /// left alone.
    pub struct KafkaSink {
        name: String,
        config: KafkaSinkConfig,
        client_config: ClientConfig,
        producer: FutureProducer,
        topic_ready: bool,
    }

    impl KafkaSink {
        pub fn new(name: impl Into<String>, config: KafkaSinkConfig) -> Result<Self, String> {
            let mut client_config = ClientConfig::new();
            client_config
                .set("bootstrap.servers", config.bootstrap_servers.join(","))
                .set(
                    "message.timeout.ms",
                    config.message_timeout.as_millis().to_string(),
                );
            for (key, value) in &config.client_properties {
                client_config.set(key, value);
            }

            let producer: FutureProducer = client_config
                .create()
                .map_err(|e| format!("failed to create Kafka producer: {e}"))?;

            Ok(Self {
                name: name.into(),
                config,
                client_config,
                producer,
                topic_ready: false,
            })
        }

        /// Create from params map (for factory)
        pub fn from_params(
            name: impl Into<String>,
            params: &HashMap<String, String>,
        ) -> Result<Self, String> {
            let config = KafkaSinkConfig::from_params(params)?;
            Self::new(name, config)
        }

        async fn ensure_topic(&mut self) -> Result<(), ContractError> {
            if self.topic_ready {
                return Ok(());
            }

            let admin: AdminClient<DefaultClientContext> =
                self.client_config.create().map_err(|e| {
                    ContractError::sink_connection(&self.name, format!("admin client: {e}"))
                })?;
            let topic = NewTopic::new(
                &self.config.topic,
                self.config.partitions,
                TopicReplication::Fixed(self.config.replication_factor),
            );
            let options = AdminOptions::new().operation_timeout(Some(self.config.message_timeout));

            let results = admin
                .create_topics(&[topic], &options)
                .await
                .map_err(|e| ContractError::sink_connection(&self.name, e.to_string()))?;
            for result in results {
                match result {
                    Ok(topic) => info!(sink = %self.name, topic = %topic, "Kafka topic created"),
                    Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                        debug!(sink = %self.name, topic = %topic, "Kafka topic already exists")
                    }
                    Err((topic, code)) => {
                        return Err(ContractError::sink_connection(
                            &self.name,
                            format!("cannot create topic '{topic}': {code}"),
                        ));
                    }
                }
            }

            self.topic_ready = true;
            Ok(())
        }
    }

    impl DataSink for KafkaSink {
        fn name(&self) -> &str {
            &self.name
        }

        #[instrument(
            name = "kafka_sink_publish",
            skip(self, event, payload),
            fields(sink = %self.name, event_id = event.id)
        )]
        async fn publish(
            &mut self,
            event: &CapturedEvent,
            payload: &[u8],
        ) -> Result<(), ContractError> {
            self.ensure_topic().await?;

            let key = self.config.record_key(event);
            let record = FutureRecord::to(&self.config.topic)
                .key(key.as_str())
                .payload(payload);

            match self
                .producer
                .send(record, Timeout::After(self.config.message_timeout))
                .await
            {
                Ok(_) => {
                    debug!(
                        sink = %self.name,
                        event_id = event.id,
                        topic = %self.config.topic,
                        key = %key,
                        "Record produced"
                    );
                    Ok(())
                }
                Err((e, _)) => Err(ContractError::sink_write(&self.name, e.to_string())),
            }
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            self.producer
                .flush(Timeout::After(self.config.message_timeout))
                .map_err(|e| ContractError::sink_write(&self.name, format!("flush: {e}")))
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            info!(sink = %self.name, topic = %self.config.topic, "KafkaSink closed");
            Ok(())
        }
    }
}
