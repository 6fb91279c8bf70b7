use crate::{
    error::Result,
    metrics::Metrics,
    protocol::{write_message, AirbyteMessage, ConfiguredAirbyteCatalog, SyncMode},
    stream::Stream,
};
use futures::StreamExt;
use serde_json::{json, Map, Value};
use std::io::Write;
use tracing::{info, warn};

/// Reads every configured stream in catalog order and writes RECORD and
/// STATE messages to the output.
pub struct ReadJob {
    catalog: ConfiguredAirbyteCatalog,
    state: Map<String, Value>,
    metrics: Metrics,
}

impl ReadJob {
    /// `state` is the per-stream map emitted by a previous read.
    pub fn new(catalog: ConfiguredAirbyteCatalog, state: Option<Value>) -> Self {
        let state = match state {
            Some(Value::Object(map)) => map,
            None | Some(Value::Null) => Map::new(),
            Some(other) => {
                warn!(state = %other, "Ignoring state that is not a per-stream object");
                Map::new()
            }
        };
        Self {
            catalog,
            state,
            metrics: Metrics::new(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub async fn run(
        &mut self,
        streams: &[Box<dyn Stream>],
        out: &mut (dyn Write + Send),
    ) -> Result<()> {
        info!(streams = self.catalog.streams.len(), "Starting read");
        self.metrics.start_job().await;

        let configured: Vec<(String, SyncMode)> = self
            .catalog
            .streams
            .iter()
            .map(|c| (c.stream.name.clone(), c.sync_mode))
            .collect();

        for (name, sync_mode) in configured {
            let Some(stream) = streams.iter().find(|s| s.name() == name) else {
                warn!(stream = %name, "Stream is not provided by this source, skipping");
                continue;
            };

            if let Err(e) = self.read_stream(stream.as_ref(), sync_mode, out).await {
                self.metrics.record_error(&name).await;
                return Err(e);
            }
        }

        self.metrics.end_job().await;
        self.metrics.print_summary().await;
        Ok(())
    }

    async fn read_stream(
        &mut self,
        stream: &dyn Stream,
        sync_mode: SyncMode,
        out: &mut (dyn Write + Send),
    ) -> Result<()> {
        let name = stream.name().to_string();
        let incremental = match sync_mode {
            SyncMode::Incremental if stream.cursor_field().is_some() => true,
            SyncMode::Incremental => {
                warn!(stream = %name, "Stream has no cursor, falling back to full refresh");
                false
            }
            SyncMode::FullRefresh => false,
        };
        let mode = if incremental {
            SyncMode::Incremental
        } else {
            SyncMode::FullRefresh
        };

        let stream_state = if incremental {
            self.state.get(&name).cloned()
        } else {
            None
        };
        let mut current_state = stream_state.clone().unwrap_or_else(|| json!({}));
        info!(stream = %name, mode = ?mode, state = ?stream_state, "Reading stream");

        let checkpoint_interval = stream.state_checkpoint_interval();
        let mut count: u64 = 0;
        let mut records = stream.read_records(mode, stream_state.as_ref());

        while let Some(record) = records.next().await {
            let record = record?;
            if incremental {
                current_state = stream.get_updated_state(&current_state, &record);
            }
            write_message(out, &AirbyteMessage::record(&name, record))?;
            count += 1;

            if let (true, Some(interval)) = (incremental, checkpoint_interval) {
                if interval > 0 && count % interval as u64 == 0 {
                    self.checkpoint(&name, &current_state, out).await?;
                }
            }
        }
        drop(records);

        if incremental {
            self.checkpoint(&name, &current_state, out).await?;
        }
        self.metrics.record_stream(&name, count).await;
        Ok(())
    }

    async fn checkpoint(
        &mut self,
        name: &str,
        stream_state: &Value,
        out: &mut (dyn Write + Send),
    ) -> Result<()> {
        self.state.insert(name.to_string(), stream_state.clone());
        write_message(out, &AirbyteMessage::state(Value::Object(self.state.clone())))?;
        self.metrics.record_state().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::{AirbyteStream, ConfiguredAirbyteStream, DestinationSyncMode};
    use crate::stream::{compare_cursor, RecordStream};
    use futures::stream;
    use std::cmp::Ordering;

    struct MemoryStream {
        name: &'static str,
        cursor: Option<&'static str>,
        records: Vec<Value>,
        checkpoint_every: Option<usize>,
        fail: bool,
    }

    impl MemoryStream {
        fn new(name: &'static str, cursor: Option<&'static str>, records: Vec<Value>) -> Self {
            Self {
                name,
                cursor,
                records,
                checkpoint_every: None,
                fail: false,
            }
        }
    }

    impl Stream for MemoryStream {
        fn name(&self) -> &str {
            self.name
        }

        fn cursor_field(&self) -> Option<&str> {
            self.cursor
        }

        fn json_schema(&self) -> Result<Value> {
            Ok(json!({"type": "object"}))
        }

        fn state_checkpoint_interval(&self) -> Option<usize> {
            self.checkpoint_every
        }

        fn read_records<'a>(
            &'a self,
            _sync_mode: SyncMode,
            stream_state: Option<&'a Value>,
        ) -> RecordStream<'a> {
            if self.fail {
                return Box::pin(stream::iter(vec![Err(Error::Other("boom".into()))]));
            }
            let lower = stream_state
                .zip(self.cursor)
                .and_then(|(state, cursor)| state.get(cursor))
                .and_then(Value::as_str)
                .map(str::to_string);
            let cursor = self.cursor;
            let records = self.records.clone().into_iter().filter(move |r| {
                match (&lower, cursor) {
                    (Some(lower), Some(cursor)) => r[cursor]
                        .as_str()
                        .map(|v| compare_cursor(v, lower) == Ordering::Greater)
                        .unwrap_or(false),
                    _ => true,
                }
            });
            Box::pin(stream::iter(records.map(Ok)))
        }
    }

    fn configured(name: &str, sync_mode: SyncMode) -> ConfiguredAirbyteStream {
        ConfiguredAirbyteStream {
            stream: AirbyteStream {
                name: name.to_string(),
                json_schema: json!({}),
                supported_sync_modes: vec![SyncMode::FullRefresh, SyncMode::Incremental],
                source_defined_cursor: None,
                default_cursor_field: None,
                source_defined_primary_key: None,
            },
            sync_mode,
            destination_sync_mode: DestinationSyncMode::Append,
            cursor_field: None,
            primary_key: None,
        }
    }

    fn messages(out: Vec<u8>) -> Vec<Value> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn events() -> Box<dyn Stream> {
        Box::new(MemoryStream::new(
            "events",
            Some("timestamp"),
            vec![
                json!({"id": 1, "timestamp": "2021-01-02T00:00:00Z"}),
                json!({"id": 2, "timestamp": "2021-01-03T00:00:00Z"}),
            ],
        ))
    }

    #[tokio::test]
    async fn test_full_refresh_emits_records_only() {
        let streams = vec![Box::new(MemoryStream::new(
            "cohorts",
            None,
            vec![json!({"id": 1}), json!({"id": 2})],
        )) as Box<dyn Stream>];
        let catalog = ConfiguredAirbyteCatalog {
            streams: vec![configured("cohorts", SyncMode::FullRefresh)],
        };

        let mut out = Vec::new();
        let mut job = ReadJob::new(catalog, None);
        job.run(&streams, &mut out).await.unwrap();

        let messages = messages(out);
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m["type"] == "RECORD"));
        assert_eq!(messages[1]["record"]["data"]["id"], 2);
        assert_eq!(job.metrics().records_read("cohorts").await, 2);
    }

    #[tokio::test]
    async fn test_incremental_emits_final_state() {
        let streams = vec![events()];
        let catalog = ConfiguredAirbyteCatalog {
            streams: vec![configured("events", SyncMode::Incremental)],
        };

        let mut out = Vec::new();
        ReadJob::new(catalog, None)
            .run(&streams, &mut out)
            .await
            .unwrap();

        let messages = messages(out);
        assert_eq!(messages.len(), 3);
        assert_eq!(
            messages[2],
            json!({
                "type": "STATE",
                "state": {"data": {"events": {"timestamp": "2021-01-03T00:00:00Z"}}}
            })
        );
    }

    #[tokio::test]
    async fn test_incremental_resumes_from_state() {
        let streams = vec![events()];
        let catalog = ConfiguredAirbyteCatalog {
            streams: vec![configured("events", SyncMode::Incremental)],
        };
        let state = json!({
            "events": {"timestamp": "2021-01-02T00:00:00Z"},
            "annotations": {"updated_at": "2021-06-01T00:00:00Z"}
        });

        let mut out = Vec::new();
        ReadJob::new(catalog, Some(state))
            .run(&streams, &mut out)
            .await
            .unwrap();

        let messages = messages(out);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["record"]["data"]["id"], 2);
        // state for streams not read in this run is carried forward
        assert_eq!(
            messages[1]["state"]["data"]["annotations"],
            json!({"updated_at": "2021-06-01T00:00:00Z"})
        );
    }

    #[tokio::test]
    async fn test_non_object_state_reads_from_start() {
        let streams = vec![events()];
        let catalog = ConfiguredAirbyteCatalog {
            streams: vec![configured("events", SyncMode::Incremental)],
        };
        let state = json!([{"type": "STREAM", "stream": {"events": {}}}]);

        let mut out = Vec::new();
        ReadJob::new(catalog, Some(state))
            .run(&streams, &mut out)
            .await
            .unwrap();

        let messages = messages(out);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["record"]["data"]["id"], 1);
        assert_eq!(
            messages[2]["state"]["data"],
            json!({"events": {"timestamp": "2021-01-03T00:00:00Z"}})
        );
    }

    #[tokio::test]
    async fn test_checkpoint_interval() {
        let mut stream = MemoryStream::new(
            "events",
            Some("timestamp"),
            vec![
                json!({"id": 1, "timestamp": "2021-01-02T00:00:00Z"}),
                json!({"id": 2, "timestamp": "2021-01-03T00:00:00Z"}),
                json!({"id": 3, "timestamp": "2021-01-04T00:00:00Z"}),
            ],
        );
        stream.checkpoint_every = Some(2);
        let streams = vec![Box::new(stream) as Box<dyn Stream>];
        let catalog = ConfiguredAirbyteCatalog {
            streams: vec![configured("events", SyncMode::Incremental)],
        };

        let mut out = Vec::new();
        ReadJob::new(catalog, None)
            .run(&streams, &mut out)
            .await
            .unwrap();

        let types: Vec<String> = messages(out)
            .iter()
            .map(|m| m["type"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(types, vec!["RECORD", "RECORD", "STATE", "RECORD", "STATE"]);
    }

    #[tokio::test]
    async fn test_unknown_stream_is_skipped_and_incremental_falls_back() {
        let streams = vec![Box::new(MemoryStream::new("cohorts", None, vec![json!({"id": 1})]))
            as Box<dyn Stream>];
        let catalog = ConfiguredAirbyteCatalog {
            streams: vec![
                configured("events_sessions", SyncMode::FullRefresh),
                configured("cohorts", SyncMode::Incremental),
            ],
        };

        let mut out = Vec::new();
        ReadJob::new(catalog, None)
            .run(&streams, &mut out)
            .await
            .unwrap();

        let messages = messages(out);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["type"], "RECORD");
    }

    #[tokio::test]
    async fn test_stream_error_aborts_read() {
        let mut failing = MemoryStream::new("persons", None, vec![]);
        failing.fail = true;
        let streams = vec![Box::new(failing) as Box<dyn Stream>];
        let catalog = ConfiguredAirbyteCatalog {
            streams: vec![configured("persons", SyncMode::FullRefresh)],
        };

        let mut out = Vec::new();
        let err = ReadJob::new(catalog, None)
            .run(&streams, &mut out)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
