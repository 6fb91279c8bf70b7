use crate::config::parse_datetime;
use crate::error::Result;
use crate::protocol::{AirbyteStream, SyncMode};
use futures::stream::BoxStream;
use serde_json::{json, Value};
use std::cmp::Ordering;

/// Lazily produced records; nothing is fetched until the stream is polled.
pub type RecordStream<'a> = BoxStream<'a, Result<Value>>;

/// A named, independently syncable entity exposed by a source.
pub trait Stream: Send + Sync {
    fn name(&self) -> &str;

    fn primary_key(&self) -> Option<Vec<Vec<String>>> {
        None
    }

    /// Field whose value orders records for incremental reads.
    fn cursor_field(&self) -> Option<&str> {
        None
    }

    fn json_schema(&self) -> Result<Value>;

    fn supported_sync_modes(&self) -> Vec<SyncMode> {
        if self.cursor_field().is_some() {
            vec![SyncMode::FullRefresh, SyncMode::Incremental]
        } else {
            vec![SyncMode::FullRefresh]
        }
    }

    fn read_records<'a>(
        &'a self,
        sync_mode: SyncMode,
        stream_state: Option<&'a Value>,
    ) -> RecordStream<'a>;

    /// Folds one emitted record into the stream state. The default keeps the
    /// greatest cursor value seen so far.
    fn get_updated_state(&self, current_state: &Value, latest_record: &Value) -> Value {
        match self.cursor_field() {
            Some(cursor) => max_cursor_state(cursor, current_state, latest_record),
            None => current_state.clone(),
        }
    }

    /// Emit a state checkpoint every N records. `None` checkpoints only at the
    /// end of the stream.
    fn state_checkpoint_interval(&self) -> Option<usize> {
        None
    }

    fn as_airbyte_stream(&self) -> Result<AirbyteStream> {
        let cursor = self.cursor_field();
        Ok(AirbyteStream {
            name: self.name().to_string(),
            json_schema: self.json_schema()?,
            supported_sync_modes: self.supported_sync_modes(),
            source_defined_cursor: cursor.map(|_| true),
            default_cursor_field: cursor.map(|c| vec![c.to_string()]),
            source_defined_primary_key: self.primary_key(),
        })
    }
}

pub fn cursor_value<'a>(record: &'a Value, cursor: &str) -> Option<&'a str> {
    record.get(cursor).and_then(Value::as_str)
}

/// Orders two cursor values as instants when both parse, otherwise as strings.
pub fn compare_cursor(a: &str, b: &str) -> Ordering {
    match (parse_datetime(a), parse_datetime(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

pub fn max_cursor_state(cursor: &str, current_state: &Value, latest_record: &Value) -> Value {
    let latest = cursor_value(latest_record, cursor);
    let current = cursor_value(current_state, cursor);

    let newest = match (current, latest) {
        (Some(c), Some(l)) => {
            if compare_cursor(l, c) == Ordering::Greater {
                l
            } else {
                c
            }
        }
        (Some(c), None) => c,
        (None, Some(l)) => l,
        (None, None) => return current_state.clone(),
    };
    json!({ cursor: newest })
}
