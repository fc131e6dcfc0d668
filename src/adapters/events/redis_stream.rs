//! Redis Streams implementation of the `EventStream` port.
//!
//! Payment and refund outcomes live on two streams read through one
//! consumer group. Each entry carries the JSON event in a `payload` field.
//!
//! ## Delivery
//!
//! - New entries are read with `XREADGROUP ... >`, blocking up to `block_ms`.
//! - Entries stay in the group's pending list until `XACK`.
//! - Every `redelivery_interval` (and once at startup) the consumer reads its
//!   own pending entries with id `0`, which re-offers anything a failed
//!   handler or a crash left unacknowledged.
//! - On the same tick it runs `XAUTOCLAIM` on both streams, taking over
//!   entries that sat unacknowledged on any consumer of the group for longer
//!   than `redelivery_interval`. This recovers work left behind by a consumer
//!   that was renamed or scaled away. Requires Redis 6.2 or newer.
//!
//! The connection is a `ConnectionManager`, which reconnects in the
//! background after Redis restarts. The command that saw the disconnect
//! still fails with `StreamError::Connection`; the ingestion loop retries.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Value};

use crate::config::StreamConfig;
use crate::domain::subscription::EventTopic;
use crate::ports::{EventStream, StreamError, StreamMessage};

/// Field holding the event JSON in each stream entry.
pub const PAYLOAD_FIELD: &str = "payload";

/// Cursor that starts an `XAUTOCLAIM` scan at the head of the pending list.
const CLAIM_START: &str = "0-0";

/// Consumer-group reader over the payment and refund streams.
pub struct RedisEventStream {
    conn: ConnectionManager,
    payment_stream: String,
    refund_stream: String,
    group: String,
    consumer: String,
    block: Duration,
    batch_size: usize,
    redelivery_interval: Duration,
    last_pending_read: Option<Instant>,
    /// Where the next `XAUTOCLAIM` resumes, per stream.
    payment_claim_cursor: String,
    refund_claim_cursor: String,
    buffer: VecDeque<StreamMessage>,
    closed: bool,
}

impl RedisEventStream {
    /// Connect and make sure the consumer group exists on both streams.
    pub async fn connect(config: &StreamConfig) -> Result<Self, StreamError> {
        let client = redis::Client::open(config.redis_url.as_str()).map_err(map_redis_error)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;

        let mut stream = Self {
            conn,
            payment_stream: config.payment_stream.clone(),
            refund_stream: config.refund_stream.clone(),
            group: config.group.clone(),
            consumer: config.consumer.clone(),
            block: config.block(),
            batch_size: config.batch_size,
            redelivery_interval: config.redelivery_interval(),
            last_pending_read: None,
            payment_claim_cursor: CLAIM_START.to_string(),
            refund_claim_cursor: CLAIM_START.to_string(),
            buffer: VecDeque::new(),
            closed: false,
        };
        stream.ensure_group().await?;

        tracing::info!(
            payment_stream = %stream.payment_stream,
            refund_stream = %stream.refund_stream,
            group = %stream.group,
            consumer = %stream.consumer,
            "Connected to event streams"
        );
        Ok(stream)
    }

    async fn ensure_group(&mut self) -> Result<(), StreamError> {
        for key in [self.payment_stream.clone(), self.refund_stream.clone()] {
            let created: Result<(), redis::RedisError> = self
                .conn
                .xgroup_create_mkstream(&key, &self.group, "0")
                .await;
            match created {
                Ok(()) => {
                    tracing::info!(stream = %key, group = %self.group, "Created consumer group")
                }
                Err(e) if e.code() == Some("BUSYGROUP") => {}
                Err(e) => return Err(map_redis_error(e)),
            }
        }
        Ok(())
    }

    fn topic_for(&self, key: &str) -> Option<EventTopic> {
        topic_for_key(key, &self.payment_stream, &self.refund_stream)
    }

    fn stream_for(&self, topic: EventTopic) -> &str {
        match topic {
            EventTopic::Payment => &self.payment_stream,
            EventTopic::Refund => &self.refund_stream,
        }
    }

    fn pending_read_due(&self) -> bool {
        self.last_pending_read
            .map_or(true, |at| at.elapsed() >= self.redelivery_interval)
    }

    /// Read one batch into the buffer. `pending` re-reads this consumer's
    /// unacknowledged entries instead of new ones.
    async fn fill(&mut self, pending: bool) -> Result<(), StreamError> {
        let keys = [self.payment_stream.as_str(), self.refund_stream.as_str()];
        let id = if pending { "0" } else { ">" };
        let ids = [id, id];

        let mut options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(self.batch_size);
        if !pending {
            options = options.block(self.block.as_millis() as usize);
        }

        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&keys, &ids, &options)
            .await
            .map_err(map_redis_error)?;

        if let Some(reply) = reply {
            let messages = messages_from_reply(reply, |key| self.topic_for(key));
            if pending && !messages.is_empty() {
                tracing::info!(count = messages.len(), "Redelivering pending stream entries");
            }
            self.buffer.extend(messages);
        }
        Ok(())
    }

    /// Take over entries idle on any group member for at least
    /// `redelivery_interval`, one page per stream.
    async fn claim_idle(&mut self) -> Result<(), StreamError> {
        for topic in [EventTopic::Payment, EventTopic::Refund] {
            let key = self.stream_for(topic).to_string();
            let cursor = match topic {
                EventTopic::Payment => self.payment_claim_cursor.clone(),
                EventTopic::Refund => self.refund_claim_cursor.clone(),
            };

            let reply: Value = redis::cmd("XAUTOCLAIM")
                .arg(&key)
                .arg(&self.group)
                .arg(&self.consumer)
                .arg(self.redelivery_interval.as_millis() as u64)
                .arg(&cursor)
                .arg("COUNT")
                .arg(self.batch_size)
                .query_async(&mut self.conn)
                .await
                .map_err(map_redis_error)?;

            let (next_cursor, messages) = messages_from_autoclaim(topic, reply)?;
            if !messages.is_empty() {
                tracing::info!(
                    stream = %key,
                    count = messages.len(),
                    "Claimed idle entries from other consumers"
                );
            }
            match topic {
                EventTopic::Payment => self.payment_claim_cursor = next_cursor,
                EventTopic::Refund => self.refund_claim_cursor = next_cursor,
            }
            self.buffer.extend(messages);
        }
        Ok(())
    }
}

#[async_trait]
impl EventStream for RedisEventStream {
    async fn next(&mut self) -> Result<Option<StreamMessage>, StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        if let Some(message) = self.buffer.pop_front() {
            return Ok(Some(message));
        }

        if self.pending_read_due() {
            self.last_pending_read = Some(Instant::now());
            self.fill(true).await?;
            self.claim_idle().await?;
            if let Some(message) = self.buffer.pop_front() {
                return Ok(Some(message));
            }
        }

        self.fill(false).await?;
        Ok(self.buffer.pop_front())
    }

    async fn ack(&mut self, message: &StreamMessage) -> Result<(), StreamError> {
        let key = self.stream_for(message.topic).to_string();
        let _: i64 = self
            .conn
            .xack(&key, &self.group, &[&message.delivery_id])
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.closed = true;
        if !self.buffer.is_empty() {
            tracing::info!(
                count = self.buffer.len(),
                "Closing stream with buffered entries, they stay pending"
            );
        }
        self.buffer.clear();
        Ok(())
    }
}

fn topic_for_key(key: &str, payment_stream: &str, refund_stream: &str) -> Option<EventTopic> {
    if key == payment_stream {
        Some(EventTopic::Payment)
    } else if key == refund_stream {
        Some(EventTopic::Refund)
    } else {
        None
    }
}

/// Flatten a read reply into messages. Entries without a payload (for
/// example, trimmed entries still listed as pending) get an empty payload
/// so the consumer discards and acknowledges them.
fn messages_from_reply(
    reply: StreamReadReply,
    topic_for: impl Fn(&str) -> Option<EventTopic>,
) -> Vec<StreamMessage> {
    let mut messages = Vec::new();
    for stream in reply.keys {
        let Some(topic) = topic_for(&stream.key) else {
            tracing::warn!(stream = %stream.key, "Ignoring entries from unknown stream");
            continue;
        };
        for entry in stream.ids {
            let payload: Vec<u8> = entry.get(PAYLOAD_FIELD).unwrap_or_default();
            messages.push(StreamMessage {
                topic,
                delivery_id: entry.id,
                payload,
            });
        }
    }
    messages
}

/// Parse an `XAUTOCLAIM` reply: `[next-cursor, [[id, [field, value, ...]], ...], ...]`.
///
/// Entries deleted from the stream come back as nil (Redis 6.2) or are
/// listed separately (Redis 7); either way they are skipped.
fn messages_from_autoclaim(
    topic: EventTopic,
    reply: Value,
) -> Result<(String, Vec<StreamMessage>), StreamError> {
    let malformed = || StreamError::Protocol("Unexpected XAUTOCLAIM reply".to_string());

    let Value::Bulk(parts) = reply else {
        return Err(malformed());
    };
    let mut parts = parts.into_iter();
    let cursor: String = parts
        .next()
        .and_then(|v| redis::from_redis_value(&v).ok())
        .ok_or_else(malformed)?;
    let entries = match parts.next() {
        Some(Value::Bulk(entries)) => entries,
        _ => return Err(malformed()),
    };

    let mut messages = Vec::new();
    for entry in entries {
        let Value::Bulk(fields) = entry else {
            continue;
        };
        let mut fields = fields.into_iter();
        let Some(delivery_id) = fields
            .next()
            .and_then(|v| redis::from_redis_value::<String>(&v).ok())
        else {
            continue;
        };
        let payload = match fields.next() {
            Some(Value::Bulk(pairs)) => payload_from_pairs(pairs),
            _ => Vec::new(),
        };
        messages.push(StreamMessage {
            topic,
            delivery_id,
            payload,
        });
    }
    Ok((cursor, messages))
}

fn payload_from_pairs(pairs: Vec<Value>) -> Vec<u8> {
    pairs
        .chunks(2)
        .find_map(|pair| match pair {
            [name, value] => {
                let name: String = redis::from_redis_value(name).ok()?;
                if name == PAYLOAD_FIELD {
                    redis::from_redis_value(value).ok()
                } else {
                    None
                }
            }
            _ => None,
        })
        .unwrap_or_default()
}

fn map_redis_error(e: redis::RedisError) -> StreamError {
    if e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error() || e.is_timeout() {
        StreamError::Connection(e.to_string())
    } else {
        StreamError::Protocol(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::streams::{StreamId, StreamKey};
    use std::collections::HashMap;

    fn entry(id: &str, payload: Option<&[u8]>) -> StreamId {
        let mut map = HashMap::new();
        if let Some(payload) = payload {
            map.insert(PAYLOAD_FIELD.to_string(), redis::Value::Data(payload.to_vec()));
        }
        StreamId {
            id: id.to_string(),
            map,
        }
    }

    fn topics(key: &str) -> Option<EventTopic> {
        topic_for_key(key, "billing.payments", "billing.refunds")
    }

    #[test]
    fn keys_map_to_topics() {
        assert_eq!(topics("billing.payments"), Some(EventTopic::Payment));
        assert_eq!(topics("billing.refunds"), Some(EventTopic::Refund));
        assert_eq!(topics("billing.other"), None);
    }

    #[test]
    fn reply_is_flattened_in_stream_order() {
        let reply = StreamReadReply {
            keys: vec![
                StreamKey {
                    key: "billing.payments".to_string(),
                    ids: vec![
                        entry("1-0", Some(b"{\"a\":1}")),
                        entry("2-0", Some(b"{\"a\":2}")),
                    ],
                },
                StreamKey {
                    key: "billing.refunds".to_string(),
                    ids: vec![entry("1-1", Some(b"{\"b\":1}"))],
                },
            ],
        };

        let messages = messages_from_reply(reply, topics);

        let summary: Vec<_> = messages
            .iter()
            .map(|m| (m.topic, m.delivery_id.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (EventTopic::Payment, "1-0"),
                (EventTopic::Payment, "2-0"),
                (EventTopic::Refund, "1-1"),
            ]
        );
        assert_eq!(messages[0].payload, b"{\"a\":1}".to_vec());
    }

    #[test]
    fn entry_without_payload_gets_empty_payload() {
        let reply = StreamReadReply {
            keys: vec![StreamKey {
                key: "billing.refunds".to_string(),
                ids: vec![entry("9-0", None)],
            }],
        };

        let messages = messages_from_reply(reply, topics);

        assert_eq!(messages.len(), 1);
        assert!(messages[0].payload.is_empty());
    }

    #[test]
    fn unknown_stream_is_skipped() {
        let reply = StreamReadReply {
            keys: vec![StreamKey {
                key: "elsewhere".to_string(),
                ids: vec![entry("1-0", Some(b"{}"))],
            }],
        };

        assert!(messages_from_reply(reply, topics).is_empty());
    }

    fn data(s: &str) -> Value {
        Value::Data(s.as_bytes().to_vec())
    }

    fn claimed(id: &str, payload: &str) -> Value {
        Value::Bulk(vec![
            data(id),
            Value::Bulk(vec![data("source"), data("billing"), data(PAYLOAD_FIELD), data(payload)]),
        ])
    }

    #[test]
    fn autoclaim_reply_yields_cursor_and_claimed_entries() {
        let reply = Value::Bulk(vec![
            data("7-0"),
            Value::Bulk(vec![claimed("5-0", "{\"a\":1}"), claimed("6-0", "{\"a\":2}")]),
            Value::Bulk(vec![]),
        ]);

        let (cursor, messages) = messages_from_autoclaim(EventTopic::Payment, reply).unwrap();

        assert_eq!(cursor, "7-0");
        let ids: Vec<_> = messages.iter().map(|m| m.delivery_id.as_str()).collect();
        assert_eq!(ids, vec!["5-0", "6-0"]);
        assert!(messages.iter().all(|m| m.topic == EventTopic::Payment));
        assert_eq!(messages[0].payload, b"{\"a\":1}".to_vec());
    }

    #[test]
    fn autoclaim_skips_deleted_entries() {
        let reply = Value::Bulk(vec![
            data("0-0"),
            Value::Bulk(vec![Value::Nil, claimed("9-0", "{}")]),
        ]);

        let (cursor, messages) = messages_from_autoclaim(EventTopic::Refund, reply).unwrap();

        assert_eq!(cursor, CLAIM_START);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].delivery_id, "9-0");
    }

    #[test]
    fn autoclaim_entry_without_payload_gets_empty_payload() {
        let reply = Value::Bulk(vec![
            data("0-0"),
            Value::Bulk(vec![Value::Bulk(vec![
                data("3-0"),
                Value::Bulk(vec![data("other"), data("x")]),
            ])]),
        ]);

        let (_, messages) = messages_from_autoclaim(EventTopic::Payment, reply).unwrap();

        assert!(messages[0].payload.is_empty());
    }

    #[test]
    fn autoclaim_rejects_unexpected_reply() {
        let err = messages_from_autoclaim(EventTopic::Payment, Value::Okay).unwrap_err();
        assert!(matches!(err, StreamError::Protocol(_)));
    }
}
