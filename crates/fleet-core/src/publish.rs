//! Outbound transport seams: broker events and per-message replies.

use std::future::Future;

use bytes::Bytes;

/// Publishes a message body to a broker exchange under a routing key.
pub trait EventPublisher: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn publish<'a>(
    &'a self,
    exchange: &'a str,
    routing_key: &'a str,
    body: Bytes,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

/// Publishes a payload on a pub/sub topic; used for reply channels.
pub trait ReplyPublisher: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn reply<'a>(
    &'a self,
    topic: &'a str,
    payload: Bytes,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

/// A message received from the pub/sub transport.
pub trait InboundMessage: Send + Sync + 'static {
  fn topic(&self) -> &str;
  fn payload(&self) -> &[u8];
}
