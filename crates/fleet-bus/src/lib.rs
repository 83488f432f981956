//! In-process message bus standing in for the device broker and the event
//! broker.
//!
//! Two delivery styles share one [`Bus`]:
//!
//! - **Topics.** MQTT-style publish/subscribe with `+`/`#` filters, used
//!   for inbound location reports and their replies.
//! - **Exchanges.** Named exchanges with direct routing-key bindings, used
//!   for outbound proximity events.
//!
//! Every subscription is a bounded channel; a slow subscriber applies
//! backpressure to publishers rather than dropping messages.

#![allow(async_fn_in_trait)]

mod topic;

pub mod error;

use std::{
  collections::{HashMap, HashSet},
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, PoisonError, RwLock,
  },
};

use bytes::Bytes;
use fleet_core::publish::{EventPublisher, InboundMessage, ReplyPublisher};
use tokio::sync::mpsc;
use tracing::trace;

pub use error::{Error, Result};
pub use topic::TopicFilter;

/// Default per-subscription queue depth.
pub const DEFAULT_CAPACITY: usize = 1024;

/// A message published on a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
  pub topic:   String,
  pub payload: Bytes,
}

/// A message routed through an exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
  pub exchange:    String,
  pub routing_key: String,
  pub body:        Bytes,
}

impl InboundMessage for Message {
  fn topic(&self) -> &str { &self.topic }

  fn payload(&self) -> &[u8] { &self.payload }
}

struct Subscription {
  filter: TopicFilter,
  tx:     mpsc::Sender<Message>,
}

struct Binding {
  routing_key: String,
  tx:          mpsc::Sender<Delivery>,
}

#[derive(Default)]
struct Routes {
  subscriptions: Vec<Subscription>,
  exchanges:     HashMap<String, Vec<Binding>>,
}

struct Inner {
  routes:   RwLock<Routes>,
  closed:   AtomicBool,
  capacity: usize,
}

// ─── Bus ─────────────────────────────────────────────────────────────────────

/// Handle to a shared bus. Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct Bus {
  inner: Arc<Inner>,
}

impl Default for Bus {
  fn default() -> Self { Self::new(DEFAULT_CAPACITY) }
}

impl Bus {
  /// Create a bus whose subscriptions each buffer up to `capacity` messages.
  pub fn new(capacity: usize) -> Self {
    Self {
      inner: Arc::new(Inner {
        routes:   RwLock::new(Routes::default()),
        closed:   AtomicBool::new(false),
        capacity: capacity.max(1),
      }),
    }
  }

  pub fn is_closed(&self) -> bool { self.inner.closed.load(Ordering::Acquire) }

  /// Close the bus. Every receiver drains what is already queued and then
  /// yields `None`; further publishes fail with [`Error::Closed`].
  pub fn close(&self) {
    self.inner.closed.store(true, Ordering::Release);
    let mut routes = self.write_routes();
    routes.subscriptions.clear();
    routes.exchanges.clear();
  }

  // ── Topics ────────────────────────────────────────────────────────────────

  /// Subscribe to every topic matching `filter`.
  pub fn subscribe(&self, filter: &str) -> Result<mpsc::Receiver<Message>> {
    let filter = TopicFilter::parse(filter)?;
    if self.is_closed() {
      return Err(Error::Closed);
    }
    let (tx, rx) = mpsc::channel(self.inner.capacity);
    self.write_routes().subscriptions.push(Subscription { filter, tx });
    Ok(rx)
  }

  /// Drop every subscription made with exactly `filter`. Their receivers
  /// drain what is already queued and then yield `None`.
  pub fn unsubscribe(&self, filter: &str) -> usize {
    let mut routes = self.write_routes();
    let before = routes.subscriptions.len();
    routes.subscriptions.retain(|s| s.filter.as_str() != filter);
    before - routes.subscriptions.len()
  }

  /// Publish `payload` on `topic`. Returns how many subscribers received it.
  pub async fn publish(&self, topic: &str, payload: Bytes) -> Result<usize> {
    crate::topic::validate_topic(topic)?;
    if self.is_closed() {
      return Err(Error::Closed);
    }

    let targets: Vec<mpsc::Sender<Message>> = self
      .read_routes()
      .subscriptions
      .iter()
      .filter(|s| s.filter.matches(topic))
      .map(|s| s.tx.clone())
      .collect();

    let mut delivered = 0;
    let mut gone = false;
    for tx in targets {
      let message = Message { topic: topic.to_owned(), payload: payload.clone() };
      match tx.send(message).await {
        Ok(()) => delivered += 1,
        Err(_) => gone = true,
      }
    }
    if gone {
      self.prune();
    }

    trace!(topic, delivered, "published");
    Ok(delivered)
  }

  // ── Exchanges ─────────────────────────────────────────────────────────────

  /// Declare an exchange. Declaring an existing exchange is a no-op.
  pub fn declare_exchange(&self, name: &str) -> Result<()> {
    if self.is_closed() {
      return Err(Error::Closed);
    }
    self.write_routes().exchanges.entry(name.to_owned()).or_default();
    Ok(())
  }

  /// Bind a new queue to `exchange` for messages whose routing key equals
  /// `routing_key`.
  pub fn bind(&self, exchange: &str, routing_key: &str) -> Result<mpsc::Receiver<Delivery>> {
    if self.is_closed() {
      return Err(Error::Closed);
    }
    let mut routes = self.write_routes();
    let bindings = routes
      .exchanges
      .get_mut(exchange)
      .ok_or_else(|| Error::UnknownExchange(exchange.to_owned()))?;
    let (tx, rx) = mpsc::channel(self.inner.capacity);
    bindings.push(Binding { routing_key: routing_key.to_owned(), tx });
    Ok(rx)
  }

  /// Route `body` through `exchange`. Returns how many queues received it;
  /// a message with no matching binding is dropped, as a broker would.
  pub async fn publish_to_exchange(
    &self,
    exchange: &str,
    routing_key: &str,
    body: Bytes,
  ) -> Result<usize> {
    if self.is_closed() {
      return Err(Error::Closed);
    }

    let targets: Vec<mpsc::Sender<Delivery>> = {
      let routes = self.read_routes();
      let bindings = routes
        .exchanges
        .get(exchange)
        .ok_or_else(|| Error::UnknownExchange(exchange.to_owned()))?;
      bindings
        .iter()
        .filter(|b| b.routing_key == routing_key)
        .map(|b| b.tx.clone())
        .collect()
    };

    let mut delivered = 0;
    let mut gone = false;
    for tx in targets {
      let delivery = Delivery {
        exchange:    exchange.to_owned(),
        routing_key: routing_key.to_owned(),
        body:        body.clone(),
      };
      match tx.send(delivery).await {
        Ok(()) => delivered += 1,
        Err(_) => gone = true,
      }
    }
    if gone {
      self.prune();
    }

    trace!(exchange, routing_key, delivered, "routed");
    Ok(delivered)
  }

  // ── Internals ─────────────────────────────────────────────────────────────

  /// Drop subscriptions and bindings whose receiver has gone away.
  fn prune(&self) {
    let mut routes = self.write_routes();
    routes.subscriptions.retain(|s| !s.tx.is_closed());
    for bindings in routes.exchanges.values_mut() {
      bindings.retain(|b| !b.tx.is_closed());
    }
  }

  /// Distinct filters with at least one live subscriber.
  pub fn filters(&self) -> Vec<String> {
    let routes = self.read_routes();
    let unique: HashSet<&str> = routes
      .subscriptions
      .iter()
      .filter(|s| !s.tx.is_closed())
      .map(|s| s.filter.as_str())
      .collect();
    let mut out: Vec<String> = unique.into_iter().map(str::to_owned).collect();
    out.sort();
    out
  }

  fn read_routes(&self) -> std::sync::RwLockReadGuard<'_, Routes> {
    self.inner.routes.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write_routes(&self) -> std::sync::RwLockWriteGuard<'_, Routes> {
    self.inner.routes.write().unwrap_or_else(PoisonError::into_inner)
  }
}

// ─── Publisher impls ─────────────────────────────────────────────────────────

impl EventPublisher for Bus {
  type Error = Error;

  async fn publish(&self, exchange: &str, routing_key: &str, body: Bytes) -> Result<()> {
    self.publish_to_exchange(exchange, routing_key, body).await.map(|_| ())
  }
}

impl ReplyPublisher for Bus {
  type Error = Error;

  async fn reply(&self, topic: &str, payload: Bytes) -> Result<()> {
    Bus::publish(self, topic, payload).await.map(|_| ())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn wildcard_subscription_receives_matching_topics() {
    let bus = Bus::default();
    let mut rx = bus.subscribe("fleet/vehicle/+/location").unwrap();

    let n = bus
      .publish("fleet/vehicle/V1/location", Bytes::from_static(b"{}"))
      .await
      .unwrap();
    assert_eq!(n, 1);
    let n = bus
      .publish("fleet/vehicle/V1/location/response", Bytes::from_static(b"{}"))
      .await
      .unwrap();
    assert_eq!(n, 0);

    let msg = rx.recv().await.unwrap();
    assert_eq!(msg.topic, "fleet/vehicle/V1/location");
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn dropped_subscriber_is_pruned() {
    let bus = Bus::default();
    let rx = bus.subscribe("a/#").unwrap();
    drop(rx);

    assert_eq!(bus.publish("a/b", Bytes::new()).await.unwrap(), 0);
    assert!(bus.filters().is_empty());
  }

  #[tokio::test]
  async fn unsubscribe_ends_only_that_filter() {
    let bus = Bus::default();
    let mut a = bus.subscribe("a/+").unwrap();
    let mut b = bus.subscribe("b/+").unwrap();
    bus.publish("a/1", Bytes::from_static(b"x")).await.unwrap();

    assert_eq!(bus.unsubscribe("a/+"), 1);
    assert_eq!(a.recv().await.unwrap().topic, "a/1");
    assert!(a.recv().await.is_none());

    assert_eq!(bus.publish("b/1", Bytes::new()).await.unwrap(), 1);
    assert!(b.recv().await.is_some());
  }

  #[tokio::test]
  async fn exchange_routes_by_key() {
    let bus = Bus::default();
    assert!(matches!(
      bus.bind("fleet", "geofence"),
      Err(Error::UnknownExchange(_))
    ));

    bus.declare_exchange("fleet").unwrap();
    let mut geofence = bus.bind("fleet", "geofence").unwrap();
    let mut other = bus.bind("fleet", "other").unwrap();

    let n = bus
      .publish_to_exchange("fleet", "geofence", Bytes::from_static(b"x"))
      .await
      .unwrap();
    assert_eq!(n, 1);

    let d = geofence.recv().await.unwrap();
    assert_eq!((d.exchange.as_str(), d.routing_key.as_str()), ("fleet", "geofence"));
    assert_eq!(d.body, Bytes::from_static(b"x"));
    assert!(other.try_recv().is_err());
  }

  #[tokio::test]
  async fn publish_to_undeclared_exchange_fails() {
    let bus = Bus::default();
    let err = EventPublisher::publish(&bus, "nope", "k", Bytes::new()).await.unwrap_err();
    assert!(matches!(err, Error::UnknownExchange(_)));
  }

  #[tokio::test]
  async fn close_ends_receivers() {
    let bus = Bus::default();
    let mut rx = bus.subscribe("t").unwrap();
    bus.publish("t", Bytes::from_static(b"1")).await.unwrap();
    bus.close();

    assert_eq!(rx.recv().await.unwrap().payload, Bytes::from_static(b"1"));
    assert!(rx.recv().await.is_none());
    assert!(matches!(bus.publish("t", Bytes::new()).await, Err(Error::Closed)));
  }
}
