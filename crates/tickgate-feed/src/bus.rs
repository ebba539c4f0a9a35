//! Market data bus.
//!
//! Fan-out of [`MarketTick`]s to named consumers. Each consumer owns a
//! bounded FIFO; on overflow the oldest queued tick for that consumer is
//! evicted and counted. Publishing never blocks and never awaits.
//!
//! The bus also keeps the latest tick per symbol, which the position
//! monitor reads to mark open positions to market.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tickgate_core::{MarketTick, Price, Symbol};
use tickgate_telemetry::Metrics;
use tokio::sync::Notify;
use tracing::{debug, info, trace};

use crate::error::{FeedError, FeedResult};

/// Per-consumer bounded queue.
#[derive(Debug)]
struct ConsumerQueue {
    name: String,
    capacity: usize,
    queue: Mutex<VecDeque<MarketTick>>,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl ConsumerQueue {
    fn new(name: String, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Push a tick, evicting the oldest one when full.
    fn push(&self, tick: MarketTick) {
        let evicted = {
            let mut queue = self.queue.lock();
            let evicted = if queue.len() >= self.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(tick);
            evicted
        };

        if let Some(old) = evicted {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            Metrics::bus_dropped(&self.name);
            trace!(
                consumer = %self.name,
                symbol = %old.symbol,
                dropped_total = total,
                "Consumer queue full, dropped oldest tick"
            );
        }

        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        // Wakes a receiver that is between the empty check and the await.
        self.notify.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Receiving half for one bus consumer.
///
/// Dropping the receiver unsubscribes the consumer.
#[derive(Debug)]
pub struct BusReceiver {
    queue: Arc<ConsumerQueue>,
}

impl BusReceiver {
    /// Wait for the next tick.
    ///
    /// Returns `None` once the bus is closed and the queue is drained.
    pub async fn recv(&mut self) -> Option<MarketTick> {
        loop {
            if let Some(tick) = self.queue.queue.lock().pop_front() {
                return Some(tick);
            }
            if self.queue.is_closed() {
                return None;
            }
            self.queue.notify.notified().await;
        }
    }

    /// Take the next tick without waiting.
    pub fn try_recv(&mut self) -> Option<MarketTick> {
        self.queue.queue.lock().pop_front()
    }

    /// Consumer name used for metrics.
    pub fn name(&self) -> &str {
        &self.queue.name
    }

    /// Ticks evicted from this consumer's queue so far.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    /// Ticks currently queued.
    pub fn len(&self) -> usize {
        self.queue.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for BusReceiver {
    fn drop(&mut self) {
        self.queue.close();
    }
}

/// In-process tick fan-out.
#[derive(Debug)]
pub struct MarketDataBus {
    capacity: usize,
    consumers: RwLock<Vec<Arc<ConsumerQueue>>>,
    latest: DashMap<Symbol, MarketTick>,
    closed: AtomicBool,
}

impl MarketDataBus {
    /// Create a bus whose consumers each buffer up to `capacity` ticks.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            consumers: RwLock::new(Vec::new()),
            latest: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Register a named consumer.
    pub fn subscribe(&self, name: impl Into<String>) -> FeedResult<BusReceiver> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FeedError::Closed);
        }
        let name = name.into();
        let mut consumers = self.consumers.write();
        if consumers.iter().any(|c| c.name == name && !c.is_closed()) {
            return Err(FeedError::DuplicateConsumer(name));
        }
        let queue = Arc::new(ConsumerQueue::new(name.clone(), self.capacity));
        consumers.push(queue.clone());
        info!(consumer = %name, capacity = self.capacity, "Bus consumer subscribed");
        Ok(BusReceiver { queue })
    }

    /// Publish a tick to every live consumer.
    ///
    /// Never blocks: full consumer queues drop their oldest tick.
    pub fn publish(&self, tick: MarketTick) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        Metrics::tick_published(tick.symbol.as_str());
        self.latest.insert(tick.symbol.clone(), tick.clone());

        let mut saw_closed = false;
        {
            let consumers = self.consumers.read();
            for consumer in consumers.iter() {
                if consumer.is_closed() {
                    saw_closed = true;
                    continue;
                }
                consumer.push(tick.clone());
            }
        }

        if saw_closed {
            self.prune();
        }
    }

    fn prune(&self) {
        let mut consumers = self.consumers.write();
        let before = consumers.len();
        consumers.retain(|c| !c.is_closed());
        let removed = before - consumers.len();
        if removed > 0 {
            debug!(removed, "Pruned closed bus consumers");
        }
    }

    /// Latest tick seen for `symbol`.
    pub fn latest(&self, symbol: &Symbol) -> Option<MarketTick> {
        self.latest.get(symbol).map(|t| t.clone())
    }

    /// Latest known price for every symbol seen so far.
    pub fn latest_prices(&self) -> HashMap<Symbol, Price> {
        self.latest
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().price))
            .collect()
    }

    /// Live consumers.
    pub fn consumer_count(&self) -> usize {
        self.consumers
            .read()
            .iter()
            .filter(|c| !c.is_closed())
            .count()
    }

    /// Close the bus: consumers drain what is queued, then see `None`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let consumers = std::mem::take(&mut *self.consumers.write());
        for consumer in &consumers {
            consumer.close();
        }
        info!(consumers = consumers.len(), "Market data bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tickgate_core::Size;

    fn tick(symbol: &str, price: rust_decimal::Decimal, ts: i64) -> MarketTick {
        MarketTick::new(
            Symbol::new(symbol),
            Price::new(price),
            Size::new(dec!(1)),
            ts,
        )
    }

    #[tokio::test]
    async fn test_fan_out_in_arrival_order() {
        let bus = MarketDataBus::new(16);
        let mut a = bus.subscribe("a").unwrap();
        let mut b = bus.subscribe("b").unwrap();

        for i in 0..5 {
            bus.publish(tick("BTCUSDT", dec!(100) + rust_decimal::Decimal::from(i), i));
        }

        for rx in [&mut a, &mut b] {
            for i in 0..5 {
                let t = rx.recv().await.unwrap();
                assert_eq!(t.timestamp_ms, i);
            }
            assert!(rx.is_empty());
        }
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let bus = MarketDataBus::new(3);
        let mut rx = bus.subscribe("slow").unwrap();

        for i in 0..5 {
            bus.publish(tick("BTCUSDT", dec!(100), i));
        }

        assert_eq!(rx.dropped(), 2);
        let kept: Vec<i64> = std::iter::from_fn(|| rx.try_recv())
            .map(|t| t.timestamp_ms)
            .collect();
        assert_eq!(kept, vec![2, 3, 4]);
    }

    #[test]
    fn test_slow_consumer_does_not_affect_fast() {
        let bus = MarketDataBus::new(2);
        let slow = bus.subscribe("slow").unwrap();
        let mut fast = bus.subscribe("fast").unwrap();

        for i in 0..4 {
            bus.publish(tick("ETHUSDT", dec!(10), i));
            assert_eq!(fast.try_recv().unwrap().timestamp_ms, i);
        }

        assert_eq!(slow.dropped(), 2);
        assert_eq!(fast.dropped(), 0);
    }

    #[test]
    fn test_latest_prices() {
        let bus = MarketDataBus::new(4);
        bus.publish(tick("BTCUSDT", dec!(50000), 1));
        bus.publish(tick("ETHUSDT", dec!(3000), 2));
        bus.publish(tick("BTCUSDT", dec!(50100), 3));

        let prices = bus.latest_prices();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[&Symbol::new("BTCUSDT")], Price::new(dec!(50100)));
        assert_eq!(
            bus.latest(&Symbol::new("ETHUSDT")).map(|t| t.timestamp_ms),
            Some(2)
        );
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let bus = MarketDataBus::new(4);
        let rx = bus.subscribe("gone").unwrap();
        assert_eq!(bus.consumer_count(), 1);

        drop(rx);
        bus.publish(tick("BTCUSDT", dec!(1), 1));
        assert_eq!(bus.consumer_count(), 0);

        // Name can be reused once the old consumer is gone.
        assert!(bus.subscribe("gone").is_ok());
    }

    #[test]
    fn test_duplicate_consumer_rejected() {
        let bus = MarketDataBus::new(4);
        let _rx = bus.subscribe("strategy").unwrap();
        assert!(matches!(
            bus.subscribe("strategy"),
            Err(FeedError::DuplicateConsumer(_))
        ));
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_receiver() {
        let bus = Arc::new(MarketDataBus::new(4));
        let mut rx = bus.subscribe("waiter").unwrap();

        let handle = tokio::spawn(async move { rx.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.close();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("receiver should wake on close")
            .unwrap();
        assert!(result.is_none());
        assert!(matches!(bus.subscribe("late"), Err(FeedError::Closed)));
    }

    #[tokio::test]
    async fn test_recv_wakes_on_publish() {
        let bus = Arc::new(MarketDataBus::new(4));
        let mut rx = bus.subscribe("waiter").unwrap();

        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            publisher.publish(tick("BTCUSDT", dec!(42), 7));
        });

        let t = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(t.price, Price::new(dec!(42)));
    }
}
