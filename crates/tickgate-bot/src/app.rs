//! Control loop orchestration.
//!
//! Builds the components leaf-first (bus and registry, then risk gate and
//! ledger) and runs three tasks while started:
//! - tick consumer: bus -> tick window -> strategy -> risk gate -> ledger
//! - position monitor: fixed-period mark-to-market and stop/target exits
//! - connection events: stream lifecycle into logs and engine events
//!
//! Orders are submitted fire-and-forget; the tick path never awaits them.
//! A panic while handling one tick or event drops that input and the task
//! keeps running.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::executor::DynOrderExecutor;
use crate::strategy::{MovingAverageCrossover, Strategy};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tickgate_core::{
    ConnectionId, MarketRegime, MarketTick, OrderRequest, OrderResult, PositionSide, Regime,
    Signal, SignalType, Symbol,
};
use tickgate_feed::{BusReceiver, MarketDataBus, TickWindow};
use tickgate_position::{ClosedPosition, ExitReason, PositionLedger};
use tickgate_risk::{RegimeAnalyzer, RiskError, RiskGate, TradePlan};
use tickgate_telemetry::Metrics;
use tickgate_ws::{ConnectionEvent, ConnectionEventKind, ConnectionState, SubscriptionRegistry};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Bus consumer name of the tick path.
const CONSUMER_NAME: &str = "control_loop";

/// Observable engine activity.
///
/// Delivered on a broadcast channel; sending never blocks and succeeds
/// without subscribers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    ConnectionStateChanged {
        id: ConnectionId,
        from: ConnectionState,
        to: ConnectionState,
        attempt: u32,
    },
    ConnectionError {
        id: ConnectionId,
        error: String,
    },
    /// Reconnect attempts exhausted; the engine keeps running without this stream.
    ConnectionFailed {
        id: ConnectionId,
        attempts: u32,
    },
    RegimeChanged {
        symbol: Symbol,
        regime: MarketRegime,
    },
    SignalGenerated(Signal),
    TradeRejected {
        symbol: Symbol,
        gate: &'static str,
        reason: String,
    },
    PositionOpened(TradePlan),
    PositionClosed(ClosedPosition),
    OrderCompleted {
        request: OrderRequest,
        result: OrderResult,
    },
    OrderFailed {
        request: OrderRequest,
        error: String,
    },
    /// A task panicked while handling one input; the input was dropped and
    /// the task kept running.
    TaskPanicked {
        task: &'static str,
        message: String,
    },
}

/// State shared by the control loop tasks.
struct Shared {
    bus: Arc<MarketDataBus>,
    risk: Arc<RiskGate>,
    ledger: Arc<PositionLedger>,
    executor: DynOrderExecutor,
    events: broadcast::Sender<EngineEvent>,
}

impl Shared {
    fn emit(&self, event: EngineEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn submit(&self, request: OrderRequest) {
        let executor = self.executor.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            match executor.submit_order(request.clone()).await {
                Ok(result) => {
                    Metrics::order(&result.status.to_string());
                    info!(
                        order_id = %result.order_id,
                        symbol = %request.symbol,
                        side = ?request.side,
                        status = %result.status,
                        executed_qty = %result.executed_qty,
                        executed_price = %result.executed_price,
                        "Order completed"
                    );
                    let _ = events.send(EngineEvent::OrderCompleted { request, result });
                }
                Err(e) => {
                    Metrics::order("error");
                    warn!(order_id = %request.id, symbol = %request.symbol, error = %e, "Order failed");
                    let _ = events.send(EngineEvent::OrderFailed {
                        request,
                        error: e.to_string(),
                    });
                }
            }
        });
    }

    fn on_closed(&self, closed: ClosedPosition) {
        let position = &closed.position;
        self.submit(OrderRequest::new(
            position.symbol.clone(),
            position.side.exit_order_side(),
            position.quantity,
            closed.exit_price,
        ));
        self.emit(EngineEvent::PositionClosed(closed));
    }

    fn on_signal(&self, signal: Signal, regime: &MarketRegime) {
        if let Some(position) = self.ledger.get_position(&signal.symbol) {
            let opposite = matches!(
                (position.side, signal.signal_type),
                (PositionSide::Long, SignalType::Sell) | (PositionSide::Short, SignalType::Buy)
            );
            if !opposite {
                debug!(symbol = %signal.symbol, side = %position.side, "Position already open, signal ignored");
                return;
            }
            if let Some(closed) = self.ledger.close_position_with_reason(
                &signal.symbol,
                signal.price,
                ExitReason::Signal,
            ) {
                self.on_closed(closed);
            }
            return;
        }

        let balance = self.ledger.balance();
        match self.risk.evaluate(&signal, regime, balance) {
            Ok(plan) => {
                let opened = self.ledger.open_position(
                    plan.symbol.clone(),
                    plan.side,
                    plan.entry,
                    plan.quantity,
                    plan.stop_loss,
                    plan.take_profit,
                );
                if opened {
                    self.submit(OrderRequest::new(
                        plan.symbol.clone(),
                        plan.side.entry_order_side(),
                        plan.quantity,
                        plan.entry,
                    ));
                    self.emit(EngineEvent::PositionOpened(plan));
                }
            }
            Err(RiskError::Rejected { gate, reason }) => {
                self.emit(EngineEvent::TradeRejected {
                    symbol: signal.symbol,
                    gate,
                    reason,
                });
            }
            Err(e) => error!(symbol = %signal.symbol, error = %e, "Risk evaluation failed"),
        }
    }

    fn on_connection_event(&self, event: ConnectionEvent) {
        let ConnectionEvent { id, kind } = event;
        match kind {
            ConnectionEventKind::StateChanged { from, to, attempt } => {
                debug!(connection = %id, from = %from, to = %to, attempt, "Stream state changed");
                self.emit(EngineEvent::ConnectionStateChanged {
                    id,
                    from,
                    to,
                    attempt,
                });
            }
            ConnectionEventKind::Error(error) => {
                self.emit(EngineEvent::ConnectionError { id, error });
            }
            ConnectionEventKind::Failed { attempts } => {
                error!(connection = %id, attempts, "Stream failed permanently, continuing without it");
                self.emit(EngineEvent::ConnectionFailed { id, attempts });
            }
        }
    }

    /// Mark open positions and close the ones past their stop or target.
    fn monitor_positions(&self) {
        let prices = self.bus.latest_prices();
        if prices.is_empty() {
            return;
        }
        for closed in self.ledger.update_positions(&prices) {
            self.on_closed(closed);
        }
    }
}

/// Run one unit of task work, dropping it if it panics.
///
/// Only effective with unwinding panics; under `panic = "abort"` the
/// process exits instead.
fn guarded(task: &'static str, shared: &Shared, work: impl FnOnce()) {
    if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(work)) {
        let message = panic_message(payload.as_ref());
        error!(task, %message, "Control loop task panicked, input dropped");
        shared.emit(EngineEvent::TaskPanicked { task, message });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Per-symbol tick state owned by the consumer task.
struct TickProcessor {
    shared: Arc<Shared>,
    strategy: Arc<Mutex<Box<dyn Strategy>>>,
    analyzer: RegimeAnalyzer,
    windows: HashMap<Symbol, TickWindow>,
    window_size: usize,
    regime_symbol: Option<Symbol>,
    current_regime: Option<Regime>,
}

impl TickProcessor {
    fn on_tick(&mut self, tick: MarketTick) {
        let symbol = tick.symbol.clone();
        let window = self
            .windows
            .entry(symbol.clone())
            .or_insert_with(|| TickWindow::new(self.window_size));
        window.push(tick);

        let regime = self.analyzer.analyze(window.ticks());

        if self.shared.risk.config().regime_adjustment
            && self.regime_symbol.as_ref() == Some(&symbol)
            && self.current_regime != Some(regime.regime)
        {
            info!(%symbol, regime = %regime.regime, confidence = regime.confidence, "Market regime changed");
            self.shared.risk.adjust_for_regime(regime.regime);
            self.current_regime = Some(regime.regime);
            self.shared.emit(EngineEvent::RegimeChanged {
                symbol: symbol.clone(),
                regime: regime.clone(),
            });
        }

        let Some(signal) = self.strategy.lock().evaluate(window) else {
            return;
        };

        Metrics::signal(symbol.as_str(), &signal.signal_type.to_string());
        info!(
            %symbol,
            signal = %signal.signal_type,
            price = %signal.price,
            confidence = signal.confidence,
            source = %signal.source,
            "Signal generated"
        );
        self.shared.emit(EngineEvent::SignalGenerated(signal.clone()));
        self.shared.on_signal(signal, &regime);
    }
}

#[derive(Default)]
struct Lifecycle {
    cancel: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
}

/// Owner of every runtime component.
pub struct ControlLoop {
    config: AppConfig,
    registry: Arc<SubscriptionRegistry>,
    shared: Arc<Shared>,
    strategy: Arc<Mutex<Box<dyn Strategy>>>,
    connection_events: Arc<tokio::sync::Mutex<mpsc::Receiver<ConnectionEvent>>>,
    running: AtomicBool,
    /// Held across the whole of `start` and `stop`.
    lifecycle: tokio::sync::Mutex<Lifecycle>,
}

impl ControlLoop {
    /// Build all components from `config` with the bundled crossover strategy.
    pub fn new(config: AppConfig, executor: DynOrderExecutor) -> AppResult<Self> {
        config.validate()?;

        let bus = Arc::new(MarketDataBus::new(config.engine.bus_capacity));
        let (events_tx, events_rx) = mpsc::channel(config.engine.event_capacity);
        let registry = Arc::new(SubscriptionRegistry::new(
            config.stream.connection_config(),
            config.stream.close_grace(),
            bus.clone(),
            events_tx,
        ));
        let risk = Arc::new(RiskGate::new(config.risk.clone()));
        let ledger = Arc::new(PositionLedger::new(config.ledger.clone()));
        let (events, _) = broadcast::channel(config.engine.event_capacity);

        let strategy: Box<dyn Strategy> =
            Box::new(MovingAverageCrossover::from_config(&config.strategy));

        Ok(Self {
            registry,
            shared: Arc::new(Shared {
                bus,
                risk,
                ledger,
                executor,
                events,
            }),
            strategy: Arc::new(Mutex::new(strategy)),
            connection_events: Arc::new(tokio::sync::Mutex::new(events_rx)),
            running: AtomicBool::new(false),
            lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
            config,
        })
    }

    /// Replace the strategy. Takes effect on the next tick.
    pub fn with_strategy(self, strategy: impl Strategy + 'static) -> Self {
        *self.strategy.lock() = Box::new(strategy);
        self
    }

    /// Start the tasks and open every configured subscription.
    ///
    /// A no-op while already running. If any subscription fails to start,
    /// everything started so far is torn down and the error is returned.
    pub async fn start(&self) -> AppResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if self.running.load(Ordering::Acquire) {
            debug!("Control loop already running");
            return Ok(());
        }

        info!(
            subscriptions = self.config.subscriptions.len(),
            monitor_interval_ms = self.config.engine.monitor_interval_ms,
            "Starting control loop"
        );

        if let Err(e) = self.start_inner(&mut lifecycle) {
            error!(error = %e, "Startup failed, rolling back");
            self.teardown(&mut lifecycle).await;
            return Err(e);
        }
        self.running.store(true, Ordering::Release);

        info!(active = self.registry.list_active().len(), "Control loop started");
        Ok(())
    }

    fn start_inner(&self, lifecycle: &mut Lifecycle) -> AppResult<()> {
        let cancel = CancellationToken::new();
        let receiver = self.shared.bus.subscribe(CONSUMER_NAME)?;

        lifecycle.tasks = vec![
            self.spawn_monitor(cancel.clone()),
            self.spawn_consumer(receiver, cancel.clone()),
            self.spawn_event_listener(cancel.clone()),
        ];
        lifecycle.cancel = Some(cancel);

        for sub in &self.config.subscriptions {
            let url = sub.resolve_url(&self.config.stream.base_url);
            self.registry.create_connection(sub.id(), &url)?;
        }
        Ok(())
    }

    /// Stop every task and close all connections.
    ///
    /// Safe to call repeatedly. Teardown errors are logged, never returned.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let was_running = self.running.swap(false, Ordering::AcqRel);
        if !was_running && lifecycle.cancel.is_none() {
            debug!("Control loop not running");
            return;
        }

        info!("Stopping control loop");
        self.teardown(&mut lifecycle).await;
    }

    /// Close connections first so their Closing transitions still reach the
    /// event listener, then cancel and join the tasks.
    async fn teardown(&self, lifecycle: &mut Lifecycle) {
        let closed = self.registry.close_all().await;

        if let Some(cancel) = lifecycle.cancel.take() {
            cancel.cancel();
        }
        for task in std::mem::take(&mut lifecycle.tasks) {
            if let Err(e) = task.await {
                warn!(error = %e, "Control loop task ended abnormally");
            }
        }

        info!(
            closed_connections = closed,
            open_positions = self.shared.ledger.position_count(),
            balance = %self.shared.ledger.balance(),
            realized_pnl = %self.shared.ledger.realized_pnl_total(),
            "Control loop stopped"
        );
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Receiver of engine events from now on.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events.subscribe()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<MarketDataBus> {
        &self.shared.bus
    }

    pub fn risk(&self) -> &Arc<RiskGate> {
        &self.shared.risk
    }

    pub fn ledger(&self) -> &Arc<PositionLedger> {
        &self.shared.ledger
    }

    fn spawn_monitor(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let shared = self.shared.clone();
        let period = self.config.engine.monitor_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        guarded("position_monitor", &shared, || shared.monitor_positions());
                    }
                }
            }
            debug!("Position monitor stopped");
        })
    }

    fn spawn_consumer(&self, mut receiver: BusReceiver, cancel: CancellationToken) -> JoinHandle<()> {
        let mut processor = TickProcessor {
            shared: self.shared.clone(),
            strategy: self.strategy.clone(),
            analyzer: RegimeAnalyzer::new(),
            windows: HashMap::new(),
            window_size: self.config.engine.tick_window,
            regime_symbol: self.config.regime_symbol(),
            current_regime: None,
        };
        let shared = self.shared.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    tick = receiver.recv() => match tick {
                        Some(tick) => guarded("tick_consumer", &shared, || processor.on_tick(tick)),
                        None => break,
                    },
                }
            }
            debug!(dropped = receiver.dropped(), "Tick consumer stopped");
        })
    }

    fn spawn_event_listener(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let shared = self.shared.clone();
        let events = self.connection_events.clone();
        tokio::spawn(async move {
            let mut events = events.lock().await;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        // Teardown transitions queued before cancellation.
                        while let Ok(event) = events.try_recv() {
                            guarded("connection_events", &shared, || shared.on_connection_event(event));
                        }
                        break;
                    }
                    event = events.recv() => match event {
                        Some(event) => {
                            guarded("connection_events", &shared, || shared.on_connection_event(event));
                        }
                        None => break,
                    },
                }
            }
            debug!("Connection event listener stopped");
        })
    }
}
