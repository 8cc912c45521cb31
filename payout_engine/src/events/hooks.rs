use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    DebtOffsetEvent,
    DebtRegisteredEvent,
    EarningsCancelledEvent,
    EventHandler,
    EventProducer,
    Handler,
    OperatorAlertEvent,
    PayoutFailedEvent,
    PayoutPaidEvent,
};

type BoxedFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventProducers {
    pub payout_paid_producer: Vec<EventProducer<PayoutPaidEvent>>,
    pub payout_failed_producer: Vec<EventProducer<PayoutFailedEvent>>,
    pub debt_offset_producer: Vec<EventProducer<DebtOffsetEvent>>,
    pub earnings_cancelled_producer: Vec<EventProducer<EarningsCancelledEvent>>,
    pub debt_registered_producer: Vec<EventProducer<DebtRegisteredEvent>>,
    pub operator_alert_producer: Vec<EventProducer<OperatorAlertEvent>>,
}

impl EventProducers {
    pub async fn publish_payout_paid(&self, event: PayoutPaidEvent) {
        for producer in &self.payout_paid_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_payout_failed(&self, event: PayoutFailedEvent) {
        for producer in &self.payout_failed_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_debt_offset(&self, event: DebtOffsetEvent) {
        for producer in &self.debt_offset_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_earnings_cancelled(&self, event: EarningsCancelledEvent) {
        for producer in &self.earnings_cancelled_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_debt_registered(&self, event: DebtRegisteredEvent) {
        for producer in &self.debt_registered_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_operator_alert(&self, event: OperatorAlertEvent) {
        for producer in &self.operator_alert_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_payout_paid: Option<EventHandler<PayoutPaidEvent>>,
    pub on_payout_failed: Option<EventHandler<PayoutFailedEvent>>,
    pub on_debt_offset: Option<EventHandler<DebtOffsetEvent>>,
    pub on_earnings_cancelled: Option<EventHandler<EarningsCancelledEvent>>,
    pub on_debt_registered: Option<EventHandler<DebtRegisteredEvent>>,
    pub on_operator_alert: Option<EventHandler<OperatorAlertEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_payout_paid: hooks.on_payout_paid.map(|f| EventHandler::new(buffer_size, f)),
            on_payout_failed: hooks.on_payout_failed.map(|f| EventHandler::new(buffer_size, f)),
            on_debt_offset: hooks.on_debt_offset.map(|f| EventHandler::new(buffer_size, f)),
            on_earnings_cancelled: hooks.on_earnings_cancelled.map(|f| EventHandler::new(buffer_size, f)),
            on_debt_registered: hooks.on_debt_registered.map(|f| EventHandler::new(buffer_size, f)),
            on_operator_alert: hooks.on_operator_alert.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_payout_paid {
            result.payout_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payout_failed {
            result.payout_failed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_debt_offset {
            result.debt_offset_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_earnings_cancelled {
            result.earnings_cancelled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_debt_registered {
            result.debt_registered_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_operator_alert {
            result.operator_alert_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns every configured handler. Each one shuts itself down once all of its producers have been dropped.
    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_payout_paid {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_payout_failed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_debt_offset {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_earnings_cancelled {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_debt_registered {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_operator_alert {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_payout_paid: Option<Handler<PayoutPaidEvent>>,
    pub on_payout_failed: Option<Handler<PayoutFailedEvent>>,
    pub on_debt_offset: Option<Handler<DebtOffsetEvent>>,
    pub on_earnings_cancelled: Option<Handler<EarningsCancelledEvent>>,
    pub on_debt_registered: Option<Handler<DebtRegisteredEvent>>,
    pub on_operator_alert: Option<Handler<OperatorAlertEvent>>,
}

impl EventHooks {
    pub fn on_payout_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PayoutPaidEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_payout_paid = Some(Arc::new(f));
        self
    }

    pub fn on_payout_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PayoutFailedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_payout_failed = Some(Arc::new(f));
        self
    }

    pub fn on_debt_offset<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DebtOffsetEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_debt_offset = Some(Arc::new(f));
        self
    }

    pub fn on_earnings_cancelled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(EarningsCancelledEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_earnings_cancelled = Some(Arc::new(f));
        self
    }

    pub fn on_debt_registered<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DebtRegisteredEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_debt_registered = Some(Arc::new(f));
        self
    }

    pub fn on_operator_alert<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OperatorAlertEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_operator_alert = Some(Arc::new(f));
        self
    }
}
