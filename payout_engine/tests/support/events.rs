use payout_engine::events::{
    DebtOffsetEvent,
    DebtRegisteredEvent,
    EarningsCancelledEvent,
    EventProducer,
    EventProducers,
    EventType,
    OperatorAlertEvent,
    PayoutFailedEvent,
    PayoutPaidEvent,
};
use tokio::sync::mpsc::{channel, Receiver};

const BUFFER: usize = 1000;

/// Subscribes to every engine event and keeps them until the test asks for them. Publishing is awaited by the
/// engine, so everything an API call emitted is here as soon as the call returns.
pub struct EventRecorder {
    producers: EventProducers,
    paid: Receiver<PayoutPaidEvent>,
    failed: Receiver<PayoutFailedEvent>,
    offsets: Receiver<DebtOffsetEvent>,
    cancelled: Receiver<EarningsCancelledEvent>,
    debts: Receiver<DebtRegisteredEvent>,
    alerts: Receiver<OperatorAlertEvent>,
}

#[derive(Debug, Default)]
pub struct Recorded {
    pub paid: Vec<PayoutPaidEvent>,
    pub failed: Vec<PayoutFailedEvent>,
    pub offsets: Vec<DebtOffsetEvent>,
    pub cancelled: Vec<EarningsCancelledEvent>,
    pub debts: Vec<DebtRegisteredEvent>,
    pub alerts: Vec<OperatorAlertEvent>,
}

impl Recorded {
    pub fn is_empty(&self) -> bool {
        self.events().is_empty()
    }

    pub fn events(&self) -> Vec<EventType> {
        let mut result = Vec::new();
        result.extend(self.paid.iter().cloned().map(EventType::PayoutPaid));
        result.extend(self.failed.iter().cloned().map(EventType::PayoutFailed));
        result.extend(self.offsets.iter().cloned().map(EventType::DebtOffset));
        result.extend(self.cancelled.iter().cloned().map(EventType::EarningsCancelled));
        result.extend(self.debts.iter().cloned().map(EventType::DebtRegistered));
        result.extend(self.alerts.iter().cloned().map(EventType::OperatorAlert));
        result
    }
}

fn drain<E>(rx: &mut Receiver<E>) -> Vec<E> {
    let mut result = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        result.push(ev);
    }
    result
}

impl EventRecorder {
    pub fn new() -> Self {
        let mut producers = EventProducers::default();
        let (tx, paid) = channel(BUFFER);
        producers.payout_paid_producer.push(EventProducer::new(tx));
        let (tx, failed) = channel(BUFFER);
        producers.payout_failed_producer.push(EventProducer::new(tx));
        let (tx, offsets) = channel(BUFFER);
        producers.debt_offset_producer.push(EventProducer::new(tx));
        let (tx, cancelled) = channel(BUFFER);
        producers.earnings_cancelled_producer.push(EventProducer::new(tx));
        let (tx, debts) = channel(BUFFER);
        producers.debt_registered_producer.push(EventProducer::new(tx));
        let (tx, alerts) = channel(BUFFER);
        producers.operator_alert_producer.push(EventProducer::new(tx));
        Self { producers, paid, failed, offsets, cancelled, debts, alerts }
    }

    pub fn producers(&self) -> EventProducers {
        self.producers.clone()
    }

    /// Everything published since the last call.
    pub fn take(&mut self) -> Recorded {
        Recorded {
            paid: drain(&mut self.paid),
            failed: drain(&mut self.failed),
            offsets: drain(&mut self.offsets),
            cancelled: drain(&mut self.cancelled),
            debts: drain(&mut self.debts),
            alerts: drain(&mut self.alerts),
        }
    }
}
