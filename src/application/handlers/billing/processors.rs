//! Lookup of the processor serving each payment method.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::billing::{BillingError, PaymentMethod};
use crate::ports::PaymentProcessor;

/// Processors keyed by the payment method they serve.
///
/// `manual` is never registered: manual payments are recorded by an
/// administrator and have nothing to poll.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<PaymentMethod, Arc<dyn PaymentProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `processor` under the method it reports.
    pub fn with(mut self, processor: Arc<dyn PaymentProcessor>) -> Self {
        self.processors.insert(processor.method(), processor);
        self
    }

    pub fn get(&self, method: PaymentMethod) -> Option<&Arc<dyn PaymentProcessor>> {
        self.processors.get(&method)
    }

    /// Like [`get`](Self::get), but an unregistered method is an error.
    pub fn require(&self, method: PaymentMethod) -> Result<&Arc<dyn PaymentProcessor>, BillingError> {
        self.get(method).ok_or(BillingError::UnsupportedMethod(method))
    }
}
