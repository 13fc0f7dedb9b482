//! Lookup of the processor responsible for each source kind.

use std::collections::HashMap;
use std::sync::Arc;

use dealscout_shared::{DealScoutError, Result, SourceType};

use crate::processor::SourceProcessor;
use crate::services::DealServices;
use crate::simulated::{CandidateSupplier, SimulatedProcessor};
use crate::website::WebsiteProcessor;

/// Holds one registered processor per [`SourceType`].
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<SourceType, Arc<dyn SourceProcessor>>,
}

impl ProcessorRegistry {
    /// Create a registry with all built-in strategies: the website processor
    /// backed by `services`, and simulated processors for the other kinds
    /// drawing from `supplier`.
    pub fn new(services: Arc<dyn DealServices>, supplier: Arc<dyn CandidateSupplier>) -> Self {
        Self::empty()
            .with(Arc::new(WebsiteProcessor::new(services)))
            .with(Arc::new(SimulatedProcessor::new(
                SourceType::Marketplace,
                supplier.clone(),
            )))
            .with(Arc::new(SimulatedProcessor::new(
                SourceType::Api,
                supplier.clone(),
            )))
            .with(Arc::new(SimulatedProcessor::new(SourceType::Manual, supplier)))
    }

    /// A registry with no processors.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register `processor` for its kind, replacing any previous one.
    pub fn with(mut self, processor: Arc<dyn SourceProcessor>) -> Self {
        self.processors.insert(processor.kind(), processor);
        self
    }

    /// Re-point every simulated kind at `supplier`, keeping the website
    /// processor as registered.
    pub fn with_supplier(self, supplier: Arc<dyn CandidateSupplier>) -> Self {
        [SourceType::Marketplace, SourceType::Api, SourceType::Manual]
            .into_iter()
            .fold(self, |registry, kind| {
                registry.with(Arc::new(SimulatedProcessor::new(kind, supplier.clone())))
            })
    }

    /// The processor for `kind`.
    pub fn get(&self, kind: SourceType) -> Result<Arc<dyn SourceProcessor>> {
        self.processors.get(&kind).cloned().ok_or_else(|| {
            DealScoutError::validation(format!("no processor registered for {kind} sources"))
        })
    }

    pub fn kinds(&self) -> Vec<SourceType> {
        SourceType::ALL
            .into_iter()
            .filter(|k| self.processors.contains_key(k))
            .collect()
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
