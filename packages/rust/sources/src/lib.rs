//! Source-processing strategies for deal sourcing.
//!
//! This crate provides:
//! - [`SourceProcessor`] — produce candidate deals for one source
//! - [`ProcessorRegistry`] — picks the processor for a [`SourceType`](dealscout_shared::SourceType)
//! - [`WebsiteProcessor`] — remote scrape + AI extraction via [`DealServices`]
//! - [`SimulatedProcessor`] — marketplace/API/manual sources fed by a [`CandidateSupplier`]
//! - [`KeywordFilter`] — include/exclude keyword matching applied by every strategy

pub mod keywords;
pub mod processor;
pub mod registry;
pub mod services;
pub mod simulated;
pub mod website;

pub use keywords::KeywordFilter;
pub use processor::{PhaseReporter, SilentPhases, SourcePhase, SourceProcessor};
pub use registry::ProcessorRegistry;
pub use services::{
    AiExtractionRequest, AiExtractionResponse, DealServices, HttpDealServices, ScrapeRequest,
    ScrapeResponse,
};
pub use simulated::{CandidateSupplier, RandomSupplier, SimulatedProcessor, SupplyRequest};
pub use website::WebsiteProcessor;
