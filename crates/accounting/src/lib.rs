//! Token counting and cost accounting.
//!
//! The accountant never fails a query over money math: unknown models fall
//! back to the default model's pricing, malformed embedded token counts are
//! treated as absent, and estimates fill in whatever the backend did not
//! report.

mod accountant;
mod pricing;

pub use accountant::{CostAccountant, CostBreakdown};
pub use pricing::{ModelPricing, PricingTable};
