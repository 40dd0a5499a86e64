//! Data layer: core types, loading, cleaning and profiling.
//!
//! Architecture:
//! ```text
//!  csv text / base64 csv / base64 xlsx
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  sniff format → Table   (xlsx: first sheet)
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  Table    │  ordered, uniquely named, typed columns
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────────────────────┐
//!   │ validate / coerce / filter │  column checks, type coercion, z-score outliers
//!   └──────────────────────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │ summary   │  shape, kinds, missing counts, preview, column profile
//!   └──────────┘
//! ```

pub mod coerce;
pub mod filter;
pub mod loader;
pub mod model;
pub mod stats;
pub mod summary;
pub mod validate;
mod xlsx;
