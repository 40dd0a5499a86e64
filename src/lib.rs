//! Load tabular data from CSV text, base64 CSV or base64 Excel, clean it, and
//! render dual-axis scatter charts, correlation heatmaps and top-N correlation
//! panels as images.

pub mod chart;
pub mod color;
pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod store;

pub use chart::builder::{
    build_heatmap, build_single_chart, build_top_correlations, rank_correlations, ColumnSelection,
    SeriesOptions,
};
pub use chart::model::{ChartDescription, PlotMode};
pub use config::RenderConfig;
pub use data::coerce::{coerce, coerce_with_report};
pub use data::filter::{remove_outliers, remove_outliers_with_report, OutlierOutcome};
pub use data::loader::load;
pub use data::model::{Column, ColumnData, ColumnKind, Table, Value};
pub use data::summary::{profile_column, summarize};
pub use data::validate::validate;
pub use error::{Error, Result};
pub use pipeline::{ScatterOutput, ScatterReport, ScatterRequest};
pub use render::{render, ImageFormat, Renderer};
pub use store::DatasetStore;
