//! The Prometheus exposition data model used across the agent: parsing and
//! encoding of the text and delimited-protobuf formats, and conversion to
//! remote-write timeseries.

pub mod delimited;
pub mod line;
pub mod model;
pub mod proto;
pub mod text;

pub use model::{
    is_valid_label_name, Label, Metric, MetricFamily, MetricType, MetricValue,
    METRIC_NAME_LABEL,
};
pub use text::{parse_text, write_text, ParserError};
