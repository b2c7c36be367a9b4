//! Collaborators of the session core.
//!
//! - [`normalize`]: files and URLs into uploadable payloads
//! - [`thumbnail`]: optional PNG previews for the shelf
//! - [`chart`]: the `generate_chart` function tool and its SVG renderer

pub mod chart;
pub mod normalize;
pub mod thumbnail;

pub use chart::{
    CHART_TOOL_NAME, ChartError, ChartRenderer, RenderedChart, SvgChartRenderer,
    chart_spec_from_call, chart_tool_definition,
};
pub use normalize::{
    DefaultNormalizer, FormatNormalizer, NormalizeError, NormalizeFuture, NormalizedFile,
    OfficeConverter, WebFetcher,
};
pub use thumbnail::{DefaultThumbnailer, THUMBNAIL_SIZE, ThumbnailFuture, ThumbnailGenerator};
