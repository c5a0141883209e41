pub mod aggregate;
pub mod colormap;
pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
pub mod filter;
pub mod granule;
pub mod masked;
pub mod pipeline;
pub mod regrid;
pub mod render;
pub mod series;
pub mod station;
pub mod utils;
