//! Parse and merge the `.rcinfo` remote cache configuration.

pub mod rcinfo;

pub use rcinfo::{ConfigError, Mode, OverlayMerge, RcConfig};
