//! A bounded-memory streaming quantile estimator based on [DDSketch][ddsketch].
//!
//! Samples are mapped onto logarithmically-sized bins, so that every bin spans the same _relative_ range of values.
//! This gives a fixed relative error for quantile queries regardless of how many samples have been inserted, while the
//! number of bins, and so the memory used, is capped by [`SketchConfig::bin_limit`]. When the cap is exceeded, the
//! lowest bins are collapsed into their neighbor, which preserves the accuracy of the upper quantiles at the expense of
//! the lowest ones.
//!
//! [ddsketch]: https://www.vldb.org/pvldb/vol12/p2195-masson.pdf
#![deny(warnings)]
#![deny(missing_docs)]

mod bin;
pub use self::bin::Bin;

mod common;

mod config;
pub use self::config::{SketchConfig, SketchConfigError};

mod sketch;
pub use self::sketch::{DDSketch, MergeError};
