/*!
Hierarchical tables for economic census data.

The cells of census tables carry censored values: a published amount, and the
number of contributors that were hidden from it. This crate parses them
([codec]), adds them up without losing the hidden contributors ([aggregate]),
lays them out in wide tables ([builder]) and derives ratio ([ratio]) and
percentage ([percent]) tables between the levels of the geography
([geography]).

See the [manual] for the file formats.
 */

mod config;
pub mod aggregate;
pub mod builder;
pub mod codec;
pub mod geography;
pub mod manual;
pub mod percent;
pub mod ratio;

pub use crate::config::*;
