//! Data flow analyses over instruction lists.

pub mod liveness;
pub mod reg_usage;
pub mod uda;
pub mod var_set;

pub use var_set::VarSet;
