pub mod ann;

pub use ann::{AnnIndex, LinearAnnIndex};
