mod modes;
mod run;

pub use modes::*;
pub use run::*;
