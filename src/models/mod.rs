pub mod account;
pub mod chart_notes;
pub mod settings;
pub mod trade;

pub use account::*;
pub use settings::*;
pub use trade::*;
