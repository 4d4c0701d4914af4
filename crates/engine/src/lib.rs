pub mod locations;
pub mod model;
pub mod stage;
pub mod transition;

pub use model::*;
pub use stage::*;
