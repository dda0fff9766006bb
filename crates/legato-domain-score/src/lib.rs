pub mod midi_export;
pub mod model;
pub mod reference_import;
pub mod tempo;

pub use midi_export::*;
pub use model::*;
pub use reference_import::*;
pub use tempo::*;
