pub mod cop411;
pub mod led_display;

pub use cop411::Cop411;
pub use led_display::LedDisplay;
