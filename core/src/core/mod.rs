pub mod bus;
pub mod machine;

pub use bus::Bus;
pub use machine::{AudioSource, InputButton, Machine};
