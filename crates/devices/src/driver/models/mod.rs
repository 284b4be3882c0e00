//! Built-in device models.

mod dimmer;
mod gateway;
mod plug;
mod pro;
mod single;

pub use dimmer::{Dimmer0110VpmGen3, PlusWallDimmerGen2};
pub use gateway::{BluGwGen2, BluGwGen3};
pub use plug::PlugUsGen2;
pub use pro::{Pro2PmGen2, Pro4PmGen2};
pub use single::Shelly1PmGen4;
