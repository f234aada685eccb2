// This is free and unencumbered software released into the public domain.

mod capabilities;
pub use capabilities::*;

mod characteristics;
pub use characteristics::*;

mod config;
pub use config::*;

mod devices;
pub use devices::*;

pub mod drivers {
    pub mod simulated;
}
pub use drivers::simulated::{self, SimulatedHal};

mod engine;
pub use engine::*;

mod error;
pub use error::*;

mod event_loop;

mod format;
pub use format::*;

mod frame;
pub use frame::*;

mod geometry;
pub use geometry::*;

mod hal;
pub use hal::*;

mod open;
pub use open::*;

mod photo;
pub(crate) use photo::{PendingPhoto, PhotoTicket};

mod preview;
pub(crate) use preview::PreviewPipeline;

mod reader;
pub use reader::*;

mod request;
pub use request::*;

mod settings;
pub use settings::*;

mod sink;
pub use sink::*;

mod state;
pub use state::*;

mod translator;
pub use translator::*;
