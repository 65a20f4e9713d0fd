pub mod ami;
pub mod error;
pub mod event;

pub use ami::{AmiAction, AmiClient};
pub use error::AmiError;
pub use event::{Event, RawEvent};
