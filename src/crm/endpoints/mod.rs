pub mod binding;
pub mod call;
pub mod contact;
pub mod entities;
pub mod lead;
pub mod user;

pub use binding::*;
pub use call::*;
pub use contact::*;
pub use entities::*;
pub use lead::*;
pub use user::*;
