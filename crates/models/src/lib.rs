mod user;
mod dependency;

pub use user::*;
pub use dependency::*;
