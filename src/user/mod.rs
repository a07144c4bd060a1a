pub mod permissions;

pub use permissions::{Permission, Requester};
