pub mod clock;
pub mod command;
pub mod config;
pub mod directory;
pub mod error;
pub mod event;
pub mod live;
pub mod matrix;
pub mod normalize;
pub mod pic;
pub mod portal;
pub mod registry;
pub mod request;
pub mod resolver;
pub mod rng;
pub mod status;
pub mod store;
pub mod types;
pub mod visibility;
