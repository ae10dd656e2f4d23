pub mod buffer3;

pub use buffer3::Buffer3;
