#![allow(dead_code)]

pub mod mock_providers;
pub mod strategies;

pub use mock_providers::*;
pub use strategies::*;
