pub mod media;
pub mod migrate;
pub mod page;
pub mod status;
