pub mod meme;
pub mod status;
pub mod types;
