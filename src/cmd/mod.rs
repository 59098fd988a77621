pub mod check;
pub mod mood;
pub mod quota;
pub mod render;
