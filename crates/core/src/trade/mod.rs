pub mod entity;
pub mod fees;
pub mod port;
