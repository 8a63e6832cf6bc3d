pub mod fixture;
pub mod pick;
pub mod pool;
pub mod user;
