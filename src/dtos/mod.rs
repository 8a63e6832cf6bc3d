pub mod pick_dtos;
pub mod pool_dtos;
