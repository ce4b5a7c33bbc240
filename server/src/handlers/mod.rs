pub mod health;
pub mod records;
