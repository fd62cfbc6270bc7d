pub mod health;
pub mod transit;
