pub mod net;
pub mod serde_millis;

#[cfg(test)]
pub mod testing;
