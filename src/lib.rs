#![doc = include_str!("../README.md")]

pub mod firestore;
pub mod logger;
pub mod platform;

#[cfg(test)]
pub mod test_support;
