pub mod annotations;
pub mod config;
pub mod error;
pub mod packager;

#[cfg(test)]
pub mod test_utils;
