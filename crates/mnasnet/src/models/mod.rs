//! Complete model families.
pub mod mnasnet;
