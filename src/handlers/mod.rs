// src/handlers/mod.rs

pub mod intervention;
pub mod quiz;
pub mod risk;
