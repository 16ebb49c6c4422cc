// src/models/mod.rs

pub mod activity;
pub mod attempt;
pub mod intervention;
pub mod quiz;
pub mod risk;
