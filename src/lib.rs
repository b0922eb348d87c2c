pub mod card;
pub mod clock;
pub mod config;
pub mod logging;
pub mod quiz;
pub mod review;
pub mod service;
pub mod sm2;
pub mod store;
pub mod web;
