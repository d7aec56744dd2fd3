pub mod ch_repository;
pub mod models;
pub mod repositories;
