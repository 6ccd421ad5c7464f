//! Business logic services layer

pub mod activity_service;

pub use activity_service::ActivityService;
