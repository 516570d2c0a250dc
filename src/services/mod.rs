pub mod bucket_repository;
pub mod content_store;
pub mod dispatcher;
pub mod media_types;
pub mod resource_repository;
pub mod resource_service;
pub mod webhook_repository;
pub mod webhook_service;
