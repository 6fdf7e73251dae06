//! Object store access: the `StorageService` facade and its clients.

pub mod object_client;
pub mod s3_client;
pub mod storage_service;

#[cfg(test)]
pub mod memory_client;
