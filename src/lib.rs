// ABOUTME: Library root for binlog-indexer - binlog change events to Elasticsearch
// ABOUTME: Exposes intake, pipelines, destination clients and the sync loop

pub mod codec;
pub mod commands;
pub mod config;
pub mod destination;
pub mod event;
pub mod filters;
pub mod intake;
pub mod pipeline;
pub mod shutdown;
pub mod sync;
