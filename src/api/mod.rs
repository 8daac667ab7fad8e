// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types and gRPC stubs for the ECS inventory gateway.
//!
//! The code under `generated/` is produced from
//! `proto/ecs/inventory/v1/inventory.proto`; rebuild with
//! `ECS_EXPORTER_REGENERATE_PROTO=1` to refresh it.

#[allow(clippy::all)]
#[path = "generated/ecs.inventory.v1.rs"]
pub mod inventory;

pub use inventory::inventory_service_client::InventoryServiceClient;
pub use inventory::inventory_service_server::{InventoryService, InventoryServiceServer};
