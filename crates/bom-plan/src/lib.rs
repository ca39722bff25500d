//! # BOM Production Planning
//!
//! 生產計劃聚合：子裝配需求（依 BOM 層級排序）與原料需求
//! （含庫存淨需求、最小訂購量、安全庫存與採購單位換算）

pub mod aggregator;
pub mod materials;

// Re-export 主要類型
pub use aggregator::{
    ManufacturingMode, PlanOptions, ProductionAggregator, ProductionPlanItem,
    SubAssemblyRequirement,
};
pub use materials::{MaterialPlanner, MaterialRequirement};
