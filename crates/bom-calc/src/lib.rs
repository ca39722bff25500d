//! # BOM Calculation Engine
//!
//! 成本計算（原料/工序/報廢）、父 BOM 成本回溯與多層展開

pub mod costing;
pub mod explosion;
pub mod rates;

// Re-export 主要類型
pub use costing::{BomCostUpdate, CostCalculator, CostReport, CostSummary, RowCost};
pub use explosion::{ExplodedRow, ExplosionEngine};
pub use rates::RateResolver;

use serde::{Deserialize, Serialize};

/// 單價解析警告（非致命：查無單價時以 0 計算並收集此工件，
/// 批次成本重算不因單一無價物料而中斷）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateWarning {
    pub product_code: String,
    pub message: String,
    pub severity: WarningSeverity,
}

impl RateWarning {
    pub fn new(product_code: String, message: String, severity: WarningSeverity) -> Self {
        Self {
            product_code,
            message,
            severity,
        }
    }

    pub fn info(product_code: String, message: String) -> Self {
        Self::new(product_code, message, WarningSeverity::Info)
    }

    pub fn warning(product_code: String, message: String) -> Self {
        Self::new(product_code, message, WarningSeverity::Warning)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningSeverity {
    Info,
    Warning,
}
