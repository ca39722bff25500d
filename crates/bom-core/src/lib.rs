//! # BOM Core
//!
//! 核心資料模型、錯誤類型與資料來源介面

pub mod component;
pub mod document;
pub mod memory;
pub mod operation;
pub mod sources;

// Re-export 主要類型
pub use component::{BomComponentRow, BomScrapRow};
pub use document::{BomDocument, CostingMethod, DocStatus};
pub use memory::{InMemoryStore, LedgerEntry, ProductRecord, UomRecord};
pub use operation::BomOperationRow;
pub use sources::{
    BinDetails, BomRepository, PriceListSource, ProductSource, StockSource, UomSource,
    ValuationSource,
};

/// BOM 引擎錯誤類型
#[derive(Debug, thiserror::Error)]
pub enum BomError {
    #[error("找不到 BOM: {0}")]
    BomNotFound(String),

    #[error("找不到物料: {0}")]
    ProductNotFound(String),

    #[error("BOM 解析錯誤: 子 BOM {bom_no} 的產出物料 {bom_product} 與元件 {component} 不一致")]
    Resolution {
        bom_no: String,
        bom_product: String,
        component: String,
    },

    #[error("BOM 循環: {implicated} 不可為 {root} 的父項或子項")]
    Recursion { root: String, implicated: String },

    #[error("配置錯誤: {0}")]
    Configuration(String),

    #[error("驗證錯誤: {0}")]
    Validation(String),

    #[error("狀態轉換錯誤: 無法從 {from:?} 轉換到 {to:?}")]
    InvalidTransition { from: DocStatus, to: DocStatus },
}

pub type Result<T> = std::result::Result<T, BomError>;
