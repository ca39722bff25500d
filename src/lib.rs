//! # BOM Engine
//!
//! 多層 BOM 引擎：樹建構、循環偵測、成本計算與回溯、
//! 多層展開、生產計劃聚合
//!
//! ## 架構
//!
//! - `bom-core`: 資料模型、生命週期、資料來源介面與記憶體實作
//! - `bom-graph`: BOM 樹建構與循環偵測
//! - `bom-calc`: 單價解析、成本計算/回溯、多層展開
//! - `bom-plan`: 子裝配需求與原料需求聚合
//!
//! ## 快速開始
//!
//! ```no_run
//! use bom::{BomComponentRow, BomDocument, CostCalculator, InMemoryStore};
//! use rust_decimal::Decimal;
//!
//! let mut store = InMemoryStore::new();
//! let mut bike = BomDocument::new("BOM-BIKE-001", "BIKE", Decimal::ONE)
//!     .with_component(BomComponentRow::new("FRAME", Decimal::ONE))
//!     .with_component(BomComponentRow::new("WHEEL", Decimal::from(2)));
//!
//! let calc = CostCalculator::new(&store, &store, &store, &store);
//! let report = calc.calculate_cost(&mut bike)?;
//! println!("總成本: {}", report.summary.total_cost);
//! # Ok::<(), bom::BomError>(())
//! ```

pub use bom_core::{
    BinDetails, BomComponentRow, BomDocument, BomError, BomOperationRow, BomRepository,
    BomScrapRow, CostingMethod, DocStatus, InMemoryStore, LedgerEntry, PriceListSource,
    ProductRecord, ProductSource, Result, StockSource, UomRecord, UomSource, ValuationSource,
};

pub use bom_graph::{
    BomTree, ChildrenCache, CycleDetector, InMemoryChildrenCache, TreeBuilder,
};

pub use bom_calc::{
    BomCostUpdate, CostCalculator, CostReport, CostSummary, ExplodedRow, ExplosionEngine,
    RateResolver, RateWarning, RowCost, WarningSeverity,
};

pub use bom_plan::{
    ManufacturingMode, MaterialPlanner, MaterialRequirement, PlanOptions, ProductionAggregator,
    ProductionPlanItem, SubAssemblyRequirement,
};
